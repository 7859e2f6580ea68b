/// Shell-like argument splitting.
///
/// Handles:
/// - Whitespace-separated arguments
/// - Quoted strings (single and double quotes)
/// - Backslash escapes outside quotes and within double quotes
///
/// Returns `None` when a quote is left open or the input ends in an escape.
pub fn shell_split(input: &str) -> Option<Vec<String>> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut in_single_quote = false;
    let mut in_double_quote = false;
    let mut escape_next = false;

    for ch in input.chars() {
        if escape_next {
            current.push(ch);
            escape_next = false;
            continue;
        }

        match ch {
            '\\' if !in_single_quote => {
                escape_next = true;
                in_word = true;
            }
            '\'' if !in_double_quote => {
                in_single_quote = !in_single_quote;
                in_word = true;
            }
            '"' if !in_single_quote => {
                in_double_quote = !in_double_quote;
                in_word = true;
            }
            c if c.is_whitespace() && !in_single_quote && !in_double_quote => {
                if in_word {
                    args.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            _ => {
                current.push(ch);
                in_word = true;
            }
        }
    }

    if in_single_quote || in_double_quote || escape_next {
        return None;
    }
    if in_word {
        args.push(current);
    }

    Some(args)
}

/// Splits a command line into tokens.
///
/// Malformed quoting falls back to splitting on single spaces, so this never
/// fails.
pub fn tokenize(input: &str) -> Vec<String> {
    shell_split(input).unwrap_or_else(|| input.split(' ').map(str::to_string).collect())
}
