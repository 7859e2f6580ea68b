//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{BrokerConfig, CommandsConfig, HttpConfig, LogOutput, LoggingConfig, WorkerConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &WorkerConfig) -> ConfigResult<()> {
    validate_broker_config(&config.broker)?;
    validate_http_config(&config.http)?;
    validate_commands_config(&config.commands)?;
    validate_logging_config(&config.logging)?;
    Ok(())
}

fn validate_broker_config(broker: &BrokerConfig) -> ConfigResult<()> {
    validate_url(&broker.url, &["amqp://", "amqps://"])?;

    if broker.shared_queue.is_empty() {
        return Err(ConfigError::missing_field("broker.shared_queue"));
    }

    if broker.exchange.is_empty() {
        return Err(ConfigError::missing_field("broker.exchange"));
    }

    if broker.reconnect_delay_ms == 0 {
        return Err(ConfigError::validation(
            "Reconnect delay must be greater than 0",
        ));
    }

    if broker.shared_message_ttl_ms == 0 {
        return Err(ConfigError::validation(
            "Shared message TTL must be greater than 0",
        ));
    }

    if broker
        .shared_subscriptions
        .iter()
        .chain(&broker.static_subscriptions)
        .any(|key| key.is_empty())
    {
        return Err(ConfigError::validation("Routing keys cannot be empty"));
    }

    Ok(())
}

fn validate_http_config(http: &HttpConfig) -> ConfigResult<()> {
    validate_url(&http.base_url, &["http://", "https://"])?;

    if http.lease_ttl_ms == 0 {
        return Err(ConfigError::validation("Lease TTL must be greater than 0"));
    }

    if http.max_attempts == 0 {
        return Err(ConfigError::validation("Max attempts must be at least 1"));
    }

    if http.timeout_ms == 0 {
        return Err(ConfigError::validation("Timeout must be greater than 0"));
    }

    Ok(())
}

fn validate_commands_config(commands: &CommandsConfig) -> ConfigResult<()> {
    for (name, [low, high]) in [
        ("commands.error_window_secs", commands.error_window_secs),
        ("commands.blacklist_secs", commands.blacklist_secs),
    ] {
        if low == 0 || low > high {
            return Err(ConfigError::validation(format!(
                "{name} must be a non-empty range of positive seconds, got [{low}, {high}]"
            )));
        }
    }
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }

    if logging.filters.keys().any(|module| module.trim().is_empty()) {
        return Err(ConfigError::validation("Log filter module cannot be empty"));
    }

    Ok(())
}

/// Validates a URL.
fn validate_url(url: &str, schemes: &[&str]) -> ConfigResult<()> {
    if url.is_empty() {
        return Err(ConfigError::missing_field("url"));
    }

    if !schemes.iter().any(|s| url.starts_with(s)) {
        return Err(ConfigError::invalid_url(
            url,
            format!("URL must start with one of: {schemes:?}"),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&WorkerConfig::default()).is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_delays() {
        let mut config = WorkerConfig::default();
        config.broker.reconnect_delay_ms = 0;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError { .. })
        ));

        let mut config = WorkerConfig::default();
        config.http.max_attempts = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_urls() {
        let mut config = WorkerConfig::default();
        config.http.base_url = "ftp://example".into();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidUrl { .. })
        ));

        let mut config = WorkerConfig::default();
        config.broker.url.clear();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { .. })
        ));
    }

    #[test]
    fn test_validate_ranges_and_file_output() {
        let mut config = WorkerConfig::default();
        config.commands.blacklist_secs = [100, 10];
        assert!(validate_config(&config).is_err());

        let mut config = WorkerConfig::default();
        config.logging.output = LogOutput::File;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { .. })
        ));
    }
}
