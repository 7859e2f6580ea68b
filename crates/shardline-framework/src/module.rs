//! Modules: commands, listeners and tasks sharing one context.
//!
//! ```rust,ignore
//! struct Backups { retention: Duration }
//!
//! let module = Module::new("backups", Arc::new(Backups { retention }))
//!     .command(Command::new("backup").handler(|inv: Invocation| async move {
//!         let backups = inv.bound::<Backups>().ok_or("unbound")?;
//!         inv.reply(&format!("kept for {:?}", backups.retention)).await?;
//!         Ok(())
//!     }))
//!     .listener(Listener::new("on_guild_delete", on_guild_delete))
//!     .task(Task::new("prune", TaskSchedule::daily_at(4, 0, 0).ok_or("bad time")?, prune));
//!
//! let worker = Worker::builder(config)
//!     .broker(broker)
//!     .store(store)
//!     .module(module)
//!     .build()?;
//! ```

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveTime, TimeDelta, Utc};
use tokio::time::sleep;
use tower::util::BoxCloneSyncService;
use tower::{BoxError, ServiceExt, service_fn};
use tracing::{debug, error};

use crate::command::{Command, CommandNode};
use crate::listener::Listener;

// ─── Task ─────────────────────────────────────────────────────────────────────

/// When a task runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskSchedule {
    /// After every `Duration`, starting one period after launch.
    Every(Duration),
    /// Once a day at a UTC time of day.
    DailyAt(NaiveTime),
}

impl TaskSchedule {
    /// Daily at `hour:minute:second` UTC. `None` if that is not a valid time.
    pub fn daily_at(hour: u32, minute: u32, second: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, second).map(Self::DailyAt)
    }

    /// Delay before the next run, given the current UTC time of day.
    pub fn delay_from(&self, now: NaiveTime) -> Duration {
        match *self {
            Self::Every(period) => period,
            Self::DailyAt(target) => {
                let mut until = target.signed_duration_since(now);
                if until < TimeDelta::zero() {
                    until += TimeDelta::days(1);
                }
                until.to_std().unwrap_or_default()
            }
        }
    }

    /// Delay before the next run from now.
    pub fn next_delay(&self) -> Duration {
        self.delay_from(Utc::now().time())
    }
}

/// The request a task handler receives.
#[derive(Clone)]
pub struct TaskRun {
    context: Option<Arc<dyn Any + Send + Sync>>,
}

impl TaskRun {
    /// Returns the context of the task's module, if it has type `T`.
    pub fn bound<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.context
            .clone()
            .and_then(|ctx| ctx.downcast::<T>().ok())
    }
}

pub type TaskHandler = BoxCloneSyncService<TaskRun, (), BoxError>;

/// A recurring background job.
#[derive(Clone)]
pub struct Task {
    name: String,
    schedule: TaskSchedule,
    handler: TaskHandler,
    context: Option<Arc<dyn Any + Send + Sync>>,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("schedule", &self.schedule)
            .finish_non_exhaustive()
    }
}

impl Task {
    pub fn new<F, Fut>(name: impl Into<String>, schedule: TaskSchedule, f: F) -> Self
    where
        F: Fn(TaskRun) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            schedule,
            handler: BoxCloneSyncService::new(service_fn(f)),
            context: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schedule(&self) -> TaskSchedule {
        self.schedule
    }

    pub(crate) fn bind_context(&mut self, context: Arc<dyn Any + Send + Sync>) {
        self.context.get_or_insert(context);
    }

    /// Runs the handler once.
    pub async fn run_once(&self) -> Result<(), BoxError> {
        let run = TaskRun {
            context: self.context.clone(),
        };
        self.handler.clone().oneshot(run).await
    }

    /// Runs on schedule until the future is dropped. Failures are logged and
    /// do not stop the loop.
    pub async fn run(&self) {
        loop {
            let delay = self.schedule.next_delay();
            debug!(task = %self.name, delay_secs = delay.as_secs(), "task scheduled");
            sleep(delay).await;
            if let Err(e) = self.run_once().await {
                error!(task = %self.name, error = %e, "Task failed");
            }
        }
    }
}

// ─── Module ───────────────────────────────────────────────────────────────────

/// A bundle of commands, listeners and tasks bound to one context.
pub struct Module {
    name: String,
    context: Arc<dyn Any + Send + Sync>,
    commands: Vec<Arc<CommandNode>>,
    listeners: Vec<Listener>,
    tasks: Vec<Task>,
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("commands", &self.commands.len())
            .field("listeners", &self.listeners)
            .field("tasks", &self.tasks)
            .finish()
    }
}

impl Module {
    pub fn new<T: Any + Send + Sync>(name: impl Into<String>, context: Arc<T>) -> Self {
        Self {
            name: name.into(),
            context,
            commands: Vec::new(),
            listeners: Vec::new(),
            tasks: Vec::new(),
        }
    }

    /// Adds a top-level command; it and its subcommands see the module context.
    pub fn command(mut self, command: Command) -> Self {
        let node = command.build();
        node.bind_context(self.context.clone());
        self.commands.push(node);
        self
    }

    pub fn listener(mut self, mut listener: Listener) -> Self {
        listener.bind_context(self.context.clone());
        self.listeners.push(listener);
        self
    }

    pub fn task(mut self, mut task: Task) -> Self {
        task.bind_context(self.context.clone());
        self.tasks.push(task);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn commands(&self) -> &[Arc<CommandNode>] {
        &self.commands
    }

    pub fn listeners(&self) -> &[Listener] {
        &self.listeners
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Splits the module into its registrations.
    pub fn into_parts(self) -> (Vec<Arc<CommandNode>>, Vec<Listener>, Vec<Task>) {
        (self.commands, self.listeners, self.tasks)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::listener::ListenerEvent;

    struct Counter(AtomicUsize);

    fn hms(hour: u32, minute: u32, second: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, second).unwrap()
    }

    #[test]
    fn test_daily_delay() {
        let at_four = TaskSchedule::daily_at(4, 0, 0).unwrap();
        assert_eq!(at_four.delay_from(hms(3, 0, 0)), Duration::from_secs(3600));
        assert_eq!(
            at_four.delay_from(hms(5, 0, 0)),
            Duration::from_secs(23 * 3600)
        );
        assert_eq!(at_four.delay_from(hms(4, 0, 0)), Duration::ZERO);
        assert_eq!(
            TaskSchedule::daily_at(0, 0, 30).unwrap().delay_from(hms(23, 59, 50)),
            Duration::from_secs(40)
        );
        assert_eq!(
            TaskSchedule::Every(Duration::from_secs(30)).delay_from(hms(12, 0, 0)),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn test_daily_at_rejects_invalid_time() {
        assert!(TaskSchedule::daily_at(25, 0, 0).is_none());
        assert!(TaskSchedule::daily_at(24, 0, 0).is_none());
        assert!(TaskSchedule::daily_at(12, 60, 0).is_none());
        assert!(TaskSchedule::daily_at(23, 59, 59).is_some());
    }

    #[test]
    fn test_next_delay_within_a_day() {
        let delay = TaskSchedule::daily_at(6, 30, 0).unwrap().next_delay();
        assert!(delay <= Duration::from_secs(24 * 3600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_task_survives_failures() {
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let module = Module::new("jobs", counter.clone()).task(Task::new(
            "tick",
            TaskSchedule::Every(Duration::from_secs(10)),
            |run: TaskRun| async move {
                let counter = run.bound::<Counter>().ok_or("unbound")?;
                counter.0.fetch_add(1, Ordering::SeqCst);
                Err::<(), BoxError>("always fails".into())
            },
        ));
        let (_, _, tasks) = module.into_parts();
        let task = tasks[0].clone();
        let handle = tokio::spawn(async move { task.run().await });

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 3);
        handle.abort();
    }

    #[test]
    fn test_module_binds_context() {
        let module = Module::new("m", Arc::new(7_u8))
            .command(Command::group("g").subcommand(Command::new("leaf")))
            .listener(Listener::new("on_load", |_: ListenerEvent| async { Ok(()) }));

        let leaf = &module.commands()[0].children()[0];
        assert!(leaf.bound_context().is_some());
        assert_eq!(module.listeners()[0].event(), "load");
    }
}
