// Run loop: feed queued entries to an external command

use crate::entry::Entry;
use crate::error::UsageError;
use crate::store::{Store, validate_queue_name};
use eyre::{Context, Result};
use std::io;
use std::process::{Command, ExitStatus};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Token in the command template replaced by the entry text
pub const PLACEHOLDER: &str = ":";

/// Exit code reported when an executor fails to start the command at all
pub const SPAWN_FAILURE: i32 = 126;

/// Knobs for [`Runner`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Stop after this long without work
    pub idle_timeout: Duration,
    /// Pause between polls of an empty queue
    pub retry_delay: Duration,
    /// Queue receiving entries whose command failed
    pub error_queue: Option<String>,
    /// Stop at the first failing command
    pub quit_on_error: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(60),
            retry_delay: Duration::from_secs(2),
            error_queue: None,
            quit_on_error: true,
        }
    }
}

/// How a run loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Idle timeout reached
    Idle { processed: usize, failed: usize },
    /// A command failed while `quit_on_error` was set
    Aborted { entry: Entry, code: i32 },
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Idle { .. } => 0,
            RunOutcome::Aborted { code, .. } => *code,
        }
    }
}

/// Runs one command synchronously and reports its exit code
pub trait Executor {
    fn execute(&mut self, argv: &[String]) -> Result<i32>;
}

/// Spawns real processes that inherit this process's stdio
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandExecutor;

impl Executor for CommandExecutor {
    fn execute(&mut self, argv: &[String]) -> Result<i32> {
        let (program, args) = argv.split_first().ok_or(UsageError::EmptyCommand)?;
        match Command::new(program).args(args).status() {
            Ok(status) => Ok(status_code(status)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(program = %program, "Command not found");
                Ok(127)
            }
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                warn!(program = %program, "Command not executable");
                Ok(126)
            }
            Err(e) => Err(e).with_context(|| format!("Failed to run {}", program)),
        }
    }
}

#[cfg(unix)]
fn status_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(1)
}

#[cfg(not(unix))]
fn status_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}

/// Substitute the entry text for every placeholder token, or append it
pub fn build_argv(template: &[String], text: &str) -> Vec<String> {
    if template.iter().any(|arg| arg == PLACEHOLDER) {
        template
            .iter()
            .map(|arg| if arg == PLACEHOLDER { text.to_string() } else { arg.clone() })
            .collect()
    } else {
        let mut argv = template.to_vec();
        argv.push(text.to_string());
        argv
    }
}

/// Supervisor that drains a queue through an external command
///
/// Single-threaded: at most one command is in flight. The idle timeout is only
/// checked between iterations.
pub struct Runner<'a, E: Executor> {
    store: &'a Store,
    queue: &'a str,
    template: Vec<String>,
    options: RunOptions,
    executor: E,
}

impl<'a, E: Executor> Runner<'a, E> {
    pub fn new(store: &'a Store, queue: &'a str, template: Vec<String>, options: RunOptions, executor: E) -> Result<Self> {
        if template.is_empty() {
            return Err(UsageError::EmptyCommand.into());
        }
        validate_queue_name(queue)?;
        if let Some(error_queue) = &options.error_queue {
            validate_queue_name(error_queue)?;
        }
        Ok(Self {
            store,
            queue,
            template,
            options,
            executor,
        })
    }

    /// Loop until idle or until a failure aborts the run
    pub fn run(&mut self) -> Result<RunOutcome> {
        let mut last_activity = Instant::now();
        let mut processed = 0;
        let mut failed = 0;

        info!(queue = self.queue, timeout = ?self.options.idle_timeout, "Run loop started");

        while last_activity.elapsed() <= self.options.idle_timeout {
            let Some(entry) = self.store.take(self.queue)? else {
                thread::sleep(self.options.retry_delay);
                continue;
            };

            let argv = build_argv(&self.template, &entry.text);
            debug!(id = entry.id, ?argv, "Executing");
            // the entry is already dequeued, so a spawn error is just another failure
            let code = match self.executor.execute(&argv) {
                Ok(code) => code,
                Err(e) => {
                    warn!(id = entry.id, error = %format!("{:#}", e), "Command could not be started");
                    SPAWN_FAILURE
                }
            };
            last_activity = Instant::now();
            processed += 1;

            if code == 0 {
                continue;
            }

            failed += 1;
            warn!(id = entry.id, code, "Command failed");
            self.route_failure(&entry);

            if self.options.quit_on_error {
                info!(processed, failed, "Run loop aborted");
                return Ok(RunOutcome::Aborted { entry, code });
            }
        }

        info!(processed, failed, "Run loop idle, stopping");
        Ok(RunOutcome::Idle { processed, failed })
    }

    /// Best effort: a failure here is logged, never retried
    fn route_failure(&self, entry: &Entry) {
        let Some(error_queue) = &self.options.error_queue else {
            return;
        };
        match self.store.insert_entry(error_queue, entry) {
            Ok(id) => debug!(error_queue = %error_queue, id, "Routed failed entry"),
            Err(e) => warn!(error_queue = %error_queue, error = %e, "Failed to route entry to error queue"),
        }
    }
}
