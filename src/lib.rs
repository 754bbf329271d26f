// taskq - durable named FIFO work queues in a shared SQLite file

pub mod config;
pub mod confirm;
pub mod dedup;
pub mod entry;
pub mod error;
pub mod output;
pub mod predicate;
pub mod reconcile;
pub mod runner;
pub mod selector;
pub mod store;

// Re-export main types for convenience
pub use config::{ConfigFile, Overrides, Settings};
pub use confirm::{AssumeYes, Confirm, TerminalPrompt};
pub use dedup::Keep;
pub use entry::{Entry, Zone};
pub use error::UsageError;
pub use predicate::Predicate;
pub use runner::{CommandExecutor, Executor, RunOptions, RunOutcome, Runner};
pub use selector::{Selector, parse_selector, parse_selectors, parse_span};
pub use store::Store;

/// Generic failure (store busy, I/O, declined confirmation)
pub const EXIT_FAILURE: i32 = 1;
/// Bad arguments or selectors
pub const EXIT_USAGE: i32 = 2;
/// `take`/`peek` found nothing
pub const EXIT_EMPTY: i32 = 3;
