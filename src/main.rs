use chrono::Utc;
use clap::{ArgAction, Parser, Subcommand};
use eyre::Result;
use std::fmt::Display;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use taskq::output::Format;
use taskq::{
    AssumeYes, CommandExecutor, ConfigFile, Confirm, EXIT_EMPTY, EXIT_FAILURE, EXIT_USAGE, Keep, Overrides,
    RunOptions, RunOutcome, Runner, Settings, Store, TerminalPrompt, UsageError, Zone, parse_selectors, parse_span,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "taskq")]
#[command(about = "taskq - durable named FIFO work queues in a shared SQLite file")]
#[command(version = env!("GIT_DESCRIBE"))]
struct Cli {
    /// Path to the store file
    #[arg(short, long, env = "TASKQ_DB", global = true)]
    database: Option<PathBuf>,

    /// Queue to operate on (default: "default")
    #[arg(short, long, env = "TASKQ_QUEUE", global = true)]
    queue: Option<String>,

    /// Time zone for dates and timestamps: local or utc
    #[arg(long, env = "TASKQ_TIMEZONE", global = true)]
    timezone: Option<Zone>,

    /// Config file (default: <config dir>/taskq/config.yaml)
    #[arg(long, env = "TASKQ_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Suppress informational messages
    #[arg(long, global = true)]
    quiet: bool,

    /// Print entries as JSON lines
    #[arg(long, global = true)]
    json: bool,

    /// More logging on stderr (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add entries, one per argument (or one per stdin line when none are given)
    Add {
        /// Skip entries whose text is already queued
        #[arg(short, long)]
        unique: bool,

        entries: Vec<String>,
    },

    /// List entries, optionally only those matching any selector
    List {
        #[arg(allow_hyphen_values = true)]
        selectors: Vec<String>,
    },

    /// Remove and print the earliest entry
    #[command(alias = "get")]
    Take,

    /// Print the earliest entries without removing them
    Peek {
        #[arg(short = 'n', long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
        count: u64,
    },

    /// Feed entries to a command until the queue stays empty
    ///
    /// A `:` argument is replaced by the entry text; without one the text is appended.
    Run {
        /// Stop after this long without work
        #[arg(short, long, default_value = "1m", value_parser = parse_span)]
        timeout: Duration,

        /// Pause between polls of an empty queue
        #[arg(long, default_value = "2s", value_parser = parse_span)]
        retry_delay: Duration,

        /// Keep going when the command fails
        #[arg(long)]
        ignore_error: bool,

        /// Queue receiving entries whose command failed
        #[arg(long)]
        error_queue: Option<String>,

        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Delete entries by id, id range, age, date range or /pattern/
    #[command(alias = "remove")]
    Delete {
        #[arg(required = true, allow_hyphen_values = true)]
        selectors: Vec<String>,
    },

    /// Remove every entry from the queue
    Reset {
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Print the number of entries
    Count,

    /// Remove entries whose text repeats
    Dedupe {
        /// Keep the earliest copy (default)
        #[arg(long, conflicts_with = "newest")]
        oldest: bool,

        /// Keep the latest copy
        #[arg(long)]
        newest: bool,
    },

    /// Add this queue's entries to another queue
    CopyTo { dest: String },

    /// Replace another queue with this queue's entries
    BackupTo { dest: String },

    /// Replace this queue with another queue's entries
    RestoreFrom { source: String },

    /// Add another queue's entries to this queue
    MergeFrom { source: String },

    /// List queues and their sizes
    Queues,
}

fn main() {
    match run() {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            let code = if e.downcast_ref::<UsageError>().is_some() {
                EXIT_USAGE
            } else {
                EXIT_FAILURE
            };
            process::exit(code);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if !io::stdout().is_terminal() {
        colored::control::set_override(false);
    }

    let file = ConfigFile::load(cli.config.as_deref())?;
    let settings = Settings::resolve(
        Overrides {
            database: cli.database,
            queue: cli.queue,
            timezone: cli.timezone,
            quiet: cli.quiet,
        },
        file,
    )?;
    debug!(?settings, "Resolved settings");

    let mut store = Store::open(&settings.database)?;
    store.set_busy_timeout(settings.busy_timeout)?;

    let format = if cli.json {
        Format::Json
    } else {
        Format::Text { zone: settings.zone }
    };
    let app = App { settings, format };
    app.dispatch(&mut store, cli.command)
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

struct App {
    settings: Settings,
    format: Format,
}

impl App {
    /// Informational message on stderr, unless `--quiet`
    fn note(&self, message: impl Display) {
        if !self.settings.quiet {
            eprintln!("{}", message);
        }
    }

    fn dispatch(&self, store: &mut Store, command: Commands) -> Result<i32> {
        let queue = self.settings.queue.as_str();
        let mut out = io::stdout().lock();

        match command {
            Commands::Add { unique, entries } => {
                let entries = if entries.is_empty() && !io::stdin().is_terminal() {
                    read_stdin_entries()?
                } else {
                    entries
                };
                if entries.is_empty() {
                    return Err(UsageError::NothingToAdd.into());
                }
                for text in &entries {
                    if unique {
                        match store.add_unique(queue, text)? {
                            Some(id) => self.note(format!("Added entry {} to {}", id, queue)),
                            None => self.note(format!("Already queued: {}", text)),
                        }
                    } else {
                        let id = store.add(queue, text)?;
                        self.note(format!("Added entry {} to {}", id, queue));
                    }
                }
                Ok(0)
            }

            Commands::List { selectors } => {
                let selectors = parse_selectors(selectors.as_slice(), self.settings.zone, Utc::now())?;
                let entries = store.list(queue, &selectors)?;
                self.format.write_rows(&mut out, &entries, store.max_id(queue)?)?;
                Ok(0)
            }

            Commands::Take => match store.take(queue)? {
                Some(entry) => {
                    self.format.write_payloads(&mut out, &[entry])?;
                    Ok(0)
                }
                None => {
                    self.note(format!("No entry in {}", queue));
                    Ok(EXIT_EMPTY)
                }
            },

            Commands::Peek { count } => {
                let entries = store.peek(queue, count)?;
                if entries.is_empty() {
                    self.note(format!("No entry in {}", queue));
                    return Ok(EXIT_EMPTY);
                }
                self.format.write_payloads(&mut out, &entries)?;
                Ok(0)
            }

            Commands::Run {
                timeout,
                retry_delay,
                ignore_error,
                error_queue,
                command,
            } => {
                let options = RunOptions {
                    idle_timeout: timeout,
                    retry_delay,
                    error_queue,
                    quit_on_error: !ignore_error,
                };
                let outcome = Runner::new(store, queue, command, options, CommandExecutor)?.run()?;
                match &outcome {
                    RunOutcome::Idle { processed, failed } => {
                        self.note(format!("Processed {} entries ({} failed), queue idle", processed, failed))
                    }
                    RunOutcome::Aborted { entry, code } => {
                        self.note(format!("Command failed with exit code {} on entry {}", code, entry.id))
                    }
                }
                Ok(outcome.exit_code())
            }

            Commands::Delete { selectors: tokens } => {
                let selectors = parse_selectors(tokens.as_slice(), self.settings.zone, Utc::now())?;
                for (token, selector) in tokens.iter().zip(&selectors) {
                    let deleted = store.delete(queue, selector)?;
                    if deleted.is_empty() {
                        self.note(format!("No entries matching {}", token));
                        continue;
                    }
                    self.note(format!("Deleted {} entries matching {}:", deleted.len(), token));
                    if !self.settings.quiet {
                        self.format.write_rows(&mut out, &deleted, store.max_id(queue)?)?;
                    }
                }
                Ok(0)
            }

            Commands::Reset { yes } => {
                let count = store.count(queue)?;
                let mut confirm: Box<dyn Confirm> = if yes {
                    Box::new(AssumeYes)
                } else {
                    Box::new(TerminalPrompt)
                };
                if !confirm.confirm(&format!("Remove all {} entries from {}?", count, queue))? {
                    self.note("Reset cancelled");
                    return Ok(EXIT_FAILURE);
                }
                let removed = store.reset(queue)?;
                self.note(format!("Removed {} entries from {}", removed, queue));
                Ok(0)
            }

            Commands::Count => {
                writeln_out(&mut out, store.count(queue)?)?;
                Ok(0)
            }

            Commands::Dedupe { oldest: _, newest } => {
                let keep = if newest { Keep::Newest } else { Keep::Oldest };
                match store.dedup(queue, keep)? {
                    0 => self.note(format!("No duplicates in {}", queue)),
                    removed => self.note(format!("Removed {} duplicate entries from {}", removed, queue)),
                }
                Ok(0)
            }

            Commands::CopyTo { dest } => {
                let delta = store.copy_to(queue, &dest)?;
                self.note(format!("Copied {} to {} ({:+} entries)", queue, dest, delta));
                Ok(0)
            }

            Commands::BackupTo { dest } => {
                let delta = store.backup_to(queue, &dest)?;
                self.note(format!("Backed up {} to {} ({:+} entries)", queue, dest, delta));
                Ok(0)
            }

            Commands::RestoreFrom { source } => {
                let delta = store.restore_from(queue, &source)?;
                self.note(format!("Restored {} from {} ({:+} entries)", queue, source, delta));
                Ok(0)
            }

            Commands::MergeFrom { source } => {
                let delta = store.merge_from(queue, &source)?;
                self.note(format!("Merged {} into {} ({:+} entries)", source, queue, delta));
                Ok(0)
            }

            Commands::Queues => {
                for name in store.queues()? {
                    let count = store.count(&name)?;
                    match self.format {
                        Format::Json => {
                            writeln_out(&mut out, serde_json::json!({ "queue": name, "count": count }))?
                        }
                        Format::Text { .. } => writeln_out(&mut out, format!("{} {}", name, count))?,
                    }
                }
                Ok(0)
            }
        }
    }
}

fn writeln_out(out: &mut impl Write, value: impl Display) -> Result<()> {
    writeln!(out, "{}", value)?;
    Ok(())
}

/// One entry per non-empty stdin line
fn read_stdin_entries() -> Result<Vec<String>> {
    let mut entries = Vec::new();
    for line in io::stdin().lock().lines() {
        let line = line?;
        if !line.trim().is_empty() {
            entries.push(line);
        }
    }
    Ok(entries)
}
