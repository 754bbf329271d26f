// Queue store on top of a shared SQLite file

use crate::entry::{Entry, to_micros};
use crate::error::UsageError;
use crate::predicate::{Predicate, any_of};
use crate::selector::Selector;
use chrono::{DateTime, Utc};
use eyre::{Context, Result};
use regex::Regex;
use rusqlite::functions::FunctionFlags;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Default time a writer waits on a locked database before failing
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const ENTRY_COLUMNS: &str = "id, creation_time, entry";
const FIFO_ORDER: &str = "ORDER BY creation_time, id";

/// A SQLite file holding any number of named queues
///
/// Every queue is its own table. Processes sharing a file coordinate through
/// SQLite's WAL journal and busy timeout only.
pub struct Store {
    path: PathBuf,
    pub(crate) db: Connection,
}

impl Store {
    /// Open or create a store file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).context("Failed to create store directory")?;
        }

        let db = Connection::open(&path).context("Failed to open SQLite database")?;
        db.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
        db.pragma_update(None, "journal_mode", "WAL")
            .context("Failed to enable WAL journal")?;
        register_matches(&db)?;

        debug!(path = %path.display(), "Opened store");
        Ok(Self { path, db })
    }

    /// Path of the underlying database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// How long to wait for another process's lock before failing
    pub fn set_busy_timeout(&self, timeout: Duration) -> Result<()> {
        self.db.busy_timeout(timeout)?;
        Ok(())
    }

    // ========================================================================
    // Queue tables
    // ========================================================================

    /// Create the queue's table if it does not exist yet
    pub fn ensure_queue(&self, queue: &str) -> Result<()> {
        ensure_queue_on(&self.db, queue)
    }

    /// Whether a queue has ever been referenced in this store
    pub fn queue_exists(&self, queue: &str) -> Result<bool> {
        queue_exists_on(&self.db, queue)
    }

    /// Names of all queues, sorted
    pub fn queues(&self) -> Result<Vec<String>> {
        let mut stmt = self.db.prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite%'
             ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }

    // ========================================================================
    // Queue operations
    // ========================================================================

    /// Append an entry stamped with the current time, returning its id
    pub fn add(&self, queue: &str, text: &str) -> Result<i64> {
        self.add_at(queue, text, Utc::now())
    }

    /// Append an entry with an explicit creation time
    pub fn add_at(&self, queue: &str, text: &str, at: DateTime<Utc>) -> Result<i64> {
        self.ensure_queue(queue)?;
        self.db.execute(
            &format!("INSERT INTO {} (entry, creation_time) VALUES (?1, ?2)", table(queue)),
            params![text, to_micros(at)],
        )?;
        let id = self.db.last_insert_rowid();
        debug!(queue, id, "Added entry");
        Ok(id)
    }

    /// Append an entry unless the same text is already queued
    ///
    /// The check and the insert are one statement, so concurrent callers cannot
    /// both win.
    pub fn add_unique(&self, queue: &str, text: &str) -> Result<Option<i64>> {
        self.ensure_queue(queue)?;
        let t = table(queue);
        let inserted = self.db.execute(
            &format!(
                "INSERT INTO {t} (entry, creation_time)
                 SELECT ?1, ?2 WHERE NOT EXISTS (SELECT 1 FROM {t} WHERE entry = ?1)"
            ),
            params![text, to_micros(Utc::now())],
        )?;
        if inserted == 0 {
            debug!(queue, "Skipped duplicate entry");
            return Ok(None);
        }
        Ok(Some(self.db.last_insert_rowid()))
    }

    /// Insert a copy of an existing entry, keeping its id and timestamp when the id
    /// is free in `queue` and falling back to a fresh id otherwise
    pub fn insert_entry(&self, queue: &str, entry: &Entry) -> Result<i64> {
        self.ensure_queue(queue)?;
        let t = table(queue);
        let micros = to_micros(entry.creation_time);
        let inserted = self.db.execute(
            &format!("INSERT OR IGNORE INTO {t} (id, entry, creation_time) VALUES (?1, ?2, ?3)"),
            params![entry.id, entry.text, micros],
        )?;
        if inserted == 1 {
            return Ok(entry.id);
        }
        self.db.execute(
            &format!("INSERT INTO {t} (entry, creation_time) VALUES (?1, ?2)"),
            params![entry.text, micros],
        )?;
        Ok(self.db.last_insert_rowid())
    }

    /// Entries in FIFO order, optionally restricted to those matching any selector
    pub fn list(&self, queue: &str, selectors: &[Selector]) -> Result<Vec<Entry>> {
        self.ensure_queue(queue)?;
        let predicates: Vec<Predicate> = selectors.iter().map(Predicate::from).collect();
        let (filter, values) = match any_of(&predicates) {
            Some((sql, values)) => (format!("WHERE {}", sql), values),
            None => (String::new(), Vec::new()),
        };
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM {} {filter} {FIFO_ORDER}",
            table(queue)
        );
        let mut stmt = self.db.prepare(&sql)?;
        let entries = stmt
            .query_map(params_from_iter(values.iter()), Entry::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Up to `limit` earliest entries, without removing them
    pub fn peek(&self, queue: &str, limit: u64) -> Result<Vec<Entry>> {
        self.ensure_queue(queue)?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = self.db.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM {} {FIFO_ORDER} LIMIT ?1",
            table(queue)
        ))?;
        let entries = stmt
            .query_map([limit], Entry::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Remove and return the earliest entry
    ///
    /// Selection and removal happen in one `DELETE ... RETURNING` statement, so two
    /// processes taking from the same queue never receive the same entry.
    pub fn take(&self, queue: &str) -> Result<Option<Entry>> {
        self.ensure_queue(queue)?;
        let t = table(queue);
        let entry = self
            .db
            .query_row(
                &format!(
                    "DELETE FROM {t}
                     WHERE id = (SELECT id FROM {t} {FIFO_ORDER} LIMIT 1)
                     RETURNING {ENTRY_COLUMNS}"
                ),
                [],
                Entry::from_row,
            )
            .optional()
            .context("Failed to take entry")?;
        if let Some(entry) = &entry {
            debug!(queue, id = entry.id, "Took entry");
        }
        Ok(entry)
    }

    /// Number of entries in the queue
    pub fn count(&self, queue: &str) -> Result<u64> {
        self.ensure_queue(queue)?;
        count_on(&self.db, queue)
    }

    /// Largest id currently in the queue
    pub fn max_id(&self, queue: &str) -> Result<Option<i64>> {
        self.ensure_queue(queue)?;
        let max = self
            .db
            .query_row(&format!("SELECT MAX(id) FROM {}", table(queue)), [], |row| {
                row.get::<_, Option<i64>>(0)
            })?;
        Ok(max)
    }

    /// Delete every entry matching one selector and return the deleted entries in
    /// FIFO order
    pub fn delete(&self, queue: &str, selector: &Selector) -> Result<Vec<Entry>> {
        self.ensure_queue(queue)?;
        let (filter, values) = Predicate::from(selector).to_sql();
        let mut stmt = self.db.prepare(&format!(
            "DELETE FROM {} WHERE {filter} RETURNING {ENTRY_COLUMNS}",
            table(queue)
        ))?;
        let mut deleted = stmt
            .query_map(params_from_iter(values.iter()), Entry::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        deleted.sort_by_key(Entry::order_key);
        info!(queue, %selector, count = deleted.len(), "Deleted entries");
        Ok(deleted)
    }

    /// Remove every entry, returning how many were removed
    ///
    /// The table and its id sequence survive, so ids are never reused.
    pub fn reset(&self, queue: &str) -> Result<usize> {
        self.ensure_queue(queue)?;
        let removed = self.db.execute(&format!("DELETE FROM {}", table(queue)), [])?;
        info!(queue, removed, "Reset queue");
        Ok(removed)
    }
}

/// Quoted table identifier for a queue
///
/// Callers validate the name first; `validate_queue_name` keeps quotes out.
pub(crate) fn table(queue: &str) -> String {
    format!("\"{}\"", queue)
}

pub(crate) fn ensure_queue_on(db: &Connection, queue: &str) -> Result<()> {
    validate_queue_name(queue)?;
    db.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {t} (
             id INTEGER PRIMARY KEY AUTOINCREMENT,
             entry TEXT NOT NULL,
             creation_time INTEGER NOT NULL
         );
         CREATE INDEX IF NOT EXISTS \"{queue}:fifo\" ON {t}(creation_time, id);",
        t = table(queue),
    ))
    .with_context(|| format!("Failed to create queue {}", queue))?;
    Ok(())
}

pub(crate) fn queue_exists_on(db: &Connection, queue: &str) -> Result<bool> {
    validate_queue_name(queue)?;
    let found = db
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
            [queue],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

pub(crate) fn count_on(db: &Connection, queue: &str) -> Result<u64> {
    let count: i64 = db.query_row(&format!("SELECT COUNT(*) FROM {}", table(queue)), [], |row| {
        row.get(0)
    })?;
    Ok(count as u64)
}

/// Check a queue name against `[A-Za-z][A-Za-z0-9_]*`
///
/// SQLite resolves table names case-insensitively, so `jobs` and `Jobs` are the
/// same queue; compare names with [`same_queue`].
pub fn validate_queue_name(name: &str) -> std::result::Result<(), UsageError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => first.is_ascii_alphabetic() && chars.all(|c| c.is_ascii_alphanumeric() || c == '_'),
        None => false,
    };
    if !valid || name.len() > 64 || name.to_ascii_lowercase().starts_with("sqlite") {
        return Err(UsageError::InvalidQueueName(name.to_string()));
    }
    Ok(())
}

/// Whether two queue names refer to the same table
pub fn same_queue(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Register `matches(pattern, text)`, caching the compiled regex per statement
fn register_matches(db: &Connection) -> Result<()> {
    db.create_scalar_function(
        "matches",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let regex: Arc<Regex> = ctx.get_or_create_aux(0, |pattern| -> std::result::Result<_, BoxError> {
                Ok(Regex::new(pattern.as_str()?)?)
            })?;
            let text = ctx
                .get_raw(1)
                .as_str()
                .map_err(|e| rusqlite::Error::UserFunctionError(e.into()))?;
            Ok(regex.is_match(text))
        },
    )
    .context("Failed to register matches function")?;
    Ok(())
}
