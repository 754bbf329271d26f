// Copy, merge, backup and restore between queues

use crate::error::UsageError;
use crate::store::{Store, count_on, ensure_queue_on, queue_exists_on, same_queue, table};
use eyre::Result;
use rusqlite::TransactionBehavior;
use tracing::info;

impl Store {
    /// Reconcile `to` with the contents of `from` in one transaction
    ///
    /// With `truncate`, `to` becomes an exact copy of `from` (same ids). Without it,
    /// every row of `from` is added under its own id when that id is free in `to`;
    /// rows whose id is taken and whose text and timestamp are not already in `to`
    /// are added under a fresh id. Returns the net change in `to`'s size.
    pub fn reconcile(&mut self, from: &str, to: &str, truncate: bool) -> Result<i64> {
        if same_queue(from, to) {
            return Err(UsageError::SameQueue(from.to_string()).into());
        }

        let tx = self.db.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if !queue_exists_on(&tx, from)? {
            return Err(UsageError::MissingQueue(from.to_string()).into());
        }
        ensure_queue_on(&tx, to)?;
        let (src, dst) = (table(from), table(to));

        let before = count_on(&tx, to)? as i64;

        if truncate {
            tx.execute(&format!("DELETE FROM {dst}"), [])?;
        }

        tx.execute(
            &format!(
                "INSERT OR IGNORE INTO {dst} (id, entry, creation_time)
                 SELECT id, entry, creation_time FROM {src} ORDER BY creation_time, id"
            ),
            [],
        )?;

        if !truncate {
            tx.execute(
                &format!(
                    "INSERT INTO {dst} (entry, creation_time)
                     SELECT f.entry, f.creation_time FROM {src} f
                     WHERE NOT EXISTS (
                         SELECT 1 FROM {dst} t
                         WHERE t.entry = f.entry AND t.creation_time = f.creation_time
                     )
                     ORDER BY f.creation_time, f.id"
                ),
                [],
            )?;
        }

        let after = count_on(&tx, to)? as i64;
        tx.commit()?;

        let delta = after - before;
        info!(from, to, truncate, delta, "Reconciled queues");
        Ok(delta)
    }

    /// Add the current queue's entries to `dest`
    pub fn copy_to(&mut self, current: &str, dest: &str) -> Result<i64> {
        self.reconcile(current, dest, false)
    }

    /// Replace `dest` with the current queue's entries
    pub fn backup_to(&mut self, current: &str, dest: &str) -> Result<i64> {
        self.reconcile(current, dest, true)
    }

    /// Replace the current queue with `source`'s entries
    pub fn restore_from(&mut self, current: &str, source: &str) -> Result<i64> {
        self.reconcile(source, current, true)
    }

    /// Add `source`'s entries to the current queue
    pub fn merge_from(&mut self, current: &str, source: &str) -> Result<i64> {
        self.reconcile(source, current, false)
    }
}
