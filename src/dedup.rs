// Duplicate entry removal

use crate::entry::Entry;
use crate::store::{Store, ensure_queue_on, table};
use chrono::{DateTime, Utc};
use eyre::Result;
use rusqlite::TransactionBehavior;
use std::collections::HashMap;
use std::collections::hash_map::Entry as Slot;
use tracing::info;

/// Which copy of a repeated text survives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Keep {
    #[default]
    Oldest,
    Newest,
}

type Stamp = (DateTime<Utc>, i64);

impl Keep {
    /// Pick the survivor between two stamps, returning `(kept, dropped)`
    fn decide(self, kept: Stamp, seen: Stamp) -> (Stamp, Stamp) {
        let seen_wins = match self {
            Keep::Oldest => seen < kept,
            Keep::Newest => seen > kept,
        };
        if seen_wins { (seen, kept) } else { (kept, seen) }
    }
}

/// Ids that lose under `keep`, given entries in any order
pub fn losing_ids<'a, I>(entries: I, keep: Keep) -> Vec<i64>
where
    I: IntoIterator<Item = &'a Entry>,
{
    let mut kept: HashMap<&str, Stamp> = HashMap::new();
    let mut losers = Vec::new();

    for entry in entries {
        let seen = (entry.creation_time, entry.id);
        match kept.entry(entry.text.as_str()) {
            Slot::Vacant(slot) => {
                slot.insert(seen);
            }
            Slot::Occupied(mut slot) => {
                let (winner, loser) = keep.decide(*slot.get(), seen);
                slot.insert(winner);
                losers.push(loser.1);
            }
        }
    }

    losers
}

impl Store {
    /// Remove repeated entry texts, keeping one entry per text
    ///
    /// The scan and the deletes run in one immediate transaction. Returns the
    /// number of entries removed.
    pub fn dedup(&mut self, queue: &str, keep: Keep) -> Result<usize> {
        let tx = self.db.transaction_with_behavior(TransactionBehavior::Immediate)?;
        ensure_queue_on(&tx, queue)?;
        let t = table(queue);

        let entries = {
            let mut stmt = tx.prepare(&format!(
                "SELECT id, creation_time, entry FROM {t} ORDER BY creation_time, id, entry"
            ))?;
            stmt.query_map([], Entry::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?
        };

        let losers = losing_ids(&entries, keep);
        {
            let mut stmt = tx.prepare(&format!("DELETE FROM {t} WHERE id = ?1"))?;
            for id in &losers {
                stmt.execute([id])?;
            }
        }
        tx.commit()?;

        info!(queue, ?keep, removed = losers.len(), "Deduplicated queue");
        Ok(losers.len())
    }
}
