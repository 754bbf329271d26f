// Rendering entries for the terminal

use crate::entry::{Entry, Zone};
use colored::Colorize;
use eyre::Result;
use std::io::Write;

/// Digits needed to print ids up to `max_id`
///
/// Recomputed for every batch so deletions never leave a stale width behind.
pub fn id_width(max_id: Option<i64>) -> usize {
    max_id.map_or(1, |id| id.max(0).to_string().len())
}

/// How entries are written to stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Text { zone: Zone },
    Json,
}

impl Format {
    /// `<padded id> <timestamp> <entry>` rows, padded to a shared id width
    pub fn write_rows<W: Write>(self, out: &mut W, entries: &[Entry], max_id: Option<i64>) -> Result<()> {
        let width = id_width(entries.iter().map(|e| e.id).chain(max_id).max());
        for entry in entries {
            match self {
                Format::Text { zone } => writeln!(
                    out,
                    "{:>width$} {} {}",
                    entry.id.to_string().cyan(),
                    zone.format(entry.creation_time).dimmed(),
                    entry.text,
                    width = width
                )?,
                Format::Json => writeln!(out, "{}", serde_json::to_string(entry)?)?,
            }
        }
        Ok(())
    }

    /// Payload only in text mode, so `taskq take` composes in shell pipelines
    pub fn write_payloads<W: Write>(self, out: &mut W, entries: &[Entry]) -> Result<()> {
        for entry in entries {
            match self {
                Format::Text { .. } => writeln!(out, "{}", entry.text)?,
                Format::Json => writeln!(out, "{}", serde_json::to_string(entry)?)?,
            }
        }
        Ok(())
    }
}
