//! Append-only journal file.
//!
//! Every posting leg is one pipe-delimited line:
//!
//! ```text
//! id|ts|kind|dr|cr|amount|ref|desc
//! ```
//!
//! A leg is committed only after `append` has written and flushed the line;
//! the accounting engine applies balances afterwards, so replaying the file
//! reconstructs them exactly. Lines with fewer than six fields, or with
//! unparseable id/ts/kind/amount fields, are skipped on replay and counted.

use super::posting::{EventKind, JournalEntry};
use crate::money::Money;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Journal I/O failures. Any append failure is fatal for order intake.
#[derive(Debug, Error)]
pub enum JournalError {
    /// File could not be opened, written or flushed.
    #[error("journal io error at {path}: {source}")]
    Io {
        /// The affected journal path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// The outcome of reading a journal file back.
#[derive(Debug)]
pub struct ReplayRead {
    /// Successfully parsed entries, in file order.
    pub entries: Vec<JournalEntry>,
    /// Number of malformed lines skipped.
    pub skipped: u64,
}

/// Append-only, flush-on-write journal file.
pub struct FileJournal {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl FileJournal {
    /// Open (or create) the journal at `path` for appending.
    pub fn open(path: &Path) -> Result<Self, JournalError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| JournalError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| JournalError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    /// The journal file location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Durably append one entry. The entry is committed once this returns.
    pub fn append(&mut self, entry: &JournalEntry) -> Result<(), JournalError> {
        let line = format!(
            "{}|{}|{}|{}|{}|{}|{}|{}\n",
            entry.id,
            entry.ts,
            entry.kind,
            entry.dr,
            entry.cr,
            entry.amount.as_micros(),
            sanitize(&entry.reference),
            sanitize(&entry.description),
        );
        self.writer
            .write_all(line.as_bytes())
            .and_then(|()| self.writer.flush())
            .map_err(|source| JournalError::Io {
                path: self.path.clone(),
                source,
            })
    }

    /// Read the whole journal back, skipping malformed lines.
    pub fn read_all(path: &Path) -> Result<ReplayRead, JournalError> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ReplayRead {
                    entries: Vec::new(),
                    skipped: 0,
                });
            }
            Err(source) => {
                return Err(JournalError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        let reader = BufReader::new(file);
        let mut entries = Vec::new();
        let mut skipped = 0u64;
        for line in reader.lines() {
            let line = line.map_err(|source| JournalError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            if line.is_empty() {
                continue;
            }
            match parse_line(&line) {
                Some(entry) => entries.push(entry),
                None => {
                    skipped += 1;
                    warn!(journal = %path.display(), line, "skipping corrupt journal line");
                }
            }
        }
        Ok(ReplayRead { entries, skipped })
    }
}

/// The field separator cannot appear inside a field.
fn sanitize(field: &str) -> String {
    if field.contains('|') || field.contains('\n') {
        field.replace(['|', '\n'], ";")
    } else {
        field.to_string()
    }
}

fn parse_line(line: &str) -> Option<JournalEntry> {
    let fields: Vec<&str> = line.splitn(8, '|').collect();
    if fields.len() < 6 {
        return None;
    }
    let id = fields[0].parse::<u64>().ok()?;
    let ts = fields[1].parse::<u64>().ok()?;
    let kind = fields[2].parse::<EventKind>().ok()?;
    let dr = fields[3].to_string();
    let cr = fields[4].to_string();
    let amount = Money::from_micros(fields[5].parse::<i64>().ok()?);
    let reference = fields.get(6).map(|s| s.to_string()).unwrap_or_default();
    let description = fields.get(7).map(|s| s.to_string()).unwrap_or_default();
    Some(JournalEntry {
        id,
        ts,
        kind,
        dr,
        cr,
        amount,
        reference,
        description,
    })
}
