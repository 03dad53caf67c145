//! Human-readable audit ledgers, one file per stream.
//!
//! These are operator-facing companions to the accounting journal: plain
//! text, `#`-commented, append-only. They are best-effort; a write failure
//! is logged but never stops trading (the journal alone is authoritative).

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use tracing::warn;

/// The audit streams written by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedgerStream {
    /// One line per executed trade.
    Trades,
    /// Margin locks, releases and reserves.
    Margin,
    /// Funding settlements.
    Funding,
    /// Liquidations, bankruptcies and deleveraging.
    Liquidations,
    /// Mark and last price updates.
    Prices,
}

impl LedgerStream {
    fn file_name(self) -> &'static str {
        match self {
            LedgerStream::Trades => "trades.ledger",
            LedgerStream::Margin => "margin.ledger",
            LedgerStream::Funding => "funding.ledger",
            LedgerStream::Liquidations => "liquidations.ledger",
            LedgerStream::Prices => "prices.ledger",
        }
    }
}

/// Lazily opened per-stream audit files under one directory.
pub struct LedgerFiles {
    dir: PathBuf,
    files: HashMap<LedgerStream, File>,
    enabled: bool,
}

impl LedgerFiles {
    /// Create the writer rooted at `dir`. The directory is created on
    /// first write.
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            files: HashMap::new(),
            enabled: true,
        }
    }

    /// A writer that drops everything; used by tests that do not care
    /// about audit output.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            dir: PathBuf::new(),
            files: HashMap::new(),
            enabled: false,
        }
    }

    /// Append one record line to a stream.
    pub fn write(&mut self, stream: LedgerStream, line: &str) {
        self.append(stream, line, false);
    }

    /// Append a `#`-prefixed audit comment to a stream.
    pub fn comment(&mut self, stream: LedgerStream, text: &str) {
        self.append(stream, text, true);
    }

    fn append(&mut self, stream: LedgerStream, text: &str, comment: bool) {
        if !self.enabled {
            return;
        }
        if !self.files.contains_key(&stream) {
            match self.open_stream(stream) {
                Ok(file) => {
                    self.files.insert(stream, file);
                }
                Err(e) => {
                    warn!(stream = ?stream, error = %e, "audit ledger unavailable");
                    return;
                }
            }
        }
        if let Some(file) = self.files.get_mut(&stream) {
            let prefix = if comment { "# " } else { "" };
            if let Err(e) = writeln!(file, "{prefix}{text}") {
                warn!(stream = ?stream, error = %e, "audit ledger write failed");
            }
        }
    }

    fn open_stream(&self, stream: LedgerStream) -> std::io::Result<File> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(stream.file_name());
        let fresh = !path.exists();
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        if fresh {
            writeln!(file, "# {} audit ledger", stream.file_name())?;
            writeln!(file, "# fields are space-separated; lines starting with # are comments")?;
        }
        Ok(file)
    }
}
