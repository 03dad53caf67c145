//! Double-entry accounting: chart of accounts, atomic posting batches and
//! the append-only, replayable journal.

mod account;
mod engine;
mod journal;
mod posting;

pub use account::{AccountType, LedgerAccount, paths};
pub use engine::{AccountingEngine, BalanceSheet, IncomeStatement};
pub use journal::{FileJournal, JournalError, ReplayRead};
pub use posting::{EventKind, JournalEntry, Posting};
