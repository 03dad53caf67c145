//! The double-entry accounting engine.
//!
//! Every economic event arrives as one atomic batch of posting legs. Each
//! leg is written to the journal first (write-ahead), then applied to the
//! in-memory balances, so the journal is the authoritative record and
//! replaying it reconstructs balances byte for byte.
//!
//! A failed journal write poisons the engine: callers must stop accepting
//! orders. A reconciliation mismatch only flags and logs; the triggering
//! trade is already final.

use super::account::{AccountType, LedgerAccount};
use super::journal::{FileJournal, JournalError};
use super::posting::{EventKind, JournalEntry, Posting};
use crate::error::CoreError;
use crate::money::Money;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, error, warn};

/// Aggregated balance-sheet view.
#[derive(Debug, Clone, Serialize)]
pub struct BalanceSheet {
    /// Asset accounts and balances.
    pub assets: Vec<(String, Money)>,
    /// Liability accounts and balances.
    pub liabilities: Vec<(String, Money)>,
    /// Equity accounts and balances.
    pub equity: Vec<(String, Money)>,
    /// Sum of asset balances.
    pub total_assets: Money,
    /// Sum of liability balances.
    pub total_liabilities: Money,
    /// Sum of equity balances.
    pub total_equity: Money,
}

/// Aggregated income-statement view.
#[derive(Debug, Clone, Serialize)]
pub struct IncomeStatement {
    /// Revenue accounts and balances.
    pub revenue: Vec<(String, Money)>,
    /// Expense accounts and balances.
    pub expenses: Vec<(String, Money)>,
    /// Total revenue minus total expenses.
    pub net_income: Money,
}

/// Event-sourced account balances plus the append-only journal.
pub struct AccountingEngine {
    accounts: HashMap<String, LedgerAccount>,
    entries: Vec<JournalEntry>,
    journal: FileJournal,
    next_id: u64,
    postings_since_check: u64,
    reconcile_every: u64,
    out_of_balance: bool,
    poisoned: bool,
    replay_skipped: u64,
}

impl AccountingEngine {
    /// Open the journal at `path`, replay it, and refuse startup if the
    /// accounting identity does not hold afterwards.
    pub fn open(path: &Path, reconcile_every: u64) -> Result<Self, CoreError> {
        let read = FileJournal::read_all(path)?;
        let journal = FileJournal::open(path)?;
        let mut engine = Self {
            accounts: HashMap::new(),
            entries: Vec::with_capacity(read.entries.len()),
            journal,
            next_id: 1,
            postings_since_check: 0,
            reconcile_every: reconcile_every.max(1),
            out_of_balance: false,
            poisoned: false,
            replay_skipped: read.skipped,
        };
        for entry in read.entries {
            engine.next_id = engine.next_id.max(entry.id + 1);
            engine.apply(&entry);
            engine.entries.push(entry);
        }
        let (left, right) = engine.identity_sums();
        if left != right {
            return Err(CoreError::ReplayIdentity { left, right });
        }
        debug!(
            entries = engine.entries.len(),
            skipped = engine.replay_skipped,
            "journal replayed"
        );
        Ok(engine)
    }

    /// True after a fatal journal write failure; order intake must stop.
    #[must_use]
    #[inline]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// True when a periodic reconciliation found the identity broken.
    #[must_use]
    #[inline]
    pub fn is_out_of_balance(&self) -> bool {
        self.out_of_balance
    }

    /// Lines skipped during the last replay.
    #[must_use]
    #[inline]
    pub fn replay_skipped(&self) -> u64 {
        self.replay_skipped
    }

    /// Post one atomic batch of legs.
    ///
    /// Legs with a negative amount are normalized by swapping debit and
    /// credit, so callers can pass signed P&L without branching. Returns
    /// the id of the first leg. On a journal failure the engine is
    /// poisoned and nothing from the failed batch is applied to balances.
    pub fn post_batch(
        &mut self,
        ts: u64,
        kind: EventKind,
        postings: &[Posting],
        reference: &str,
        description: &str,
    ) -> Result<u64, JournalError> {
        let mut batch: Vec<JournalEntry> = Vec::with_capacity(postings.len());
        let first_id = self.next_id;
        for posting in postings {
            if posting.amount.is_zero() {
                continue;
            }
            let (dr, cr, amount) = if posting.amount.is_negative() {
                (posting.cr.clone(), posting.dr.clone(), -posting.amount)
            } else {
                (posting.dr.clone(), posting.cr.clone(), posting.amount)
            };
            batch.push(JournalEntry {
                id: self.next_id + batch.len() as u64,
                ts,
                kind,
                dr,
                cr,
                amount,
                reference: reference.to_string(),
                description: description.to_string(),
            });
        }

        // Write-ahead: all legs hit the journal before any balance moves.
        for entry in &batch {
            if let Err(e) = self.journal.append(entry) {
                self.poisoned = true;
                error!(error = %e, "journal append failed; stopping order intake");
                return Err(e);
            }
        }
        self.next_id += batch.len() as u64;
        for entry in batch {
            self.apply(&entry);
            self.entries.push(entry);
            self.postings_since_check += 1;
        }
        if self.postings_since_check >= self.reconcile_every {
            self.reconcile();
        }
        Ok(first_id)
    }

    fn apply(&mut self, entry: &JournalEntry) {
        let amount = entry.amount;
        self.account_mut(&entry.dr).debit(amount);
        self.account_mut(&entry.cr).credit(amount);
    }

    fn account_mut(&mut self, path: &str) -> &mut LedgerAccount {
        self.accounts
            .entry(path.to_string())
            .or_insert_with(|| LedgerAccount::new(path))
    }

    /// Current balance of an account; zero when it has never been posted.
    #[must_use]
    pub fn balance(&self, path: &str) -> Money {
        self.accounts
            .get(path)
            .map(|a| a.balance)
            .unwrap_or(Money::ZERO)
    }

    /// Borrow a ledger account, if it exists.
    #[must_use]
    pub fn account(&self, path: &str) -> Option<&LedgerAccount> {
        self.accounts.get(path)
    }

    /// Sums of the two sides of `Assets + Expenses = Liabilities + Equity
    /// + Revenue`.
    #[must_use]
    pub fn identity_sums(&self) -> (Money, Money) {
        let mut left = Money::ZERO;
        let mut right = Money::ZERO;
        for account in self.accounts.values() {
            if account.account_type.is_left_side() {
                left += account.balance;
            } else {
                right += account.balance;
            }
        }
        (left, right)
    }

    /// Verify the accounting identity; log and flag on mismatch.
    pub fn reconcile(&mut self) {
        self.postings_since_check = 0;
        let (left, right) = self.identity_sums();
        if left != right {
            self.out_of_balance = true;
            warn!(%left, %right, "accounting identity mismatch flagged");
        }
    }

    /// All journal entries touching `path`, in posting order.
    #[must_use]
    pub fn entries_for_account(&self, path: &str) -> Vec<&JournalEntry> {
        self.entries
            .iter()
            .filter(|e| e.dr == path || e.cr == path)
            .collect()
    }

    /// Journal entries with ids in `[from, to]`.
    #[must_use]
    pub fn entries_in_range(&self, from: u64, to: u64) -> Vec<&JournalEntry> {
        self.entries
            .iter()
            .filter(|e| e.id >= from && e.id <= to)
            .collect()
    }

    /// Total number of posted legs.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Aggregate the balance sheet from current balances.
    #[must_use]
    pub fn balance_sheet(&self) -> BalanceSheet {
        let mut sheet = BalanceSheet {
            assets: Vec::new(),
            liabilities: Vec::new(),
            equity: Vec::new(),
            total_assets: Money::ZERO,
            total_liabilities: Money::ZERO,
            total_equity: Money::ZERO,
        };
        for account in self.accounts.values() {
            match account.account_type {
                AccountType::Asset => {
                    sheet.total_assets += account.balance;
                    sheet.assets.push((account.path.clone(), account.balance));
                }
                AccountType::Liability => {
                    sheet.total_liabilities += account.balance;
                    sheet
                        .liabilities
                        .push((account.path.clone(), account.balance));
                }
                AccountType::Equity => {
                    sheet.total_equity += account.balance;
                    sheet.equity.push((account.path.clone(), account.balance));
                }
                AccountType::Revenue | AccountType::Expense => {}
            }
        }
        sheet.assets.sort();
        sheet.liabilities.sort();
        sheet.equity.sort();
        sheet
    }

    /// Aggregate the income statement from current balances.
    #[must_use]
    pub fn income_statement(&self) -> IncomeStatement {
        let mut revenue = Vec::new();
        let mut expenses = Vec::new();
        let mut net = Money::ZERO;
        for account in self.accounts.values() {
            match account.account_type {
                AccountType::Revenue => {
                    net += account.balance;
                    revenue.push((account.path.clone(), account.balance));
                }
                AccountType::Expense => {
                    net -= account.balance;
                    expenses.push((account.path.clone(), account.balance));
                }
                _ => {}
            }
        }
        revenue.sort();
        expenses.sort();
        IncomeStatement {
            revenue,
            expenses,
            net_income: net,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounting::account::paths;
    use tempfile::tempdir;

    fn engine(dir: &tempfile::TempDir) -> AccountingEngine {
        AccountingEngine::open(&dir.path().join("journal.log"), 100).unwrap()
    }

    fn deposit(engine: &mut AccountingEngine, user: u64, mnt: i64) {
        engine
            .post_batch(
                1,
                EventKind::Deposit,
                &[Posting::new(
                    paths::CASH,
                    paths::customer_balance(user),
                    Money::from_mnt(mnt),
                )],
                "dep",
                "customer deposit",
            )
            .unwrap();
    }

    #[test]
    fn test_deposit_moves_both_sides() {
        let dir = tempdir().unwrap();
        let mut engine = engine(&dir);
        deposit(&mut engine, 1, 1_000_000);
        assert_eq!(engine.balance(paths::CASH), Money::from_mnt(1_000_000));
        assert_eq!(
            engine.balance(&paths::customer_balance(1)),
            Money::from_mnt(1_000_000)
        );
        let (left, right) = engine.identity_sums();
        assert_eq!(left, right);
    }

    #[test]
    fn test_negative_amount_flips_legs() {
        let dir = tempdir().unwrap();
        let mut engine = engine(&dir);
        deposit(&mut engine, 1, 100);
        // Negative realized pnl: the customer pays the pool.
        engine
            .post_batch(
                2,
                EventKind::RealizedPnl,
                &[Posting::new(
                    paths::PNL_POOL,
                    paths::customer_balance(1),
                    Money::from_mnt(-30),
                )],
                "pnl",
                "realized loss",
            )
            .unwrap();
        assert_eq!(engine.balance(&paths::customer_balance(1)), Money::from_mnt(70));
        let (left, right) = engine.identity_sums();
        assert_eq!(left, right);
    }

    #[test]
    fn test_zero_legs_are_dropped() {
        let dir = tempdir().unwrap();
        let mut engine = engine(&dir);
        let before = engine.entry_count();
        engine
            .post_batch(
                1,
                EventKind::Transfer,
                &[Posting::new("Assets:Cash", "Equity:Capital", Money::ZERO)],
                "t",
                "noop",
            )
            .unwrap();
        assert_eq!(engine.entry_count(), before);
    }

    #[test]
    fn test_replay_restores_balances_and_next_id() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.log");
        {
            let mut engine = AccountingEngine::open(&path, 100).unwrap();
            deposit(&mut engine, 1, 500);
            deposit(&mut engine, 2, 700);
            engine
                .post_batch(
                    5,
                    EventKind::Transfer,
                    &[Posting::new(
                        paths::customer_balance(2),
                        paths::customer_balance(1),
                        Money::from_mnt(100),
                    )],
                    "xfer",
                    "",
                )
                .unwrap();
        }
        let replayed = AccountingEngine::open(&path, 100).unwrap();
        assert_eq!(replayed.balance(&paths::customer_balance(1)), Money::from_mnt(600));
        assert_eq!(replayed.balance(&paths::customer_balance(2)), Money::from_mnt(600));
        assert_eq!(replayed.balance(paths::CASH), Money::from_mnt(1_200));
        assert_eq!(replayed.entry_count(), 3);
        let (left, right) = replayed.identity_sums();
        assert_eq!(left, right);
    }

    #[test]
    fn test_entry_queries() {
        let dir = tempdir().unwrap();
        let mut engine = engine(&dir);
        deposit(&mut engine, 1, 100);
        deposit(&mut engine, 2, 100);
        assert_eq!(engine.entries_for_account(&paths::customer_balance(1)).len(), 1);
        assert_eq!(engine.entries_in_range(1, 2).len(), 2);
        assert_eq!(engine.entries_in_range(2, 2).len(), 1);
    }

    #[test]
    fn test_balance_sheet_and_income_statement() {
        let dir = tempdir().unwrap();
        let mut engine = engine(&dir);
        deposit(&mut engine, 1, 1_000);
        engine
            .post_batch(
                3,
                EventKind::TradeFee,
                &[Posting::new(
                    paths::customer_balance(1),
                    paths::fee_revenue("XAU-SPOT"),
                    Money::from_mnt(10),
                )],
                "fee",
                "",
            )
            .unwrap();
        let sheet = engine.balance_sheet();
        assert_eq!(sheet.total_assets, Money::from_mnt(1_000));
        assert_eq!(sheet.total_liabilities, Money::from_mnt(990));
        let income = engine.income_statement();
        assert_eq!(income.net_income, Money::from_mnt(10));
        // Assets = Liabilities + Equity + NetIncome
        assert_eq!(
            sheet.total_assets,
            sheet.total_liabilities + sheet.total_equity + income.net_income
        );
    }
}
