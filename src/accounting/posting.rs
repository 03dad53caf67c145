//! Posting primitives: event kinds and balanced posting legs.

use crate::money::Money;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The economic event a journal batch records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// Customer funds entering the exchange.
    Deposit,
    /// Customer funds leaving the exchange.
    Withdrawal,
    /// Value transfer of a spot trade.
    Trade,
    /// Explicit fee or spread revenue on a trade.
    TradeFee,
    /// Realized profit or loss settled to a customer.
    RealizedPnl,
    /// Initial margin moved from balance to locked margin.
    MarginLock,
    /// Locked margin returned to balance.
    MarginRelease,
    /// Generic customer-to-customer or internal transfer.
    Transfer,
    /// Funding, VAT accrual, insurance contribution or ADL settlement;
    /// the record description names which.
    Adjustment,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventKind::Deposit => "deposit",
            EventKind::Withdrawal => "withdrawal",
            EventKind::Trade => "trade",
            EventKind::TradeFee => "trade_fee",
            EventKind::RealizedPnl => "realized_pnl",
            EventKind::MarginLock => "margin_lock",
            EventKind::MarginRelease => "margin_release",
            EventKind::Transfer => "transfer",
            EventKind::Adjustment => "adjustment",
        };
        write!(f, "{s}")
    }
}

impl FromStr for EventKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "deposit" => EventKind::Deposit,
            "withdrawal" => EventKind::Withdrawal,
            "trade" => EventKind::Trade,
            "trade_fee" => EventKind::TradeFee,
            "realized_pnl" => EventKind::RealizedPnl,
            "margin_lock" => EventKind::MarginLock,
            "margin_release" => EventKind::MarginRelease,
            "transfer" => EventKind::Transfer,
            "adjustment" => EventKind::Adjustment,
            _ => return Err(()),
        })
    }
}

/// One balanced posting leg: debit one account, credit another, same amount.
///
/// A batch of legs is atomic; the signed sum of a single leg is zero by
/// construction, which is what keeps `sum(debits) == sum(credits)` over any
/// accepted batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    /// Debited account path.
    pub dr: String,
    /// Credited account path.
    pub cr: String,
    /// Non-negative amount in micro-MNT.
    pub amount: Money,
}

impl Posting {
    #[must_use]
    pub fn new(dr: impl Into<String>, cr: impl Into<String>, amount: Money) -> Self {
        Self {
            dr: dr.into(),
            cr: cr.into(),
            amount,
        }
    }
}

/// A fully described journal record as persisted and replayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Globally monotonic entry id.
    pub id: u64,
    /// Posting timestamp, micros since epoch.
    pub ts: u64,
    /// The economic event this leg belongs to.
    pub kind: EventKind,
    /// Debited account path.
    pub dr: String,
    /// Credited account path.
    pub cr: String,
    /// Leg amount in micro-MNT.
    pub amount: Money,
    /// Correlation reference (trade id, order id, liquidation tag, ...).
    pub reference: String,
    /// Human-readable description.
    pub description: String,
}
