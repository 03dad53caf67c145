//! Per-user margin accounts.
//!
//! `balance` is the user's total cash with the exchange (free plus locked);
//! the locked portion is tracked in the margin counters. Equity adds
//! unrealized P&L on top of cash, and available is what is left after
//! margin claims:
//!
//! ```text
//! equity    = balance + unrealized
//! available = equity - position_margin - order_margin
//! ```
//!
//! The ledger mirrors the free/locked split through the customer's
//! `:Balance` and `:Margin` liability accounts.

use crate::money::Money;
use serde::Serialize;

/// Mutable account state owned by the position manager.
#[derive(Debug, Clone, Serialize)]
pub struct UserAccount {
    /// User id.
    pub id: u64,
    /// Total cash with the exchange (free plus locked margin).
    pub balance: Money,
    /// Margin locked against open positions.
    pub position_margin: Money,
    /// Margin reserved for resting (unfilled) orders.
    pub order_margin: Money,
    /// Whether the account may trade.
    pub active: bool,
}

impl UserAccount {
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self {
            id,
            balance: Money::ZERO,
            position_margin: Money::ZERO,
            order_margin: Money::ZERO,
            active: true,
        }
    }

    /// Cash plus unrealized P&L.
    #[must_use]
    #[inline]
    pub fn equity(&self, unrealized: Money) -> Money {
        self.balance + unrealized
    }

    /// Equity not claimed by any margin.
    #[must_use]
    #[inline]
    pub fn available(&self, unrealized: Money) -> Money {
        self.equity(unrealized) - self.position_margin - self.order_margin
    }

    /// Equity over position margin, in parts per million. `None` when no
    /// position margin is locked. Below one million the account is a
    /// liquidation candidate.
    #[must_use]
    pub fn margin_ratio_ppm(&self, unrealized: Money) -> Option<i64> {
        if self.position_margin.is_zero() {
            return None;
        }
        let equity = self.equity(unrealized).as_micros() as i128;
        let margin = self.position_margin.as_micros() as i128;
        Some(((equity * crate::money::RATE_SCALE as i128) / margin) as i64)
    }
}

/// Read-model of an account, with derived fields filled in.
#[derive(Debug, Clone, Serialize)]
pub struct AccountView {
    /// User id.
    pub user: u64,
    /// Total cash with the exchange.
    pub balance: Money,
    /// Sum of unrealized P&L across open positions.
    pub unrealized: Money,
    /// Cash plus unrealized P&L.
    pub equity: Money,
    /// Margin locked against positions.
    pub position_margin: Money,
    /// Margin reserved for resting orders.
    pub order_margin: Money,
    /// Equity minus all margin claims.
    pub available: Money,
    /// Equity over position margin in parts per million, if margined.
    pub margin_ratio_ppm: Option<i64>,
    /// Number of open positions.
    pub open_positions: usize,
}
