//! Open margined positions.

use crate::money::{Money, signed_notional};
use serde::Serialize;

/// One open position keyed by `(user, symbol)`.
///
/// Size is signed in `QTY_SCALE` units: long positive, short negative. A
/// position whose size reaches zero is removed by the manager.
#[derive(Debug, Clone, Serialize)]
pub struct Position {
    /// Owning user id.
    pub user: u64,
    /// Instrument symbol.
    pub symbol: String,
    /// Signed size, `QTY_SCALE` units.
    pub size: i64,
    /// Notional-weighted average entry price, micro-MNT.
    pub entry_price: u64,
    /// Margin locked against this position.
    pub margin: Money,
    /// Cumulative realized P&L over the position's lifetime.
    pub realized_pnl: Money,
    /// Creation timestamp, micros.
    pub opened_at: u64,
    /// Last mutation timestamp, micros.
    pub updated_at: u64,
}

impl Position {
    /// Unrealized P&L at `mark`: `size * (mark - entry)` in position units.
    #[must_use]
    pub fn unrealized(&self, mark: u64) -> Money {
        signed_notional(mark, self.size) - signed_notional(self.entry_price, self.size)
    }

    /// Absolute size.
    #[must_use]
    #[inline]
    pub fn abs_size(&self) -> u64 {
        self.size.unsigned_abs()
    }

    /// True for long positions.
    #[must_use]
    #[inline]
    pub fn is_long(&self) -> bool {
        self.size > 0
    }
}
