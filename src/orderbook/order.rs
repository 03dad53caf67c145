//! Order model: sides, order kinds, lifecycle states and the order record.

use crate::money::Qty;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side of the book an order rests on or takes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// Bid side.
    Buy,
    /// Ask side.
    Sell,
}

impl Side {
    /// The side this order matches against.
    #[must_use]
    #[inline]
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Sign convention for position deltas: buys add, sells subtract.
    #[must_use]
    #[inline]
    pub fn sign(self) -> i64 {
        match self {
            Side::Buy => 1,
            Side::Sell => -1,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// Order type; time-in-force semantics are part of the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderKind {
    /// Match at the limit or better; remainder rests.
    Limit,
    /// Match at any price; remainder is cancelled.
    Market,
    /// Match what is possible at the limit or better; cancel the rest.
    ImmediateOrCancel,
    /// Fill completely at the limit or better, or reject with zero trades.
    FillOrKill,
    /// Rest without ever matching on submission; reject if it would cross.
    PostOnly,
    /// Held until last price reaches the stop, then submitted as a limit.
    StopLimit,
}

impl OrderKind {
    /// Whether an unfilled remainder may rest on the book.
    #[must_use]
    #[inline]
    pub fn may_rest(self) -> bool {
        matches!(
            self,
            OrderKind::Limit | OrderKind::PostOnly | OrderKind::StopLimit
        )
    }

    /// Whether this kind carries a limit price.
    #[must_use]
    #[inline]
    pub fn is_price_bearing(self) -> bool {
        !matches!(self, OrderKind::Market)
    }
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderKind::Limit => "limit",
            OrderKind::Market => "market",
            OrderKind::ImmediateOrCancel => "ioc",
            OrderKind::FillOrKill => "fok",
            OrderKind::PostOnly => "post-only",
            OrderKind::StopLimit => "stop-limit",
        };
        write!(f, "{s}")
    }
}

/// Lifecycle state. Transitions are monotone toward the terminal states
/// (`Filled`, `Cancelled`, `Rejected`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Resting (or held as an untriggered stop) with full quantity.
    Working,
    /// Resting with some quantity executed.
    PartiallyFilled,
    /// Fully executed.
    Filled,
    /// Removed by the user or by policy before completion.
    Cancelled,
    /// Refused at submission; never entered the book.
    Rejected,
}

impl OrderStatus {
    /// Terminal states are removed from the book.
    #[must_use]
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }
}

/// A single order as tracked by the book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Monotonic order id assigned by the matching engine.
    pub id: u64,
    /// Owning user id.
    pub user: u64,
    /// Trading symbol.
    pub symbol: String,
    /// Buy or sell.
    pub side: Side,
    /// Order kind (includes time-in-force semantics).
    pub kind: OrderKind,
    /// Limit price in micro-MNT; `None` only for market orders.
    pub limit_price: Option<u64>,
    /// Stop trigger price for stop-limit orders.
    pub stop_price: Option<u64>,
    /// Original quantity.
    pub quantity: Qty,
    /// Unexecuted quantity; invariant `remaining <= quantity`.
    pub remaining: Qty,
    /// Lifecycle state.
    pub status: OrderStatus,
    /// Optional caller-supplied reference echoed back on events.
    pub client_ref: Option<String>,
    /// Stop orders flip this exactly once when the stop price is reached.
    pub triggered: bool,
    /// Submission timestamp, micros since epoch.
    pub created_ts: u64,
}

impl Order {
    /// Quantity executed so far.
    #[must_use]
    #[inline]
    pub fn executed(&self) -> Qty {
        self.quantity.saturating_sub(self.remaining)
    }

    /// Apply a fill of `qty`, updating remaining quantity and status.
    pub fn apply_fill(&mut self, qty: Qty) {
        self.remaining = self.remaining.saturating_sub(qty);
        self.status = if self.remaining.is_zero() {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
    }
}
