//! Typed reject codes and core error types.
//!
//! Order submissions never panic and never propagate errors across the match
//! boundary: every failure surfaces as a [`RejectReason`] the caller can
//! branch on. Infrastructure failures (journal I/O, replay) use
//! [`CoreError`].

use crate::money::{Money, Qty};
use thiserror::Error;

/// Sub-codes for pre-trade risk rejections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum RiskBreach {
    /// Limit price further from the market than the allowed band.
    #[error("order price away from market beyond allowed band")]
    AwayFromMarket,

    /// The user's realized daily loss already exceeds the configured cap.
    #[error("daily loss cap exceeded")]
    DailyLossExceeded,

    /// Per-user per-symbol position size cap would be exceeded.
    #[error("per-symbol position cap exceeded")]
    PositionCap,

    /// Global per-user notional cap would be exceeded.
    #[error("per-user notional cap exceeded")]
    NotionalCap,

    /// The user already holds the maximum number of open positions.
    #[error("max open positions reached")]
    OpenPositionsCap,

    /// Per-user order submission rate limit hit.
    #[error("order rate limit exceeded")]
    RateLimited,
}

/// Rejection reasons surfaced to order submitters.
///
/// Each variant corresponds to one reject code; the matching engine returns
/// these instead of throwing across the match boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum RejectReason {
    /// The symbol is not in the product catalog.
    #[error("unknown symbol: {symbol}")]
    UnknownSymbol {
        /// The symbol that was requested.
        symbol: String,
    },

    /// The product exists but is disabled for trading.
    #[error("product not active: {symbol}")]
    ProductNotActive {
        /// The inactive symbol.
        symbol: String,
    },

    /// Order quantity outside the product's `[min_order, max_order]` range.
    #[error("order size out of range: {qty} not in [{min}, {max}]")]
    SizeOutOfRange {
        /// The rejected quantity.
        qty: Qty,
        /// Product minimum order size.
        min: Qty,
        /// Product maximum order size.
        max: Qty,
    },

    /// Order value below the product's minimum notional.
    #[error("notional too small: {notional} below minimum {min}")]
    NotionalTooSmall {
        /// The order's notional value.
        notional: Money,
        /// Product minimum notional.
        min: Money,
    },

    /// Price is not a multiple of the product tick size.
    #[error("price {price} violates tick size {tick}")]
    InvalidTick {
        /// The rejected price in micro-MNT.
        price: u64,
        /// The product tick size.
        tick: u64,
    },

    /// Quantity is not a multiple of the product lot size.
    #[error("quantity {qty} violates lot size {lot}")]
    InvalidLot {
        /// The rejected quantity.
        qty: Qty,
        /// The product lot size.
        lot: Qty,
    },

    /// The symbol (or the whole market) is halted.
    #[error("trading halted: {symbol}")]
    Halted {
        /// The halted symbol.
        symbol: String,
    },

    /// Buys are barred while the symbol is limit-up.
    #[error("limit-up in effect: {symbol}")]
    LimitUp {
        /// The limited symbol.
        symbol: String,
    },

    /// Sells are barred while the symbol is limit-down.
    #[error("limit-down in effect: {symbol}")]
    LimitDown {
        /// The limited symbol.
        symbol: String,
    },

    /// Limit price outside the configured band around the external reference.
    #[error("price {price} outside reference band [{lower}, {upper}]")]
    BandBreach {
        /// The rejected price in micro-MNT.
        price: u64,
        /// Lower band bound.
        lower: u64,
        /// Upper band bound.
        upper: u64,
    },

    /// A pre-trade risk check failed.
    #[error("risk breach: {0}")]
    RiskBreach(#[from] RiskBreach),

    /// The user's available balance cannot cover the required initial margin.
    #[error("insufficient margin: required {required}, available {available}")]
    MarginInsufficient {
        /// Initial margin required for the order.
        required: Money,
        /// The user's available balance.
        available: Money,
    },

    /// A hard position limit at the position manager.
    #[error("position limit: {0}")]
    PositionLimit(RiskBreach),

    /// Symbol-wide open interest cap would be exceeded.
    #[error("open interest limit reached for {symbol}")]
    OpenInterestLimit {
        /// The capped symbol.
        symbol: String,
    },

    /// Fill-or-kill order could not be fully filled at acceptable prices.
    #[error("fill-or-kill unfillable: requested {requested}, available {available}")]
    UnfillableFillOrKill {
        /// Quantity requested.
        requested: Qty,
        /// Quantity available within the limit.
        available: Qty,
    },

    /// Post-only order would have matched on submission.
    #[error("post-only order would cross at {opposite_price}")]
    WouldCross {
        /// Best opposite price the order would have hit.
        opposite_price: u64,
    },

    /// Referenced order id does not exist (also returned on duplicate cancel).
    #[error("order not found: {order_id}")]
    NotFound {
        /// The unknown order id.
        order_id: u64,
    },

    /// Zero quantity or missing price on a price-bearing order type.
    #[error("malformed order: {message}")]
    Malformed {
        /// What was wrong with the submission.
        message: String,
    },

    /// The engine has stopped accepting orders after a fatal journal failure.
    #[error("order intake stopped: journal unavailable")]
    IntakeStopped,
}

/// Infrastructure errors that are not per-order rejections.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CoreError {
    /// Journal append or flush failed; the engine must stop accepting orders.
    #[error("journal write failed: {0}")]
    Journal(#[from] crate::accounting::JournalError),

    /// Replay finished but the accounting identity does not hold.
    #[error(
        "replay identity check failed: assets+expenses {left}, liabilities+equity+revenue {right}"
    )]
    ReplayIdentity {
        /// Sum of asset and expense balances.
        left: Money,
        /// Sum of liability, equity and revenue balances.
        right: Money,
    },

    /// The matcher thread is gone and the command could not be delivered.
    #[error("engine unavailable: {message}")]
    EngineUnavailable {
        /// Description of the delivery failure.
        message: String,
    },
}
