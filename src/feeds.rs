//! Traits for the external collaborators the core consumes.
//!
//! The implementations live outside this crate (network feeds, broker
//! gateways); the core only defines the seams and the payload shapes it
//! honors.

use crate::money::Qty;
use serde::{Deserialize, Serialize};

/// One quote published by the external price feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Quoted symbol.
    pub symbol: String,
    /// Bid price, micro-MNT.
    pub bid: u64,
    /// Ask price, micro-MNT.
    pub ask: u64,
    /// Mid price, micro-MNT; used as the mark price.
    pub mid: u64,
    /// Quote timestamp, micros since epoch.
    pub ts: u64,
}

/// Subscription control for the external price feed. Quotes arrive through
/// the callback the composition root wires to
/// [`crate::engine::ExchangeCore::on_quote`].
pub trait PriceFeed: Send {
    /// Begin receiving quotes for `symbol`.
    fn subscribe(&mut self, symbol: &str);

    /// Stop receiving quotes for `symbol`.
    fn unsubscribe(&mut self, symbol: &str);
}

/// A reference exchange rate (MNT per USD) from the external bank feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateQuote {
    /// MNT per USD.
    pub rate: f64,
    /// Where the rate came from.
    pub source: String,
    /// Rate timestamp, micros since epoch.
    pub ts: u64,
    /// False when the feed considers the rate stale.
    pub valid: bool,
}

/// The external FX reference-rate feed.
pub trait ReferenceRateFeed: Send {
    /// The current reference rate.
    fn get_rate(&self) -> RateQuote;
}

/// A fill reported back by the hedging backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HedgeFill {
    /// Hedged symbol.
    pub symbol: String,
    /// Signed filled quantity, `QTY_SCALE` units.
    pub filled: i64,
    /// Average fill price, micro-MNT.
    pub price: u64,
    /// Fill timestamp, micros since epoch.
    pub ts: u64,
}

/// The external hedging venue. The core decides when and how much to
/// hedge; this backend executes.
pub trait HedgeBackend: Send {
    /// Execute a hedge of `signed_qty` on `symbol`.
    fn execute_hedge(&mut self, symbol: &str, signed_qty: i64, reason: &str) -> HedgeFill;

    /// The backend's current position on `symbol`, signed.
    fn get_position(&self, symbol: &str) -> i64;

    /// The backend's lot size for `symbol`; hedge quantities are rounded
    /// down to it.
    fn lot_size(&self, symbol: &str) -> Qty;
}
