//! Read-side snapshot types for the order book.

use super::book::OrderBook;
use super::order::Side;
use crate::money::Qty;
use serde::Serialize;

/// One aggregated price level in a depth snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DepthLevel {
    /// Level price in micro-MNT.
    pub price: u64,
    /// Total resting quantity at the level.
    pub qty: Qty,
}

/// Top-of-book and aggregated depth for one symbol at one instant.
#[derive(Debug, Clone, Serialize)]
pub struct DepthSnapshot {
    /// The snapshotted symbol.
    pub symbol: String,
    /// Snapshot timestamp, micros since epoch.
    pub ts: u64,
    /// Bid levels, best (highest) first.
    pub bids: Vec<DepthLevel>,
    /// Ask levels, best (lowest) first.
    pub asks: Vec<DepthLevel>,
}

/// Best bid and offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Bbo {
    /// Best bid price, if the bid side is non-empty.
    pub bid: Option<u64>,
    /// Best ask price, if the ask side is non-empty.
    pub ask: Option<u64>,
}

impl OrderBook {
    /// Snapshot the top `n` levels of both sides.
    #[must_use]
    pub fn depth(&self, n: usize, ts: u64) -> DepthSnapshot {
        let collect = |side: Side| {
            self.depth_side(side, n)
                .into_iter()
                .map(|(price, qty)| DepthLevel { price, qty })
                .collect()
        };
        DepthSnapshot {
            symbol: self.symbol().to_string(),
            ts,
            bids: collect(Side::Buy),
            asks: collect(Side::Sell),
        }
    }

    /// Current best bid and offer.
    #[must_use]
    pub fn bbo(&self) -> Bbo {
        Bbo {
            bid: self.best_bid(),
            ask: self.best_ask(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orderbook::order::{Order, OrderKind, OrderStatus};

    fn limit(id: u64, side: Side, price: u64, units: u64) -> Order {
        Order {
            id,
            user: 1,
            symbol: "XAU-SPOT".to_string(),
            side,
            kind: OrderKind::Limit,
            limit_price: Some(price),
            stop_price: None,
            quantity: Qty::from_units(units),
            remaining: Qty::from_units(units),
            status: OrderStatus::Working,
            client_ref: None,
            triggered: false,
            created_ts: 0,
        }
    }

    #[test]
    fn test_depth_snapshot_shape() {
        let mut book = OrderBook::new("XAU-SPOT");
        book.rest_order(limit(1, Side::Buy, 100, 2));
        book.rest_order(limit(2, Side::Buy, 99, 1));
        book.rest_order(limit(3, Side::Sell, 101, 3));
        let snap = book.depth(1, 7);
        assert_eq!(snap.symbol, "XAU-SPOT");
        assert_eq!(snap.ts, 7);
        assert_eq!(snap.bids.len(), 1);
        assert_eq!(snap.bids[0].price, 100);
        assert_eq!(snap.asks[0].qty, Qty::from_units(3));
        assert_eq!(book.bbo(), Bbo { bid: Some(100), ask: Some(101) });
    }

    #[test]
    fn test_empty_book_bbo() {
        let book = OrderBook::new("XAU-SPOT");
        assert_eq!(book.bbo(), Bbo { bid: None, ask: None });
        let snap = book.depth(5, 0);
        assert!(snap.bids.is_empty() && snap.asks.is_empty());
    }
}
