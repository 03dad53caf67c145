//! The core matching walk.
//!
//! An incoming order consumes the opposite side level by level, best price
//! first, FIFO within each level. The walk only mutates book structures;
//! settlement (positions, fees, journal postings) happens downstream from
//! the returned fills.

use super::book::OrderBook;
use super::order::{Order, OrderKind, Side};
use crate::money::Qty;
use tracing::trace;

/// One maker execution produced by the matching walk.
///
/// Quantity never exceeds either participant's remaining at the moment of
/// execution; the walk decrements both before emitting the fill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fill {
    /// Resting order that was hit.
    pub maker_order_id: u64,
    /// Owner of the resting order.
    pub maker_user: u64,
    /// Execution price (the maker's level price).
    pub price: u64,
    /// Executed quantity.
    pub quantity: Qty,
    /// Maker's remaining quantity after this fill.
    pub maker_remaining: Qty,
    /// True when the maker was fully filled and left the book.
    pub maker_done: bool,
}

impl OrderBook {
    /// Match `taker` against the opposite side, mutating the book and the
    /// taker's remaining quantity.
    ///
    /// Market orders ignore price; price-bearing kinds stop at the taker's
    /// limit. The caller decides what happens to any unfilled remainder
    /// (rest, cancel, or reject) according to the order kind.
    pub fn match_incoming(&mut self, taker: &mut Order) -> Vec<Fill> {
        let limit = match taker.kind {
            OrderKind::Market => None,
            _ => taker.limit_price,
        };
        let symbol = taker.symbol.clone();
        let mut fills: Vec<Fill> = Vec::new();

        while !taker.remaining.is_zero() {
            let best = match taker.side {
                Side::Buy => self.asks.keys().next().copied(),
                Side::Sell => self.bids.keys().next_back().copied(),
            };
            let Some(price) = best else { break };

            if let Some(limit) = limit {
                let acceptable = match taker.side {
                    Side::Buy => price <= limit,
                    Side::Sell => price >= limit,
                };
                if !acceptable {
                    break;
                }
            }

            let levels = match taker.side {
                Side::Buy => &mut self.asks,
                Side::Sell => &mut self.bids,
            };
            let Some(level) = levels.get_mut(&price) else {
                break;
            };

            // FIFO within the level: earlier orders fill first; a partial
            // fill keeps the maker at the front of the queue.
            while !taker.remaining.is_zero() {
                let Some(&slot) = level.queue.front() else {
                    break;
                };
                let Some(maker) = self.arena.get_mut(slot) else {
                    // Stale slot; drop it and keep walking.
                    level.queue.pop_front();
                    continue;
                };

                let fill_qty = taker.remaining.min(maker.remaining);
                maker.apply_fill(fill_qty);
                taker.apply_fill(fill_qty);
                level.total = level.total.saturating_sub(fill_qty);

                let maker_id = maker.id;
                let maker_user = maker.user;
                let maker_remaining = maker.remaining;
                let maker_done = maker_remaining.is_zero();

                fills.push(Fill {
                    maker_order_id: maker_id,
                    maker_user,
                    price,
                    quantity: fill_qty,
                    maker_remaining,
                    maker_done,
                });
                trace!(
                    %symbol,
                    taker = taker.id,
                    maker = maker_id,
                    price,
                    qty = %fill_qty,
                    "fill"
                );

                if maker_done {
                    level.queue.pop_front();
                    self.locations.remove(&maker_id);
                    self.arena.remove(slot);
                }
            }

            let empty = level.queue.is_empty();
            if empty {
                levels.remove(&price);
            }
            // A non-empty level with taker quantity left means the taker is
            // done at this price; the outer while will exit via remaining
            // or the limit check.
            if !empty && !taker.remaining.is_zero() {
                break;
            }
        }

        if let Some(last) = fills.last() {
            self.record_trade_price(last.price);
        }
        fills
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orderbook::order::OrderStatus;

    fn limit(id: u64, user: u64, side: Side, price: u64, units: u64) -> Order {
        Order {
            id,
            user,
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

    fn market(id: u64, user: u64, side: Side, units: u64) -> Order {
        Order {
            id,
            user,
            symbol: "XAU-SPOT".to_string(),
            side,
            kind: OrderKind::Market,
            limit_price: None,
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
    fn test_full_fill_single_level() {
        let mut book = OrderBook::new("XAU-SPOT");
        book.rest_order(limit(1, 10, Side::Sell, 100, 1));
        let mut taker = limit(2, 20, Side::Buy, 100, 1);
        let fills = book.match_incoming(&mut taker);
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].price, 100);
        assert_eq!(fills[0].quantity, Qty::from_units(1));
        assert!(fills[0].maker_done);
        assert!(taker.remaining.is_zero());
        assert_eq!(taker.status, OrderStatus::Filled);
        assert_eq!(book.order_count(), 0);
        assert_eq!(book.last_trade_price(), Some(100));
    }

    #[test]
    fn test_price_time_priority_within_level() {
        let mut book = OrderBook::new("XAU-SPOT");
        book.rest_order(limit(1, 10, Side::Sell, 100, 1));
        book.rest_order(limit(2, 11, Side::Sell, 100, 1));
        book.rest_order(limit(3, 12, Side::Sell, 100, 1));
        let mut taker = limit(4, 20, Side::Buy, 100, 2);
        let fills = book.match_incoming(&mut taker);
        assert_eq!(fills.len(), 2);
        assert_eq!(fills[0].maker_order_id, 1);
        assert_eq!(fills[1].maker_order_id, 2);
        // Order 3 keeps its place at the level.
        assert_eq!(book.order(3).unwrap().remaining, Qty::from_units(1));
    }

    #[test]
    fn test_better_price_fills_first() {
        let mut book = OrderBook::new("XAU-SPOT");
        book.rest_order(limit(1, 10, Side::Sell, 105, 1));
        book.rest_order(limit(2, 11, Side::Sell, 100, 1));
        let mut taker = limit(3, 20, Side::Buy, 105, 2);
        let fills = book.match_incoming(&mut taker);
        assert_eq!(fills.len(), 2);
        assert_eq!(fills[0].price, 100);
        assert_eq!(fills[1].price, 105);
    }

    #[test]
    fn test_limit_respects_price() {
        let mut book = OrderBook::new("XAU-SPOT");
        book.rest_order(limit(1, 10, Side::Sell, 100, 1));
        book.rest_order(limit(2, 11, Side::Sell, 110, 1));
        let mut taker = limit(3, 20, Side::Buy, 105, 2);
        let fills = book.match_incoming(&mut taker);
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].price, 100);
        assert_eq!(taker.remaining, Qty::from_units(1));
        assert_eq!(book.best_ask(), Some(110));
    }

    #[test]
    fn test_partial_fill_keeps_queue_position() {
        let mut book = OrderBook::new("XAU-SPOT");
        book.rest_order(limit(1, 10, Side::Sell, 100, 5));
        book.rest_order(limit(2, 11, Side::Sell, 100, 5));
        let mut taker = market(3, 20, Side::Buy, 2);
        let fills = book.match_incoming(&mut taker);
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].maker_order_id, 1);
        assert_eq!(fills[0].maker_remaining, Qty::from_units(3));
        assert!(!fills[0].maker_done);
        // Next taker hits the same maker first.
        let mut taker2 = market(4, 21, Side::Buy, 4);
        let fills2 = book.match_incoming(&mut taker2);
        assert_eq!(fills2[0].maker_order_id, 1);
        assert_eq!(fills2[0].quantity, Qty::from_units(3));
        assert!(fills2[0].maker_done);
        assert_eq!(fills2[1].maker_order_id, 2);
    }

    #[test]
    fn test_market_order_sweeps_levels() {
        let mut book = OrderBook::new("XAU-SPOT");
        book.rest_order(limit(1, 10, Side::Sell, 100, 1));
        book.rest_order(limit(2, 11, Side::Sell, 101, 1));
        book.rest_order(limit(3, 12, Side::Sell, 102, 1));
        let mut taker = market(4, 20, Side::Buy, 5);
        let fills = book.match_incoming(&mut taker);
        assert_eq!(fills.len(), 3);
        assert_eq!(taker.remaining, Qty::from_units(2));
        assert_eq!(book.best_ask(), None);
    }

    #[test]
    fn test_market_order_against_empty_book() {
        let mut book = OrderBook::new("XAU-SPOT");
        let mut taker = market(1, 20, Side::Buy, 5);
        let fills = book.match_incoming(&mut taker);
        assert!(fills.is_empty());
        assert_eq!(taker.remaining, Qty::from_units(5));
        assert_eq!(book.last_trade_price(), None);
    }

    #[test]
    fn test_sell_taker_walks_bids_descending() {
        let mut book = OrderBook::new("XAU-SPOT");
        book.rest_order(limit(1, 10, Side::Buy, 95, 1));
        book.rest_order(limit(2, 11, Side::Buy, 100, 1));
        let mut taker = limit(3, 20, Side::Sell, 95, 2);
        let fills = book.match_incoming(&mut taker);
        assert_eq!(fills.len(), 2);
        assert_eq!(fills[0].price, 100);
        assert_eq!(fills[1].price, 95);
        assert!(taker.remaining.is_zero());
    }

    #[test]
    fn test_no_phantom_fills() {
        let mut book = OrderBook::new("XAU-SPOT");
        book.rest_order(limit(1, 10, Side::Sell, 100, 3));
        let mut taker = limit(2, 20, Side::Buy, 100, 10);
        let fills = book.match_incoming(&mut taker);
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].quantity, Qty::from_units(3));
        assert_eq!(taker.remaining, Qty::from_units(7));
    }
}
