//! Per-symbol limit order book: price levels, FIFO queues, stop holding area.
//!
//! Bids and asks live in ordered maps keyed by price (bids are read in
//! descending order, asks ascending). Each level owns a FIFO queue of arena
//! slots; partial fills keep their queue position. The book is owned and
//! mutated exclusively by the matcher thread; snapshots are cheap copies
//! taken under the core read lock.

use super::arena::{OrderArena, Slot};
use super::order::{Order, Side};
use crate::money::Qty;
use either::Either;
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::trace;

/// One price level: resting orders in arrival order plus an aggregate.
#[derive(Debug, Default)]
pub(super) struct Level {
    /// Arena slots of resting orders, front = oldest.
    pub(super) queue: VecDeque<Slot>,
    /// Sum of remaining quantities at this level.
    pub(super) total: Qty,
}

/// A per-symbol limit order book.
pub struct OrderBook {
    symbol: String,
    pub(super) bids: BTreeMap<u64, Level>,
    pub(super) asks: BTreeMap<u64, Level>,
    pub(super) arena: OrderArena,
    /// Resting order id to `(price, side, slot)`.
    pub(super) locations: HashMap<u64, (u64, Side, Slot)>,
    /// Untriggered stop-limit orders by id.
    stops: HashMap<u64, Order>,
    /// Buy stop trigger index: stop price to order ids (triggers when last
    /// price rises to or through the key).
    buy_stops: BTreeMap<u64, Vec<u64>>,
    /// Sell stop trigger index (triggers when last price falls to or
    /// through the key).
    sell_stops: BTreeMap<u64, Vec<u64>>,
    last_trade_price: Option<u64>,
}

impl OrderBook {
    #[must_use]
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            arena: OrderArena::new(),
            locations: HashMap::new(),
            stops: HashMap::new(),
            buy_stops: BTreeMap::new(),
            sell_stops: BTreeMap::new(),
            last_trade_price: None,
        }
    }

    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Best bid price, if any.
    #[must_use]
    pub fn best_bid(&self) -> Option<u64> {
        self.bids.keys().next_back().copied()
    }

    /// Best ask price, if any.
    #[must_use]
    pub fn best_ask(&self) -> Option<u64> {
        self.asks.keys().next().copied()
    }

    /// Best ask minus best bid.
    #[must_use]
    pub fn spread(&self) -> Option<u64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask.saturating_sub(bid)),
            _ => None,
        }
    }

    /// Price of the most recent trade on this book.
    #[must_use]
    pub fn last_trade_price(&self) -> Option<u64> {
        self.last_trade_price
    }

    pub(super) fn record_trade_price(&mut self, price: u64) {
        self.last_trade_price = Some(price);
    }

    /// Number of live resting orders (stops excluded).
    #[must_use]
    pub fn order_count(&self) -> usize {
        self.arena.len()
    }

    /// Number of held, untriggered stop orders.
    #[must_use]
    pub fn stop_count(&self) -> usize {
        self.stops.len()
    }

    /// Iterate levels of `side` in match-priority order (best first).
    pub(super) fn levels_in_priority(
        &self,
        side: Side,
    ) -> impl Iterator<Item = (&u64, &Level)> + '_ {
        match side {
            Side::Buy => Either::Left(self.bids.iter().rev()),
            Side::Sell => Either::Right(self.asks.iter()),
        }
    }

    /// Rest an order on its side at its limit price.
    ///
    /// The order must be price-bearing; the caller has already run the
    /// matching walk, so whatever arrives here is the unfilled remainder.
    pub fn rest_order(&mut self, order: Order) {
        let price = order
            .limit_price
            .expect("resting order must carry a limit price");
        let side = order.side;
        let id = order.id;
        let remaining = order.remaining;
        let slot = self.arena.insert(order);
        let levels = match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        let level = levels.entry(price).or_default();
        level.queue.push_back(slot);
        level.total = level.total.saturating_add(remaining);
        self.locations.insert(id, (price, side, slot));
        trace!(symbol = %self.symbol, id, %side, price, "order rested");
    }

    /// Hold an untriggered stop-limit order.
    pub fn hold_stop(&mut self, order: Order) {
        let stop = order.stop_price.expect("stop order must carry a stop price");
        let index = match order.side {
            Side::Buy => &mut self.buy_stops,
            Side::Sell => &mut self.sell_stops,
        };
        index.entry(stop).or_default().push(order.id);
        trace!(symbol = %self.symbol, id = order.id, stop, "stop order held");
        self.stops.insert(order.id, order);
    }

    /// Remove an order by id, whether resting or held as a stop.
    ///
    /// Returns the removed order with its remaining quantity so the caller
    /// can release reserved margin. `None` means unknown id, which callers
    /// surface as not-found; duplicate cancels land here.
    pub fn cancel(&mut self, order_id: u64) -> Option<Order> {
        if let Some((price, side, slot)) = self.locations.remove(&order_id) {
            let order = self.arena.remove(slot)?;
            let levels = match side {
                Side::Buy => &mut self.bids,
                Side::Sell => &mut self.asks,
            };
            if let Some(level) = levels.get_mut(&price) {
                level.queue.retain(|s| *s != slot);
                level.total = level.total.saturating_sub(order.remaining);
                if level.queue.is_empty() {
                    levels.remove(&price);
                }
            }
            trace!(symbol = %self.symbol, order_id, "resting order cancelled");
            return Some(order);
        }
        if let Some(order) = self.stops.remove(&order_id) {
            let stop = order.stop_price.unwrap_or(0);
            let index = match order.side {
                Side::Buy => &mut self.buy_stops,
                Side::Sell => &mut self.sell_stops,
            };
            if let Some(ids) = index.get_mut(&stop) {
                ids.retain(|id| *id != order_id);
                if ids.is_empty() {
                    index.remove(&stop);
                }
            }
            trace!(symbol = %self.symbol, order_id, "stop order cancelled");
            return Some(order);
        }
        None
    }

    /// Borrow a resting or held order by id.
    #[must_use]
    pub fn order(&self, order_id: u64) -> Option<&Order> {
        if let Some((_, _, slot)) = self.locations.get(&order_id) {
            return self.arena.get(*slot);
        }
        self.stops.get(&order_id)
    }

    /// Snapshot all of a user's open orders on this book (resting + stops).
    #[must_use]
    pub fn user_orders(&self, user: u64) -> Vec<Order> {
        let mut out: Vec<Order> = self
            .locations
            .values()
            .filter_map(|(_, _, slot)| self.arena.get(*slot))
            .filter(|o| o.user == user)
            .cloned()
            .collect();
        out.extend(self.stops.values().filter(|o| o.user == user).cloned());
        out.sort_by_key(|o| o.id);
        out
    }

    /// Ids of all of a user's open orders (cancel-all support).
    #[must_use]
    pub fn user_order_ids(&self, user: u64) -> Vec<u64> {
        self.user_orders(user).iter().map(|o| o.id).collect()
    }

    /// Pop every stop order triggered by `last_price`.
    ///
    /// Triggered orders come back with `triggered = true` for resubmission
    /// through the normal matching path. Triggering is idempotent: an order
    /// leaves the holding area exactly once.
    pub fn take_triggered_stops(&mut self, last_price: u64) -> Vec<Order> {
        let mut triggered_ids: Vec<u64> = Vec::new();

        // Buy stops fire when the market trades up to the stop price.
        let fired: Vec<u64> = self
            .buy_stops
            .range(..=last_price)
            .map(|(price, _)| *price)
            .collect();
        for price in fired {
            if let Some(ids) = self.buy_stops.remove(&price) {
                triggered_ids.extend(ids);
            }
        }

        // Sell stops fire when the market trades down to the stop price.
        let fired: Vec<u64> = self
            .sell_stops
            .range(last_price..)
            .map(|(price, _)| *price)
            .collect();
        for price in fired {
            if let Some(ids) = self.sell_stops.remove(&price) {
                triggered_ids.extend(ids);
            }
        }

        triggered_ids
            .into_iter()
            .filter_map(|id| self.stops.remove(&id))
            .map(|mut order| {
                order.triggered = true;
                trace!(symbol = %self.symbol, id = order.id, last_price, "stop triggered");
                order
            })
            .collect()
    }

    /// Aggregate opposite-side quantity available to an order of `side`
    /// within `limit` (inclusive). Used by the fill-or-kill pre-check.
    #[must_use]
    pub fn available_to(&self, side: Side, limit: Option<u64>) -> Qty {
        let mut total = Qty::ZERO;
        for (price, level) in self.levels_in_priority(side.opposite()) {
            if let Some(limit) = limit {
                let acceptable = match side {
                    Side::Buy => *price <= limit,
                    Side::Sell => *price >= limit,
                };
                if !acceptable {
                    break;
                }
            }
            total = total.saturating_add(level.total);
        }
        total
    }

    /// Best opposite price that an order of `side` at `price` would cross,
    /// if any. Drives the post-only rejection.
    #[must_use]
    pub fn crossing_price(&self, side: Side, price: u64) -> Option<u64> {
        match side {
            Side::Buy => self.best_ask().filter(|ask| price >= *ask),
            Side::Sell => self.best_bid().filter(|bid| price <= *bid),
        }
    }

    /// Top `n` levels of one side as `(price, aggregate quantity)` pairs.
    #[must_use]
    pub fn depth_side(&self, side: Side, n: usize) -> Vec<(u64, Qty)> {
        self.levels_in_priority(side)
            .take(n)
            .map(|(price, level)| (*price, level.total))
            .collect()
    }
}
