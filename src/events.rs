//! Post-commit event fan-out.
//!
//! The external distribution layer registers callbacks here; the core
//! invokes them after the corresponding state is final (trade settled,
//! order terminal or rested, breaker state changed). Callbacks must be
//! cheap and non-blocking; anything slow belongs on the far side of a
//! channel.

use crate::engine::Trade;
use crate::orderbook::Order;
use crate::risk::BreakerState;
use std::sync::Arc;

/// Invoked once per committed trade.
pub type TradeListener = Arc<dyn Fn(&Trade) + Send + Sync>;

/// Invoked on order status changes (rested, filled, cancelled, rejected).
pub type OrderListener = Arc<dyn Fn(&Order) + Send + Sync>;

/// Invoked on circuit breaker state changes.
pub type BreakerChangeListener = Arc<dyn Fn(&str, BreakerState) + Send + Sync>;

/// The callback set the composition root wires in.
#[derive(Default, Clone)]
pub struct EventSinks {
    /// Trade fan-out.
    pub on_trade: Option<TradeListener>,
    /// Order status fan-out.
    pub on_order: Option<OrderListener>,
    /// Breaker state fan-out.
    pub on_circuit_breaker_change: Option<BreakerChangeListener>,
}

impl EventSinks {
    pub(crate) fn emit_trade(&self, trade: &Trade) {
        if let Some(listener) = &self.on_trade {
            listener(trade);
        }
    }

    pub(crate) fn emit_order(&self, order: &Order) {
        if let Some(listener) = &self.on_order {
            listener(order);
        }
    }
}
