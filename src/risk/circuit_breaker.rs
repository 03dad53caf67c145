//! Per-symbol circuit breakers and the market-wide halt.
//!
//! Each symbol runs a four-state machine: `Normal`, `LimitUp`,
//! `LimitDown`, `Halted`. Limit states bar one direction for a cooldown and
//! then clear with a reseeded reference price; halts bar everything until
//! an admin resume (or cooldown expiry for breach-driven halts). Every
//! transition invokes the registered change callback after the fact.

use crate::error::RejectReason;
use crate::money::RATE_SCALE;
use crate::orderbook::Side;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Circuit breaker state for one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BreakerState {
    /// Both directions trade normally.
    Normal,
    /// New buys are barred until cooldown expiry.
    LimitUp,
    /// New sells are barred until cooldown expiry.
    LimitDown,
    /// Everything is barred until resume.
    Halted,
}

/// Callback invoked after every state change.
pub type BreakerListener = Arc<dyn Fn(&str, BreakerState) + Send + Sync>;

#[derive(Debug)]
struct SymbolBreaker {
    state: BreakerState,
    reference_price: u64,
    cooldown_until: u64,
    /// Halts entered by admin never clear on a timer.
    admin_halt: bool,
}

/// All per-symbol breakers plus the market-wide halt flag.
pub struct CircuitBreaker {
    symbols: HashMap<String, SymbolBreaker>,
    band_ppm: i64,
    cooldown_micros: u64,
    market_halted: bool,
    listener: Option<BreakerListener>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(band_ppm: i64, cooldown_micros: u64) -> Self {
        Self {
            symbols: HashMap::new(),
            band_ppm,
            cooldown_micros,
            market_halted: false,
            listener: None,
        }
    }

    /// Register the state-change callback (external event fan-out).
    pub fn set_listener(&mut self, listener: BreakerListener) {
        self.listener = Some(listener);
    }

    /// Start tracking a symbol with its initial reference price.
    pub fn register(&mut self, symbol: &str, reference_price: u64) {
        self.symbols.insert(
            symbol.to_string(),
            SymbolBreaker {
                state: BreakerState::Normal,
                reference_price,
                cooldown_until: 0,
                admin_halt: false,
            },
        );
    }

    /// Current state of a symbol; unregistered symbols read as `Normal`.
    #[must_use]
    pub fn state(&self, symbol: &str) -> BreakerState {
        if self.market_halted {
            return BreakerState::Halted;
        }
        self.symbols
            .get(symbol)
            .map(|s| s.state)
            .unwrap_or(BreakerState::Normal)
    }

    /// The reference price limit bands are computed from.
    #[must_use]
    pub fn reference_price(&self, symbol: &str) -> Option<u64> {
        self.symbols.get(symbol).map(|s| s.reference_price)
    }

    /// Clear expired limit states, reseeding the reference from
    /// `last_price`. Called before gating and after trades.
    pub fn poll(&mut self, symbol: &str, ts: u64, last_price: u64) {
        let Some(breaker) = self.symbols.get_mut(symbol) else {
            return;
        };
        let timed = match breaker.state {
            BreakerState::LimitUp | BreakerState::LimitDown => true,
            BreakerState::Halted => !breaker.admin_halt,
            BreakerState::Normal => false,
        };
        let expired = timed && ts >= breaker.cooldown_until;
        if expired {
            breaker.state = BreakerState::Normal;
            if last_price > 0 {
                breaker.reference_price = last_price;
            }
            info!(symbol, reference = breaker.reference_price, "limit state cleared");
            self.notify(symbol, BreakerState::Normal);
        }
    }

    /// Gate one order direction against the current state.
    pub fn check_order(&self, symbol: &str, side: Side) -> Result<(), RejectReason> {
        match self.state(symbol) {
            BreakerState::Normal => Ok(()),
            BreakerState::Halted => Err(RejectReason::Halted {
                symbol: symbol.to_string(),
            }),
            BreakerState::LimitUp if side == Side::Buy => Err(RejectReason::LimitUp {
                symbol: symbol.to_string(),
            }),
            BreakerState::LimitDown if side == Side::Sell => Err(RejectReason::LimitDown {
                symbol: symbol.to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Feed a trade price through the state machine.
    pub fn on_trade(&mut self, symbol: &str, price: u64, ts: u64) {
        let band_ppm = self.band_ppm;
        let cooldown = self.cooldown_micros;
        let Some(breaker) = self.symbols.get_mut(symbol) else {
            return;
        };
        let reference = breaker.reference_price as i128;
        let band = reference * band_ppm as i128 / RATE_SCALE as i128;
        let next = match breaker.state {
            BreakerState::Normal if price as i128 >= reference + band => {
                Some(BreakerState::LimitUp)
            }
            BreakerState::Normal if price as i128 <= reference - band => {
                Some(BreakerState::LimitDown)
            }
            // A second-level breach while already limited halts the symbol.
            BreakerState::LimitUp if price as i128 >= reference + 2 * band => {
                Some(BreakerState::Halted)
            }
            BreakerState::LimitDown if price as i128 <= reference - 2 * band => {
                Some(BreakerState::Halted)
            }
            _ => None,
        };
        if let Some(state) = next {
            breaker.state = state;
            breaker.cooldown_until = ts + cooldown;
            info!(symbol, price, reference = breaker.reference_price, ?state, "limit band breached");
            self.notify(symbol, state);
        }
    }

    /// Admin halt for one symbol.
    pub fn halt(&mut self, symbol: &str) {
        if let Some(breaker) = self.symbols.get_mut(symbol) {
            breaker.state = BreakerState::Halted;
            breaker.admin_halt = true;
            info!(symbol, "symbol halted");
            self.notify(symbol, BreakerState::Halted);
        }
    }

    /// Admin resume: back to `Normal` with a fresh reference price.
    pub fn resume(&mut self, symbol: &str, reference_price: u64) {
        if let Some(breaker) = self.symbols.get_mut(symbol) {
            breaker.state = BreakerState::Normal;
            breaker.admin_halt = false;
            breaker.cooldown_until = 0;
            if reference_price > 0 {
                breaker.reference_price = reference_price;
            }
            info!(symbol, reference_price, "symbol resumed");
            self.notify(symbol, BreakerState::Normal);
        }
    }

    /// Pause every symbol at once.
    pub fn halt_market(&mut self) {
        self.market_halted = true;
        info!("market-wide halt engaged");
        let symbols: Vec<String> = self.symbols.keys().cloned().collect();
        for symbol in symbols {
            self.notify(&symbol, BreakerState::Halted);
        }
    }

    /// Lift the market-wide halt; per-symbol states resume as they were.
    pub fn resume_market(&mut self) {
        self.market_halted = false;
        info!("market-wide halt lifted");
        let updates: Vec<(String, BreakerState)> = self
            .symbols
            .iter()
            .map(|(s, b)| (s.clone(), b.state))
            .collect();
        for (symbol, state) in updates {
            self.notify(&symbol, state);
        }
    }

    /// Whether the whole market is paused.
    #[must_use]
    pub fn is_market_halted(&self) -> bool {
        self.market_halted
    }

    fn notify(&self, symbol: &str, state: BreakerState) {
        if let Some(listener) = &self.listener {
            listener(symbol, state);
        }
    }
}
