//! Per-symbol exposure tracking and the hedge decision.
//!
//! The core only decides *when* and *how much* to hedge; execution belongs
//! to the external hedging backend (see [`crate::feeds::HedgeBackend`]).

use crate::money::{Qty, signed_notional};
use serde::Serialize;

/// Net exchange exposure on one symbol.
#[derive(Debug, Clone, Serialize)]
pub struct Exposure {
    /// The symbol.
    pub symbol: String,
    /// Net customer position (sum of signed sizes), `QTY_SCALE` units.
    pub net: i64,
    /// Open interest: sum of long sizes across users.
    pub long_interest: u64,
    /// Externally hedged size, signed.
    pub hedged: i64,
}

impl Exposure {
    #[must_use]
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            net: 0,
            long_interest: 0,
            hedged: 0,
        }
    }

    /// Customer exposure not yet covered by external hedges.
    #[must_use]
    #[inline]
    pub fn unhedged(&self) -> i64 {
        self.net - self.hedged
    }

    /// USD value of the unhedged exposure at `mark` (micro-MNT) and
    /// `usd_rate` (MNT per USD). Display-edge arithmetic.
    #[must_use]
    pub fn unhedged_usd(&self, mark: u64, usd_rate: f64) -> f64 {
        if usd_rate <= 0.0 {
            return 0.0;
        }
        signed_notional(mark, self.unhedged()).as_mnt_f64() / usd_rate
    }
}

/// A hedge the core wants the backend to execute.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HedgePlan {
    /// Symbol to hedge.
    pub symbol: String,
    /// Signed quantity to send to the backend, `QTY_SCALE` units. The sign
    /// offsets the customer exposure.
    pub qty: i64,
    /// Unhedged USD value that triggered the plan.
    pub trigger_usd: f64,
}

/// Decide whether `exposure` breaches `threshold_usd` and, if so, how much
/// to hedge, rounded down to the backend's `lot` size.
///
/// Returns `None` when under the threshold or when rounding leaves nothing
/// to send.
#[must_use]
pub fn plan_hedge(
    exposure: &Exposure,
    mark: u64,
    usd_rate: f64,
    threshold_usd: f64,
    lot: Qty,
) -> Option<HedgePlan> {
    let usd = exposure.unhedged_usd(mark, usd_rate);
    if usd.abs() < threshold_usd {
        return None;
    }
    let unhedged = exposure.unhedged();
    let lot = lot.raw().max(1) as i64;
    let rounded = (unhedged / lot) * lot;
    if rounded == 0 {
        return None;
    }
    Some(HedgePlan {
        symbol: exposure.symbol.clone(),
        qty: -rounded,
        trigger_usd: usd,
    })
}
