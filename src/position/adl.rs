//! Auto-deleveraging: recover a bankruptcy shortfall from opposing winners.
//!
//! When the insurance fund cannot cover a defaulted account, the opposing
//! profitable positions on the defaulter's symbol are ranked by
//! `profit_ratio * leverage` and force-closed at mark, clawing back realized
//! profit until the shortfall is covered.

use super::manager::PositionManager;
use crate::accounting::{AccountingEngine, JournalError};
use crate::money::{Money, RATE_SCALE};
use crate::product::ProductCatalog;
use serde::Serialize;
use tracing::{info, warn};

/// One auto-deleveraged position.
#[derive(Debug, Clone, Serialize)]
pub struct AdlEvent {
    /// Owner of the deleveraged position.
    pub user: u64,
    /// Symbol of the closed position.
    pub symbol: String,
    /// Closed quantity, `QTY_SCALE` units.
    pub closed_qty: u64,
    /// Profit clawed back toward the shortfall.
    pub clawback: Money,
    /// The ranking score at selection time, parts per million.
    pub score_ppm: i64,
}

impl PositionManager {
    /// Rank and close opposing winners until `shortfall` is recovered.
    ///
    /// `defaulter_sign` is the sign of the bankrupt user's former position;
    /// candidates hold the opposite sign with positive unrealized P&L.
    /// Returns the covered amount and the per-position events.
    #[allow(clippy::too_many_arguments)]
    pub(super) fn auto_deleverage(
        &mut self,
        symbol: &str,
        defaulter_sign: i64,
        shortfall: Money,
        catalog: &ProductCatalog,
        accounting: &mut AccountingEngine,
        ts: u64,
        reference: &str,
    ) -> Result<(Money, Vec<AdlEvent>), JournalError> {
        let Some(product) = catalog.get(symbol) else {
            return Ok((Money::ZERO, Vec::new()));
        };
        let mark = product.mark_price();
        let leverage = RATE_SCALE / product.def().initial_margin_ppm.max(1);

        let mut candidates: Vec<(u64, u64, i64)> = self
            .symbol_positions(symbol)
            .iter()
            .filter(|p| p.size.signum() == -defaulter_sign)
            .filter_map(|p| {
                let profit = p.unrealized(mark);
                if !profit.is_negative() && !profit.is_zero() {
                    Some((p.user, p.abs_size(), adl_score_ppm(profit, p.margin, leverage)))
                } else {
                    None
                }
            })
            .collect();
        candidates.sort_by_key(|(_, _, score)| -score);

        let mut remaining = shortfall;
        let mut events = Vec::new();
        for (user, abs_size, score_ppm) in candidates {
            if remaining.is_zero() {
                break;
            }
            let settlement =
                self.force_close(user, symbol, abs_size, mark, accounting, ts, reference)?;
            let clawback = settlement.realized.max(Money::ZERO).min(remaining);
            if !clawback.is_zero() {
                self.claw_back(user, clawback, accounting, ts, reference)?;
                remaining -= clawback;
            }
            info!(user, %symbol, %clawback, "position auto-deleveraged");
            events.push(AdlEvent {
                user,
                symbol: symbol.to_string(),
                closed_qty: abs_size,
                clawback,
                score_ppm,
            });
        }

        let covered = shortfall - remaining;
        if !remaining.is_zero() {
            warn!(%symbol, %remaining, "shortfall not fully covered by deleveraging");
        }
        Ok((covered, events))
    }

    /// Display ranks 1 to 5 by ADL score percentile for every position on
    /// `symbol`. Rank 5 positions are first in line for deleveraging.
    #[must_use]
    pub fn adl_ranks(&self, symbol: &str, catalog: &ProductCatalog) -> Vec<(u64, u8)> {
        let Some(product) = catalog.get(symbol) else {
            return Vec::new();
        };
        let mark = product.mark_price();
        let leverage = RATE_SCALE / product.def().initial_margin_ppm.max(1);
        let mut scored: Vec<(u64, i64)> = self
            .symbol_positions(symbol)
            .iter()
            .map(|p| (p.user, adl_score_ppm(p.unrealized(mark), p.margin, leverage)))
            .collect();
        if scored.is_empty() {
            return Vec::new();
        }
        scored.sort_by_key(|(_, score)| *score);
        let n = scored.len();
        scored
            .iter()
            .enumerate()
            .map(|(i, (user, _))| {
                // Percentile by rank position; top scores land in bucket 5.
                let rank = 1 + (i * 5) / n;
                (*user, rank.min(5) as u8)
            })
            .collect()
    }
}

/// `profit_ratio * leverage` in parts per million, where `profit_ratio` is
/// unrealized P&L over locked margin.
fn adl_score_ppm(profit: Money, margin: Money, leverage: i64) -> i64 {
    if margin.is_zero() {
        return 0;
    }
    let ratio = (profit.as_micros() as i128 * RATE_SCALE as i128) / margin.as_micros() as i128;
    (ratio * leverage as i128).clamp(i64::MIN as i128, i64::MAX as i128) as i64
}
