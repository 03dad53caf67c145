//! Graduated liquidation and bankruptcy resolution.
//!
//! A user whose equity falls below locked position margin (margin ratio
//! under one) is closed out in steps: 25%, then 50%, then 100% of each open
//! position, re-checking the ratio between steps. Closes execute at mark
//! price. A partial step smaller than the instrument's minimum order size
//! is promoted to a full close.
//!
//! If the account is still negative once flat, the insurance fund absorbs
//! what it can; any rest is recovered by auto-deleveraging opposing
//! winners, and the balance is clamped to zero.

use super::adl::AdlEvent;
use super::manager::PositionManager;
use crate::accounting::{AccountingEngine, JournalError};
use crate::money::{Money, RATE_SCALE};
use crate::product::ProductCatalog;
use tracing::{info, warn};

/// One forced close executed during liquidation.
#[derive(Debug, Clone)]
pub struct LiquidationClose {
    /// Symbol of the closed position.
    pub symbol: String,
    /// Closed quantity, `QTY_SCALE` units.
    pub qty: u64,
    /// Mark price used for the close.
    pub mark: u64,
    /// Realized P&L of the close.
    pub realized: Money,
}

/// Everything that happened while liquidating one user.
#[derive(Debug, Clone)]
pub struct LiquidationReport {
    /// The liquidated user.
    pub user: u64,
    /// Forced closes in execution order.
    pub closes: Vec<LiquidationClose>,
    /// True when full liquidation left a negative balance.
    pub bankrupt: bool,
    /// Shortfall covered by the insurance fund.
    pub absorbed_by_insurance: Money,
    /// Shortfall recovered through auto-deleveraging.
    pub deleveraged: Money,
    /// ADL closes executed against opposing winners.
    pub adl_events: Vec<AdlEvent>,
}

/// Liquidation step fractions, percent of each position per pass.
const STEPS: [u64; 3] = [25, 50, 100];

impl PositionManager {
    /// True when the user's equity no longer covers locked position margin.
    #[must_use]
    pub fn is_liquidation_candidate(&self, user: u64, catalog: &ProductCatalog) -> bool {
        let unrealized = self.unrealized_total(user, catalog);
        self.account(user)
            .and_then(|a| a.margin_ratio_ppm(unrealized))
            .is_some_and(|ratio| ratio < RATE_SCALE)
    }

    /// Run graduated liquidation for `user` if their margin ratio is below
    /// one. Returns `None` when the account is healthy.
    pub fn liquidate(
        &mut self,
        user: u64,
        catalog: &ProductCatalog,
        accounting: &mut AccountingEngine,
        ts: u64,
    ) -> Result<Option<LiquidationReport>, JournalError> {
        if !self.is_liquidation_candidate(user, catalog) {
            return Ok(None);
        }
        let mut report = LiquidationReport {
            user,
            closes: Vec::new(),
            bankrupt: false,
            absorbed_by_insurance: Money::ZERO,
            deleveraged: Money::ZERO,
            adl_events: Vec::new(),
        };
        let reference = format!("liq-{user}-{ts}");

        // The position with the worst unrealized P&L defines the symbol and
        // side the ADL pass will target if it comes to that.
        let primary = self.worst_position(user, catalog);

        for step in STEPS {
            // Worst unrealized P&L first.
            let mut targets: Vec<(String, i64, u64)> = self
                .user_positions(user)
                .iter()
                .map(|p| {
                    let mark = catalog
                        .get(&p.symbol)
                        .map(|prod| prod.mark_price())
                        .unwrap_or(p.entry_price);
                    (p.symbol.clone(), p.unrealized(mark).as_micros(), mark)
                })
                .collect();
            targets.sort_by_key(|(_, unrealized, _)| *unrealized);

            for (symbol, _, mark) in targets {
                let Some(position) = self.position(user, &symbol) else {
                    continue;
                };
                let abs = position.abs_size();
                let mut qty = abs * step / 100;
                let min_order = catalog
                    .get(&symbol)
                    .map(|p| p.def().min_order.raw())
                    .unwrap_or(0);
                // A partial close below the minimum order size is promoted
                // to a full close.
                if qty < min_order || qty == 0 {
                    qty = abs;
                }
                let settlement =
                    self.force_close(user, &symbol, qty, mark, accounting, ts, &reference)?;
                report.closes.push(LiquidationClose {
                    symbol,
                    qty,
                    mark,
                    realized: settlement.realized,
                });
            }

            if !self.is_liquidation_candidate(user, catalog) {
                break;
            }
        }

        // Bankruptcy: negative cash after full liquidation.
        let balance = self.account(user).map(|a| a.balance).unwrap_or(Money::ZERO);
        if balance.is_negative() {
            report.bankrupt = true;
            let shortfall = -balance;
            warn!(user, %shortfall, "bankruptcy after liquidation");
            let absorbed =
                self.absorb_from_insurance(user, shortfall, accounting, ts, &reference)?;
            report.absorbed_by_insurance = absorbed;
            let rest = shortfall - absorbed;
            if !rest.is_zero() {
                self.socialize_shortfall(user, rest, accounting, ts, &reference)?;
                if let Some((symbol, sign)) = primary {
                    let (covered, events) = self.auto_deleverage(
                        &symbol, sign, rest, catalog, accounting, ts, &reference,
                    )?;
                    report.deleveraged = covered;
                    report.adl_events = events;
                } else {
                    warn!(user, %rest, "no position context for deleveraging");
                }
            }
        }

        info!(
            user,
            closes = report.closes.len(),
            bankrupt = report.bankrupt,
            "liquidation complete"
        );
        Ok(Some(report))
    }

    /// Scan every margined account and liquidate the candidates. Returns
    /// the reports of the users actually liquidated.
    pub fn liquidate_all_candidates(
        &mut self,
        catalog: &ProductCatalog,
        accounting: &mut AccountingEngine,
        ts: u64,
    ) -> Result<Vec<LiquidationReport>, JournalError> {
        let candidates: Vec<u64> = {
            let mut users: Vec<u64> = self.user_positions_owners();
            users.sort_unstable();
            users
                .into_iter()
                .filter(|u| self.is_liquidation_candidate(*u, catalog))
                .collect()
        };
        let mut reports = Vec::new();
        for user in candidates {
            if let Some(report) = self.liquidate(user, catalog, accounting, ts)? {
                reports.push(report);
            }
        }
        Ok(reports)
    }

    /// Symbol and side sign of the user's worst open position.
    fn worst_position(&self, user: u64, catalog: &ProductCatalog) -> Option<(String, i64)> {
        self.user_positions(user)
            .iter()
            .min_by_key(|p| {
                let mark = catalog
                    .get(&p.symbol)
                    .map(|prod| prod.mark_price())
                    .unwrap_or(p.entry_price);
                p.unrealized(mark).as_micros()
            })
            .map(|p| (p.symbol.clone(), p.size.signum()))
    }
}
