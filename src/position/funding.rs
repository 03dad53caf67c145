//! Periodic funding settlement for perpetual positions.
//!
//! `payment = size * mark_price * funding_rate`, positive rate meaning
//! longs pay shorts. Payments settle against the exchange funding pool
//! accounts (`Revenue:Funding:<symbol>` / `Expenses:Funding:<symbol>`), one
//! journal batch per position.

use super::manager::PositionManager;
use crate::accounting::{AccountingEngine, EventKind, JournalError, Posting, paths};
use crate::money::{Money, signed_notional};
use crate::product::{FundingMode, Product, ProductCatalog};
use serde::Serialize;
use tracing::debug;

/// One settled funding payment.
#[derive(Debug, Clone, Serialize)]
pub struct FundingEvent {
    /// The paying (positive) or receiving (negative) user.
    pub user: u64,
    /// The funded symbol.
    pub symbol: String,
    /// Signed payment: positive means the user paid.
    pub payment: Money,
    /// The rate applied, parts per million.
    pub rate_ppm: i64,
}

/// Effective funding rate for one product, parts per million.
///
/// Static products use their configured rate. Dynamic products use
/// `clamp(-max, max, 0.1 * (last - mark) / mark)`.
#[must_use]
pub fn effective_funding_rate_ppm(product: &Product, max_rate_ppm: i64) -> i64 {
    match product.def().funding_mode {
        FundingMode::Static => product.def().funding_rate_ppm,
        FundingMode::Dynamic => {
            let mark = product.mark_price();
            if mark == 0 {
                return 0;
            }
            let last = product.last_price();
            let premium_ppm = ((last as i128 - mark as i128)
                * crate::money::RATE_SCALE as i128
                / mark as i128) as i64;
            (premium_ppm / 10).clamp(-max_rate_ppm, max_rate_ppm)
        }
    }
}

impl PositionManager {
    /// Settle funding for every open derivative position.
    ///
    /// Called by the composition root at the configured interval. Returns
    /// the per-position payments that were journaled.
    pub fn settle_funding(
        &mut self,
        catalog: &ProductCatalog,
        accounting: &mut AccountingEngine,
        ts: u64,
    ) -> Result<Vec<FundingEvent>, JournalError> {
        let max_rate = self.config().max_funding_rate_ppm;
        let targets: Vec<(u64, String)> = self.position_keys();
        let mut events = Vec::new();

        for (user, symbol) in targets {
            let Some(product) = catalog.get(&symbol) else {
                continue;
            };
            if !product.is_derivative() {
                continue;
            }
            let Some(position) = self.position(user, &symbol) else {
                continue;
            };
            let rate_ppm = effective_funding_rate_ppm(&product, max_rate);
            let payment = signed_notional(product.mark_price(), position.size).mul_ppm(rate_ppm);
            if payment.is_zero() {
                continue;
            }

            let posting = if payment.is_negative() {
                // The user receives funding out of the pool.
                Posting::new(
                    paths::funding_expense(&symbol),
                    paths::customer_balance(user),
                    -payment,
                )
            } else {
                Posting::new(
                    paths::customer_balance(user),
                    paths::funding_revenue(&symbol),
                    payment,
                )
            };
            accounting.post_batch(
                ts,
                EventKind::Adjustment,
                &[posting],
                &format!("funding-{symbol}-{user}"),
                "funding settlement",
            )?;
            self.adjust_balance(user, -payment);
            debug!(user, %symbol, %payment, rate_ppm, "funding settled");
            events.push(FundingEvent {
                user,
                symbol,
                payment,
                rate_ppm,
            });
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;
    use crate::money::Qty;
    use crate::product::{FeeMode, ProductCategory, ProductDef};
    use tempfile::tempdir;

    fn catalog(mode: FundingMode) -> ProductCatalog {
        let catalog = ProductCatalog::new();
        catalog.load(ProductDef {
            symbol: "BTC-PERP".to_string(),
            category: ProductCategory::Perpetual,
            tick_size: 1,
            lot_size: Qty::from_scaled(1_000),
            min_order: Qty::from_scaled(1_000),
            max_order: Qty::from_units(1_000),
            min_notional: Money::from_mnt(1),
            initial_margin_ppm: 100_000,
            fee_mode: FeeMode::Spread { markup_ppm: 0 },
            funding_rate_ppm: 100,
            funding_mode: mode,
            reference_band_ppm: None,
            hedgeable: false,
            initial_mark_price: Money::from_mnt(1_000_000).as_micros() as u64,
        });
        catalog
    }

    fn micro(v: i64) -> u64 {
        Money::from_mnt(v).as_micros() as u64
    }

    #[test]
    fn test_long_pays_static_funding() {
        // +2 long, mark 1,000,000, rate 0.0001 => 200 MNT.
        let dir = tempdir().unwrap();
        let mut accounting =
            AccountingEngine::open(&dir.path().join("journal.log"), 10_000).unwrap();
        let catalog = catalog(FundingMode::Static);
        let product = catalog.get("BTC-PERP").unwrap();
        let mut manager = PositionManager::new(CoreConfig::default());
        manager
            .deposit(1, Money::from_mnt(400_000), &mut accounting, 1)
            .unwrap();
        manager
            .apply_fill(1, &product, Qty::from_units(2).as_signed(), micro(1_000_000), &mut accounting, 2, "t")
            .unwrap();
        let before = manager.account(1).unwrap().balance;

        let events = manager.settle_funding(&catalog, &mut accounting, 3).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payment, Money::from_mnt(200));
        assert_eq!(manager.account(1).unwrap().balance, before - Money::from_mnt(200));
        assert_eq!(
            accounting.balance("Revenue:Funding:BTC-PERP"),
            Money::from_mnt(200)
        );
        let (left, right) = accounting.identity_sums();
        assert_eq!(left, right);
    }

    #[test]
    fn test_short_receives_funding() {
        let dir = tempdir().unwrap();
        let mut accounting =
            AccountingEngine::open(&dir.path().join("journal.log"), 10_000).unwrap();
        let catalog = catalog(FundingMode::Static);
        let product = catalog.get("BTC-PERP").unwrap();
        let mut manager = PositionManager::new(CoreConfig::default());
        manager
            .deposit(2, Money::from_mnt(400_000), &mut accounting, 1)
            .unwrap();
        manager
            .apply_fill(2, &product, -Qty::from_units(2).as_signed(), micro(1_000_000), &mut accounting, 2, "t")
            .unwrap();
        let before = manager.account(2).unwrap().balance;

        let events = manager.settle_funding(&catalog, &mut accounting, 3).unwrap();
        assert_eq!(events[0].payment, Money::from_mnt(-200));
        assert_eq!(manager.account(2).unwrap().balance, before + Money::from_mnt(200));
        assert_eq!(
            accounting.balance("Expenses:Funding:BTC-PERP"),
            Money::from_mnt(200)
        );
    }

    #[test]
    fn test_dynamic_rate_clamped() {
        let catalog = catalog(FundingMode::Dynamic);
        let product = catalog.get("BTC-PERP").unwrap();
        // last 2% above mark: premium 20,000 ppm, tenth is 2,000 ppm.
        product.set_last_price(micro(1_020_000));
        assert_eq!(effective_funding_rate_ppm(&product, 7_500), 2_000);
        // Huge premium clamps at the configured bound.
        product.set_last_price(micro(2_000_000));
        assert_eq!(effective_funding_rate_ppm(&product, 7_500), 7_500);
        // Discount clamps symmetrically.
        product.set_last_price(micro(500_000));
        assert_eq!(effective_funding_rate_ppm(&product, 7_500), -7_500);
    }
}
