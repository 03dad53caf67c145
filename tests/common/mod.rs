//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use exchange_core_rs::accounting::AccountingEngine;
use exchange_core_rs::config::CoreConfig;
use exchange_core_rs::engine::{ExchangeCore, OrderRequest};
use exchange_core_rs::ledger::LedgerFiles;
use exchange_core_rs::money::{Money, Qty};
use exchange_core_rs::orderbook::{OrderKind, Side};
use exchange_core_rs::product::{
    FeeMode, FundingMode, ProductCatalog, ProductCategory, ProductDef,
};
use std::path::Path;
use std::sync::Arc;

pub fn mnt(v: i64) -> Money {
    Money::from_mnt(v)
}

pub fn micro(v: i64) -> u64 {
    Money::from_mnt(v).as_micros() as u64
}

pub fn units(v: u64) -> Qty {
    Qty::from_units(v)
}

/// XAU-SPOT: spot gold with a configurable spread markup.
pub fn spot_def(markup_ppm: i64) -> ProductDef {
    ProductDef {
        symbol: "XAU-SPOT".to_string(),
        category: ProductCategory::Spot,
        tick_size: 1,
        lot_size: Qty::from_scaled(1_000),
        min_order: Qty::from_scaled(1_000),
        max_order: Qty::from_units(1_000),
        min_notional: mnt(100),
        initial_margin_ppm: 0,
        fee_mode: FeeMode::Spread { markup_ppm },
        funding_rate_ppm: 0,
        funding_mode: FundingMode::Static,
        reference_band_ppm: None,
        hedgeable: false,
        initial_mark_price: micro(100_000),
    }
}

/// BTC-PERP: 10x perpetual, static funding 0.0001, no trading fees.
pub fn perp_def() -> ProductDef {
    ProductDef {
        symbol: "BTC-PERP".to_string(),
        category: ProductCategory::Perpetual,
        tick_size: 1,
        lot_size: Qty::from_scaled(1_000),
        min_order: Qty::from_scaled(1_000),
        max_order: Qty::from_units(1_000),
        min_notional: mnt(100),
        initial_margin_ppm: 100_000,
        fee_mode: FeeMode::Spread { markup_ppm: 0 },
        funding_rate_ppm: 100,
        funding_mode: FundingMode::Static,
        reference_band_ppm: None,
        hedgeable: false,
        initial_mark_price: micro(1_000_000),
    }
}

/// USD-MNT: banded, hedgeable, spot-settled FX.
pub fn fx_def() -> ProductDef {
    ProductDef {
        symbol: "USD-MNT".to_string(),
        category: ProductCategory::Fx,
        tick_size: 1,
        lot_size: Qty::from_scaled(1_000),
        min_order: Qty::from_scaled(1_000),
        max_order: Qty::from_units(1_000_000),
        min_notional: mnt(100),
        initial_margin_ppm: 0,
        fee_mode: FeeMode::Spread { markup_ppm: 0 },
        funding_rate_ppm: 0,
        funding_mode: FundingMode::Static,
        reference_band_ppm: Some(20_000),
        hedgeable: true,
        initial_mark_price: micro(3_500),
    }
}

pub fn standard_catalog() -> Arc<ProductCatalog> {
    let catalog = Arc::new(ProductCatalog::new());
    catalog.load(spot_def(0));
    catalog.load(perp_def());
    catalog.load(fx_def());
    catalog
}

pub fn test_config() -> CoreConfig {
    CoreConfig {
        // Wide enough not to interfere with scenario prices.
        away_from_market_ppm: 500_000,
        ..CoreConfig::default()
    }
}

pub fn build_core(dir: &Path, catalog: Arc<ProductCatalog>) -> ExchangeCore {
    let config = test_config();
    let accounting =
        AccountingEngine::open(&dir.join("journal.log"), config.reconcile_every).unwrap();
    ExchangeCore::new(catalog, config, accounting, LedgerFiles::disabled())
}

pub fn limit(user: u64, symbol: &str, side: Side, price: u64, qty: Qty) -> OrderRequest {
    OrderRequest {
        user,
        symbol: symbol.to_string(),
        side,
        kind: OrderKind::Limit,
        limit_price: Some(price),
        stop_price: None,
        quantity: qty,
        client_ref: None,
    }
}

pub fn market(user: u64, symbol: &str, side: Side, qty: Qty) -> OrderRequest {
    OrderRequest {
        user,
        symbol: symbol.to_string(),
        side,
        kind: OrderKind::Market,
        limit_price: None,
        stop_price: None,
        quantity: qty,
        client_ref: None,
    }
}

/// Sum of the two identity sides must match after any posting sequence.
pub fn assert_identity(core: &ExchangeCore) {
    let (left, right) = core.accounting().identity_sums();
    assert_eq!(left, right, "accounting identity broken");
}
