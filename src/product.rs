//! Product catalog: immutable-after-load instrument table.
//!
//! Products are created at startup and shared by reference. The only fields
//! that mutate afterwards are the mark price, the last trade price and the
//! active flag; all three publish through atomics so readers never observe a
//! torn value and never block the matcher.

use crate::money::{Money, Qty};
use crossbeam::atomic::AtomicCell;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Instrument category. Spot and FX products settle by immediate MNT
/// transfer; perpetuals open margined positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductCategory {
    /// Physically-settled spot instrument (full value changes hands).
    Spot,
    /// Perpetual swap with margin, funding and liquidation.
    Perpetual,
    /// FX instrument quoted against an external reference rate; spot-settled
    /// and price-banded.
    Fx,
}

/// How the exchange earns revenue on a product's trades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeeMode {
    /// Explicit maker/taker fees deducted from the fee-bearing sides,
    /// each floored at `min_fee`.
    Explicit {
        /// Maker fee in parts per million of notional.
        maker_ppm: i64,
        /// Taker fee in parts per million of notional.
        taker_ppm: i64,
        /// Minimum fee charged per side, in micro-MNT.
        min_fee: Money,
    },
    /// Implicit spread markup accrued to the exchange; no explicit fee is
    /// deducted from either side.
    Spread {
        /// Markup in parts per million of notional.
        markup_ppm: i64,
    },
}

/// How a perpetual's funding rate is determined at settlement time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FundingMode {
    /// Fixed per-product rate.
    Static,
    /// `clamp(-max_rate, max_rate, 0.1 * (last - mark) / mark)`.
    Dynamic,
}

/// Static definition of a product, loaded at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductDef {
    /// Unique trading symbol, e.g. `BTC-PERP` or `XAU-SPOT`.
    pub symbol: String,
    /// Instrument category.
    pub category: ProductCategory,
    /// Minimum price increment in micro-MNT.
    pub tick_size: u64,
    /// Minimum quantity increment.
    pub lot_size: Qty,
    /// Smallest accepted order quantity (inclusive).
    pub min_order: Qty,
    /// Largest accepted order quantity (inclusive).
    pub max_order: Qty,
    /// Smallest accepted order value (inclusive).
    pub min_notional: Money,
    /// Initial margin as parts per million of notional (perpetuals only).
    pub initial_margin_ppm: i64,
    /// Revenue mode for this product.
    pub fee_mode: FeeMode,
    /// Static funding rate in parts per million per interval.
    pub funding_rate_ppm: i64,
    /// Funding rate determination mode.
    pub funding_mode: FundingMode,
    /// Price band around the external reference in parts per million;
    /// `None` disables band validation.
    pub reference_band_ppm: Option<i64>,
    /// Whether exposure on this product may be hedged externally.
    pub hedgeable: bool,
    /// Initial mark price in micro-MNT.
    pub initial_mark_price: u64,
}

/// A tradable instrument with its risk and fee parameters.
///
/// The identity fields are immutable; `mark_price`, `last_price` and
/// `active` are the only runtime-mutable state.
pub struct Product {
    def: ProductDef,
    mark_price: AtomicCell<u64>,
    last_price: AtomicCell<u64>,
    active: AtomicBool,
}

impl Product {
    fn new(def: ProductDef) -> Self {
        let mark = def.initial_mark_price;
        Self {
            def,
            mark_price: AtomicCell::new(mark),
            last_price: AtomicCell::new(mark),
            active: AtomicBool::new(true),
        }
    }

    /// The trading symbol.
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.def.symbol
    }

    /// The static definition this product was loaded from.
    #[must_use]
    pub fn def(&self) -> &ProductDef {
        &self.def
    }

    #[must_use]
    #[inline]
    pub fn category(&self) -> ProductCategory {
        self.def.category
    }

    /// True for categories that open margined positions.
    #[must_use]
    #[inline]
    pub fn is_derivative(&self) -> bool {
        matches!(self.def.category, ProductCategory::Perpetual)
    }

    /// Current mark price in micro-MNT.
    #[must_use]
    #[inline]
    pub fn mark_price(&self) -> u64 {
        self.mark_price.load()
    }

    /// Current last trade price in micro-MNT.
    #[must_use]
    #[inline]
    pub fn last_price(&self) -> u64 {
        self.last_price.load()
    }

    /// Publish a new mark price (external price feed path).
    pub fn set_mark_price(&self, price: u64) {
        self.mark_price.store(price);
    }

    /// Publish a new last trade price (matching engine path).
    pub fn set_last_price(&self, price: u64) {
        self.last_price.store(price);
    }

    /// Whether the product currently accepts orders.
    #[must_use]
    #[inline]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Admin toggle for order acceptance.
    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
        debug!(symbol = %self.def.symbol, active, "product active flag changed");
    }
}

/// The read-mostly table of products, keyed by symbol.
///
/// Loaded once at startup; lookups return shared `Arc<Product>` handles so
/// the matcher and reader threads share one instance per instrument.
#[derive(Default)]
pub struct ProductCatalog {
    products: DashMap<String, Arc<Product>>,
}

impl ProductCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self {
            products: DashMap::new(),
        }
    }

    /// Load a product definition. Replaces any previous definition with the
    /// same symbol (startup-time only by convention).
    pub fn load(&self, def: ProductDef) -> Arc<Product> {
        let product = Arc::new(Product::new(def));
        self.products
            .insert(product.symbol().to_string(), Arc::clone(&product));
        product
    }

    /// Look up a product by symbol.
    #[must_use]
    pub fn get(&self, symbol: &str) -> Option<Arc<Product>> {
        self.products.get(symbol).map(|p| Arc::clone(p.value()))
    }

    /// All loaded symbols.
    #[must_use]
    pub fn symbols(&self) -> Vec<String> {
        self.products.iter().map(|e| e.key().clone()).collect()
    }

    /// Number of loaded products.
    #[must_use]
    pub fn len(&self) -> usize {
        self.products.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}
