//! # MNT Exchange Trading Core
//!
//! The trading core of a centralized derivatives and spot exchange for a
//! single-country market whose quote currency is the Mongolian tugrik
//! (MNT). The crate accepts orders, matches them on per-symbol limit order
//! books, maintains margined positions, settles fees, funding and
//! insurance, and records every economic event in a double-entry journal
//! with a monetary conservation invariant.
//!
//! ## Subsystems
//!
//! - **Order book and matching** ([`orderbook`], [`engine`]): price-time
//!   priority over arena-allocated orders; limit, market, IOC, FOK,
//!   post-only and stop-limit order kinds.
//! - **Positions and margin** ([`position`]): leveraged positions with
//!   notional-weighted entries, graduated liquidation (25% / 50% / 100%),
//!   an insurance fund and auto-deleveraging, periodic funding, exposure
//!   tracking and hedge planning.
//! - **Accounting** ([`accounting`]): atomic multi-leg postings over a
//!   prefix-typed chart of accounts, an append-only pipe-delimited journal
//!   file, exact replay, balance-sheet and income-statement aggregation.
//! - **Risk** ([`risk`]): pre-trade gates (price bands, daily loss,
//!   submission rate) and per-symbol circuit breakers with limit-up /
//!   limit-down / halt states and a market-wide halt.
//!
//! ## Representation
//!
//! All monetary values are integers in micro-MNT ([`money::Money`]);
//! quantities are fixed-point with six decimals ([`money::Qty`]); rates
//! are parts per million. Trade value is always
//! `price_micro * qty_scaled / 10^6` in `i128` intermediates, so replaying
//! the journal reproduces balances exactly.
//!
//! ## Concurrency
//!
//! One matcher thread owns all mutable state and drains a lock-free
//! command ring ([`engine::ExchangeHandle`]); producers get replies over
//! oneshot channels. Read paths take a read lock for snapshot copies and
//! never block the matcher beyond the copy itself. Product mark and last
//! prices publish through atomic cells.
//!
//! ## Example
//!
//! ```no_run
//! use exchange_core_rs::accounting::AccountingEngine;
//! use exchange_core_rs::config::CoreConfig;
//! use exchange_core_rs::engine::{ExchangeCore, ExchangeHandle, OrderRequest};
//! use exchange_core_rs::ledger::LedgerFiles;
//! use exchange_core_rs::money::{Money, Qty};
//! use exchange_core_rs::orderbook::{OrderKind, Side};
//! use exchange_core_rs::product::{FeeMode, FundingMode, ProductCatalog, ProductCategory, ProductDef};
//! use std::sync::Arc;
//!
//! let config = CoreConfig::from_env();
//! let catalog = Arc::new(ProductCatalog::new());
//! catalog.load(ProductDef {
//!     symbol: "XAU-SPOT".to_string(),
//!     category: ProductCategory::Spot,
//!     tick_size: 1_000_000,
//!     lot_size: Qty::from_scaled(1_000),
//!     min_order: Qty::from_scaled(1_000),
//!     max_order: Qty::from_units(1_000),
//!     min_notional: Money::from_mnt(1_000),
//!     initial_margin_ppm: 0,
//!     fee_mode: FeeMode::Spread { markup_ppm: 2_000 },
//!     funding_rate_ppm: 0,
//!     funding_mode: FundingMode::Static,
//!     reference_band_ppm: None,
//!     hedgeable: false,
//!     initial_mark_price: Money::from_mnt(100_000).as_micros() as u64,
//! });
//!
//! let accounting =
//!     AccountingEngine::open(&config.data_dir.join("journal.log"), config.reconcile_every)
//!         .expect("journal replay");
//! let ledgers = LedgerFiles::new(config.ledger_dir.clone());
//! let core = ExchangeCore::new(Arc::clone(&catalog), config, accounting, ledgers);
//! let handle = ExchangeHandle::start(core);
//!
//! handle.deposit(1, Money::from_mnt(1_000_000)).unwrap();
//! let ack = handle
//!     .submit(OrderRequest {
//!         user: 1,
//!         symbol: "XAU-SPOT".to_string(),
//!         side: Side::Buy,
//!         kind: OrderKind::Limit,
//!         limit_price: Some(Money::from_mnt(100_000).as_micros() as u64),
//!         stop_price: None,
//!         quantity: Qty::from_units(1),
//!         client_ref: None,
//!     })
//!     .unwrap();
//! println!("order {} resting, {} trades", ack.order_id, ack.trades.len());
//! ```

pub mod accounting;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod feeds;
pub mod ledger;
pub mod money;
pub mod orderbook;
pub mod position;
pub mod product;
pub mod risk;
mod utils;

pub use accounting::{AccountingEngine, EventKind, JournalEntry, Posting};
pub use config::CoreConfig;
pub use engine::{ExchangeCore, ExchangeHandle, OrderRequest, SubmitAck, Trade};
pub use error::{CoreError, RejectReason, RiskBreach};
pub use events::EventSinks;
pub use money::{Money, Qty};
pub use orderbook::{Order, OrderBook, OrderKind, OrderStatus, Side};
pub use position::{AccountView, Position, PositionManager};
pub use product::{Product, ProductCatalog, ProductCategory, ProductDef};
pub use risk::{BreakerState, CircuitBreaker, RiskEngine};
pub use utils::current_time_micros;
