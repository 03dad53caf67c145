//! The matching engine: submission pipeline, per-trade settlement, and the
//! single-threaded command ingress.

mod core;
mod ingress;

pub use core::{ExchangeCore, OrderRequest, SubmitAck, Trade};
pub use ingress::ExchangeHandle;
