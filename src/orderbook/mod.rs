//! Per-symbol order book: order model, arena storage, price levels and the
//! matching walk.

mod arena;
mod book;
mod depth;
mod matching;
mod order;

pub use arena::OrderArena;
pub use book::OrderBook;
pub use depth::{Bbo, DepthLevel, DepthSnapshot};
pub use matching::Fill;
pub use order::{Order, OrderKind, OrderStatus, Side};
