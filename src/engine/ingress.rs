//! Command ingress and the matcher thread.
//!
//! Producers push commands onto a lock-free ring and the single matcher
//! thread drains them in arrival order, executing each against the core
//! under the write lock. Replies travel back over oneshot channels, so
//! callers can block or await without ever touching the core themselves.
//! Read paths (depth, accounts, statements) take the read lock directly
//! and never queue behind submissions.

use super::core::{ExchangeCore, OrderRequest, SubmitAck};
use crate::error::RejectReason;
use crate::money::{Money, Qty};
use crate::orderbook::{Bbo, DepthSnapshot, Order};
use crate::position::AccountView;
use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{info, warn};

/// Default ingress ring capacity.
const DEFAULT_RING_CAPACITY: usize = 16_384;

/// A command executed by the matcher thread.
enum EngineCommand {
    Submit {
        request: OrderRequest,
        reply: oneshot::Sender<Result<SubmitAck, RejectReason>>,
    },
    Cancel {
        user: u64,
        order_id: u64,
        reply: oneshot::Sender<Result<Order, RejectReason>>,
    },
    Modify {
        user: u64,
        order_id: u64,
        new_price: u64,
        new_quantity: Qty,
        reply: oneshot::Sender<Result<SubmitAck, RejectReason>>,
    },
    CancelAll {
        user: u64,
        reply: oneshot::Sender<Vec<u64>>,
    },
    Deposit {
        user: u64,
        amount: Money,
        reply: oneshot::Sender<Result<(), RejectReason>>,
    },
    Withdraw {
        user: u64,
        amount: Money,
        reply: oneshot::Sender<Result<(), RejectReason>>,
    },
}

/// Handle to a running exchange: lock-free command ingress plus read
/// access to the core.
///
/// The handle does not implement `Clone`; wrap it in an `Arc` to share
/// between producers.
pub struct ExchangeHandle {
    core: Arc<RwLock<ExchangeCore>>,
    queue: Arc<ArrayQueue<EngineCommand>>,
    running: Arc<AtomicBool>,
    matcher_thread: thread::Thread,
    matcher: Option<JoinHandle<()>>,
}

impl ExchangeHandle {
    /// Take ownership of the core and start the matcher thread.
    #[must_use]
    pub fn start(core: ExchangeCore) -> Self {
        Self::start_with_capacity(core, DEFAULT_RING_CAPACITY)
    }

    /// Start with an explicit ingress ring capacity.
    #[must_use]
    pub fn start_with_capacity(core: ExchangeCore, capacity: usize) -> Self {
        let core = Arc::new(RwLock::new(core));
        let queue: Arc<ArrayQueue<EngineCommand>> = Arc::new(ArrayQueue::new(capacity.max(1)));
        let running = Arc::new(AtomicBool::new(true));

        let matcher_core = Arc::clone(&core);
        let matcher_queue = Arc::clone(&queue);
        let matcher_running = Arc::clone(&running);
        let matcher = thread::Builder::new()
            .name("matcher".to_string())
            .spawn(move || {
                info!("matcher thread started");
                loop {
                    match matcher_queue.pop() {
                        Some(command) => {
                            let mut core = matcher_core.write().unwrap_or_else(|e| e.into_inner());
                            dispatch(&mut core, command);
                        }
                        None => {
                            if !matcher_running.load(Ordering::Acquire) {
                                break;
                            }
                            // Idle: sleep until a producer unparks us.
                            thread::park_timeout(Duration::from_millis(1));
                        }
                    }
                }
                info!("matcher thread stopped");
            })
            .expect("failed to spawn matcher thread");
        let matcher_thread = matcher.thread().clone();

        Self {
            core,
            queue,
            running,
            matcher_thread,
            matcher: Some(matcher),
        }
    }

    fn push(&self, command: EngineCommand) -> bool {
        let accepted = self.queue.push(command).is_ok();
        if accepted {
            self.matcher_thread.unpark();
        } else {
            warn!("ingress ring full, command dropped");
        }
        accepted
    }

    /// Submit an order and block until the matcher replies.
    pub fn submit(&self, request: OrderRequest) -> Result<SubmitAck, RejectReason> {
        let (reply, rx) = oneshot::channel();
        if !self.push(EngineCommand::Submit { request, reply }) {
            return Err(RejectReason::IntakeStopped);
        }
        rx.blocking_recv().unwrap_or(Err(RejectReason::IntakeStopped))
    }

    /// Submit an order from an async context.
    pub async fn submit_async(&self, request: OrderRequest) -> Result<SubmitAck, RejectReason> {
        let (reply, rx) = oneshot::channel();
        if !self.push(EngineCommand::Submit { request, reply }) {
            return Err(RejectReason::IntakeStopped);
        }
        rx.await.unwrap_or(Err(RejectReason::IntakeStopped))
    }

    /// Cancel an order and block until the matcher replies.
    pub fn cancel(&self, user: u64, order_id: u64) -> Result<Order, RejectReason> {
        let (reply, rx) = oneshot::channel();
        if !self.push(EngineCommand::Cancel { user, order_id, reply }) {
            return Err(RejectReason::IntakeStopped);
        }
        rx.blocking_recv().unwrap_or(Err(RejectReason::IntakeStopped))
    }

    /// Modify = atomic cancel plus resubmit; time priority is lost.
    pub fn modify(
        &self,
        user: u64,
        order_id: u64,
        new_price: u64,
        new_quantity: Qty,
    ) -> Result<SubmitAck, RejectReason> {
        let (reply, rx) = oneshot::channel();
        if !self.push(EngineCommand::Modify {
            user,
            order_id,
            new_price,
            new_quantity,
            reply,
        }) {
            return Err(RejectReason::IntakeStopped);
        }
        rx.blocking_recv().unwrap_or(Err(RejectReason::IntakeStopped))
    }

    /// Cancel all of a user's open orders.
    pub fn cancel_all(&self, user: u64) -> Vec<u64> {
        let (reply, rx) = oneshot::channel();
        if !self.push(EngineCommand::CancelAll { user, reply }) {
            return Vec::new();
        }
        rx.blocking_recv().unwrap_or_default()
    }

    /// Customer deposit through the command queue.
    pub fn deposit(&self, user: u64, amount: Money) -> Result<(), RejectReason> {
        let (reply, rx) = oneshot::channel();
        if !self.push(EngineCommand::Deposit { user, amount, reply }) {
            return Err(RejectReason::IntakeStopped);
        }
        rx.blocking_recv().unwrap_or(Err(RejectReason::IntakeStopped))
    }

    /// Customer withdrawal through the command queue.
    pub fn withdraw(&self, user: u64, amount: Money) -> Result<(), RejectReason> {
        let (reply, rx) = oneshot::channel();
        if !self.push(EngineCommand::Withdraw { user, amount, reply }) {
            return Err(RejectReason::IntakeStopped);
        }
        rx.blocking_recv().unwrap_or(Err(RejectReason::IntakeStopped))
    }

    /// Depth snapshot under the read lock.
    #[must_use]
    pub fn depth(&self, symbol: &str, levels: usize) -> Option<DepthSnapshot> {
        self.read(|core| core.depth(symbol, levels))
    }

    /// Best bid and offer under the read lock.
    #[must_use]
    pub fn bbo(&self, symbol: &str) -> Option<Bbo> {
        self.read(|core| core.bbo(symbol))
    }

    /// Account view under the read lock.
    #[must_use]
    pub fn account(&self, user: u64) -> AccountView {
        self.read(|core| core.account(user))
    }

    /// A user's open orders under the read lock.
    #[must_use]
    pub fn user_orders(&self, user: u64) -> Vec<Order> {
        self.read(|core| core.user_orders(user))
    }

    /// Run a closure against the core under the read lock. Snapshot
    /// copies only; the closure must not block.
    pub fn read<T>(&self, f: impl FnOnce(&ExchangeCore) -> T) -> T {
        let core = self.core.read().unwrap_or_else(|e| e.into_inner());
        f(&core)
    }

    /// Run a closure against the core under the write lock, bypassing the
    /// queue. For composition-root maintenance (quotes, funding, admin),
    /// not for order flow.
    pub fn with_core<T>(&self, f: impl FnOnce(&mut ExchangeCore) -> T) -> T {
        let mut core = self.core.write().unwrap_or_else(|e| e.into_inner());
        f(&mut core)
    }

    /// Stop the matcher thread and wait for it to drain the ring.
    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::Release);
        self.matcher_thread.unpark();
        if let Some(handle) = self.matcher.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ExchangeHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn dispatch(core: &mut ExchangeCore, command: EngineCommand) {
    match command {
        EngineCommand::Submit { request, reply } => {
            let _ = reply.send(core.submit(request));
        }
        EngineCommand::Cancel { user, order_id, reply } => {
            let _ = reply.send(core.cancel(user, order_id));
        }
        EngineCommand::Modify {
            user,
            order_id,
            new_price,
            new_quantity,
            reply,
        } => {
            let _ = reply.send(core.modify(user, order_id, new_price, new_quantity));
        }
        EngineCommand::CancelAll { user, reply } => {
            let _ = reply.send(core.cancel_all(user));
        }
        EngineCommand::Deposit { user, amount, reply } => {
            let _ = reply.send(core.deposit(user, amount));
        }
        EngineCommand::Withdraw { user, amount, reply } => {
            let _ = reply.send(core.withdraw(user, amount));
        }
    }
}
