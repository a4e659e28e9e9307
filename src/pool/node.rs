//! Single-backend pool.
//!
//! # Responsibilities
//! - Track live, idle and pending connections for one factory
//! - Enforce `max_open` / `max_idle`
//! - Queue callers FIFO once saturated
//! - Run the opener task that creates connections for queued callers

use async_trait::async_trait;
use futures_util::FutureExt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, oneshot};

use crate::observability::metrics;
use crate::pool::conn::PooledConn;
use crate::pool::error::PoolError;
use crate::pool::{ConnFactory, ConnPool, PoolStats, Resource};

/// Idle connections kept when `max_idle` was never set.
pub const DEFAULT_MAX_IDLE: usize = 2;

type Reply<R> = Result<PooledConn<R>, PoolError>;

struct Waiter<R: Resource> {
    id: u64,
    tx: oneshot::Sender<Reply<R>>,
}

pub(crate) struct State<R: Resource> {
    /// 0 means unlimited.
    max_open: usize,
    /// 0 means default, negative means none.
    max_idle: i32,
    num_open: usize,
    pending_opens: usize,
    /// Most recently released first.
    idle: VecDeque<R>,
    waiters: VecDeque<Waiter<R>>,
    next_waiter_id: u64,
    closed: bool,
    /// Dropped on close, which stops the opener.
    opener_tx: Option<mpsc::UnboundedSender<()>>,
}

impl<R: Resource> State<R> {
    fn max_idle(&self) -> usize {
        match self.max_idle {
            0 => DEFAULT_MAX_IDLE,
            n if n < 0 => 0,
            n => n as usize,
        }
    }

    fn saturated(&self) -> bool {
        self.max_open > 0 && self.num_open + self.pending_opens >= self.max_open
    }

    fn maybe_open_new_connections(&mut self) {
        let mut requests = self.waiters.len().saturating_sub(self.pending_opens);
        if self.max_open > 0 {
            let can_open = self
                .max_open
                .saturating_sub(self.num_open + self.pending_opens);
            requests = requests.min(can_open);
        }
        let Some(tx) = &self.opener_tx else {
            return;
        };
        for _ in 0..requests {
            if tx.send(()).is_err() {
                break;
            }
            self.pending_opens += 1;
        }
    }

    /// Give `raw` to the oldest waiter still listening. Returns it if there is none.
    fn hand_to_waiter(&mut self, raw: R, owner: &Weak<Shared<R>>) -> Option<R> {
        let mut conn = PooledConn::new(raw, owner.clone());
        while let Some(waiter) = self.waiters.pop_front() {
            match waiter.tx.send(Ok(conn)) {
                Ok(()) => return None,
                Err(Ok(returned)) => conn = returned,
                Err(Err(_)) => unreachable!("only a connection was sent"),
            }
        }
        conn.into_raw()
    }

    /// Deliver `err` to the oldest waiter still listening. Returns it if there is none.
    fn fail_waiter(&mut self, mut err: PoolError) -> Option<PoolError> {
        while let Some(waiter) = self.waiters.pop_front() {
            match waiter.tx.send(Err(err)) {
                Ok(()) => return None,
                Err(Err(returned)) => err = returned,
                Err(Ok(_)) => unreachable!("only an error was sent"),
            }
        }
        Some(err)
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            num_open: self.num_open,
            pending_opens: self.pending_opens,
            idle: self.idle.len(),
            waiters: self.waiters.len(),
            max_open: self.max_open,
            max_idle: self.max_idle(),
            closed: self.closed,
        }
    }
}

/// State shared between the node, its opener task and every handle it gave out.
pub(crate) struct Shared<R: Resource> {
    name: String,
    state: Mutex<State<R>>,
    this: Weak<Shared<R>>,
}

impl<R: Resource> Shared<R> {
    /// Release path: oldest waiter, then idle list, else discard.
    pub(crate) fn put_conn(&self, raw: R) {
        let discarded = {
            let mut state = self.state.lock();
            if state.closed {
                state.num_open = state.num_open.saturating_sub(1);
                Some(raw)
            } else {
                match state.hand_to_waiter(raw, &self.this) {
                    None => None,
                    Some(raw) if state.idle.len() < state.max_idle() => {
                        state.idle.push_front(raw);
                        None
                    }
                    Some(raw) => {
                        state.num_open = state.num_open.saturating_sub(1);
                        state.maybe_open_new_connections();
                        Some(raw)
                    }
                }
            }
        };

        if let Some(raw) = discarded {
            tracing::trace!(node = %self.name, "Discarding released connection");
            metrics::record_discarded(&self.name);
            close_quietly(raw);
        }
    }

    /// A handle closed its resource: free the slot.
    pub(crate) fn close_conn(&self) {
        let mut state = self.state.lock();
        state.num_open = state.num_open.saturating_sub(1);
        state.maybe_open_new_connections();
    }

    fn remove_waiter(&self, id: u64) {
        let mut state = self.state.lock();
        if let Some(pos) = state.waiters.iter().position(|w| w.id == id) {
            state.waiters.remove(pos);
            tracing::trace!(node = %self.name, waiter = id, "Abandoned waiter removed");
        }
    }
}

/// Close a resource that has already left the pool's accounting.
pub(crate) fn close_quietly<R: Resource>(raw: R) {
    if let Err(e) = raw.close() {
        tracing::debug!(error = %e, "Failed to close discarded connection");
    }
}

/// Removes a queued request if the waiting caller goes away first.
struct WaitGuard<'a, R: Resource> {
    shared: &'a Shared<R>,
    id: Option<u64>,
}

impl<R: Resource> Drop for WaitGuard<'_, R> {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            self.shared.remove_waiter(id);
        }
    }
}

/// Gives back an optimistically reserved slot if an inline open is abandoned.
struct SlotGuard<'a, R: Resource> {
    shared: &'a Shared<R>,
    armed: bool,
}

impl<R: Resource> Drop for SlotGuard<'_, R> {
    fn drop(&mut self) {
        if self.armed {
            self.shared.close_conn();
        }
    }
}

/// A pool of connections produced by a single factory.
///
/// Must be created inside a Tokio runtime: each node owns one background
/// task that creates connections for queued callers. The task ends when the
/// node is closed or dropped.
pub struct Node<F: ConnFactory> {
    shared: Arc<Shared<F::Conn>>,
    factory: Arc<F>,
}

impl<F: ConnFactory> Node<F> {
    pub fn new(factory: F) -> Result<Self, PoolError> {
        Self::with_name("node", factory)
    }

    /// Create a node whose logs and metrics are labelled `name`.
    pub fn with_name(name: impl Into<String>, factory: F) -> Result<Self, PoolError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            PoolError::Construction("node must be created inside a Tokio runtime".into())
        })?;

        let (opener_tx, opener_rx) = mpsc::unbounded_channel();
        let name = name.into();
        let shared = Arc::new_cyclic(|this| Shared {
            name: name.clone(),
            state: Mutex::new(State {
                max_open: 0,
                max_idle: 0,
                num_open: 0,
                pending_opens: 0,
                idle: VecDeque::new(),
                waiters: VecDeque::new(),
                next_waiter_id: 0,
                closed: false,
                opener_tx: Some(opener_tx),
            }),
            this: this.clone(),
        });
        let factory = Arc::new(factory);

        runtime.spawn(run_opener(shared.clone(), factory.clone(), opener_rx));
        tracing::debug!(node = %name, "Node created");

        Ok(Self { shared, factory })
    }

    /// Create a node with both limits applied.
    pub fn with_limits(factory: F, max_open: i32, max_idle: i32) -> Result<Self, PoolError> {
        let node = Self::new(factory)?;
        node.set_max_open_conns(max_open);
        node.set_max_idle_conns(max_idle);
        Ok(node)
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// The factory backing this node.
    pub fn factory(&self) -> &F {
        &self.factory
    }

    fn wrap(&self, raw: F::Conn) -> PooledConn<F::Conn> {
        PooledConn::new(raw, Arc::downgrade(&self.shared))
    }

    async fn open_inline(&self) -> Result<PooledConn<F::Conn>, PoolError> {
        let mut slot = SlotGuard {
            shared: &self.shared,
            armed: true,
        };
        let res = self.factory.create().await;
        match res {
            Ok(raw) => {
                slot.armed = false;
                metrics::record_opened(&self.shared.name);
                Ok(self.wrap(raw))
            }
            Err(e) => {
                metrics::record_factory_error(&self.shared.name);
                Err(PoolError::Factory(e))
            }
        }
    }

    async fn wait(
        &self,
        id: u64,
        rx: oneshot::Receiver<Reply<F::Conn>>,
    ) -> Result<PooledConn<F::Conn>, PoolError> {
        let mut guard = WaitGuard {
            shared: &self.shared,
            id: Some(id),
        };
        let reply = rx.await;
        guard.id = None;
        match reply {
            Ok(res) => res,
            Err(_) => Err(PoolError::Closed),
        }
    }
}

#[async_trait]
impl<F: ConnFactory> ConnPool for Node<F> {
    type Conn = PooledConn<F::Conn>;

    async fn conn(&self) -> Result<Self::Conn, PoolError> {
        let queued = {
            let mut state = self.shared.state.lock();
            if state.closed {
                return Err(PoolError::Closed);
            }
            if let Some(raw) = state.idle.pop_front() {
                drop(state);
                return Ok(self.wrap(raw));
            }
            if state.saturated() || !state.waiters.is_empty() {
                let (tx, rx) = oneshot::channel();
                let id = state.next_waiter_id;
                state.next_waiter_id += 1;
                state.waiters.push_back(Waiter { id, tx });
                state.maybe_open_new_connections();
                Some((id, rx))
            } else {
                // optimistically
                state.num_open += 1;
                None
            }
        };

        match queued {
            Some((id, rx)) => {
                metrics::record_wait(&self.shared.name);
                self.wait(id, rx).await
            }
            None => self.open_inline().await,
        }
    }

    fn put(&self, conn: Self::Conn) {
        conn.release();
    }

    fn close(&self) -> Result<(), PoolError> {
        let waiters = {
            let mut state = self.shared.state.lock();
            if state.closed {
                return Ok(());
            }
            state.closed = true;
            state.opener_tx = None;
            std::mem::take(&mut state.waiters)
        };

        tracing::info!(
            node = %self.shared.name,
            waiters = waiters.len(),
            "Node closed"
        );
        for waiter in waiters {
            let _ = waiter.tx.send(Err(PoolError::Closed));
        }
        Ok(())
    }

    fn set_max_open_conns(&self, n: i32) {
        let sync_max_idle = {
            let mut state = self.shared.state.lock();
            state.max_open = if n > 0 { n as usize } else { 0 };
            state.maybe_open_new_connections();
            state.max_open > 0 && state.max_idle() > state.max_open
        };
        if sync_max_idle {
            self.set_max_idle_conns(n);
        }
    }

    fn set_max_idle_conns(&self, n: i32) {
        let evicted = {
            let mut state = self.shared.state.lock();
            state.max_idle = if n > 0 { n } else { -1 };
            if state.max_open > 0 && state.max_idle() > state.max_open {
                state.max_idle = state.max_open as i32;
            }
            let keep = state.max_idle();
            if state.idle.len() > keep {
                let evicted = state.idle.split_off(keep);
                state.num_open = state.num_open.saturating_sub(evicted.len());
                state.maybe_open_new_connections();
                evicted
            } else {
                VecDeque::new()
            }
        };

        if !evicted.is_empty() {
            tracing::debug!(
                node = %self.shared.name,
                evicted = evicted.len(),
                "Evicting idle connections"
            );
        }
        for raw in evicted {
            close_quietly(raw);
        }
    }

    fn stats(&self) -> PoolStats {
        self.shared.state.lock().stats()
    }
}

impl<F: ConnFactory> Drop for Node<F> {
    fn drop(&mut self) {
        let _ = self.close();

        let idle = {
            let mut state = self.shared.state.lock();
            let idle = std::mem::take(&mut state.idle);
            state.num_open = state.num_open.saturating_sub(idle.len());
            idle
        };
        for raw in idle {
            close_quietly(raw);
        }
    }
}

impl<F: ConnFactory> fmt::Debug for Node<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.shared.name)
            .field("stats", &self.stats())
            .finish()
    }
}

async fn run_opener<F: ConnFactory>(
    shared: Arc<Shared<F::Conn>>,
    factory: Arc<F>,
    mut rx: mpsc::UnboundedReceiver<()>,
) {
    tracing::debug!(node = %shared.name, "Opener started");
    while rx.recv().await.is_some() {
        {
            // Tokens left over at close are never served.
            let mut state = shared.state.lock();
            if state.closed {
                state.pending_opens = state.pending_opens.saturating_sub(1);
                continue;
            }
        }
        open_new_connection(&shared, &*factory).await;
    }
    tracing::debug!(node = %shared.name, "Opener stopped");
}

async fn open_new_connection<F: ConnFactory>(shared: &Shared<F::Conn>, factory: &F) {
    let res = match AssertUnwindSafe(factory.create()).catch_unwind().await {
        Ok(res) => res,
        Err(_) => {
            tracing::error!(node = %shared.name, "Connection factory panicked");
            Err("connection factory panicked".into())
        }
    };

    let leftover = {
        let mut state = shared.state.lock();
        state.pending_opens = state.pending_opens.saturating_sub(1);
        if state.closed {
            res.ok()
        } else {
            match res {
                Err(e) => {
                    metrics::record_factory_error(&shared.name);
                    if let Some(err) = state.fail_waiter(PoolError::Factory(e)) {
                        tracing::debug!(node = %shared.name, error = %err, "Factory failed with no waiter");
                    }
                    state.maybe_open_new_connections();
                    None
                }
                Ok(raw) => {
                    metrics::record_opened(&shared.name);
                    match state.hand_to_waiter(raw, &shared.this) {
                        None => {
                            state.num_open += 1;
                            None
                        }
                        Some(raw) if state.idle.len() < state.max_idle() => {
                            state.idle.push_front(raw);
                            state.num_open += 1;
                            None
                        }
                        Some(raw) => Some(raw),
                    }
                }
            }
        }
    };

    if let Some(raw) = leftover {
        tracing::trace!(node = %shared.name, "Opened connection not needed, closing");
        close_quietly(raw);
    }
}
