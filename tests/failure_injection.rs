//! Failure injection tests: factory errors, closes and abandoned callers.

use async_trait::async_trait;
use connpool::load_balancer::round_robin::RoundRobin;
use connpool::{ConnPool, Node, Nodes, PoolError, PoolStats};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

mod common;

use common::{wait_until, MockFactory};

/// Wraps a backend and can report a failure from `close` after closing it.
struct FlakyClose<P> {
    inner: P,
    fail: bool,
}

#[async_trait]
impl<P: ConnPool> ConnPool for FlakyClose<P> {
    type Conn = P::Conn;

    async fn conn(&self) -> Result<Self::Conn, PoolError> {
        self.inner.conn().await
    }
    fn put(&self, conn: Self::Conn) {
        self.inner.put(conn)
    }
    fn close(&self) -> Result<(), PoolError> {
        self.inner.close()?;
        if self.fail {
            return Err(PoolError::Close("backend refused to shut down".into()));
        }
        Ok(())
    }
    fn set_max_open_conns(&self, n: i32) {
        self.inner.set_max_open_conns(n)
    }
    fn set_max_idle_conns(&self, n: i32) {
        self.inner.set_max_idle_conns(n)
    }
    fn stats(&self) -> PoolStats {
        self.inner.stats()
    }
}

#[tokio::test]
async fn test_direct_open_failure_restores_slot() {
    let factory = MockFactory::new();
    let node = Node::with_limits(factory.clone(), 1, 1).unwrap();

    factory.set_failing(true);
    let err = node.conn().await.unwrap_err();
    assert!(matches!(err, PoolError::Factory(_)));
    assert_eq!(node.stats().num_open, 0);

    factory.set_failing(false);
    let conn = node.conn().await.unwrap();
    assert_eq!(conn.raw().unwrap().id, 1);
}

#[tokio::test]
async fn test_opener_failure_reaches_single_waiter() {
    let factory = MockFactory::new();
    let node = Arc::new(Node::with_limits(factory.clone(), 1, 1).unwrap());

    let mut held = node.conn().await.unwrap();
    let before = node.stats().num_open;
    factory.set_failing(true);

    let waiter = {
        let node = node.clone();
        tokio::spawn(async move { node.conn().await })
    };
    wait_until(|| node.stats().waiters == 1).await;

    held.close().unwrap();
    let err = waiter.await.unwrap().unwrap_err();
    assert!(matches!(err, PoolError::Factory(_)));

    let stats = node.stats();
    assert_eq!(stats.pending_opens, 0);
    assert_eq!(stats.num_open, before - 1);
    assert_eq!(factory.closed(), 1);
}

#[tokio::test]
async fn test_opener_panic_fails_waiter_and_recovers() {
    let factory = MockFactory::new();
    let node = Arc::new(Node::with_limits(factory.clone(), 1, 1).unwrap());
    let mut held = node.conn().await.unwrap();
    factory.set_panicking(true);

    let waiter = {
        let node = node.clone();
        tokio::spawn(async move { node.conn().await })
    };
    wait_until(|| node.stats().waiters == 1).await;

    held.close().unwrap();
    let res = tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .expect("waiter hung after factory panic")
        .unwrap();
    assert!(matches!(res.unwrap_err(), PoolError::Factory(_)));

    let stats = node.stats();
    assert_eq!(stats.pending_opens, 0);
    assert_eq!(stats.num_open, 0);
    assert_eq!(stats.waiters, 0);

    // The opener is still alive and the slot is free again.
    factory.set_panicking(false);
    let conn = node.conn_timeout(Duration::from_secs(1)).await.unwrap();
    assert_eq!(conn.raw().unwrap().id, 2);
}

#[tokio::test]
async fn test_pending_opens_settle_after_close() {
    let factory = MockFactory::slow(Duration::from_millis(50));
    let node = Arc::new(Node::with_limits(factory.clone(), 1, 1).unwrap());
    let _held = node.conn().await.unwrap();

    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let node = node.clone();
            tokio::spawn(async move { node.conn().await })
        })
        .collect();
    wait_until(|| node.stats().waiters == 3).await;

    node.set_max_open_conns(4);
    assert_eq!(node.stats().pending_opens, 3);
    node.close().unwrap();

    for w in waiters {
        assert!(w.await.unwrap().unwrap_err().is_closed());
    }
    wait_until(|| node.stats().pending_opens == 0).await;
    assert!(factory.created() <= 2);
    wait_until(|| factory.closed() == factory.created() - 1).await;
}

#[tokio::test]
async fn test_unclaimed_open_is_closed_without_idle_room() {
    let factory = MockFactory::slow(Duration::from_millis(50));
    let node = Arc::new(Node::with_limits(factory.clone(), 1, -1).unwrap());
    let mut held = node.conn().await.unwrap();

    let waiter = {
        let node = node.clone();
        tokio::spawn(async move { node.conn().await })
    };
    wait_until(|| node.stats().waiters == 1).await;

    held.close().unwrap();
    assert_eq!(node.stats().pending_opens, 1);
    waiter.abort();
    let _ = waiter.await;
    assert_eq!(node.stats().waiters, 0);

    wait_until(|| node.stats().pending_opens == 0).await;
    assert_eq!(factory.created(), 2);
    assert_eq!(factory.closed(), 2);
    let stats = node.stats();
    assert_eq!(stats.num_open, 0);
    assert_eq!(stats.idle, 0);
}

#[tokio::test]
async fn test_waiters_are_served_fifo() {
    let node = Arc::new(Node::with_limits(MockFactory::new(), 1, 1).unwrap());
    let held = node.conn().await.unwrap();
    let (order_tx, mut order_rx) = mpsc::unbounded_channel();

    let mut waiters = Vec::new();
    for label in ["a", "b", "c"] {
        let task_node = node.clone();
        let order_tx = order_tx.clone();
        let expected = waiters.len() + 1;
        waiters.push(tokio::spawn(async move {
            let conn = task_node.conn().await.unwrap();
            order_tx.send(label).unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
            task_node.put(conn);
        }));
        wait_until(|| node.stats().waiters == expected).await;
    }

    node.put(held);
    for w in waiters {
        w.await.unwrap();
    }

    let mut order = Vec::new();
    while let Ok(label) = order_rx.try_recv() {
        order.push(label);
    }
    assert_eq!(order, vec!["a", "b", "c"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_close_resolves_every_waiter() {
    let node = Arc::new(Node::with_limits(MockFactory::new(), 2, 2).unwrap());
    let _a = node.conn().await.unwrap();
    let _b = node.conn().await.unwrap();

    let waiters: Vec<_> = (0..32)
        .map(|_| {
            let node = node.clone();
            tokio::spawn(async move { node.conn().await })
        })
        .collect();
    wait_until(|| node.stats().waiters == 32).await;

    node.close().unwrap();
    for w in waiters {
        let res = tokio::time::timeout(Duration::from_secs(5), w)
            .await
            .expect("waiter hung after close")
            .unwrap();
        assert!(res.unwrap_err().is_closed());
    }
    assert_eq!(node.stats().waiters, 0);
}

#[tokio::test]
async fn test_connection_opened_after_close_is_discarded() {
    let factory = MockFactory::slow(Duration::from_millis(50));
    let node = Arc::new(Node::with_limits(factory.clone(), 1, 1).unwrap());
    let mut held = node.conn().await.unwrap();

    let waiter = {
        let node = node.clone();
        tokio::spawn(async move { node.conn().await })
    };
    wait_until(|| node.stats().waiters == 1).await;

    // Frees the slot; the opener starts a slow create for the waiter.
    held.close().unwrap();
    wait_until(|| node.stats().pending_opens == 1).await;
    node.close().unwrap();

    assert!(waiter.await.unwrap().unwrap_err().is_closed());
    wait_until(|| factory.closed() == 2).await;
    assert_eq!(factory.created(), 2);
    assert_eq!(node.stats().idle, 0);
}

#[tokio::test]
async fn test_abandoned_waiter_is_removed() {
    let factory = MockFactory::new();
    let node = Arc::new(Node::with_limits(factory.clone(), 1, 1).unwrap());
    let held = node.conn().await.unwrap();

    let waiter = {
        let node = node.clone();
        tokio::spawn(async move { node.conn().await })
    };
    wait_until(|| node.stats().waiters == 1).await;

    waiter.abort();
    let _ = waiter.await;
    wait_until(|| node.stats().waiters == 0).await;

    node.put(held);
    let stats = node.stats();
    assert_eq!(stats.idle, 1);
    assert_eq!(stats.num_open, 1);
    assert_eq!(factory.created(), 1);
}

#[tokio::test]
async fn test_aggregate_close_is_total() {
    let factories: Vec<_> = (0..3).map(|_| MockFactory::new()).collect();
    let backends = factories
        .iter()
        .enumerate()
        .map(|(i, f)| FlakyClose {
            inner: Node::new(f.clone()).unwrap(),
            fail: i != 2,
        })
        .collect();
    let nodes = Nodes::from_backends(backends, Box::new(RoundRobin::new())).unwrap();
    let conn = nodes.conn().await.unwrap();
    assert_eq!(conn.backend(), 0);

    let err = nodes.close().unwrap_err();
    assert!(err.to_string().contains("backend #1"));
    let PoolError::CloseAll(errs) = err else {
        panic!("expected aggregate close error");
    };
    let failed: Vec<usize> = errs.errors().iter().map(|(i, _)| *i).collect();
    assert_eq!(failed, vec![0, 1]);

    for backend in nodes.backends() {
        assert!(backend.stats().closed);
    }
    assert!(nodes.conn().await.unwrap_err().is_closed());

    // Released after close: discarded by its owner.
    nodes.put(conn);
    assert_eq!(factories[0].closed(), 1);
    assert_eq!(nodes.backends()[0].stats().idle, 0);
}
