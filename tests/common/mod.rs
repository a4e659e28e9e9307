//! Shared utilities for integration and load testing.

#![allow(dead_code)]

use async_trait::async_trait;
use connpool::{BoxError, ConnFactory, Resource};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;

/// A factory that counts what it creates and can be told to fail.
#[derive(Debug, Default)]
pub struct MockFactory {
    pub created: AtomicUsize,
    pub closed: Arc<AtomicUsize>,
    pub fail: AtomicBool,
    pub panic: AtomicBool,
    /// Artificial latency per create, in milliseconds.
    pub delay_ms: AtomicU64,
}

impl MockFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        let factory = Self::default();
        factory.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
        Arc::new(factory)
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_panicking(&self, panic: bool) {
        self.panic.store(panic, Ordering::SeqCst);
    }
}

#[derive(Debug)]
pub struct MockConn {
    pub id: usize,
    closed: Arc<AtomicUsize>,
}

impl Resource for MockConn {
    fn close(self) -> Result<(), BoxError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl ConnFactory for MockFactory {
    type Conn = MockConn;

    async fn create(&self) -> Result<MockConn, BoxError> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.panic.load(Ordering::SeqCst) {
            panic!("factory blew up");
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err("backend refused connection".into());
        }
        let id = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(MockConn {
            id,
            closed: self.closed.clone(),
        })
    }
}

/// Poll `cond` until it holds, panicking after five seconds.
pub async fn wait_until<F: Fn() -> bool>(cond: F) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("condition not reached within 5s");
}

/// Start a mock backend that accepts connections and holds them open until the peer closes.
///
/// Returns its address and a counter of accepted connections.
pub async fn start_mock_backend() -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(async move {
                        let mut buf = [0u8; 64];
                        while let Ok(n) = socket.read(&mut buf).await {
                            if n == 0 {
                                break;
                            }
                        }
                    });
                }
                Err(_) => break,
            }
        }
    });

    (addr, accepted)
}
