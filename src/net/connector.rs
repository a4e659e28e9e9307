//! TCP connection factory.

use async_trait::async_trait;
use std::net::{Shutdown, SocketAddr};
use std::time::Duration;
use tokio::net::TcpStream;

use crate::config::BackendConfig;
use crate::net::connection::ConnectionId;
use crate::pool::{BoxError, ConnFactory, Resource};

/// Opens TCP connections to one backend address.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: SocketAddr,
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(addr: SocketAddr, connect_timeout: Duration) -> Self {
        Self {
            addr,
            connect_timeout,
        }
    }

    /// Build a connector from backend configuration.
    pub fn from_config(config: &BackendConfig) -> Result<Self, std::net::AddrParseError> {
        Ok(Self::new(config.address.parse()?, config.connect_timeout()))
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

#[async_trait]
impl ConnFactory for TcpConnector {
    type Conn = TcpConn;

    async fn create(&self) -> Result<TcpConn, BoxError> {
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(self.addr))
            .await
            .map_err(|_| {
                format!(
                    "connect to {} timed out after {:?}",
                    self.addr, self.connect_timeout
                )
            })??;
        stream.set_nodelay(true)?;

        let conn = TcpConn {
            id: ConnectionId::new(),
            peer: self.addr,
            stream,
        };
        tracing::trace!(connection_id = %conn.id, peer = %conn.peer, "Backend connection opened");
        Ok(conn)
    }
}

/// A pooled TCP connection.
#[derive(Debug)]
pub struct TcpConn {
    id: ConnectionId,
    peer: SocketAddr,
    stream: TcpStream,
}

impl TcpConn {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }
}

impl Resource for TcpConn {
    fn close(self) -> Result<(), BoxError> {
        tracing::trace!(connection_id = %self.id, "Backend connection closed");
        let stream = self.stream.into_std()?;
        match stream.shutdown(Shutdown::Both) {
            Err(e) if e.kind() != std::io::ErrorKind::NotConnected => Err(e.into()),
            _ => Ok(()),
        }
    }
}
