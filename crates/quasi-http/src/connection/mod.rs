//! Connection and transport contracts consumed by the transfer engine.
//!
//! The engine only ever sees the narrow [`Connection`] interface: read bytes, write bytes and
//! release. Transports hand out connections, either by allocating one toward an endpoint
//! ([`ClientTransport`]) or by accepting one from a peer ([`ServerTransport`]).
//!
//! # Components
//!
//! - [`StreamConnection`]: adapts tokio `AsyncRead`/`AsyncWrite` halves, such as split TCP
//!   streams or `tokio::io::duplex`
//! - [`MemoryNetwork`], [`MemoryListener`], [`MemoryConnection`]: an in-memory transport built on
//!   [`PipeBody`](crate::protocol::body::PipeBody)

mod memory;
mod stream_connection;

pub use memory::DEFAULT_WRITE_CAPACITY;
pub use memory::ENDPOINT_KEY;
pub use memory::MemoryConnection;
pub use memory::MemoryListener;
pub use memory::MemoryNetwork;
pub use stream_connection::StreamConnection;

use std::fmt::Debug;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::SendOptions;
use crate::protocol::Environment;

/// A duplex byte connection serving exactly one exchange.
#[async_trait]
pub trait Connection: Send + Sync + Debug {
    /// Reads into `buf`; `0` means the peer will send nothing more.
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

    async fn write_all(&self, buf: &[u8]) -> io::Result<()>;

    /// Releases the connection. The engine calls this at most once per connection, but
    /// implementations must tolerate being asked to release an already closed connection.
    async fn release(&self) -> io::Result<()>;

    /// Side information the transport attaches to exchanges on this connection.
    fn environment(&self) -> Environment {
        Environment::new()
    }
}

/// A freshly allocated client connection.
#[derive(Debug)]
pub struct Allocation {
    pub connection: Arc<dyn Connection>,
    pub environment: Environment,
}

impl Allocation {
    pub fn new(connection: Arc<dyn Connection>) -> Self {
        Self { connection, environment: Environment::new() }
    }
}

/// Allocates connections for the send role.
#[async_trait]
pub trait ClientTransport: Send + Sync {
    type Endpoint: Send + Sync + ?Sized;

    async fn allocate_connection(&self, endpoint: &Self::Endpoint, options: &SendOptions) -> io::Result<Allocation>;
}

/// Accepts connections for the receive role.
#[async_trait]
pub trait ServerTransport: Send + Sync {
    /// Waits for the next connection; `None` means the transport is closed.
    async fn accept(&self) -> io::Result<Option<Arc<dyn Connection>>>;
}
