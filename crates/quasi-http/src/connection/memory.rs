//! In-memory transport.
//!
//! Each direction of a [`MemoryConnection`] is a [`PipeBody`]: the writer enqueues, the peer's
//! reads drain. A writer runs ahead of its peer by up to `write_capacity` unread bytes and then
//! waits until the peer catches up.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use futures::FutureExt;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::config::SendOptions;
use crate::connection::{Allocation, ClientTransport, Connection, ServerTransport};
use crate::protocol::body::{Body, PipeBody};
use crate::protocol::{BodyError, Environment};

/// Default number of unread bytes a writer may run ahead of its peer.
pub const DEFAULT_WRITE_CAPACITY: usize = 64 * 1024;

/// Environment key under which memory connections record the endpoint they belong to.
pub const ENDPOINT_KEY: &str = "endpoint";

const ACCEPT_BACKLOG: usize = 64;

/// One end of an in-memory duplex connection.
#[derive(Debug)]
pub struct MemoryConnection {
    inbound: PipeBody,
    outbound: PipeBody,
    write_capacity: usize,
    environment: Environment,
}

impl MemoryConnection {
    /// Creates two connected ends.
    pub fn pair(write_capacity: usize) -> (MemoryConnection, MemoryConnection) {
        let a_to_b = PipeBody::new(-1);
        let b_to_a = PipeBody::new(-1);
        let a = MemoryConnection {
            inbound: b_to_a.clone(),
            outbound: a_to_b.clone(),
            write_capacity,
            environment: Environment::new(),
        };
        let b = MemoryConnection { inbound: a_to_b, outbound: b_to_a, write_capacity, environment: Environment::new() };
        (a, b)
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }
}

fn into_io_error(e: BodyError) -> io::Error {
    match e {
        BodyError::Io { source } => io::Error::new(source.kind(), source.to_string()),
        BodyError::EndOfRead | BodyError::EndOfWrite => io::Error::new(io::ErrorKind::BrokenPipe, e),
        other => io::Error::other(other),
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.inbound.read(buf).await.map_err(into_io_error)
    }

    async fn write_all(&self, buf: &[u8]) -> io::Result<()> {
        let write = self.outbound.write(Bytes::copy_from_slice(buf), false);
        if self.outbound.buffered_len() <= self.write_capacity {
            // the write stays queued for the peer when the pending future is dropped
            return match write.now_or_never() {
                Some(Err(e)) => Err(into_io_error(e)),
                _ => Ok(()),
            };
        }

        trace!(buffered = self.outbound.buffered_len(), "memory connection waits for peer");
        write.await.map_err(into_io_error)
    }

    async fn release(&self) -> io::Result<()> {
        trace!("release memory connection");
        drop(self.outbound.finish());
        self.inbound.end_read(None).await;
        Ok(())
    }

    fn environment(&self) -> Environment {
        self.environment.clone()
    }
}

/// A registry of named in-memory endpoints.
///
/// Cloning yields another handle to the same registry.
#[derive(Debug, Clone)]
pub struct MemoryNetwork {
    endpoints: Arc<Mutex<HashMap<String, mpsc::Sender<MemoryConnection>>>>,
    write_capacity: usize,
}

impl Default for MemoryNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::with_write_capacity(DEFAULT_WRITE_CAPACITY)
    }

    pub fn with_write_capacity(write_capacity: usize) -> Self {
        Self { endpoints: Arc::new(Mutex::new(HashMap::new())), write_capacity }
    }

    /// Binds a listener to `endpoint`, replacing any listener bound there before.
    pub fn bind<S: Into<String>>(&self, endpoint: S) -> MemoryListener {
        let endpoint = endpoint.into();
        let (sender, receiver) = mpsc::channel(ACCEPT_BACKLOG);
        self.endpoints.lock().unwrap_or_else(PoisonError::into_inner).insert(endpoint.clone(), sender);
        debug!(endpoint = %endpoint, "bind memory endpoint");
        MemoryListener { endpoint, receiver: tokio::sync::Mutex::new(receiver) }
    }
}

#[async_trait]
impl ClientTransport for MemoryNetwork {
    type Endpoint = str;

    async fn allocate_connection(&self, endpoint: &str, _options: &SendOptions) -> io::Result<Allocation> {
        let sender = self.endpoints.lock().unwrap_or_else(PoisonError::into_inner).get(endpoint).cloned();
        let Some(sender) = sender else {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, format!("no listener bound to {endpoint}")));
        };

        let environment = Environment::from([(ENDPOINT_KEY.to_string(), endpoint.to_string())]);
        let (client, server) = MemoryConnection::pair(self.write_capacity);
        sender
            .send(server.with_environment(environment.clone()))
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::ConnectionRefused, format!("listener of {endpoint}: {e}")))?;

        trace!(endpoint, "allocated memory connection");
        Ok(Allocation { connection: Arc::new(client), environment })
    }
}

/// Accepts the connections allocated toward one endpoint of a [`MemoryNetwork`].
#[derive(Debug)]
pub struct MemoryListener {
    endpoint: String,
    receiver: tokio::sync::Mutex<mpsc::Receiver<MemoryConnection>>,
}

impl MemoryListener {
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ServerTransport for MemoryListener {
    async fn accept(&self) -> io::Result<Option<Arc<dyn Connection>>> {
        let connection = self.receiver.lock().await.recv().await;
        Ok(connection.map(|connection| Arc::new(connection) as Arc<dyn Connection>))
    }
}
