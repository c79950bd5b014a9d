use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::trace;

use crate::connection::Connection;
use crate::protocol::Environment;

/// A [`Connection`] over tokio stream halves.
///
/// # Type Parameters
///
/// * `R`: The async readable stream type
/// * `W`: The async writable stream type
///
/// Releasing shuts the writer down once; later releases do nothing.
pub struct StreamConnection<R, W> {
    reader: Mutex<R>,
    writer: Mutex<W>,
    environment: Environment,
    released: AtomicBool,
}

impl<R, W> StreamConnection<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self::with_environment(reader, writer, Environment::new())
    }

    pub fn with_environment(reader: R, writer: W, environment: Environment) -> Self {
        Self { reader: Mutex::new(reader), writer: Mutex::new(writer), environment, released: AtomicBool::new(false) }
    }
}

impl<R, W> fmt::Debug for StreamConnection<R, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamConnection").field("released", &self.released.load(Ordering::Relaxed)).finish()
    }
}

#[async_trait]
impl<R, W> Connection for StreamConnection<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.lock().await.read(buf).await
    }

    async fn write_all(&self, buf: &[u8]) -> io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(buf).await?;
        writer.flush().await
    }

    async fn release(&self) -> io::Result<()> {
        if self.released.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        trace!("shutdown stream connection");
        self.writer.lock().await.shutdown().await
    }

    fn environment(&self) -> Environment {
        self.environment.clone()
    }
}
