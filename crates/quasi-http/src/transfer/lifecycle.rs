//! Protocol state of one exchange, from connection acquisition to release.

use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use crate::connection::Connection;
use crate::protocol::body::Body;
use crate::protocol::{BodyError, TransferError};
use crate::transfer::InactivityTimer;

/// One exchange's connection, timer and open bodies.
///
/// Torn down exactly once by [`abort`](Transfer::abort): cancel the timer, end every open body,
/// release the connection. A transfer dropped without being aborted runs the same teardown on the
/// current runtime.
#[derive(Debug)]
pub(crate) struct Transfer {
    connection: Mutex<Option<Arc<dyn Connection>>>,
    timer: Arc<InactivityTimer>,
    bodies: Mutex<Vec<Arc<dyn Body>>>,
    aborted: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Transfer {
    pub(crate) fn new(timeout: Option<Duration>) -> Self {
        Self {
            connection: Mutex::new(None),
            timer: Arc::new(InactivityTimer::start(timeout)),
            bodies: Mutex::new(Vec::new()),
            aborted: AtomicBool::new(false),
        }
    }

    pub(crate) fn timer(&self) -> &Arc<InactivityTimer> {
        &self.timer
    }

    /// Attaches the connection released by the teardown.
    pub(crate) fn attach_connection(&self, connection: Arc<dyn Connection>) {
        *lock(&self.connection) = Some(connection);
    }

    /// Registers a body that the teardown must end if it is still open.
    pub(crate) fn track_body(&self, body: Arc<dyn Body>) {
        lock(&self.bodies).push(body);
    }

    /// Drives `future` until it completes, the token is cancelled, or the inactivity timer fires.
    pub(crate) async fn run<T, F>(&self, cancel: &CancellationToken, future: F) -> Result<T, TransferError>
    where
        F: Future<Output = Result<T, TransferError>>,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransferError::Cancelled),
            _ = self.timer.expired() => Err(TransferError::Timeout),
            result = future => result,
        }
    }

    /// Tears the transfer down; calls after the first do nothing.
    ///
    /// `error` is `None` for a transfer that completed normally, in which case open bodies are
    /// ended cleanly.
    pub(crate) async fn abort(&self, error: Option<&TransferError>) {
        if self.aborted.swap(true, Ordering::AcqRel) {
            return;
        }

        trace!(error = ?error, "abort transfer");
        self.timer.cancel();

        let cause = error.map(TransferError::to_body_cause);
        let bodies = mem::take(&mut *lock(&self.bodies));
        for body in bodies {
            body.end_read(cause.clone()).await;
        }

        let connection = lock(&self.connection).take();
        if let Some(connection) = connection
            && let Err(e) = connection.release().await
        {
            warn!(cause = %e, "failed to release connection");
        }
    }
}

impl Drop for Transfer {
    fn drop(&mut self) {
        if *self.aborted.get_mut() {
            return;
        }

        self.timer.cancel();
        let bodies = mem::take(self.bodies.get_mut().unwrap_or_else(PoisonError::into_inner));
        let connection = self.connection.get_mut().unwrap_or_else(PoisonError::into_inner).take();
        if bodies.is_empty() && connection.is_none() {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("transfer dropped outside of a runtime, connection not released");
            return;
        };

        trace!("transfer dropped before teardown, release in background");
        handle.spawn(async move {
            for body in bodies {
                body.end_read(Some(BodyError::Cancelled)).await;
            }
            if let Some(connection) = connection
                && let Err(e) = connection.release().await
            {
                warn!(cause = %e, "failed to release connection");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;

    use super::*;
    use crate::protocol::body::BytesBody;

    #[derive(Debug, Default)]
    struct CountingConnection {
        releases: AtomicUsize,
    }

    #[async_trait]
    impl Connection for CountingConnection {
        async fn read(&self, _buf: &mut [u8]) -> io::Result<usize> {
            Ok(0)
        }

        async fn write_all(&self, _buf: &[u8]) -> io::Result<()> {
            Ok(())
        }

        async fn release(&self) -> io::Result<()> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn abort_is_idempotent() {
        let connection = Arc::new(CountingConnection::default());
        let body = Arc::new(BytesBody::from("pending"));

        let transfer = Transfer::new(Some(Duration::from_secs(5)));
        transfer.attach_connection(Arc::clone(&connection) as Arc<dyn Connection>);
        transfer.track_body(Arc::clone(&body) as Arc<dyn Body>);

        transfer.abort(Some(&TransferError::Timeout)).await;
        transfer.abort(Some(&TransferError::Cancelled)).await;
        transfer.abort(None).await;

        assert_eq!(connection.releases.load(Ordering::SeqCst), 1);
        assert!(!transfer.timer().is_active());

        let mut buf = [0u8; 8];
        assert!(matches!(body.read(&mut buf).await, Err(BodyError::Timeout)));
    }

    #[tokio::test]
    async fn dropped_transfer_releases_in_background() {
        let connection = Arc::new(CountingConnection::default());
        let transfer = Transfer::new(None);
        transfer.attach_connection(Arc::clone(&connection) as Arc<dyn Connection>);
        drop(transfer);

        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
        assert_eq!(connection.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_reports_first_outcome() {
        let transfer = Transfer::new(Some(Duration::from_secs(1)));
        let cancel = CancellationToken::new();

        let result: Result<(), _> = transfer.run(&cancel, std::future::pending()).await;
        assert!(matches!(result, Err(TransferError::Timeout)));

        let transfer = Transfer::new(None);
        cancel.cancel();
        let result = transfer.run(&cancel, async { Ok(1) }).await;
        assert!(matches!(result, Err(TransferError::Cancelled)));
    }
}
