use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

/// Inactivity timeout of one transfer.
///
/// Every [`touch`](InactivityTimer::touch) pushes the deadline one full timeout into the future, so
/// the timer measures silence rather than total duration. A cancelled or disabled timer never
/// expires.
#[derive(Debug)]
pub(crate) struct InactivityTimer {
    timeout: Option<Duration>,
    deadline: Mutex<Option<Instant>>,
}

impl InactivityTimer {
    /// Starts a timer; `None` or a zero timeout disables it.
    pub(crate) fn start(timeout: Option<Duration>) -> Self {
        let timeout = timeout.filter(|timeout| !timeout.is_zero());
        Self { timeout, deadline: Mutex::new(timeout.map(|timeout| Instant::now() + timeout)) }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Instant>> {
        self.deadline.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resets the deadline after activity; does nothing once cancelled.
    pub(crate) fn touch(&self) {
        let Some(timeout) = self.timeout else {
            return;
        };

        let mut deadline = self.lock();
        if deadline.is_some() {
            *deadline = Some(Instant::now() + timeout);
        }
    }

    pub(crate) fn cancel(&self) {
        *self.lock() = None;
    }

    #[cfg(test)]
    pub(crate) fn is_active(&self) -> bool {
        self.lock().is_some()
    }

    /// Completes once the deadline passes without being pushed back.
    pub(crate) async fn expired(&self) {
        loop {
            let deadline = *self.lock();
            let Some(deadline) = deadline else {
                return std::future::pending().await;
            };

            tokio::time::sleep_until(deadline).await;

            let current = *self.lock();
            match current {
                Some(current) if current <= Instant::now() => return,
                Some(_) => continue,
                None => return std::future::pending().await,
            }
        }
    }
}
