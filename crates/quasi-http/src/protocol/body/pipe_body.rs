//! In-memory pipe connecting an independent producer and consumer of body bytes.
//!
//! # Design
//!
//! The pipe never blocks a thread. Each write call enqueues a write request and each read call
//! registers itself as the single pending read; whenever the registered read is polled and the
//! write queue is not empty, the head of the queue is matched against it:
//!
//! 1. `min(write remaining, read capacity)` bytes move from the write into the read's buffer
//! 2. A fully consumed write is dequeued and its completion resolved; a partially consumed one
//!    stays at the head
//! 3. The read completes with the bytes moved
//! 4. Once a write marked last is fully consumed the pipe reaches end of write: still queued writes
//!    fail, future reads return zero and future non-empty writes fail
//!
//! Bytes only leave the queue inside the poll that completes the read, so a read future dropped
//! while waiting never takes data with it. Writers and `end_read` merely wake the pending read.
//!
//! All queue mutation happens under one per-instance lock. Completions and wake-ups are collected
//! while the lock is held and resolved only after it is released, so a completion that synchronously
//! issues a new read or write can not observe a half-updated queue.
//!
//! Write payloads are sliced out of [`Bytes`], so matching never copies on the producer side.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker, ready};

use async_trait::async_trait;
use bytes::{Buf, Bytes};
use futures::FutureExt;
use futures::channel::oneshot;
use tracing::trace;

use crate::protocol::BodyError;
use crate::protocol::body::Body;

/// A [`Body`] fed by explicit [`write`](PipeBody::write) calls.
///
/// Cloning yields another handle to the same pipe, so the producer can keep one handle while the
/// consumer owns the other.
#[derive(Debug, Clone)]
pub struct PipeBody {
    inner: Arc<PipeInner>,
}

#[derive(Debug)]
struct PipeInner {
    content_length: i64,
    content_type: Option<String>,
    max_buffered: Option<usize>,
    state: Mutex<PipeState>,
}

#[derive(Debug, Default)]
struct PipeState {
    writes: VecDeque<PendingWrite>,
    read: Option<PendingRead>,
    next_read_id: u64,
    /// bytes queued in `writes` and not yet matched
    buffered: usize,
    end_of_write: bool,
    end_of_read: Option<BodyError>,
}

#[derive(Debug)]
struct PendingWrite {
    data: Bytes,
    is_last: bool,
    completion: oneshot::Sender<Result<(), BodyError>>,
}

#[derive(Debug)]
struct PendingRead {
    id: u64,
    waker: Waker,
}

enum Completion {
    Write(oneshot::Sender<Result<(), BodyError>>, Result<(), BodyError>),
    Wake(Waker),
}

impl Completion {
    fn resolve(self) {
        match self {
            Completion::Write(sender, result) => {
                // a dropped receiver means the writer stopped waiting, nothing left to notify
                let _ = sender.send(result);
            }
            Completion::Wake(waker) => waker.wake(),
        }
    }
}

fn resolve_all(completions: Vec<Completion>) {
    completions.into_iter().for_each(Completion::resolve);
}

impl PipeBody {
    /// Creates a pipe declaring the given content length; use a negative value for unknown length.
    pub fn new(content_length: i64) -> Self {
        Self::with_options(content_length, None, None)
    }

    /// Creates a pipe with an advisory content type and an optional ceiling on buffered write bytes.
    ///
    /// When the ceiling is set, a non-final write that would push the queued bytes above it fails
    /// with [`BodyError::BufferLimitExceeded`] instead of queueing.
    pub fn with_options(content_length: i64, content_type: Option<String>, max_buffered: Option<usize>) -> Self {
        Self {
            inner: Arc::new(PipeInner {
                content_length,
                content_type,
                max_buffered,
                state: Mutex::new(PipeState::default()),
            }),
        }
    }

    /// Enqueues a write and returns a future resolving once the write is fully consumed.
    ///
    /// The write is registered before this method returns, so writes are consumed in call order
    /// whether or not the returned future is awaited. Dropping the future does not withdraw the
    /// write. Empty non-final writes complete immediately.
    pub fn write<B: Into<Bytes>>(&self, data: B, is_last: bool) -> PipeWrite {
        let data = data.into();
        let mut completions = Vec::new();

        let registered = {
            let mut state = self.inner.lock();
            if let Some(cause) = &state.end_of_read {
                Err(cause.clone())
            } else if state.end_of_write {
                if data.is_empty() { Ok(None) } else { Err(BodyError::EndOfWrite) }
            } else if data.is_empty() && !is_last {
                Ok(None)
            } else {
                let size = state.buffered + data.len();
                match self.inner.max_buffered {
                    Some(limit) if !is_last && size > limit => Err(BodyError::buffer_limit_exceeded(size, limit)),
                    _ => {
                        let (sender, receiver) = oneshot::channel();
                        trace!(len = data.len(), is_last, "enqueue pipe write");
                        state.buffered = size;
                        state.writes.push_back(PendingWrite { data, is_last, completion: sender });
                        if let Some(read) = &state.read {
                            completions.push(Completion::Wake(read.waker.clone()));
                        }
                        Ok(Some(receiver))
                    }
                }
            }
        };

        resolve_all(completions);

        match registered {
            Ok(Some(receiver)) => PipeWrite::waiting(receiver),
            Ok(None) => PipeWrite::ready(Ok(())),
            Err(e) => PipeWrite::ready(Err(e)),
        }
    }

    /// Enqueues the final, empty write that marks the end of the stream.
    pub fn finish(&self) -> PipeWrite {
        self.write(Bytes::new(), true)
    }

    /// Number of written bytes not yet consumed by reads.
    pub fn buffered_len(&self) -> usize {
        self.inner.lock().buffered
    }

    /// Returns true once a final write has been fully consumed.
    pub fn is_end_of_write(&self) -> bool {
        self.inner.lock().end_of_write
    }
}

impl PipeInner {
    fn lock(&self) -> MutexGuard<'_, PipeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PipeState {
    /// Polls the read identified by `id`, registering it as the pending read if it is new.
    fn poll_read(
        &mut self,
        id: &mut Option<u64>,
        buf: &mut [u8],
        waker: &Waker,
        completions: &mut Vec<Completion>,
    ) -> Poll<Result<usize, BodyError>> {
        if let Some(cause) = &self.end_of_read {
            *id = None;
            return Poll::Ready(Err(cause.clone()));
        }

        match (&self.read, *id) {
            (Some(read), Some(mine)) if read.id == mine => {}
            (Some(_), _) => return Poll::Ready(Err(BodyError::ConcurrentRead)),
            (None, _) => {
                *id = Some(self.next_read_id);
                self.next_read_id += 1;
            }
        }

        if self.end_of_write || buf.is_empty() {
            self.finish_read(id);
            return Poll::Ready(Ok(0));
        }

        let Some(n) = self.match_head(buf, completions) else {
            if let Some(mine) = *id {
                self.read = Some(PendingRead { id: mine, waker: waker.clone() });
            }
            return Poll::Pending;
        };

        self.finish_read(id);
        Poll::Ready(Ok(n))
    }

    fn finish_read(&mut self, id: &mut Option<u64>) {
        if let Some(mine) = id.take()
            && self.read.as_ref().is_some_and(|read| read.id == mine)
        {
            self.read = None;
        }
    }

    /// Moves bytes from the head of the write queue into `buf`; `None` when no write is queued.
    fn match_head(&mut self, buf: &mut [u8], completions: &mut Vec<Completion>) -> Option<usize> {
        let write = self.writes.front_mut()?;

        let n = write.data.len().min(buf.len());
        buf[..n].copy_from_slice(&write.data[..n]);
        write.data.advance(n);
        self.buffered -= n;

        if !write.data.is_empty() {
            return Some(n);
        }

        if let Some(write) = self.writes.pop_front() {
            let is_last = write.is_last;
            completions.push(Completion::Write(write.completion, Ok(())));

            if is_last {
                trace!(dropped = self.writes.len(), "pipe reached end of write");
                self.end_of_write = true;
                self.buffered = 0;
                for write in self.writes.drain(..) {
                    completions.push(Completion::Write(write.completion, Err(BodyError::EndOfWrite)));
                }
            }
        }
        Some(n)
    }
}

/// A read registered with a pipe; unregisters itself when dropped before completing.
struct PipeRead<'a> {
    inner: &'a PipeInner,
    buf: &'a mut [u8],
    id: Option<u64>,
}

impl Future for PipeRead<'_> {
    type Output = Result<usize, BodyError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        let mut completions = Vec::new();
        let result = this.inner.lock().poll_read(&mut this.id, this.buf, cx.waker(), &mut completions);
        resolve_all(completions);
        result
    }
}

impl Drop for PipeRead<'_> {
    fn drop(&mut self) {
        if self.id.is_some() {
            self.inner.lock().finish_read(&mut self.id);
        }
    }
}

#[async_trait]
impl Body for PipeBody {
    fn content_length(&self) -> i64 {
        self.inner.content_length
    }

    fn content_type(&self) -> Option<&str> {
        self.inner.content_type.as_deref()
    }

    async fn read(&self, buf: &mut [u8]) -> Result<usize, BodyError> {
        PipeRead { inner: &self.inner, buf, id: None }.await
    }

    async fn end_read(&self, cause: Option<BodyError>) {
        let mut completions = Vec::new();
        {
            let mut state = self.inner.lock();
            if state.end_of_read.is_some() {
                return;
            }

            let cause = cause.unwrap_or(BodyError::EndOfRead);
            trace!(cause = %cause, "end pipe read");
            if let Some(read) = state.read.take() {
                completions.push(Completion::Wake(read.waker));
            }
            for write in state.writes.drain(..) {
                completions.push(Completion::Write(write.completion, Err(cause.clone())));
            }
            state.buffered = 0;
            state.end_of_read = Some(cause);
        }
        resolve_all(completions);
    }
}

/// Completion of a [`PipeBody::write`] call.
///
/// Resolves with `Ok(())` once every byte of the write was handed to a read, or with the reason the
/// write can never complete.
#[derive(Debug)]
#[must_use = "a pipe write is registered eagerly; await it to learn when it was consumed"]
pub struct PipeWrite {
    state: PipeWriteState,
}

#[derive(Debug)]
enum PipeWriteState {
    Ready(Option<Result<(), BodyError>>),
    Waiting(oneshot::Receiver<Result<(), BodyError>>),
}

impl PipeWrite {
    fn ready(result: Result<(), BodyError>) -> Self {
        Self { state: PipeWriteState::Ready(Some(result)) }
    }

    fn waiting(receiver: oneshot::Receiver<Result<(), BodyError>>) -> Self {
        Self { state: PipeWriteState::Waiting(receiver) }
    }
}

impl Future for PipeWrite {
    type Output = Result<(), BodyError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.state {
            PipeWriteState::Ready(result) => Poll::Ready(result.take().unwrap_or(Ok(()))),
            PipeWriteState::Waiting(receiver) => match ready!(receiver.poll_unpin(cx)) {
                Ok(result) => Poll::Ready(result),
                Err(_canceled) => Poll::Ready(Err(BodyError::EndOfRead)),
            },
        }
    }
}
