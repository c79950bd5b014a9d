//! The transfer engine: one request/response exchange over one connection.
//!
//! Both roles follow the same shape:
//!
//! 1. Obtain the connection (allocate or accept) and start the inactivity timer
//! 2. Exchange lead chunks
//! 3. Stream the body, when the declared content length is not zero
//! 4. Hand over: the receive role calls the [`Application`](crate::application::Application) and
//!    answers, the send role returns the response to its caller
//! 5. Abort: cancel the timer, end open bodies, release the connection, exactly once
//!
//! Timeout and cancellation race against normal completion; whichever reaches the abort first
//! decides the single outcome reported to the caller.

mod client;
mod lifecycle;
mod server;
mod timer;

pub use client::QuasiClient;
pub use server::QuasiServer;

pub(crate) use lifecycle::Transfer;
pub(crate) use timer::InactivityTimer;
