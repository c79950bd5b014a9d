//! Core quasi http protocol abstractions.
//!
//! This module provides the message types exchanged by the transfer engine, the body streaming
//! contract and the error taxonomy. Nothing here knows about frames or connections; those live in
//! [`codec`](crate::codec) and [`connection`](crate::connection).
//!
//! # Architecture
//!
//! - **Messages**: http-shaped metadata plus an optional body
//!   - [`QuasiRequest`]: path, method, version, multi-valued headers
//!   - [`QuasiResponse`]: status code and message, explicit outcome flags, headers
//!   - [`Environment`]: opaque side information attached by transports
//!
//! - **Payload model**: [`PayloadItem`] and [`PayloadSize`] shared by the body codecs
//!
//! - **Body Streaming** ([`body`]): the [`Body`](body::Body) contract and in-memory implementations
//!
//! - **Error Handling**:
//!   - [`TransferError`]: the single outcome surfaced when an exchange fails
//!   - [`CodecError`]: framing errors
//!   - [`BodyError`]: body contract violations and terminal causes

mod message;
pub use message::Environment;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod request;
pub use request::DEFAULT_HTTP_VERSION;
pub use request::QuasiRequest;

mod response;
pub use response::QuasiResponse;

mod error;
pub use error::BodyError;
pub use error::BoxError;
pub use error::CodecError;
pub use error::TransferError;

pub mod body;
