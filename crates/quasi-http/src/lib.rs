//! An asynchronous quasi http transfer engine
//!
//! Quasi http carries http-shaped requests and responses over any duplex byte connection: TCP,
//! local pipes, or entirely in memory. Metadata travels in a length-prefixed lead chunk, bodies
//! either as raw bytes of a declared length or as length-prefixed body chunks.
//!
//! # Features
//!
//! - Send and receive roles over a narrow connection/transport contract
//! - Streaming request and response bodies
//! - Inactivity timeouts that reset on every frame
//! - External cancellation
//! - Guaranteed cleanup: every connection released once, every body ended once
//! - An in-memory transport built on [`PipeBody`](protocol::body::PipeBody)
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use http::Method;
//! use quasi_http::application::make_application;
//! use quasi_http::connection::MemoryNetwork;
//! use quasi_http::protocol::body::{read_all_bytes, BytesBody};
//! use quasi_http::protocol::{BoxError, QuasiRequest, QuasiResponse};
//! use quasi_http::transfer::{QuasiClient, QuasiServer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), BoxError> {
//!     let network = MemoryNetwork::new();
//!     let listener = network.bind("echo");
//!
//!     let server = Arc::new(QuasiServer::new(make_application(|request: QuasiRequest| async move {
//!         let body = match &request.body {
//!             Some(body) => read_all_bytes(body, None).await?,
//!             None => Default::default(),
//!         };
//!         Ok::<_, BoxError>(Some(QuasiResponse::ok().with_body(BytesBody::new(body))))
//!     })));
//!     tokio::spawn(async move { server.serve(&listener).await });
//!
//!     let client = QuasiClient::new(network);
//!     let request = QuasiRequest::new(Method::POST, "/").with_body(BytesBody::from("hello"));
//!     let response = client.send("echo", request, None).await?;
//!     assert!(response.status_indicates_success);
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! The crate is organized into several key modules:
//!
//! - [`protocol`]: Request/response types, the body contract and the error taxonomy
//! - [`codec`]: Lead chunk and body chunk framing
//! - [`connection`]: Connection and transport contracts plus adapters
//! - [`transfer`]: The send and receive roles
//! - [`application`]: The request processing contract
//! - [`config`]: Options for both roles
//!
//! # Error Handling
//!
//! - [`protocol::TransferError`]: the single outcome of a failed exchange
//! - [`protocol::CodecError`]: framing errors, always fatal to the transfer
//! - [`protocol::BodyError`]: body contract violations and terminal causes
//!
//! # Limitations
//!
//! - One exchange per connection, no multiplexing
//! - Frame ceilings are configuration and must match on both ends

pub mod application;
pub mod codec;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod transfer;

mod utils;
pub(crate) use utils::ensure;
