use std::io;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::application::Application;
use crate::codec::body::write_body;
use crate::codec::framed::{FrameReader, FrameWriter};
use crate::codec::{ConnectionBody, LeadChunk, LeadChunkCodec};
use crate::config::ReceiveOptions;
use crate::connection::{Connection, ServerTransport};
use crate::protocol::TransferError;
use crate::protocol::body::Body;
use crate::transfer::Transfer;

/// The receive role: reads a request from an accepted connection, hands it to the application and
/// writes the response back.
///
/// # Type Parameters
///
/// * `A`: The application processing requests
#[derive(Debug)]
pub struct QuasiServer<A> {
    application: Arc<A>,
    options: ReceiveOptions,
}

impl<A: Application + 'static> QuasiServer<A> {
    pub fn new(application: A) -> Self {
        Self::with_options(application, ReceiveOptions::default())
    }

    pub fn with_options(application: A, options: ReceiveOptions) -> Self {
        Self { application: Arc::new(application), options }
    }

    pub fn options(&self) -> &ReceiveOptions {
        &self.options
    }

    /// Accepts connections from `transport` until it closes, running one exchange per connection on
    /// its own task.
    pub async fn serve<T: ServerTransport>(self: Arc<Self>, transport: &T) -> io::Result<()> {
        loop {
            let connection = match transport.accept().await {
                Ok(Some(connection)) => connection,
                Ok(None) => {
                    info!("transport closed, stop accepting");
                    return Ok(());
                }
                Err(e) => {
                    warn!(cause = %e, "failed to accept");
                    continue;
                }
            };

            let server = Arc::clone(&self);
            tokio::spawn(async move {
                // the outcome is logged by accept_connection
                let _ = server.accept_connection(connection).await;
            });
        }
    }

    /// Runs one exchange over `connection` and returns its single outcome.
    pub async fn accept_connection(&self, connection: Arc<dyn Connection>) -> Result<(), TransferError> {
        self.accept_connection_with_cancellation(connection, CancellationToken::new()).await
    }

    /// Like [`accept_connection`](QuasiServer::accept_connection), failing with
    /// [`TransferError::Cancelled`] once `cancel` fires.
    pub async fn accept_connection_with_cancellation(
        &self,
        connection: Arc<dyn Connection>,
        cancel: CancellationToken,
    ) -> Result<(), TransferError> {
        let transfer = Transfer::new(self.options.effective_timeout());
        transfer.attach_connection(Arc::clone(&connection));

        let result = transfer.run(&cancel, self.exchange(connection, &transfer)).await;
        match &result {
            Ok(()) => {
                transfer.abort(None).await;
                debug!("exchange finished");
            }
            Err(e) => {
                transfer.abort(Some(e)).await;
                error!(cause = %e, "exchange aborted");
            }
        }
        result
    }

    async fn exchange(&self, connection: Arc<dyn Connection>, transfer: &Transfer) -> Result<(), TransferError> {
        let max_body_chunk_size = self.options.effective_max_body_chunk_size();
        let mut lead_codec = LeadChunkCodec::new(self.options.max_lead_chunk_size);

        let mut frames = FrameReader::new(Arc::clone(&connection), Arc::clone(transfer.timer()));
        let lead = frames.read_frame(&mut lead_codec).await?;
        let content_length = lead.content_length;
        let content_type = lead.content_type.clone();
        let mut request = lead.into_request()?;
        request.environment = connection.environment();
        debug!(method = %request.method, path = %request.path, content_length, "received request");

        if content_length != 0 {
            let body = Arc::new(ConnectionBody::new(frames, content_length, content_type, max_body_chunk_size));
            transfer.track_body(Arc::clone(&body) as Arc<dyn Body>);
            request.body = Some(Box::new(body));
        }

        let mut response = self
            .application
            .process_request(request)
            .await
            .map_err(TransferError::application)?
            .ok_or(TransferError::NoResponse)?;

        let lead = LeadChunk::from_response(&response);
        let body = response.body.take().map(Arc::<dyn Body>::from);
        if let Some(body) = &body {
            transfer.track_body(Arc::clone(body));
        }

        let mut writer = FrameWriter::new(connection, Arc::clone(transfer.timer()));
        writer.write_frame(&mut lead_codec, lead).await?;
        if let Some(body) = &body {
            write_body(&mut writer, body.as_ref(), max_body_chunk_size).await?;
        }
        Ok(())
    }
}
