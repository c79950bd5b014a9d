use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::codec::body::write_body;
use crate::codec::framed::{FrameReader, FrameWriter};
use crate::codec::{ConnectionBody, LeadChunk, LeadChunkCodec};
use crate::config::SendOptions;
use crate::connection::{Allocation, ClientTransport};
use crate::protocol::body::{Body, BytesBody, read_all_bytes};
use crate::protocol::{QuasiRequest, QuasiResponse, TransferError};
use crate::transfer::Transfer;

/// The send role: allocates a connection per request and drives the exchange over it.
///
/// # Type Parameters
///
/// * `T`: The transport connections are allocated from
#[derive(Debug)]
pub struct QuasiClient<T> {
    transport: T,
    default_options: SendOptions,
}

impl<T: ClientTransport> QuasiClient<T> {
    pub fn new(transport: T) -> Self {
        Self::with_options(transport, SendOptions::default())
    }

    pub fn with_options(transport: T, default_options: SendOptions) -> Self {
        Self { transport, default_options }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn default_options(&self) -> &SendOptions {
        &self.default_options
    }

    /// Sends `request` to `endpoint` and returns the response.
    ///
    /// Per-call `options` override the client defaults field by field.
    pub async fn send(
        &self,
        endpoint: &T::Endpoint,
        request: QuasiRequest,
        options: Option<&SendOptions>,
    ) -> Result<QuasiResponse, TransferError> {
        self.send_with_cancellation(endpoint, request, options, CancellationToken::new()).await
    }

    /// Like [`send`](QuasiClient::send), failing with [`TransferError::Cancelled`] once `cancel` fires.
    ///
    /// Whatever ends the exchange first, the connection is released and the request body ended
    /// exactly once. Dropping the returned future has the same effect as cancelling it.
    pub async fn send_with_cancellation(
        &self,
        endpoint: &T::Endpoint,
        request: QuasiRequest,
        options: Option<&SendOptions>,
        cancel: CancellationToken,
    ) -> Result<QuasiResponse, TransferError> {
        let options = options.map_or_else(|| self.default_options.clone(), |options| options.merge(&self.default_options));
        let transfer = Arc::new(Transfer::new(options.effective_timeout()));

        debug!(method = %request.method, path = %request.path, "send request");
        let result = transfer.run(&cancel, self.exchange(endpoint, request, &options, &transfer)).await;

        match result {
            Ok((response, handed_off)) => {
                if !handed_off {
                    transfer.abort(None).await;
                }
                debug!(status = %response.status_code, streaming = handed_off, "received response");
                Ok(response)
            }
            Err(e) => {
                transfer.abort(Some(&e)).await;
                error!(cause = %e, "send aborted");
                Err(e)
            }
        }
    }

    /// Runs the exchange; the flag is true when the response body took over the transfer.
    async fn exchange(
        &self,
        endpoint: &T::Endpoint,
        mut request: QuasiRequest,
        options: &SendOptions,
        transfer: &Arc<Transfer>,
    ) -> Result<(QuasiResponse, bool), TransferError> {
        let Allocation { connection, environment } = self.transport.allocate_connection(endpoint, options).await?;
        transfer.attach_connection(Arc::clone(&connection));

        let lead = LeadChunk::from_request(&request);
        let body = request.body.take().map(Arc::<dyn Body>::from);
        if let Some(body) = &body {
            transfer.track_body(Arc::clone(body));
        }

        let max_body_chunk_size = options.effective_max_body_chunk_size();
        let mut lead_codec = LeadChunkCodec::new(options.effective_max_lead_chunk_size());
        let mut writer = FrameWriter::new(Arc::clone(&connection), Arc::clone(transfer.timer()));
        writer.write_frame(&mut lead_codec, lead).await?;
        if let Some(body) = &body {
            write_body(&mut writer, body.as_ref(), max_body_chunk_size).await?;
        }

        let mut frames = FrameReader::new(connection, Arc::clone(transfer.timer()));
        let lead = frames.read_frame(&mut lead_codec).await?;
        let content_length = lead.content_length;
        let content_type = lead.content_type.clone();
        let mut response = lead.into_response()?;
        response.environment = environment;

        if content_length == 0 {
            return Ok((response, false));
        }

        let body = ConnectionBody::new(frames, content_length, content_type.clone(), max_body_chunk_size);
        if options.effective_response_buffering_enabled() {
            let limit = options.effective_response_body_buffering_size_limit();
            let bytes = read_all_bytes(&body, Some(limit)).await?;
            response.body = Some(Box::new(BytesBody::new(bytes).with_optional_content_type(content_type)));
            return Ok((response, false));
        }

        transfer.timer().cancel();
        body.own_transfer(Arc::clone(transfer));
        response.body = Some(Box::new(body));
        Ok((response, true))
    }
}
