//! The application contract invoked once per accepted exchange.

use async_trait::async_trait;

use crate::protocol::{BoxError, QuasiRequest, QuasiResponse};

/// Turns a request into a response.
///
/// The request carries the connection's environment and, if one was declared, a body streaming
/// from the connection. Returning `Ok(None)` fails the exchange with
/// [`TransferError::NoResponse`](crate::protocol::TransferError::NoResponse).
#[async_trait]
pub trait Application: Send + Sync {
    type Error: Into<BoxError>;

    async fn process_request(&self, request: QuasiRequest) -> Result<Option<QuasiResponse>, Self::Error>;
}

#[derive(Debug)]
pub struct ApplicationFn<F> {
    f: F,
}

#[async_trait]
impl<Err, F, Fut> Application for ApplicationFn<F>
where
    F: Fn(QuasiRequest) -> Fut + Send + Sync,
    Err: Into<BoxError>,
    Fut: Future<Output = Result<Option<QuasiResponse>, Err>> + Send,
{
    type Error = Err;

    async fn process_request(&self, request: QuasiRequest) -> Result<Option<QuasiResponse>, Self::Error> {
        (self.f)(request).await
    }
}

pub fn make_application<F, Err, Ret>(f: F) -> ApplicationFn<F>
where
    Err: Into<BoxError>,
    Ret: Future<Output = Result<Option<QuasiResponse>, Err>>,
    F: Fn(QuasiRequest) -> Ret,
{
    ApplicationFn { f }
}

#[cfg(test)]
mod tests {
    use http::{Method, StatusCode};

    use super::*;

    #[tokio::test]
    async fn closures_become_applications() {
        let application = make_application(|request: QuasiRequest| async move {
            let status = if request.path == "/" { StatusCode::OK } else { StatusCode::NOT_FOUND };
            Ok::<_, BoxError>(Some(QuasiResponse::with_status(status)))
        });

        let response = application.process_request(QuasiRequest::new(Method::GET, "/missing")).await.unwrap().unwrap();
        assert_eq!(response.status_code, StatusCode::NOT_FOUND);
    }
}
