use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use http::{HeaderValue, Method, StatusCode, header};
use quasi_http::application::{Application, make_application};
use quasi_http::config::{ReceiveOptions, SendOptions};
use quasi_http::connection::{
    Allocation, ClientTransport, Connection, ENDPOINT_KEY, MemoryListener, MemoryNetwork, ServerTransport,
    StreamConnection,
};
use quasi_http::protocol::body::{Body, BytesBody, PipeBody, read_all_bytes};
use quasi_http::protocol::{BodyError, BoxError, CodecError, QuasiRequest, QuasiResponse, TransferError};
use quasi_http::transfer::{QuasiClient, QuasiServer};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

fn init_tracing() {
    // several tests race to install the subscriber; only the first wins
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

async fn echo(request: QuasiRequest) -> Result<Option<QuasiResponse>, BoxError> {
    let Some(body) = request.body else {
        return Ok(Some(QuasiResponse::ok()));
    };

    let content_type = body.content_type().map(str::to_string);
    let bytes = read_all_bytes(&body, None).await?;
    let mut response_body = BytesBody::new(bytes);
    if let Some(content_type) = content_type {
        response_body = response_body.with_content_type(content_type);
    }
    Ok(Some(QuasiResponse::ok().with_body(response_body)))
}

fn spawn_single_exchange<A: Application + 'static>(
    listener: MemoryListener,
    server: QuasiServer<A>,
) -> JoinHandle<Result<(), TransferError>> {
    tokio::spawn(async move {
        let connection = listener.accept().await?.ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;
        server.accept_connection(connection).await
    })
}

#[derive(Debug)]
struct CountingConnection {
    inner: Arc<dyn Connection>,
    releases: Arc<AtomicUsize>,
}

#[async_trait]
impl Connection for CountingConnection {
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf).await
    }

    async fn write_all(&self, buf: &[u8]) -> io::Result<()> {
        self.inner.write_all(buf).await
    }

    async fn release(&self) -> io::Result<()> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        self.inner.release().await
    }

    fn environment(&self) -> quasi_http::protocol::Environment {
        self.inner.environment()
    }
}

/// Memory transport counting client side connection releases.
#[derive(Debug, Clone, Default)]
struct CountingTransport {
    network: MemoryNetwork,
    releases: Arc<AtomicUsize>,
}

impl CountingTransport {
    fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClientTransport for CountingTransport {
    type Endpoint = str;

    async fn allocate_connection(&self, endpoint: &str, options: &SendOptions) -> io::Result<Allocation> {
        let allocation = self.network.allocate_connection(endpoint, options).await?;
        let connection = CountingConnection { inner: allocation.connection, releases: Arc::clone(&self.releases) };
        Ok(Allocation { connection: Arc::new(connection), environment: allocation.environment })
    }
}

/// Hands out one prepared connection.
#[derive(Debug)]
struct SingleConnection {
    connection: Mutex<Option<Arc<dyn Connection>>>,
}

#[async_trait]
impl ClientTransport for SingleConnection {
    type Endpoint = ();

    async fn allocate_connection(&self, _endpoint: &(), _options: &SendOptions) -> io::Result<Allocation> {
        let connection = self.connection.lock().unwrap().take();
        connection.map(Allocation::new).ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))
    }
}

#[tokio::test]
async fn echo_with_declared_length() {
    init_tracing();
    let transport = CountingTransport::default();
    let listener = transport.network.bind("echo");
    let server = spawn_single_exchange(
        listener,
        QuasiServer::new(make_application(|request: QuasiRequest| async move {
            assert_eq!(request.environment.get(ENDPOINT_KEY).map(String::as_str), Some("echo"));
            assert_eq!(request.headers.get(header::USER_AGENT).unwrap(), "test");
            echo(request).await
        })),
    );

    let client = QuasiClient::new(transport.clone());
    let request = QuasiRequest::new(Method::POST, "/echo")
        .with_header(header::USER_AGENT, HeaderValue::from_static("test"))
        .with_body(BytesBody::from("hello").with_content_type("text/plain"));
    let response = client.send("echo", request, None).await.unwrap();

    assert_eq!(response.status_code, StatusCode::OK);
    assert!(response.status_indicates_success);
    assert_eq!(response.content_length(), 5);
    assert_eq!(response.content_type(), Some("text/plain"));
    assert_eq!(response.environment.get(ENDPOINT_KEY).map(String::as_str), Some("echo"));

    let body = response.body.unwrap();
    assert_eq!(&read_all_bytes(&body, None).await.unwrap()[..], b"hello");

    server.await.unwrap().unwrap();
    assert_eq!(transport.releases(), 1);
}

#[tokio::test]
async fn request_without_body() {
    let network = MemoryNetwork::new();
    let server = spawn_single_exchange(network.bind("echo"), QuasiServer::new(make_application(echo)));

    let client = QuasiClient::new(network);
    let response = client.send("echo", QuasiRequest::new(Method::GET, "/"), None).await.unwrap();
    assert!(response.body.is_none());
    assert_eq!(response.content_length(), 0);

    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn chunked_bodies_both_ways() {
    init_tracing();
    let network = MemoryNetwork::new();
    let server = spawn_single_exchange(
        network.bind("chunked"),
        QuasiServer::new(make_application(|request: QuasiRequest| async move {
            let body = request.body.ok_or("missing body")?;
            assert_eq!(body.content_length(), -1);
            let received = read_all_bytes(&body, None).await?;
            assert_eq!(&received[..], b"abcd");

            let pipe = PipeBody::with_options(-1, Some("text/plain".to_string()), None);
            let writer = pipe.clone();
            tokio::spawn(async move {
                for part in ["wx", "yz"] {
                    writer.write(part, false).await?;
                }
                writer.finish().await
            });
            Ok::<_, BoxError>(Some(QuasiResponse::ok().with_body(pipe)))
        })),
    );

    let pipe = PipeBody::new(-1);
    let writer = pipe.clone();
    tokio::spawn(async move {
        for part in ["ab", "cd"] {
            writer.write(part, false).await?;
        }
        writer.finish().await
    });

    let client = QuasiClient::new(network);
    let response = client.send("chunked", QuasiRequest::new(Method::PUT, "/").with_body(pipe), None).await.unwrap();

    // buffered responses declare their real length
    assert_eq!(response.content_length(), 4);
    assert_eq!(response.content_type(), Some("text/plain"));
    let body = response.body.unwrap();
    assert_eq!(&read_all_bytes(&body, None).await.unwrap()[..], b"wxyz");

    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn streamed_response_releases_connection_at_end_of_stream() {
    let transport = CountingTransport::default();
    let server = spawn_single_exchange(
        transport.network.bind("stream"),
        QuasiServer::new(make_application(|_request: QuasiRequest| async {
            Ok::<_, BoxError>(Some(QuasiResponse::ok().with_body(BytesBody::from("streamed body"))))
        })),
    );

    let client = QuasiClient::new(transport.clone());
    let options = SendOptions { response_buffering_enabled: Some(false), ..SendOptions::default() };
    let response = client.send("stream", QuasiRequest::default(), Some(&options)).await.unwrap();
    assert_eq!(transport.releases(), 0);

    let body = response.body.unwrap();
    assert_eq!(body.content_length(), 13);
    assert_eq!(&read_all_bytes(&body, None).await.unwrap()[..], b"streamed body");
    assert_eq!(transport.releases(), 1);

    body.end_read(None).await;
    assert_eq!(transport.releases(), 1);

    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn streamed_response_released_by_end_read() {
    let transport = CountingTransport::default();
    let server = spawn_single_exchange(
        transport.network.bind("stream"),
        QuasiServer::new(make_application(|_request: QuasiRequest| async {
            Ok::<_, BoxError>(Some(QuasiResponse::ok().with_body(BytesBody::from("unread"))))
        })),
    );

    let client = QuasiClient::with_options(
        transport.clone(),
        SendOptions { response_buffering_enabled: Some(false), ..SendOptions::default() },
    );
    let response = client.send("stream", QuasiRequest::default(), None).await.unwrap();
    let body = response.body.unwrap();

    body.end_read(None).await;
    body.end_read(Some(BodyError::Cancelled)).await;
    assert_eq!(transport.releases(), 1);

    let mut buf = [0u8; 8];
    assert!(matches!(body.read(&mut buf).await, Err(BodyError::EndOfRead)));

    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn buffered_response_over_limit_fails() {
    let transport = CountingTransport::default();
    let server = spawn_single_exchange(
        transport.network.bind("large"),
        QuasiServer::new(make_application(|_request: QuasiRequest| async {
            Ok::<_, BoxError>(Some(QuasiResponse::ok().with_body(BytesBody::from("0123456789abcdef"))))
        })),
    );

    let client = QuasiClient::new(transport.clone());
    let options = SendOptions { response_body_buffering_size_limit: Some(8), ..SendOptions::default() };
    let result = client.send("large", QuasiRequest::default(), Some(&options)).await;

    assert!(matches!(result, Err(TransferError::Body { source: BodyError::BufferLimitExceeded { limit: 8, .. } })));
    assert_eq!(transport.releases(), 1);
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn short_request_body_fails_content_length() {
    let transport = CountingTransport::default();
    let server = spawn_single_exchange(transport.network.bind("short"), QuasiServer::new(make_application(echo)));

    let pipe = PipeBody::new(10);
    let writer = pipe.clone();
    tokio::spawn(async move {
        writer.write("hello", false).await?;
        writer.finish().await
    });

    let client = QuasiClient::new(transport.clone());
    let result = client.send("short", QuasiRequest::new(Method::POST, "/").with_body(pipe.clone()), None).await;
    assert!(matches!(
        result,
        Err(TransferError::Body { source: BodyError::ContentLengthNotSatisfied { expected: 10, actual: 5 } })
    ));
    assert_eq!(transport.releases(), 1);

    // the abort ended the request body
    let mut buf = [0u8; 4];
    assert!(matches!(pipe.read(&mut buf).await, Err(BodyError::ContentLengthNotSatisfied { .. })));

    let server = server.await.unwrap();
    assert!(matches!(server, Err(TransferError::Application { .. })));
}

#[tokio::test]
async fn overlong_request_body_fails_content_length() {
    let transport = CountingTransport::default();
    let _server = spawn_single_exchange(transport.network.bind("long"), QuasiServer::new(make_application(echo)));

    let pipe = PipeBody::new(3);
    drop(pipe.write("hello", true));

    let client = QuasiClient::new(transport.clone());
    let result = client.send("long", QuasiRequest::new(Method::POST, "/").with_body(pipe), None).await;
    assert!(matches!(
        result,
        Err(TransferError::Body { source: BodyError::ContentLengthNotSatisfied { expected: 3, actual: 4 } })
    ));
    assert_eq!(transport.releases(), 1);
}

#[tokio::test]
async fn missing_response_is_an_error() {
    let network = MemoryNetwork::new();
    let server = spawn_single_exchange(
        network.bind("silent"),
        QuasiServer::new(make_application(|_request: QuasiRequest| async { Ok::<_, BoxError>(None) })),
    );

    let client = QuasiClient::new(network);
    let result = client.send("silent", QuasiRequest::default(), None).await;
    assert!(matches!(result, Err(TransferError::Codec { source: CodecError::UnexpectedEndOfStream { .. } })));

    let server = server.await.unwrap();
    assert!(matches!(server, Err(TransferError::NoResponse)));
}

#[tokio::test]
async fn application_error_aborts_exchange() {
    let network = MemoryNetwork::new();
    let server = spawn_single_exchange(
        network.bind("failing"),
        QuasiServer::new(make_application(|_request: QuasiRequest| async {
            Err::<Option<QuasiResponse>, BoxError>("database unavailable".into())
        })),
    );

    let client = QuasiClient::new(network);
    let result = client.send("failing", QuasiRequest::default(), None).await;
    assert!(matches!(result, Err(TransferError::Codec { .. })));

    match server.await.unwrap() {
        Err(TransferError::Application { source }) => assert_eq!(source.to_string(), "database unavailable"),
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test]
async fn unknown_endpoint_is_transport_error() {
    let transport = CountingTransport::default();
    let client = QuasiClient::new(transport.clone());

    let result = client.send("nowhere", QuasiRequest::default(), None).await;
    match result {
        Err(TransferError::Transport { source }) => assert_eq!(source.kind(), io::ErrorKind::ConnectionRefused),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(transport.releases(), 0);
}

#[tokio::test(start_paused = true)]
async fn activity_keeps_transfer_alive() {
    init_tracing();
    let network = MemoryNetwork::new();
    let receive_options = ReceiveOptions { timeout: Some(Duration::from_secs(1)), ..ReceiveOptions::default() };
    let server =
        spawn_single_exchange(network.bind("slow"), QuasiServer::with_options(make_application(echo), receive_options));

    let pipe = PipeBody::new(-1);
    let writer = pipe.clone();
    tokio::spawn(async move {
        for _ in 0..5 {
            tokio::time::sleep(Duration::from_millis(500)).await;
            writer.write("tick", false).await?;
        }
        writer.finish().await
    });

    let client = QuasiClient::with_options(network, SendOptions::with_timeout(Duration::from_secs(1)));
    let started = tokio::time::Instant::now();
    let response = client.send("slow", QuasiRequest::new(Method::POST, "/").with_body(pipe), None).await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(2500));

    let body = response.body.unwrap();
    assert_eq!(read_all_bytes(&body, None).await.unwrap().len(), 20);
    server.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn silence_times_out_sender() {
    let transport = CountingTransport::default();
    let server = spawn_single_exchange(
        transport.network.bind("sleepy"),
        QuasiServer::new(make_application(|_request: QuasiRequest| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, BoxError>(Some(QuasiResponse::ok()))
        })),
    );

    let client = QuasiClient::new(transport.clone());
    let options = SendOptions::with_timeout(Duration::from_secs(1));
    let started = tokio::time::Instant::now();
    let result = client.send("sleepy", QuasiRequest::default(), Some(&options)).await;

    assert!(matches!(result, Err(TransferError::Timeout)));
    assert!(result.is_err_and(|e| e.is_timeout()));
    assert!(started.elapsed() >= Duration::from_secs(1) && started.elapsed() < Duration::from_secs(2));
    assert_eq!(transport.releases(), 1);

    // the server answers into a released connection
    assert!(matches!(server.await.unwrap(), Err(TransferError::Transport { .. })));
}

#[tokio::test(start_paused = true)]
async fn silence_times_out_receiver() {
    let network = MemoryNetwork::new();
    let receive_options = ReceiveOptions { timeout: Some(Duration::from_secs(1)), ..ReceiveOptions::default() };
    let server =
        spawn_single_exchange(network.bind("stalled"), QuasiServer::with_options(make_application(echo), receive_options));

    // declares a streamed body that never arrives
    let pipe = PipeBody::new(-1);
    let client = QuasiClient::new(network);
    let sender = tokio::spawn(async move {
        let request = QuasiRequest::new(Method::POST, "/").with_body(pipe);
        client.send("stalled", request, None).await
    });

    let server = server.await.unwrap();
    assert!(matches!(server, Err(TransferError::Timeout)));
    sender.abort();
}

#[tokio::test(start_paused = true)]
async fn cancellation_aborts_send() {
    let transport = CountingTransport::default();
    let _server = spawn_single_exchange(
        transport.network.bind("forever"),
        QuasiServer::new(make_application(|_request: QuasiRequest| async {
            std::future::pending::<()>().await;
            Ok::<_, BoxError>(None)
        })),
    );

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let client = QuasiClient::new(transport.clone());
    let result = client.send_with_cancellation("forever", QuasiRequest::default(), None, cancel).await;
    assert!(matches!(result, Err(TransferError::Cancelled)));
    assert_eq!(transport.releases(), 1);
}

#[tokio::test(start_paused = true)]
async fn dropped_send_releases_connection() {
    let transport = CountingTransport::default();
    let _server = spawn_single_exchange(
        transport.network.bind("forever"),
        QuasiServer::new(make_application(|_request: QuasiRequest| async {
            std::future::pending::<()>().await;
            Ok::<_, BoxError>(None)
        })),
    );

    let client = QuasiClient::new(transport.clone());
    let send = client.send("forever", QuasiRequest::default(), None);
    let result = tokio::time::timeout(Duration::from_millis(100), send).await;
    assert!(matches!(result, Err(_)));

    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
    assert_eq!(transport.releases(), 1);
}

#[tokio::test]
async fn exchange_over_duplex_stream() {
    let (client_io, server_io) = tokio::io::duplex(64);

    let (reader, writer) = tokio::io::split(server_io);
    let server_connection: Arc<dyn Connection> = Arc::new(StreamConnection::new(reader, writer));
    let server = QuasiServer::new(make_application(echo));
    let server = tokio::spawn(async move { server.accept_connection(server_connection).await });

    let (reader, writer) = tokio::io::split(client_io);
    let client_connection: Arc<dyn Connection> = Arc::new(StreamConnection::new(reader, writer));
    let transport = SingleConnection { connection: Mutex::new(Some(client_connection)) };
    let client = QuasiClient::new(transport);

    let payload = "x".repeat(1000);
    let request = QuasiRequest::new(Method::POST, "/").with_body(BytesBody::from(payload.clone()));
    let response = client.send(&(), request, None).await.unwrap();

    let body = response.body.unwrap();
    assert_eq!(read_all_bytes(&body, None).await.unwrap(), payload.as_bytes());
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn serve_handles_many_connections() {
    let network = MemoryNetwork::new();
    let listener = network.bind("many");
    let server = Arc::new(QuasiServer::new(make_application(echo)));
    tokio::spawn(async move { server.serve(&listener).await });

    let client = Arc::new(QuasiClient::new(network));
    let mut sends = Vec::new();
    for i in 0..16 {
        let client = Arc::clone(&client);
        sends.push(tokio::spawn(async move {
            let request = QuasiRequest::new(Method::POST, "/").with_body(BytesBody::from(format!("request {i}")));
            let response = client.send("many", request, None).await?;
            let body = response.body.ok_or("missing body")?;
            Ok::<_, BoxError>((i, read_all_bytes(&body, None).await?))
        }));
    }

    for send in sends {
        let (i, body) = send.await.unwrap().unwrap();
        assert_eq!(body, format!("request {i}").as_bytes());
    }
}
