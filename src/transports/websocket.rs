//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! [`WebSocketTransport`] carries the JSON frame protocol over a single
//! WebSocket connection; [`WebSocketConnector`] re-establishes such
//! connections for the reconnect loop, attaching the bearer credential
//! from a [`TokenProvider`] as an `Authorization` header on the upgrade
//! request. Both `ws://` and `wss://` URLs are supported — TLS is handled
//! transparently via [`MaybeTlsStream`](tokio_tungstenite::MaybeTlsStream).
//!
//! Only available with the `transport-websocket` feature (enabled by
//! default).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::auth::TokenProvider;
use crate::error::LobbyError;
use crate::transport::{Connector, Transport};

/// Type alias for the underlying WebSocket stream.
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// A [`Transport`] backed by one WebSocket connection.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) is cancel-safe: dropping the future before
/// it completes does not consume or lose messages, so it is safe inside
/// `tokio::select!`.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Establish a new WebSocket connection to the given URL, without
    /// credentials.
    ///
    /// # Errors
    ///
    /// Returns [`LobbyError::Io`] if the URL is invalid or the connection
    /// cannot be established. An underlying I/O error keeps its
    /// [`ErrorKind`](std::io::ErrorKind); everything else maps to
    /// [`ErrorKind::Other`](std::io::ErrorKind::Other).
    pub async fn connect(url: &str) -> Result<Self, LobbyError> {
        tracing::debug!(url = %url, "connecting to WebSocket server");
        let request = url
            .into_client_request()
            .map_err(|e| io_error(&e))?;
        Self::connect_request(request).await
    }

    /// Establish a connection with a bearer token attached as an
    /// `Authorization: Bearer <token>` header.
    pub async fn connect_with_token(url: &str, token: &str) -> Result<Self, LobbyError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| io_error(&e))?;
        let value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| {
            LobbyError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
        })?;
        request.headers_mut().insert(AUTHORIZATION, value);
        Self::connect_request(request).await
    }

    async fn connect_request(
        request: tokio_tungstenite::tungstenite::handshake::client::Request,
    ) -> Result<Self, LobbyError> {
        let (stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| io_error(&e))?;

        tracing::info!("WebSocket connection established");

        Ok(Self {
            stream,
            closed: false,
        })
    }

    /// Wrap an already-established WebSocket stream. Useful for custom
    /// TLS configuration, proxies, or extra headers beyond the bearer
    /// token.
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }
}

fn io_error(e: &tokio_tungstenite::tungstenite::Error) -> LobbyError {
    let kind = match e {
        tokio_tungstenite::tungstenite::Error::Io(io) => io.kind(),
        _ => std::io::ErrorKind::Other,
    };
    LobbyError::Io(std::io::Error::new(kind, e.to_string()))
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<(), LobbyError> {
        if self.closed {
            return Err(LobbyError::TransportClosed);
        }
        self.stream
            .send(Message::Text(message.into()))
            .await
            .map_err(|e| LobbyError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, LobbyError>> {
        loop {
            let msg = match self.stream.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => {
                    return Some(Err(LobbyError::TransportReceive(e.to_string())));
                }
                None => return None,
            };

            match msg {
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Close(frame) => {
                    tracing::debug!(?frame, "received WebSocket close frame");
                    return None;
                }
                Message::Ping(_) | Message::Pong(_) => {
                    // Protocol-level heartbeats ride the JSON frames; the
                    // WebSocket-level ping is auto-answered by tungstenite.
                }
                Message::Binary(_) => {
                    tracing::warn!("received unexpected binary WebSocket frame, skipping");
                }
                Message::Frame(_) => {
                    // Never produced by the read half; kept for
                    // exhaustiveness.
                    tracing::debug!("received raw WebSocket frame, skipping");
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), LobbyError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|e| LobbyError::TransportSend(e.to_string()))
    }
}

// ── Connector ───────────────────────────────────────────────────────

/// Re-establishes [`WebSocketTransport`] connections for the reconnect
/// loop.
///
/// The token is read from the [`TokenProvider`] on every attempt, so a
/// refreshed credential is picked up at the next reconnection.
pub struct WebSocketConnector {
    url: String,
    tokens: Arc<dyn TokenProvider>,
    connect_timeout: Option<Duration>,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>, tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            url: url.into(),
            tokens,
            connect_timeout: None,
        }
    }

    /// Fail an attempt with [`LobbyError::Timeout`] if the handshake does
    /// not complete within `timeout`. Unset by default.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    async fn connect_once(&self) -> Result<WebSocketTransport, LobbyError> {
        match self.tokens.token() {
            Some(token) => WebSocketTransport::connect_with_token(&self.url, &token).await,
            None => WebSocketTransport::connect(&self.url).await,
        }
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    type Output = WebSocketTransport;

    async fn connect(&mut self) -> Result<WebSocketTransport, LobbyError> {
        match self.connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.connect_once())
                .await
                .map_err(|_| LobbyError::Timeout)?,
            None => self.connect_once().await,
        }
    }
}

impl std::fmt::Debug for WebSocketConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketConnector")
            .field("url", &self.url)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::auth::{NoToken, StaticToken};
    use tokio::net::TcpListener;

    #[test]
    fn websocket_transport_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<WebSocketTransport>();
    }

    #[tokio::test]
    async fn connect_fails_with_invalid_url() {
        let result = WebSocketTransport::connect("not-a-valid-url").await;
        assert!(matches!(result.unwrap_err(), LobbyError::Io(_)));
    }

    #[tokio::test]
    async fn connect_fails_with_unreachable_host() {
        let result = WebSocketTransport::connect("ws://127.0.0.1:1").await;
        assert!(matches!(result.unwrap_err(), LobbyError::Io(_)));
    }

    /// Start a local WebSocket server that runs `handler` on the accepted
    /// connection and returns the address to connect to.
    async fn start_mock_server<F, Fut>(handler: F) -> String
    where
        F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            handler(ws).await;
        });

        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn recv_receives_text_messages() {
        let url = start_mock_server(|mut ws| async move {
            ws.send(Message::Text("hello".into())).await.unwrap();
            ws.send(Message::Text("world".into())).await.unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        assert_eq!(transport.recv().await.unwrap().unwrap(), "hello");
        assert_eq!(transport.recv().await.unwrap().unwrap(), "world");
    }

    #[tokio::test]
    async fn recv_returns_none_on_close_frame() {
        let url = start_mock_server(|mut ws| async move {
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn recv_skips_binary_frames() {
        let url = start_mock_server(|mut ws| async move {
            ws.send(Message::Binary(vec![0xDE, 0xAD].into()))
                .await
                .unwrap();
            ws.send(Message::Text("after_binary".into())).await.unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        assert_eq!(transport.recv().await.unwrap().unwrap(), "after_binary");
    }

    #[tokio::test]
    async fn send_after_close_returns_transport_closed() {
        let url = start_mock_server(|mut ws| async move {
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();

        let err = transport.send("oops".to_string()).await.unwrap_err();
        assert!(matches!(err, LobbyError::TransportClosed));
    }

    #[tokio::test]
    async fn double_close_is_idempotent() {
        let url =
            start_mock_server(|mut ws| async move { while let Some(Ok(_)) = ws.next().await {} })
                .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn connector_attaches_bearer_header() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut auth_header = None;
            let ws = tokio_tungstenite::accept_hdr_async(
                tcp,
                |req: &tokio_tungstenite::tungstenite::handshake::server::Request,
                 resp: tokio_tungstenite::tungstenite::handshake::server::Response| {
                    auth_header = req
                        .headers()
                        .get(AUTHORIZATION)
                        .and_then(|v| v.to_str().ok())
                        .map(String::from);
                    Ok(resp)
                },
            )
            .await
            .unwrap();
            drop(ws);
            auth_header
        });

        let mut connector = WebSocketConnector::new(
            format!("ws://{addr}"),
            Arc::new(StaticToken("tok123".into())),
        );
        let _transport = connector.connect().await.unwrap();

        let header = server.await.unwrap();
        assert_eq!(header.as_deref(), Some("Bearer tok123"));
    }

    #[tokio::test]
    async fn connector_without_token_omits_header() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut has_auth = false;
            let ws = tokio_tungstenite::accept_hdr_async(
                tcp,
                |req: &tokio_tungstenite::tungstenite::handshake::server::Request,
                 resp: tokio_tungstenite::tungstenite::handshake::server::Response| {
                    has_auth = req.headers().contains_key(AUTHORIZATION);
                    Ok(resp)
                },
            )
            .await
            .unwrap();
            drop(ws);
            has_auth
        });

        let mut connector = WebSocketConnector::new(format!("ws://{addr}"), Arc::new(NoToken));
        let _transport = connector.connect().await.unwrap();

        assert!(!server.await.unwrap());
    }

    #[tokio::test]
    async fn connector_timeout_yields_timeout_error() {
        // Non-routable address guarantees the handshake never completes.
        let mut connector =
            WebSocketConnector::new("ws://192.0.2.1:1", Arc::new(NoToken))
                .with_connect_timeout(Duration::from_millis(50));
        let err = connector.connect().await.unwrap_err();
        assert!(matches!(err, LobbyError::Timeout));
    }

    #[tokio::test]
    async fn from_stream_constructor_works() {
        let url = start_mock_server(|mut ws| async move {
            ws.send(Message::Text("from_stream_msg".into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let (ws_stream, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        let mut transport = WebSocketTransport::from_stream(ws_stream);

        assert_eq!(transport.recv().await.unwrap().unwrap(), "from_stream_msg");
    }
}
