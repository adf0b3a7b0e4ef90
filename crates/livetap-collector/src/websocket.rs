//! WebSocket + HTTP event source.
//!
//! Events arrive as JSON text frames on `ws_url_template` with `{room}`
//! substituted. Live status comes from `GET {api_base_url}/rooms/{room}/live`,
//! which answers `{"is_live": bool}`.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use livetap_core::RoomId;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use crate::catalog::{EventCatalog, SourceEvent};
use crate::errors::SourceError;
use crate::source::EventSource;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Endpoints and timeouts for [`WebSocketSource`].
#[derive(Clone, Debug)]
pub struct SourceConfig {
    /// WebSocket URL with a `{room}` placeholder.
    pub ws_url_template: String,
    /// Base URL of the HTTP API.
    pub api_base_url: String,
    /// HTTP request timeout.
    pub request_timeout: Duration,
}

#[derive(Deserialize)]
struct LiveStatus {
    is_live: bool,
}

/// Event source speaking the platform's WebSocket and HTTP endpoints.
pub struct WebSocketSource {
    config: SourceConfig,
    catalog: EventCatalog,
    http: reqwest::Client,
    stream: Option<WsStream>,
}

impl WebSocketSource {
    /// Build a source. No connection is made until [`EventSource::connect`].
    pub fn new(config: SourceConfig, catalog: EventCatalog) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            config,
            catalog,
            http,
            stream: None,
        })
    }

    /// Stream URL for a room.
    pub fn room_url(&self, room_id: &RoomId) -> String {
        self.config
            .ws_url_template
            .replace("{room}", &urlencoding::encode(room_id))
    }

    fn status_url(&self, room_id: &RoomId) -> String {
        format!(
            "{}/rooms/{}/live",
            self.config.api_base_url.trim_end_matches('/'),
            urlencoding::encode(room_id)
        )
    }
}

fn classify_status(status: StatusCode) -> SourceError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
            SourceError::SignService(format!("platform answered {status}"))
        }
        StatusCode::NOT_FOUND | StatusCode::GONE => SourceError::Offline,
        other => SourceError::Connection(format!("platform answered {other}")),
    }
}

fn classify_ws_error(err: WsError) -> SourceError {
    match err {
        WsError::Http(response) => classify_status(response.status()),
        WsError::ConnectionClosed | WsError::AlreadyClosed => SourceError::Closed,
        other => SourceError::Connection(other.to_string()),
    }
}

#[async_trait]
impl EventSource for WebSocketSource {
    async fn is_live(&self, room_id: &RoomId) -> Result<bool, SourceError> {
        let response = self.http.get(self.status_url(room_id)).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status));
        }
        let body: LiveStatus = response.json().await?;
        Ok(body.is_live)
    }

    async fn connect(&mut self, room_id: &RoomId) -> Result<(), SourceError> {
        if self.stream.is_some() {
            let _ = self.disconnect().await;
        }
        let url = self.room_url(room_id);
        debug!(%url, "connecting to platform");
        let (stream, _response) = connect_async(url.as_str()).await.map_err(classify_ws_error)?;
        info!(room_id = %room_id, kinds = self.catalog.len(), "platform stream open");
        self.stream = Some(stream);
        Ok(())
    }

    async fn next_event(&mut self) -> Result<SourceEvent, SourceError> {
        let stream = self.stream.as_mut().ok_or(SourceError::NotConnected)?;
        loop {
            let Some(frame) = stream.next().await else {
                return Err(SourceError::Closed);
            };
            let text = match frame.map_err(classify_ws_error)? {
                Message::Text(text) => text.as_str().to_owned(),
                Message::Binary(bytes) => match std::str::from_utf8(&bytes) {
                    Ok(text) => text.to_owned(),
                    Err(_) => {
                        warn!(len = bytes.len(), "non-utf8 binary frame ignored");
                        continue;
                    }
                },
                Message::Close(frame) => {
                    debug!(?frame, "platform sent close");
                    return Err(SourceError::Closed);
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            };
            if let Some(event) = self.catalog.decode(&text) {
                return Ok(event);
            }
        }
    }

    async fn disconnect(&mut self) -> Result<(), SourceError> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };
        if let Err(e) = stream.close(None).await {
            // The peer may already be gone; the stream is dropped either way.
            debug!(error = %e, "close handshake incomplete");
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tokio::net::TcpListener;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(ws: &str, api: &str) -> SourceConfig {
        SourceConfig {
            ws_url_template: ws.to_owned(),
            api_base_url: api.to_owned(),
            request_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn room_url_encodes_handle() {
        let source = WebSocketSource::new(
            config("ws://host/live/{room}", "http://host"),
            EventCatalog::default(),
        )
        .unwrap();
        assert_eq!(
            source.room_url(&RoomId::from("@some user")),
            "ws://host/live/%40some%20user"
        );
    }

    #[tokio::test]
    async fn is_live_reads_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rooms/abc/live"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"is_live": true})))
            .mount(&server)
            .await;

        let source =
            WebSocketSource::new(config("ws://unused/{room}", &server.uri()), EventCatalog::default())
                .unwrap();
        assert!(source.is_live(&RoomId::from("abc")).await.unwrap());
    }

    #[tokio::test]
    async fn forbidden_is_sign_service_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rooms/abc/live"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let source =
            WebSocketSource::new(config("ws://unused/{room}", &server.uri()), EventCatalog::default())
                .unwrap();
        let err = source.is_live(&RoomId::from("abc")).await.unwrap_err();
        assert_matches!(err, SourceError::SignService(_));
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let source =
            WebSocketSource::new(config("ws://unused/{room}", &server.uri()), EventCatalog::default())
                .unwrap();
        let err = source.is_live(&RoomId::from("abc")).await.unwrap_err();
        assert_eq!(err.class(), crate::errors::FailureClass::Transient);
    }

    #[tokio::test]
    async fn streams_catalog_events_until_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            for frame in [
                r#"{"type":"comment","user":{"nickname":"a"},"comment":"one"}"#,
                r#"{"type":"poll","question":"skipped"}"#,
                r#"{"type":"like","user":{"nickname":"b"},"count":3}"#,
            ] {
                ws.send(Message::text(frame)).await.unwrap();
            }
            ws.close(None).await.unwrap();
        });

        let mut source = WebSocketSource::new(
            config(&format!("ws://{addr}/live/{{room}}"), "http://unused"),
            EventCatalog::default(),
        )
        .unwrap();
        source.connect(&RoomId::from("abc")).await.unwrap();

        let first = source.next_event().await.unwrap();
        assert_eq!(first.kind, "comment");
        let second = source.next_event().await.unwrap();
        assert_eq!(second.kind, "like");
        assert_matches!(source.next_event().await, Err(SourceError::Closed));

        source.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn next_event_without_connect() {
        let mut source =
            WebSocketSource::new(config("ws://unused/{room}", "http://unused"), EventCatalog::default())
                .unwrap();
        assert_matches!(source.next_event().await, Err(SourceError::NotConnected));
        source.disconnect().await.unwrap();
    }
}
