//! Link transport: narrow wire interface plus the WebSocket implementation
//!
//! Inbound frames and connectivity changes surface as [`LinkEvent`]s on a
//! channel consumed by the dispatcher. The socket read task pushes events
//! and nothing else: sending from inside the event path races the
//! connection's readiness, so all transmission goes through the single
//! outbound writer.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::LinkError;

/// Connectivity and frame events delivered to the dispatcher.
#[derive(Debug)]
pub enum LinkEvent {
    Connected,
    Disconnected,
    Text(String),
    Binary(Bytes),
}

/// The wire. One connection to one server at a time.
#[async_trait]
pub trait LinkTransport: Send + Sync {
    /// Establish the connection. On success a `Connected` event is
    /// emitted and inbound frames start flowing.
    async fn connect(&self) -> Result<(), LinkError>;

    fn is_connected(&self) -> bool;

    /// Transmit a text frame within `timeout`.
    async fn send_text(&self, text: &str, timeout: Duration) -> Result<(), LinkError>;

    /// Transmit a binary frame within `timeout`.
    async fn send_binary(&self, data: &[u8], timeout: Duration) -> Result<(), LinkError>;
}

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// WebSocket transport with bearer-token authentication.
pub struct WsTransport {
    url: String,
    token: String,
    events: mpsc::Sender<LinkEvent>,
    sink: tokio::sync::Mutex<Option<WsSink>>,
    connected: Arc<AtomicBool>,
}

impl WsTransport {
    pub fn new(url: String, token: String, events: mpsc::Sender<LinkEvent>) -> Self {
        Self {
            url,
            token,
            events,
            sink: tokio::sync::Mutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait]
impl LinkTransport for WsTransport {
    async fn connect(&self) -> Result<(), LinkError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| LinkError::ConnectFailed(e.to_string()))?;
        let auth = format!("Bearer {}", self.token);
        request.headers_mut().insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth).map_err(|e| LinkError::ConnectFailed(e.to_string()))?,
        );

        let (stream, _response) = connect_async(request)
            .await
            .map_err(|e| LinkError::ConnectFailed(e.to_string()))?;
        let (sink, mut read) = stream.split();

        *self.sink.lock().await = Some(sink);
        self.connected.store(true, Ordering::Release);
        tracing::info!(url = %self.url, "link connected");
        let _ = self.events.send(LinkEvent::Connected).await;

        // Reader task: decodes frames into events and nothing else.
        // Writing to the wire from here would race the outbound writer.
        let events = self.events.clone();
        let connected = self.connected.clone();
        tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        if events.send(LinkEvent::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Binary(data)) => {
                        if events.send(LinkEvent::Binary(Bytes::from(data))).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {} // ping/pong handled by the library
                    Err(err) => {
                        tracing::warn!(%err, "link read error");
                        break;
                    }
                }
            }
            connected.store(false, Ordering::Release);
            let _ = events.send(LinkEvent::Disconnected).await;
        });

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn send_text(&self, text: &str, timeout: Duration) -> Result<(), LinkError> {
        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(LinkError::NotConnected)?;
        match tokio::time::timeout(timeout, sink.send(Message::Text(text.to_string()))).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => {
                self.connected.store(false, Ordering::Release);
                Err(LinkError::SendFailed(err.to_string()))
            }
            Err(_) => Err(LinkError::SendTimeout),
        }
    }

    async fn send_binary(&self, data: &[u8], timeout: Duration) -> Result<(), LinkError> {
        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(LinkError::NotConnected)?;
        match tokio::time::timeout(timeout, sink.send(Message::Binary(data.to_vec()))).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => {
                self.connected.store(false, Ordering::Release);
                Err(LinkError::SendFailed(err.to_string()))
            }
            Err(_) => Err(LinkError::SendTimeout),
        }
    }
}
