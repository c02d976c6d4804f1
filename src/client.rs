//! Realtime service WebSocket client
//!
//! Owns the connection with a split sink/stream: a reader task parses
//! inbound frames into `ServerEvent`s and feeds them to the session over a
//! channel, and a single writer task serializes every outbound
//! `ClientEvent` — all producers (session control path, capture loop) go
//! through the same channel, so nothing else ever touches the sink.

use crate::protocol::{parse_server_event, ClientEvent, Result, ServerEvent, SessionError};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// Client handle for one realtime connection.
pub struct RealtimeClient {
    outbound_tx: mpsc::UnboundedSender<ClientEvent>,
    events_rx: mpsc::Receiver<Result<ServerEvent>>,
    close_tx: Option<oneshot::Sender<()>>,
    _reader_task: JoinHandle<()>,
    _writer_task: JoinHandle<()>,
}

impl RealtimeClient {
    /// Connect and authenticate to the realtime endpoint.
    pub async fn connect(url: &str, api_key: &str) -> Result<Self> {
        info!("Connecting to realtime service at {}", url);

        let mut request = url
            .into_client_request()
            .map_err(SessionError::WebSocket)?;
        request.headers_mut().insert(
            "Authorization",
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|_| SessionError::Other("API key contains invalid characters".to_string()))?,
        );
        request
            .headers_mut()
            .insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

        let (ws_stream, response) = connect_async(request).await.map_err(SessionError::WebSocket)?;
        debug!("WebSocket connection response: {:?}", response);

        let (mut sink, mut stream) = ws_stream.split();

        let (events_tx, events_rx) = mpsc::channel::<Result<ServerEvent>>(100);
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ClientEvent>();
        let (close_tx, mut close_rx) = oneshot::channel::<()>();

        let reader_task = tokio::spawn(async move {
            debug!("inbound event task started");
            while let Some(message_result) = stream.next().await {
                match message_result {
                    Ok(Message::Text(text)) => {
                        if !forward_payload(&text, &events_tx).await {
                            break;
                        }
                    }
                    Ok(Message::Binary(bytes)) => {
                        // Some proxies deliver JSON frames as binary.
                        if let Ok(text) = String::from_utf8(bytes.to_vec()) {
                            if !forward_payload(&text, &events_tx).await {
                                break;
                            }
                        } else {
                            debug!("ignoring non-UTF-8 binary message ({} bytes)", bytes.len());
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        info!("WebSocket closed by server: {:?}", frame);
                        let _ = events_tx.send(Err(SessionError::ConnectionClosed)).await;
                        break;
                    }
                    Ok(_) => {
                        // Ping/pong handled by the library.
                    }
                    Err(e) => {
                        error!("WebSocket error: {}", e);
                        let _ = events_tx.send(Err(SessionError::WebSocket(e))).await;
                        break;
                    }
                }
            }
            debug!("inbound event task terminated");
        });

        let writer_task = tokio::spawn(async move {
            debug!("outbound writer task started");
            loop {
                tokio::select! {
                    maybe_event = outbound_rx.recv() => {
                        let Some(event) = maybe_event else {
                            let _ = sink.send(Message::Close(None)).await;
                            break;
                        };
                        let json = match serde_json::to_string(&event) {
                            Ok(json) => json,
                            Err(e) => {
                                error!("failed to serialize outbound event: {}", e);
                                continue;
                            }
                        };
                        if let Err(e) = sink.send(Message::Text(json.into())).await {
                            error!("failed to send message: {}", e);
                            break;
                        }
                    }
                    _ = &mut close_rx => {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
            debug!("outbound writer task terminated");
        });

        info!("Connected to realtime service");
        Ok(Self {
            outbound_tx,
            events_rx,
            close_tx: Some(close_tx),
            _reader_task: reader_task,
            _writer_task: writer_task,
        })
    }

    /// Queue an outbound event. Never blocks.
    pub fn send(&self, event: ClientEvent) -> Result<()> {
        self.outbound_tx
            .send(event)
            .map_err(|_| SessionError::ChannelClosed)
    }

    /// A cloneable handle into the outbound channel, for the capture loop.
    pub fn sender(&self) -> mpsc::UnboundedSender<ClientEvent> {
        self.outbound_tx.clone()
    }

    /// Receive the next inbound event, in arrival order.
    pub async fn next_event(&mut self) -> Option<Result<ServerEvent>> {
        self.events_rx.recv().await
    }

    /// Ask the writer task to send a close frame and wind down.
    pub fn close(&mut self) {
        if let Some(close_tx) = self.close_tx.take() {
            let _ = close_tx.send(());
        }
    }
}

/// Parse one text payload and forward it. Returns false once the receiving
/// side is gone.
async fn forward_payload(text: &str, events_tx: &mpsc::Sender<Result<ServerEvent>>) -> bool {
    match parse_server_event(text) {
        Ok(Some(event)) => events_tx.send(Ok(event)).await.is_ok(),
        Ok(None) => true,
        Err(e) => {
            // A single malformed payload is transient; keep reading.
            warn!("failed to parse server event: {}", e);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn spawn_loopback_server(
    ) -> (std::net::SocketAddr, tokio::task::JoinHandle<Vec<String>>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            ws.send(Message::Text(r#"{"type":"session.created"}"#.into()))
                .await
                .unwrap();
            ws.send(Message::Text(r#"{"type":"rate_limits.updated"}"#.into()))
                .await
                .unwrap();
            ws.send(Message::Text(
                r#"{"type":"input_audio_buffer.speech_started","audio_start_ms":10}"#.into(),
            ))
            .await
            .unwrap();

            let mut received = Vec::new();
            while let Some(Ok(message)) = ws.next().await {
                match message {
                    Message::Text(text) => received.push(text.to_string()),
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            received
        });
        (addr, handle)
    }

    #[tokio::test]
    async fn test_round_trip_and_unknown_event_skipping() {
        let (addr, server) = spawn_loopback_server().await;
        let mut client = RealtimeClient::connect(&format!("ws://{}", addr), "test-key")
            .await
            .unwrap();

        client.send(ClientEvent::ResponseCancel).unwrap();

        assert!(matches!(
            client.next_event().await,
            Some(Ok(ServerEvent::SessionCreated))
        ));
        // The rate_limits event is unknown to this client and must be skipped.
        assert!(matches!(
            client.next_event().await,
            Some(Ok(ServerEvent::SpeechStarted))
        ));

        client.close();
        let received = server.await.unwrap();
        assert_eq!(received.len(), 1);
        assert!(received[0].contains("response.cancel"));
    }

    #[tokio::test]
    async fn test_server_close_surfaces_once() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.close(None).await.unwrap();
        });

        let mut client = RealtimeClient::connect(&format!("ws://{}", addr), "test-key")
            .await
            .unwrap();
        assert!(matches!(
            client.next_event().await,
            Some(Err(SessionError::ConnectionClosed))
        ));
        assert!(client.next_event().await.is_none());
        server.await.unwrap();
    }
}
