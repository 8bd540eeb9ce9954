use crate::wire::{self, OutboundMessage};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use voxpipe_core::{RecognitionConfig, RecognitionResult, SessionError};

/// Mirrors the original channel's 16 MiB inbound message limit.
const MAX_INBOUND_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Produces the per-call credential attached to the outbound request. A
/// provider failure surfaces as [`SessionError::Auth`] before any network
/// activity; the request is never sent unauthenticated.
pub type CredentialProvider = Arc<dyn Fn() -> Result<String, SessionError> + Send + Sync>;

/// Provider backed by a static API key. An empty key is an auth failure.
pub fn api_key_provider(key: &str) -> CredentialProvider {
    let key = key.to_string();
    Arc::new(move || {
        if key.is_empty() {
            Err(SessionError::Auth("api key not configured".to_string()))
        } else {
            Ok(key.clone())
        }
    })
}

/// Everything the session reports back, in receipt order.
#[derive(Debug)]
pub enum SessionEvent {
    Result(RecognitionResult),
    /// Service closed the stream normally.
    Closed,
    /// Transport or service error terminated the stream.
    Failed(SessionError),
}

enum Outbound {
    Audio(Vec<u8>),
    Shutdown,
}

// ── SessionHandle ─────────────────────────────────────────────

/// Cloneable sender side of an open session. Safe to use from any task or
/// thread; all sends are serialized by the session's single writer task in
/// call order.
#[derive(Clone)]
pub struct SessionHandle {
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    closed: Arc<AtomicBool>,
}

impl SessionHandle {
    /// Enqueue one audio chunk. Fails with [`SessionError::Closed`] once the
    /// session has been closed or has failed.
    pub fn send_audio(&self, bytes: Vec<u8>) -> Result<(), SessionError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SessionError::Closed);
        }
        self.outbound_tx
            .send(Outbound::Audio(bytes))
            .map_err(|_| SessionError::Closed)
    }

    /// Close the session. Idempotent; any queued audio is still flushed
    /// before the close frame goes out.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let _ = self.outbound_tx.send(Outbound::Shutdown);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

// ── RecognitionSession ────────────────────────────────────────

/// One bidirectional streaming conversation with the recognition service,
/// from config message to stream close.
pub struct RecognitionSession {
    handle: SessionHandle,
    event_rx: Option<mpsc::UnboundedReceiver<SessionEvent>>,
    writer_task: JoinHandle<()>,
    reader_task: JoinHandle<()>,
}

impl RecognitionSession {
    /// Connect, authenticate, and send the config message. When this
    /// returns `Ok`, the config is already on the wire — audio sent through
    /// the handle can never precede it.
    pub async fn open(
        endpoint: &str,
        config: RecognitionConfig,
        credentials: CredentialProvider,
    ) -> Result<Self, SessionError> {
        let key = credentials()?;

        let mut request = endpoint
            .into_client_request()
            .map_err(|e| SessionError::Connect(format!("invalid endpoint: {e}")))?;
        let header = HeaderValue::from_str(&key)
            .map_err(|e| SessionError::Auth(format!("unusable api key: {e}")))?;
        request.headers_mut().insert("x-api-key", header);

        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(MAX_INBOUND_MESSAGE_SIZE);

        let (mut ws, _) = tokio_tungstenite::connect_async_with_config(
            request,
            Some(ws_config),
            false,
        )
        .await
        .map_err(|e| match e {
            WsError::Http(response)
                if response.status() == 401 || response.status() == 403 =>
            {
                SessionError::Auth(format!(
                    "service rejected credentials: {}",
                    response.status()
                ))
            }
            other => SessionError::Connect(other.to_string()),
        })?;

        ws.send(OutboundMessage::Config(config).into_ws_message()?)
            .await
            .map_err(|e| SessionError::Connect(format!("config send failed: {e}")))?;
        tracing::debug!(endpoint, "session open, config sent");

        let (mut write, mut read) = ws.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));

        let writer_closed = Arc::clone(&closed);
        let writer_task = tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                match msg {
                    Outbound::Audio(bytes) => {
                        let msg = match OutboundMessage::AudioChunk(bytes).into_ws_message() {
                            Ok(msg) => msg,
                            Err(e) => {
                                tracing::warn!("dropping unencodable audio chunk: {e}");
                                continue;
                            }
                        };
                        if let Err(e) = write.send(msg).await {
                            tracing::warn!("audio send failed: {e}");
                            writer_closed.store(true, Ordering::SeqCst);
                            break;
                        }
                    }
                    Outbound::Shutdown => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        });

        let reader_closed = Arc::clone(&closed);
        let reader_task = tokio::spawn(async move {
            while let Some(item) = read.next().await {
                match item {
                    Ok(Message::Text(text)) => match wire::parse_response(&text) {
                        Ok(results) => {
                            for result in results {
                                if event_tx.send(SessionEvent::Result(result)).is_err() {
                                    return;
                                }
                            }
                        }
                        Err(e) => tracing::warn!("discarding malformed result: {e}"),
                    },
                    Ok(Message::Close(_)) => {
                        reader_closed.store(true, Ordering::SeqCst);
                        let _ = event_tx.send(SessionEvent::Closed);
                        return;
                    }
                    Ok(_) => {} // ping/pong handled by the transport
                    Err(e) => {
                        reader_closed.store(true, Ordering::SeqCst);
                        let _ = event_tx
                            .send(SessionEvent::Failed(SessionError::Transport(e.to_string())));
                        return;
                    }
                }
            }
            // Stream ended without a close frame
            reader_closed.store(true, Ordering::SeqCst);
            let _ = event_tx.send(SessionEvent::Closed);
        });

        Ok(Self {
            handle: SessionHandle {
                outbound_tx,
                closed,
            },
            event_rx: Some(event_rx),
            writer_task,
            reader_task,
        })
    }

    /// Cloneable sender handle for the capture pump.
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Inbound event stream; yields events in exact receipt order. Can be
    /// taken once.
    pub fn take_event_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<SessionEvent>> {
        self.event_rx.take()
    }

    pub fn send_audio(&self, bytes: Vec<u8>) -> Result<(), SessionError> {
        self.handle.send_audio(bytes)
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    /// Idempotent close; see [`SessionHandle::close`].
    pub fn close(&self) {
        self.handle.close();
    }

    /// Close and release the transport, waiting for the writer to flush its
    /// queue and drop the connection.
    pub async fn shutdown(self) {
        self.handle.close();
        let _ = self.writer_task.await;
        self.reader_task.abort();
        let _ = self.reader_task.await;
    }
}
