use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use gardenlink_api::envelope::{self, EncryptedEnvelope};
use gardenlink_api::SharedSecret;
use reqwest::Url;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::ClientError;

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// Same delay before every attempt, retried forever
    Fixed(Duration),
    /// Doubling delay starting at `initial`, capped at `max`, retried forever
    Exponential { initial: Duration, max: Duration },
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt number `attempt` (0 based).
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            ReconnectPolicy::Fixed(delay) => delay,
            ReconnectPolicy::Exponential { initial, max } => {
                let factor = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
                initial.saturating_mul(factor).min(max)
            }
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy::Fixed(DEFAULT_RECONNECT_DELAY)
    }
}

/// One decoded push frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Decrypted `{iv, content}` envelope
    Sealed(Value),
    /// Frame sent in the clear, such as control messages
    Plain(Value),
}

impl Frame {
    pub fn value(&self) -> &Value {
        match self {
            Frame::Sealed(value) | Frame::Plain(value) => value,
        }
    }
}

/// Turns raw frame text into a [`Frame`]; undecryptable envelopes are dropped.
pub fn decode_frame(text: &str, secret: &SharedSecret) -> Option<Frame> {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(_) => {
            tracing::debug!("delivering non-JSON frame as text");
            return Some(Frame::Plain(Value::String(text.to_owned())));
        }
    };

    match EncryptedEnvelope::detect(&value) {
        Some(sealed) => match envelope::decrypt(&sealed, secret) {
            Ok(plain) => Some(Frame::Sealed(plain)),
            Err(e) => {
                tracing::warn!(error = %e, "dropping undecryptable frame");
                None
            }
        },
        None => Some(Frame::Plain(value)),
    }
}

type LiveStreams = Arc<DashMap<String, (Uuid, CancellationToken)>>;

/// Keeps one self-healing WebSocket per logical endpoint.
#[derive(Clone)]
pub struct StreamClient {
    secret: SharedSecret,
    policy: ReconnectPolicy,
    live: LiveStreams,
}

impl StreamClient {
    pub fn new(secret: SharedSecret, policy: ReconnectPolicy) -> Self {
        Self {
            secret,
            policy,
            live: Arc::new(DashMap::new()),
        }
    }

    /// Opens `url` and keeps it open until the returned handle is closed or
    /// dropped. A previous handle for the same endpoint is torn down first.
    pub fn connect<M, S>(&self, url: Url, on_message: M, on_status: S) -> StreamHandle
    where
        M: FnMut(Frame) + Send + 'static,
        S: FnMut(ConnectionState) + Send + 'static,
    {
        let endpoint = endpoint_key(&url);
        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();

        if let Some((_, (_, stale))) = self.live.remove(&endpoint) {
            tracing::debug!(%endpoint, "replacing stale stream");
            stale.cancel();
        }
        self.live.insert(endpoint.clone(), (id, cancel.clone()));

        let task = tokio::spawn(run(
            url,
            endpoint.clone(),
            self.secret.clone(),
            self.policy,
            cancel.clone(),
            on_message,
            on_status,
        ));

        StreamHandle {
            id,
            endpoint,
            cancel,
            live: self.live.clone(),
            task: Some(task),
        }
    }

    pub fn is_live(&self, url: &Url) -> bool {
        self.live.contains_key(&endpoint_key(url))
    }
}

/// Ownership of one stream. Closing or dropping it stops all reconnects.
pub struct StreamHandle {
    id: Uuid,
    endpoint: String,
    cancel: CancellationToken,
    live: LiveStreams,
    task: Option<JoinHandle<()>>,
}

impl StreamHandle {
    pub fn close(&self) {
        self.cancel.cancel();
        self.live.remove_if(&self.endpoint, |_, (id, _)| *id == self.id);
    }

    /// Closes the stream and waits for its task to finish.
    pub async fn closed(mut self) {
        self.close();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Token that tears the stream down when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run<M, S>(
    url: Url,
    endpoint: String,
    secret: SharedSecret,
    policy: ReconnectPolicy,
    cancel: CancellationToken,
    mut on_message: M,
    mut on_status: S,
) where
    M: FnMut(Frame) + Send + 'static,
    S: FnMut(ConnectionState) + Send + 'static,
{
    let mut attempt: u32 = 0;

    loop {
        on_status(ConnectionState::Connecting);

        let connected = tokio::select! {
            _ = cancel.cancelled() => {
                on_status(ConnectionState::Closed);
                break;
            }
            result = connect_async(url.as_str()) => result,
        };

        match connected {
            Ok((socket, _)) => {
                attempt = 0;
                tracing::info!(%endpoint, "stream connected");
                on_status(ConnectionState::Open);

                let cancelled = pump(socket, &secret, &cancel, &mut on_message).await;
                on_status(ConnectionState::Closed);
                if cancelled {
                    break;
                }
                tracing::warn!(%endpoint, "stream closed");
            }
            Err(e) => {
                let error = ClientError::from(e);
                tracing::warn!(%endpoint, %error, "stream connection failed");
                on_status(ConnectionState::Closed);
            }
        }

        let delay = policy.delay(attempt);
        attempt = attempt.saturating_add(1);
        tracing::debug!(%endpoint, ?delay, attempt, "reconnect scheduled");

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    tracing::debug!(%endpoint, "stream stopped");
}

/// Reads frames until the socket ends. Returns `true` when stopped by teardown.
async fn pump<M>(
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
    secret: &SharedSecret,
    cancel: &CancellationToken,
    on_message: &mut M,
) -> bool
where
    M: FnMut(Frame),
{
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                return true;
            }
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    if let Some(frame) = decode_frame(&text, secret) {
                        on_message(frame);
                    }
                }
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => {
                        if let Some(frame) = decode_frame(&text, secret) {
                            on_message(frame);
                        }
                    }
                    Err(_) => tracing::warn!("dropping non UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!(?frame, "close frame received");
                    return false;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "stream read failed");
                    return false;
                }
                None => return false,
            }
        }
    }
}

fn endpoint_key(url: &Url) -> String {
    let mut key = url.clone();
    key.set_query(None);
    key.set_fragment(None);
    key.to_string()
}
