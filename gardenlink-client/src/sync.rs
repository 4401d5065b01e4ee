use std::sync::Arc;

use gardenlink_api::Channel;
use gardenlink_api::channel::{INVALID_SESSION, is_invalid_session};
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;

use crate::configs::ClientContext;
use crate::error::{ClientError, Result};
use crate::reconciler::{AccountView, LogView, OutputView, PowerView, Reconcile, SessionGate};
use crate::session::{SessionEvent, SessionStore};
use crate::stream::{ConnectionState, Frame, StreamClient, StreamHandle};

/// Wires push channels into observable view models.
#[derive(Clone)]
pub struct SyncClient {
    context: Arc<ClientContext>,
    stream: StreamClient,
    session: SessionStore,
}

impl SyncClient {
    pub fn new(context: Arc<ClientContext>, session: SessionStore) -> Self {
        let stream = StreamClient::new(context.secret.clone(), context.reconnect);

        Self {
            context,
            stream,
            session,
        }
    }

    /// Streams `channel` into a view starting at `initial`.
    ///
    /// Payloads are reconciled in the order they arrive. The subscription
    /// stops on its own when the session is signed out or rejected.
    pub fn subscribe<V>(&self, channel: Channel, initial: V) -> Result<Subscription<V>>
    where
        V: Reconcile + Send + Sync + 'static,
    {
        let token = self.session.token().ok_or(ClientError::Unauthenticated)?;
        let url = self.context.endpoints.channel(channel, &token)?;

        let (view_tx, view_rx) = watch::channel(initial);
        let (status_tx, status_rx) = watch::channel(ConnectionState::Connecting);
        let mut events = self.session.subscribe();
        let session = self.session.clone();

        let handle = self.stream.connect(
            url,
            move |frame| match frame {
                Frame::Plain(value) if is_invalid_session(&value) => {
                    session.force_logout(format!("{INVALID_SESSION} on {channel}"));
                }
                Frame::Plain(Value::String(text)) => {
                    tracing::debug!(%channel, %text, "ignoring text frame");
                }
                frame => {
                    view_tx.send_modify(|view| *view = view.reconcile(frame.value()));
                }
            },
            move |state| {
                status_tx.send_replace(state);
            },
        );

        let cancel = handle.cancellation_token();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(SessionEvent::SignedOut | SessionEvent::ForcedLogout { .. }) => {
                            tracing::debug!(%channel, "session ended, closing subscription");
                            cancel.cancel();
                            break;
                        }
                        Ok(SessionEvent::SignedIn) | Err(RecvError::Lagged(_)) => {}
                        Err(RecvError::Closed) => break,
                    }
                }
            }
        });

        Ok(Subscription {
            channel,
            view: view_rx,
            status: status_rx,
            handle,
        })
    }

    pub fn outputs(&self) -> Result<Subscription<OutputView>> {
        self.subscribe(Channel::Output, OutputView::default())
    }

    pub fn account(&self) -> Result<Subscription<AccountView>> {
        self.subscribe(Channel::SessionAccount, AccountView::default())
    }

    pub fn power(&self) -> Result<Subscription<PowerView>> {
        self.subscribe(Channel::Pzem, PowerView::with_limit(self.context.views.pzem_history))
    }

    pub fn logs(&self) -> Result<Subscription<LogView>> {
        self.subscribe(Channel::Logs, LogView::with_limit(self.context.views.log_history))
    }

    pub fn session_id(&self) -> Result<Subscription<SessionGate>> {
        self.subscribe(Channel::SessionId, SessionGate::default())
    }
}

/// A live view fed by one push channel. Dropping it closes the stream.
pub struct Subscription<V> {
    channel: Channel,
    view: watch::Receiver<V>,
    status: watch::Receiver<ConnectionState>,
    handle: StreamHandle,
}

impl<V> Subscription<V> {
    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Receiver notified after every reconciled payload.
    pub fn view(&self) -> watch::Receiver<V> {
        self.view.clone()
    }

    pub fn snapshot(&self) -> V
    where
        V: Clone,
    {
        self.view.borrow().clone()
    }

    pub fn status(&self) -> ConnectionState {
        *self.status.borrow()
    }

    pub fn status_changes(&self) -> watch::Receiver<ConnectionState> {
        self.status.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    /// Tears the stream down and waits for it to stop.
    pub async fn close(self) {
        self.handle.closed().await;
    }
}
