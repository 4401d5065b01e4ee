use axum::Router;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use futures::{SinkExt, StreamExt};
use gardenlink_api::Channel;
use gardenlink_api::channel::INVALID_SESSION;
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;

use crate::state::MockState;

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub token: Option<String>,
}

pub fn stream_router(state: MockState) -> Router {
    Channel::ALL
        .into_iter()
        .fold(Router::new(), |router, channel| {
            router.route(
                channel.path(),
                get(
                    move |ws: WebSocketUpgrade,
                          State(state): State<MockState>,
                          Query(query): Query<StreamQuery>| async move {
                        ws.on_upgrade(move |socket| handle_stream(socket, state, channel, query.token))
                    },
                ),
            )
        })
        .with_state(state)
}

/// Sends the channel snapshot, then forwards matching pushes until either side closes.
async fn handle_stream(socket: WebSocket, state: MockState, channel: Channel, token: Option<String>) {
    let (mut sender, mut receiver) = socket.split();

    let session = match token {
        Some(token) => state.authenticate(&token).await,
        None => None,
    };
    let Some(session) = session else {
        tracing::info!(%channel, "rejecting push client without a valid session");
        let _ = sender.send(WsMessage::Text(INVALID_SESSION.to_string())).await;
        let _ = sender.send(WsMessage::Close(None)).await;
        return;
    };

    let mut pushes = state.subscribe();

    let snapshot = match state.snapshot(channel, &session).await.and_then(|value| state.seal(&value)) {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(%channel, error = %e, "failed to build snapshot");
            return;
        }
    };
    if sender.send(WsMessage::Text(snapshot)).await.is_err() {
        return;
    }

    tracing::info!(%channel, session = %session.record.id, "push client connected");

    loop {
        tokio::select! {
            push = pushes.recv() => match push {
                Ok(push) if push.reaches(channel, &session) => {
                    let ends_session = push.text == INVALID_SESSION;
                    if sender.send(WsMessage::Text(push.text)).await.is_err() {
                        break;
                    }
                    if ends_session {
                        let _ = sender.send(WsMessage::Close(None)).await;
                        break;
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(%channel, skipped, "push client lagging");
                }
                Err(RecvError::Closed) => break,
            },
            message = receiver.next() => match message {
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Err(e)) => {
                    tracing::warn!(%channel, "push client error: {}", e);
                    break;
                }
                Some(Ok(_)) => {}
            }
        }
    }

    tracing::info!(%channel, session = %session.record.id, "push client disconnected");
}
