use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::{
        session::SessionSnapshot,
        sse::{ServerEvent, SessionClosedEvent},
    },
    error::ServiceError,
    state::{SessionHandle, SharedState, SseHub},
};

const EVENT_SNAPSHOT: &str = "session.snapshot";
const EVENT_CLOSED: &str = "session.closed";

/// Live subscription to one session's events.
pub struct SessionSubscription {
    /// Snapshot at subscription time, delivered to this subscriber only.
    pub initial: Option<ServerEvent>,
    /// Events published after the snapshot.
    pub receiver: broadcast::Receiver<ServerEvent>,
}

/// Subscribe to the event stream of session `id`, starting from its current snapshot.
pub async fn subscribe_session(
    state: &SharedState,
    id: Uuid,
) -> Result<SessionSubscription, ServiceError> {
    let handle = state.session(id)?;
    // publishers hold the session lock
    let slot = handle.lock().await;
    let receiver = handle.events().subscribe();
    let initial = encode(EVENT_SNAPSHOT, &SessionSnapshot::from(slot.session()));
    Ok(SessionSubscription { initial, receiver })
}

/// Publish a snapshot to the session's subscribers.
pub fn broadcast_snapshot(handle: &SessionHandle, snapshot: &SessionSnapshot) {
    send_event(handle.events(), EVENT_SNAPSHOT, snapshot);
}

/// Tell subscribers the session is gone.
pub fn broadcast_closed(handle: &SessionHandle, reason: &str) {
    let payload = SessionClosedEvent {
        session_id: handle.id(),
        reason: reason.to_string(),
    };
    send_event(handle.events(), EVENT_CLOSED, &payload);
}

fn send_event(hub: &SseHub, event: &str, payload: &impl Serialize) {
    if let Some(event) = encode(event, payload) {
        hub.broadcast(event);
    }
}

fn encode(event: &str, payload: &impl Serialize) -> Option<ServerEvent> {
    ServerEvent::json(Some(event.to_string()), payload)
        .inspect_err(|err| warn!(event, error = %err, "failed to serialize SSE payload"))
        .ok()
}

fn to_event(payload: ServerEvent) -> Event {
    let event = Event::default().data(payload.data);
    match payload.event {
        Some(name) => event.event(name),
        None => event,
    }
}

/// Convert a subscription into an SSE response, forwarding events and
/// cleaning up once the client disconnects or the session closes.
pub fn to_sse_stream(
    subscription: SessionSubscription,
    session_id: Uuid,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let SessionSubscription {
        initial,
        mut receiver,
    } = subscription;
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        if let Some(snapshot) = initial {
            if tx.send(Ok(to_event(snapshot))).await.is_err() {
                return;
            }
        }

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(payload) => {
                            let closing = payload.event.as_deref() == Some(EVENT_CLOSED);
                            if tx.send(Ok(to_event(payload))).await.is_err() || closing {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(skipped)) => {
                            // Snapshots are self-contained; the next one catches the client up.
                            debug!(%session_id, skipped, "SSE subscriber lagged");
                            continue;
                        }
                    }
                }
            }
        }

        info!(%session_id, "session SSE stream disconnected");
    });

    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
