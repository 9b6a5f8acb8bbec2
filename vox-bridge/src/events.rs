//! The bridge event stream: SSE reader, broadcast fan-out, and the
//! bounded buffer with its drop policy.

use crate::client::BridgeClient;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Event type of a turn-start notification.
pub const TURN_START_EVENT: &str = "TurnStart";

/// Event type of the synthetic event emitted after each (re)connect.
/// Consumers use it to invalidate connection-scoped state — the
/// remote-function registry marks every function unregistered.
pub const CONNECTED_EVENT: &str = "Connected";

const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Default capacity of an [`EventBuffer`].
pub const BUFFER_CAP: usize = 1024;

/// One event from the bridge's SSE stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeEvent {
    /// Event type name.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event payload.
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Turn the event belongs to, when the bridge knows it.
    #[serde(default)]
    pub turn: Option<u32>,
    /// Bridge-side timestamp.
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl BridgeEvent {
    /// The synthetic connected signal.
    pub fn connected() -> Self {
        Self {
            event_type: CONNECTED_EVENT.into(),
            payload: serde_json::Value::Null,
            turn: None,
            timestamp: None,
        }
    }

    /// Whether this is a turn-start notification.
    pub fn is_turn_start(&self) -> bool {
        self.event_type == TURN_START_EVENT
    }

    /// The event id from the payload, when present. The pipeline uses
    /// it to de-duplicate turn-start events across reconnects.
    pub fn event_id(&self) -> Option<i64> {
        self.payload.get("id").and_then(|v| v.as_i64())
    }
}

/// Owns the SSE reader task and fans events out to any number of
/// subscribers through a broadcast channel.
pub struct EventBroker {
    sender: broadcast::Sender<BridgeEvent>,
    reader: JoinHandle<()>,
}

impl EventBroker {
    /// Start the reader task against the given client.
    pub fn start(client: BridgeClient) -> Self {
        let (sender, _) = broadcast::channel(2 * BUFFER_CAP);
        let tx = sender.clone();
        let reader = tokio::spawn(async move {
            run_reader(client, tx).await;
        });
        Self { sender, reader }
    }

    /// Subscribe to the stream. Each subscriber sees every event from
    /// its subscription point onward.
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.sender.subscribe()
    }

    /// Stop the reader task.
    pub fn shutdown(&self) {
        self.reader.abort();
    }
}

impl Drop for EventBroker {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn run_reader(client: BridgeClient, tx: broadcast::Sender<BridgeEvent>) {
    let url = client.events_url();
    let mut backoff = BACKOFF_BASE;
    loop {
        let connect = client
            .stream_http()
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status());
        match connect {
            Ok(response) => {
                tracing::info!(url = %url, "bridge event stream connected");
                backoff = BACKOFF_BASE;
                let _ = tx.send(BridgeEvent::connected());

                let mut stream = response.bytes_stream().eventsource();
                while let Some(item) = stream.next().await {
                    match item {
                        Ok(sse) => match serde_json::from_str::<BridgeEvent>(&sse.data) {
                            Ok(event) => {
                                let _ = tx.send(event);
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, data = %sse.data, "unparseable bridge event");
                            }
                        },
                        Err(e) => {
                            tracing::warn!(error = %e, "bridge event stream broke");
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "bridge event stream connect failed");
            }
        }

        let jitter = rand::thread_rng().gen_range(0.8..1.2);
        tokio::time::sleep(backoff.mul_f64(jitter)).await;
        backoff = (backoff * 2).min(BACKOFF_CAP);
    }
}

/// Bounded FIFO standing between the broadcast stream and a consumer
/// that may fall behind.
///
/// When full, the oldest non-turn-start event is dropped with a
/// warning. Turn-start events are never dropped; if the buffer is full
/// of nothing but turn-starts it grows past its cap rather than lose
/// one.
#[derive(Debug)]
pub struct EventBuffer {
    queue: VecDeque<BridgeEvent>,
    cap: usize,
}

impl EventBuffer {
    /// A buffer with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(BUFFER_CAP)
    }

    /// A buffer with a specific capacity.
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(cap.min(64)),
            cap,
        }
    }

    /// Enqueue an event, returning whatever had to be dropped.
    pub fn push(&mut self, event: BridgeEvent) -> Option<BridgeEvent> {
        let mut dropped = None;
        if self.queue.len() >= self.cap {
            if let Some(pos) = self.queue.iter().position(|e| !e.is_turn_start()) {
                dropped = self.queue.remove(pos);
                if let Some(d) = &dropped {
                    tracing::warn!(
                        event_type = %d.event_type,
                        "event buffer full, dropping oldest non-turn-start event"
                    );
                }
            }
        }
        self.queue.push_back(event);
        dropped
    }

    /// Dequeue the oldest event.
    pub fn pop(&mut self) -> Option<BridgeEvent> {
        self.queue.pop_front()
    }

    /// Number of buffered events.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl Default for EventBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::response::sse::{Event, Sse};
    use axum::routing::get;
    use futures_util::stream;

    fn event(ty: &str) -> BridgeEvent {
        BridgeEvent {
            event_type: ty.into(),
            payload: serde_json::Value::Null,
            turn: None,
            timestamp: None,
        }
    }

    #[test]
    fn buffer_drops_oldest_non_turn_start() {
        let mut buffer = EventBuffer::with_capacity(3);
        buffer.push(event(TURN_START_EVENT));
        buffer.push(event("CityFounded"));
        buffer.push(event("WarDeclared"));
        let dropped = buffer.push(event("UnitKilled")).unwrap();
        assert_eq!(dropped.event_type, "CityFounded");
        assert_eq!(buffer.len(), 3);
        // The turn-start survived at the front.
        assert!(buffer.pop().unwrap().is_turn_start());
    }

    #[test]
    fn buffer_never_drops_turn_starts() {
        let mut buffer = EventBuffer::with_capacity(2);
        buffer.push(event(TURN_START_EVENT));
        buffer.push(event(TURN_START_EVENT));
        assert!(buffer.push(event(TURN_START_EVENT)).is_none());
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn event_id_reads_payload() {
        let mut e = event(TURN_START_EVENT);
        e.payload = serde_json::json!({"id": 42_000_001_i64, "player": 2});
        assert_eq!(e.event_id(), Some(42_000_001));
        assert_eq!(event("X").event_id(), None);
    }

    #[tokio::test]
    async fn broker_delivers_events_and_connected_signal() {
        let router = Router::new().route(
            "/events",
            get(|| async {
                let events = vec![
                    Ok::<_, std::convert::Infallible>(
                        Event::default()
                            .data(r#"{"type":"TurnStart","payload":{"id":5000001,"player":1},"turn":5}"#),
                    ),
                    Ok(Event::default().data(r#"{"type":"CityFounded","payload":{},"turn":5}"#)),
                ];
                Sse::new(stream::iter(events))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let client = BridgeClient::new(format!("http://{addr}")).unwrap();
        let broker = EventBroker::start(client);
        let mut rx = broker.subscribe();

        let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.event_type, CONNECTED_EVENT);

        let second = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(second.is_turn_start());
        assert_eq!(second.turn, Some(5));

        let third = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(third.event_type, "CityFounded");

        broker.shutdown();
    }
}
