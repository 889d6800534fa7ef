use std::collections::HashMap;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockWriteGuard};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use serde_json::Value;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_stream::wrappers::ReceiverStream;

use super::event::{heartbeat_frame, UserEvent};
use crate::utils::time::now_millis;

pub const CLIENT_BUFFER: usize = 64;
pub const REDUNDANT_DELAY: Duration = Duration::from_secs(3);

struct ClientSlot {
    id: u64,
    tx: mpsc::Sender<Bytes>,
}

#[derive(Default)]
struct HubInner {
    clients: RwLock<HashMap<String, Vec<ClientSlot>>>,
    next_id: AtomicU64,
}

/// Per-user fan-out of SSE frames to every open `/api/events` stream.
///
/// Each stream owns a bounded channel. Writers never block: a full channel
/// drops the frame for that client, a closed one is pruned. The map lock is
/// never held across an await.
#[derive(Clone, Default)]
pub struct EventHub {
    inner: Arc<HubInner>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a client for `user_id` and queues the `sse_connected` event.
    pub fn subscribe(&self, user_id: &str) -> EventStream {
        let (tx, rx) = mpsc::channel(CLIENT_BUFFER);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        let connected = UserEvent::new("sse_connected").with("timestamp", now_millis());
        // Fresh channel, cannot be full.
        let _ = tx.try_send(connected.frame());

        self.lock_clients()
            .entry(user_id.to_string())
            .or_default()
            .push(ClientSlot { id, tx });

        EventStream {
            inner: ReceiverStream::new(rx),
            hub: self.clone(),
            user_id: user_id.to_string(),
            client_id: id,
        }
    }

    /// Writes `event` to every stream of `user_id`; returns how many took it.
    pub fn send_to_user(&self, user_id: &str, event: &UserEvent) -> usize {
        let delivered = self.write_frame(user_id, event.frame());
        log::debug!(
            "📨 Event '{}' delivered to {} client(s) of user {}",
            event.kind,
            delivered,
            user_id
        );
        delivered
    }

    /// Like `send_to_user`, and schedules one redundant re-delivery of
    /// critical events after 3 seconds.
    pub fn notify_user(&self, user_id: &str, event: UserEvent) -> usize {
        let delivered = self.send_to_user(user_id, &event);

        if event.is_critical() {
            let hub = self.clone();
            let user_id = user_id.to_string();
            tokio::spawn(async move {
                tokio::time::sleep(REDUNDANT_DELAY).await;
                let redundant = event
                    .with("redundant", true)
                    .with("timestamp", Value::String(chrono::Utc::now().to_rfc3339()));
                hub.send_to_user(&user_id, &redundant);
            });
        }

        delivered
    }

    /// Sends a heartbeat comment to every client and prunes closed ones.
    pub fn heartbeat(&self) -> usize {
        let frame = heartbeat_frame(now_millis());
        let mut clients = self.lock_clients();
        let mut reached = 0;

        for slots in clients.values_mut() {
            reached += write_to_slots(slots, &frame);
        }
        clients.retain(|_, slots| !slots.is_empty());

        reached
    }

    pub fn client_count(&self) -> usize {
        self.read_clients().values().map(Vec::len).sum()
    }

    pub fn user_count(&self) -> usize {
        self.read_clients().len()
    }

    fn write_frame(&self, user_id: &str, frame: Bytes) -> usize {
        let mut clients = self.lock_clients();
        let Some(slots) = clients.get_mut(user_id) else {
            return 0;
        };

        let delivered = write_to_slots(slots, &frame);
        if slots.is_empty() {
            clients.remove(user_id);
        }
        delivered
    }

    fn remove_client(&self, user_id: &str, client_id: u64) {
        let mut clients = self.lock_clients();
        if let Some(slots) = clients.get_mut(user_id) {
            slots.retain(|slot| slot.id != client_id);
            if slots.is_empty() {
                clients.remove(user_id);
            }
        }
        log::info!("🔌 SSE client {} disconnected for user {}", client_id, user_id);
    }

    fn lock_clients(&self) -> RwLockWriteGuard<'_, HashMap<String, Vec<ClientSlot>>> {
        self.inner
            .clients
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read_clients(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Vec<ClientSlot>>> {
        self.inner
            .clients
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn write_to_slots(slots: &mut Vec<ClientSlot>, frame: &Bytes) -> usize {
    let mut delivered = 0;
    slots.retain(|slot| match slot.tx.try_send(frame.clone()) {
        Ok(()) => {
            delivered += 1;
            true
        }
        Err(TrySendError::Full(_)) => {
            log::warn!("⚠️  SSE client {} is not keeping up, frame dropped", slot.id);
            true
        }
        Err(TrySendError::Closed(_)) => false,
    });
    delivered
}

/// Body of one SSE response. Dropping it (client went away) unregisters
/// the client from the hub.
pub struct EventStream {
    inner: ReceiverStream<Bytes>,
    hub: EventHub,
    user_id: String,
    client_id: u64,
}

impl EventStream {
    pub fn client_id(&self) -> u64 {
        self.client_id
    }
}

impl Stream for EventStream {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx).map(|frame| frame.map(Ok))
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.hub.remove_client(&self.user_id, self.client_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    async fn next_text(stream: &mut EventStream) -> String {
        let frame = stream.next().await.unwrap().unwrap();
        String::from_utf8(frame.to_vec()).unwrap()
    }

    fn payload(frame: &str) -> Value {
        serde_json::from_str(frame.trim_start_matches("data: ").trim()).unwrap()
    }

    #[tokio::test]
    async fn subscribe_queues_connected_event() {
        let hub = EventHub::new();
        let mut stream = hub.subscribe("u1");

        let first = payload(&next_text(&mut stream).await);
        assert_eq!(first["type"], "sse_connected");
        assert!(first["timestamp"].is_i64());
        assert_eq!(hub.client_count(), 1);
        assert_eq!(hub.user_count(), 1);
    }

    #[tokio::test]
    async fn events_only_reach_their_user() {
        let hub = EventHub::new();
        let mut alice = hub.subscribe("alice");
        let mut bob = hub.subscribe("bob");
        next_text(&mut alice).await;
        next_text(&mut bob).await;

        let delivered = hub.send_to_user("alice", &UserEvent::new("stats_updated"));
        assert_eq!(delivered, 1);
        assert_eq!(payload(&next_text(&mut alice).await)["type"], "stats_updated");

        hub.send_to_user("bob", &UserEvent::new("ping"));
        assert_eq!(payload(&next_text(&mut bob).await)["type"], "ping");
    }

    #[tokio::test]
    async fn every_stream_of_a_user_receives() {
        let hub = EventHub::new();
        let _a = hub.subscribe("u1");
        let _b = hub.subscribe("u1");

        assert_eq!(hub.send_to_user("u1", &UserEvent::new("x")), 2);
        assert_eq!(hub.user_count(), 1);
        assert_eq!(hub.client_count(), 2);
    }

    #[tokio::test]
    async fn dropped_streams_are_removed() {
        let hub = EventHub::new();
        let stream = hub.subscribe("u1");
        let _other = hub.subscribe("u2");
        drop(stream);

        assert_eq!(hub.client_count(), 1);
        assert_eq!(hub.send_to_user("u1", &UserEvent::new("x")), 0);
    }

    #[tokio::test]
    async fn full_channel_drops_frame_but_keeps_client() {
        let hub = EventHub::new();
        let _stream = hub.subscribe("u1");

        // One slot is taken by sse_connected.
        for _ in 0..CLIENT_BUFFER - 1 {
            assert_eq!(hub.send_to_user("u1", &UserEvent::new("fill")), 1);
        }
        assert_eq!(hub.send_to_user("u1", &UserEvent::new("overflow")), 0);
        assert_eq!(hub.client_count(), 1);
    }

    #[tokio::test]
    async fn heartbeat_is_a_comment() {
        let hub = EventHub::new();
        let mut stream = hub.subscribe("u1");
        next_text(&mut stream).await;

        assert_eq!(hub.heartbeat(), 1);
        assert!(next_text(&mut stream).await.starts_with(": heartbeat "));
    }

    #[tokio::test(start_paused = true)]
    async fn critical_events_are_sent_twice() {
        let hub = EventHub::new();
        let mut stream = hub.subscribe("u1");
        next_text(&mut stream).await;

        hub.notify_user("u1", UserEvent::new("minecraft_linked").with("mcUsername", "Steve"));
        let first = payload(&next_text(&mut stream).await);
        assert!(first.get("redundant").is_none());

        let second = payload(&next_text(&mut stream).await);
        assert_eq!(second["type"], "minecraft_linked");
        assert_eq!(second["redundant"], true);
        assert_eq!(second["mcUsername"], "Steve");
        assert!(second["timestamp"].is_string());
    }

    #[tokio::test(start_paused = true)]
    async fn ordinary_events_are_sent_once() {
        let hub = EventHub::new();
        let mut stream = hub.subscribe("u1");
        next_text(&mut stream).await;

        hub.notify_user("u1", UserEvent::new("stats_updated"));
        next_text(&mut stream).await;

        tokio::time::sleep(REDUNDANT_DELAY * 2).await;
        hub.heartbeat();
        assert!(next_text(&mut stream).await.starts_with(": heartbeat"));
    }
}
