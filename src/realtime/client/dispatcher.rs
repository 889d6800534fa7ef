use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};

use super::parser::ClientEvent;

pub type Batch = Arc<Vec<ClientEvent>>;

/// Fans each flushed batch out to every subscription.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    tx: broadcast::Sender<Batch>,
}

impl EventDispatcher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        EventDispatcher { tx }
    }

    /// Returns how many subscriptions received the batch.
    pub fn dispatch(&self, batch: Vec<ClientEvent>) -> usize {
        if batch.is_empty() {
            return 0;
        }
        self.tx.send(Arc::new(batch)).unwrap_or(0)
    }

    /// `Some(kind)` listens to one event kind, `None` to all of them.
    pub fn subscribe(&self, kind: Option<&str>) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            kind: kind.map(str::to_string),
        }
    }
}

pub struct Subscription {
    rx: broadcast::Receiver<Batch>,
    kind: Option<String>,
}

impl Subscription {
    /// Next non-empty batch matching this subscription, or `None` once the
    /// client has shut down.
    pub async fn recv(&mut self) -> Option<Vec<ClientEvent>> {
        loop {
            match self.rx.recv().await {
                Ok(batch) => {
                    let events: Vec<ClientEvent> = match &self.kind {
                        None => batch.to_vec(),
                        Some(kind) => batch.iter().filter(|e| &e.kind == kind).cloned().collect(),
                    };
                    if !events.is_empty() {
                        return Some(events);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("⚠️  Subscriber lagged, {} batch(es) skipped", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
