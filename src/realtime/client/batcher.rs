use std::time::Duration;

use tokio::time::Instant;

use super::parser::ClientEvent;

pub const DEFAULT_BATCH_WINDOW: Duration = Duration::from_millis(50);

/// Groups events that arrive within `window` of the first one.
#[derive(Debug)]
pub struct EventBatcher {
    window: Duration,
    pending: Vec<ClientEvent>,
    deadline: Option<Instant>,
}

impl EventBatcher {
    pub fn new(window: Duration) -> Self {
        EventBatcher {
            window,
            pending: Vec::new(),
            deadline: None,
        }
    }

    pub fn push(&mut self, event: ClientEvent, now: Instant) {
        if self.pending.is_empty() {
            self.deadline = Some(now + self.window);
        }
        self.pending.push(event);
    }

    /// When the current batch is due; `None` while empty.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }

    pub fn take(&mut self) -> Option<Vec<ClientEvent>> {
        self.deadline = None;
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: &str) -> ClientEvent {
        ClientEvent {
            kind: kind.to_string(),
            id: None,
            data: String::new(),
            json: None,
        }
    }

    #[test]
    fn deadline_is_set_by_first_event() {
        let start = Instant::now();
        let mut batcher = EventBatcher::new(DEFAULT_BATCH_WINDOW);
        assert!(batcher.deadline().is_none());

        batcher.push(event("a"), start);
        batcher.push(event("b"), start + Duration::from_millis(30));

        assert_eq!(batcher.deadline(), Some(start + DEFAULT_BATCH_WINDOW));
        assert!(!batcher.is_due(start + Duration::from_millis(49)));
        assert!(batcher.is_due(start + Duration::from_millis(50)));
    }

    #[test]
    fn take_drains_and_resets() {
        let start = Instant::now();
        let mut batcher = EventBatcher::new(DEFAULT_BATCH_WINDOW);
        batcher.push(event("a"), start);
        batcher.push(event("b"), start);

        let batch = batcher.take().unwrap();
        assert_eq!(batch.len(), 2);
        assert!(batcher.take().is_none());
        assert!(batcher.deadline().is_none());
    }
}
