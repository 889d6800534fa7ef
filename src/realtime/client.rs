//! Reconnecting SSE client for `/api/events`.
//!
//! One background task owns the connection: it parses the byte stream,
//! groups events into short batches and hands each batch to the
//! dispatcher. Failures are retried on the [`ReconnectPolicy`] schedule;
//! once retries are exhausted the state becomes [`ConnectionState::Failed`]
//! and the task exits.

pub mod backoff;
pub mod batcher;
pub mod dispatcher;
pub mod parser;
pub mod transport;

use std::time::Duration;

use futures::StreamExt;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub use backoff::ReconnectPolicy;
pub use batcher::{EventBatcher, DEFAULT_BATCH_WINDOW};
pub use dispatcher::{EventDispatcher, Subscription};
pub use parser::{ClientEvent, SseParser};
pub use transport::{ByteStream, EventTransport, HttpTransport};

const DISPATCH_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server answered with status {0}")]
    Status(u16),
    #[error("event stream ended")]
    StreamEnded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Reconnecting { attempt: u32, delay: Duration },
    Failed { attempts: u32, last_error: String },
    Closed,
}

impl ConnectionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Failed { .. } | ConnectionState::Closed)
    }
}

pub struct ReconnectingClient;

impl ReconnectingClient {
    /// Starts the connection task on the current tokio runtime.
    pub fn spawn<T: EventTransport>(
        transport: T,
        policy: ReconnectPolicy,
        batch_window: Duration,
    ) -> ClientHandle {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let dispatcher = EventDispatcher::new(DISPATCH_CAPACITY);

        let task = tokio::spawn(run(
            transport,
            policy,
            batch_window,
            state_tx,
            dispatcher.clone(),
            shutdown_rx,
        ));

        ClientHandle {
            state_rx,
            dispatcher,
            shutdown_tx,
            task,
        }
    }
}

/// Dropping the handle stops the client.
pub struct ClientHandle {
    state_rx: watch::Receiver<ConnectionState>,
    dispatcher: EventDispatcher,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ClientHandle {
    pub fn state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    pub fn subscribe(&self, kind: Option<&str>) -> Subscription {
        self.dispatcher.subscribe(kind)
    }

    /// Resolves once the client is `Failed` or `Closed`.
    pub async fn wait_terminal(&self) -> ConnectionState {
        let mut rx = self.state_rx.clone();
        let state = match rx.wait_for(ConnectionState::is_terminal).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        };
        state
    }

    pub async fn close(self) -> ConnectionState {
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
        self.state_rx.borrow().clone()
    }
}

enum StreamEnd {
    Shutdown,
    Failed(String),
}

async fn run<T: EventTransport>(
    transport: T,
    policy: ReconnectPolicy,
    batch_window: Duration,
    state_tx: watch::Sender<ConnectionState>,
    dispatcher: EventDispatcher,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut failures: u32 = 0;

    loop {
        state_tx.send_replace(ConnectionState::Connecting);

        let connected = tokio::select! {
            _ = shutdown.changed() => break,
            result = transport.connect() => result,
        };

        let last_error = match connected {
            Ok(stream) => {
                failures = 0;
                state_tx.send_replace(ConnectionState::Open);
                log::info!("📡 Event stream open");

                match pump(stream, batch_window, &dispatcher, &mut shutdown).await {
                    StreamEnd::Shutdown => break,
                    StreamEnd::Failed(e) => e,
                }
            }
            Err(e) => e.to_string(),
        };

        failures += 1;
        if !policy.allows(failures) {
            log::error!(
                "❌ Event stream failed after {} retries: {}",
                policy.max_attempts,
                last_error
            );
            state_tx.send_replace(ConnectionState::Failed {
                attempts: policy.max_attempts,
                last_error,
            });
            return;
        }

        let delay = policy.delay_for(failures);
        log::warn!(
            "⚠️  Event stream error: {} (retry {}/{} in {:?})",
            last_error,
            failures,
            policy.max_attempts,
            delay
        );
        state_tx.send_replace(ConnectionState::Reconnecting {
            attempt: failures,
            delay,
        });

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    log::info!("🔌 Event stream closed");
    state_tx.send_replace(ConnectionState::Closed);
}

async fn pump(
    mut stream: ByteStream,
    batch_window: Duration,
    dispatcher: &EventDispatcher,
    shutdown: &mut watch::Receiver<bool>,
) -> StreamEnd {
    let mut parser = SseParser::new();
    let mut batcher = EventBatcher::new(batch_window);

    let flush = |batcher: &mut EventBatcher| {
        if let Some(batch) = batcher.take() {
            dispatcher.dispatch(batch);
        }
    };

    loop {
        let deadline = batcher.deadline();

        tokio::select! {
            _ = shutdown.changed() => {
                flush(&mut batcher);
                return StreamEnd::Shutdown;
            }
            _ = wait_until(deadline) => flush(&mut batcher),
            chunk = stream.next() => match chunk {
                Some(Ok(bytes)) => {
                    let now = Instant::now();
                    for event in parser.feed(&bytes) {
                        batcher.push(event, now);
                    }
                    if batcher.is_due(now) {
                        flush(&mut batcher);
                    }
                }
                Some(Err(e)) => {
                    flush(&mut batcher);
                    return StreamEnd::Failed(e.to_string());
                }
                None => {
                    flush(&mut batcher);
                    return StreamEnd::Failed(ClientError::StreamEnded.to_string());
                }
            },
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::ReceiverStream;

    type Chunk = Result<Bytes, ClientError>;

    /// Hands out scripted connection outcomes and records when each connect
    /// happened. Once the script runs out every connect fails with 503.
    #[derive(Clone, Default)]
    struct FakeTransport {
        script: Arc<Mutex<VecDeque<Result<ByteStream, ClientError>>>>,
        calls: Arc<Mutex<Vec<Instant>>>,
    }

    impl FakeTransport {
        fn push_failure(&self) {
            self.script
                .lock()
                .unwrap()
                .push_back(Err(ClientError::Status(503)));
        }

        fn push_stream(&self) -> mpsc::Sender<Chunk> {
            let (tx, rx) = mpsc::channel(16);
            self.script
                .lock()
                .unwrap()
                .push_back(Ok(Box::pin(ReceiverStream::new(rx))));
            tx
        }

        fn push_finished_stream(&self) {
            let stream = futures::stream::empty::<Chunk>();
            self.script.lock().unwrap().push_back(Ok(Box::pin(stream)));
        }

        fn gaps_in_secs(&self) -> Vec<u64> {
            let calls = self.calls.lock().unwrap();
            calls
                .windows(2)
                .map(|pair| (pair[1] - pair[0]).as_secs())
                .collect()
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl EventTransport for FakeTransport {
        async fn connect(&self) -> Result<ByteStream, ClientError> {
            self.calls.lock().unwrap().push(Instant::now());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(ClientError::Status(503)))
        }
    }

    fn frame(kind: &str) -> Chunk {
        Ok(Bytes::from(format!("data: {{\"type\":\"{}\"}}\n\n", kind)))
    }

    fn kinds(batch: &[ClientEvent]) -> Vec<&str> {
        batch.iter().map(|e| e.kind.as_str()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn retries_with_exponential_backoff_then_fails() {
        let transport = FakeTransport::default();
        let handle = ReconnectingClient::spawn(
            transport.clone(),
            ReconnectPolicy::default(),
            DEFAULT_BATCH_WINDOW,
        );

        let state = handle.wait_terminal().await;

        assert_eq!(transport.call_count(), 6);
        assert_eq!(transport.gaps_in_secs(), vec![1, 2, 4, 8, 16]);
        match state {
            ConnectionState::Failed { attempts, last_error } => {
                assert_eq!(attempts, 5);
                assert!(last_error.contains("503"));
            }
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn successful_open_resets_attempts() {
        let transport = FakeTransport::default();
        transport.push_failure();
        transport.push_finished_stream();

        let handle = ReconnectingClient::spawn(
            transport.clone(),
            ReconnectPolicy::default(),
            DEFAULT_BATCH_WINDOW,
        );
        let state = handle.wait_terminal().await;

        assert!(matches!(state, ConnectionState::Failed { attempts: 5, .. }));
        assert_eq!(transport.gaps_in_secs(), vec![1, 1, 2, 4, 8, 16]);
    }

    #[tokio::test(start_paused = true)]
    async fn events_within_window_share_a_batch() {
        let transport = FakeTransport::default();
        let tx = transport.push_stream();
        let handle = ReconnectingClient::spawn(
            transport.clone(),
            ReconnectPolicy::default(),
            DEFAULT_BATCH_WINDOW,
        );
        let mut all = handle.subscribe(None);

        tx.send(frame("a")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.send(frame("b")).await.unwrap();

        let first = all.recv().await.unwrap();
        assert_eq!(kinds(&first), vec!["a", "b"]);

        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(frame("c")).await.unwrap();
        let second = all.recv().await.unwrap();
        assert_eq!(kinds(&second), vec!["c"]);

        assert_eq!(handle.state(), ConnectionState::Open);
        assert_eq!(handle.close().await, ConnectionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn stream_end_flushes_pending_events() {
        let transport = FakeTransport::default();
        let tx = transport.push_stream();
        let handle = ReconnectingClient::spawn(
            transport.clone(),
            ReconnectPolicy::default(),
            Duration::from_secs(60),
        );
        let mut all = handle.subscribe(None);

        tx.send(frame("last")).await.unwrap();
        drop(tx);

        let batch = all.recv().await.unwrap();
        assert_eq!(kinds(&batch), vec!["last"]);
        handle.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn subscription_filters_by_kind() {
        let transport = FakeTransport::default();
        let tx = transport.push_stream();
        let handle = ReconnectingClient::spawn(
            transport.clone(),
            ReconnectPolicy::default(),
            DEFAULT_BATCH_WINDOW,
        );
        let mut linked = handle.subscribe(Some("minecraft_linked"));

        tx.send(frame("sse_connected")).await.unwrap();
        tx.send(frame("minecraft_linked")).await.unwrap();

        let batch = linked.recv().await.unwrap();
        assert_eq!(kinds(&batch), vec!["minecraft_linked"]);
        handle.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn close_during_backoff_is_clean() {
        let transport = FakeTransport::default();
        let handle = ReconnectingClient::spawn(
            transport.clone(),
            ReconnectPolicy::default(),
            DEFAULT_BATCH_WINDOW,
        );

        let mut states = handle.state_changes();
        states
            .wait_for(|s| matches!(s, ConnectionState::Reconnecting { attempt: 1, .. }))
            .await
            .unwrap();

        assert_eq!(handle.close().await, ConnectionState::Closed);
        assert_eq!(transport.call_count(), 1);
    }
}
