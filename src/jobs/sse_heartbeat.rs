// ==================== SSE HEARTBEAT ====================
// Keeps idle event streams alive through proxies and prunes dead clients.

use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};

use crate::realtime::EventHub;

/// Sends a heartbeat frame to every open stream each `period`.
pub fn start_sse_heartbeat(hub: EventHub, period: Duration) {
    log::info!("💓 Starting SSE heartbeat (every {}s)", period.as_secs());

    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let alive = hub.heartbeat();
            log::debug!("💓 Heartbeat sent to {} SSE client(s)", alive);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test(start_paused = true)]
    async fn heartbeat_reaches_open_streams() {
        let hub = EventHub::new();
        let mut stream = hub.subscribe("user-1");
        stream.next().await;

        start_sse_heartbeat(hub.clone(), Duration::from_secs(30));
        tokio::time::sleep(Duration::from_secs(31)).await;

        let frame = stream.next().await.unwrap().unwrap();
        assert!(String::from_utf8_lossy(&frame).contains("heartbeat"));
    }
}
