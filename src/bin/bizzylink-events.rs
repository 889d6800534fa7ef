//! Follows a user's BizzyLink event stream from the terminal, reconnecting
//! with backoff, and prints each batch of events as it arrives.

use std::time::Duration;

use clap::Parser;

use bizzylink::realtime::client::{
    ConnectionState, HttpTransport, ReconnectPolicy, ReconnectingClient, DEFAULT_BATCH_WINDOW,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Server base URL
    #[arg(long, env = "BIZZYLINK_URL", default_value = "http://localhost:8080")]
    url: String,

    /// JWT of the user whose events to follow
    #[arg(long, env = "BIZZYLINK_TOKEN")]
    token: String,

    /// Only print events of this type
    #[arg(long)]
    kind: Option<String>,

    /// Reconnect attempts before giving up
    #[arg(long, default_value_t = 5)]
    max_attempts: u32,

    /// Batching window in milliseconds
    #[arg(long)]
    batch_ms: Option<u64>,
}

#[tokio::main]
async fn main() {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    let args = Args::parse();

    let transport = match HttpTransport::new(&args.url, &args.token) {
        Ok(transport) => transport,
        Err(e) => {
            log::error!("❌ Could not build HTTP client: {}", e);
            std::process::exit(2);
        }
    };
    log::info!("📡 Following {}", args.url);

    let policy = ReconnectPolicy {
        max_attempts: args.max_attempts,
        ..ReconnectPolicy::default()
    };
    let window = args
        .batch_ms
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_BATCH_WINDOW);

    let client = ReconnectingClient::spawn(transport, policy, window);
    let mut batches = client.subscribe(args.kind.as_deref());
    let mut states = client.state_changes();

    loop {
        tokio::select! {
            batch = batches.recv() => {
                let Some(batch) = batch else { break };
                for event in batch {
                    println!("[{}] {}", event.kind, event.data);
                }
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = states.borrow_and_update().clone();
                match &state {
                    ConnectionState::Open => log::info!("✅ Connected"),
                    ConnectionState::Reconnecting { attempt, delay } => {
                        log::warn!("🔁 Reconnecting (attempt {}) in {:?}", attempt, delay)
                    }
                    _ => {}
                }
                if state.is_terminal() {
                    break;
                }
            }
        }
    }

    match client.close().await {
        ConnectionState::Failed { attempts, last_error } => {
            log::error!("❌ Gave up after {} attempts: {}", attempts, last_error);
            std::process::exit(1);
        }
        state => log::info!("👋 Stopped ({:?})", state),
    }
}
