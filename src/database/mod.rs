use std::time::Duration;

use mongodb::bson::{doc, Document};
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, Database, IndexModel};

pub const USERS: &str = "users";
pub const NOTIFICATIONS: &str = "notifications";
pub const FRIEND_REQUESTS: &str = "friend_requests";
pub const FORUM_CATEGORIES: &str = "forum_categories";
pub const FORUM_THREADS: &str = "forum_threads";
pub const FORUM_POSTS: &str = "forum_posts";
pub const SECURITY_LOGS: &str = "security_logs";

const DEFAULT_DB_NAME: &str = "bizzylink";
const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct MongoDB {
    db: Database,
}

impl MongoDB {
    pub async fn new(uri: &str) -> Result<Self, mongodb::error::Error> {
        let mut client_options = mongodb::options::ClientOptions::parse(uri).await?;

        client_options.app_name = Some("bizzylink".to_string());
        client_options.max_pool_size = Some(20);
        client_options.min_pool_size = Some(2);
        client_options.max_idle_time = Some(Duration::from_secs(300));
        client_options.connect_timeout = Some(Duration::from_secs(5));
        client_options.server_selection_timeout = Some(Duration::from_secs(5));

        let db_name = client_options
            .default_database
            .clone()
            .unwrap_or_else(|| DEFAULT_DB_NAME.to_string());

        let client = Client::with_options(client_options)?;
        let db = client.database(&db_name);

        let mongodb = Self { db };
        mongodb.ping().await?;
        mongodb.ensure_indexes().await;

        Ok(mongodb)
    }

    /// Connects, retrying every 5 seconds up to `attempts` times.
    pub async fn connect_with_retry(
        uri: &str,
        attempts: u32,
    ) -> Result<Self, mongodb::error::Error> {
        let attempts = attempts.max(1);
        let mut attempt = 1;
        loop {
            match Self::new(uri).await {
                Ok(db) => return Ok(db),
                Err(e) if attempt < attempts => {
                    log::warn!(
                        "⚠️  MongoDB connection attempt {}/{} failed: {} (retrying in {}s)",
                        attempt,
                        attempts,
                        e,
                        CONNECT_RETRY_DELAY.as_secs()
                    );
                    tokio::time::sleep(CONNECT_RETRY_DELAY).await;
                    attempt += 1;
                }
                Err(e) => {
                    log::error!("❌ MongoDB unreachable after {} attempts", attempts);
                    return Err(e);
                }
            }
        }
    }

    pub async fn ping(&self) -> Result<(), mongodb::error::Error> {
        self.db.run_command(doc! { "ping": 1 }).await.map(|_| ())
    }

    /// Index creation failures are logged and skipped: an existing index with
    /// different options must not keep the server from starting.
    async fn ensure_indexes(&self) {
        log::info!("🔧 Creating database indexes...");

        let unique = || IndexOptions::builder().unique(true).build();
        let unique_sparse = || IndexOptions::builder().unique(true).sparse(true).build();

        self.create_index(USERS, doc! { "username": 1 }, Some(unique())).await;
        self.create_index(USERS, doc! { "email": 1 }, Some(unique())).await;
        self.create_index(USERS, doc! { "minecraft.mcUUID": 1 }, Some(unique_sparse()))
            .await;
        self.create_index(USERS, doc! { "minecraft.linkCode": 1 }, Some(unique_sparse()))
            .await;
        self.create_index(NOTIFICATIONS, doc! { "recipient": 1, "createdAt": -1 }, None)
            .await;
        self.create_index(FRIEND_REQUESTS, doc! { "recipient": 1, "status": 1 }, None)
            .await;
        self.create_index(FORUM_CATEGORIES, doc! { "slug": 1 }, Some(unique())).await;
        self.create_index(FORUM_THREADS, doc! { "slug": 1 }, Some(unique())).await;
        self.create_index(
            FORUM_THREADS,
            doc! { "category": 1, "isPinned": -1, "lastActivity": -1 },
            None,
        )
        .await;
        self.create_index(FORUM_POSTS, doc! { "thread": 1, "createdAt": 1 }, None)
            .await;
        self.create_index(SECURITY_LOGS, doc! { "user": 1, "createdAt": -1 }, None)
            .await;

        log::info!("✅ Database indexes ready");
    }

    async fn create_index(&self, collection: &str, keys: Document, options: Option<IndexOptions>) {
        let label = format!("{}({:?})", collection, keys.keys().collect::<Vec<_>>());
        let model = IndexModel::builder().keys(keys).options(options).build();

        match self
            .collection::<Document>(collection)
            .create_index(model)
            .await
        {
            Ok(_) => log::info!("   ✅ Index ready: {}", label),
            Err(e) => log::warn!("   ⚠️  Index skipped: {} - {}", label, e),
        }
    }

    pub fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.db.collection(name)
    }
}
