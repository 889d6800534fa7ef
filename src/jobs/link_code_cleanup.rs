// ==================== LINK CODE CLEANUP ====================
// Clears unused link codes once they expire.

use tokio::time::{interval, Duration};

use crate::{database::MongoDB, services::link_service};

pub const CLEANUP_PERIOD: Duration = Duration::from_secs(5 * 60);

pub fn start_link_code_cleanup(db: MongoDB) {
    log::info!("🧹 Starting link code cleanup (every {} minutes)", CLEANUP_PERIOD.as_secs() / 60);

    tokio::spawn(async move {
        let mut ticker = interval(CLEANUP_PERIOD);

        loop {
            ticker.tick().await;

            match link_service::purge_expired_codes(&db).await {
                Ok(0) => log::debug!("🧹 No expired link codes"),
                Ok(count) => log::info!("🧹 Cleared {} expired link code(s)", count),
                Err(e) => log::error!("❌ Link code cleanup failed: {}", e),
            }
        }
    });
}
