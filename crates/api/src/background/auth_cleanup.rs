//! Periodic purge of dead sign-in state.
//!
//! Expired or revoked sessions and long-expired OTP codes are never read
//! again, so they are deleted on a fixed interval.

use std::time::Duration;

use agora_db::repositories::{OtpRepo, SessionRepo};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

const CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

/// Run until `cancel` is triggered. The first sweep happens immediately.
pub async fn run(pool: PgPool, cancel: CancellationToken) {
    tracing::info!(
        interval_secs = CLEANUP_INTERVAL.as_secs(),
        "Auth cleanup job started"
    );
    let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Auth cleanup job stopping");
                break;
            }
            _ = interval.tick() => sweep(&pool).await,
        }
    }
}

async fn sweep(pool: &PgPool) {
    match SessionRepo::cleanup_expired(pool).await {
        Ok(0) => {}
        Ok(deleted) => tracing::info!(deleted, "Purged dead sessions"),
        Err(e) => tracing::error!(error = %e, "Session cleanup failed"),
    }
    match OtpRepo::cleanup_expired(pool).await {
        Ok(0) => {}
        Ok(deleted) => tracing::info!(deleted, "Purged expired OTP codes"),
        Err(e) => tracing::error!(error = %e, "OTP cleanup failed"),
    }
}
