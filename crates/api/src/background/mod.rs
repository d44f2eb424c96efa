//! Long-running background tasks.
//!
//! Each task is spawned from `main` with `tokio::spawn` and stops when its
//! [`CancellationToken`](tokio_util::sync::CancellationToken) is cancelled.

pub mod auth_cleanup;
