//! Shared page-fetching session.
//!
//! All page fetches share one client (and its cookie jar). The session is
//! periodically rebuilt; a rebuild waits until every in-flight fetch has
//! released the session, and fetches started during a rebuild wait for it to
//! finish.

use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use reqwest::Client;
use tokio::sync::{OwnedRwLockReadGuard, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::http::{DEFAULT_TIMEOUT, client_builder};

/// Default interval between session rebuilds.
pub const DEFAULT_RESTART_INTERVAL: Duration = Duration::from_secs(30 * 60);

pub struct PageSession {
    client: Arc<RwLock<Client>>,
    in_use: Arc<AtomicUsize>,
    restarts: AtomicUsize,
}

/// Lease on the session. Holding it keeps the session from being rebuilt.
pub struct SessionGuard {
    client: OwnedRwLockReadGuard<Client>,
    in_use: Arc<AtomicUsize>,
}

impl Deref for SessionGuard {
    type Target = Client;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.in_use.fetch_sub(1, Ordering::AcqRel);
    }
}

fn build_session_client() -> Result<Client> {
    Ok(client_builder(DEFAULT_TIMEOUT).cookie_store(true).build()?)
}

impl PageSession {
    pub fn new() -> Result<Self> {
        Ok(Self::with_client(build_session_client()?))
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client: Arc::new(RwLock::new(client)),
            in_use: Arc::new(AtomicUsize::new(0)),
            restarts: AtomicUsize::new(0),
        }
    }

    /// Leases the session, waiting for a running rebuild to finish.
    pub async fn acquire(&self) -> SessionGuard {
        let client = self.client.clone().read_owned().await;
        self.in_use.fetch_add(1, Ordering::AcqRel);
        SessionGuard {
            client,
            in_use: self.in_use.clone(),
        }
    }

    /// Number of leases currently held.
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }

    /// Number of completed rebuilds.
    pub fn restart_count(&self) -> usize {
        self.restarts.load(Ordering::Acquire)
    }

    /// Rebuilds the session once all leases are released.
    pub async fn restart(&self) -> Result<()> {
        let fresh = build_session_client()?;
        self.replace_client(fresh).await;
        Ok(())
    }

    async fn replace_client(&self, fresh: Client) {
        let mut client = self.client.write().await;
        debug!("Page session idle, rebuilding");
        *client = fresh;
        self.restarts.fetch_add(1, Ordering::AcqRel);
    }

    /// Fetches `url` as text using the shared session.
    pub async fn fetch_text(&self, url: &str) -> Result<String> {
        let client = self.acquire().await;
        let response = client.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }

    /// Rebuilds the session every `interval` until `cancel_token` fires.
    pub fn spawn_housekeeping(
        self: &Arc<Self>,
        interval: Duration,
        cancel_token: CancellationToken,
    ) -> JoinHandle<()> {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        debug!("Page session housekeeping shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        match session.restart().await {
                            Ok(()) => info!("Page session restarted"),
                            Err(e) => warn!("Failed to restart page session: {}", e),
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> PageSession {
        crate::http::install_rustls_provider();
        PageSession::with_client(Client::new())
    }

    #[tokio::test]
    async fn test_guard_tracks_in_use() {
        let session = session();
        let a = session.acquire().await;
        let b = session.acquire().await;
        assert_eq!(session.in_use(), 2);
        drop(a);
        assert_eq!(session.in_use(), 1);
        drop(b);
        assert_eq!(session.in_use(), 0);
    }

    #[tokio::test]
    async fn test_restart_waits_for_leases() {
        let session = Arc::new(session());
        let guard = session.acquire().await;

        let restarting = {
            let session = session.clone();
            tokio::spawn(async move { session.replace_client(Client::new()).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(session.restart_count(), 0);
        assert!(!restarting.is_finished());

        drop(guard);
        restarting.await.unwrap();
        assert_eq!(session.restart_count(), 1);
    }

    #[tokio::test]
    async fn test_acquire_waits_for_restart() {
        let session = Arc::new(session());
        let guard = session.acquire().await;

        let restarting = {
            let session = session.clone();
            tokio::spawn(async move { session.replace_client(Client::new()).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Queued behind the pending rebuild.
        let waiter = {
            let session = session.clone();
            tokio::spawn(async move {
                let _lease = session.acquire().await;
                session.restart_count()
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        restarting.await.unwrap();
        assert_eq!(waiter.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_housekeeping_stops_on_cancel() {
        let session = Arc::new(session());
        let token = CancellationToken::new();
        let handle = session.spawn_housekeeping(Duration::from_secs(3600), token.clone());
        token.cancel();
        handle.await.unwrap();
        assert_eq!(session.restart_count(), 0);
    }
}
