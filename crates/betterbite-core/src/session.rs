//! Auth session tracking and profile reconciliation

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::Utc;
use futures_util::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::profile::ProfileStore;
use crate::state::{normalize_scans, SessionEvent, UserState};
use crate::tier::UNLIMITED_SCANS;

/// Conditional writes attempted before a quota update is given up
const MAX_QUOTA_WRITES: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// An authenticated session with the hosted auth service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix timestamp (seconds) after which the access token is rejected
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: SessionUser,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .map(|at| at <= Utc::now().timestamp())
            .unwrap_or(false)
    }

    /// Load a persisted session; a missing file means no session
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)?;
        let session = serde_json::from_str(&content)
            .map_err(|e| anyhow!("Corrupt session file {:?}: {}", path, e))?;
        Ok(Some(session))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn clear(path: &Path) -> Result<()> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

/// Broadcasts auth state changes for the lifetime of the process
///
/// Subscribers receive the current state first, then every change. Dropping
/// the stream unsubscribes.
#[derive(Clone)]
pub struct AuthWatcher {
    tx: Arc<watch::Sender<Option<Session>>>,
}

impl AuthWatcher {
    pub fn new(initial: Option<Session>) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    pub fn set(&self, session: Option<Session>) {
        self.tx.send_replace(session);
    }

    pub fn subscribe(&self) -> impl Stream<Item = Option<Session>> + Send + 'static {
        let mut rx = self.tx.subscribe();
        rx.mark_changed();
        stream::unfold(rx, |mut rx| async move {
            rx.changed().await.ok()?;
            let session = rx.borrow_and_update().clone();
            Some((session, rx))
        })
    }
}

/// What the front-end should show after an auth change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    SignedIn,
    LoginRequired,
}

/// Keeps local [`UserState`] consistent with the remote profile store
#[derive(Clone)]
pub struct ProfileSync {
    store: Arc<dyn ProfileStore>,
}

impl ProfileSync {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self { store }
    }

    pub async fn on_auth_change(&self, session: Option<&Session>, user: &mut UserState) -> AuthOutcome {
        let Some(session) = session else {
            info!("no active session, resetting to free tier");
            user.apply(SessionEvent::SignedOut);
            return AuthOutcome::LoginRequired;
        };

        user.apply(SessionEvent::SignedIn);
        match self.store.fetch_profile(session).await {
            Ok(profile) => {
                info!(tier = profile.tier.as_str(), scans = profile.scans_remaining, "profile synced");
                user.apply(SessionEvent::ProfileLoaded(profile));
            }
            // Keep whatever we had; the next auth change retries
            Err(e) => warn!("Profile fetch failed: {}", e),
        }
        AuthOutcome::SignedIn
    }

    /// Persist one consumed scan with a compare-and-swap on the stored value
    ///
    /// `expected` is the quota before the scan. On conflict the fresh remote
    /// value is read and the decrement is applied to it instead. Returns the
    /// value the store now holds.
    pub async fn persist_decrement(&self, session: &Session, expected: i32) -> Result<i32> {
        // The write is conditioned on the raw stored value, which may be out of range
        let mut stored = expected;

        for attempt in 1..=MAX_QUOTA_WRITES {
            let current = normalize_scans(stored);
            if current == UNLIMITED_SCANS {
                return Ok(UNLIMITED_SCANS);
            }
            let new = (current - 1).max(0);
            if self.store.update_scans_remaining(session, stored, new).await? {
                return Ok(new);
            }

            let fresh = self.store.fetch_profile(session).await?;
            warn!(
                attempt,
                expected = stored,
                remote = fresh.scans_remaining,
                "scans_remaining changed remotely, retrying decrement"
            );
            stored = fresh.scans_remaining;
        }

        Err(anyhow!(
            "scans_remaining kept changing remotely after {} attempts",
            MAX_QUOTA_WRITES
        ))
    }
}
