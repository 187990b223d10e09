//! Cache of authenticated Matrix sessions keyed by normalized username.
//!
//! Reads go through a shared lock. A miss takes a per-user login lock, checks
//! the cache again and only then logs in, so concurrent requests for the same
//! user trigger a single login while logins for different users proceed in
//! parallel.

use crate::chat::ChatNetwork;
use crate::error::{BridgeError, BridgeResult};
use matrix_client::{MatrixError, MatrixSession};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex as AsyncMutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Default lifetime of a cached session.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(10 * 60);

/// Shortest allowed pause between cleanup passes.
pub const MIN_CLEANUP_INTERVAL: Duration = Duration::from_secs(1);

struct CachedSession {
    session: Arc<MatrixSession>,
    password_digest: String,
    expires_at: Instant,
}

impl CachedSession {
    fn is_valid(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Per-user session cache in front of the chat network login.
pub struct SessionManager {
    network: Arc<dyn ChatNetwork>,
    ttl: Duration,
    sessions: RwLock<HashMap<String, CachedSession>>,
    login_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl SessionManager {
    /// Create a session manager. A zero `ttl` falls back to the default.
    pub fn new(network: Arc<dyn ChatNetwork>, ttl: Duration) -> Self {
        let ttl = if ttl.is_zero() { DEFAULT_SESSION_TTL } else { ttl };

        Self {
            network,
            ttl,
            sessions: RwLock::new(HashMap::new()),
            login_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return a logged-in session for the credentials, logging in when the
    /// cached one is missing, expired or was created with another password.
    #[instrument(skip(self, password))]
    pub async fn ensure_session(
        &self,
        username: &str,
        password: &str,
    ) -> BridgeResult<Arc<MatrixSession>> {
        if username.trim().is_empty() || password.trim().is_empty() {
            return Err(BridgeError::InvalidCredentials);
        }

        let key = normalize_username(username);
        let digest = password_digest(password);

        if let Some(session) = self.cached(&key, &digest).await {
            return Ok(session);
        }

        let lock = self.login_lock(&key);
        let result = {
            let _guard = lock.lock().await;

            // Another request may have logged in while we waited.
            match self.cached(&key, &digest).await {
                Some(session) => {
                    debug!(key = %key, "Session created by concurrent request");
                    Ok(session)
                }
                None => self.login(&key, username.trim(), password, digest).await,
            }
        };
        self.release_login_lock(&key, lock);

        result
    }

    /// Drop any cached session for the username.
    pub async fn invalidate(&self, username: &str) {
        let key = normalize_username(username);
        if self.sessions.write().await.remove(&key).is_some() {
            info!(key = %key, "Session invalidated");
        }
    }

    /// Remove expired sessions, returning how many were dropped.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.is_valid(now));
        before - sessions.len()
    }

    /// Number of unexpired cached sessions.
    pub async fn session_count(&self) -> usize {
        let now = Instant::now();
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| s.is_valid(now))
            .count()
    }

    /// Spawn a task that periodically purges expired sessions.
    pub fn spawn_cleanup(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let interval = cleanup_interval(interval);
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let removed = manager.purge_expired().await;
                if removed > 0 {
                    debug!("Cleaned up {} expired sessions", removed);
                }
            }
        })
    }

    async fn cached(&self, key: &str, digest: &str) -> Option<Arc<MatrixSession>> {
        let sessions = self.sessions.read().await;
        sessions
            .get(key)
            .filter(|s| s.is_valid(Instant::now()) && s.password_digest == digest)
            .map(|s| Arc::clone(&s.session))
    }

    async fn login(
        &self,
        key: &str,
        username: &str,
        password: &str,
        digest: String,
    ) -> BridgeResult<Arc<MatrixSession>> {
        let session = self
            .network
            .login(username, password)
            .await
            .map_err(login_error)?;
        let session = Arc::new(session);

        self.sessions.write().await.insert(
            key.to_string(),
            CachedSession {
                session: Arc::clone(&session),
                password_digest: digest,
                expires_at: Instant::now() + self.ttl,
            },
        );

        info!(key = %key, user_id = %session.user_id, "Matrix session created");
        Ok(session)
    }

    fn login_lock(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self
            .login_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(locks.entry(key.to_string()).or_default())
    }

    fn release_login_lock(&self, key: &str, lock: Arc<AsyncMutex<()>>) {
        let mut locks = self
            .login_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Only the map and this caller hold it: nobody else is waiting.
        if let Some(existing) = locks.get(key) {
            if Arc::ptr_eq(existing, &lock) && Arc::strong_count(&lock) == 2 {
                locks.remove(key);
            }
        }
    }
}

/// Cache key for a username: trimmed and lower-cased.
pub fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}

fn password_digest(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

fn cleanup_interval(configured: Duration) -> Duration {
    configured.max(MIN_CLEANUP_INTERVAL)
}

/// Only 401/403 mean bad credentials; anything else is upstream.
fn login_error(e: MatrixError) -> BridgeError {
    if e.is_auth_rejection() {
        warn!(error = %e, "Matrix login rejected");
        BridgeError::AuthenticationFailed(e.to_string())
    } else {
        warn!(error = %e, "Matrix login failed");
        BridgeError::Upstream(format!("matrix login failed: {}", e))
    }
}
