//! Idle session pool
//!
//! Optional reuse of authenticated sessions between calls that share the same
//! host, port, username and credential. A pooled session is checked out by
//! exactly one call at a time; idle sessions past their lifetime are closed
//! instead of being reused.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use super::config::ConnectionRequest;
use super::session::RemoteSession;

/// Identity of a reusable session
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    host: String,
    port: u16,
    username: String,
    fingerprint: String,
}

impl PoolKey {
    pub fn for_request(request: &ConnectionRequest) -> Self {
        Self {
            host: request.host.clone(),
            port: request.port,
            username: request.username.clone(),
            fingerprint: request.credential.fingerprint(),
        }
    }
}

struct IdleSession {
    session: Box<dyn RemoteSession>,
    since: Instant,
}

/// Bounded pool of idle sessions
pub struct SessionPool {
    capacity: usize,
    idle_timeout: Duration,
    idle: Mutex<HashMap<PoolKey, Vec<IdleSession>>>,
}

impl SessionPool {
    /// `capacity` bounds idle sessions across all keys
    pub fn new(capacity: usize, idle_timeout: Duration) -> Self {
        Self {
            capacity,
            idle_timeout,
            idle: Mutex::new(HashMap::new()),
        }
    }

    /// Take a live idle session for `key`, closing any stale ones found on the way
    pub async fn checkout(&self, key: &PoolKey) -> Option<Box<dyn RemoteSession>> {
        let mut stale = Vec::new();
        let found = {
            let mut idle = self.idle.lock().await;
            let mut found = None;
            if let Some(entries) = idle.get_mut(key) {
                while let Some(entry) = entries.pop() {
                    if self.is_stale(&entry) {
                        stale.push(entry.session);
                    } else {
                        found = Some(entry.session);
                        break;
                    }
                }
                if entries.is_empty() {
                    idle.remove(key);
                }
            }
            found
        };

        Self::close_all(stale).await;
        if found.is_some() {
            debug!("Reusing pooled session for {}@{}", key.username, key.host);
        }
        found
    }

    /// Return a session after a successful call
    ///
    /// Closed sessions, and sessions beyond capacity, are disconnected.
    pub async fn checkin(&self, key: PoolKey, session: Box<dyn RemoteSession>) {
        if session.is_closed() {
            session.close().await;
            return;
        }

        let (rejected, stale) = {
            let mut idle = self.idle.lock().await;
            let stale = self.evict_stale(&mut idle);
            let total: usize = idle.values().map(Vec::len).sum();
            if total >= self.capacity {
                (Some(session), stale)
            } else {
                idle.entry(key).or_default().push(IdleSession {
                    session,
                    since: Instant::now(),
                });
                (None, stale)
            }
        };

        Self::close_all(stale).await;
        if let Some(session) = rejected {
            debug!("Session pool full, closing session");
            session.close().await;
        }
    }

    /// Close every idle session
    pub async fn drain(&self) {
        let sessions: Vec<_> = {
            let mut idle = self.idle.lock().await;
            idle.drain()
                .flat_map(|(_, entries)| entries.into_iter().map(|entry| entry.session))
                .collect()
        };
        debug!("Draining {} pooled sessions", sessions.len());
        Self::close_all(sessions).await;
    }

    /// Number of idle sessions currently held
    pub async fn idle_count(&self) -> usize {
        self.idle.lock().await.values().map(Vec::len).sum()
    }

    fn is_stale(&self, entry: &IdleSession) -> bool {
        entry.since.elapsed() >= self.idle_timeout || entry.session.is_closed()
    }

    fn evict_stale(
        &self,
        idle: &mut HashMap<PoolKey, Vec<IdleSession>>,
    ) -> Vec<Box<dyn RemoteSession>> {
        let mut stale = Vec::new();
        for entries in idle.values_mut() {
            let (keep, evict): (Vec<_>, Vec<_>) =
                entries.drain(..).partition(|entry| !self.is_stale(entry));
            *entries = keep;
            stale.extend(evict.into_iter().map(|entry| entry.session));
        }
        idle.retain(|_, entries| !entries.is_empty());
        stale
    }

    async fn close_all(sessions: Vec<Box<dyn RemoteSession>>) {
        for session in sessions {
            session.close().await;
        }
    }
}

impl std::fmt::Debug for SessionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionPool")
            .field("capacity", &self.capacity)
            .field("idle_timeout", &self.idle_timeout)
            .finish()
    }
}
