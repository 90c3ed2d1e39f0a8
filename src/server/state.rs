use crate::location::{FetchCoordinator, GeographySource, ResolverSession, ResultCache};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

pub type SharedSession<S> = Arc<AsyncMutex<ResolverSession<S>>>;

/// Sessions untouched for this long are dropped.
pub const DEFAULT_SESSION_IDLE_SECS: u64 = 30 * 60;

struct SessionSlot<S> {
    session: SharedSession<S>,
    last_seen: DateTime<Utc>,
}

/// Server state: one geography source and one cache shared by every
/// session, plus the open sessions by id.
pub struct AppState<S> {
    pub source: Arc<S>,
    pub coordinator: Arc<FetchCoordinator>,
    sessions: Mutex<HashMap<u64, SessionSlot<S>>>,
    next_id: AtomicU64,
    idle_timeout: Duration,
}

impl<S: GeographySource + 'static> AppState<S> {
    pub fn new(source: S) -> Self {
        Self {
            source: Arc::new(source),
            coordinator: Arc::new(FetchCoordinator::new(Arc::new(ResultCache::new()))),
            sessions: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            idle_timeout: Duration::seconds(DEFAULT_SESSION_IDLE_SECS as i64),
        }
    }

    pub fn with_idle_timeout(mut self, secs: u64) -> Self {
        self.idle_timeout = Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX).min(i64::MAX / 1000));
        self
    }

    pub fn insert(&self, session: ResolverSession<S>) -> u64 {
        self.evict_idle();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let slot = SessionSlot {
            session: Arc::new(AsyncMutex::new(session)),
            last_seen: Utc::now(),
        };
        self.sessions.lock().insert(id, slot);
        id
    }

    /// Look up a session and mark it as used.
    pub fn get(&self, id: u64) -> Option<SharedSession<S>> {
        let mut sessions = self.sessions.lock();
        let slot = sessions.get_mut(&id)?;
        slot.last_seen = Utc::now();
        Some(Arc::clone(&slot.session))
    }

    pub fn remove(&self, id: u64) -> Option<SharedSession<S>> {
        self.sessions.lock().remove(&id).map(|slot| slot.session)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn evict_idle(&self) -> usize {
        self.evict_idle_at(Utc::now())
    }

    /// Drop sessions last used at or before `now - idle_timeout`.
    pub fn evict_idle_at(&self, now: DateTime<Utc>) -> usize {
        let Some(cutoff) = now.checked_sub_signed(self.idle_timeout) else {
            return 0;
        };
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|_, slot| slot.last_seen > cutoff);
        let evicted = before - sessions.len();
        if evicted > 0 {
            debug!(evicted, remaining = sessions.len(), "evicted idle sessions");
        }
        evicted
    }
}
