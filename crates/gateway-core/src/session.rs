//! Session creation, LRU eviction, the two-phase locking discipline, rate
//! limiting, and idle-session reaping.

use crate::composer;
use crate::domain::{GenParams, Message, Turn};
use crate::trimmer;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub type SessionKey = (String, String);

/// Mutable per-session state, guarded by `Session::inner`. Never locked
/// across network I/O — the central correctness property this registry
/// exists to uphold.
pub struct SessionInner {
    pub dialog: Vec<Turn>,
    pub created_at: Instant,
    pub request_count_in_window: u32,
    pub window_start_at: Instant,
}

/// A session record plus its dedicated lock.
///
/// `last_used_ms` is tracked outside `inner` with a plain atomic so the
/// registry can scan for the least-recently-used session (eviction)
/// and idle sessions (the reaper) without acquiring every session's lock.
pub struct Session {
    pub key: SessionKey,
    last_used_ms: AtomicU64,
    inner: Mutex<SessionInner>,
}

impl Session {
    fn new(key: SessionKey, now: Instant, epoch: Instant) -> Self {
        Self {
            key,
            last_used_ms: AtomicU64::new(ms_since(epoch, now)),
            inner: Mutex::new(SessionInner {
                dialog: Vec::new(),
                created_at: now,
                request_count_in_window: 0,
                window_start_at: now,
            }),
        }
    }

    /// Acquires the session lock for a critical section (Phase 1 or Phase 2).
    /// Callers must not perform I/O while holding the guard.
    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, SessionInner> {
        self.inner.lock().await
    }

    fn touch(&self, epoch: Instant, now: Instant) {
        self.last_used_ms.store(ms_since(epoch, now), Ordering::Relaxed);
    }
}

fn ms_since(epoch: Instant, now: Instant) -> u64 {
    now.saturating_duration_since(epoch).as_millis() as u64
}

/// Outcome of a Phase-1 critical section.
pub enum Phase1Outcome {
    /// Rate limit exceeded; no prompt was composed, nothing was appended.
    RateLimited,
    /// Prompt composed and user turn appended; ready for inference.
    Ready { messages: Vec<Message>, params: GenParams },
}

/// The session registry: maps `(project, session_id) -> Session`.
pub struct SessionRegistry {
    epoch: Instant,
    max_concurrent_sessions: usize,
    sessions: Mutex<HashMap<SessionKey, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new(max_concurrent_sessions: usize) -> Self {
        Self {
            epoch: Instant::now(),
            max_concurrent_sessions,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Looks up or creates the session for `(project, session_id)`. If the
    /// registry is at capacity, evicts the least-recently-used record first.
    pub async fn get_or_create(&self, project: &str, session_id: &str) -> Arc<Session> {
        let key = (project.to_string(), session_id.to_string());
        let mut sessions = self.sessions.lock().await;

        if let Some(existing) = sessions.get(&key) {
            return existing.clone();
        }

        if sessions.len() >= self.max_concurrent_sessions {
            if let Some(lru_key) = sessions
                .iter()
                .min_by_key(|(_, s)| s.last_used_ms.load(Ordering::Relaxed))
                .map(|(k, _)| k.clone())
            {
                sessions.remove(&lru_key);
            }
        }

        let now = Instant::now();
        let session = Arc::new(Session::new(key.clone(), now, self.epoch));
        sessions.insert(key, session.clone());
        session
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Phase 1: under the session lock, enforce the per-session rate limit,
    /// append the user turn, and compose the outbound message list.
    /// Performs no I/O.
    pub async fn phase1(
        &self,
        session: &Session,
        system_prompt: &str,
        user_message: &str,
        params: GenParams,
        max_requests_per_window: u32,
        window_duration: Duration,
    ) -> Phase1Outcome {
        let mut inner = session.lock().await;
        let now = Instant::now();

        if now.saturating_duration_since(inner.window_start_at) > window_duration {
            inner.request_count_in_window = 0;
            inner.window_start_at = now;
        }
        inner.request_count_in_window += 1;
        if inner.request_count_in_window > max_requests_per_window {
            return Phase1Outcome::RateLimited;
        }

        let messages = composer::compose(system_prompt, &inner.dialog, user_message);
        inner.dialog.push(Turn::user(user_message));

        Phase1Outcome::Ready { messages, params }
    }

    /// Phase 2: under the session lock, append the assistant turn, trim the
    /// dialog to the token budget, and stamp `last_used_at`. Performs no I/O.
    pub async fn phase2(&self, session: &Session, assistant_text: &str, max_history_tokens: usize) {
        {
            let mut inner = session.lock().await;
            inner.dialog.push(Turn::assistant(assistant_text));
            inner.dialog = trimmer::trim(&inner.dialog, max_history_tokens);
        }
        session.touch(self.epoch, Instant::now());
    }

    /// Background reaper task body: removes sessions idle for longer than
    /// `session_timeout`. A session whose lock is currently held is skipped
    /// and retried on the next tick.
    pub async fn reap_idle(&self, session_timeout: Duration) -> usize {
        let mut sessions = self.sessions.lock().await;
        let now = Instant::now();
        let timeout_ms = session_timeout.as_millis() as u64;

        let mut to_remove = Vec::new();
        for (key, session) in sessions.iter() {
            let idle_ms = ms_since(self.epoch, now).saturating_sub(session.last_used_ms.load(Ordering::Relaxed));
            if idle_ms > timeout_ms && session.inner.try_lock().is_ok() {
                to_remove.push(key.clone());
            }
        }

        let removed = to_remove.len();
        for key in to_remove {
            sessions.remove(&key);
        }
        removed
    }
}
