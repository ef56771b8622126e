//! Bearer token with an explicit expiry, owned by the reading session.

use crate::logging;
use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

/// A token plus the moment it stops being valid. When built with
/// [`AuthSession::with_expiry_timer`] the token is also cleared by a timer that
/// is cancelled when the session is dropped.
pub struct AuthSession {
    token: Arc<Mutex<Option<String>>>,
    expires_at: DateTime<Utc>,
    timer: Option<ExpiryTimer>,
}

impl AuthSession {
    pub fn new(token: impl Into<String>, lifetime: Duration) -> Self {
        Self::issued_at(token, Utc::now(), lifetime)
    }

    pub fn issued_at(token: impl Into<String>, issued: DateTime<Utc>, lifetime: Duration) -> Self {
        let expires_at = issued.checked_add_signed(lifetime).unwrap_or_else(|| {
            logging::warn(format!("Token lifetime {lifetime} is out of range"));
            DateTime::<Utc>::MAX_UTC
        });
        Self {
            token: Arc::new(Mutex::new(Some(token.into()))),
            expires_at,
            timer: None,
        }
    }

    pub fn with_expiry_timer(mut self) -> Self {
        let remaining = (self.expires_at - Utc::now())
            .to_std()
            .unwrap_or_default();
        let token = Arc::clone(&self.token);
        self.timer = Some(ExpiryTimer::schedule(remaining, move || {
            if let Ok(mut slot) = token.lock() {
                *slot = None;
            }
            logging::warn("Token has expired! Please login again.");
        }));
        self
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// The token if it is still present and unexpired at `now`.
    pub fn bearer_at(&self, now: DateTime<Utc>) -> Option<String> {
        if self.is_expired_at(now) {
            return None;
        }
        self.token.lock().ok().and_then(|slot| slot.clone())
    }

    pub fn bearer(&self) -> Option<String> {
        self.bearer_at(Utc::now())
    }

    pub fn clear(&mut self) {
        if let Ok(mut slot) = self.token.lock() {
            *slot = None;
        }
        if let Some(mut timer) = self.timer.take() {
            timer.cancel();
        }
    }
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("expires_at", &self.expires_at)
            .field("timer", &self.timer.is_some())
            .finish_non_exhaustive()
    }
}

/// Token lifetime from a configured number of seconds, saturating at the
/// largest representable duration.
pub fn lifetime_from_secs(secs: u64) -> Duration {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

/// A one-shot timeout that can be cancelled before it fires. Dropping the
/// timer cancels it and waits for the worker thread.
pub struct ExpiryTimer {
    state: Arc<(Mutex<bool>, Condvar)>,
    handle: Option<JoinHandle<()>>,
}

impl ExpiryTimer {
    pub fn schedule<F>(after: std::time::Duration, on_expire: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let state = Arc::new((Mutex::new(false), Condvar::new()));
        let thread_state = Arc::clone(&state);
        let handle = thread::spawn(move || {
            let (lock, cvar) = &*thread_state;
            let Ok(guard) = lock.lock() else {
                return;
            };
            let Ok((cancelled, _)) = cvar.wait_timeout_while(guard, after, |cancelled| !*cancelled)
            else {
                return;
            };
            let fire = !*cancelled;
            drop(cancelled);
            if fire {
                on_expire();
            }
        });
        Self {
            state,
            handle: Some(handle),
        }
    }

    pub fn cancel(&mut self) {
        let (lock, cvar) = &*self.state;
        if let Ok(mut cancelled) = lock.lock() {
            *cancelled = true;
        }
        cvar.notify_all();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ExpiryTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
