//! Session context: the device clock and whether a conference session is
//! currently running.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use crate::models::ConferenceSession;

/// Live inputs the validator needs besides the entry itself.
pub trait SessionContext: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn session_active(&self) -> bool;
}

/// Derives "active" from the cached session schedule.
///
/// The schedule is refreshed by the consumer service whenever it reads the
/// `sessions` table. A manual override takes precedence when set.
#[derive(Debug, Default)]
pub struct LiveSessionContext {
    schedule: RwLock<Vec<(DateTime<Utc>, DateTime<Utc>)>>,
    active_override: RwLock<Option<bool>>,
}

impl LiveSessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update_schedule(&self, sessions: &[ConferenceSession]) {
        let windows = sessions.iter().map(|s| (s.start_time, s.end_time)).collect();
        *self.schedule.write().unwrap_or_else(|p| p.into_inner()) = windows;
    }

    pub fn set_override(&self, active: Option<bool>) {
        *self.active_override.write().unwrap_or_else(|p| p.into_inner()) = active;
    }

    fn active_at(&self, now: DateTime<Utc>) -> bool {
        if let Some(forced) = *self.active_override.read().unwrap_or_else(|p| p.into_inner()) {
            return forced;
        }
        self.schedule
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .any(|(start, end)| *start <= now && now < *end)
    }
}

impl SessionContext for LiveSessionContext {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn session_active(&self) -> bool {
        self.active_at(Utc::now())
    }
}

/// Manually driven clock and session flag, for tests and tooling.
#[derive(Debug)]
pub struct ManualSessionContext {
    now: RwLock<DateTime<Utc>>,
    active: AtomicBool,
}

impl ManualSessionContext {
    pub fn new(now: DateTime<Utc>, active: bool) -> Self {
        Self {
            now: RwLock::new(now),
            active: AtomicBool::new(active),
        }
    }

    pub fn set_now(&self, now: DateTime<Utc>) {
        *self.now.write().unwrap_or_else(|p| p.into_inner()) = now;
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }
}

impl SessionContext for ManualSessionContext {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().unwrap_or_else(|p| p.into_inner())
    }

    fn session_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}
