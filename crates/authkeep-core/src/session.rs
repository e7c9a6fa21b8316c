//! Basic-Auth session lifecycle.
//!
//! The `SessionManager` owns the credential fields in the store and decides
//! whether the session is still live. A session is live while less than
//! `session_minutes` have passed since the last recorded activity; once it
//! lapses the manager logs out, either when asked (`confirm_current`,
//! `username`) or from its background check.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::clock::{minutes_between, Clock, SystemClock};
use crate::config::SessionConfig;
use crate::error::StoreError;
use crate::events::{EventBus, SessionEvent};
use crate::store::{KeyValueStore, SessionStore};

/// `Authorization` header value for the given credentials
pub fn basic_auth_header(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", username, password)))
}

pub struct SessionManager {
    store: SessionStore,
    clock: Arc<dyn Clock>,
    events: Arc<EventBus>,
    session_minutes: f64,
    check_interval: Duration,
    headers: RwLock<HashMap<String, String>>,
    /// Serializes multi-key store updates
    state: Mutex<()>,
    liveness: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    /// Build a manager without starting the background check.
    /// Most hosts want [`SessionManager::start`].
    pub fn new(config: &SessionConfig, store: Arc<dyn KeyValueStore>) -> Self {
        debug!("Session manager constructed");
        Self {
            store: SessionStore::new(store),
            clock: Arc::new(SystemClock),
            events: Arc::new(EventBus::new()),
            session_minutes: config.session_minutes,
            check_interval: Duration::from_secs(config.check_interval_secs.max(1)),
            headers: RwLock::new(config.headers.clone()),
            state: Mutex::new(()),
            liveness: Mutex::new(None),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    /// Share the manager, drop a stale session right away and start the
    /// periodic liveness check. Must be called inside a tokio runtime.
    pub fn start(self) -> Arc<Self> {
        let manager = Arc::new(self);
        if let Err(e) = manager.confirm_current() {
            warn!(error = %e, "Initial session check failed");
        }
        manager.start_liveness_check();
        manager
    }

    /// (Re)start the periodic liveness check. The task holds only a weak
    /// reference and ends once the manager is dropped or shut down.
    pub fn start_liveness_check(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let period = self.check_interval;

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(manager) = weak.upgrade() else {
                    break;
                };
                if let Err(e) = manager.confirm_current() {
                    warn!(error = %e, "Periodic session check failed");
                }
            }
        });

        if let Some(previous) = self.liveness.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Stop the periodic liveness check
    pub fn shutdown(&self) {
        if let Some(handle) = self.liveness.lock().take() {
            handle.abort();
            debug!("Session liveness check stopped");
        }
    }

    pub fn is_liveness_check_running(&self) -> bool {
        self.liveness
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn session_minutes(&self) -> f64 {
        self.session_minutes
    }

    /// Store the credentials as a Basic-Auth header and stamp activity.
    /// The password itself is never stored.
    pub fn set_credentials(&self, username: &str, password: &str) -> Result<(), StoreError> {
        debug!(username = %username, "Setting credentials");
        let header = basic_auth_header(username, password);
        let _guard = self.state.lock();
        self.store.write_credentials(username, &header, self.clock.now())
    }

    /// Extend the session without re-authenticating
    pub fn record_activity(&self) -> Result<(), StoreError> {
        let _guard = self.state.lock();
        self.store.write_last_activity(self.clock.now())
    }

    pub fn is_current(&self) -> Result<bool, StoreError> {
        let _guard = self.state.lock();
        self.is_current_locked()
    }

    fn is_current_locked(&self) -> Result<bool, StoreError> {
        Ok(match self.store.last_activity()? {
            Some(last) => minutes_between(last, self.clock.now()) < self.session_minutes,
            None => false,
        })
    }

    /// Minutes left before the session lapses, `None` without activity
    pub fn minutes_remaining(&self) -> Result<Option<f64>, StoreError> {
        let last = self.store.last_activity()?;
        Ok(last.map(|last| {
            (self.session_minutes - minutes_between(last, self.clock.now())).max(0.0)
        }))
    }

    /// Log out if the session is missing or has lapsed
    pub fn confirm_current(&self) -> Result<(), StoreError> {
        let guard = self.state.lock();
        if self.is_current_locked()? {
            return Ok(());
        }
        debug!("Authentication credentials missing or out of date");
        self.store.clear()?;
        drop(guard);
        self.events.emit(SessionEvent::Logout);
        Ok(())
    }

    /// Remove all session fields and announce the logout. Logging out an
    /// empty session is fine and still emits the event.
    pub fn logout(&self) -> Result<(), StoreError> {
        debug!("Logout");
        {
            let _guard = self.state.lock();
            self.store.clear()?;
        }
        self.events.emit(SessionEvent::Logout);
        Ok(())
    }

    /// The stored header, without checking liveness
    pub fn get_auth(&self) -> Result<Option<String>, StoreError> {
        self.store.auth_header()
    }

    /// The current username, after logging out a lapsed session
    pub fn username(&self) -> Result<Option<String>, StoreError> {
        self.confirm_current()?;
        self.store.username()
    }

    /// A request was refused mid-session
    pub fn handle_auth_failure(&self) -> Result<(), StoreError> {
        self.logout()?;
        self.events.emit(SessionEvent::AuthenticationFailure);
        Ok(())
    }

    /// Extra headers attached to authenticated requests
    pub fn headers(&self) -> HashMap<String, String> {
        self.headers.read().clone()
    }

    pub fn set_header(&self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.write().insert(name.into(), value.into());
    }

    pub fn remove_header(&self, name: &str) -> Option<String> {
        self.headers.write().remove(name)
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if let Some(handle) = self.liveness.get_mut().take() {
            handle.abort();
        }
    }
}
