use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::clock::Clock;
use crate::config::SessionConfig;
use crate::endpoints::EndpointRegistry;
use crate::error::{AuthError, StoreError};
use crate::events::EventBus;
use crate::interceptor::{AuthInterceptor, AuthenticatedClient};
use crate::probe::{Authenticator, LoginHandle};
use crate::session::SessionManager;
use crate::store::KeyValueStore;

/// One application's session: the manager, its endpoints, the probe and an
/// authenticated client, wired from a single config.
pub struct AuthService {
    session: Arc<SessionManager>,
    endpoints: Arc<EndpointRegistry>,
    authenticator: Authenticator,
    client: AuthenticatedClient,
}

impl AuthService {
    /// Wire everything and start the liveness check.
    /// Must be called inside a tokio runtime.
    pub fn start(config: &SessionConfig, store: Arc<dyn KeyValueStore>) -> Result<Self, AuthError> {
        Self::build(SessionManager::new(config, store), config)
    }

    /// Like [`AuthService::start`] with a custom clock and event bus
    pub fn start_with(
        config: &SessionConfig,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        events: Arc<EventBus>,
    ) -> Result<Self, AuthError> {
        let manager = SessionManager::new(config, store)
            .with_clock(clock)
            .with_events(events);
        Self::build(manager, config)
    }

    fn build(manager: SessionManager, config: &SessionConfig) -> Result<Self, AuthError> {
        let endpoints = Arc::new(EndpointRegistry::new(&config.base_url)?);
        let session = manager.start();
        let authenticator = Authenticator::new(Arc::clone(&session), config)?;
        let interceptor = Arc::new(AuthInterceptor::new(
            Arc::clone(&session),
            Arc::clone(&endpoints),
        ));
        let client = AuthenticatedClient::new(interceptor, config)?;
        info!(authenticate_url = %authenticator.authenticate_url(), "Auth service started");

        Ok(Self {
            session,
            endpoints,
            authenticator,
            client,
        })
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn endpoints(&self) -> &Arc<EndpointRegistry> {
        &self.endpoints
    }

    pub fn client(&self) -> &AuthenticatedClient {
        &self.client
    }

    pub fn events(&self) -> &Arc<EventBus> {
        self.session.events()
    }

    pub fn login(
        &self,
        username: &str,
        password: &str,
        headers: Option<&HashMap<String, String>>,
    ) -> LoginHandle {
        self.authenticator.login(username, password, headers)
    }

    pub fn logout(&self) -> Result<(), StoreError> {
        self.session.logout()
    }

    pub fn add_endpoint(&self, url: Option<&str>) -> Result<String, AuthError> {
        self.endpoints.add_endpoint(url)
    }

    pub fn is_endpoint(&self, url: &str) -> bool {
        self.endpoints.is_endpoint(url)
    }

    /// Stop background work
    pub fn shutdown(&self) {
        self.session.shutdown();
    }
}
