//! Credential verification against the authentication endpoint.
//!
//! `Authenticator::login` stores the credentials straight away, then checks
//! them with one GET to the configured authentication URL. The request goes
//! out on the authenticator's own `reqwest::Client`, which is never wrapped
//! by the [`AuthInterceptor`](crate::interceptor::AuthInterceptor), so the
//! probe cannot be intercepted by the hook it feeds.
//!
//! There is no retry and no timeout: a request that never completes leaves
//! the [`LoginHandle`] pending.

use std::collections::HashMap;
use std::future::IntoFuture;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::{header, Client, StatusCode};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use crate::config::SessionConfig;
use crate::endpoints::resolve_url;
use crate::error::AuthError;
use crate::events::SessionEvent;
use crate::interceptor::insert_header;
use crate::session::SessionManager;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoginError {
    #[error("Authentication rejected with status {status}")]
    Rejected { status: StatusCode },

    #[error("Authentication request failed: {0}")]
    Transport(String),

    #[error("Could not store credentials: {0}")]
    Store(String),

    #[error("Could not build authentication request: {0}")]
    InvalidRequest(String),

    #[error("Authentication task ended before completing")]
    Aborted,
}

pub type LoginOutcome = Result<(), LoginError>;

/// Result of one login attempt. Settles exactly once; clones share the
/// outcome and callbacks registered after settlement still run.
#[derive(Clone)]
pub struct LoginHandle {
    username: String,
    outcome: Shared<BoxFuture<'static, LoginOutcome>>,
}

impl LoginHandle {
    fn new(username: String, task: JoinHandle<LoginOutcome>) -> Self {
        let outcome = task
            .map(|joined| joined.unwrap_or(Err(LoginError::Aborted)))
            .boxed()
            .shared();
        Self { username, outcome }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Wait for the outcome
    pub async fn wait(&self) -> LoginOutcome {
        self.outcome.clone().await
    }

    /// Run `f` once the login succeeds
    pub fn on_success<F>(&self, f: F) -> &Self
    where
        F: FnOnce() + Send + 'static,
    {
        let outcome = self.outcome.clone();
        tokio::spawn(async move {
            if outcome.await.is_ok() {
                f();
            }
        });
        self
    }

    /// Run `f` once the login fails
    pub fn on_error<F>(&self, f: F) -> &Self
    where
        F: FnOnce(LoginError) + Send + 'static,
    {
        let outcome = self.outcome.clone();
        tokio::spawn(async move {
            if let Err(e) = outcome.await {
                f(e);
            }
        });
        self
    }
}

impl IntoFuture for LoginHandle {
    type Output = LoginOutcome;
    type IntoFuture = Shared<BoxFuture<'static, LoginOutcome>>;

    fn into_future(self) -> Self::IntoFuture {
        self.outcome
    }
}

pub struct Authenticator {
    session: Arc<SessionManager>,
    client: Client,
    authenticate_url: Url,
}

impl Authenticator {
    pub fn new(session: Arc<SessionManager>, config: &SessionConfig) -> Result<Self, AuthError> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| AuthError::invalid_url(&config.base_url, e))?;
        let authenticate_url = resolve_url(&base, &config.authenticate_url)?;
        let client = Client::builder().build()?;

        Ok(Self {
            session,
            client,
            authenticate_url,
        })
    }

    /// Use a caller-supplied client. It must not route through the
    /// authentication interceptor.
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn authenticate_url(&self) -> &Url {
        &self.authenticate_url
    }

    /// Store the credentials and verify them against the server.
    ///
    /// The `Authorization` header is visible through
    /// [`SessionManager::get_auth`] as soon as this returns, before the
    /// server has answered. A 200 emits `login`; anything else, including a
    /// transport failure, logs out and emits `authentication-failed`. Both
    /// happen before the handle settles.
    ///
    /// Concurrent logins are not coordinated: the last credentials written
    /// win. Must be called inside a tokio runtime.
    pub fn login(
        &self,
        username: &str,
        password: &str,
        headers: Option<&HashMap<String, String>>,
    ) -> LoginHandle {
        debug!(username = %username, "Login");

        let request = self
            .session
            .set_credentials(username, password)
            .map_err(|e| LoginError::Store(e.to_string()))
            .and_then(|_| self.build_request(headers));

        let session = Arc::clone(&self.session);
        let name = username.to_string();
        let task = tokio::spawn(async move {
            let outcome = match request {
                Ok(request) => Self::verify(request).await,
                Err(e) => Err(e),
            };

            match &outcome {
                Ok(()) => {
                    debug!(username = %name, "Successfully authenticated");
                    session.events().emit(SessionEvent::Login(name));
                }
                Err(e) => {
                    debug!(username = %name, error = %e, "Test authentication failed");
                    if let Err(e) = session.logout() {
                        warn!(error = %e, "Failed to clear rejected credentials");
                    }
                    session.events().emit(SessionEvent::AuthenticationFailed(name));
                }
            }
            outcome
        });

        LoginHandle::new(username.to_string(), task)
    }

    fn build_request(
        &self,
        extra: Option<&HashMap<String, String>>,
    ) -> Result<reqwest::RequestBuilder, LoginError> {
        let invalid = |e: AuthError| LoginError::InvalidRequest(e.to_string());

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );
        let auth = self
            .session
            .get_auth()
            .map_err(|e| LoginError::Store(e.to_string()))?;
        if let Some(auth) = auth {
            insert_header(&mut headers, header::AUTHORIZATION.as_str(), &auth).map_err(invalid)?;
        }
        for (name, value) in self.session.headers() {
            insert_header(&mut headers, &name, &value).map_err(invalid)?;
        }
        for (name, value) in extra.into_iter().flatten() {
            insert_header(&mut headers, name, value).map_err(invalid)?;
        }

        Ok(self
            .client
            .get(self.authenticate_url.clone())
            .headers(headers))
    }

    async fn verify(request: reqwest::RequestBuilder) -> LoginOutcome {
        let response = request
            .send()
            .await
            .map_err(|e| LoginError::Transport(e.to_string()))?;

        match response.status() {
            StatusCode::OK => Ok(()),
            status => Err(LoginError::Rejected { status }),
        }
    }
}
