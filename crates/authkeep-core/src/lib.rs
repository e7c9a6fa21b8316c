//! HTTP Basic Authentication session management.
//!
//! `authkeep-core` holds a user's credentials as a Basic-Auth header, decides
//! which outgoing requests carry it, logs the session out after a period of
//! inactivity or a 401, and reports all of this as events.
//!
//! - [`session::SessionManager`]: credential lifecycle and liveness
//! - [`endpoints::EndpointRegistry`]: hosts that require the header
//! - [`probe::Authenticator`]: one-shot verification of new credentials
//! - [`interceptor::AuthInterceptor`]: before-send and on-response hooks
//! - [`service::AuthService`]: all of the above wired from one config

pub mod clock;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod events;
pub mod interceptor;
pub mod probe;
pub mod service;
pub mod session;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SessionConfig;
pub use endpoints::EndpointRegistry;
pub use error::{AuthError, ConfigError, StoreError};
pub use events::{EventBus, EventKind, SessionEvent, Subscription};
pub use interceptor::{AuthInterceptor, AuthenticatedClient};
pub use probe::{Authenticator, LoginError, LoginHandle, LoginOutcome};
pub use service::AuthService;
pub use session::{basic_auth_header, SessionManager};
pub use store::{FileStore, KeyValueStore, KeyringStore, MemoryStore, SessionStore};
