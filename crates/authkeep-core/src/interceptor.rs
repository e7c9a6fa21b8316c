//! Request/response hooks that put the session on the wire.
//!
//! `AuthInterceptor` holds the two hooks an HTTP pipeline calls:
//! `before_send` attaches the `Authorization` header (and the session's extra
//! headers) to requests bound for a registered endpoint, and `on_response`
//! turns a 401 into a logout. `AuthenticatedClient` is a `reqwest` pipeline
//! that runs every request through both.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{header, Client, Method, Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::SessionConfig;
use crate::endpoints::{resolve_url, EndpointRegistry};
use crate::error::AuthError;
use crate::session::SessionManager;

/// Insert one header, replacing any existing value under that name
pub(crate) fn insert_header(
    headers: &mut header::HeaderMap,
    name: &str,
    value: &str,
) -> Result<(), AuthError> {
    let name = header::HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| AuthError::InvalidHeader(name.to_string()))?;
    let value = header::HeaderValue::from_str(value)
        .map_err(|_| AuthError::InvalidHeader(name.as_str().to_string()))?;
    headers.insert(name, value);
    Ok(())
}

pub struct AuthInterceptor {
    session: Arc<SessionManager>,
    endpoints: Arc<EndpointRegistry>,
}

impl AuthInterceptor {
    pub fn new(session: Arc<SessionManager>, endpoints: Arc<EndpointRegistry>) -> Self {
        Self { session, endpoints }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn endpoints(&self) -> &Arc<EndpointRegistry> {
        &self.endpoints
    }

    /// Attach the stored header to requests for registered endpoints.
    /// Without a stored header the request passes through untouched.
    pub fn before_send(&self, mut request: Request) -> Result<Request, AuthError> {
        if !self.endpoints.is_endpoint_url(request.url()) {
            return Ok(request);
        }
        let Some(auth) = self.session.get_auth()? else {
            return Ok(request);
        };

        let headers = request.headers_mut();
        insert_header(headers, header::AUTHORIZATION.as_str(), &auth)?;
        for (name, value) in self.session.headers() {
            insert_header(headers, &name, &value)?;
        }
        Ok(request)
    }

    /// Pass successful responses through. Error statuses come back as an
    /// error; a 401 also ends the session first.
    pub async fn on_response(&self, response: Response) -> Result<Response, AuthError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::UNAUTHORIZED {
            warn!(url = %response.url(), "Request unauthorized, ending session");
            if let Err(e) = self.session.handle_auth_failure() {
                warn!(error = %e, "Failed to clear session after 401");
            }
        }

        let body = response.text().await.unwrap_or_default();
        Err(AuthError::from_status(status, &body))
    }
}

/// HTTP client whose requests pass through an [`AuthInterceptor`].
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct AuthenticatedClient {
    client: Client,
    interceptor: Arc<AuthInterceptor>,
}

impl AuthenticatedClient {
    pub fn new(interceptor: Arc<AuthInterceptor>, config: &SessionConfig) -> Result<Self, AuthError> {
        let mut builder = Client::builder();
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        Ok(Self {
            client: builder.build()?,
            interceptor,
        })
    }

    pub fn with_client(client: Client, interceptor: Arc<AuthInterceptor>) -> Self {
        Self {
            client,
            interceptor,
        }
    }

    pub fn interceptor(&self) -> &Arc<AuthInterceptor> {
        &self.interceptor
    }

    /// Start a request; relative URLs resolve against the base URL
    pub fn request(&self, method: Method, url: &str) -> Result<reqwest::RequestBuilder, AuthError> {
        let url = resolve_url(self.interceptor.endpoints().base_url(), url)?;
        Ok(self.client.request(method, url))
    }

    pub async fn execute(&self, request: Request) -> Result<Response, AuthError> {
        let request = self.interceptor.before_send(request)?;
        debug!(method = %request.method(), url = %request.url(), "Sending request");
        let response = self.client.execute(request).await?;
        self.interceptor.on_response(response).await
    }

    pub async fn send(&self, builder: reqwest::RequestBuilder) -> Result<Response, AuthError> {
        self.execute(builder.build()?).await
    }

    pub async fn get(&self, url: &str) -> Result<Response, AuthError> {
        self.send(self.request(Method::GET, url)?).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, AuthError> {
        let response = self.get(url).await?;
        response
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(format!("Failed to parse JSON from {}: {}", url, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SessionEvent;
    use crate::probe::Authenticator;
    use crate::store::MemoryStore;
    use wiremock::matchers::{header as has_header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn wiring(base_url: &str) -> (Arc<SessionManager>, Arc<EndpointRegistry>, Arc<AuthInterceptor>) {
        let mut config = SessionConfig {
            base_url: base_url.to_string(),
            ..SessionConfig::default()
        };
        config.headers.insert("X-Tenant".into(), "acme".into());
        let session = Arc::new(SessionManager::new(&config, Arc::new(MemoryStore::new())));
        let endpoints = Arc::new(EndpointRegistry::new(base_url).unwrap());
        let interceptor = Arc::new(AuthInterceptor::new(
            Arc::clone(&session),
            Arc::clone(&endpoints),
        ));
        (session, endpoints, interceptor)
    }

    fn request(url: &str) -> Request {
        Client::new().get(url).build().unwrap()
    }

    // -------------------------------------------------------------------------
    // before_send
    // -------------------------------------------------------------------------

    #[test]
    fn test_attaches_header_for_registered_endpoint() {
        let (session, endpoints, interceptor) = wiring("https://app.example.com/");
        endpoints.add_endpoint(Some("https://api.example.com")).unwrap();
        session.set_credentials("ian@me", "fred").unwrap();

        let request = interceptor
            .before_send(request("http://api.example.com:8080/users"))
            .unwrap();
        assert_eq!(
            request.headers().get(header::AUTHORIZATION).unwrap(),
            "Basic aWFuQG1lOmZyZWQ="
        );
        assert_eq!(request.headers().get("x-tenant").unwrap(), "acme");
    }

    #[test]
    fn test_unregistered_host_never_gets_header() {
        let (session, endpoints, interceptor) = wiring("https://app.example.com/");
        endpoints.add_endpoint(None).unwrap();
        session.set_credentials("ian@me", "fred").unwrap();

        let request = interceptor
            .before_send(request("https://elsewhere.example.org/"))
            .unwrap();
        assert!(request.headers().get(header::AUTHORIZATION).is_none());
        assert!(request.headers().get("x-tenant").is_none());
    }

    #[test]
    fn test_no_stored_header_passes_request_through() {
        let (_session, endpoints, interceptor) = wiring("https://app.example.com/");
        endpoints.add_endpoint(None).unwrap();

        let request = interceptor
            .before_send(request("https://app.example.com/api/items"))
            .unwrap();
        assert!(request.headers().get(header::AUTHORIZATION).is_none());
        assert!(request.headers().get("x-tenant").is_none());
    }

    #[test]
    fn test_session_header_replaces_existing_authorization() {
        let (session, endpoints, interceptor) = wiring("https://app.example.com/");
        endpoints.add_endpoint(None).unwrap();
        session.set_credentials("ian@me", "fred").unwrap();

        let request = Client::new()
            .get("https://app.example.com/")
            .header(header::AUTHORIZATION, "Bearer stale")
            .build()
            .unwrap();
        let request = interceptor.before_send(request).unwrap();
        let values: Vec<_> = request.headers().get_all(header::AUTHORIZATION).iter().collect();
        assert_eq!(values, vec!["Basic aWFuQG1lOmZyZWQ="]);
    }

    #[test]
    fn test_invalid_extra_header_is_reported() {
        let (session, endpoints, interceptor) = wiring("https://app.example.com/");
        endpoints.add_endpoint(None).unwrap();
        session.set_credentials("ian@me", "fred").unwrap();
        session.set_header("X-Bad", "line\nbreak");

        let result = interceptor.before_send(request("https://app.example.com/"));
        assert!(matches!(result, Err(AuthError::InvalidHeader(ref h)) if h == "x-bad"));
    }

    // -------------------------------------------------------------------------
    // Round trips through the authenticated client
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_authenticated_get_sends_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/items"))
            .and(has_header("authorization", "Basic aWFuQG1lOmZyZWQ="))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"count": 2})))
            .expect(1)
            .mount(&server)
            .await;

        let (session, endpoints, interceptor) = wiring(&server.uri());
        endpoints.add_endpoint(None).unwrap();
        session.set_credentials("ian@me", "fred").unwrap();
        let client = AuthenticatedClient::new(interceptor, &SessionConfig::default()).unwrap();

        let body: serde_json::Value = client.get_json("/items").await.unwrap();
        assert_eq!(body["count"], 2);
    }

    #[tokio::test]
    async fn test_401_ends_session_and_is_returned() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/authenticate"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/reports"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let config = SessionConfig {
            base_url: server.uri(),
            ..SessionConfig::default()
        };
        let (session, endpoints, interceptor) = wiring(&server.uri());
        endpoints.add_endpoint(None).unwrap();
        let authenticator = Authenticator::new(Arc::clone(&session), &config).unwrap();
        let client = AuthenticatedClient::new(interceptor, &config).unwrap();

        authenticator.login("ian@me", "fred", None).await.unwrap();
        let mut events = session.events().subscribe();

        let result = client.get("/reports").await;
        assert!(matches!(result, Err(AuthError::Unauthorized)));
        assert_eq!(events.try_recv().unwrap(), SessionEvent::Logout);
        assert_eq!(
            events.try_recv().unwrap(),
            SessionEvent::AuthenticationFailure
        );
        assert_eq!(session.get_auth().unwrap(), None);
    }

    #[tokio::test]
    async fn test_other_errors_keep_session() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let (session, endpoints, interceptor) = wiring(&server.uri());
        endpoints.add_endpoint(None).unwrap();
        session.set_credentials("ian@me", "fred").unwrap();
        let client = AuthenticatedClient::new(interceptor, &SessionConfig::default()).unwrap();

        let result = client.get("/anything").await;
        assert!(matches!(result, Err(AuthError::ServerError(ref b)) if b == "maintenance"));
        assert!(session.get_auth().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_401_from_unprotected_host_still_ends_session() {
        // Any 401 seen by the hook is treated as a session failure
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let (session, _endpoints, interceptor) = wiring(&server.uri());
        session.set_credentials("ian@me", "fred").unwrap();
        let client = AuthenticatedClient::new(interceptor, &SessionConfig::default()).unwrap();

        assert!(client.get("/").await.unwrap_err().is_unauthorized());
        assert_eq!(session.get_auth().unwrap(), None);
    }
}
