//! Registry of protected hosts.
//!
//! Requests are matched by host only: scheme, port and path are ignored, so
//! `http://api.example.com:8080/a` and `https://api.example.com/b` name the
//! same endpoint.

use std::collections::HashSet;

use parking_lot::RwLock;
use tracing::debug;
use url::Url;

use crate::error::AuthError;

/// Resolve `input` against `base`. Absolute URLs replace the base entirely.
pub fn resolve_url(base: &Url, input: &str) -> Result<Url, AuthError> {
    base.join(input).map_err(|e| AuthError::invalid_url(input, e))
}

/// Host component of `input` resolved against `base`
pub fn resolve_host(base: &Url, input: &str) -> Result<String, AuthError> {
    let url = resolve_url(base, input)?;
    host_of(&url).ok_or_else(|| AuthError::invalid_url(input, "URL has no host"))
}

pub fn host_of(url: &Url) -> Option<String> {
    url.host_str()
        .filter(|host| !host.is_empty())
        .map(str::to_string)
}

pub struct EndpointRegistry {
    base: Url,
    hosts: RwLock<HashSet<String>>,
}

impl EndpointRegistry {
    /// Create an empty registry. `base_url` plays the part of the current
    /// page location: relative URLs resolve against it and `add_endpoint(None)`
    /// registers its host.
    pub fn new(base_url: &str) -> Result<Self, AuthError> {
        let base = Url::parse(base_url).map_err(|e| AuthError::invalid_url(base_url, e))?;
        Ok(Self {
            base,
            hosts: RwLock::new(HashSet::new()),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Register the host of `url`, or of the base URL when `None`.
    /// Returns the host. Adding a host twice is not an error.
    pub fn add_endpoint(&self, url: Option<&str>) -> Result<String, AuthError> {
        let host = match url {
            Some(url) => resolve_host(&self.base, url)?,
            None => host_of(&self.base)
                .ok_or_else(|| AuthError::invalid_url(self.base.as_str(), "URL has no host"))?,
        };

        if self.hosts.write().insert(host.clone()) {
            debug!(host = %host, "Endpoint added");
        }
        Ok(host)
    }

    /// Whether requests to `url` need the authorization header.
    /// URLs that cannot be resolved to a host never do.
    pub fn is_endpoint(&self, url: &str) -> bool {
        match resolve_host(&self.base, url) {
            Ok(host) => self.contains_host(&host),
            Err(_) => false,
        }
    }

    pub fn is_endpoint_url(&self, url: &Url) -> bool {
        host_of(url).is_some_and(|host| self.contains_host(&host))
    }

    fn contains_host(&self, host: &str) -> bool {
        self.hosts.read().contains(host)
    }

    pub fn len(&self) -> usize {
        self.hosts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.read().is_empty()
    }

    /// Sorted snapshot of the registered hosts
    pub fn hosts(&self) -> Vec<String> {
        let mut hosts: Vec<String> = self.hosts.read().iter().cloned().collect();
        hosts.sort();
        hosts
    }
}
