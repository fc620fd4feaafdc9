//! Circuit identifier resolution for outbound requests.

use std::sync::Arc;

use axum::http::{header, HeaderMap, Uri};

use crate::config::IdentifierStrategy;

/// Maps an outbound request to the identifier of the circuit guarding it.
pub trait IdentifierResolver: Send + Sync {
    fn resolve(&self, uri: &Uri, headers: &HeaderMap) -> String;
}

/// Uses the target host, lowercased. Falls back to the Host header.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostResolver;

impl IdentifierResolver for HostResolver {
    fn resolve(&self, uri: &Uri, headers: &HeaderMap) -> String {
        if let Some(host) = uri.host() {
            return host.to_ascii_lowercase();
        }
        host_header(headers)
            .map(|h| h.split(':').next().unwrap_or(h).to_ascii_lowercase())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// Uses the target host and port, lowercased. Falls back to the Host header.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthorityResolver;

impl IdentifierResolver for AuthorityResolver {
    fn resolve(&self, uri: &Uri, headers: &HeaderMap) -> String {
        if let Some(authority) = uri.authority() {
            return authority.as_str().to_ascii_lowercase();
        }
        host_header(headers)
            .map(str::to_ascii_lowercase)
            .unwrap_or_else(|| "unknown".to_string())
    }
}

impl<F> IdentifierResolver for F
where
    F: Fn(&Uri, &HeaderMap) -> String + Send + Sync,
{
    fn resolve(&self, uri: &Uri, headers: &HeaderMap) -> String {
        self(uri, headers)
    }
}

/// Build the resolver selected by configuration.
pub fn resolver_for(strategy: IdentifierStrategy) -> Arc<dyn IdentifierResolver> {
    match strategy {
        IdentifierStrategy::Host => Arc::new(HostResolver),
        IdentifierStrategy::Authority => Arc::new(AuthorityResolver),
    }
}

fn host_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::HOST).and_then(|h| h.to_str().ok())
}
