//! Route lookup and upstream URI rewriting.
//!
//! # Design Decisions
//! - Immutable after construction (shared via `Arc`, no locks)
//! - Longest prefix wins; ties keep configuration order
//! - Prefixes match whole path segments: `/api` matches `/api/users`, not `/apix`

use axum::http::Uri;
use thiserror::Error;
use url::{Position, Url};

use crate::config::RouteConfig;

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("route `{route}`: invalid upstream `{upstream}`: {source}")]
    Upstream {
        route: String,
        upstream: String,
        #[source]
        source: url::ParseError,
    },

    #[error("route `{route}`: rewritten URI is invalid: {source}")]
    Rewrite {
        route: String,
        #[source]
        source: axum::http::uri::InvalidUri,
    },
}

/// A compiled route.
#[derive(Debug, Clone)]
pub struct Route {
    pub name: String,
    pub path_prefix: String,
    pub upstream: Url,
    pub strip_prefix: bool,
}

impl Route {
    fn compile(config: &RouteConfig) -> Result<Self, RouteError> {
        let upstream = Url::parse(&config.upstream).map_err(|source| RouteError::Upstream {
            route: config.name.clone(),
            upstream: config.upstream.clone(),
            source,
        })?;
        Ok(Self {
            name: config.name.clone(),
            path_prefix: config.path_prefix.clone(),
            upstream,
            strip_prefix: config.strip_prefix,
        })
    }

    fn matches(&self, path: &str) -> bool {
        match path.strip_prefix(self.path_prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/') || self.path_prefix.ends_with('/'),
            None => false,
        }
    }

    /// Absolute URI of the upstream resource for an incoming request URI.
    pub fn upstream_uri(&self, uri: &Uri) -> Result<Uri, RouteError> {
        let path = uri.path();
        let rest = if self.strip_prefix {
            path.strip_prefix(self.path_prefix.as_str()).unwrap_or(path)
        } else {
            path
        };

        let mut target = String::from(&self.upstream[..Position::BeforePath]);
        target.push_str(self.upstream.path().trim_end_matches('/'));
        if !rest.starts_with('/') {
            target.push('/');
        }
        target.push_str(rest);
        if let Some(query) = uri.query() {
            target.push('?');
            target.push_str(query);
        }

        target.parse().map_err(|source| RouteError::Rewrite {
            route: self.name.clone(),
            source,
        })
    }
}

/// Path-prefix router over the configured upstreams.
#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn from_config(configs: &[RouteConfig]) -> Result<Self, RouteError> {
        let mut routes = configs
            .iter()
            .map(Route::compile)
            .collect::<Result<Vec<_>, _>>()?;
        routes.sort_by(|a, b| b.path_prefix.len().cmp(&a.path_prefix.len()));
        Ok(Self { routes })
    }

    /// Find the route for a request path.
    pub fn match_path(&self, path: &str) -> Option<&Route> {
        self.routes.iter().find(|route| route.matches(path))
    }
}
