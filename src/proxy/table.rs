//! Static prefix route table
//!
//! Prefixes match on whole path segments: `/api/v1/users` matches
//! `/api/v1/users` and `/api/v1/users/42` but not `/api/v1/usersettings`.
//! The longest matching prefix wins; identical prefixes resolve to the one
//! registered first.

use crate::auth::{ADMIN_ROLE, RESEARCHER_ROLE};

/// Who may use a route
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Public,
    Authenticated,
    /// Authenticated and holding the named role
    Role(String),
}

impl Access {
    pub fn requires_auth(&self) -> bool {
        !matches!(self, Access::Public)
    }

    pub fn required_role(&self) -> Option<&str> {
        match self {
            Access::Role(role) => Some(role),
            _ => None,
        }
    }
}

/// How the matched prefix is rewritten before forwarding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rewrite {
    /// Remove the prefix entirely
    Strip,
    /// Replace the prefix with another one
    Replace(String),
}

/// One routing rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub prefix: String,
    pub service: String,
    pub access: Access,
    pub rewrite: Rewrite,
}

impl Route {
    pub fn new(prefix: &str, service: &str, access: Access, rewrite: Rewrite) -> Self {
        Self {
            prefix: prefix.trim_end_matches('/').to_string(),
            service: service.to_string(),
            access,
            rewrite,
        }
    }

    /// Whether this route's prefix covers `path` on a segment boundary
    pub fn matches(&self, path: &str) -> bool {
        match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    /// Upstream path for a matched inbound path
    pub fn rewrite_path(&self, path: &str) -> String {
        let rest = path.strip_prefix(self.prefix.as_str()).unwrap_or(path);
        let rewritten = match &self.rewrite {
            Rewrite::Strip => rest.to_string(),
            Rewrite::Replace(replacement) => {
                format!("{}{}", replacement.trim_end_matches('/'), rest)
            }
        };

        if rewritten.is_empty() {
            "/".to_string()
        } else {
            rewritten
        }
    }
}

/// Whether `path` is free of dot segments and encoded separators, raw or
/// percent-encoded. Only such paths may be resolved and forwarded.
pub fn is_canonical_path(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    if lower.contains('\\') || lower.contains("%2f") || lower.contains("%5c") {
        return false;
    }

    lower.split('/').all(|segment| {
        let decoded = segment.replace("%2e", ".");
        decoded != "." && decoded != ".."
    })
}

/// Result of resolving a path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch<'a> {
    pub route: &'a Route,
    pub upstream_path: String,
}

/// Ordered, immutable list of routes
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new(routes: Vec<Route>) -> Self {
        Self { routes }
    }

    /// The gateway's `/api/v1` routes
    pub fn standard() -> Self {
        let mut routes = vec![Route::new(
            "/api/v1/auth",
            "auth",
            Access::Public,
            Rewrite::Strip,
        )];

        let protected = [
            ("users", "user"),
            ("assessments", "assessment"),
            ("scores", "assessment"),
            ("training", "assessment"),
            ("progress", "assessment"),
            ("content", "content"),
            ("meditations", "content"),
            ("analytics", "analytics"),
            ("notifications", "notification"),
            ("community", "user"),
            ("payments", "user"),
        ];
        routes.extend(protected.iter().map(|(segment, service)| {
            Route::new(
                &format!("/api/v1/{segment}"),
                service,
                Access::Authenticated,
                Rewrite::Strip,
            )
        }));

        routes.push(Route::new(
            "/api/v1/research",
            "analytics",
            Access::Role(RESEARCHER_ROLE.to_string()),
            Rewrite::Strip,
        ));
        routes.push(Route::new(
            "/api/v1/admin",
            "user",
            Access::Role(ADMIN_ROLE.to_string()),
            Rewrite::Replace("/admin".to_string()),
        ));

        Self::new(routes)
    }

    /// Find the most specific route for `path`
    pub fn resolve(&self, path: &str) -> Option<RouteMatch<'_>> {
        let mut best: Option<&Route> = None;
        for route in self.routes.iter().filter(|r| r.matches(path)) {
            // Strictly longer only, so the first registered keeps ties
            if best.map_or(true, |b| route.prefix.len() > b.prefix.len()) {
                best = Some(route);
            }
        }

        best.map(|route| RouteMatch {
            route,
            upstream_path: route.rewrite_path(path),
        })
    }
}
