//! Path-to-service routing.
//!
//! A request path like `/api/classes/7/enrollments` resolves to the
//! `courses` service with endpoint `/classes/7/enrollments` — upstreams
//! expect the selector segment to stay in the path. The selector table is
//! static and lookups are exact; there is no longest-prefix search.

use serde::Serialize;
use std::sync::Arc;

use crate::config::ServicesConfig;

/// Outcome of routing a request path
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RouteMatch {
    /// Resolved service name (aliases already applied)
    pub service: String,
    /// Upstream path, starting with `/` and including the selector
    pub endpoint: String,
    /// The selector segment as the client wrote it
    pub selector: String,
}

/// Maps request paths onto the static service table
#[derive(Clone)]
pub struct Router {
    services: Arc<ServicesConfig>,
}

impl Router {
    pub fn new(services: Arc<ServicesConfig>) -> Self {
        Self { services }
    }

    /// Resolve a request path to a service and upstream endpoint.
    ///
    /// Returns `None` when the first path segment is not a recognized
    /// selector; the caller is expected to answer 400 with the selector
    /// list from [`Router::known_selectors`].
    pub fn resolve(&self, path: &str) -> Option<RouteMatch> {
        let trimmed = path.trim_start_matches('/');
        let trimmed = trimmed.strip_prefix("api/").unwrap_or(trimmed);

        let selector = trimmed.split('/').next().unwrap_or("");
        if selector.is_empty() {
            return None;
        }

        let service = self.services.service_for_selector(selector)?;

        Some(RouteMatch {
            service: service.to_string(),
            endpoint: format!("/{}", trimmed),
            selector: selector.to_string(),
        })
    }

    /// Selectors the router recognizes, for 400/404 hints
    pub fn known_selectors(&self) -> Vec<String> {
        self.services.known_selectors()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_router() -> Router {
        Router::new(Arc::new(ServicesConfig::default()))
    }

    #[test]
    fn test_resolve_identity_selector() {
        let router = test_router();
        let m = router.resolve("/api/courses/7").unwrap();
        assert_eq!(m.service, "courses");
        assert_eq!(m.endpoint, "/courses/7");
        assert_eq!(m.selector, "courses");
    }

    #[test]
    fn test_resolve_alias_keeps_selector_in_endpoint() {
        let router = test_router();
        let m = router.resolve("/api/classes/7/enrollments").unwrap();
        assert_eq!(m.service, "courses");
        assert_eq!(m.endpoint, "/classes/7/enrollments");

        let m = router.resolve("/api/results").unwrap();
        assert_eq!(m.service, "trainees");
        assert_eq!(m.endpoint, "/results");
    }

    #[test]
    fn test_resolve_without_api_prefix() {
        let router = test_router();
        let m = router.resolve("/trainees/3").unwrap();
        assert_eq!(m.service, "trainees");
        assert_eq!(m.endpoint, "/trainees/3");
    }

    #[test]
    fn test_resolve_unknown_selector() {
        let router = test_router();
        assert!(router.resolve("/api/grades/1").is_none());
        assert!(router.resolve("/api/").is_none());
        assert!(router.resolve("/").is_none());
    }

    #[test]
    fn test_exact_match_only() {
        let router = test_router();
        // No prefix matching: "course" is not "courses"
        assert!(router.resolve("/api/course/1").is_none());
        assert!(router.resolve("/api/coursesx").is_none());
    }
}
