use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;

/// Downstream service table: service name -> base URL, plus the
/// client-facing selector aliases. Immutable after startup.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServicesConfig {
    /// service name -> base URL (no trailing slash)
    pub services: HashMap<String, String>,
    /// path selector -> service name; selectors not present here that
    /// match a service name map to themselves
    pub aliases: HashMap<String, String>,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        let mut services = HashMap::new();
        services.insert(
            "courses".to_string(),
            env_or("COURSES_SERVICE_URL", "http://courses_service:8000"),
        );
        services.insert(
            "trainees".to_string(),
            env_or("TRAINEES_SERVICE_URL", "http://trainees_service:8000"),
        );
        services.insert(
            "exams".to_string(),
            env_or("EXAMS_SERVICE_URL", "http://exams_service:8000"),
        );

        let mut aliases = HashMap::new();
        aliases.insert("classes".to_string(), "courses".to_string());
        aliases.insert("results".to_string(), "trainees".to_string());

        Self { services, aliases }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

impl ServicesConfig {
    /// Resolve a path selector to its service name
    pub fn service_for_selector<'a>(&'a self, selector: &'a str) -> Option<&'a str> {
        if let Some(service) = self.aliases.get(selector) {
            return Some(service.as_str());
        }
        if self.services.contains_key(selector) {
            return Some(selector);
        }
        None
    }

    /// Base URL of a service, if configured
    pub fn base_url(&self, service: &str) -> Option<&str> {
        self.services.get(service).map(|s| s.as_str())
    }

    /// All selectors the gateway recognizes, sorted for stable output
    pub fn known_selectors(&self) -> Vec<String> {
        let mut selectors: Vec<String> = self
            .services
            .keys()
            .chain(self.aliases.keys())
            .cloned()
            .collect();
        selectors.sort();
        selectors.dedup();
        selectors
    }

    /// Configured service names, sorted
    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.services.is_empty() {
            return Err(anyhow::anyhow!("At least one service must be configured"));
        }

        for (name, url) in &self.services {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(anyhow::anyhow!(
                    "Service '{}' must have an HTTP/HTTPS base URL: {}",
                    name,
                    url
                ));
            }
            if url.ends_with('/') {
                return Err(anyhow::anyhow!(
                    "Service '{}' base URL must not end with a slash: {}",
                    name,
                    url
                ));
            }
        }

        for (alias, target) in &self.aliases {
            if !self.services.contains_key(target) {
                return Err(anyhow::anyhow!(
                    "Alias '{}' points at unknown service '{}'",
                    alias,
                    target
                ));
            }
        }

        Ok(())
    }
}
