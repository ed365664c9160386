use thiserror::Error;
use tokio::time::Duration;

/// Main error type for the Portico gateway
#[derive(Error, Debug, Clone)]
pub enum PorticoError {
    /// Configuration related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// No service matches the request path
    #[error("No service for selector '{selector}'")]
    RouterMiss { selector: String },

    /// Network related errors (connect failures, broken transport)
    #[error("Network error: {message}")]
    Network { message: String },

    /// Health probe errors
    #[error("Health check error for {service}: {message}")]
    HealthCheck { service: String, message: String },

    /// Queue backend errors
    #[error("Queue error: {message}")]
    Queue { message: String },

    /// Message (de)serialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Timeout errors
    #[error("Operation timed out after {duration:?}: {operation}")]
    Timeout {
        duration: Duration,
        operation: String,
    },

    /// Upstream is known-unhealthy
    #[error("Service unavailable: {service}")]
    ServiceUnavailable { service: String },

    /// Internal server errors
    #[error("Internal server error: {message}")]
    Internal { message: String },
}

impl PorticoError {
    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a router-miss error
    pub fn router_miss<S: Into<String>>(selector: S) -> Self {
        Self::RouterMiss {
            selector: selector.into(),
        }
    }

    /// Create a network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a health check error
    pub fn health_check<S: Into<String>, T: Into<String>>(service: T, message: S) -> Self {
        Self::HealthCheck {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Create a queue backend error
    pub fn queue<S: Into<String>>(message: S) -> Self {
        Self::Queue {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization<S: Into<String>>(message: S) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(duration: Duration, operation: S) -> Self {
        Self::Timeout {
            duration,
            operation: operation.into(),
        }
    }

    /// Create a service-unavailable error
    pub fn service_unavailable<S: Into<String>>(service: S) -> Self {
        Self::ServiceUnavailable {
            service: service.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether a retry against the same upstream may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PorticoError::Network { .. }
                | PorticoError::Timeout { .. }
                | PorticoError::ServiceUnavailable { .. }
                | PorticoError::Queue { .. }
        )
    }
}

/// Result type alias for Portico operations
pub type PorticoResult<T> = Result<T, PorticoError>;

impl From<std::io::Error> for PorticoError {
    fn from(err: std::io::Error) -> Self {
        PorticoError::network(format!("IO error: {}", err))
    }
}

impl From<hyper::Error> for PorticoError {
    fn from(err: hyper::Error) -> Self {
        if err.is_timeout() {
            PorticoError::timeout(Duration::from_secs(30), "HTTP request")
        } else if err.is_connect() {
            PorticoError::network(format!("Connection error: {}", err))
        } else {
            PorticoError::network(format!("HTTP error: {}", err))
        }
    }
}

impl From<hyper::http::Error> for PorticoError {
    fn from(err: hyper::http::Error) -> Self {
        PorticoError::network(format!("HTTP error: {}", err))
    }
}

impl From<hyper::http::uri::InvalidUri> for PorticoError {
    fn from(err: hyper::http::uri::InvalidUri) -> Self {
        PorticoError::config(format!("Invalid URI: {}", err))
    }
}

impl From<reqwest::Error> for PorticoError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PorticoError::timeout(Duration::from_secs(5), "health probe")
        } else {
            PorticoError::network(format!("HTTP client error: {}", err))
        }
    }
}

impl From<redis::RedisError> for PorticoError {
    fn from(err: redis::RedisError) -> Self {
        PorticoError::queue(format!("Redis error: {}", err))
    }
}

impl From<serde_json::Error> for PorticoError {
    fn from(err: serde_json::Error) -> Self {
        PorticoError::serialization(format!("JSON error: {}", err))
    }
}

impl From<toml::de::Error> for PorticoError {
    fn from(err: toml::de::Error) -> Self {
        PorticoError::config(format!("TOML parsing error: {}", err))
    }
}

impl From<tokio::time::error::Elapsed> for PorticoError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        PorticoError::timeout(Duration::from_secs(30), "operation")
    }
}
