pub mod admin;
pub mod cache;
pub mod config;
pub mod correlation;
pub mod error;
pub mod health;
pub mod metrics;
pub mod monitoring;
pub mod proxy;
pub mod queue;
pub mod routing;
pub mod worker;

// Re-export commonly used types
pub use cache::FallbackCache;
pub use config::Config;
pub use error::{PorticoError, PorticoResult};
pub use health::{HealthEntry, HealthProbe, HealthRegistry, HttpHealthProbe};
pub use crate::metrics::{MetricsSnapshot, QueueMetrics};
pub use proxy::{ForwardOutcome, GatewayForwarder, GatewayHandler, GatewayServer, UpstreamClient};
pub use queue::{MemoryQueueStore, QueueName, QueueStore, QueuedMessage, RedisQueueStore};
pub use routing::{RouteMatch, Router};
pub use worker::{CycleStats, RetryOutcome, Worker};
