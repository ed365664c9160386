//! The gateway front door: request dispatch, the forwarding decision, and
//! the shared upstream HTTP client.

pub mod forwarder;
pub mod handler;
pub mod http_client;
pub mod http_server;

pub use forwarder::{ForwardOutcome, GatewayForwarder};
pub use handler::GatewayHandler;
pub use http_client::UpstreamClient;
pub use http_server::GatewayServer;
