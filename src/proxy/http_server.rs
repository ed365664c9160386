use anyhow::Result;
use hyper::server::conn::AddrStream;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Server};
use std::convert::Infallible;
use std::net::SocketAddr;
use tracing::{error, info};

use super::handler::GatewayHandler;

/// Runs the gateway HTTP listener
pub struct GatewayServer {
    bind_addr: SocketAddr,
}

impl GatewayServer {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self { bind_addr }
    }

    pub async fn run(self, handler: GatewayHandler) -> Result<()> {
        let make_service = make_service_fn(move |conn: &AddrStream| {
            let handler = handler.clone();
            let remote = conn.remote_addr();
            async move {
                Ok::<_, Infallible>(service_fn(move |mut req: Request<Body>| {
                    let handler = handler.clone();
                    // Remote address rides along for correlation ids
                    req.extensions_mut().insert(remote);
                    async move { handler.handle_request(req).await }
                }))
            }
        });

        info!("Gateway listening on {}", self.bind_addr);
        let server = Server::bind(&self.bind_addr).serve(make_service);

        if let Err(e) = server.await {
            error!("Gateway server error: {}", e);
        }

        Ok(())
    }
}
