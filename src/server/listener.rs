use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::server::Server;

pub async fn run(server: Arc<Server>, listen_addr: &str) -> anyhow::Result<()> {
    let listener = TcpListener::bind(listen_addr).await?;
    info!("Listening on {}", listener.local_addr()?);

    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Accept failed: {}", e);
                continue;
            }
        };
        debug!("Accepted connection from {}", peer);

        if let Err(e) = socket.set_nodelay(true) {
            debug!("Could not set TCP_NODELAY for {}: {}", peer, e);
        }
        let local = socket.local_addr().ok();
        let server = server.clone();
        tokio::spawn(async move {
            match server.serve_connection(socket, Some(peer), local).await {
                Ok(()) => debug!("Connection from {} finished", peer),
                Err(e) if e.kind() == "resource" => {
                    error!(kind = e.kind(), "Connection error from {}: {}", peer, e);
                }
                Err(e) => warn!(kind = e.kind(), "Connection error from {}: {}", peer, e),
            }
        });
    }
}
