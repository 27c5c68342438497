use std::sync::Arc;

use inlet::config::Config;
use inlet::handler::{HandlerError, NameVirtualHostHandler, PathHandler, handler_fn};
use inlet::http::exchange::Exchange;
use inlet::server::{Server, listener};

async fn hello(mut exchange: Exchange) -> Result<(), HandlerError> {
    let body = format!("Hello from Inlet ({})\n", exchange.relative_path());
    exchange
        .response_headers_mut()
        .put("Content-Type", "text/plain")?;
    exchange.send_response(200, body).await?;
    Ok(())
}

async fn not_found(exchange: Exchange) -> Result<(), HandlerError> {
    exchange.send_error_response(404).await?;
    Ok(())
}

fn routes(server: &Server) -> anyhow::Result<()> {
    let paths = PathHandler::new(Some(handler_fn(not_found)));
    paths.register_path("/hello", Some(handler_fn(hello)))?;

    let hosts = NameVirtualHostHandler::new(Some(Arc::new(paths)));
    server.root().set_handler(Some(Arc::new(hosts)));
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load()?;

    let mut runtime = tokio::runtime::Builder::new_multi_thread();
    runtime.enable_all();
    if let Some(threads) = cfg.worker_threads {
        runtime.worker_threads(threads);
    }
    let runtime = runtime.build()?;

    let server = Arc::new(Server::new(&cfg));
    routes(&server)?;

    runtime.block_on(async move {
        tokio::select! {
            res = listener::run(server, &cfg.listen_addr) => {
                res?;
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown signal received");
            }
        }
        Ok::<(), anyhow::Error>(())
    })
}
