use std::sync::Arc;
use std::time::Duration;

use salvo::catcher::Catcher;
use salvo::conn::rustls::{Keycert, RustlsConfig};
use salvo::prelude::*;
use salvo::server::ServerHandle;
use tokio::signal;
use tracing::info;

mod config;
mod prelude;
mod routers;
mod signaling;
mod utils;

mod error;
pub use error::AppError;

use crate::signaling::{Hub, ws};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    crate::config::init();
    let config = crate::config::get();

    let _guard = config.log.guard();
    tracing::info!("log level: {}", &config.log.filter_level);

    crate::utils::limiter::periodic_rate_limit_report();

    let hub = Arc::new(Hub::new());
    if config.ping_interval_secs > 0 {
        tokio::spawn(ws::keepalive_ticker(
            Arc::clone(&hub),
            Duration::from_secs(config.ping_interval_secs),
        ));
    }

    let service = Service::new(routers::root(hub)).catcher(Catcher::default());

    let listen_addr = (config.listen_addr.as_str(), config.listen_port);
    if let Some(tls) = &config.tls {
        let (cert, key) = tokio::join!(tokio::fs::read(&tls.cert), tokio::fs::read(&tls.key));
        let cert = cert.expect("valid cert.pem path must be provided");
        let key = key.expect("valid key.pem path must be provided");
        let rustls_config = RustlsConfig::new(Keycert::new().cert(cert).key(key));
        println!(
            "🚀 Server listening on https://{}:{}/",
            config.listen_addr, config.listen_port
        );
        let acceptor = TcpListener::new(listen_addr).rustls(rustls_config).bind().await;
        let server = Server::new(acceptor);
        tokio::spawn(shutdown_signal(server.handle()));
        server.serve(service).await;
    } else {
        println!(
            "🚀 Server listening on http://{}:{}/",
            config.listen_addr, config.listen_port
        );
        let acceptor = TcpListener::new(listen_addr).bind().await;
        let server = Server::new(acceptor);
        tokio::spawn(shutdown_signal(server.handle()));
        server.serve(service).await;
    }
}

async fn shutdown_signal(handle: ServerHandle) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("ctrl_c signal received"),
        _ = terminate => info!("terminate signal received"),
    }
    handle.stop_graceful(Duration::from_secs(60));
}
