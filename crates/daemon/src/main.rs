//! ErrandBit Payment Daemon Binary
//!
//! Serves the payment HTTP routes and runs the background monitor.

use std::sync::Arc;

use errandbit_daemon::{BackgroundTasks, DaemonError, HttpConfig, HttpServer, PaymentService};
use errandbit_logging::init_logging;
use errandbit_settings::{default_settings_path, Settings};

#[tokio::main]
async fn main() -> Result<(), DaemonError> {
    init_logging(false);

    let settings = Settings::load_from(&default_settings_path())?;

    tracing::info!("Starting ErrandBit payment daemon...");

    let service = Arc::new(PaymentService::from_settings(&settings)?);
    let mut tasks = BackgroundTasks::start(&service, &settings);
    let mut server = HttpServer::new(HttpConfig::from_settings(&settings));

    tracing::info!("Daemon starting, will listen on {}", server.listen_addr());

    // Run until interrupted
    tokio::select! {
        result = server.start(service.clone()) => {
            if let Err(e) = result {
                tracing::error!("HTTP server error: {}", e);
                tasks.stop().await;
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal");
            server.stop().await;
        }
    }

    tasks.stop().await;
    tracing::info!("Daemon stopped");
    Ok(())
}
