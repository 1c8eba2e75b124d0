//! HTTP server and background jobs

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use errandbit_monitor::PeriodicTask;
use errandbit_settings::Settings;

use crate::api::router;
use crate::service::PaymentService;
use crate::{DaemonError, Result};

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub listen_addr: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
        }
    }
}

impl HttpConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            listen_addr: settings.server.listen_addr.clone(),
        }
    }
}

/// HTTP server
pub struct HttpServer {
    config: HttpConfig,
    shutdown_tx: Option<mpsc::Sender<()>>,
}

impl HttpServer {
    pub fn new(config: HttpConfig) -> Self {
        Self {
            config,
            shutdown_tx: None,
        }
    }

    /// Serve until [`stop`](Self::stop) is called
    pub async fn start(&mut self, service: Arc<PaymentService>) -> Result<()> {
        let listener = TcpListener::bind(&self.config.listen_addr)
            .await
            .map_err(|e| {
                DaemonError::Server(format!(
                    "Failed to bind {}: {}",
                    self.config.listen_addr, e
                ))
            })?;
        self.serve(listener, service).await
    }

    /// Serve on an already bound listener
    pub async fn serve(&mut self, listener: TcpListener, service: Arc<PaymentService>) -> Result<()> {
        info!("HTTP server listening on {}", listener.local_addr()?);

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        self.shutdown_tx = Some(shutdown_tx);

        axum::serve(listener, router(service))
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        info!("HTTP server stopped");
        Ok(())
    }

    /// Stop the server
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
    }

    pub fn listen_addr(&self) -> &str {
        &self.config.listen_addr
    }
}

/// Monitor cycle, expiry sweep and guard purge
pub struct BackgroundTasks {
    tasks: Vec<PeriodicTask>,
}

impl BackgroundTasks {
    pub fn start(service: &PaymentService, settings: &Settings) -> Self {
        let mut tasks = Vec::new();

        if settings.monitoring.enabled {
            let monitor = service.monitor();
            tasks.push(PeriodicTask::start(
                "payment-monitor",
                period(settings.monitoring.interval_secs),
                move || {
                    let monitor = monitor.clone();
                    async move {
                        match monitor.run_cycle().await {
                            Ok(report) if !report.is_healthy() => {
                                warn!("Payment monitor raised {} alert(s)", report.alerts.len())
                            }
                            Ok(_) => {}
                            Err(e) => error!("Payment monitor cycle failed: {}", e),
                        }
                    }
                },
            ));

            let monitor = service.monitor();
            tasks.push(PeriodicTask::start(
                "expiry-sweep",
                period(settings.monitoring.cleanup_interval_secs),
                move || {
                    let monitor = monitor.clone();
                    async move {
                        if let Err(e) = monitor.sweep_expired() {
                            error!("Expiry sweep failed: {}", e);
                        }
                    }
                },
            ));
        } else {
            info!("Payment monitoring disabled");
        }

        let guard = service.guard();
        tasks.push(PeriodicTask::start(
            "guard-purge",
            period(settings.guard.purge_interval_secs),
            move || {
                let guard = guard.clone();
                async move {
                    guard.purge();
                }
            },
        ));

        Self { tasks }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub async fn stop(&mut self) {
        for task in &mut self.tasks {
            task.stop().await;
        }
        self.tasks.clear();
    }
}

fn period(secs: u64) -> Duration {
    Duration::from_secs(secs.max(1))
}
