//! Usage: HTTP server lifecycle (bind, serve with graceful shutdown, stop).

use std::net::SocketAddr;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::listen;
use super::routes::build_router;
use crate::app::app_state::AppState;
use crate::shared::error::AppResult;

struct RunningServer {
    bind_addr: SocketAddr,
    base_url: String,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerStatus {
    pub running: bool,
    pub port: Option<u16>,
    pub base_url: Option<String>,
}

#[derive(Default)]
pub struct ServerManager {
    running: Option<RunningServer>,
}

impl ServerManager {
    pub fn status(&self) -> ServerStatus {
        match &self.running {
            Some(r) => ServerStatus {
                running: true,
                port: Some(r.bind_addr.port()),
                base_url: Some(r.base_url.clone()),
            },
            None => ServerStatus {
                running: false,
                port: None,
                base_url: None,
            },
        }
    }

    pub(crate) async fn start(&mut self, state: AppState) -> AppResult<ServerStatus> {
        if self.running.is_some() {
            return Ok(self.status());
        }

        let parsed = listen::parse_listen_address(&state.config.listen_address)
            .map_err(|e| format!("CONFIG_INVALID: {e}"))?;
        let listener = tokio::net::TcpListener::bind((parsed.host.as_str(), parsed.port))
            .await
            .map_err(|e| {
                format!(
                    "SYSTEM_ERROR: failed to bind {}: {e}",
                    parsed.to_bind_string()
                )
            })?;
        let bind_addr = listener
            .local_addr()
            .map_err(|e| format!("SYSTEM_ERROR: failed to read bound address: {e}"))?;

        let base_host = if listen::is_wildcard_host(&parsed.host) {
            "127.0.0.1".to_string()
        } else {
            parsed.host.clone()
        };
        let base_url = format!(
            "http://{}",
            listen::format_host_port(&base_host, bind_addr.port())
        );

        let app = build_router(state)?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });

            if let Err(err) = serve.await {
                tracing::error!(bind_addr = %bind_addr, "http server error: {}", err);
            }
        });

        tracing::info!(bind_addr = %bind_addr, base_url = %base_url, "http server listening");
        self.running = Some(RunningServer {
            bind_addr,
            base_url,
            shutdown: shutdown_tx,
            task,
        });

        Ok(self.status())
    }

    /// Signals graceful shutdown and waits for in-flight requests to finish.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        let _ = running.shutdown.send(());
        if let Err(err) = running.task.await {
            tracing::warn!("http server task ended abnormally: {}", err);
        }
        tracing::info!(bind_addr = %running.bind_addr, "http server stopped");
    }
}
