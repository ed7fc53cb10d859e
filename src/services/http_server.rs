//! HTTP server service: binds the Axum app and runs it in a background task.
//!
//! Depends on the database and heartbeat services. The app is built from the
//! [AppState](crate::app::AppState) in [start](Service::start) and served
//! until [stop](Service::stop), which drains in-flight requests.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

use crate::app::{AppState, build_app};
use crate::services::manager::{Service, ServiceHealth};

/// HTTP server service: binds and serves the Axum app in a background task.
pub struct HttpServerService {
    state: AppState,
    /// Address actually bound; set in start().
    local_addr: RwLock<Option<SocketAddr>>,
    join_handle: RwLock<Option<JoinHandle<Result<()>>>>,
    shutdown_tx: RwLock<Option<broadcast::Sender<()>>>,
}

impl HttpServerService {
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            local_addr: RwLock::new(None),
            join_handle: RwLock::new(None),
            shutdown_tx: RwLock::new(None),
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.read()
    }
}

#[async_trait]
impl Service for HttpServerService {
    fn name(&self) -> &str {
        "http"
    }

    fn dependencies(&self) -> Vec<String> {
        vec!["database".to_string(), "heartbeat".to_string()]
    }

    async fn start(&self) -> Result<()> {
        info!(service = "http", "HTTP server service starting");

        let config = &self.state.config;
        let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port))
            .await
            .context("HTTP server: bind failed")?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);
        let app = build_app(self.state.clone());

        let join = tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await
            .context("axum::serve")
        });

        *self.local_addr.write() = Some(addr);
        *self.join_handle.write() = Some(join);
        *self.shutdown_tx.write() = Some(shutdown_tx);

        info!(
            service = "http",
            "Listening on http://{}; GraphQL: http://{}/graphql", addr, addr
        );
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let tx = self.shutdown_tx.write().take();
        let handle = self.join_handle.write().take();
        drop(tx);
        if let Some(h) = handle {
            h.await.context("HTTP server task panicked")??;
        }
        info!(service = "http", "HTTP server service stopped");
        Ok(())
    }

    async fn health(&self) -> Result<ServiceHealth> {
        match self.join_handle.read().as_ref() {
            Some(h) if !h.is_finished() => Ok(ServiceHealth::healthy()),
            Some(_) => Ok(ServiceHealth::unhealthy("server task exited")),
            None => Ok(ServiceHealth::unhealthy("server task not running")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::services::manager::HealthStatus;

    #[tokio::test]
    async fn serves_health_until_stopped() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 0,
            ..Config::default()
        };
        let service = HttpServerService::new(AppState::in_memory(config).await.unwrap());

        service.start().await.unwrap();
        assert_eq!(service.health().await.unwrap().status, HealthStatus::Healthy);
        let addr = service.local_addr().unwrap();

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        stream
            .write_all(b"GET /healthz HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("healthy"));

        service.stop().await.unwrap();
        assert_eq!(service.health().await.unwrap().status, HealthStatus::Unhealthy);
    }
}
