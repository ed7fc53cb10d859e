//! Heartbeat service: periodically pings WebSocket connections and prunes dead ones.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::broadcast::Hub;
use crate::services::manager::{Service, ServiceHealth};

pub struct HeartbeatService {
    hub: Arc<Hub>,
    interval: Duration,
    join_handle: RwLock<Option<JoinHandle<()>>>,
    shutdown_tx: RwLock<Option<broadcast::Sender<()>>>,
}

impl HeartbeatService {
    pub fn new(hub: Arc<Hub>, interval: Duration) -> Self {
        Self {
            hub,
            interval,
            join_handle: RwLock::new(None),
            shutdown_tx: RwLock::new(None),
        }
    }
}

#[async_trait]
impl Service for HeartbeatService {
    fn name(&self) -> &str {
        "heartbeat"
    }

    async fn start(&self) -> Result<()> {
        if self.join_handle.read().is_some() {
            return Ok(());
        }

        let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);
        let hub = self.hub.clone();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let join = tokio::spawn(async move {
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = hub.heartbeat();
                        debug!(
                            service = "heartbeat",
                            pinged = report.pinged,
                            pruned = report.pruned,
                            "Heartbeat sweep"
                        );
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });

        *self.join_handle.write() = Some(join);
        *self.shutdown_tx.write() = Some(shutdown_tx);
        info!(
            service = "heartbeat",
            interval_secs = self.interval.as_secs(),
            "Heartbeat service started"
        );
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let tx = self.shutdown_tx.write().take();
        let handle = self.join_handle.write().take();
        drop(tx);
        if let Some(h) = handle {
            let _ = h.await;
        }
        info!(service = "heartbeat", "Heartbeat service stopped");
        Ok(())
    }

    async fn health(&self) -> Result<ServiceHealth> {
        match self.join_handle.read().as_ref() {
            Some(h) if !h.is_finished() => Ok(ServiceHealth::healthy()),
            Some(_) => Ok(ServiceHealth::degraded("heartbeat task exited")),
            None => Ok(ServiceHealth::unhealthy("heartbeat task not running")),
        }
    }
}
