//! Database service: wraps the SQLite pool for lifecycle (start/stop/health).
//!
//! Services that need the database should declare `dependencies: ["database"]`.

use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

use crate::db::Database;
use crate::services::manager::{Service, ServiceHealth};

/// Service that owns the database pool. Register it so that services
/// depending on `"database"` start after it.
pub struct DatabaseService {
    db: Database,
}

impl DatabaseService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Service for DatabaseService {
    fn name(&self) -> &str {
        "database"
    }

    async fn start(&self) -> Result<()> {
        info!(service = "database", "Database service starting");
        self.db.ping().await?;
        self.db.ensure_schema().await?;
        info!(service = "database", "Schema ensured");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.db.pool().close().await;
        info!(service = "database", "Database service stopped");
        Ok(())
    }

    async fn health(&self) -> Result<ServiceHealth> {
        match self.db.ping().await {
            Ok(()) => Ok(ServiceHealth::healthy()),
            Err(e) => {
                warn!(service = "database", error = %e, "Health check failed");
                Ok(ServiceHealth::unhealthy(e.to_string()))
            }
        }
    }
}
