//! Long-running services and their lifecycle

pub mod database;
pub mod heartbeat;
pub mod http_server;
pub mod manager;

pub use database::DatabaseService;
pub use heartbeat::HeartbeatService;
pub use http_server::HttpServerService;
pub use manager::{HealthStatus, Service, ServiceHealth, ServicesManager};
