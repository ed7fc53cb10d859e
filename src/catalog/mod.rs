//! Catalog operations
//!
//! Every read and write the API exposes goes through here so REST and
//! GraphQL share one path: admission control, persistence, invalidation,
//! then event publication.

pub mod accounts;
pub mod authors;
pub mod books;
pub mod genres;
pub mod reviews;

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::admission::AdmissionControl;
use crate::auth::Principal;
use crate::broadcast::{DomainEvent, Hub};
use crate::db::Database;
use crate::error::{AppError, AppResult};

pub use accounts::{Accounts, IssuedApiKey, TokenResponse};
pub use books::Book;

#[derive(Clone)]
pub struct Catalog {
    db: Database,
    admission: AdmissionControl,
    hub: Arc<Hub>,
}

impl Catalog {
    pub fn new(db: Database, admission: AdmissionControl, hub: Arc<Hub>) -> Self {
        Self { db, admission, hub }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn admission(&self) -> &AdmissionControl {
        &self.admission
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    fn publish(&self, event: DomainEvent) {
        self.hub.publish(&event);
    }
}

/// Numeric user id carried by an access token.
fn user_id_of(principal: &Principal) -> AppResult<i64> {
    principal
        .user_id
        .parse()
        .map_err(|_| AppError::Unauthorized("Token subject is not a user".into()))
}

fn snapshot<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}
