use std::sync::{Arc, Mutex, MutexGuard};

use chrono::NaiveDateTime;
use rusqlite::Connection;

use crate::clock::Clock;
use crate::config::AppConfig;
use crate::errors::AppError;
use crate::services::gateway::GatewayFactory;
use crate::services::messaging::MessagingProvider;

pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: AppConfig,
    pub messaging: Arc<dyn MessagingProvider>,
    pub gateways: Box<dyn GatewayFactory>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn db(&self) -> Result<MutexGuard<'_, Connection>, AppError> {
        self.db
            .lock()
            .map_err(|_| AppError::Internal(anyhow::anyhow!("database mutex poisoned")))
    }

    /// UTC timestamp used for `created_at`/`updated_at` columns.
    pub fn now_utc(&self) -> NaiveDateTime {
        self.clock.now().naive_utc()
    }
}
