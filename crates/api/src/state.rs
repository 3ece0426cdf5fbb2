use chrono::{DateTime, Utc};
use mtbridge_service::ConnectionService;
use std::sync::Arc;

/// Shared application state accessible by all route handlers.
pub struct AppState {
    pub service: Arc<ConnectionService>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(service: Arc<ConnectionService>) -> Self {
        Self {
            service,
            started_at: Utc::now(),
        }
    }
}
