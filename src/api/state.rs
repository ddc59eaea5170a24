use chrono::{DateTime, Utc};

use crate::services::ClassifierService;

/// Shared application state for API handlers
#[derive(Clone)]
pub struct AppState {
    /// Prediction/training front of the parameter store
    pub classifier: ClassifierService,

    /// Application start time
    pub start_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(classifier: ClassifierService) -> Self {
        Self {
            classifier,
            start_time: Utc::now(),
        }
    }

    /// Get system uptime in seconds
    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.start_time).num_seconds()
    }
}
