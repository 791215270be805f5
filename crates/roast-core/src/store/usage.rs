//! Usage Log - best-effort appends and per-user aggregation

use std::sync::Arc;
use tracing::{debug, warn};

use super::UsageBackend;
use crate::error::StoreError;
use crate::types::{UsageEvent, UsageSummary};

/// Append-only usage log over a [`UsageBackend`]
#[derive(Clone)]
pub struct UsageLog {
    backend: Arc<dyn UsageBackend>,
}

impl UsageLog {
    pub fn new(backend: Arc<dyn UsageBackend>) -> Self {
        Self { backend }
    }

    /// Append an event. Failures are logged and swallowed; the return value
    /// only says whether the event made it to storage.
    pub async fn append(&self, event: &UsageEvent) -> bool {
        match self.backend.append(event).await {
            Ok(()) => {
                debug!("Logged usage event for {} ({})", event.user_id, self.backend.name());
                true
            }
            Err(e) => {
                warn!("Usage log append failed for {}: {} - continuing", event.user_id, e);
                false
            }
        }
    }

    /// All events for `user_id` in append order
    pub async fn read_all(&self, user_id: &str) -> Result<Vec<UsageEvent>, StoreError> {
        self.backend.read_all(user_id.trim()).await
    }

    /// Count, success rate and mean latency. A read failure gives the zero summary.
    pub async fn aggregate(&self, user_id: &str) -> UsageSummary {
        match self.read_all(user_id).await {
            Ok(events) => UsageSummary::from_events(&events),
            Err(e) => {
                warn!("Failed to read usage for {}: {} - reporting empty summary", user_id, e);
                UsageSummary::default()
            }
        }
    }
}
