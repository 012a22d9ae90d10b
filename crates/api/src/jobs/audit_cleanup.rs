//! Delivery audit retention background job.
//!
//! Deletes delivery audit rows older than the configured retention period.
//! Dispatch jobs themselves are kept.

use chrono::Utc;
use domain::repositories::DispatchRepository;
use std::sync::Arc;
use tracing::info;

use super::scheduler::{Job, JobFrequency};

/// Background job to purge old delivery audit rows.
pub struct AuditCleanupJob {
    jobs: Arc<dyn DispatchRepository>,
    retention_days: u32,
}

impl AuditCleanupJob {
    /// Create a new audit cleanup job.
    ///
    /// # Arguments
    /// * `jobs` - Dispatch repository owning the audit trail
    /// * `retention_days` - Number of days to retain audit rows
    pub fn new(jobs: Arc<dyn DispatchRepository>, retention_days: u32) -> Self {
        Self {
            jobs,
            retention_days,
        }
    }
}

#[async_trait::async_trait]
impl Job for AuditCleanupJob {
    fn name(&self) -> &'static str {
        "audit_cleanup"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Daily
    }

    async fn execute(&self) -> Result<(), String> {
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(self.retention_days));

        let deleted = self
            .jobs
            .purge_audit_before(cutoff)
            .await
            .map_err(|e| format!("Failed to purge delivery audit: {}", e))?;

        info!(
            deleted = deleted,
            retention_days = self.retention_days,
            "Purged old delivery audit rows"
        );

        Ok(())
    }
}
