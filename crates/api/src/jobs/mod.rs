//! Background job scheduler and job implementations.

mod audit_cleanup;
mod dispatch_workers;
mod pool_metrics;
mod scheduler;

pub use audit_cleanup::AuditCleanupJob;
pub use dispatch_workers::{DispatchWorkerPool, NotifyQueue};
pub use pool_metrics::PoolMetricsJob;
pub use scheduler::{Job, JobFrequency, JobScheduler};
