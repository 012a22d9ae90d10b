//! Dispatch worker pool.
//!
//! Workers sleep until a committed mutation signals the queue or the poll
//! interval passes, then claim and deliver due jobs one at a time. Polling
//! picks up jobs whose signal was lost, retries that became due, and leases
//! that expired on a crashed worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use domain::models::CorrelationKey;
use domain::services::{DispatchQueue, Dispatcher, EnqueueError};
use tokio::sync::{watch, Notify};
use tracing::{debug, info, warn};

use super::scheduler::JobScheduler;
use crate::config::DispatchConfig;

/// In-process queue that wakes idle dispatch workers.
///
/// Jobs are already durable when they are enqueued, so the queue carries no
/// payload; a signal only shortens the wait for the next claim.
#[derive(Debug, Default)]
pub struct NotifyQueue {
    notify: Notify,
    closed: AtomicBool,
}

impl NotifyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects further signals, used once shutdown has begun.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    async fn notified(&self) {
        self.notify.notified().await
    }
}

impl DispatchQueue for NotifyQueue {
    fn enqueue(&self, key: &CorrelationKey) -> Result<(), EnqueueError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EnqueueError::Closed);
        }
        debug!(correlation_key = %key, "Waking dispatch worker");
        self.notify.notify_one();
        Ok(())
    }
}

/// Pool of dispatch workers sharing one dispatcher.
pub struct DispatchWorkerPool {
    dispatcher: Arc<Dispatcher>,
    queue: Arc<NotifyQueue>,
    workers: usize,
    batch_size: i64,
    poll_interval: Duration,
    lease: chrono::Duration,
}

impl DispatchWorkerPool {
    pub fn new(dispatcher: Arc<Dispatcher>, queue: Arc<NotifyQueue>, config: &DispatchConfig) -> Self {
        Self {
            dispatcher,
            queue,
            workers: config.workers.max(1),
            batch_size: config.batch_size.max(1),
            poll_interval: config.poll_interval(),
            lease: config.lease(),
        }
    }

    /// Spawns the workers on the scheduler; they stop with it.
    pub fn start(self, scheduler: &mut JobScheduler) {
        info!(workers = self.workers, batch_size = self.batch_size, "Starting dispatch workers");
        for worker in 0..self.workers {
            let dispatcher = Arc::clone(&self.dispatcher);
            let queue = Arc::clone(&self.queue);
            let batch_size = self.batch_size;
            let poll_interval = self.poll_interval;
            let lease = self.lease;
            scheduler.spawn_service("dispatch_worker", move |shutdown| {
                run_worker(worker, dispatcher, queue, batch_size, poll_interval, lease, shutdown)
            });
        }
    }
}

/// Delivers due jobs until a claim comes back short of a full batch.
async fn drain(dispatcher: &Dispatcher, worker: usize, batch_size: i64, lease: chrono::Duration) {
    loop {
        match dispatcher.deliver_due(batch_size, lease).await {
            Ok(claimed) if (claimed as i64) < batch_size => break,
            Ok(_) => continue,
            Err(e) => {
                warn!(worker = worker, error = %e, "Failed to claim dispatch jobs");
                break;
            }
        }
    }
}

async fn run_worker(
    worker: usize,
    dispatcher: Arc<Dispatcher>,
    queue: Arc<NotifyQueue>,
    batch_size: i64,
    poll_interval: Duration,
    lease: chrono::Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(worker = worker, "Dispatch worker started");
    loop {
        if *shutdown.borrow() {
            break;
        }

        drain(&dispatcher, worker, batch_size, lease).await;

        tokio::select! {
            _ = queue.notified() => {}
            _ = tokio::time::sleep(poll_interval) => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    info!(worker = worker, "Dispatch worker shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::models::{DispatchKind, DispatchStatus, Identity, NewEvent};
    use domain::repositories::{EventRepository, InMemoryStore};
    use domain::services::{
        DispatcherSettings, InvitationManager, MessageTemplates, MockMailTransport,
    };
    use uuid::Uuid;

    fn dispatch_config() -> DispatchConfig {
        DispatchConfig {
            workers: 2,
            batch_size: 5,
            poll_interval_secs: 60,
            lease_secs: 30,
            ..DispatchConfig::default()
        }
    }

    #[test]
    fn test_closed_queue_rejects_signals() {
        let queue = NotifyQueue::new();
        let key = CorrelationKey::new(DispatchKind::InvitationCreated, Uuid::new_v4());
        assert!(queue.enqueue(&key).is_ok());
        queue.close();
        assert!(matches!(queue.enqueue(&key), Err(EnqueueError::Closed)));
    }

    #[tokio::test]
    async fn test_signal_wakes_worker_before_poll_interval() {
        let store = Arc::new(InMemoryStore::new());
        let mail = Arc::new(MockMailTransport::new());
        let queue = Arc::new(NotifyQueue::new());
        let dispatcher = Arc::new(Dispatcher::new(
            store.clone(),
            store.clone(),
            store.clone(),
            mail.clone(),
            MessageTemplates::default(),
            DispatcherSettings::default(),
        ));

        let mut scheduler = JobScheduler::new();
        DispatchWorkerPool::new(dispatcher, queue.clone(), &dispatch_config())
            .start(&mut scheduler);
        // Let the workers finish their initial drain and go idle.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let host = Identity::new(Uuid::new_v4(), "host@example.com");
        let event = store
            .create_event(NewEvent {
                title: "Movie Night".to_string(),
                description: String::new(),
                scheduled_at: chrono::Utc::now(),
                location: "Home".to_string(),
                host_id: host.user_id,
                host_email: host.email.clone(),
            })
            .await
            .unwrap();
        let manager = InvitationManager::new(store.clone(), store.clone(), store.clone(), queue.clone());
        manager
            .create(event.id, &host, "guest@example.com")
            .await
            .unwrap();

        let mut delivered = false;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if store
                .jobs()
                .iter()
                .all(|j| j.status == DispatchStatus::Delivered)
            {
                delivered = true;
                break;
            }
        }

        queue.close();
        scheduler.shutdown();
        scheduler.wait_for_shutdown(Duration::from_secs(2)).await;

        assert!(delivered, "worker was not woken by the enqueue signal");
        assert_eq!(mail.delivered().len(), 1);
        assert_eq!(mail.delivered()[0].to, "guest@example.com");
    }
}
