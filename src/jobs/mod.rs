use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{error, info};

pub mod tasks;

/// Job scheduler for background tasks
pub struct JobScheduler {
    context: Arc<crate::context::AppContext>,
}

impl JobScheduler {
    pub fn new(context: Arc<crate::context::AppContext>) -> Self {
        Self { context }
    }

    /// Start all background jobs
    pub fn start(self: Arc<Self>) {
        info!("Starting background job scheduler");

        tokio::spawn(Self::punishment_expiry_job(Arc::clone(&self)));
        tokio::spawn(Self::appeal_expiry_job(Arc::clone(&self)));
        tokio::spawn(Self::audit_retention_job(Arc::clone(&self)));
        tokio::spawn(Self::event_prune_job(Arc::clone(&self)));
        tokio::spawn(Self::health_check_job(Arc::clone(&self)));

        info!("Background jobs started");
    }

    /// Expire stale punishments (runs every 15 minutes)
    async fn punishment_expiry_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(900));

        loop {
            interval.tick().await;

            match tasks::sweep_expired_punishments(&scheduler.context).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Expired {} stale punishments", count);
                    }
                }
                Err(e) => error!("Failed to sweep expired punishments: {}", e),
            }
        }
    }

    /// Expire unanswered appeals (runs every 6 hours)
    async fn appeal_expiry_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(21600));

        loop {
            interval.tick().await;

            match tasks::expire_stale_appeals(&scheduler.context).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Expired {} stale appeals", count);
                    }
                }
                Err(e) => error!("Failed to expire stale appeals: {}", e),
            }
        }
    }

    /// Audit retention cleanup (runs daily)
    async fn audit_retention_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(86400));

        loop {
            interval.tick().await;
            info!("Running audit retention cleanup");

            match tasks::cleanup_audit_log(&scheduler.context).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Removed {} audit entries past retention", count);
                    } else {
                        info!("Audit cleanup: nothing past retention");
                    }
                }
                Err(e) => error!("Failed to cleanup audit log: {}", e),
            }
        }
    }

    /// Prune old channel events (runs every 6 hours)
    async fn event_prune_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(21600));

        loop {
            interval.tick().await;

            match tasks::prune_channel_events(&scheduler.context).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Pruned {} old channel events", count);
                    }
                }
                Err(e) => error!("Failed to prune channel events: {}", e),
            }
        }
    }

    /// Health check job (runs every 5 minutes)
    async fn health_check_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(300));

        loop {
            interval.tick().await;

            if let Err(e) = tasks::health_check(&scheduler.context).await {
                error!("Health check failed: {}", e);
            }
        }
    }
}
