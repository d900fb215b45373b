use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info};

pub mod tasks;

/// How often orphaned staging files are looked for
const STAGING_CLEANUP_INTERVAL_SECS: u64 = 900;

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

        tokio::spawn(Self::rate_limit_sweep_job(Arc::clone(&self)));
        tokio::spawn(Self::staging_cleanup_job(Arc::clone(&self)));

        info!("Background jobs started");
    }

    /// Evict expired rate-limit windows (runs every `sweep_interval_secs`)
    async fn rate_limit_sweep_job(scheduler: Arc<Self>) {
        let period = Duration::from_secs(scheduler.context.config.rate_limit.sweep_interval_secs.max(1));
        let mut interval = interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            let removed = tasks::sweep_rate_limits(&scheduler.context);
            if removed > 0 {
                debug!("Rate limit sweep removed {} stale entries", removed);
            }
        }
    }

    /// Remove staging files left behind by interrupted uploads (runs every 15 minutes)
    async fn staging_cleanup_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(STAGING_CLEANUP_INTERVAL_SECS));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            match tasks::cleanup_staging_files(&scheduler.context).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Cleaned up {} orphaned staging files", count);
                    }
                }
                Err(e) => error!("Failed to cleanup staging files: {}", e),
            }
        }
    }
}
