//! Retention Sweeper
//!
//! Background task deleting conversations that have not been updated within
//! the configured number of days.

use crate::configuration::{get_configuration, RetentionSettings};
use crate::store::RecordStore;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Source of the retention threshold, consulted at the start of every run.
#[async_trait]
pub trait RetentionPolicy: Send + Sync {
    /// `None` keeps conversations forever.
    async fn max_age_days(&self) -> Result<Option<u32>, config::ConfigError>;
}

/// Fixed threshold.
pub struct FixedPolicy(pub Option<u32>);

#[async_trait]
impl RetentionPolicy for FixedPolicy {
    async fn max_age_days(&self) -> Result<Option<u32>, config::ConfigError> {
        Ok(self.0)
    }
}

/// Re-reads the configuration sources on every run so the threshold can be
/// changed without a restart.
pub struct ConfigurationPolicy;

#[async_trait]
impl RetentionPolicy for ConfigurationPolicy {
    async fn max_age_days(&self) -> Result<Option<u32>, config::ConfigError> {
        // file and .env reads block
        let settings = tokio::task::spawn_blocking(get_configuration)
            .await
            .map_err(|err| config::ConfigError::Message(err.to_string()))??;
        Ok(settings.retention.max_age_days)
    }
}

#[derive(Clone)]
pub struct RetentionSweeper {
    store: RecordStore,
    policy: Arc<dyn RetentionPolicy>,
    interval: Duration,
    retry_interval: Duration,
}

impl RetentionSweeper {
    pub fn new(
        store: RecordStore,
        policy: Arc<dyn RetentionPolicy>,
        settings: &RetentionSettings,
    ) -> Self {
        Self {
            store,
            policy,
            interval: settings.cleanup_interval(),
            retry_interval: settings.retry_interval(),
        }
    }

    /// Deletes every conversation idle for longer than `max_age_days` and
    /// returns how many were removed. Failures on single conversations are
    /// logged and skipped.
    #[tracing::instrument(name = "Retention sweep", skip(self))]
    pub async fn run_once(&self, max_age_days: Option<u32>) -> usize {
        let Some(days) = max_age_days else {
            tracing::debug!("No retention threshold configured");
            return 0;
        };
        let Some(cutoff) = Utc::now().checked_sub_signed(ChronoDuration::days(i64::from(days)))
        else {
            return 0;
        };

        let candidates = self.store.conversations_updated_before(cutoff).await;
        let mut deleted = 0;
        for id in candidates {
            match self.store.delete_conversation_if_updated_before(id, cutoff).await {
                Ok(true) => deleted += 1,
                // removed or touched since listing
                Ok(false) => {}
                Err(err) => {
                    tracing::error!(conversation_id = %id, "Failed to delete expired conversation: {}", err);
                }
            }
        }

        tracing::info!(deleted, %cutoff, "Retention sweep finished");
        deleted
    }

    /// One run with the threshold currently returned by the policy.
    pub async fn sweep(&self) -> Result<usize, config::ConfigError> {
        let max_age_days = self.policy.max_age_days().await?;
        Ok(self.run_once(max_age_days).await)
    }

    /// Sweeps immediately, then once per interval until `shutdown` fires.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(interval_secs = self.interval.as_secs(), "Retention sweeper started");
            while !shutdown.is_cancelled() {
                let delay = match self.sweep().await {
                    Ok(_) => self.interval,
                    Err(err) => {
                        tracing::error!("Retention policy unavailable, sweep skipped: {}", err);
                        self.retry_interval
                    }
                };

                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            tracing::info!("Retention sweeper stopped");
        })
    }
}
