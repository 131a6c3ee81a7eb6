//! Background service for removing stale workspaces.
//!
//! This service runs periodically to:
//! - Remove job workspaces older than the configured TTL
//! - Remove preview workspaces orphaned by a crash (once, at startup)

use std::time::Duration;

use tokio::time::interval;
use tracing::{error, info};

use openvac_media::{WorkspaceFactory, JOB_PREFIX, PREVIEW_PREFIX};

use crate::metrics;

/// Interval between reaper runs.
const REAP_INTERVAL: Duration = Duration::from_secs(60);

/// Workspace reaper service.
pub struct WorkspaceReaper {
    factory: WorkspaceFactory,
    job_ttl: Duration,
    enabled: bool,
}

impl WorkspaceReaper {
    /// Create a new reaper.
    pub fn new(factory: WorkspaceFactory, job_ttl: Duration, enabled: bool) -> Self {
        Self {
            factory,
            job_ttl,
            enabled,
        }
    }

    /// Start the background reaping loop.
    ///
    /// This function runs indefinitely and should be spawned as a background task.
    pub async fn run(&self) {
        if !self.enabled {
            info!("Workspace reaper is disabled");
            return;
        }

        info!(
            "Starting workspace reaper (interval: {:?}, job ttl: {:?})",
            REAP_INTERVAL, self.job_ttl
        );

        match self.sweep_orphaned_previews().await {
            Ok(0) => {}
            Ok(n) => info!("Removed {} orphaned preview workspaces", n),
            Err(e) => error!("Orphaned preview sweep failed: {}", e),
        }

        let mut ticker = interval(REAP_INTERVAL);

        loop {
            ticker.tick().await;

            if let Err(e) = self.reap_once().await {
                error!("Workspace reaping error: {}", e);
            }
        }
    }

    /// Remove expired job workspaces once. Returns how many were removed.
    pub async fn reap_once(&self) -> anyhow::Result<usize> {
        let removed = self.factory.sweep(JOB_PREFIX, self.job_ttl).await?;
        if removed > 0 {
            info!("Reaped {} expired job workspaces", removed);
            metrics::record_workspaces_reaped("expired", removed);
        }
        Ok(removed)
    }

    /// Remove every preview workspace.
    ///
    /// Previews never outlive their request, so any left on disk at startup
    /// belong to a previous process.
    pub async fn sweep_orphaned_previews(&self) -> anyhow::Result<usize> {
        let removed = self.factory.sweep(PREVIEW_PREFIX, Duration::ZERO).await?;
        if removed > 0 {
            metrics::record_workspaces_reaped("orphaned", removed);
        }
        Ok(removed)
    }
}
