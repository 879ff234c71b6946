//! Periodic rotation scheduler.
//!
//! Drives the rotation pipeline on a fixed interval. A failing tick is
//! logged and skipped; the next tick fires on schedule regardless.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::RngExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, RotationSource};
use crate::rotation::Rotator;

pub struct Scheduler {
    rotator: Arc<Rotator>,
    interval: Duration,
    source: RotationSource,
    enabled: bool,
    task: Option<JoinHandle<()>>,
    cancel: CancellationToken,
    next_rotation: watch::Sender<Option<DateTime<Utc>>>,
}

impl Scheduler {
    pub fn new(rotator: Arc<Rotator>, config: &EngineConfig) -> Self {
        let (next_rotation, _) = watch::channel(None);
        Self {
            rotator,
            interval: config.scheduler_interval(),
            source: config.rotation_source,
            enabled: config.scheduler_enabled,
            task: None,
            cancel: CancellationToken::new(),
            next_rotation,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Observe the scheduled time of the next automatic rotation. `None`
    /// while the scheduler is stopped.
    pub fn subscribe_next_rotation(&self) -> watch::Receiver<Option<DateTime<Utc>>> {
        self.next_rotation.subscribe()
    }

    /// Start the periodic loop. A running loop is restarted so interval and
    /// source changes take effect immediately.
    pub fn start(&mut self) {
        self.stop();
        if !self.enabled {
            debug!("scheduler disabled, not starting");
            return;
        }

        let rotator = Arc::clone(&self.rotator);
        let interval = self.interval;
        let source = self.source;
        let cancel = self.cancel.child_token();
        let next_rotation = self.next_rotation.clone();

        info!(interval_secs = interval.as_secs(), ?source, "scheduler started");
        self.task = Some(tokio::spawn(async move {
            loop {
                let _ = next_rotation.send(Some(Utc::now() + interval));
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                if let Err(e) = rotate_once(&rotator, source, &cancel).await {
                    warn!(error = %e, "scheduled rotation failed, waiting for next tick");
                }
            }
            let _ = next_rotation.send(None);
        }));
    }

    /// Stop the loop, if any, and clear the published next-rotation time.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        if let Some(task) = self.task.take() {
            task.abort();
            info!("scheduler stopped");
        }
        let _ = self.next_rotation.send(None);
    }

    /// Apply new settings, restarting the loop when it should be running.
    pub fn update(&mut self, enabled: bool, interval: Duration, source: RotationSource) {
        self.enabled = enabled;
        self.interval = interval;
        self.source = source;
        self.start();
    }

    /// Rotate now, outside the periodic schedule. Does not disturb the loop.
    pub async fn force_rotation(&self, source_override: Option<RotationSource>) -> crate::error::Result<()> {
        let source = source_override.unwrap_or(self.source);
        rotate_once(&self.rotator, source, &self.cancel.child_token()).await
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// One scheduled rotation. Picking from an empty history is a logged no-op,
/// not an error; everything else propagates.
async fn rotate_once(
    rotator: &Rotator,
    source: RotationSource,
    cancel: &CancellationToken,
) -> crate::error::Result<()> {
    let identifier = match source {
        RotationSource::Catalog => rotator.catalog().pick_random(cancel).await?,
        RotationSource::History => match pick_from_history(rotator).await {
            Some(identifier) => identifier,
            None => {
                warn!("no cached items to rotate through, skipping");
                return Ok(());
            }
        },
    };

    debug!(identifier = %identifier, ?source, "scheduled rotation picked identifier");
    rotator.set_from_identifier(&identifier, None, cancel).await?;
    Ok(())
}

/// Uniform pick among cached items whose file still exists on disk.
async fn pick_from_history(rotator: &Rotator) -> Option<String> {
    let items: Vec<_> = rotator
        .store()
        .history()
        .await
        .into_iter()
        .filter(|item| item.file_path.exists())
        .collect();
    if items.is_empty() {
        return None;
    }
    let index = rand::rng().random_range(0..items.len());
    Some(items[index].identifier.clone())
}
