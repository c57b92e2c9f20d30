//! Presence tracker
//!
//! Runs one background task per started tracker. The task owns the location
//! subscription and the periodic timer, and makes every report decision, so
//! the distance/timer check and the report that follows are serialized.

use super::geo::PresenceSample;
use super::location::{LocationProvider, PermissionStatus};
use super::throttle::PresenceThrottle;
use crate::api::{LocationUpdate, PresenceApi};
use crate::config::PresenceConfig;
use crate::error::{Result, SyncError};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Outcome of [`PresenceTracker::start`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StartResult {
    fn started() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    fn failed(error: &SyncError) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
        }
    }
}

struct TrackingTask {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Shared by the tracker handle and its background task
struct Reporter {
    api: Arc<dyn PresenceApi>,
    throttle: Mutex<PresenceThrottle>,
    check_nearby: bool,
}

impl Reporter {
    /// Report `sample` unless the throttle suppresses it. Returns whether a
    /// report succeeded.
    async fn offer(&self, sample: PresenceSample, force: bool) -> bool {
        if let Err(e) = sample.validate() {
            warn!(error = %e, "Dropping invalid location sample");
            return false;
        }

        let mut throttle = self.throttle.lock().await;
        let now = Instant::now();
        if !force && !throttle.should_report(&sample, now) {
            debug!("Location change below threshold, report suppressed");
            return false;
        }

        match self.send(&sample).await {
            Ok(()) => {
                throttle.mark_reported(sample, now);
                true
            }
            Err(e) => {
                warn!(error = %e, "Presence report failed");
                false
            }
        }
    }

    async fn send(&self, sample: &PresenceSample) -> Result<()> {
        let update = LocationUpdate {
            latitude: sample.latitude,
            longitude: sample.longitude,
            check_nearby: self.check_nearby,
        };
        self.api.update_location(&update).await?;
        debug!(latitude = sample.latitude, longitude = sample.longitude, "Presence reported");
        Ok(())
    }
}

pub struct PresenceTracker {
    provider: Arc<dyn LocationProvider>,
    reporter: Arc<Reporter>,
    config: PresenceConfig,
    task: Mutex<Option<TrackingTask>>,
}

impl PresenceTracker {
    pub fn new(
        api: Arc<dyn PresenceApi>,
        provider: Arc<dyn LocationProvider>,
        config: PresenceConfig,
    ) -> Self {
        let reporter = Reporter {
            api,
            throttle: Mutex::new(PresenceThrottle::new(
                config.distance_threshold_m,
                // a zero period would make the timer panic
                config.report_interval().max(Duration::from_secs(1)),
            )),
            check_nearby: config.check_nearby,
        };

        Self {
            provider,
            reporter: Arc::new(reporter),
            config,
            task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &PresenceConfig {
        &self.config
    }

    pub async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .map(|t| !t.handle.is_finished())
            .unwrap_or(false)
    }

    pub async fn last_reported(&self) -> Option<PresenceSample> {
        self.reporter.throttle.lock().await.last_reported().cloned()
    }

    /// Start tracking.
    ///
    /// Permission denial or an unavailable platform yields
    /// `StartResult { success: false, .. }` and nothing runs. There is no
    /// retry; call `start` again later. Starting a running tracker is a no-op.
    pub async fn start(&self) -> StartResult {
        let mut task = self.task.lock().await;
        if let Some(ref running) = *task {
            if !running.handle.is_finished() {
                return StartResult::started();
            }
        }

        if let Err(e) = self.ensure_permission().await {
            warn!(error = %e, "Presence tracking not started");
            return StartResult::failed(&e);
        }

        let samples = match self.provider.watch_position().await {
            Ok(rx) => rx,
            Err(e) => {
                warn!(error = %e, "Location subscription failed, presence tracking not started");
                return StartResult::failed(&e);
            }
        };

        match self.provider.current_position().await {
            Ok(sample) => {
                self.reporter.offer(sample, false).await;
            }
            Err(e) => debug!(error = %e, "No initial position, waiting for subscription"),
        }

        let (shutdown, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(run(
            Arc::clone(&self.reporter),
            Arc::clone(&self.provider),
            samples,
            shutdown_rx,
        ));
        *task = Some(TrackingTask { shutdown, handle });

        info!(
            threshold_m = self.config.distance_threshold_m,
            interval_secs = self.config.report_interval_secs,
            "Presence tracking started"
        );
        StartResult::started()
    }

    /// Stop tracking. Safe to call when not started.
    pub async fn stop(&self) {
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            let _ = task.shutdown.send(());
            if let Err(e) = task.handle.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "Presence task ended abnormally");
                }
            }
            info!("Presence tracking stopped");
        }
    }

    /// Report a sample now, bypassing suppression.
    pub async fn report_now(&self, sample: PresenceSample) -> Result<()> {
        sample.validate()?;
        let mut throttle = self.reporter.throttle.lock().await;
        self.reporter.send(&sample).await?;
        throttle.mark_reported(sample, Instant::now());
        Ok(())
    }

    async fn ensure_permission(&self) -> Result<()> {
        let status = match self.provider.permission_status().await? {
            PermissionStatus::Undetermined => self.provider.request_permission().await?,
            status => status,
        };

        match status {
            PermissionStatus::Granted => Ok(()),
            PermissionStatus::Denied => Err(SyncError::Permission("location access denied".into())),
            PermissionStatus::Undetermined => {
                Err(SyncError::Permission("location permission not granted".into()))
            }
        }
    }
}

impl Drop for PresenceTracker {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.handle.abort();
        }
    }
}

async fn run(
    reporter: Arc<Reporter>,
    provider: Arc<dyn LocationProvider>,
    mut samples: mpsc::Receiver<PresenceSample>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let period = reporter.throttle.lock().await.interval();
    let mut timer = tokio::time::interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut latest: Option<PresenceSample> = None;
    let mut subscribed = true;

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            sample = samples.recv(), if subscribed => match sample {
                Some(sample) => match sample.validate() {
                    Ok(()) => {
                        latest = Some(sample.clone());
                        reporter.offer(sample, false).await;
                    }
                    Err(e) => warn!(error = %e, "Dropping invalid location sample"),
                },
                None => {
                    warn!("Location subscription closed, continuing on timer only");
                    subscribed = false;
                }
            },
            _ = timer.tick() => {
                let sample = match latest.clone() {
                    Some(sample) => Some(sample),
                    None => provider.current_position().await.ok(),
                };
                match sample {
                    Some(sample) => {
                        reporter.offer(sample, true).await;
                    }
                    None => debug!("Periodic report skipped, no position available"),
                }
            }
        }
    }
}
