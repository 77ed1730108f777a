//! SentinelHandle: orchestration layer for the clap watcher.
//!
//! Owns configuration, telemetry, the recipient list and dispatcher, the
//! alarm arbiter and the running audio pipeline, and exposes them to hosts
//! (the CLI, embedding applications, tests) through one async API.

use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};

use crate::alarm::{AlarmArbiter, AlarmStatus, AlertDispatcher};
use crate::analysis::DetectionUpdate;
use crate::config::AppConfig;
use crate::engine::backend::{AmplitudeSource, SystemTimeSource, TimeSource};
use crate::engine::pipeline::{PipelineContext, RunningPipeline};
use crate::error::{log_pipeline_error, NotifyError, PipelineError};
use crate::notify::{Notifier, SnapshotProvider};
use crate::telemetry::TelemetryCollector;

#[path = "core_subscriptions.rs"]
mod core_subscriptions;

const DETECTION_CHANNEL_CAPACITY: usize = 256;

/// SentinelHandle wires detection, arbitration and delivery together.
pub struct SentinelHandle {
    config: AppConfig,
    time: Arc<dyn TimeSource>,
    telemetry: Arc<TelemetryCollector>,
    dispatcher: Arc<AlertDispatcher>,
    arbiter: AlarmArbiter,
    detection_tx: broadcast::Sender<DetectionUpdate>,
    pipeline: Mutex<Option<RunningPipeline>>,
}

impl SentinelHandle {
    /// Create a handle on tokio's clock.
    pub fn new(
        config: AppConfig,
        notifier: Arc<dyn Notifier>,
        snapshots: Arc<dyn SnapshotProvider>,
    ) -> Self {
        Self::with_time_source(config, notifier, snapshots, Arc::new(SystemTimeSource::new()))
    }

    pub fn with_time_source(
        config: AppConfig,
        notifier: Arc<dyn Notifier>,
        snapshots: Arc<dyn SnapshotProvider>,
        time: Arc<dyn TimeSource>,
    ) -> Self {
        let telemetry = Arc::new(TelemetryCollector::default());
        let dispatcher = Arc::new(AlertDispatcher::new(
            &config.notification,
            notifier,
            snapshots,
            Arc::clone(&time),
            Arc::clone(&telemetry),
        ));
        let arbiter = AlarmArbiter::new(
            &config.alarm,
            Arc::clone(&dispatcher),
            Arc::clone(&time),
            Arc::clone(&telemetry),
        );
        let (detection_tx, _) = broadcast::channel(DETECTION_CHANNEL_CAPACITY);

        Self {
            config,
            time,
            telemetry,
            dispatcher,
            arbiter,
            detection_tx,
            pipeline: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Milliseconds on the handle's clock
    pub fn now_ms(&self) -> u64 {
        self.time.now_ms()
    }

    // ========================================================================
    // AUDIO PIPELINE
    // ========================================================================

    /// Acquire `source` and start detection.
    ///
    /// `InputUnavailable` ends the attempt; the handle stays stopped and a
    /// later call may try again with another source.
    pub async fn start_audio(&self, source: Box<dyn AmplitudeSource>) -> Result<(), PipelineError> {
        let mut pipeline = self.pipeline.lock().await;
        if pipeline.is_some() {
            return Err(PipelineError::AlreadyRunning);
        }

        let ctx = PipelineContext {
            time: Arc::clone(&self.time),
            telemetry: Arc::clone(&self.telemetry),
            updates: self.detection_tx.clone(),
            arbiter: self.arbiter.clone(),
        };
        let running = RunningPipeline::spawn(&self.config, source, ctx).map_err(|err| {
            log_pipeline_error(&err, "start_audio");
            err
        })?;
        *pipeline = Some(running);
        Ok(())
    }

    /// Stop detection and release the source.
    pub async fn stop_audio(&self) -> Result<(), PipelineError> {
        let running = self
            .pipeline
            .lock()
            .await
            .take()
            .ok_or(PipelineError::NotRunning)?;
        running.stop().await;
        // Flag timers died with the session; the arbiter must not keep a stale true
        self.arbiter.set_rhythmic(false);
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.pipeline.lock().await.is_some()
    }

    // ========================================================================
    // ALARM INPUTS
    // ========================================================================

    /// Feed the external fear signal.
    pub fn set_fear(&self, present: bool) -> AlarmStatus {
        self.arbiter.set_fear(present)
    }

    pub fn alarm_status(&self) -> AlarmStatus {
        self.arbiter.status()
    }

    // ========================================================================
    // RECIPIENTS & NOTIFICATIONS
    // ========================================================================

    pub fn add_recipient(&self, address: &str) -> Result<(), NotifyError> {
        self.dispatcher.add_recipient(address)?;
        self.arbiter.recipients_changed();
        Ok(())
    }

    pub fn remove_recipient(&self, address: &str) -> bool {
        self.dispatcher.remove_recipient(address)
    }

    pub fn recipients(&self) -> Vec<String> {
        self.dispatcher.recipients()
    }

    /// User-requested screenshot e-mail, subject to the cooldown.
    pub async fn send_manual(&self) -> Result<(), NotifyError> {
        self.dispatcher.send_manual().await
    }

    pub fn manual_retry_after_ms(&self) -> Option<u64> {
        self.dispatcher.manual_retry_after_ms()
    }

    pub fn telemetry(&self) -> Arc<TelemetryCollector> {
        Arc::clone(&self.telemetry)
    }

    /// Stop the pipeline if running and cancel every pending timer.
    pub async fn shutdown(&self) {
        match self.stop_audio().await {
            Ok(()) | Err(PipelineError::NotRunning) => {}
            Err(err) => log_pipeline_error(&err, "shutdown"),
        }
        self.arbiter.shutdown();
        tracing::info!("[SentinelHandle] Shut down");
    }
}
