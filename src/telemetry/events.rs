//! Telemetry event types describing what the watcher observed and did,
//! exposed to the CLI and to host subscribers.

use serde::{Deserialize, Serialize};

use crate::alarm::AlarmState;
use crate::notify::AlertKind;

/// Why a scheduled or requested alert did not go out.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Recipient list was empty at schedule or fire time
    NoRecipients,
    /// An earlier episode's alert was still waiting out its delay
    CoveredByPending,
    /// No still image could be captured
    SnapshotUnavailable,
}

/// Timestamped telemetry record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SentinelEvent {
    pub timestamp_ms: u64,
    pub kind: SentinelEventKind,
}

/// Kinds of telemetry emitted by the pipeline, arbiter and dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum SentinelEventKind {
    PipelineStarted,
    PipelineStopped,
    Clap {
        level: f32,
        clap_count: usize,
    },
    RhythmVerdict {
        clap_count: usize,
        std_dev_ms: Option<f64>,
        is_rhythmic: bool,
    },
    FearChanged {
        present: bool,
    },
    AlarmChanged {
        from: AlarmState,
        to: AlarmState,
        episode: u64,
    },
    AlertScheduled {
        episode: u64,
        delay_ms: u64,
    },
    AlertSkipped {
        episode: u64,
        reason: SkipReason,
    },
    AlertDelivered {
        kind: AlertKind,
        recipients: usize,
    },
    AlertFailed {
        kind: AlertKind,
        code: i32,
        cause: String,
    },
}
