// Audio pipeline error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Pipeline error code constants
///
/// Error code range: 1001-1003
pub struct PipelineErrorCodes {}

impl PipelineErrorCodes {
    /// No audio source could be acquired
    pub const INPUT_UNAVAILABLE: i32 = 1001;

    /// Pipeline is already running
    pub const ALREADY_RUNNING: i32 = 1002;

    /// Pipeline is not running
    pub const NOT_RUNNING: i32 = 1003;
}

/// Log a pipeline error with structured context
///
/// Emits the numeric code, the component and the human-readable message
/// so host logs can be filtered by code.
pub fn log_pipeline_error(err: &PipelineError, context: &str) {
    error!(
        "Pipeline error in {}: code={}, component=AudioPipeline, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Audio pipeline errors
///
/// `InputUnavailable` is fatal for the session: the pipeline never retries
/// on its own, re-acquisition is an explicit `start_audio` call.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// The amplitude source could not be opened
    InputUnavailable { reason: String },

    /// Pipeline is already running
    AlreadyRunning,

    /// Pipeline is not running
    NotRunning,
}

impl ErrorCode for PipelineError {
    fn code(&self) -> i32 {
        match self {
            PipelineError::InputUnavailable { .. } => PipelineErrorCodes::INPUT_UNAVAILABLE,
            PipelineError::AlreadyRunning => PipelineErrorCodes::ALREADY_RUNNING,
            PipelineError::NotRunning => PipelineErrorCodes::NOT_RUNNING,
        }
    }

    fn message(&self) -> String {
        match self {
            PipelineError::InputUnavailable { reason } => {
                format!("Audio input unavailable: {}", reason)
            }
            PipelineError::AlreadyRunning => {
                "Audio pipeline already running. Call stop_audio() first.".to_string()
            }
            PipelineError::NotRunning => {
                "Audio pipeline not running. Call start_audio() first.".to_string()
            }
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PipelineError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for PipelineError {}
