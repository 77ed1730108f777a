// Error types for the clap watch core
//
// This module defines custom error types for the audio pipeline and the
// notification path, providing structured error handling with numeric
// codes suitable for host applications.

mod notify;
mod pipeline;

pub use notify::{log_notify_error, NotifyError, NotifyErrorCodes};
pub use pipeline::{log_pipeline_error, PipelineError, PipelineErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling across
/// host boundaries.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
