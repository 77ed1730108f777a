// Notification error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Notification error code constants
///
/// Error code range: 2001-2007
pub struct NotifyErrorCodes {}

impl NotifyErrorCodes {
    /// No recipients are configured
    pub const EMPTY_RECIPIENTS: i32 = 2001;

    /// Manual send cooldown has not elapsed
    pub const COOLDOWN_ACTIVE: i32 = 2002;

    /// The transport reported a failure
    pub const DELIVERY_FAILURE: i32 = 2003;

    /// Recipient address failed validation
    pub const INVALID_RECIPIENT: i32 = 2004;

    /// Recipient address already on the list
    pub const DUPLICATE_RECIPIENT: i32 = 2005;

    /// No still image could be captured
    pub const SNAPSHOT_UNAVAILABLE: i32 = 2006;

    /// Another manual send is still in flight
    pub const SEND_IN_PROGRESS: i32 = 2007;
}

/// Log a notification error with structured context
pub fn log_notify_error(err: &NotifyError, context: &str) {
    error!(
        "Notify error in {}: code={}, component=AlertDispatcher, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Notification errors
///
/// Everything except `DeliveryFailure` and `SnapshotUnavailable` is an
/// expected, user-facing denial that clears once the condition changes.
#[derive(Debug, Clone, PartialEq)]
pub enum NotifyError {
    /// No recipients are configured
    EmptyRecipients,

    /// Manual send cooldown has not elapsed
    CooldownActive { retry_after_ms: u64 },

    /// The transport reported a failure
    DeliveryFailure { cause: String },

    /// Recipient address failed validation
    InvalidRecipient { address: String },

    /// Recipient address already on the list
    DuplicateRecipient { address: String },

    /// No still image could be captured
    SnapshotUnavailable { reason: String },

    /// Another manual send is still in flight
    SendInProgress,
}

impl NotifyError {
    /// Whether this is an expected denial rather than a failure
    pub fn is_user_facing(&self) -> bool {
        !matches!(
            self,
            NotifyError::DeliveryFailure { .. } | NotifyError::SnapshotUnavailable { .. }
        )
    }

    /// Wrap a transport error
    pub fn delivery(err: &anyhow::Error) -> Self {
        NotifyError::DeliveryFailure {
            cause: format!("{:#}", err),
        }
    }
}

impl ErrorCode for NotifyError {
    fn code(&self) -> i32 {
        match self {
            NotifyError::EmptyRecipients => NotifyErrorCodes::EMPTY_RECIPIENTS,
            NotifyError::CooldownActive { .. } => NotifyErrorCodes::COOLDOWN_ACTIVE,
            NotifyError::DeliveryFailure { .. } => NotifyErrorCodes::DELIVERY_FAILURE,
            NotifyError::InvalidRecipient { .. } => NotifyErrorCodes::INVALID_RECIPIENT,
            NotifyError::DuplicateRecipient { .. } => NotifyErrorCodes::DUPLICATE_RECIPIENT,
            NotifyError::SnapshotUnavailable { .. } => NotifyErrorCodes::SNAPSHOT_UNAVAILABLE,
            NotifyError::SendInProgress => NotifyErrorCodes::SEND_IN_PROGRESS,
        }
    }

    fn message(&self) -> String {
        match self {
            NotifyError::EmptyRecipients => "no email recipients added.".to_string(),
            NotifyError::CooldownActive { retry_after_ms } => format!(
                "please wait {} seconds before sending another email.",
                retry_after_ms.div_ceil(1000)
            ),
            NotifyError::DeliveryFailure { cause } => format!("delivery failed: {}", cause),
            NotifyError::InvalidRecipient { address } if address.trim().is_empty() => {
                "email cannot be empty.".to_string()
            }
            NotifyError::InvalidRecipient { address } => {
                format!("please enter a valid email address (got {}).", address)
            }
            NotifyError::DuplicateRecipient { address } => {
                format!("{} is already on the list.", address)
            }
            NotifyError::SnapshotUnavailable { reason } => {
                format!("could not capture snapshot: {}", reason)
            }
            NotifyError::SendInProgress => "a send is already in progress.".to_string(),
        }
    }
}

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "NotifyError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for NotifyError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notify_error_codes() {
        assert_eq!(
            NotifyError::EmptyRecipients.code(),
            NotifyErrorCodes::EMPTY_RECIPIENTS
        );
        assert_eq!(
            NotifyError::CooldownActive { retry_after_ms: 1 }.code(),
            NotifyErrorCodes::COOLDOWN_ACTIVE
        );
        assert_eq!(
            NotifyError::DeliveryFailure {
                cause: "smtp".to_string()
            }
            .code(),
            NotifyErrorCodes::DELIVERY_FAILURE
        );
        assert_eq!(
            NotifyError::SendInProgress.code(),
            NotifyErrorCodes::SEND_IN_PROGRESS
        );
    }

    #[test]
    fn test_cooldown_message_rounds_up_to_seconds() {
        let err = NotifyError::CooldownActive {
            retry_after_ms: 4001,
        };
        assert_eq!(
            err.message(),
            "please wait 5 seconds before sending another email."
        );
    }

    #[test]
    fn test_empty_address_message() {
        let err = NotifyError::InvalidRecipient {
            address: "  ".to_string(),
        };
        assert_eq!(err.message(), "email cannot be empty.");
    }

    #[test]
    fn test_user_facing_split() {
        assert!(NotifyError::EmptyRecipients.is_user_facing());
        assert!(NotifyError::CooldownActive { retry_after_ms: 10 }.is_user_facing());
        assert!(!NotifyError::DeliveryFailure {
            cause: "x".to_string()
        }
        .is_user_facing());
    }

    #[test]
    fn test_delivery_wraps_context_chain() {
        let err = anyhow::anyhow!("connection refused").context("sending alert");
        match NotifyError::delivery(&err) {
            NotifyError::DeliveryFailure { cause } => {
                assert!(cause.contains("sending alert"));
                assert!(cause.contains("connection refused"));
            }
            other => panic!("Expected DeliveryFailure, got {:?}", other),
        }
    }
}
