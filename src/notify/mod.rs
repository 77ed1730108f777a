//! Notification seam.
//!
//! The core never talks to a mail service directly. It captures a still
//! image through a [`SnapshotProvider`], wraps it in a [`Notification`] and
//! hands that to a [`Notifier`], caring only whether delivery succeeded.

use std::sync::Mutex;

use anyhow::Result;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::NotifyError;

/// Why a notification is being sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Triggered by an alarm episode
    Alarm,
    /// Requested by the user
    Manual,
}

/// Base64-encoded still image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub base64: String,
    pub mime_type: String,
}

impl Snapshot {
    pub fn new(base64: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            base64: base64.into(),
            mime_type: mime_type.into(),
        }
    }

    /// `data:` URL form expected by mail templates
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64)
    }
}

/// A single delivery request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub recipients: Vec<String>,
    pub snapshot: Snapshot,
    pub kind: AlertKind,
}

impl Notification {
    pub fn subject(&self) -> &'static str {
        match self.kind {
            AlertKind::Alarm => "ALARM: Fear + Rhythmic Clapping Detected!",
            AlertKind::Manual => "Screenshot Alert",
        }
    }

    pub fn message(&self) -> &'static str {
        match self.kind {
            AlertKind::Alarm => {
                "The facial recognition system detected fear emotion combined with rhythmic clapping. Please check immediately!"
            }
            AlertKind::Manual => "Here is your requested screenshot.",
        }
    }

    pub fn is_alarm(&self) -> bool {
        self.kind == AlertKind::Alarm
    }
}

/// Opaque delivery transport
pub trait Notifier: Send + Sync {
    fn send<'a>(&'a self, notification: &'a Notification) -> BoxFuture<'a, Result<()>>;
}

/// Source of the still image attached to notifications
pub trait SnapshotProvider: Send + Sync {
    fn capture(&self) -> Result<Snapshot, NotifyError>;
}

/// Always returns the same image
pub struct StaticSnapshot {
    snapshot: Snapshot,
}

impl StaticSnapshot {
    pub fn new(snapshot: Snapshot) -> Self {
        Self { snapshot }
    }
}

impl SnapshotProvider for StaticSnapshot {
    fn capture(&self) -> Result<Snapshot, NotifyError> {
        Ok(self.snapshot.clone())
    }
}

/// Notifier that only logs, used by the CLI
#[derive(Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send<'a>(&'a self, notification: &'a Notification) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            for recipient in &notification.recipients {
                tracing::info!(
                    "[LogNotifier] to={} subject=\"{}\" image={} ({} bytes base64)",
                    recipient,
                    notification.subject(),
                    notification.snapshot.mime_type,
                    notification.snapshot.base64.len()
                );
            }
            Ok(())
        })
    }
}

/// Captures every request; can be told to fail upcoming sends
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    failures: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next send fail with `reason`; queued failures apply in order.
    pub fn fail_next(&self, reason: impl Into<String>) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push(reason.into());
        }
    }

    /// Notifications that were delivered successfully
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().map(|sent| sent.len()).unwrap_or(0)
    }
}

impl Notifier for RecordingNotifier {
    fn send<'a>(&'a self, notification: &'a Notification) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let failure = match self.failures.lock() {
                Ok(mut failures) if !failures.is_empty() => Some(failures.remove(0)),
                _ => None,
            };
            if let Some(reason) = failure {
                anyhow::bail!(reason);
            }
            if let Ok(mut sent) = self.sent.lock() {
                sent.push(notification.clone());
            }
            Ok(())
        })
    }
}
