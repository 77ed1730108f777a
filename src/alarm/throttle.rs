use crate::error::NotifyError;

/// Cooldown gate for manual sends.
///
/// Only successful deliveries stamp the throttle, so a failed attempt can be
/// retried right away. Alarm deliveries stamp it too but never consult it.
#[derive(Debug, Clone)]
pub struct NotificationThrottle {
    cooldown_ms: u64,
    last_send_ms: Option<u64>,
}

impl NotificationThrottle {
    pub fn new(cooldown_ms: u64) -> Self {
        Self {
            cooldown_ms,
            last_send_ms: None,
        }
    }

    /// `Ok` when a manual send may proceed at `now_ms`.
    pub fn check(&self, now_ms: u64) -> Result<(), NotifyError> {
        match self.retry_after_ms(now_ms) {
            Some(retry_after_ms) => Err(NotifyError::CooldownActive { retry_after_ms }),
            None => Ok(()),
        }
    }

    /// Remaining cooldown, `None` when elapsed
    pub fn retry_after_ms(&self, now_ms: u64) -> Option<u64> {
        let last = self.last_send_ms?;
        let elapsed = now_ms.saturating_sub(last);
        if elapsed < self.cooldown_ms {
            Some(self.cooldown_ms - elapsed)
        } else {
            None
        }
    }

    pub fn record_success(&mut self, now_ms: u64) {
        self.last_send_ms = Some(now_ms);
    }

    pub fn last_send_ms(&self) -> Option<u64> {
        self.last_send_ms
    }

    pub fn cooldown_ms(&self) -> u64 {
        self.cooldown_ms
    }
}
