// Alarm module - fear + rhythm arbitration and alert delivery
//
// The arbiter turns the two inputs into Idle/Active episodes and schedules
// at most one delayed alert per episode. The dispatcher owns recipients and
// the manual-send throttle and talks to the notification transport.

mod arbiter;
mod dispatch;
mod recipients;
mod throttle;

use std::sync::{Mutex, MutexGuard};

pub use arbiter::{AlarmArbiter, AlarmMachine, AlarmState, AlarmStatus, AlarmTransition};
pub use dispatch::AlertDispatcher;
pub use recipients::RecipientList;
pub use throttle::NotificationThrottle;

/// Lock a mutex whose data stays consistent even if a holder panicked.
pub(crate) fn lock_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests;
