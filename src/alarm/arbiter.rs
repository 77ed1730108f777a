//! Alarm arbiter: combines the fear signal with the rhythmic flag.
//!
//! The alarm is Active exactly while both inputs are true. Each Idle→Active
//! transition starts a new episode; the first moment an Active episode has
//! recipients, one delayed alert is scheduled for it. An episode that starts
//! while an earlier alert is still waiting out its delay is covered by that
//! alert, so flickering inputs produce one send at the first episode's
//! deadline. A scheduled alert goes out unless the arbiter shut down.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::AlarmConfig;
use crate::engine::backend::TimeSource;
use crate::telemetry::{SentinelEventKind, SkipReason, TelemetryCollector};

use super::{lock_recover, AlertDispatcher};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmState {
    #[default]
    Idle,
    Active,
}

/// State change produced by an input update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmTransition {
    pub from: AlarmState,
    pub to: AlarmState,
    /// Episode that started (to Active) or ended (to Idle)
    pub episode: u64,
}

/// Observable arbiter state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmStatus {
    pub state: AlarmState,
    pub fear_present: bool,
    pub rhythmic: bool,
    pub episode: u64,
    pub alert_sent: bool,
}

/// Pure transition logic, no timers.
#[derive(Debug, Default)]
pub struct AlarmMachine {
    fear_present: bool,
    rhythmic: bool,
    state: AlarmState,
    episode: u64,
    alert_sent: bool,
}

impl AlarmMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fear(&mut self, present: bool) -> Option<AlarmTransition> {
        self.fear_present = present;
        self.evaluate()
    }

    pub fn set_rhythmic(&mut self, rhythmic: bool) -> Option<AlarmTransition> {
        self.rhythmic = rhythmic;
        self.evaluate()
    }

    /// Mark the current episode's alert as taken.
    ///
    /// Returns the episode to alert for, or `None` when Idle or already sent.
    pub fn claim_alert(&mut self) -> Option<u64> {
        if self.state == AlarmState::Active && !self.alert_sent {
            self.alert_sent = true;
            Some(self.episode)
        } else {
            None
        }
    }

    pub fn state(&self) -> AlarmState {
        self.state
    }

    pub fn status(&self) -> AlarmStatus {
        AlarmStatus {
            state: self.state,
            fear_present: self.fear_present,
            rhythmic: self.rhythmic,
            episode: self.episode,
            alert_sent: self.alert_sent,
        }
    }

    fn evaluate(&mut self) -> Option<AlarmTransition> {
        let next = if self.fear_present && self.rhythmic {
            AlarmState::Active
        } else {
            AlarmState::Idle
        };
        if next == self.state {
            return None;
        }

        let from = self.state;
        self.state = next;
        match next {
            AlarmState::Active => self.episode += 1,
            AlarmState::Idle => self.alert_sent = false,
        }
        Some(AlarmTransition {
            from,
            to: next,
            episode: self.episode,
        })
    }
}

struct ArbiterInner {
    machine: AlarmMachine,
    pending: Vec<JoinHandle<()>>,
    /// An alert is waiting out its delay
    alert_waiting: bool,
    shut_down: bool,
}

struct ArbiterShared {
    inner: Mutex<ArbiterInner>,
    status_tx: watch::Sender<AlarmStatus>,
    dispatcher: Arc<AlertDispatcher>,
    send_delay: Duration,
    time: Arc<dyn TimeSource>,
    telemetry: Arc<TelemetryCollector>,
}

/// Serializes both input producers through one lock and owns the delayed
/// alert tasks.
#[derive(Clone)]
pub struct AlarmArbiter {
    shared: Arc<ArbiterShared>,
}

impl AlarmArbiter {
    pub fn new(
        config: &AlarmConfig,
        dispatcher: Arc<AlertDispatcher>,
        time: Arc<dyn TimeSource>,
        telemetry: Arc<TelemetryCollector>,
    ) -> Self {
        let (status_tx, _) = watch::channel(AlarmStatus::default());
        Self {
            shared: Arc::new(ArbiterShared {
                inner: Mutex::new(ArbiterInner {
                    machine: AlarmMachine::new(),
                    pending: Vec::new(),
                    alert_waiting: false,
                    shut_down: false,
                }),
                status_tx,
                dispatcher,
                send_delay: Duration::from_millis(config.send_delay_ms),
                time,
                telemetry,
            }),
        }
    }

    /// Update the fear input. Must be called within a tokio runtime.
    pub fn set_fear(&self, present: bool) -> AlarmStatus {
        let now_ms = self.shared.time.now_ms();
        let inner = self.lock();
        if !inner.shut_down && inner.machine.status().fear_present != present {
            self.shared
                .telemetry
                .record(now_ms, SentinelEventKind::FearChanged { present });
        }
        self.update(inner, |machine| machine.set_fear(present))
    }

    /// Update the rhythmic input. Must be called within a tokio runtime.
    pub fn set_rhythmic(&self, rhythmic: bool) -> AlarmStatus {
        let inner = self.lock();
        self.update(inner, |machine| machine.set_rhythmic(rhythmic))
    }

    /// Re-check whether the current episode can now be alerted.
    pub fn recipients_changed(&self) -> AlarmStatus {
        let inner = self.lock();
        self.update(inner, |_| None)
    }

    pub fn status(&self) -> AlarmStatus {
        self.lock().machine.status()
    }

    pub fn subscribe(&self) -> watch::Receiver<AlarmStatus> {
        self.shared.status_tx.subscribe()
    }

    /// Delayed alerts not yet fired or cancelled
    pub fn pending_alerts(&self) -> usize {
        self.lock()
            .pending
            .iter()
            .filter(|task| !task.is_finished())
            .count()
    }

    /// Cancel every pending alert and ignore further input.
    pub fn shutdown(&self) {
        let mut inner = self.lock();
        inner.shut_down = true;
        let cancelled = inner.pending.len();
        for task in inner.pending.drain(..) {
            task.abort();
        }
        tracing::debug!("[AlarmArbiter] Shut down, {} alert task(s) cancelled", cancelled);
    }

    fn lock(&self) -> MutexGuard<'_, ArbiterInner> {
        lock_recover(&self.shared.inner)
    }

    fn update<F>(&self, mut inner: MutexGuard<'_, ArbiterInner>, apply: F) -> AlarmStatus
    where
        F: FnOnce(&mut AlarmMachine) -> Option<AlarmTransition>,
    {
        if inner.shut_down {
            return inner.machine.status();
        }

        if let Some(transition) = apply(&mut inner.machine) {
            self.on_transition(&transition);
        }
        self.schedule_if_due(&mut inner);

        let status = inner.machine.status();
        self.shared.status_tx.send_if_modified(|current| {
            let changed = *current != status;
            *current = status;
            changed
        });
        status
    }

    fn on_transition(&self, transition: &AlarmTransition) {
        let now_ms = self.shared.time.now_ms();
        tracing::info!(
            "[AlarmArbiter] {:?} -> {:?} (episode {})",
            transition.from,
            transition.to,
            transition.episode
        );
        self.shared.telemetry.record(
            now_ms,
            SentinelEventKind::AlarmChanged {
                from: transition.from,
                to: transition.to,
                episode: transition.episode,
            },
        );

        if transition.to == AlarmState::Active && !self.shared.dispatcher.has_recipients() {
            tracing::warn!(
                "[AlarmArbiter] Episode {} active but no recipients configured",
                transition.episode
            );
            self.shared.telemetry.record(
                now_ms,
                SentinelEventKind::AlertSkipped {
                    episode: transition.episode,
                    reason: SkipReason::NoRecipients,
                },
            );
        }
    }

    fn schedule_if_due(&self, inner: &mut ArbiterInner) {
        if !self.shared.dispatcher.has_recipients() {
            return;
        }
        let Some(episode) = inner.machine.claim_alert() else {
            return;
        };

        if inner.alert_waiting {
            tracing::debug!(
                "[AlarmArbiter] Episode {} covered by the alert already scheduled",
                episode
            );
            self.shared.telemetry.record(
                self.shared.time.now_ms(),
                SentinelEventKind::AlertSkipped {
                    episode,
                    reason: SkipReason::CoveredByPending,
                },
            );
            return;
        }

        let delay = self.shared.send_delay;
        tracing::info!(
            "[AlarmArbiter] Alert for episode {} scheduled in {}ms",
            episode,
            delay.as_millis()
        );
        self.shared.telemetry.record(
            self.shared.time.now_ms(),
            SentinelEventKind::AlertScheduled {
                episode,
                delay_ms: delay.as_millis() as u64,
            },
        );

        let shared = Arc::clone(&self.shared);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut inner = lock_recover(&shared.inner);
                inner.alert_waiting = false;
                if inner.shut_down {
                    return;
                }
            }
            // Outcome is logged and recorded by the dispatcher
            let _ = shared.dispatcher.send_alarm(episode).await;
        });

        inner.alert_waiting = true;
        inner.pending.retain(|task| !task.is_finished());
        inner.pending.push(task);
    }
}
