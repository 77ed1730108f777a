//! Transient boolean indicators that clear themselves after a hold period.
//!
//! Each flag owns at most one pending clear task. Raising the flag again
//! aborts the pending task and arms a fresh one, and the task also checks a
//! generation counter before clearing, so the flag always stays up for the
//! full hold after the most recent raise.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Self-clearing flag observable through a `watch` channel
pub struct HoldFlag {
    name: &'static str,
    hold: Duration,
    tx: Arc<watch::Sender<bool>>,
    generation: Arc<AtomicU64>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl HoldFlag {
    pub fn new(name: &'static str, hold: Duration) -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            name,
            hold,
            tx: Arc::new(tx),
            generation: Arc::new(AtomicU64::new(0)),
            pending: Mutex::new(None),
        }
    }

    /// Set the flag and (re)arm its clear timer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn raise(&self) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        set_value(&self.tx, true);

        let tx = Arc::clone(&self.tx);
        let current = Arc::clone(&self.generation);
        let hold = self.hold;
        let name = self.name;
        let task = tokio::spawn(async move {
            tokio::time::sleep(hold).await;
            if current.load(Ordering::SeqCst) == generation {
                set_value(&tx, false);
                tracing::debug!("[HoldFlag] {} cleared after {:?}", name, hold);
            }
        });

        self.replace_pending(Some(task));
    }

    /// Clear the flag now and drop any pending clear.
    pub fn lower(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.replace_pending(None);
        set_value(&self.tx, false);
    }

    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn replace_pending(&self, next: Option<JoinHandle<()>>) {
        let previous = match self.pending.lock() {
            Ok(mut guard) => std::mem::replace(&mut *guard, next),
            Err(poisoned) => std::mem::replace(&mut *poisoned.into_inner(), next),
        };
        if let Some(task) = previous {
            task.abort();
        }
    }
}

impl Drop for HoldFlag {
    fn drop(&mut self) {
        self.lower();
    }
}

fn set_value(tx: &watch::Sender<bool>, value: bool) {
    tx.send_if_modified(|current| {
        let changed = *current != value;
        *current = value;
        changed
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn advance(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_flag_clears_after_hold() {
        let flag = HoldFlag::new("clapping", Duration::from_millis(300));
        flag.raise();
        assert!(flag.is_set());
        advance(299).await;
        assert!(flag.is_set());
        advance(2).await;
        assert!(!flag.is_set());
    }

    #[tokio::test(start_paused = true)]
    async fn test_raise_rearms_instead_of_stacking() {
        let flag = HoldFlag::new("rhythmic", Duration::from_millis(2000));
        flag.raise();
        advance(1500).await;
        flag.raise();
        // The first timer would have fired at 2000
        advance(1000).await;
        assert!(flag.is_set());
        advance(1001).await;
        assert!(!flag.is_set());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lower_cancels_pending_clear() {
        let flag = HoldFlag::new("rhythmic", Duration::from_millis(2000));
        let mut rx = flag.subscribe();
        flag.raise();
        assert!(rx.has_changed().unwrap());
        assert!(*rx.borrow_and_update());

        flag.lower();
        assert!(!*rx.borrow_and_update());

        advance(2500).await;
        // No further transitions after the manual clear
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_raise_notifies_once() {
        let flag = HoldFlag::new("rhythmic", Duration::from_millis(2000));
        let mut rx = flag.subscribe();
        flag.raise();
        rx.borrow_and_update();
        flag.raise();
        assert!(!rx.has_changed().unwrap());
    }
}
