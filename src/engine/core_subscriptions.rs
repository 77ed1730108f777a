use futures::{Stream, StreamExt};
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::{BroadcastStream, WatchStream};

use crate::alarm::AlarmStatus;
use crate::analysis::DetectionUpdate;
use crate::telemetry::SentinelEvent;

use super::SentinelHandle;

impl SentinelHandle {
    // ========================================================================
    // STREAM SUBSCRIPTIONS
    // ========================================================================

    pub fn subscribe_alarm(&self) -> watch::Receiver<AlarmStatus> {
        self.arbiter.subscribe()
    }

    pub fn subscribe_detection(&self) -> broadcast::Receiver<DetectionUpdate> {
        self.detection_tx.subscribe()
    }

    /// Detection updates as a stream; lagged updates are skipped.
    pub fn detection_stream(&self) -> impl Stream<Item = DetectionUpdate> + Send + 'static {
        BroadcastStream::new(self.detection_tx.subscribe())
            .filter_map(|update| async move { update.ok() })
    }

    /// Alarm status stream, starting with the current status.
    pub fn alarm_stream(&self) -> impl Stream<Item = AlarmStatus> + Send + 'static {
        WatchStream::new(self.arbiter.subscribe())
    }

    /// Telemetry events as a stream; lagged events are skipped.
    pub fn telemetry_stream(&self) -> impl Stream<Item = SentinelEvent> + Send + 'static {
        BroadcastStream::new(self.telemetry.subscribe())
            .filter_map(|event| async move { event.ok() })
    }
}
