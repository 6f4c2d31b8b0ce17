use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

use crate::models::location::{PositionError, PositionFix};
use crate::models::profile::SamplingProfile;
use crate::platform::{PositionSource, PositionStream};

type FixResult = Result<PositionFix, PositionError>;

/// Position source fed by the host process: fixes and errors reported by the
/// device are published here and fanned out to every open watch.
pub struct ChannelPositionSource {
    tx: broadcast::Sender<FixResult>,
    last_profile: Mutex<Option<SamplingProfile>>,
}

impl ChannelPositionSource {
    pub fn new(capacity: usize) -> Self {
        let (tx, _unused_rx) = broadcast::channel(capacity);
        Self {
            tx,
            last_profile: Mutex::new(None),
        }
    }

    /// Returns the number of watches the fix was delivered to.
    pub fn publish_fix(&self, fix: PositionFix) -> usize {
        self.tx.send(Ok(fix)).unwrap_or(0)
    }

    pub fn publish_error(&self, error: PositionError) -> usize {
        self.tx.send(Err(error)).unwrap_or(0)
    }

    pub fn active_watches(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Profile requested by the most recent watch.
    pub fn last_profile(&self) -> Option<SamplingProfile> {
        *self
            .last_profile
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl PositionSource for ChannelPositionSource {
    async fn watch(&self, profile: SamplingProfile) -> Result<PositionStream, PositionError> {
        *self
            .last_profile
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(profile);

        debug!(mode = %profile.mode, high_accuracy = profile.enable_high_accuracy, "position watch opened");

        let stream = BroadcastStream::new(self.tx.subscribe()).filter_map(|item| match item {
            Ok(result) => Some(result),
            Err(err) => {
                warn!(error = %err, "position watch lagged; fixes skipped");
                None
            }
        });

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::ChannelPositionSource;
    use crate::models::location::PositionFix;
    use crate::models::profile::SamplingProfile;
    use crate::platform::PositionSource;

    fn fix(at: i64) -> PositionFix {
        PositionFix {
            latitude: 52.52,
            longitude: 13.405,
            accuracy: 5.0,
            heading: None,
            speed: None,
            altitude: None,
            captured_at_epoch_ms: at,
        }
    }

    #[tokio::test]
    async fn watch_receives_published_fixes_and_drops_release_it() {
        let source = ChannelPositionSource::new(16);
        assert_eq!(source.publish_fix(fix(1)), 0);

        let mut stream = source.watch(SamplingProfile::background()).await.unwrap();
        assert_eq!(source.active_watches(), 1);
        assert_eq!(
            source.last_profile(),
            Some(SamplingProfile::background())
        );

        assert_eq!(source.publish_fix(fix(2)), 1);
        let received = stream.next().await.unwrap().unwrap();
        assert_eq!(received.captured_at_epoch_ms, 2);

        drop(stream);
        assert_eq!(source.active_watches(), 0);
    }
}
