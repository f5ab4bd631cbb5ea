use std::sync::Arc;

use tokio::sync::watch;

use crate::geo::Coordinate;
use crate::models::UserPosition;

struct FeedInner {
    position: watch::Sender<Option<UserPosition>>,
    tracking: watch::Sender<bool>,
    supported: bool,
}

/// Latest-value handle onto the host's geolocation provider.
///
/// The host pushes fixes and tracking changes in; the engine only reads.
#[derive(Clone)]
pub struct PositionFeed {
    inner: Arc<FeedInner>,
}

impl PositionFeed {
    pub fn new(supported: bool) -> Self {
        let (position, _) = watch::channel(None);
        let (tracking, _) = watch::channel(false);
        Self {
            inner: Arc::new(FeedInner {
                position,
                tracking,
                supported,
            }),
        }
    }

    pub fn publish(&self, position: UserPosition) {
        self.inner.position.send_replace(Some(position));
    }

    /// Forget the last fix, e.g. when the provider reports an error.
    pub fn clear(&self) {
        self.inner.position.send_replace(None);
    }

    pub fn set_tracking(&self, tracking: bool) {
        self.inner.tracking.send_replace(tracking);
    }

    pub fn is_tracking(&self) -> bool {
        *self.inner.tracking.borrow()
    }

    pub fn is_supported(&self) -> bool {
        self.inner.supported
    }

    pub fn latest(&self) -> Option<UserPosition> {
        self.inner.position.borrow().clone()
    }

    /// Latest fix, if it is a usable coordinate.
    pub fn latest_coordinate(&self) -> Option<Coordinate> {
        self.inner
            .position
            .borrow()
            .as_ref()
            .and_then(UserPosition::coordinate)
    }

    pub fn subscribe_position(&self) -> watch::Receiver<Option<UserPosition>> {
        self.inner.position.subscribe()
    }

    pub fn subscribe_tracking(&self) -> watch::Receiver<bool> {
        self.inner.tracking.subscribe()
    }
}
