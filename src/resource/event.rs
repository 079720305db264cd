//! Watch events as the synchronizer sees them.

use futures::stream::BoxStream;
use kube::core::DynamicObject;
use kube::ResourceExt;

/// Live subscription to one resource type.
pub type WatchStream = BoxStream<'static, WatchEvent>;

/// A change notification delivered by a watch.
#[derive(Debug, Clone)]
pub enum WatchEvent {
    Added(DynamicObject),
    Modified(DynamicObject),
    Deleted(DynamicObject),
    /// The server reported an error on the stream.
    Error(String),
    /// The server closed the stream; resume from the last seen version.
    Reset,
    /// An event kind the synchronizer has no handling for.
    Unrecognized(String),
}

impl WatchEvent {
    pub fn object(&self) -> Option<&DynamicObject> {
        match self {
            WatchEvent::Added(obj) | WatchEvent::Modified(obj) | WatchEvent::Deleted(obj) => {
                Some(obj)
            }
            _ => None,
        }
    }

    /// Concurrency token of the carried object, empty when absent.
    pub fn token(&self) -> Option<String> {
        self.object()
            .map(|obj| obj.resource_version().unwrap_or_default())
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, WatchEvent::Deleted(_))
    }

    pub fn kind(&self) -> &str {
        match self {
            WatchEvent::Added(_) => "ADDED",
            WatchEvent::Modified(_) => "MODIFIED",
            WatchEvent::Deleted(_) => "DELETED",
            WatchEvent::Error(_) => "ERROR",
            WatchEvent::Reset => "RESET",
            WatchEvent::Unrecognized(kind) => kind.as_str(),
        }
    }
}

impl From<kube::core::WatchEvent<DynamicObject>> for WatchEvent {
    fn from(event: kube::core::WatchEvent<DynamicObject>) -> Self {
        match event {
            kube::core::WatchEvent::Added(obj) => WatchEvent::Added(obj),
            kube::core::WatchEvent::Modified(obj) => WatchEvent::Modified(obj),
            kube::core::WatchEvent::Deleted(obj) => WatchEvent::Deleted(obj),
            kube::core::WatchEvent::Error(e) => {
                WatchEvent::Error(format!("{} ({}): {}", e.reason, e.code, e.message))
            }
            kube::core::WatchEvent::Bookmark(_) => WatchEvent::Unrecognized("BOOKMARK".to_string()),
        }
    }
}
