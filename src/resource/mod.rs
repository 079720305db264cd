//! Instances of mirrored resource types and the watch-driven synchronizer.

mod client;
mod event;
mod registry;
mod synchronizer;

pub use client::{ResourceClient, ResourceStore};
pub use event::{WatchEvent, WatchStream};
pub use registry::{RegisteredType, TypeRegistry};
pub use synchronizer::{rewrite_instance, SyncState, Synchronizer};
