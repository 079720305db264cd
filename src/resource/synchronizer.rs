//! Per-resource-type synchronizer.
//!
//! A [`Synchronizer`] watches one resource type in the source store and
//! replays every change into the destination store. It owns exactly one
//! worker task, which in turn owns the watch subscription and the dedup
//! cursor for the lifetime of the session.
//!
//! ```text
//! Idle --start--> Watching --reset--> Reconnecting --ok--> Watching
//!                    |                     |
//!                 error/unknown        reopen failed
//!                    v                     v
//!                 Closing <----------------+
//!                    |
//!                  close
//!                    v
//!                 Closed
//! ```

use crate::config::GroupVersion;
use crate::crd::ResourceTypeDescriptor;
use crate::error::{MirrorError, Result};
use crate::resource::client::ResourceStore;
use crate::resource::event::{WatchEvent, WatchStream};
use futures::{stream, StreamExt};
use kube::core::{DynamicObject, TypeMeta};
use kube::ResourceExt;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Lifecycle of a synchronizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Watching,
    Reconnecting,
    Closing,
    Closed,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncState::Idle => "Idle",
            SyncState::Watching => "Watching",
            SyncState::Reconnecting => "Reconnecting",
            SyncState::Closing => "Closing",
            SyncState::Closed => "Closed",
        };
        f.write_str(s)
    }
}

/// Prepare an instance for writing into `destination`.
///
/// Clears every identity field the source server assigned and stamps the
/// destination apiVersion and `kind`.
pub fn rewrite_instance(
    mut instance: DynamicObject,
    destination: &GroupVersion,
    kind: &str,
) -> DynamicObject {
    instance.metadata.resource_version = None;
    instance.metadata.uid = None;
    instance.metadata.self_link = None;
    instance.metadata.generate_name = None;
    instance.types = Some(TypeMeta {
        api_version: destination.api_version(),
        kind: kind.to_string(),
    });
    instance
}

/// Mirrors one resource type from a source store into a destination store.
pub struct Synchronizer {
    name: String,
    descriptor: ResourceTypeDescriptor,
    source: Arc<dyn ResourceStore>,
    destination: Arc<dyn ResourceStore>,
    destination_version: GroupVersion,
    cancel: CancellationToken,
    worker: Option<JoinHandle<()>>,
    state: Arc<watch::Sender<SyncState>>,
}

impl Synchronizer {
    pub fn new(
        descriptor: ResourceTypeDescriptor,
        source: Arc<dyn ResourceStore>,
        destination: Arc<dyn ResourceStore>,
        destination_version: GroupVersion,
    ) -> Self {
        let (state, _) = watch::channel(SyncState::Idle);
        Self {
            name: descriptor.friendly_name(),
            descriptor,
            source,
            destination,
            destination_version,
            cancel: CancellationToken::new(),
            worker: None,
            state: Arc::new(state),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// Open the watch and spawn the worker.
    ///
    /// On failure no worker is spawned and the synchronizer stays `Idle`.
    pub async fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            debug!("Watch of '{}' already started", self.name);
            return Ok(());
        }

        info!("Starting watch of '{}'", self.name);
        let stream = self
            .source
            .watch(&self.descriptor, "")
            .await
            .inspect_err(|e| debug!("Error while starting watch of '{}': {}", self.name, e))?;

        let worker = Worker {
            name: self.name.clone(),
            descriptor: self.descriptor.clone(),
            source: Arc::clone(&self.source),
            destination: Arc::clone(&self.destination),
            destination_version: self.destination_version.clone(),
            cancel: self.cancel.clone(),
            state: Arc::clone(&self.state),
            cursor: String::new(),
        };
        self.state.send_replace(SyncState::Watching);
        self.worker = Some(tokio::spawn(worker.run(stream)));
        Ok(())
    }

    /// Stop the worker and wait for it to exit.
    ///
    /// Once this returns no further event is processed.
    pub async fn close(&mut self) {
        self.cancel.cancel();
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                warn!("Worker of '{}' did not exit cleanly: {}", self.name, e);
            }
        }
        self.state.send_replace(SyncState::Closed);
    }
}

enum Flow {
    Continue,
    Reconnect,
    Fatal(MirrorError),
}

/// State owned by the spawned task.
struct Worker {
    name: String,
    descriptor: ResourceTypeDescriptor,
    source: Arc<dyn ResourceStore>,
    destination: Arc<dyn ResourceStore>,
    destination_version: GroupVersion,
    cancel: CancellationToken,
    state: Arc<watch::Sender<SyncState>>,
    /// Token of the last object seen.
    cursor: String,
}

impl Worker {
    async fn run(mut self, mut events: WatchStream) {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                event = events.next() => Some(event.unwrap_or(WatchEvent::Reset)),
            };

            let Some(event) = next else {
                self.state.send_replace(SyncState::Closed);
                break;
            };
            debug!(resource = %self.name, "Received {} event", event.kind());

            match self.handle(event).await {
                Flow::Continue => {}
                Flow::Reconnect => {
                    debug!("Reinitializing watch of '{}'", self.name);
                    self.state.send_replace(SyncState::Reconnecting);
                    drop(std::mem::replace(&mut events, stream::empty().boxed()));
                    match self.source.watch(&self.descriptor, &self.cursor).await {
                        Ok(reopened) => {
                            events = reopened;
                            self.state.send_replace(SyncState::Watching);
                        }
                        Err(e) => {
                            error!("Error while restarting watch of '{}': {}", self.name, e);
                            self.state.send_replace(SyncState::Closing);
                            break;
                        }
                    }
                }
                Flow::Fatal(e) => {
                    error!("Watch of '{}' failed: {}", self.name, e);
                    self.state.send_replace(SyncState::Closing);
                    break;
                }
            }
        }

        info!("Stopping watch on '{}'", self.name);
    }

    async fn handle(&mut self, event: WatchEvent) -> Flow {
        if let Some(token) = event.token() {
            if !event.is_deleted() && token == self.cursor {
                debug!("Skipping re-read object @{} in '{}'", token, self.name);
                return Flow::Continue;
            }
            self.cursor = token;
        }

        match event {
            WatchEvent::Added(obj) | WatchEvent::Modified(obj) => {
                debug!(
                    resource = %self.name,
                    "Incoming event: {}/{} @{}",
                    obj.namespace().unwrap_or_default(),
                    obj.name_any(),
                    self.cursor
                );
                let rewritten =
                    rewrite_instance(obj, &self.destination_version, &self.descriptor.kind);
                if let Err(e) = self.destination.upsert(&self.descriptor, rewritten).await {
                    error!(resource = %self.name, "Error during synchronization (upsert): {}", e);
                }
                Flow::Continue
            }
            WatchEvent::Deleted(obj) => {
                let namespace = obj.namespace();
                let name = obj.name_any();
                if let Err(e) = self
                    .destination
                    .delete(&self.descriptor, namespace.as_deref(), &name)
                    .await
                {
                    error!(resource = %self.name, "Error during synchronization (delete): {}", e);
                }
                Flow::Continue
            }
            WatchEvent::Reset => Flow::Reconnect,
            WatchEvent::Error(msg) => Flow::Fatal(MirrorError::Protocol(msg)),
            WatchEvent::Unrecognized(kind) => Flow::Fatal(MirrorError::Protocol(format!(
                "unknown event encountered: {}",
                kind
            ))),
        }
    }
}
