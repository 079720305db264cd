//! CRD Mirror
//!
//! Mirrors custom resource definitions and their instances from a public
//! API group/version into an internally-managed one, and keeps the mirror
//! live by watching every public resource type.
//!
//! ## Components
//!
//! - `DefinitionStore`: lists, upserts and deletes CRDs for a group/version
//! - `ResourceStore`: CRUD and watch over instances of one resource type
//! - `Synchronizer`: replays one type's watch events into the destination
//! - `MirrorController`: discovers types and runs one synchronizer each
//!
//! ## Example
//!
//! ```no_run
//! # async fn run() -> crd_mirror::Result<()> {
//! use crd_mirror::{ConnectionConfig, CredentialRegistry, MirrorConfig, MirrorController};
//!
//! let client = ConnectionConfig::default()
//!     .connect(&CredentialRegistry::with_defaults())
//!     .await?;
//! let mut controller = MirrorController::connect(client, MirrorConfig::default()).await?;
//! controller.copy_crds().await?;
//! let liveness = controller.sync().await?;
//! liveness.cancelled().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod controllers;
pub mod crd;
pub mod error;
pub mod resource;

#[cfg(test)]
mod testing;

pub use config::{GroupVersion, MirrorConfig};
pub use connection::{ConnectionConfig, CredentialProvider, CredentialRegistry};
pub use controllers::MirrorController;
pub use crd::{CrdClient, DefinitionStore, ResourceTypeDescriptor};
pub use error::{MirrorError, Result};
pub use resource::{
    ResourceClient, ResourceStore, SyncState, Synchronizer, TypeRegistry, WatchEvent,
};
