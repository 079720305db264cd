//! Mirror Controller
//!
//! Discovers the resource types served under the public group/version and
//! mirrors them, and their instances, into the internal group/version.

use crate::config::MirrorConfig;
use crate::crd::{
    descriptors, rewrite_definition, CrdClient, DefinitionStore, ResourceTypeDescriptor,
    LAST_APPLIED_ANNOTATION,
};
use crate::error::Result;
use crate::resource::{
    rewrite_instance, ResourceClient, ResourceStore, SyncState, Synchronizer, TypeRegistry,
};
use kube::Client;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Owns the stores on both sides of the mirror and the live synchronizers.
pub struct MirrorController {
    definitions: Arc<dyn DefinitionStore>,
    public: Arc<dyn ResourceStore>,
    internal: Arc<dyn ResourceStore>,
    config: MirrorConfig,
    synchronizers: Vec<Synchronizer>,
    liveness: CancellationToken,
}

impl MirrorController {
    pub fn new(
        definitions: Arc<dyn DefinitionStore>,
        public: Arc<dyn ResourceStore>,
        internal: Arc<dyn ResourceStore>,
        config: MirrorConfig,
    ) -> Self {
        Self {
            definitions,
            public,
            internal,
            config,
            synchronizers: Vec::new(),
            liveness: CancellationToken::new(),
        }
    }

    /// Build a controller against the API server behind `client`.
    ///
    /// Each side gets its own type registry, built from the definitions
    /// currently served under that group/version.
    pub async fn connect(client: Client, config: MirrorConfig) -> Result<Self> {
        let definitions = CrdClient::new(client.clone());

        let public_defs = definitions.get_all(&config.public).await?;
        let registry = TypeRegistry::from_descriptors(&descriptors(&public_defs, &config.public));
        debug!("Registered {} public types", registry.len());
        let public = ResourceClient::new(client.clone(), config.public.clone(), registry);

        let internal_defs = definitions.get_all(&config.internal).await?;
        let registry =
            TypeRegistry::from_descriptors(&descriptors(&internal_defs, &config.internal));
        debug!("Registered {} internal types", registry.len());
        let internal = ResourceClient::new(client, config.internal.clone(), registry);

        Ok(Self::new(
            Arc::new(definitions),
            Arc::new(public),
            Arc::new(internal),
            config,
        ))
    }

    pub fn definitions(&self) -> &dyn DefinitionStore {
        self.definitions.as_ref()
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    async fn public_types(&self) -> Result<Vec<ResourceTypeDescriptor>> {
        let definitions = self.definitions.get_all(&self.config.public).await?;
        Ok(descriptors(&definitions, &self.config.public))
    }

    /// Copy every public definition into the internal group/version.
    pub async fn copy_crds(&self) -> Result<()> {
        let definitions = self.definitions.get_all(&self.config.public).await?;
        let rewritten: Vec<_> = definitions
            .iter()
            .map(|d| rewrite_definition(d, &self.config.public, &self.config.internal))
            .collect();

        info!(
            "Copying {} definitions '{}' => '{}'",
            rewritten.len(),
            self.config.public,
            self.config.internal
        );
        self.definitions.upsert(&rewritten).await
    }

    /// Copy every public instance into the internal group/version.
    ///
    /// Internal instances with no public counterpart are left in place.
    pub async fn copy_resources(&self) -> Result<()> {
        debug!(
            "Syncing '{}' => '{}'",
            self.config.public, self.config.internal
        );

        for resource_type in self.public_types().await? {
            debug!("Syncing resource type: '{}'", resource_type.plural);
            let instances = self.public.list(&resource_type).await?;

            for instance in instances {
                let mut rewritten =
                    rewrite_instance(instance, &self.config.internal, &resource_type.kind);
                if let Some(annotations) = rewritten.metadata.annotations.as_mut() {
                    annotations.remove(LAST_APPLIED_ANNOTATION);
                }
                debug!(
                    "  Syncing resource: {}({})",
                    rewritten.metadata.name.as_deref().unwrap_or_default(),
                    resource_type.kind
                );
                self.internal.upsert(&resource_type, rewritten).await?;
            }
        }

        Ok(())
    }

    /// Delete the internal definitions; the server collects their instances.
    pub async fn delete_resources(&self) -> Result<()> {
        info!("Deleting definitions for '{}'", self.config.internal);
        self.definitions.delete_all(&self.config.internal).await
    }

    /// Start one synchronizer per public resource type.
    ///
    /// Startup is all-or-nothing: if any synchronizer fails to start, the
    /// ones already started are closed and the error is returned. On success
    /// the returned token is cancelled when the controller stops.
    pub async fn sync(&mut self) -> Result<CancellationToken> {
        self.close_synchronizers().await;

        let types = self.public_types().await?;
        let mut synchronizers: Vec<Synchronizer> = types
            .into_iter()
            .map(|resource_type| {
                Synchronizer::new(
                    resource_type,
                    Arc::clone(&self.public),
                    Arc::clone(&self.internal),
                    self.config.internal.clone(),
                )
            })
            .collect();

        let mut failure = None;
        for synchronizer in synchronizers.iter_mut() {
            if let Err(e) = synchronizer.start().await {
                error!("Failed to start synchronizer '{}': {}", synchronizer.name(), e);
                failure = Some(e);
                break;
            }
        }

        if let Some(e) = failure {
            for synchronizer in synchronizers.iter_mut() {
                synchronizer.close().await;
            }
            return Err(e);
        }

        info!("Started {} synchronizers", synchronizers.len());
        self.synchronizers = synchronizers;
        Ok(self.liveness.clone())
    }

    /// Current state of each live synchronizer, by friendly name.
    pub fn states(&self) -> Vec<(String, SyncState)> {
        self.synchronizers
            .iter()
            .map(|s| (s.name().to_string(), s.state()))
            .collect()
    }

    /// Close every synchronizer and signal liveness watchers.
    pub async fn stop(&mut self) {
        self.close_synchronizers().await;
        std::mem::take(&mut self.liveness).cancel();
    }

    async fn close_synchronizers(&mut self) {
        for mut synchronizer in std::mem::take(&mut self.synchronizers) {
            synchronizer.close().await;
        }
    }
}
