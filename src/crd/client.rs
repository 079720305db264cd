//! Definition store: CRUD over CustomResourceDefinitions.

use crate::config::GroupVersion;
use crate::crd::descriptor::serves;
use crate::error::Result;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::Client;
use tracing::{debug, info};

/// Store of resource type definitions.
#[async_trait::async_trait]
pub trait DefinitionStore: Send + Sync {
    /// All definitions serving `group_version`, across every listing page.
    async fn get_all(&self, group_version: &GroupVersion) -> Result<Vec<CustomResourceDefinition>>;

    /// Create or update each definition in turn, stopping at the first failure.
    async fn upsert(&self, definitions: &[CustomResourceDefinition]) -> Result<()>;

    /// Delete every definition serving `group_version`, stopping at the first failure.
    async fn delete_all(&self, group_version: &GroupVersion) -> Result<()>;
}

/// [`DefinitionStore`] backed by the apiextensions API.
pub struct CrdClient {
    api: Api<CustomResourceDefinition>,
}

impl CrdClient {
    pub fn new(client: Client) -> Self {
        Self {
            api: Api::all(client),
        }
    }
}

#[async_trait::async_trait]
impl DefinitionStore for CrdClient {
    async fn get_all(&self, group_version: &GroupVersion) -> Result<Vec<CustomResourceDefinition>> {
        let mut result = Vec::new();
        let mut params = ListParams::default();

        loop {
            let list = self.api.list(&params).await?;
            let next = list.metadata.continue_.clone();
            result.extend(
                list.items
                    .into_iter()
                    .filter(|crd| serves(crd, group_version)),
            );

            match next {
                Some(token) if !token.is_empty() => params = params.continue_token(&token),
                _ => break,
            }
        }

        debug!(
            "Found {} definitions for '{}'",
            result.len(),
            group_version
        );
        Ok(result)
    }

    async fn upsert(&self, definitions: &[CustomResourceDefinition]) -> Result<()> {
        let pp = PostParams::default();

        for definition in definitions {
            let name = definition.metadata.name.clone().unwrap_or_default();
            match self.api.create(&pp, definition).await {
                Ok(_) => info!("Created definition {}", name),
                Err(kube::Error::Api(ae)) if ae.code == 409 => {
                    debug!("Definition {} already exists, updating", name);
                    let existing = self.api.get(&name).await?;
                    let mut updated = definition.clone();
                    updated.metadata.resource_version = existing.metadata.resource_version;
                    self.api.replace(&name, &pp, &updated).await?;
                    info!("Updated definition {}", name);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }

    async fn delete_all(&self, group_version: &GroupVersion) -> Result<()> {
        let definitions = self.get_all(group_version).await?;
        let dp = DeleteParams::default();

        for definition in &definitions {
            let name = definition.metadata.name.clone().unwrap_or_default();
            self.api.delete(&name, &dp).await?;
            info!("Deleted definition {}", name);
        }

        Ok(())
    }
}
