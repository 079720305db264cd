//! Schema-agnostic access to instances of mirrored resource types.

use crate::config::GroupVersion;
use crate::crd::ResourceTypeDescriptor;
use crate::error::Result;
use crate::resource::event::{WatchEvent, WatchStream};
use crate::resource::registry::{RegisteredType, TypeRegistry};
use futures::{future, stream, Stream, StreamExt};
use kube::api::{Api, DeleteParams, ListParams, PostParams, WatchParams};
use kube::core::{DynamicObject, GroupVersionKind};
use kube::{Client, ResourceExt};
use tracing::{debug, warn};

/// CRUD and watch over instances of resource types in one group/version.
#[async_trait::async_trait]
pub trait ResourceStore: Send + Sync {
    /// Every instance of `resource_type`, across all namespaces.
    async fn list(&self, resource_type: &ResourceTypeDescriptor) -> Result<Vec<DynamicObject>>;

    /// Create `instance`, or replace the existing one with the same identity.
    async fn upsert(
        &self,
        resource_type: &ResourceTypeDescriptor,
        instance: DynamicObject,
    ) -> Result<()>;

    async fn delete(
        &self,
        resource_type: &ResourceTypeDescriptor,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<()>;

    /// Subscribe to changes after `from_version`; empty means the currently
    /// visible state.
    async fn watch(
        &self,
        resource_type: &ResourceTypeDescriptor,
        from_version: &str,
    ) -> Result<WatchStream>;
}

/// [`ResourceStore`] against the API server, bound to one group/version.
pub struct ResourceClient {
    client: Client,
    group_version: GroupVersion,
    registry: TypeRegistry,
}

impl ResourceClient {
    pub fn new(client: Client, group_version: GroupVersion, registry: TypeRegistry) -> Self {
        Self {
            client,
            group_version,
            registry,
        }
    }

    /// Types are looked up by kind within this client's own group/version.
    fn resolve(&self, resource_type: &ResourceTypeDescriptor) -> Result<&RegisteredType> {
        let gvk = GroupVersionKind::gvk(
            &self.group_version.group,
            &self.group_version.version,
            &resource_type.kind,
        );
        self.registry.resolve(&gvk)
    }

    fn api(&self, registered: &RegisteredType, namespace: Option<&str>) -> Api<DynamicObject> {
        match namespace {
            Some(ns) if registered.namespaced => {
                Api::namespaced_with(self.client.clone(), ns, &registered.resource)
            }
            _ => Api::all_with(self.client.clone(), &registered.resource),
        }
    }
}

#[async_trait::async_trait]
impl ResourceStore for ResourceClient {
    async fn list(&self, resource_type: &ResourceTypeDescriptor) -> Result<Vec<DynamicObject>> {
        let api = self.api(self.resolve(resource_type)?, None);
        let mut result = Vec::new();
        let mut params = ListParams::default();

        loop {
            let list = api.list(&params).await?;
            let next = list.metadata.continue_.clone();
            result.extend(list.items);

            match next {
                Some(token) if !token.is_empty() => params = params.continue_token(&token),
                _ => break,
            }
        }

        Ok(result)
    }

    async fn upsert(
        &self,
        resource_type: &ResourceTypeDescriptor,
        mut instance: DynamicObject,
    ) -> Result<()> {
        let registered = match instance.types {
            Some(_) => self.registry.resolve_object(&instance)?,
            None => self.resolve(resource_type)?,
        };
        let namespace = instance.namespace();
        let name = instance.name_any();
        let api = self.api(registered, namespace.as_deref());
        let pp = PostParams::default();

        match api.get_opt(&name).await? {
            None => {
                debug!(
                    "Inserting [{}] {}/{}",
                    resource_type.kind,
                    namespace.as_deref().unwrap_or_default(),
                    name
                );
                api.create(&pp, &instance).await?;
            }
            Some(existing) => {
                debug!(
                    "Updating [{}] {}/{}",
                    resource_type.kind,
                    namespace.as_deref().unwrap_or_default(),
                    name
                );
                instance.metadata.resource_version = existing.metadata.resource_version;
                api.replace(&name, &pp, &instance).await?;
            }
        }

        Ok(())
    }

    async fn delete(
        &self,
        resource_type: &ResourceTypeDescriptor,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<()> {
        debug!(
            "Deleting [{}] {}/{}",
            resource_type.plural,
            namespace.unwrap_or_default(),
            name
        );
        let api = self.api(self.resolve(resource_type)?, namespace);
        api.delete(name, &DeleteParams::default()).await?;
        Ok(())
    }

    async fn watch(
        &self,
        resource_type: &ResourceTypeDescriptor,
        from_version: &str,
    ) -> Result<WatchStream> {
        let api = self.api(self.resolve(resource_type)?, None);
        let wp = WatchParams::default().disable_bookmarks();
        let events = api.watch(&wp, from_version).await?;
        Ok(until_reset(events, resource_type.friendly_name()))
    }
}

/// Forward `events` until the server ends the stream or the connection
/// breaks, then emit a single [`WatchEvent::Reset`].
///
/// Only an ERROR event sent by the server becomes [`WatchEvent::Error`]; a
/// broken connection is resumed from the cursor like any other close.
fn until_reset<S>(events: S, name: String) -> WatchStream
where
    S: Stream<Item = kube::Result<kube::core::WatchEvent<DynamicObject>>> + Send + 'static,
{
    events
        .scan(name, |name, event| {
            future::ready(match event {
                Ok(event) => Some(WatchEvent::from(event)),
                Err(e) => {
                    warn!("Watch of '{}' broke off: {}", name, e);
                    None
                }
            })
        })
        .chain(stream::once(async { WatchEvent::Reset }))
        .boxed()
}
