//! In-memory stores and fixtures for unit tests.

use crate::config::GroupVersion;
use crate::crd::{serves, DefinitionStore, ResourceTypeDescriptor};
use crate::error::{MirrorError, Result};
use crate::resource::{ResourceStore, WatchEvent, WatchStream};
use futures::StreamExt;
use http::{Method, Request, Response, StatusCode};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::{
    CustomResourceDefinition, CustomResourceDefinitionNames, CustomResourceDefinitionSpec,
    CustomResourceDefinitionVersion,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::client::Body;
use kube::core::{DynamicObject, TypeMeta};
use kube::{Client, ResourceExt};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

pub fn definition(group: &str, versions: &[&str], kind: &str, plural: &str) -> CustomResourceDefinition {
    CustomResourceDefinition {
        metadata: ObjectMeta {
            name: Some(format!("{}.{}", plural, group)),
            resource_version: Some("100".to_string()),
            uid: Some(format!("uid-{}", plural)),
            ..Default::default()
        },
        spec: CustomResourceDefinitionSpec {
            group: group.to_string(),
            names: CustomResourceDefinitionNames {
                kind: kind.to_string(),
                plural: plural.to_string(),
                ..Default::default()
            },
            scope: "Namespaced".to_string(),
            versions: versions
                .iter()
                .enumerate()
                .map(|(i, v)| CustomResourceDefinitionVersion {
                    name: v.to_string(),
                    served: true,
                    storage: i == 0,
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        },
        status: None,
    }
}

pub fn descriptor(group: &str, version: &str, kind: &str, plural: &str) -> ResourceTypeDescriptor {
    ResourceTypeDescriptor {
        group: group.to_string(),
        version: version.to_string(),
        kind: kind.to_string(),
        list_kind: format!("{}List", kind),
        plural: plural.to_string(),
        namespaced: true,
    }
}

/// A source-side instance with every server-assigned identity field set.
/// The token is echoed into the payload so writes can be told apart.
pub fn instance(namespace: &str, name: &str, token: &str) -> DynamicObject {
    DynamicObject {
        types: Some(TypeMeta {
            api_version: "config.example.io/v1".to_string(),
            kind: "Rule".to_string(),
        }),
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            resource_version: Some(token.to_string()),
            uid: Some(format!("uid-{}", name)),
            self_link: Some(format!("/apis/config.example.io/v1/namespaces/{}/rules/{}", namespace, name)),
            generate_name: Some(format!("{}-", name)),
            ..Default::default()
        },
        data: json!({ "spec": { "match": "true", "token": token } }),
    }
}

/// One page of a list response.
pub fn list_page(api_version: &str, kind: &str, items: Vec<Value>, next: Option<&str>) -> Value {
    let mut metadata = json!({ "resourceVersion": "1" });
    if let Some(token) = next {
        metadata["continue"] = json!(token);
    }
    json!({
        "apiVersion": api_version,
        "kind": kind,
        "metadata": metadata,
        "items": items,
    })
}

/// Failure body the API server sends alongside an error status code.
pub fn status(code: u16, reason: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Status",
        "metadata": {},
        "status": "Failure",
        "message": format!("{} ({})", reason, code),
        "reason": reason,
        "code": code,
    })
}

/// One line of a watch response body.
pub fn watch_line(kind: &str, object: Value) -> String {
    format!("{}\n", json!({ "type": kind, "object": object }))
}

/// A `kube::Client` whose requests are answered by the returned [`ApiServer`].
pub fn mock_client() -> (Client, ApiServer) {
    let (service, handle) = tower_test::mock::pair::<Request<Body>, Response<Body>>();
    (Client::new(service, "default"), ApiServer(handle))
}

/// A request as the API server received it.
#[derive(Debug)]
pub struct Received {
    pub method: Method,
    pub path: String,
    pub query: String,
    pub body: Value,
}

/// Scripted API server; each call answers the next request in order.
pub struct ApiServer(tower_test::mock::Handle<Request<Body>, Response<Body>>);

impl ApiServer {
    pub async fn respond(&mut self, code: StatusCode, body: Value) -> Received {
        self.respond_raw(code, body.to_string().into_bytes()).await
    }

    pub async fn respond_raw(&mut self, code: StatusCode, body: Vec<u8>) -> Received {
        let (request, send) = self.0.next_request().await.expect("client sent no request");
        let method = request.method().clone();
        let path = request.uri().path().to_string();
        let query = request.uri().query().unwrap_or_default().to_string();
        let bytes = request.into_body().collect_bytes().await.unwrap();
        let received = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };

        send.send_response(Response::builder().status(code).body(Body::from(body)).unwrap());
        Received {
            method,
            path,
            query,
            body: received,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Call {
    Upsert(DynamicObject),
    Delete {
        namespace: Option<String>,
        name: String,
    },
}

type Key = (String, Option<String>, String);

/// [`ResourceStore`] held in memory, with scripted watch streams.
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<Key, DynamicObject>>,
    calls: Mutex<Vec<Call>>,
    watches: Mutex<HashMap<String, VecDeque<mpsc::UnboundedReceiver<WatchEvent>>>>,
    watch_requests: Mutex<Vec<String>>,
    failing_watches: Mutex<HashSet<String>>,
    failing_writes: Mutex<HashSet<String>>,
    upsert_delay: Option<Duration>,
    upsert_started: Notify,
    next_version: Mutex<u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_upsert_delay(delay: Duration) -> Self {
        Self {
            upsert_delay: Some(delay),
            ..Self::default()
        }
    }

    /// Queue a watch stream for `plural`; each `watch` call takes the next one.
    pub fn script_watch(&self, plural: &str) -> mpsc::UnboundedSender<WatchEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.watches
            .lock()
            .unwrap()
            .entry(plural.to_string())
            .or_default()
            .push_back(rx);
        tx
    }

    pub fn fail_watches_for(&self, plural: &str) {
        self.failing_watches.lock().unwrap().insert(plural.to_string());
    }

    pub fn fail_writes_for(&self, name: &str) {
        self.failing_writes.lock().unwrap().insert(name.to_string());
    }

    pub fn insert(&self, plural: &str, obj: DynamicObject) {
        let key = (plural.to_string(), obj.namespace(), obj.name_any());
        self.objects.lock().unwrap().insert(key, obj);
    }

    pub fn get(&self, namespace: &str, name: &str) -> Option<DynamicObject> {
        self.objects
            .lock()
            .unwrap()
            .iter()
            .find(|((_, ns, n), _)| ns.as_deref() == Some(namespace) && n == name)
            .map(|(_, obj)| obj.clone())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn upsert_count(&self, name: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Upsert(obj) if obj.name_any() == name))
            .count()
    }

    pub fn watch_requests(&self) -> Vec<String> {
        self.watch_requests.lock().unwrap().clone()
    }

    /// Resolves once an upsert has begun.
    pub async fn upsert_started(&self) {
        self.upsert_started.notified().await
    }

    fn bump_version(&self) -> String {
        let mut next = self.next_version.lock().unwrap();
        *next += 1;
        next.to_string()
    }
}

#[async_trait::async_trait]
impl ResourceStore for MemoryStore {
    async fn list(&self, resource_type: &ResourceTypeDescriptor) -> Result<Vec<DynamicObject>> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|((plural, _, _), _)| *plural == resource_type.plural)
            .map(|(_, obj)| obj.clone())
            .collect())
    }

    async fn upsert(
        &self,
        resource_type: &ResourceTypeDescriptor,
        mut instance: DynamicObject,
    ) -> Result<()> {
        self.upsert_started.notify_one();
        if let Some(delay) = self.upsert_delay {
            tokio::time::sleep(delay).await;
        }
        self.calls.lock().unwrap().push(Call::Upsert(instance.clone()));

        let name = instance.name_any();
        if self.failing_writes.lock().unwrap().contains(&name) {
            return Err(MirrorError::Remote(format!("write of {} rejected", name)));
        }
        instance.metadata.resource_version = Some(self.bump_version());
        self.insert(&resource_type.plural, instance);
        Ok(())
    }

    async fn delete(
        &self,
        resource_type: &ResourceTypeDescriptor,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<()> {
        self.calls.lock().unwrap().push(Call::Delete {
            namespace: namespace.map(str::to_string),
            name: name.to_string(),
        });

        let key = (
            resource_type.plural.clone(),
            namespace.map(str::to_string),
            name.to_string(),
        );
        match self.objects.lock().unwrap().remove(&key) {
            Some(_) => Ok(()),
            None => Err(MirrorError::Remote(format!("{} not found", name))),
        }
    }

    async fn watch(
        &self,
        resource_type: &ResourceTypeDescriptor,
        from_version: &str,
    ) -> Result<WatchStream> {
        self.watch_requests
            .lock()
            .unwrap()
            .push(from_version.to_string());

        if self.failing_watches.lock().unwrap().contains(&resource_type.plural) {
            return Err(MirrorError::Remote(format!(
                "watch of {} refused",
                resource_type.plural
            )));
        }

        let rx = self
            .watches
            .lock()
            .unwrap()
            .get_mut(&resource_type.plural)
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| {
                MirrorError::Remote(format!("no watch available for {}", resource_type.plural))
            })?;

        Ok(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        })
        .boxed())
    }
}

/// [`DefinitionStore`] held in memory.
#[derive(Default)]
pub struct MemoryDefinitions {
    definitions: Mutex<Vec<CustomResourceDefinition>>,
    failing: Mutex<bool>,
}

impl MemoryDefinitions {
    pub fn new(definitions: Vec<CustomResourceDefinition>) -> Self {
        Self {
            definitions: Mutex::new(definitions),
            failing: Mutex::new(false),
        }
    }

    pub fn fail(&self) {
        *self.failing.lock().unwrap() = true;
    }

    pub fn all(&self) -> Vec<CustomResourceDefinition> {
        self.definitions.lock().unwrap().clone()
    }

    fn check(&self) -> Result<()> {
        if *self.failing.lock().unwrap() {
            return Err(MirrorError::Remote("definition store unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl DefinitionStore for MemoryDefinitions {
    async fn get_all(&self, group_version: &GroupVersion) -> Result<Vec<CustomResourceDefinition>> {
        self.check()?;
        Ok(self
            .all()
            .into_iter()
            .filter(|d| serves(d, group_version))
            .collect())
    }

    async fn upsert(&self, definitions: &[CustomResourceDefinition]) -> Result<()> {
        self.check()?;
        let mut stored = self.definitions.lock().unwrap();
        for definition in definitions {
            stored.retain(|d| d.metadata.name != definition.metadata.name);
            stored.push(definition.clone());
        }
        Ok(())
    }

    async fn delete_all(&self, group_version: &GroupVersion) -> Result<()> {
        self.check()?;
        self.definitions
            .lock()
            .unwrap()
            .retain(|d| !serves(d, group_version));
        Ok(())
    }
}
