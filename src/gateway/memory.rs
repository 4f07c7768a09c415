//! # In-Memory Gateway
//!
//! A [`ClusterGateway`] that keeps objects in process memory.
//!
//! It mimics the API server behaviour the operator relies on:
//!
//! - uid, resourceVersion and creationTimestamp are assigned on create
//! - applying identical content is a no-op (no resourceVersion bump, no journal entry)
//! - a `metadata.resourceVersion` in a merge patch or status write is a precondition (409 on mismatch)
//! - deleting an object with finalizers only sets `deletionTimestamp`; the object
//!   disappears once its finalizers are removed
//! - kinds can be restricted to a served set, others fail with `NoMatch`
//!
//! Every mutation is recorded in a journal so tests can assert on what changed.

use super::{api_version, gvk_id, gvk_of, ClusterGateway, GatewayError, ObjectKey, Result};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use kube::core::{DynamicObject, GroupVersionKind};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Gateway operations, used to target injected faults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Get,
    List,
    Apply,
    MergePatch,
    PatchStatus,
    Delete,
    DeleteCollection,
}

/// Kind of recorded mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Created,
    Updated,
    StatusUpdated,
    DeletionRequested,
    Deleted,
}

/// Journal entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub kind: MutationKind,
    /// Object kind, e.g. `Secret`
    pub object_kind: String,
    pub namespace: Option<String>,
    pub name: String,
}

/// Failure returned by an injected fault
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    NotFound,
    Conflict,
    NoMatch,
    MethodNotSupported,
    Timeout,
    Failure(String),
}

impl Fault {
    fn to_error(&self, target: &str) -> GatewayError {
        match self {
            Fault::NotFound => GatewayError::NotFound(target.to_string()),
            Fault::Conflict => GatewayError::Conflict(target.to_string()),
            Fault::NoMatch => GatewayError::NoMatch(target.to_string()),
            Fault::MethodNotSupported => GatewayError::MethodNotSupported(target.to_string()),
            Fault::Timeout => GatewayError::Timeout(target.to_string()),
            Fault::Failure(message) => GatewayError::Injected(message.clone()),
        }
    }
}

#[derive(Debug)]
struct InjectedFault {
    operation: Operation,
    kind: String,
    fault: Fault,
}

/// (gvk id, namespace or "", name)
type StoreKey = (String, String, String);

/// Kinds that exist outside namespaces
const CLUSTER_SCOPED_KINDS: [&str; 6] = [
    "Namespace",
    "CustomResourceDefinition",
    "MutatingWebhookConfiguration",
    "ValidatingWebhookConfiguration",
    "ClusterRole",
    "ClusterRoleBinding",
];

#[derive(Debug, Default)]
struct Store {
    objects: BTreeMap<StoreKey, Value>,
    served: Option<HashSet<String>>,
    cluster_scoped: HashSet<String>,
    faults: Vec<InjectedFault>,
    journal: Vec<Mutation>,
    next_uid: u64,
    next_resource_version: u64,
}

impl Store {
    fn is_cluster_scoped(&self, kind: &str) -> bool {
        CLUSTER_SCOPED_KINDS.contains(&kind) || self.cluster_scoped.contains(kind)
    }

    fn store_key(&self, gvk: &GroupVersionKind, namespace: Option<&str>, name: &str) -> StoreKey {
        let namespace = if self.is_cluster_scoped(&gvk.kind) {
            String::new()
        } else {
            namespace.unwrap_or_default().to_string()
        };
        (gvk_id(gvk), namespace, name.to_string())
    }

    fn check(&self, operation: Operation, gvk: &GroupVersionKind, target: &str) -> Result<()> {
        if let Some(found) = self
            .faults
            .iter()
            .find(|f| f.operation == operation && f.kind == gvk.kind)
        {
            return Err(found.fault.to_error(target));
        }
        match &self.served {
            Some(served) if !served.contains(&gvk_id(gvk)) => {
                Err(GatewayError::NoMatch(gvk_id(gvk)))
            }
            _ => Ok(()),
        }
    }

    fn bump(&mut self, value: &mut Value) {
        self.next_resource_version += 1;
        value["metadata"]["resourceVersion"] = json!(self.next_resource_version.to_string());
    }

    fn record(&mut self, kind: MutationKind, key: &StoreKey, object_kind: &str) {
        self.journal.push(Mutation {
            kind,
            object_kind: object_kind.to_string(),
            namespace: (!key.1.is_empty()).then(|| key.1.clone()),
            name: key.2.clone(),
        });
    }

    fn create(&mut self, key: StoreKey, gvk: &GroupVersionKind, mut value: Value) -> Value {
        self.next_uid += 1;
        let metadata = &mut value["metadata"];
        metadata["uid"] = json!(format!("uid-{}", self.next_uid));
        if metadata.get("creationTimestamp").is_none_or(Value::is_null) {
            metadata["creationTimestamp"] = json!(now_rfc3339());
        }
        if key.1.is_empty() {
            if let Some(meta) = metadata.as_object_mut() {
                meta.remove("namespace");
            }
        } else {
            metadata["namespace"] = json!(key.1);
        }
        value["apiVersion"] = json!(api_version(gvk));
        value["kind"] = json!(gvk.kind);
        self.bump(&mut value);
        self.record(MutationKind::Created, &key, &gvk.kind);
        self.objects.insert(key, value.clone());
        value
    }

    /// Store `value` if it differs from the current object; removes objects
    /// pending deletion whose finalizers are gone
    fn update(&mut self, key: &StoreKey, kind: &str, mut value: Value, mutation: MutationKind) -> Value {
        let unchanged = self.objects.get(key).is_some_and(|current| *current == value);
        if unchanged {
            return value;
        }
        if is_deleting(&value) && finalizers(&value).is_empty() {
            self.objects.remove(key);
            self.record(MutationKind::Deleted, key, kind);
            return value;
        }
        self.bump(&mut value);
        self.record(mutation, key, kind);
        self.objects.insert(key.clone(), value.clone());
        value
    }

    fn delete(&mut self, key: &StoreKey, kind: &str) {
        let Some(current) = self.objects.get(key).cloned() else {
            return;
        };
        if finalizers(&current).is_empty() {
            self.objects.remove(key);
            self.record(MutationKind::Deleted, key, kind);
            return;
        }
        if is_deleting(&current) {
            return;
        }
        let mut value = current;
        value["metadata"]["deletionTimestamp"] = json!(now_rfc3339());
        self.bump(&mut value);
        self.record(MutationKind::DeletionRequested, key, kind);
        self.objects.insert(key.clone(), value);
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn is_deleting(value: &Value) -> bool {
    value["metadata"]
        .get("deletionTimestamp")
        .is_some_and(|ts| !ts.is_null())
}

fn finalizers(value: &Value) -> Vec<String> {
    value["metadata"]["finalizers"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|f| f.as_str().map(ToString::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn labels_match(value: &Value, selector: Option<&str>) -> bool {
    let Some(selector) = selector else {
        return true;
    };
    let labels = &value["metadata"]["labels"];
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .all(|term| {
            if let Some((k, v)) = term.split_once("!=") {
                labels[k.trim()].as_str() != Some(v.trim())
            } else if let Some((k, v)) = term.split_once('=') {
                let v = v.trim_start_matches('=');
                labels[k.trim()].as_str() == Some(v.trim())
            } else {
                labels.get(term).is_some()
            }
        })
}

fn to_object(value: Value) -> Result<DynamicObject> {
    Ok(serde_json::from_value(value)?)
}

fn check_resource_version(key: &ObjectKey, expected: &Value, current: &Value) -> Result<()> {
    if *expected == current["metadata"]["resourceVersion"] {
        Ok(())
    } else {
        Err(GatewayError::Conflict(format!(
            "{key}: the object has been modified; please apply your changes to the latest version and try again"
        )))
    }
}

/// In-memory [`ClusterGateway`] for tests and local experiments
#[derive(Clone, Default)]
pub struct InMemoryGateway {
    store: Arc<Mutex<Store>>,
}

impl fmt::Debug for InMemoryGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let store = self.lock();
        f.debug_struct("InMemoryGateway")
            .field("objects", &store.objects.len())
            .field("mutations", &store.journal.len())
            .finish_non_exhaustive()
    }
}

impl InMemoryGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Restrict the served kinds; once called, unregistered kinds yield `NoMatch`
    pub fn serve_kind(&self, gvk: &GroupVersionKind) {
        self.lock()
            .served
            .get_or_insert_with(HashSet::new)
            .insert(gvk_id(gvk));
    }

    /// Treat an additional kind as cluster-scoped
    pub fn register_cluster_scoped(&self, kind: &str) {
        self.lock().cluster_scoped.insert(kind.to_string());
    }

    /// Fail every `operation` on `kind` with `fault` until cleared
    pub fn inject_fault(&self, operation: Operation, kind: &str, fault: Fault) {
        self.lock().faults.push(InjectedFault {
            operation,
            kind: kind.to_string(),
            fault,
        });
    }

    pub fn clear_faults(&self) {
        self.lock().faults.clear();
    }

    /// Seed an object, keeping any creationTimestamp it carries.
    /// Bypasses served kinds, faults and the journal.
    pub fn insert(&self, obj: &DynamicObject) -> Result<DynamicObject> {
        let gvk = gvk_of(obj)?;
        let name = ObjectKey::for_object(obj)?.name;
        let mut store = self.lock();
        let key = store.store_key(&gvk, obj.metadata.namespace.as_deref(), &name);
        let value = store.create(key, &gvk, serde_json::to_value(obj)?);
        store.journal.pop();
        to_object(value)
    }

    /// Recorded mutations, oldest first
    #[must_use]
    pub fn journal(&self) -> Vec<Mutation> {
        self.lock().journal.clone()
    }

    pub fn clear_journal(&self) {
        self.lock().journal.clear();
    }

    /// Whether the object currently exists (including objects pending deletion)
    #[must_use]
    pub fn contains(&self, key: &ObjectKey) -> bool {
        let store = self.lock();
        let store_key = store.store_key(&key.gvk, key.namespace.as_deref(), &key.name);
        store.objects.contains_key(&store_key)
    }

    /// Number of stored objects of a kind, across namespaces
    #[must_use]
    pub fn count(&self, gvk: &GroupVersionKind) -> usize {
        let id = gvk_id(gvk);
        self.lock().objects.keys().filter(|k| k.0 == id).count()
    }
}

#[async_trait]
impl ClusterGateway for InMemoryGateway {
    async fn get(&self, key: &ObjectKey) -> Result<DynamicObject> {
        let store = self.lock();
        store.check(Operation::Get, &key.gvk, &key.to_string())?;
        let store_key = store.store_key(&key.gvk, key.namespace.as_deref(), &key.name);
        let value = store
            .objects
            .get(&store_key)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(key.to_string()))?;
        drop(store);
        to_object(value)
    }

    async fn list(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<DynamicObject>> {
        let store = self.lock();
        store.check(Operation::List, gvk, &gvk.kind)?;
        let id = gvk_id(gvk);
        let namespace = namespace.filter(|_| !store.is_cluster_scoped(&gvk.kind));
        let values: Vec<Value> = store
            .objects
            .iter()
            .filter(|(k, _)| k.0 == id && namespace.is_none_or(|ns| k.1 == ns))
            .filter(|(_, v)| labels_match(v, label_selector))
            .map(|(_, v)| v.clone())
            .collect();
        drop(store);
        values.into_iter().map(to_object).collect()
    }

    async fn apply(&self, obj: &DynamicObject) -> Result<DynamicObject> {
        let key = ObjectKey::for_object(obj)?;
        let mut applied = serde_json::to_value(obj)?;
        if let Some(meta) = applied["metadata"].as_object_mut() {
            meta.remove("managedFields");
            meta.remove("resourceVersion");
            meta.remove("uid");
        }

        let mut store = self.lock();
        store.check(Operation::Apply, &key.gvk, &key.to_string())?;
        let store_key = store.store_key(&key.gvk, key.namespace.as_deref(), &key.name);
        let value = match store.objects.get(&store_key).cloned() {
            Some(mut current) => {
                if store_key.1.is_empty() {
                    if let Some(meta) = applied["metadata"].as_object_mut() {
                        meta.remove("namespace");
                    }
                }
                json_patch::merge(&mut current, &applied);
                store.update(&store_key, &key.gvk.kind, current, MutationKind::Updated)
            }
            None => store.create(store_key, &key.gvk, applied),
        };
        drop(store);
        to_object(value)
    }

    async fn merge_patch(&self, key: &ObjectKey, patch: &Value) -> Result<DynamicObject> {
        let mut store = self.lock();
        store.check(Operation::MergePatch, &key.gvk, &key.to_string())?;
        let store_key = store.store_key(&key.gvk, key.namespace.as_deref(), &key.name);
        let mut current = store
            .objects
            .get(&store_key)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(key.to_string()))?;

        let mut patch = patch.clone();
        if let Some(expected) = patch["metadata"]
            .as_object_mut()
            .and_then(|meta| meta.remove("resourceVersion"))
        {
            check_resource_version(key, &expected, &current)?;
        }

        json_patch::merge(&mut current, &patch);
        let value = store.update(&store_key, &key.gvk.kind, current, MutationKind::Updated);
        drop(store);
        to_object(value)
    }

    async fn patch_status(
        &self,
        key: &ObjectKey,
        status: &Value,
        resource_version: Option<&str>,
    ) -> Result<DynamicObject> {
        let mut store = self.lock();
        store.check(Operation::PatchStatus, &key.gvk, &key.to_string())?;
        let store_key = store.store_key(&key.gvk, key.namespace.as_deref(), &key.name);
        let mut current = store
            .objects
            .get(&store_key)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(key.to_string()))?;
        if let Some(expected) = resource_version {
            check_resource_version(key, &Value::from(expected), &current)?;
        }
        current["status"] = status.clone();
        let value = store.update(&store_key, &key.gvk.kind, current, MutationKind::StatusUpdated);
        drop(store);
        to_object(value)
    }

    async fn delete(&self, key: &ObjectKey) -> Result<()> {
        let mut store = self.lock();
        store.check(Operation::Delete, &key.gvk, &key.to_string())?;
        let store_key = store.store_key(&key.gvk, key.namespace.as_deref(), &key.name);
        if !store.objects.contains_key(&store_key) {
            return Err(GatewayError::NotFound(key.to_string()));
        }
        store.delete(&store_key, &key.gvk.kind);
        Ok(())
    }

    async fn delete_collection(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> Result<()> {
        let mut store = self.lock();
        store.check(Operation::DeleteCollection, gvk, &gvk.kind)?;
        let id = gvk_id(gvk);
        let cluster_scoped = store.is_cluster_scoped(&gvk.kind);
        let targets: Vec<StoreKey> = store
            .objects
            .iter()
            .filter(|(k, _)| k.0 == id && (cluster_scoped || k.1 == namespace))
            .filter(|(_, v)| labels_match(v, label_selector))
            .map(|(k, _)| k.clone())
            .collect();
        for target in &targets {
            store.delete(target, &gvk.kind);
        }
        Ok(())
    }
}
