//! Conversions between typed resources and [`DynamicObject`].

use super::{ClusterGateway, ObjectKey, Result};
use kube::core::{DynamicObject, GroupVersionKind};
use kube::Resource;
use serde::{de::DeserializeOwned, Serialize};

/// GVK of a statically typed resource
#[must_use]
pub fn gvk_for<K: Resource<DynamicType = ()>>() -> GroupVersionKind {
    GroupVersionKind::gvk(&K::group(&()), &K::version(&()), &K::kind(&()))
}

/// Key of a statically typed resource
#[must_use]
pub fn key_for<K: Resource<DynamicType = ()>>(namespace: Option<&str>, name: &str) -> ObjectKey {
    ObjectKey::new(gvk_for::<K>(), namespace, name)
}

/// Convert a typed resource into its untyped form, filling in apiVersion/kind
pub fn to_dynamic<K>(obj: &K) -> Result<DynamicObject>
where
    K: Resource<DynamicType = ()> + Serialize,
{
    let mut value = serde_json::to_value(obj)?;
    value["apiVersion"] = serde_json::Value::String(K::api_version(&()).into_owned());
    value["kind"] = serde_json::Value::String(K::kind(&()).into_owned());
    Ok(serde_json::from_value(value)?)
}

/// Convert an untyped object into a typed resource
pub fn from_dynamic<K: DeserializeOwned>(obj: &DynamicObject) -> Result<K> {
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}

pub async fn get_typed<K>(gateway: &dyn ClusterGateway, namespace: Option<&str>, name: &str) -> Result<K>
where
    K: Resource<DynamicType = ()> + DeserializeOwned,
{
    let obj = gateway.get(&key_for::<K>(namespace, name)).await?;
    from_dynamic(&obj)
}

pub async fn list_typed<K>(
    gateway: &dyn ClusterGateway,
    namespace: Option<&str>,
    label_selector: Option<&str>,
) -> Result<Vec<K>>
where
    K: Resource<DynamicType = ()> + DeserializeOwned,
{
    gateway
        .list(&gvk_for::<K>(), namespace, label_selector)
        .await?
        .iter()
        .map(from_dynamic::<K>)
        .collect()
}
