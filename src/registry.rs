//! Deterministic serialization of desired objects into bundle payloads.
//!
//! `k8s-openapi` types do not carry their own `apiVersion`/`kind` when
//! serialized, so every object is tagged before it enters a bundle. The
//! serialized form must be byte-stable for identical inputs so repeated
//! reconciliation does not produce spurious bundle updates.

use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};

/// Serialize a typed API object with its `apiVersion`/`kind` tags.
pub fn tagged<K>(obj: &K) -> Result<Value>
where
    K: k8s_openapi::Resource + Serialize,
{
    let mut value = serde_json::to_value(obj)?;
    let map = value
        .as_object_mut()
        .ok_or(Error::MissingObjectKey("object body"))?;
    map.insert("apiVersion".to_string(), Value::String(K::API_VERSION.to_string()));
    map.insert("kind".to_string(), Value::String(K::KIND.to_string()));
    Ok(value)
}

/// Ordered collection of tagged objects serialized into one bundle payload.
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    objects: Vec<Value>,
}

impl ResourceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add all pre-tagged objects, preserving their order.
    #[must_use]
    pub fn add_all(objects: Vec<Value>) -> Self {
        Self { objects }
    }

    pub fn add<K>(&mut self, obj: &K) -> Result<()>
    where
        K: k8s_openapi::Resource + Serialize,
    {
        self.objects.push(tagged(obj)?);
        Ok(())
    }

    /// Serialize the collection into one multi-document YAML payload.
    pub fn serialize(&self) -> Result<String> {
        let mut out = String::new();
        for object in &self.objects {
            out.push_str("---\n");
            out.push_str(&serde_yaml::to_string(object)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    fn test_configmap() -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some("webhook-config".to_string()),
                namespace: Some("shoot--test".to_string()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(
                "config.json".to_string(),
                "{}".to_string(),
            )])),
            ..Default::default()
        }
    }

    #[test]
    fn test_tagged_injects_api_version_and_kind() {
        let value = tagged(&test_configmap()).unwrap();
        assert_eq!(value["apiVersion"], "v1");
        assert_eq!(value["kind"], "ConfigMap");
        assert_eq!(value["metadata"]["name"], "webhook-config");
    }

    #[test]
    fn test_serialize_is_deterministic() {
        let mut registry = ResourceRegistry::new();
        registry.add(&test_configmap()).unwrap();
        let first = registry.serialize().unwrap();
        let second = registry.serialize().unwrap();
        assert_eq!(first, second);

        let mut other = ResourceRegistry::new();
        other.add(&test_configmap()).unwrap();
        assert_eq!(first, other.serialize().unwrap());
    }

    #[test]
    fn test_serialize_multi_document() {
        let mut registry = ResourceRegistry::new();
        registry.add(&test_configmap()).unwrap();
        registry.add(&test_configmap()).unwrap();
        let payload = registry.serialize().unwrap();
        assert_eq!(payload.matches("---\n").count(), 2);
        assert!(payload.contains("kind: ConfigMap"));
    }
}
