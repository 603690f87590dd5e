//! Resolution of external object references
//!
//! Each entry of `spec.refs` names an arbitrary object in the store. The
//! whole body of the resolved object is recorded under the ref name and
//! exposed to property expressions as `refs.<name>`.

use kube::api::{Api, ApiResource, DynamicObject, GroupVersionKind};
use kube::Client;
use serde_json::{Map, Value};

use crate::crd::ResourceGroupRef;
use crate::error::{Error, Result};

/// Registry of resolved reference bodies, keyed by ref name
#[derive(Debug, Default)]
pub struct References {
    all: Map<String, Value>,
}

impl References {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the referenced object and record its full body under the ref
    /// name. A missing object is a transient error; a malformed apiVersion is
    /// fatal for the current generation.
    pub async fn resolve(&mut self, client: &Client, reference: &ResourceGroupRef) -> Result<()> {
        let gvk = parse_group_version_kind(&reference.api_version, &reference.kind)?;
        let api_resource = ApiResource::from_gvk(&gvk);
        // a ref without a namespace is looked up as cluster-scoped
        let api: Api<DynamicObject> = match &reference.namespace {
            Some(namespace) => Api::namespaced_with(client.clone(), namespace, &api_resource),
            None => Api::all_with(client.clone(), &api_resource),
        };

        let object = api.get(&reference.name).await.map_err(|e| match e {
            kube::Error::Api(ref response) if response.code == 404 => Error::ref_not_ready(format!(
                "unable to find ref '{}' of kind {} ({})",
                reference.name, reference.kind, reference.api_version
            )),
            other => Error::Kube(other),
        })?;

        self.all
            .insert(reference.name.clone(), serde_json::to_value(&object)?);
        Ok(())
    }

    /// Consume the registry into the `refs` root of an evaluation scope
    pub fn into_scope_map(self) -> Map<String, Value> {
        self.all
    }
}

/// Split an apiVersion like `apps/v1` or `v1` into a GroupVersionKind
pub fn parse_group_version_kind(api_version: &str, kind: &str) -> Result<GroupVersionKind> {
    let (group, version) = match api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version),
    };
    if version.is_empty() || version.contains('/') || (!group.is_empty() && group.contains('/')) {
        return Err(Error::spec(format!("malformed apiVersion '{api_version}'")));
    }
    Ok(GroupVersionKind::gvk(group, version, kind))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_core_group_api_version() {
        let gvk = parse_group_version_kind("v1", "ConfigMap").unwrap();
        assert_eq!(gvk.group, "");
        assert_eq!(gvk.version, "v1");
        assert_eq!(gvk.kind, "ConfigMap");
    }

    #[test]
    fn parses_grouped_api_version() {
        let gvk = parse_group_version_kind("apps/v1", "Deployment").unwrap();
        assert_eq!(gvk.group, "apps");
        assert_eq!(gvk.version, "v1");
    }

    #[test]
    fn rejects_malformed_api_version() {
        assert!(parse_group_version_kind("a/b/c", "Kind").is_err());
        assert!(parse_group_version_kind("", "Kind").is_err());
        assert!(parse_group_version_kind("apps/", "Kind").is_err());
    }
}
