//! Provisioner backends
//!
//! Every backend implements one capability: `run` ensures a backend object
//! exists for a Resource (creating it from a deterministic template when
//! absent), reads its status, and translates it to the tri-state
//! {Running, Failed, Success}. Backends are a closed set selected by the
//! ResourceRef provisioner name.

mod crossplane;
mod opentofu;
mod pulumi;

pub use crossplane::CrossplaneProvisioner;
pub use opentofu::OpenTofuProvisioner;
pub use pulumi::PulumiProvisioner;

use kube::api::{ApiResource, DynamicObject};
use kube::{Client, Resource as _, ResourceExt};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::crd::{self, Resource, ResourceRefProvisioner};
use crate::error::{Error, Result};

pub const PULUMI_PROVISIONER_NAME: &str = "pulumi";
pub const OPENTOFU_PROVISIONER_NAME: &str = "opentofu";
pub const CROSSPLANE_PROVISIONER_NAME: &str = "crossplane";

/// Backend object state as reported by a provisioner
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProvisionedState {
    Running,
    Failed,
    Success,
}

impl ProvisionedState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisionedState::Running => "Running",
            ProvisionedState::Failed => "Failed",
            ProvisionedState::Success => "Success",
        }
    }
}

/// Identity of the backend object a provisioner drives
#[derive(Clone, Debug)]
pub struct ProvisionedObject {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub name: String,
}

/// Result of one provisioner pass
#[derive(Debug)]
pub struct ProvisionedStatus {
    pub resource: ProvisionedObject,
    pub state: ProvisionedState,
    pub outputs: Map<String, Value>,
}

impl ProvisionedStatus {
    pub fn is_running(&self) -> bool {
        self.state == ProvisionedState::Running
    }
}

/// Closed set of supported backends
pub enum Provisioner {
    Pulumi(PulumiProvisioner),
    OpenTofu(OpenTofuProvisioner),
    Crossplane(CrossplaneProvisioner),
}

impl Provisioner {
    /// Select a backend by the ResourceRef provisioner name
    pub fn select(client: Client, provisioner: &ResourceRefProvisioner) -> Result<Provisioner> {
        match provisioner.name.as_str() {
            PULUMI_PROVISIONER_NAME => {
                Ok(Provisioner::Pulumi(PulumiProvisioner::new(client, provisioner)?))
            }
            OPENTOFU_PROVISIONER_NAME => Ok(Provisioner::OpenTofu(OpenTofuProvisioner::new(
                client,
                provisioner,
            )?)),
            CROSSPLANE_PROVISIONER_NAME => Ok(Provisioner::Crossplane(CrossplaneProvisioner::new(
                client,
                provisioner,
            )?)),
            other => Err(Error::UnsupportedProvisioner(other.to_string())),
        }
    }

    /// Ensure the backend object exists and report its state
    pub async fn run(&self, resource: &Resource) -> Result<ProvisionedStatus> {
        match self {
            Provisioner::Pulumi(backend) => backend.run(resource).await,
            Provisioner::OpenTofu(backend) => backend.run(resource).await,
            Provisioner::Crossplane(backend) => backend.run(resource).await,
        }
    }
}

/// Deserialize the backend-specific configuration of a ResourceRef
pub(crate) fn provisioner_properties<T: DeserializeOwned>(
    provisioner: &ResourceRefProvisioner,
) -> Result<T> {
    let value = provisioner
        .properties
        .clone()
        .unwrap_or_else(|| Value::Object(Map::new()));
    Ok(serde_json::from_value(value)?)
}

/// Backend object labeled and owner-referenced to the Resource driving it
pub(crate) fn owned_object(
    name: &str,
    resource: &Resource,
    api_resource: &ApiResource,
    data: Value,
) -> Result<DynamicObject> {
    let namespace = resource.namespace().unwrap_or_default();
    let mut object = DynamicObject::new(name, api_resource).within(&namespace);

    let mut labels = crd::managed_by_labels("Resource", &resource.name_any());
    labels.insert(crd::placement_label(), resource.spec.placement.clone());
    object.metadata.labels = Some(labels);

    let owner = resource
        .controller_owner_ref(&())
        .ok_or_else(|| Error::provisioner("resource has no uid; cannot own the backend object"))?;
    object.metadata.owner_references = Some(vec![owner]);

    object.data = data;
    Ok(object)
}

/// Scan `status.conditions` for the Ready condition
pub(crate) fn read_ready_condition(data: &Value) -> Option<bool> {
    let conditions = data.pointer("/status/conditions")?.as_array()?;
    for condition in conditions {
        if condition.pointer("/type").and_then(Value::as_str) == Some("Ready") {
            return match condition.pointer("/status").and_then(Value::as_str) {
                Some("True") => Some(true),
                Some("False") => Some(false),
                _ => None,
            };
        }
    }
    None
}

/// Lowercase plural used as the API resource path segment of a kind
pub(crate) fn pluralize(kind: &str) -> String {
    let lower = kind.to_ascii_lowercase();
    if let Some(stem) = lower.strip_suffix('y') {
        if !stem.ends_with(|c| "aeiou".contains(c)) {
            return format!("{stem}ies");
        }
    }
    if lower.ends_with('s') || lower.ends_with('x') || lower.ends_with("ch") || lower.ends_with("sh")
    {
        return format!("{lower}es");
    }
    format!("{lower}s")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pluralize_common_kinds() {
        assert_eq!(pluralize("Stack"), "stacks");
        assert_eq!(pluralize("GitRepository"), "gitrepositories");
        assert_eq!(pluralize("Database"), "databases");
        assert_eq!(pluralize("Ingress"), "ingresses");
        assert_eq!(pluralize("Gateway"), "gateways");
    }

    #[test]
    fn ready_condition_is_read_from_status() {
        let ready = json!({"status": {"conditions": [
            {"type": "Synced", "status": "True"},
            {"type": "Ready", "status": "True"},
        ]}});
        assert_eq!(read_ready_condition(&ready), Some(true));

        let not_ready = json!({"status": {"conditions": [{"type": "Ready", "status": "False"}]}});
        assert_eq!(read_ready_condition(&not_ready), Some(false));

        let unknown = json!({"status": {"conditions": [{"type": "Ready", "status": "Unknown"}]}});
        assert_eq!(read_ready_condition(&unknown), None);

        assert_eq!(read_ready_condition(&json!({})), None);
    }

    #[test]
    fn missing_properties_deserialize_as_empty_object() {
        #[derive(serde::Deserialize, Default)]
        struct NoConfig {}

        let provisioner = ResourceRefProvisioner {
            name: PULUMI_PROVISIONER_NAME.to_string(),
            properties: None,
        };
        let _: NoConfig = provisioner_properties(&provisioner).unwrap();
    }

    #[test]
    fn malformed_properties_are_rejected() {
        #[derive(serde::Deserialize)]
        struct Strict {
            #[allow(dead_code)]
            required: String,
        }

        let provisioner = ResourceRefProvisioner {
            name: PULUMI_PROVISIONER_NAME.to_string(),
            properties: Some(json!({"unrelated": true})),
        };
        let result: crate::error::Result<Strict> = provisioner_properties(&provisioner);
        assert!(result.is_err());
    }
}
