//! Resource Custom Resource Definition
//!
//! One per (deployment, resource name) pair, named
//! `<deployment>.<kebab(name)>`. The node the materializer drives: its spec
//! carries post-expansion properties and the ResourceRef binding; its status
//! reflects the backend object.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Condition;

/// Resource specification
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "resources.klaudio.nubank.io",
    version = "v1alpha1",
    kind = "Resource",
    plural = "resources",
    singular = "resource",
    namespaced,
    status = "ResourceStatus",
    printcolumn = r#"{"name": "Phase", "type": "string", "jsonPath": ".status.phase"}"#,
    printcolumn = r#"{"name": "Placement", "type": "string", "jsonPath": ".spec.placement"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpec {
    /// Target environment this resource materializes at
    pub placement: String,

    /// Name of the ResourceRef catalog entry
    pub resource_ref: String,

    /// Post-expansion properties, preserved verbatim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<Value>,
}

/// Resource phase
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ResourcePhase {
    Deploying,
    Failed,
    Done,
}

impl ResourcePhase {
    /// Whether the phase is terminal for the current spec generation
    pub fn is_terminal(&self) -> bool {
        matches!(self, ResourcePhase::Done | ResourcePhase::Failed)
    }
}

/// Snapshot of the backend object a provisioner drives
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceProvisionerStatus {
    /// Identity of the backend object
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<ProvisionedObjectRef>,

    /// Backend state (Running, Failed, Success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// Identity of a backend object
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionedObjectRef {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub group: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
}

/// Resource status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceStatus {
    /// Resource phase
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<ResourcePhase>,

    /// Backend object snapshot
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provisioner: Option<ResourceProvisionerStatus>,

    /// Backend outputs, preserved verbatim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Value>,

    /// Generation the current phase was observed for
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Status conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}
