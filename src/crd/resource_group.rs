//! ResourceGroup Custom Resource Definition
//!
//! A cluster-scoped bundle of resource instances. The operator owns a
//! namespace named after the group and one ResourceGroupDeployment per
//! placement; everything below cascades through owner references.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::{Condition, DeploymentPhase, ResourceGroupDeploymentStatus};

/// ResourceGroup resource specification
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "resources.klaudio.nubank.io",
    version = "v1alpha1",
    kind = "ResourceGroup",
    plural = "resourcegroups",
    singular = "resourcegroup",
    status = "ResourceGroupStatus",
    printcolumn = r#"{"name": "Phase", "type": "string", "jsonPath": ".status.phase"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ResourceGroupSpec {
    /// Bundle parameters, preserved verbatim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,

    /// External objects exposed to property expressions under `refs.<name>`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub refs: Vec<ResourceGroupRef>,

    /// Resource instances; names are unique within the group
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<ResourceGroupElement>,
}

/// Handle to an external object
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceGroupRef {
    /// Name the object is exposed under in expressions
    pub name: String,

    /// apiVersion of the referenced object
    pub api_version: String,

    /// Kind of the referenced object
    pub kind: String,

    /// Namespace of the referenced object; absent for cluster-scoped objects
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// One resource instance of the bundle
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceGroupElement {
    /// Name, unique within the group
    pub name: String,

    /// Name of the ResourceRef catalog entry
    pub resource_ref: String,

    /// Properties, possibly containing `${…}` expressions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<Value>,
}

/// ResourceGroup status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceGroupStatus {
    /// Status snapshot of every owned deployment, keyed by deployment name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub deployments: BTreeMap<String, ResourceGroupDeploymentStatus>,

    /// Aggregated group phase
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<DeploymentPhase>,

    /// Status conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}
