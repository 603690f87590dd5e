//! ResourceRef Custom Resource Definition
//!
//! A cluster-scoped catalog entry describing one provisionable resource kind:
//! which backend materializes it and which properties it accepts.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::Condition;

/// ResourceRef resource specification
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "resources.klaudio.nubank.io",
    version = "v1alpha1",
    kind = "ResourceRef",
    plural = "resourcerefs",
    singular = "resourceref",
    status = "ResourceRefStatus",
    printcolumn = r#"{"name": "Status", "type": "string", "jsonPath": ".status.status"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRefSpec {
    /// Backend binding for resources of this kind
    pub provisioner: ResourceRefProvisioner,

    /// Accepted properties for resources of this kind
    pub schema: ResourceRefSchema,
}

/// Provisioner binding
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRefProvisioner {
    /// Provisioner name (pulumi, opentofu, crossplane)
    pub name: String,

    /// Backend-specific configuration, preserved verbatim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<Value>,
}

/// Recursive description of the properties a resource kind accepts
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRefSchema {
    /// Value type (string, number, integer, boolean, object, array)
    #[serde(rename = "type")]
    pub schema_type: String,

    /// Human-readable description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Nested properties; only valid for object schemas
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, ResourceRefSchema>,
}

/// Catalog entry state
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ResourceRefState {
    Ready,
    Invalid,
}

/// ResourceRef status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRefStatus {
    /// Catalog entry state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ResourceRefState>,

    /// Target environments resources of this kind can be materialized at;
    /// never empty once Ready
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub placements: Vec<String>,

    /// Status conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}
