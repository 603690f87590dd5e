//! ResourceGroupDeployment Custom Resource Definition
//!
//! One per (group, placement) pair, named `<group>.<placement>`, living in the
//! group-owned namespace. The unit of ordered execution: the planner walks
//! its resources in stable topological order.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::{
    Condition, ResourceGroupElement, ResourceGroupRef, ResourceStatus, REASON_DEPLOYMENT_DONE,
    REASON_DEPLOYMENT_FAILED, REASON_DEPLOYMENT_IN_PROGRESS,
};

/// ResourceGroupDeployment resource specification
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "resources.klaudio.nubank.io",
    version = "v1alpha1",
    kind = "ResourceGroupDeployment",
    plural = "resourcegroupdeployments",
    singular = "resourcegroupdeployment",
    shortname = "rgd",
    namespaced,
    status = "ResourceGroupDeploymentStatus",
    printcolumn = r#"{"name": "Phase", "type": "string", "jsonPath": ".status.phase"}"#,
    printcolumn = r#"{"name": "Placement", "type": "string", "jsonPath": ".spec.placement"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ResourceGroupDeploymentSpec {
    /// Target environment this deployment materializes at
    pub placement: String,

    /// Bundle parameters, mirrored from the group
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,

    /// External references, mirrored from the group
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub refs: Vec<ResourceGroupRef>,

    /// Resource instances, mirrored from the group
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<ResourceGroupElement>,
}

/// Deployment (and group) phase
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum DeploymentPhase {
    #[serde(rename = "DeploymentInProgress")]
    InProgress,
    #[serde(rename = "DeploymentDone")]
    Done,
    #[serde(rename = "DeploymentFailed")]
    Failed,
}

impl DeploymentPhase {
    /// Condition reason matching this phase
    pub fn reason(&self) -> &'static str {
        match self {
            DeploymentPhase::InProgress => REASON_DEPLOYMENT_IN_PROGRESS,
            DeploymentPhase::Done => REASON_DEPLOYMENT_DONE,
            DeploymentPhase::Failed => REASON_DEPLOYMENT_FAILED,
        }
    }
}

/// ResourceGroupDeployment status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceGroupDeploymentStatus {
    /// Status snapshot of every scheduled Resource, keyed by object name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resources: BTreeMap<String, ResourceStatus>,

    /// Deployment phase
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<DeploymentPhase>,

    /// Status conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}
