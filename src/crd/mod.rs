//! Custom Resource Definitions for the klaudio operator

mod conditions;
mod resource;
mod resource_group;
mod resource_group_deployment;
mod resource_ref;

pub use conditions::*;
pub use resource::*;
pub use resource_group::*;
pub use resource_group_deployment::*;
pub use resource_ref::*;

use std::collections::BTreeMap;

use kube::CustomResourceExt;

/// API group served by this operator
pub const API_GROUP: &str = "resources.klaudio.nubank.io";

/// API version served by this operator
pub const API_VERSION: &str = "v1alpha1";

/// Labels stamped on every object this operator owns
pub fn managed_by_labels(kind: &str, name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (format!("{API_GROUP}/managedBy.group"), API_GROUP.to_string()),
        (format!("{API_GROUP}/managedBy.version"), API_VERSION.to_string()),
        (format!("{API_GROUP}/managedBy.kind"), kind.to_string()),
        (format!("{API_GROUP}/managedBy.name"), name.to_string()),
    ])
}

/// Label key carrying the placement of an owned object
pub fn placement_label() -> String {
    format!("{API_GROUP}/placement")
}

/// Generate all CRD YAML manifests
pub fn generate_crds() -> Vec<String> {
    vec![
        serde_yaml::to_string(&ResourceRef::crd()).unwrap(),
        serde_yaml::to_string(&ResourceGroup::crd()).unwrap(),
        serde_yaml::to_string(&ResourceGroupDeployment::crd()).unwrap(),
        serde_yaml::to_string(&Resource::crd()).unwrap(),
    ]
}
