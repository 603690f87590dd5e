//! Namespace reconciler
//!
//! Bootstraps managed namespaces with the RBAC bindings the backends need:
//! the Terraform-style backend spawns runner pods under the `tf-runner`
//! service account, which must be bound to its cluster role in every
//! namespace resources land in. Read-then-create, idempotent.

use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::api::rbac::v1::{RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, PostParams};
use kube::runtime::controller::Action;
use kube::ResourceExt;
use tracing::info;

use crate::controllers::Context;
use crate::error::Result;

pub const OPENTOFU_CLUSTER_ROLE: &str = "tf-runner-role";
pub const OPENTOFU_SERVICE_ACCOUNT: &str = "tf-runner";
pub const OPENTOFU_ROLE_BINDING: &str = "opentofu-runner";

pub async fn reconcile(namespace: &Namespace, ctx: &Context) -> Result<Action> {
    let namespace_name = namespace.name_any();
    let api: Api<RoleBinding> = Api::namespaced(ctx.client.clone(), &namespace_name);

    if api.get_opt(OPENTOFU_ROLE_BINDING).await?.is_some() {
        return Ok(Action::await_change());
    }

    let binding = runner_role_binding(&namespace_name);
    api.create(&PostParams::default(), &binding).await?;
    info!(namespace = %namespace_name, "created RoleBinding for OpenTofu runners");

    Ok(Action::await_change())
}

fn runner_role_binding(namespace: &str) -> RoleBinding {
    RoleBinding {
        metadata: ObjectMeta {
            name: Some(OPENTOFU_ROLE_BINDING.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "ClusterRole".to_string(),
            name: OPENTOFU_CLUSTER_ROLE.to_string(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: OPENTOFU_SERVICE_ACCOUNT.to_string(),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        }]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_binding_targets_runner_service_account() {
        let binding = runner_role_binding("my-group");
        assert_eq!(binding.metadata.name.as_deref(), Some(OPENTOFU_ROLE_BINDING));
        assert_eq!(binding.role_ref.name, OPENTOFU_CLUSTER_ROLE);
        let subjects = binding.subjects.unwrap();
        assert_eq!(subjects.len(), 1);
        assert_eq!(subjects[0].name, OPENTOFU_SERVICE_ACCOUNT);
        assert_eq!(subjects[0].namespace.as_deref(), Some("my-group"));
    }
}
