//! Stack-based IaC backend
//!
//! Materializes a Resource as a `pulumi.com/v1 Stack` object built from the
//! ResourceRef's git properties. The stack program receives the expanded
//! resource properties as its config.

use kube::api::{Api, ApiResource, DynamicObject, GroupVersionKind, PostParams};
use kube::{Client, ResourceExt};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::info;

use crate::crd::{Resource, ResourceRefProvisioner};
use crate::error::Result;

use super::{
    owned_object, provisioner_properties, ProvisionedObject, ProvisionedState, ProvisionedStatus,
};

const STACK_GROUP: &str = "pulumi.com";
const STACK_VERSION: &str = "v1";
const STACK_KIND: &str = "Stack";
const STACK_PLURAL: &str = "stacks";

/// Backend driving Pulumi Stack objects
pub struct PulumiProvisioner {
    client: Client,
    properties: PulumiProperties,
}

#[derive(Clone, Debug, Deserialize)]
pub(crate) struct PulumiProperties {
    pub git: PulumiGitProperties,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PulumiGitProperties {
    pub repo: String,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub dir: Option<String>,
    #[serde(default)]
    pub interval_in_seconds: Option<i64>,
}

impl PulumiProvisioner {
    pub fn new(client: Client, provisioner: &ResourceRefProvisioner) -> Result<Self> {
        Ok(Self {
            client,
            properties: provisioner_properties(provisioner)?,
        })
    }

    pub async fn run(&self, resource: &Resource) -> Result<ProvisionedStatus> {
        let stack = self.get_or_create_stack(resource).await?;

        let provisioned = ProvisionedObject {
            group: STACK_GROUP.to_string(),
            version: STACK_VERSION.to_string(),
            kind: STACK_KIND.to_string(),
            name: stack.name_any(),
        };

        if let Some(last_update) = stack.data.pointer("/status/lastUpdate") {
            let outputs = stack
                .data
                .pointer("/status/outputs")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();

            match last_update.pointer("/state").and_then(Value::as_str) {
                Some("succeeded") => {
                    return Ok(ProvisionedStatus {
                        resource: provisioned,
                        state: ProvisionedState::Success,
                        outputs,
                    })
                }
                Some("failed") => {
                    return Ok(ProvisionedStatus {
                        resource: provisioned,
                        state: ProvisionedState::Failed,
                        outputs,
                    })
                }
                _ => {}
            }
        }

        Ok(ProvisionedStatus {
            resource: provisioned,
            state: ProvisionedState::Running,
            outputs: Map::new(),
        })
    }

    async fn get_or_create_stack(&self, resource: &Resource) -> Result<DynamicObject> {
        let gvk = GroupVersionKind::gvk(STACK_GROUP, STACK_VERSION, STACK_KIND);
        let api_resource = ApiResource::from_gvk_with_plural(&gvk, STACK_PLURAL);
        let namespace = resource.namespace().unwrap_or_default();
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), &namespace, &api_resource);

        let name = resource.name_any();
        let spec = stack_spec(&self.properties, resource);
        if let Some(mut existing) = api.get_opt(&name).await? {
            if existing.data.pointer("/spec") != Some(&spec) {
                if let Value::Object(data) = &mut existing.data {
                    data.insert("spec".to_string(), spec);
                }
                existing = api.replace(&name, &PostParams::default(), &existing).await?;
                info!(stack = %name, namespace = %namespace, "updated Stack spec");
            }
            return Ok(existing);
        }

        let stack = owned_object(&name, resource, &api_resource, json!({ "spec": spec }))?;

        info!(stack = %name, namespace = %namespace, "creating Stack object");
        Ok(api.create(&PostParams::default(), &stack).await?)
    }
}

// Deterministic Stack template: same ResourceRef properties and same expanded
// resource properties always produce the same spec.
fn stack_spec(properties: &PulumiProperties, resource: &Resource) -> Value {
    let config = resource
        .spec
        .properties
        .clone()
        .unwrap_or_else(|| Value::Object(Map::new()));

    json!({
        "stack": format!("{}.{}", resource.spec.placement, resource.name_any()),
        "projectRepo": properties.git.repo,
        "branch": properties.git.branch,
        "repoDir": properties.git.dir,
        "resyncFrequencySeconds": properties.git.interval_in_seconds,
        "config": config,
        "envRefs": {
            "PULUMI_CONFIG_PASSPHRASE": {
                "type": "Literal",
                "literal": { "value": "" }
            }
        },
        "gitAuth": {
            "accessToken": {
                "type": "Secret",
                "secret": {
                    "name": "github-access-token",
                    "namespace": "default",
                    "key": "accessToken"
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::ResourceSpec;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn sample_resource() -> Resource {
        Resource {
            metadata: ObjectMeta {
                name: Some("g.p.database".to_string()),
                namespace: Some("g".to_string()),
                ..Default::default()
            },
            spec: ResourceSpec {
                placement: "account-1".to_string(),
                resource_ref: "database".to_string(),
                properties: Some(json!({"size": "small"})),
            },
            status: None,
        }
    }

    fn sample_properties() -> PulumiProperties {
        PulumiProperties {
            git: PulumiGitProperties {
                repo: "https://github.com/org/stacks".to_string(),
                branch: Some("main".to_string()),
                dir: Some("database".to_string()),
                interval_in_seconds: Some(60),
            },
        }
    }

    #[test]
    fn stack_spec_names_stack_after_placement_and_resource() {
        let spec = stack_spec(&sample_properties(), &sample_resource());
        assert_eq!(spec["stack"], "account-1.g.p.database");
        assert_eq!(spec["projectRepo"], "https://github.com/org/stacks");
        assert_eq!(spec["config"]["size"], "small");
    }

    #[test]
    fn stack_spec_is_deterministic() {
        let first = stack_spec(&sample_properties(), &sample_resource());
        let second = stack_spec(&sample_properties(), &sample_resource());
        assert_eq!(first, second);
    }

    #[test]
    fn git_properties_deserialize_from_provisioner_config() {
        let provisioner = ResourceRefProvisioner {
            name: "pulumi".to_string(),
            properties: Some(json!({
                "git": {
                    "repo": "https://github.com/org/stacks",
                    "branch": "main",
                    "intervalInSeconds": 30,
                }
            })),
        };
        let properties: PulumiProperties = provisioner_properties(&provisioner).unwrap();
        assert_eq!(properties.git.repo, "https://github.com/org/stacks");
        assert_eq!(properties.git.branch.as_deref(), Some("main"));
        assert_eq!(properties.git.interval_in_seconds, Some(30));
        assert_eq!(properties.git.dir, None);
    }
}
