//! Terraform-style IaC backend
//!
//! Materializes a Resource as a Flux `GitRepository` source plus a
//! `infra.contrib.fluxcd.io/v1alpha2 Terraform` object referencing it. The
//! expanded resource properties become Terraform vars; outputs are read from
//! the secret the Terraform controller writes, with the key list taken from
//! `status.availableOutputs`.

use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, ApiResource, DynamicObject, GroupVersionKind, PostParams};
use kube::{Client, ResourceExt};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::info;

use crate::crd::{Resource, ResourceRefProvisioner};
use crate::error::{Error, Result};

use super::{
    owned_object, provisioner_properties, read_ready_condition, ProvisionedObject,
    ProvisionedState, ProvisionedStatus,
};

const REPO_GROUP: &str = "source.toolkit.fluxcd.io";
const REPO_VERSION: &str = "v1";
const REPO_KIND: &str = "GitRepository";
const REPO_PLURAL: &str = "gitrepositories";

const TERRAFORM_GROUP: &str = "infra.contrib.fluxcd.io";
const TERRAFORM_VERSION: &str = "v1alpha2";
const TERRAFORM_KIND: &str = "Terraform";
const TERRAFORM_PLURAL: &str = "terraforms";

/// Backend driving Terraform objects through the Flux toolkit
pub struct OpenTofuProvisioner {
    client: Client,
    properties: OpenTofuProperties,
}

#[derive(Clone, Debug, Deserialize)]
pub(crate) struct OpenTofuProperties {
    pub git: OpenTofuGitProperties,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OpenTofuGitProperties {
    pub repo: String,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub dir: Option<String>,
}

impl OpenTofuProvisioner {
    pub fn new(client: Client, provisioner: &ResourceRefProvisioner) -> Result<Self> {
        Ok(Self {
            client,
            properties: provisioner_properties(provisioner)?,
        })
    }

    pub async fn run(&self, resource: &Resource) -> Result<ProvisionedStatus> {
        let repo = self.get_or_create_repo(resource).await?;
        let terraform = self.get_or_create_terraform(&repo.name_any(), resource).await?;

        let provisioned = ProvisionedObject {
            group: TERRAFORM_GROUP.to_string(),
            version: TERRAFORM_VERSION.to_string(),
            kind: TERRAFORM_KIND.to_string(),
            name: terraform.name_any(),
        };

        match read_ready_condition(&terraform.data) {
            Some(true) => {
                let outputs = self.read_outputs(&terraform).await?;
                Ok(ProvisionedStatus {
                    resource: provisioned,
                    state: ProvisionedState::Success,
                    outputs,
                })
            }
            Some(false) => Ok(ProvisionedStatus {
                resource: provisioned,
                state: ProvisionedState::Failed,
                outputs: Map::new(),
            }),
            None => Ok(ProvisionedStatus {
                resource: provisioned,
                state: ProvisionedState::Running,
                outputs: Map::new(),
            }),
        }
    }

    // One GitRepository per ResourceRef and namespace; shared by every
    // resource of that kind scheduled there.
    async fn get_or_create_repo(&self, resource: &Resource) -> Result<DynamicObject> {
        let gvk = GroupVersionKind::gvk(REPO_GROUP, REPO_VERSION, REPO_KIND);
        let api_resource = ApiResource::from_gvk_with_plural(&gvk, REPO_PLURAL);
        let namespace = resource.namespace().unwrap_or_default();
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), &namespace, &api_resource);

        let name = resource.spec.resource_ref.clone();
        if let Some(existing) = api.get_opt(&name).await? {
            return Ok(existing);
        }

        let spec = json!({
            "interval": "60s",
            "url": self.properties.git.repo,
            "ref": { "branch": self.properties.git.branch },
        });
        let repo = owned_object(&name, resource, &api_resource, json!({ "spec": spec }))?;

        info!(repository = %name, namespace = %namespace, "creating GitRepository object");
        Ok(api.create(&PostParams::default(), &repo).await?)
    }

    async fn get_or_create_terraform(
        &self,
        repo_name: &str,
        resource: &Resource,
    ) -> Result<DynamicObject> {
        let gvk = GroupVersionKind::gvk(TERRAFORM_GROUP, TERRAFORM_VERSION, TERRAFORM_KIND);
        let api_resource = ApiResource::from_gvk_with_plural(&gvk, TERRAFORM_PLURAL);
        let namespace = resource.namespace().unwrap_or_default();
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), &namespace, &api_resource);

        let name = resource.name_any();
        let spec = terraform_spec(&self.properties, repo_name, resource);
        if let Some(mut existing) = api.get_opt(&name).await? {
            if existing.data.pointer("/spec") != Some(&spec) {
                if let Value::Object(data) = &mut existing.data {
                    data.insert("spec".to_string(), spec);
                }
                existing = api.replace(&name, &PostParams::default(), &existing).await?;
                info!(terraform = %name, namespace = %namespace, "updated Terraform spec");
            }
            return Ok(existing);
        }

        let terraform = owned_object(&name, resource, &api_resource, json!({ "spec": spec }))?;

        info!(terraform = %name, namespace = %namespace, "creating Terraform object");
        Ok(api.create(&PostParams::default(), &terraform).await?)
    }

    async fn read_outputs(&self, terraform: &DynamicObject) -> Result<Map<String, Value>> {
        let Some(secret_name) = terraform
            .data
            .pointer("/spec/writeOutputsToSecret/name")
            .and_then(Value::as_str)
        else {
            return Err(Error::provisioner(format!(
                "no outputs secret declared in spec.writeOutputsToSecret of Terraform object {}",
                terraform.name_any()
            )));
        };

        let Some(available) = terraform
            .data
            .pointer("/status/availableOutputs")
            .and_then(Value::as_array)
        else {
            return Ok(Map::new());
        };

        let namespace = terraform.namespace().unwrap_or_default();
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), &namespace);
        let secret = secrets.get(secret_name).await.map_err(|e| {
            Error::provisioner(format!("unable to read outputs secret {secret_name}: {e}"))
        })?;
        let data = secret.data.unwrap_or_default();

        let mut outputs = Map::new();
        for name in available.iter().filter_map(Value::as_str) {
            if let Some(bytes) = data.get(name) {
                outputs.insert(
                    name.to_string(),
                    Value::String(String::from_utf8_lossy(&bytes.0).into_owned()),
                );
            }
        }
        Ok(outputs)
    }
}

// Deterministic Terraform template. Vars iterate a sorted property map, so
// the object is stable across passes.
fn terraform_spec(properties: &OpenTofuProperties, repo_name: &str, resource: &Resource) -> Value {
    let inputs = resource
        .spec
        .properties
        .as_ref()
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    let vars: Vec<Value> = inputs
        .iter()
        .map(|(name, input)| json!({ "name": name, "value": input }))
        .collect();

    json!({
        "interval": "60s",
        "approvePlan": "auto",
        "path": properties.git.dir,
        "sourceRef": {
            "kind": REPO_KIND,
            "name": repo_name,
            "namespace": resource.namespace().unwrap_or_default(),
        },
        "vars": vars,
        "writeOutputsToSecret": {
            "name": format!("{}-outputs", resource.name_any()),
        },
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
                name: Some("g.p.bucket".to_string()),
                namespace: Some("g".to_string()),
                ..Default::default()
            },
            spec: ResourceSpec {
                placement: "account-1".to_string(),
                resource_ref: "bucket".to_string(),
                properties: Some(json!({"name": "assets", "acl": "private"})),
            },
            status: None,
        }
    }

    fn sample_properties() -> OpenTofuProperties {
        OpenTofuProperties {
            git: OpenTofuGitProperties {
                repo: "https://github.com/org/modules".to_string(),
                branch: Some("main".to_string()),
                dir: Some("bucket".to_string()),
            },
        }
    }

    #[test]
    fn terraform_spec_lists_vars_in_sorted_order() {
        let spec = terraform_spec(&sample_properties(), "bucket", &sample_resource());
        let vars = spec["vars"].as_array().unwrap();
        assert_eq!(vars.len(), 2);
        assert_eq!(vars[0]["name"], "acl");
        assert_eq!(vars[1]["name"], "name");
        assert_eq!(vars[1]["value"], "assets");
    }

    #[test]
    fn terraform_spec_writes_outputs_to_named_secret() {
        let spec = terraform_spec(&sample_properties(), "bucket", &sample_resource());
        assert_eq!(spec["writeOutputsToSecret"]["name"], "g.p.bucket-outputs");
        assert_eq!(spec["sourceRef"]["name"], "bucket");
        assert_eq!(spec["sourceRef"]["namespace"], "g");
    }
}
