//! Managed-object backend
//!
//! Materializes a Resource as a single custom resource of the kind named by
//! the ResourceRef's `objectRef` properties. The expanded resource
//! properties become the object's spec; outputs come from
//! `status.atProvider`.

use kube::api::{Api, ApiResource, DynamicObject, PostParams};
use kube::{Client, ResourceExt};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::info;

use crate::crd::{Resource, ResourceRefProvisioner};
use crate::error::Result;
use crate::refs::parse_group_version_kind;

use super::{
    owned_object, pluralize, provisioner_properties, read_ready_condition, ProvisionedObject,
    ProvisionedState, ProvisionedStatus,
};

/// Backend driving arbitrary managed custom resources
pub struct CrossplaneProvisioner {
    client: Client,
    properties: CrossplaneProperties,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CrossplaneProperties {
    pub object_ref: CrossplaneObjectRef,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CrossplaneObjectRef {
    pub api_version: String,
    pub kind: String,
}

impl CrossplaneProvisioner {
    pub fn new(client: Client, provisioner: &ResourceRefProvisioner) -> Result<Self> {
        Ok(Self {
            client,
            properties: provisioner_properties(provisioner)?,
        })
    }

    pub async fn run(&self, resource: &Resource) -> Result<ProvisionedStatus> {
        let object = self.get_or_create_object(resource).await?;

        let gvk = parse_group_version_kind(
            &self.properties.object_ref.api_version,
            &self.properties.object_ref.kind,
        )?;
        let provisioned = ProvisionedObject {
            group: gvk.group,
            version: gvk.version,
            kind: gvk.kind,
            name: object.name_any(),
        };

        let outputs = object
            .data
            .pointer("/status/atProvider")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        match read_ready_condition(&object.data) {
            Some(true) => Ok(ProvisionedStatus {
                resource: provisioned,
                state: ProvisionedState::Success,
                outputs,
            }),
            Some(false) => Ok(ProvisionedStatus {
                resource: provisioned,
                state: ProvisionedState::Failed,
                outputs,
            }),
            None => Ok(ProvisionedStatus {
                resource: provisioned,
                state: ProvisionedState::Running,
                outputs,
            }),
        }
    }

    async fn get_or_create_object(&self, resource: &Resource) -> Result<DynamicObject> {
        let gvk = parse_group_version_kind(
            &self.properties.object_ref.api_version,
            &self.properties.object_ref.kind,
        )?;
        let plural = pluralize(&gvk.kind);
        let api_resource = ApiResource::from_gvk_with_plural(&gvk, &plural);
        let namespace = resource.namespace().unwrap_or_default();
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), &namespace, &api_resource);

        let name = resource.name_any();
        let spec = resource
            .spec
            .properties
            .clone()
            .unwrap_or_else(|| Value::Object(Map::new()));
        if let Some(mut existing) = api.get_opt(&name).await? {
            if existing.data.pointer("/spec") != Some(&spec) {
                if let Value::Object(data) = &mut existing.data {
                    data.insert("spec".to_string(), spec);
                }
                existing = api.replace(&name, &PostParams::default(), &existing).await?;
                info!(
                    kind = %self.properties.object_ref.kind,
                    object = %name,
                    namespace = %namespace,
                    "updated managed object spec"
                );
            }
            return Ok(existing);
        }

        let object = owned_object(&name, resource, &api_resource, json!({ "spec": spec }))?;

        info!(
            kind = %self.properties.object_ref.kind,
            object = %name,
            namespace = %namespace,
            "creating managed object"
        );
        Ok(api.create(&PostParams::default(), &object).await?)
    }
}
