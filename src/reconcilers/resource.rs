//! Resource reconciler
//!
//! The materializer: dispatches a Resource to its provisioner backend,
//! observes the backend object, and translates the tri-state
//! {Running, Failed, Success} into the Resource phase. Terminal phases are
//! sticky for a given spec generation.

use kube::api::Api;
use kube::runtime::controller::Action;
use kube::ResourceExt;
use serde_json::Value;
use tracing::{info, warn};

use crate::controllers::Context;
use crate::crd::{
    set_condition, Condition, ProvisionedObjectRef, Resource, ResourcePhase,
    ResourceProvisionerStatus, ResourceRef, CONDITION_FALSE, CONDITION_TRUE,
    CONDITION_TYPE_FAILED, CONDITION_TYPE_IN_PROGRESS, CONDITION_TYPE_READY, CONDITION_UNKNOWN,
    REASON_DEPLOYMENT_DONE, REASON_DEPLOYMENT_FAILED, REASON_DEPLOYMENT_IN_PROGRESS,
    REASON_RECONCILING, REASON_UNSUPPORTED_PROVISIONER,
};
use crate::error::{Error, Result};
use crate::metrics;
use crate::provisioners::{ProvisionedState, ProvisionedStatus, Provisioner};
use crate::reconcilers::{update_status, REQUEUE_DELAY};

pub async fn reconcile(resource: &Resource, ctx: &Context) -> Result<Action> {
    let name = resource.name_any();
    let namespace = resource.namespace().unwrap_or_default();
    let api: Api<Resource> = Api::namespaced(ctx.client.clone(), &namespace);
    let generation = resource.metadata.generation;

    // a terminal phase stays until the spec changes
    if let Some(status) = &resource.status {
        if status.observed_generation == generation
            && status.phase.map_or(false, |phase| phase.is_terminal())
        {
            return Ok(Action::await_change());
        }
    }

    // first observation seeds the phase and a Reconciling condition
    if resource
        .status
        .as_ref()
        .map_or(true, |s| s.conditions.is_empty())
    {
        let message = format!("Starting reconciliation from Resource {name}");
        update_status(&api, &name, |latest: &mut Resource| {
            let status = latest.status.get_or_insert_with(Default::default);
            status.phase = Some(ResourcePhase::Deploying);
            set_condition(
                &mut status.conditions,
                Condition::new(
                    CONDITION_TYPE_IN_PROGRESS,
                    CONDITION_UNKNOWN,
                    REASON_RECONCILING,
                    message.clone(),
                ),
            );
        })
        .await?;
    }

    let refs_api: Api<ResourceRef> = Api::all(ctx.client.clone());
    let Some(resource_ref) = refs_api.get_opt(&resource.spec.resource_ref).await? else {
        warn!(
            resource = %name,
            resource_ref = %resource.spec.resource_ref,
            "ResourceRef not found"
        );
        let message = format!("ResourceRef '{}' not found", resource.spec.resource_ref);
        update_status(&api, &name, |latest: &mut Resource| {
            let status = latest.status.get_or_insert_with(Default::default);
            set_condition(
                &mut status.conditions,
                Condition::new(
                    CONDITION_TYPE_FAILED,
                    CONDITION_FALSE,
                    REASON_DEPLOYMENT_FAILED,
                    message.clone(),
                ),
            );
        })
        .await?;
        return Ok(Action::await_change());
    };

    let provisioner_name = resource_ref.spec.provisioner.name.clone();
    let provisioner = match Provisioner::select(ctx.client.clone(), &resource_ref.spec.provisioner)
    {
        Ok(provisioner) => provisioner,
        Err(Error::UnsupportedProvisioner(unsupported)) => {
            // the Resource stays Deploying; the catalog entry must change
            warn!(resource = %name, provisioner = %unsupported, "unsupported provisioner");
            let message = format!("Unsupported ResourceRef provisioner: {unsupported}");
            update_status(&api, &name, |latest: &mut Resource| {
                let status = latest.status.get_or_insert_with(Default::default);
                status.phase = Some(ResourcePhase::Deploying);
                set_condition(
                    &mut status.conditions,
                    Condition::new(
                        CONDITION_TYPE_FAILED,
                        CONDITION_FALSE,
                        REASON_UNSUPPORTED_PROVISIONER,
                        message.clone(),
                    ),
                );
            })
            .await?;
            return Ok(Action::await_change());
        }
        Err(e) => return Err(e),
    };

    info!(resource = %name, provisioner = %provisioner_name, "running provisioner");

    let provisioned = match provisioner.run(resource).await {
        Ok(provisioned) => provisioned,
        Err(e) => {
            warn!(resource = %name, provisioner = %provisioner_name, error = %e, "provisioner failed");
            metrics::PROVISIONS_TOTAL
                .with_label_values(&["error", &provisioner_name])
                .inc();
            let message = format!("Failed to run provisioner {provisioner_name}: {e}");
            update_status(&api, &name, |latest: &mut Resource| {
                let status = latest.status.get_or_insert_with(Default::default);
                status.phase = Some(ResourcePhase::Failed);
                status.observed_generation = generation;
                set_condition(
                    &mut status.conditions,
                    Condition::new(
                        CONDITION_TYPE_FAILED,
                        CONDITION_FALSE,
                        REASON_DEPLOYMENT_FAILED,
                        message.clone(),
                    ),
                );
            })
            .await?;
            return Ok(Action::await_change());
        }
    };

    info!(
        resource = %name,
        provisioner = %provisioner_name,
        state = provisioned.state.as_str(),
        "observed backend state"
    );

    let snapshot = provisioner_snapshot(&provisioned);
    match provisioned.state {
        ProvisionedState::Running => {
            update_status(&api, &name, |latest: &mut Resource| {
                let status = latest.status.get_or_insert_with(Default::default);
                status.phase = Some(ResourcePhase::Deploying);
                status.provisioner = Some(snapshot.clone());
                set_condition(
                    &mut status.conditions,
                    Condition::new(
                        CONDITION_TYPE_READY,
                        CONDITION_UNKNOWN,
                        REASON_DEPLOYMENT_IN_PROGRESS,
                        format!("Deployment from Resource {name} is running"),
                    ),
                );
            })
            .await?;
            Ok(Action::requeue(REQUEUE_DELAY))
        }
        ProvisionedState::Success => {
            metrics::PROVISIONS_TOTAL
                .with_label_values(&["success", &provisioner_name])
                .inc();
            let outputs = Value::Object(provisioned.outputs.clone());
            update_status(&api, &name, |latest: &mut Resource| {
                let status = latest.status.get_or_insert_with(Default::default);
                status.phase = Some(ResourcePhase::Done);
                status.provisioner = Some(snapshot.clone());
                status.outputs = Some(outputs.clone());
                status.observed_generation = generation;
                set_condition(
                    &mut status.conditions,
                    Condition::new(
                        CONDITION_TYPE_READY,
                        CONDITION_TRUE,
                        REASON_DEPLOYMENT_DONE,
                        format!("Deployment from Resource {name} was successfully finished"),
                    ),
                );
            })
            .await?;
            Ok(Action::await_change())
        }
        ProvisionedState::Failed => {
            metrics::PROVISIONS_TOTAL
                .with_label_values(&["failure", &provisioner_name])
                .inc();
            update_status(&api, &name, |latest: &mut Resource| {
                let status = latest.status.get_or_insert_with(Default::default);
                status.phase = Some(ResourcePhase::Failed);
                status.provisioner = Some(snapshot.clone());
                status.observed_generation = generation;
                set_condition(
                    &mut status.conditions,
                    Condition::new(
                        CONDITION_TYPE_READY,
                        CONDITION_FALSE,
                        REASON_DEPLOYMENT_FAILED,
                        format!("Deployment from Resource {name} failed"),
                    ),
                );
            })
            .await?;
            Ok(Action::await_change())
        }
    }
}

fn provisioner_snapshot(provisioned: &ProvisionedStatus) -> ResourceProvisionerStatus {
    ResourceProvisionerStatus {
        resource: Some(ProvisionedObjectRef {
            group: provisioned.resource.group.clone(),
            version: provisioned.resource.version.clone(),
            kind: provisioned.resource.kind.clone(),
            name: provisioned.resource.name.clone(),
        }),
        state: Some(provisioned.state.as_str().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provisioners::ProvisionedObject;
    use serde_json::Map;

    #[test]
    fn snapshot_records_backend_identity_and_state() {
        let provisioned = ProvisionedStatus {
            resource: ProvisionedObject {
                group: "pulumi.com".to_string(),
                version: "v1".to_string(),
                kind: "Stack".to_string(),
                name: "g.p.database".to_string(),
            },
            state: ProvisionedState::Success,
            outputs: Map::new(),
        };
        let snapshot = provisioner_snapshot(&provisioned);
        assert_eq!(snapshot.state.as_deref(), Some("Success"));
        let object = snapshot.resource.unwrap();
        assert_eq!(object.kind, "Stack");
        assert_eq!(object.name, "g.p.database");
    }

    #[test]
    fn terminal_phases_are_terminal() {
        assert!(ResourcePhase::Done.is_terminal());
        assert!(ResourcePhase::Failed.is_terminal());
        assert!(!ResourcePhase::Deploying.is_terminal());
    }
}
