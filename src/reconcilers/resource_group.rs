//! ResourceGroup reconciler
//!
//! Fans a bundle out across placements: ensures the group-owned namespace
//! exists, computes the placement union over all referenced ResourceRefs,
//! creates or updates one ResourceGroupDeployment per placement, and
//! aggregates deployment phases back into the group status.

use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, PostParams};
use kube::runtime::controller::Action;
use kube::{Resource as _, ResourceExt};
use tracing::{info, warn};

use crate::controllers::Context;
use crate::crd::{
    managed_by_labels, placement_label, set_condition, Condition, DeploymentPhase, ResourceGroup,
    ResourceGroupDeployment, ResourceGroupDeploymentSpec, ResourceGroupDeploymentStatus,
    ResourceRef, ResourceRefState, CONDITION_FALSE, CONDITION_TRUE, CONDITION_TYPE_READY,
    CONDITION_UNKNOWN, REASON_NAMESPACE_CREATION_FAILED,
};
use crate::error::{Error, Result};
use crate::names;
use crate::reconcilers::{update_spec, update_status, REQUEUE_DELAY};

pub async fn reconcile(group: &ResourceGroup, ctx: &Context) -> Result<Action> {
    let name = group.name_any();
    let api: Api<ResourceGroup> = Api::all(ctx.client.clone());

    // step 1: the group owns a namespace named after it
    if let Err(e) = ensure_namespace(group, ctx).await {
        warn!(group = %name, error = %e, "unable to create the group namespace");
        let message = format!("Unable to create namespace {name}: {e}");
        update_status(&api, &name, |latest: &mut ResourceGroup| {
            let status = latest.status.get_or_insert_with(Default::default);
            set_condition(
                &mut status.conditions,
                Condition::new(
                    CONDITION_TYPE_READY,
                    CONDITION_FALSE,
                    REASON_NAMESPACE_CREATION_FAILED,
                    message.clone(),
                ),
            );
        })
        .await?;
        return Ok(Action::await_change());
    }

    // step 2: placement union across every referenced ResourceRef
    let placements = placements_union(group, ctx).await?;

    // step 3: one deployment per placement, created or CAS-updated
    for placement in &placements {
        ensure_deployment(group, placement, ctx).await?;
    }

    // step 4: aggregate phases from the owned deployments
    let deployments_api: Api<ResourceGroupDeployment> =
        Api::namespaced(ctx.client.clone(), &name);
    let mut snapshots: BTreeMap<String, ResourceGroupDeploymentStatus> = BTreeMap::new();
    for placement in &placements {
        let deployment_name = names::deployment_name(&name, placement);
        if let Some(deployment) = deployments_api.get_opt(&deployment_name).await? {
            snapshots.insert(deployment_name, deployment.status.unwrap_or_default());
        }
    }
    let phase = aggregate_group_phase(&snapshots);

    // step 5: publish the aggregate
    let condition_status = match phase {
        DeploymentPhase::Done => CONDITION_TRUE,
        DeploymentPhase::InProgress => CONDITION_UNKNOWN,
        DeploymentPhase::Failed => CONDITION_FALSE,
    };
    update_status(&api, &name, |latest: &mut ResourceGroup| {
        let status = latest.status.get_or_insert_with(Default::default);
        status.deployments = snapshots.clone();
        status.phase = Some(phase);
        set_condition(
            &mut status.conditions,
            Condition::new(
                CONDITION_TYPE_READY,
                condition_status,
                phase.reason(),
                format!("ResourceGroup {name} has {} deployment(s)", placements.len()),
            ),
        );
    })
    .await?;

    if phase == DeploymentPhase::InProgress {
        return Ok(Action::requeue(REQUEUE_DELAY));
    }
    Ok(Action::await_change())
}

/// Phase aggregation over owned deployments: anything still running keeps the
/// group in progress; otherwise a single failure fails the group.
pub fn aggregate_group_phase(
    deployments: &BTreeMap<String, ResourceGroupDeploymentStatus>,
) -> DeploymentPhase {
    let mut failed = false;
    for status in deployments.values() {
        match status.phase {
            Some(DeploymentPhase::InProgress) | None => return DeploymentPhase::InProgress,
            Some(DeploymentPhase::Failed) => failed = true,
            Some(DeploymentPhase::Done) => {}
        }
    }
    if failed {
        DeploymentPhase::Failed
    } else {
        DeploymentPhase::Done
    }
}

async fn ensure_namespace(group: &ResourceGroup, ctx: &Context) -> Result<()> {
    let api: Api<Namespace> = Api::all(ctx.client.clone());
    let name = group.name_any();
    if api.get_opt(&name).await?.is_some() {
        return Ok(());
    }

    let owner = group
        .controller_owner_ref(&())
        .ok_or_else(|| Error::spec(format!("ResourceGroup {name} has no uid")))?;
    let namespace = Namespace {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            labels: Some(managed_by_labels("ResourceGroup", &name)),
            owner_references: Some(vec![owner]),
            ..Default::default()
        },
        ..Default::default()
    };
    api.create(&PostParams::default(), &namespace).await?;
    info!(namespace = %name, "created namespace for ResourceGroup");
    Ok(())
}

async fn placements_union(group: &ResourceGroup, ctx: &Context) -> Result<Vec<String>> {
    let api: Api<ResourceRef> = Api::all(ctx.client.clone());
    let mut placements = BTreeSet::new();
    for element in &group.spec.resources {
        let resource_ref = api.get_opt(&element.resource_ref).await?.ok_or_else(|| {
            Error::ref_not_ready(format!("ResourceRef '{}' not found", element.resource_ref))
        })?;
        let status = resource_ref
            .status
            .filter(|s| s.status == Some(ResourceRefState::Ready) && !s.placements.is_empty())
            .ok_or_else(|| {
                Error::ref_not_ready(format!(
                    "ResourceRef '{}' has no published placements yet",
                    element.resource_ref
                ))
            })?;
        placements.extend(status.placements);
    }
    Ok(placements.into_iter().collect())
}

async fn ensure_deployment(group: &ResourceGroup, placement: &str, ctx: &Context) -> Result<()> {
    let group_name = group.name_any();
    let api: Api<ResourceGroupDeployment> = Api::namespaced(ctx.client.clone(), &group_name);
    let name = names::deployment_name(&group_name, placement);

    let desired = ResourceGroupDeploymentSpec {
        placement: placement.to_string(),
        parameters: group.spec.parameters.clone(),
        refs: group.spec.refs.clone(),
        resources: group.spec.resources.clone(),
    };

    match api.get_opt(&name).await? {
        None => {
            let owner = group
                .controller_owner_ref(&())
                .ok_or_else(|| Error::spec(format!("ResourceGroup {group_name} has no uid")))?;
            let mut labels = managed_by_labels("ResourceGroup", &group_name);
            labels.insert(placement_label(), placement.to_string());
            let deployment = ResourceGroupDeployment {
                metadata: ObjectMeta {
                    name: Some(name.clone()),
                    namespace: Some(group_name.clone()),
                    labels: Some(labels),
                    owner_references: Some(vec![owner]),
                    ..Default::default()
                },
                spec: desired,
                status: None,
            };
            api.create(&PostParams::default(), &deployment).await?;
            info!(deployment = %name, placement = %placement, "created ResourceGroupDeployment");
        }
        Some(existing) if existing.spec != desired => {
            update_spec(&api, &name, |latest: &mut ResourceGroupDeployment| {
                latest.spec = desired.clone();
            })
            .await?;
            info!(deployment = %name, "updated ResourceGroupDeployment spec");
        }
        Some(_) => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_with_phase(phase: Option<DeploymentPhase>) -> ResourceGroupDeploymentStatus {
        ResourceGroupDeploymentStatus {
            phase,
            ..Default::default()
        }
    }

    #[test]
    fn all_done_aggregates_to_done() {
        let deployments = BTreeMap::from([
            ("g.p".to_string(), status_with_phase(Some(DeploymentPhase::Done))),
            ("g.q".to_string(), status_with_phase(Some(DeploymentPhase::Done))),
        ]);
        assert_eq!(aggregate_group_phase(&deployments), DeploymentPhase::Done);
    }

    #[test]
    fn any_running_aggregates_to_in_progress() {
        let deployments = BTreeMap::from([
            ("g.p".to_string(), status_with_phase(Some(DeploymentPhase::Done))),
            (
                "g.q".to_string(),
                status_with_phase(Some(DeploymentPhase::InProgress)),
            ),
        ]);
        assert_eq!(
            aggregate_group_phase(&deployments),
            DeploymentPhase::InProgress
        );
    }

    #[test]
    fn missing_phase_counts_as_in_progress() {
        let deployments = BTreeMap::from([("g.p".to_string(), status_with_phase(None))]);
        assert_eq!(
            aggregate_group_phase(&deployments),
            DeploymentPhase::InProgress
        );
    }

    #[test]
    fn settled_failure_aggregates_to_failed() {
        let deployments = BTreeMap::from([
            ("g.p".to_string(), status_with_phase(Some(DeploymentPhase::Done))),
            ("g.q".to_string(), status_with_phase(Some(DeploymentPhase::Failed))),
        ]);
        assert_eq!(aggregate_group_phase(&deployments), DeploymentPhase::Failed);
    }

    #[test]
    fn no_deployments_aggregates_to_done() {
        assert_eq!(aggregate_group_phase(&BTreeMap::new()), DeploymentPhase::Done);
    }
}
