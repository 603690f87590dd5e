//! ResourceGroupDeployment reconciler
//!
//! The planner: resolves refs, parses properties into expression trees,
//! builds the dependency DAG, and drives Resource objects in stable
//! topological order. Long waits are externalized by returning with a short
//! requeue delay; the walk restarts from the store on every pass, so the
//! driver holds no state between reconciles.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, PostParams};
use kube::runtime::controller::Action;
use kube::{Resource as _, ResourceExt};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::controllers::Context;
use crate::crd::{
    managed_by_labels, placement_label, set_condition, Condition, DeploymentPhase, Resource,
    ResourceGroupDeployment, ResourcePhase, ResourceRef, ResourceSpec, ResourceStatus,
    CONDITION_FALSE, CONDITION_TRUE, CONDITION_TYPE_FAILED, CONDITION_TYPE_INITIALIZING,
    CONDITION_TYPE_IN_PROGRESS, CONDITION_TYPE_READY, CONDITION_UNKNOWN, REASON_DEPENDENCY_CYCLE,
    REASON_DEPLOYMENT_FAILED, REASON_DEPLOYMENT_IN_PROGRESS, REASON_RECONCILING,
    REASON_RESOURCE_CREATION_FAILED,
};
use crate::error::{Error, Result};
use crate::expression::Scope;
use crate::names;
use crate::plan::{Plan, PlannedResource};
use crate::reconcilers::{update_spec, update_status, REQUEUE_DELAY};
use crate::refs::References;

pub async fn reconcile(deployment: &ResourceGroupDeployment, ctx: &Context) -> Result<Action> {
    let name = deployment.name_any();
    let namespace = deployment.namespace().unwrap_or_default();
    let api: Api<ResourceGroupDeployment> = Api::namespaced(ctx.client.clone(), &namespace);

    // first observation seeds the phase and an Initializing condition
    if deployment
        .status
        .as_ref()
        .map_or(true, |s| s.conditions.is_empty())
    {
        let message = format!("Starting reconciliation from ResourceGroupDeployment {name}");
        update_status(&api, &name, |latest: &mut ResourceGroupDeployment| {
            let status = latest.status.get_or_insert_with(Default::default);
            status.phase = Some(DeploymentPhase::InProgress);
            set_condition(
                &mut status.conditions,
                Condition::new(
                    CONDITION_TYPE_INITIALIZING,
                    CONDITION_UNKNOWN,
                    REASON_RECONCILING,
                    message.clone(),
                ),
            );
        })
        .await?;
    }

    // bundle parameters
    let parameters = match &deployment.spec.parameters {
        None => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(_) => {
            return fail(
                &api,
                &name,
                REASON_DEPLOYMENT_FAILED,
                "deployment parameters must be an object".to_string(),
            )
            .await
        }
    };

    // step 1: resolve references
    let mut references = References::new();
    for reference in &deployment.spec.refs {
        match references.resolve(&ctx.client, reference).await {
            Ok(()) => {}
            Err(Error::RefNotReady(message)) => {
                info!(deployment = %name, ref_name = %reference.name, %message, "waiting for ref");
                return Ok(Action::requeue(REQUEUE_DELAY));
            }
            Err(Error::Spec(message)) => {
                return fail(
                    &api,
                    &name,
                    REASON_DEPLOYMENT_FAILED,
                    format!("unable to resolve ref '{}': {message}", reference.name),
                )
                .await
            }
            Err(e) => return Err(e),
        }
    }

    // steps 2 and 3: parse properties, wire dependencies, topo-sort
    let plan = match Plan::build(&deployment.spec.resources) {
        Ok(plan) => plan,
        Err(Error::DependencyCycle(message)) => {
            return fail(
                &api,
                &name,
                REASON_DEPENDENCY_CYCLE,
                format!("resource dependencies form a cycle: {message}"),
            )
            .await
        }
        Err(Error::Spec(message)) => {
            return fail(&api, &name, REASON_DEPLOYMENT_FAILED, message).await
        }
        Err(e) => return Err(e),
    };

    // every resource must reference a catalog entry
    let refs_api: Api<ResourceRef> = Api::all(ctx.client.clone());
    for resource_name in plan.order() {
        let Some(planned) = plan.get(resource_name) else {
            continue;
        };
        if refs_api.get_opt(&planned.resource_ref).await?.is_none() {
            warn!(
                deployment = %name,
                resource = %resource_name,
                resource_ref = %planned.resource_ref,
                "ResourceRef not found; waiting"
            );
            return Ok(Action::requeue(REQUEUE_DELAY));
        }
    }

    // step 4: drive resources in order, expanding each against the rolling scope
    let resources_api: Api<Resource> = Api::namespaced(ctx.client.clone(), &namespace);
    let mut scope = Scope::new(parameters, references.into_scope_map());
    let mut statuses: BTreeMap<String, ResourceStatus> = BTreeMap::new();
    let mut failed = false;

    for resource_name in plan.order() {
        let Some(planned) = plan.get(resource_name) else {
            continue;
        };
        let expanded = match planned.properties.evaluate(&scope) {
            Ok(value) => value,
            Err(e) => {
                return fail(
                    &api,
                    &name,
                    REASON_DEPLOYMENT_FAILED,
                    format!("unable to evaluate properties of resource '{resource_name}': {e}"),
                )
                .await
            }
        };

        let object_name = names::resource_object_name(&name, resource_name);
        match resources_api.get_opt(&object_name).await? {
            None => {
                if let Err(e) = create_resource(deployment, planned, &object_name, &expanded, ctx).await
                {
                    warn!(resource = %object_name, error = %e, "unable to schedule Resource");
                    let message =
                        format!("Unable to schedule Resource {object_name} to be deployed");
                    update_status(&api, &name, |latest: &mut ResourceGroupDeployment| {
                        let status = latest.status.get_or_insert_with(Default::default);
                        set_condition(
                            &mut status.conditions,
                            Condition::new(
                                CONDITION_TYPE_FAILED,
                                CONDITION_FALSE,
                                REASON_RESOURCE_CREATION_FAILED,
                                message.clone(),
                            ),
                        );
                    })
                    .await?;
                    return Err(e);
                }

                let message = format!(
                    "Resource {object_name}, from ResourceGroupDeployment {name}, was successfully scheduled to be deployed"
                );
                update_status(&api, &name, |latest: &mut ResourceGroupDeployment| {
                    let status = latest.status.get_or_insert_with(Default::default);
                    set_condition(
                        &mut status.conditions,
                        Condition::new(
                            CONDITION_TYPE_IN_PROGRESS,
                            CONDITION_TRUE,
                            REASON_DEPLOYMENT_IN_PROGRESS,
                            message.clone(),
                        ),
                    );
                })
                .await?;

                info!(resource = %object_name, "Resource scheduled; deploy continues through reconciliation");
                return Ok(Action::requeue(REQUEUE_DELAY));
            }
            Some(existing) => {
                if existing.spec.properties.as_ref() != Some(&expanded)
                    || existing.spec.resource_ref != planned.resource_ref
                {
                    let properties = expanded.clone();
                    let resource_ref = planned.resource_ref.clone();
                    update_spec(&resources_api, &object_name, move |latest: &mut Resource| {
                        latest.spec.properties = Some(properties.clone());
                        latest.spec.resource_ref = resource_ref.clone();
                    })
                    .await?;
                    info!(resource = %object_name, "Resource spec updated; waiting for re-deploy");
                    return Ok(Action::requeue(REQUEUE_DELAY));
                }

                match existing.status.as_ref().and_then(|s| s.phase) {
                    Some(ResourcePhase::Done) => {
                        statuses.insert(object_name, existing.status.clone().unwrap_or_default());
                        // downstream expressions see the whole body, outputs included
                        scope = scope.with_resource(resource_name, serde_json::to_value(&existing)?);
                    }
                    Some(ResourcePhase::Failed) => {
                        statuses.insert(object_name, existing.status.clone().unwrap_or_default());
                        failed = true;
                        break;
                    }
                    _ => {
                        return Ok(Action::requeue(REQUEUE_DELAY));
                    }
                }
            }
        }
    }

    // step 5: aggregate
    let phase = if failed {
        DeploymentPhase::Failed
    } else {
        DeploymentPhase::Done
    };
    let (condition_type, condition_status, message) = match phase {
        DeploymentPhase::Failed => (
            CONDITION_TYPE_FAILED,
            CONDITION_FALSE,
            format!("A Resource from ResourceGroupDeployment {name} failed to deploy"),
        ),
        _ => (
            CONDITION_TYPE_READY,
            CONDITION_TRUE,
            format!("Resources from ResourceGroupDeployment {name} were successfully deployed"),
        ),
    };
    update_status(&api, &name, |latest: &mut ResourceGroupDeployment| {
        let status = latest.status.get_or_insert_with(Default::default);
        status.resources = statuses.clone();
        status.phase = Some(phase);
        set_condition(
            &mut status.conditions,
            Condition::new(condition_type, condition_status, phase.reason(), message.clone()),
        );
    })
    .await?;

    if phase == DeploymentPhase::Done {
        info!(deployment = %name, "deployment finished");
        return Ok(Action::await_change());
    }
    Ok(Action::requeue(REQUEUE_DELAY))
}

async fn fail(
    api: &Api<ResourceGroupDeployment>,
    name: &str,
    reason: &'static str,
    message: String,
) -> Result<Action> {
    warn!(deployment = %name, reason = %reason, %message, "deployment failed");
    update_status(api, name, |latest: &mut ResourceGroupDeployment| {
        let status = latest.status.get_or_insert_with(Default::default);
        status.phase = Some(DeploymentPhase::Failed);
        set_condition(
            &mut status.conditions,
            Condition::new(CONDITION_TYPE_FAILED, CONDITION_FALSE, reason, message.clone()),
        );
    })
    .await?;
    Ok(Action::await_change())
}

async fn create_resource(
    deployment: &ResourceGroupDeployment,
    planned: &PlannedResource,
    object_name: &str,
    expanded: &Value,
    ctx: &Context,
) -> Result<()> {
    let namespace = deployment.namespace().unwrap_or_default();
    let api: Api<Resource> = Api::namespaced(ctx.client.clone(), &namespace);

    let owner = deployment.controller_owner_ref(&()).ok_or_else(|| {
        Error::spec(format!(
            "ResourceGroupDeployment {} has no uid",
            deployment.name_any()
        ))
    })?;
    let mut labels = managed_by_labels("ResourceGroupDeployment", &deployment.name_any());
    labels.insert(placement_label(), deployment.spec.placement.clone());

    let resource = Resource {
        metadata: ObjectMeta {
            name: Some(object_name.to_string()),
            namespace: Some(namespace),
            labels: Some(labels),
            owner_references: Some(vec![owner]),
            ..Default::default()
        },
        spec: ResourceSpec {
            placement: deployment.spec.placement.clone(),
            resource_ref: planned.resource_ref.clone(),
            properties: Some(expanded.clone()),
        },
        status: None,
    };
    api.create(&PostParams::default(), &resource).await?;
    Ok(())
}
