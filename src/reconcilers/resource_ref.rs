//! ResourceRef reconciler
//!
//! Validates a catalog entry and publishes the placements it is eligible
//! for. Placement resolution is a policy input carried by the controller
//! context; the reconciler only asserts it is published before dependent
//! bundles may progress.

use kube::api::Api;
use kube::runtime::controller::Action;
use kube::runtime::events::{Event, EventType, Recorder};
use kube::{Resource as _, ResourceExt};
use tracing::{info, warn};

use crate::controllers::Context;
use crate::crd::{
    set_condition, Condition, ResourceRef, ResourceRefSchema, ResourceRefState, CONDITION_FALSE,
    CONDITION_TRUE, CONDITION_TYPE_READY, REASON_RECONCILING, REASON_SCHEMA_INVALID,
};
use crate::error::{Error, Result};
use crate::reconcilers::update_status;

const KNOWN_SCHEMA_TYPES: [&str; 6] = ["string", "number", "integer", "boolean", "object", "array"];

/// Validate the recursive property schema of a catalog entry
pub fn validate_schema(schema: &ResourceRefSchema) -> Result<()> {
    if !KNOWN_SCHEMA_TYPES.contains(&schema.schema_type.as_str()) {
        return Err(Error::spec(format!(
            "unknown schema type '{}'",
            schema.schema_type
        )));
    }
    if !schema.properties.is_empty() && schema.schema_type != "object" {
        return Err(Error::spec(format!(
            "schema type '{}' cannot declare nested properties",
            schema.schema_type
        )));
    }
    for (name, nested) in &schema.properties {
        validate_schema(nested)
            .map_err(|e| Error::spec(format!("property '{name}': invalid schema: {e}")))?;
    }
    Ok(())
}

pub async fn reconcile(resource_ref: &ResourceRef, ctx: &Context) -> Result<Action> {
    let name = resource_ref.name_any();
    let api: Api<ResourceRef> = Api::all(ctx.client.clone());

    if let Err(e) = validate_schema(&resource_ref.spec.schema) {
        warn!(name = %name, error = %e, "ResourceRef schema is invalid");
        let message = e.to_string();
        update_status(&api, &name, |latest: &mut ResourceRef| {
            let status = latest.status.get_or_insert_with(Default::default);
            status.status = Some(ResourceRefState::Invalid);
            set_condition(
                &mut status.conditions,
                Condition::new(
                    CONDITION_TYPE_READY,
                    CONDITION_FALSE,
                    REASON_SCHEMA_INVALID,
                    message.clone(),
                ),
            );
        })
        .await?;
        return Ok(Action::await_change());
    }

    let placements = ctx.placements.clone();
    update_status(&api, &name, |latest: &mut ResourceRef| {
        let status = latest.status.get_or_insert_with(Default::default);
        status.status = Some(ResourceRefState::Ready);
        status.placements = placements.clone();
        set_condition(
            &mut status.conditions,
            Condition::new(
                CONDITION_TYPE_READY,
                CONDITION_TRUE,
                REASON_RECONCILING,
                format!("ResourceRef {name} is ready; placements published"),
            ),
        );
    })
    .await?;

    info!(name = %name, placements = ?ctx.placements, "ResourceRef reconciled");

    let recorder = Recorder::new(
        ctx.client.clone(),
        ctx.reporter.clone(),
        resource_ref.object_ref(&()),
    );
    recorder
        .publish(Event {
            type_: EventType::Normal,
            reason: "Reconcile".to_string(),
            note: Some(format!("ResourceRef {name} is reconciled")),
            action: "Reconciling".to_string(),
            secondary: None,
        })
        .await?;

    Ok(Action::await_change())
}
