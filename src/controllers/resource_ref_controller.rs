//! ResourceRef controller
//!
//! Watches ResourceRef catalog entries and triggers reconciliation.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::{
    api::ListParams,
    runtime::{
        controller::{Action, Controller},
        watcher::Config as WatcherConfig,
    },
    Api, Client, ResourceExt,
};
use tracing::{error, info, instrument};

use crate::controllers::Context;
use crate::crd::ResourceRef;
use crate::error::{Error, Result};
use crate::metrics;
use crate::reconcilers::{self, resource_ref as resource_ref_reconciler};

/// Run the ResourceRef controller
pub async fn run(client: Client, context: Arc<Context>) {
    let api: Api<ResourceRef> = Api::all(client.clone());

    // Verify CRD is installed
    if let Err(e) = api.list(&ListParams::default().limit(1)).await {
        error!("ResourceRef CRD not installed: {}", e);
        return;
    }

    info!("Starting ResourceRef controller");

    Controller::new(api, WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, context)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    info!(name = %obj.name, "Reconciled ResourceRef");
                }
                Err(e) => {
                    error!(error = %e, "Reconciliation error");
                    metrics::RECONCILIATION_ERRORS
                        .with_label_values(&["ResourceRef"])
                        .inc();
                }
            }
        })
        .await;
}

#[instrument(skip(ctx), fields(name = %obj.name_any()))]
async fn reconcile(obj: Arc<ResourceRef>, ctx: Arc<Context>) -> Result<Action> {
    let _timer = metrics::RECONCILE_DURATION
        .with_label_values(&["ResourceRef"])
        .start_timer();
    metrics::RECONCILIATIONS
        .with_label_values(&["ResourceRef"])
        .inc();

    resource_ref_reconciler::reconcile(&obj, &ctx).await
}

/// Error policy for the controller
fn error_policy(obj: Arc<ResourceRef>, error: &Error, _ctx: Arc<Context>) -> Action {
    error!(
        name = %obj.name_any(),
        error = %error,
        "Reconciliation failed, scheduling retry"
    );

    let requeue_duration = match error {
        Error::RefNotReady(_) => reconcilers::REQUEUE_DELAY,
        Error::Kube(_) | Error::Conflict(_) => Duration::from_secs(30),
        Error::Spec(_) | Error::Expression(_) | Error::DependencyCycle(_) => {
            Duration::from_secs(300)
        }
        _ => Duration::from_secs(30),
    };

    Action::requeue(requeue_duration)
}
