//! ResourceGroupDeployment controller
//!
//! Watches deployments and the Resource objects they schedule; a Resource
//! status change re-enters the planner so the walk can advance.

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
use crate::crd::{Resource, ResourceGroupDeployment};
use crate::error::{Error, Result};
use crate::metrics;
use crate::reconcilers::{self, deployment as deployment_reconciler};

/// Run the ResourceGroupDeployment controller
pub async fn run(client: Client, context: Arc<Context>) {
    let api: Api<ResourceGroupDeployment> = Api::all(client.clone());

    // Verify CRD is installed
    if let Err(e) = api.list(&ListParams::default().limit(1)).await {
        error!("ResourceGroupDeployment CRD not installed: {}", e);
        return;
    }

    info!("Starting ResourceGroupDeployment controller");

    Controller::new(api, WatcherConfig::default())
        .owns(Api::<Resource>::all(client.clone()), WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, context)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    info!(
                        name = %obj.name,
                        namespace = obj.namespace.as_deref().unwrap_or("default"),
                        "Reconciled ResourceGroupDeployment"
                    );
                }
                Err(e) => {
                    error!(error = %e, "Reconciliation error");
                    metrics::RECONCILIATION_ERRORS
                        .with_label_values(&["ResourceGroupDeployment"])
                        .inc();
                }
            }
        })
        .await;
}

#[instrument(skip(ctx), fields(name = %obj.name_any(), namespace = obj.namespace()))]
async fn reconcile(obj: Arc<ResourceGroupDeployment>, ctx: Arc<Context>) -> Result<Action> {
    let _timer = metrics::RECONCILE_DURATION
        .with_label_values(&["ResourceGroupDeployment"])
        .start_timer();
    metrics::RECONCILIATIONS
        .with_label_values(&["ResourceGroupDeployment"])
        .inc();

    deployment_reconciler::reconcile(&obj, &ctx).await
}

/// Error policy for the controller
fn error_policy(obj: Arc<ResourceGroupDeployment>, error: &Error, _ctx: Arc<Context>) -> Action {
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
