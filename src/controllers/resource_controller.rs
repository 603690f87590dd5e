//! Resource controller
//!
//! Watches Resource objects and triggers the materializer. Backend objects
//! are polled through requeues rather than watched, so no dynamic watches
//! are needed here.

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
use crate::crd::Resource;
use crate::error::{Error, Result};
use crate::metrics;
use crate::reconcilers::{self, resource as resource_reconciler};

/// Run the Resource controller
pub async fn run(client: Client, context: Arc<Context>) {
    let api: Api<Resource> = Api::all(client.clone());

    // Verify CRD is installed
    if let Err(e) = api.list(&ListParams::default().limit(1)).await {
        error!("Resource CRD not installed: {}", e);
        return;
    }

    info!("Starting Resource controller");

    Controller::new(api, WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, context)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    info!(
                        name = %obj.name,
                        namespace = obj.namespace.as_deref().unwrap_or("default"),
                        "Reconciled Resource"
                    );
                }
                Err(e) => {
                    error!(error = %e, "Reconciliation error");
                    metrics::RECONCILIATION_ERRORS
                        .with_label_values(&["Resource"])
                        .inc();
                }
            }
        })
        .await;
}

#[instrument(skip(ctx), fields(name = %obj.name_any(), namespace = obj.namespace()))]
async fn reconcile(obj: Arc<Resource>, ctx: Arc<Context>) -> Result<Action> {
    let _timer = metrics::RECONCILE_DURATION
        .with_label_values(&["Resource"])
        .start_timer();
    metrics::RECONCILIATIONS
        .with_label_values(&["Resource"])
        .inc();

    resource_reconciler::reconcile(&obj, &ctx).await
}

/// Error policy for the controller
fn error_policy(obj: Arc<Resource>, error: &Error, _ctx: Arc<Context>) -> Action {
    error!(
        name = %obj.name_any(),
        error = %error,
        "Reconciliation failed, scheduling retry"
    );

    let requeue_duration = match error {
        Error::RefNotReady(_) => reconcilers::REQUEUE_DELAY,
        Error::Kube(_) | Error::Conflict(_) | Error::Provisioner(_) => Duration::from_secs(30),
        Error::Spec(_) | Error::UnsupportedProvisioner(_) => Duration::from_secs(300),
        _ => Duration::from_secs(30),
    };

    Action::requeue(requeue_duration)
}
