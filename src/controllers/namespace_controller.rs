//! Namespace controller
//!
//! Watches only the namespaces this operator labels, and injects the
//! per-namespace RBAC bindings the backends require.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Namespace;
use kube::{
    runtime::{
        controller::{Action, Controller},
        watcher::Config as WatcherConfig,
    },
    Api, Client, ResourceExt,
};
use tracing::{error, info, instrument};

use crate::controllers::Context;
use crate::crd::API_GROUP;
use crate::error::{Error, Result};
use crate::metrics;
use crate::reconcilers::namespace as namespace_reconciler;

/// Run the Namespace controller
pub async fn run(client: Client, context: Arc<Context>) {
    let api: Api<Namespace> = Api::all(client.clone());

    info!("Starting Namespace controller");

    // Only namespaces labeled by this operator are of interest
    let managed_only = WatcherConfig::default().labels(&format!("{API_GROUP}/managedBy.group"));

    Controller::new(api, managed_only)
        .shutdown_on_signal()
        .run(reconcile, error_policy, context)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    info!(name = %obj.name, "Reconciled Namespace");
                }
                Err(e) => {
                    error!(error = %e, "Reconciliation error");
                    metrics::RECONCILIATION_ERRORS
                        .with_label_values(&["Namespace"])
                        .inc();
                }
            }
        })
        .await;
}

#[instrument(skip(ctx), fields(name = %obj.name_any()))]
async fn reconcile(obj: Arc<Namespace>, ctx: Arc<Context>) -> Result<Action> {
    let _timer = metrics::RECONCILE_DURATION
        .with_label_values(&["Namespace"])
        .start_timer();
    metrics::RECONCILIATIONS
        .with_label_values(&["Namespace"])
        .inc();

    namespace_reconciler::reconcile(&obj, &ctx).await
}

/// Error policy for the controller
fn error_policy(obj: Arc<Namespace>, error: &Error, _ctx: Arc<Context>) -> Action {
    error!(
        name = %obj.name_any(),
        error = %error,
        "Reconciliation failed, scheduling retry"
    );

    Action::requeue(Duration::from_secs(30))
}
