//! Kubernetes controllers for the klaudio pipeline
//!
//! This module contains the controller harnesses that watch each entity and
//! trigger reconciliation. Business logic lives in `reconcilers`.

mod deployment_controller;
mod namespace_controller;
mod resource_controller;
mod resource_group_controller;
mod resource_ref_controller;

pub use deployment_controller::run as run_deployment_controller;
pub use namespace_controller::run as run_namespace_controller;
pub use resource_controller::run as run_resource_controller;
pub use resource_group_controller::run as run_resource_group_controller;
pub use resource_ref_controller::run as run_resource_ref_controller;

use kube::runtime::events::Reporter;
use kube::Client;

/// Shared context for all controllers
pub struct Context {
    /// Kubernetes client
    pub client: Client,

    /// Placement policy published on every Ready ResourceRef
    pub placements: Vec<String>,

    /// Event reporter identity
    pub reporter: Reporter,
}

impl Context {
    /// Create a new context
    pub fn new(client: Client, placements: Vec<String>) -> Self {
        Self {
            client,
            placements,
            reporter: Reporter {
                controller: "klaudio-operator".to_string(),
                instance: None,
            },
        }
    }
}
