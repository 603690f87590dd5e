//! Reconcilers for the klaudio pipeline
//!
//! This module contains the business logic for reconciling each entity:
//! - Validating user-authored specs
//! - Driving owned objects toward the desired state
//! - Updating entity status

pub mod deployment;
pub mod namespace;
pub mod resource;
pub mod resource_group;
pub mod resource_ref;

use std::time::Duration;

use kube::api::{Api, PostParams};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

/// Delay before re-entering reconciliation while waiting on external work
pub const REQUEUE_DELAY: Duration = Duration::from_secs(5);

/// Bounded attempts for compare-and-swap updates
pub(crate) const CAS_ATTEMPTS: usize = 5;

pub(crate) fn is_conflict(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(response) if response.code == 409)
}

/// Compare-and-swap status update: re-read, mutate, replace, retry on
/// conflict a bounded number of times.
pub(crate) async fn update_status<K, F>(api: &Api<K>, name: &str, mutate: F) -> Result<K>
where
    K: DeserializeOwned + Serialize,
    F: Fn(&mut K),
{
    for _ in 0..CAS_ATTEMPTS {
        let mut latest = api.get_status(name).await?;
        mutate(&mut latest);
        match api
            .replace_status(name, &PostParams::default(), serde_json::to_vec(&latest)?)
            .await
        {
            Ok(updated) => return Ok(updated),
            Err(e) if is_conflict(&e) => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(Error::Conflict(name.to_string()))
}

/// Compare-and-swap spec update with the same bounded retry
pub(crate) async fn update_spec<K, F>(api: &Api<K>, name: &str, mutate: F) -> Result<K>
where
    K: DeserializeOwned + Serialize + Clone + std::fmt::Debug,
    F: Fn(&mut K),
{
    for _ in 0..CAS_ATTEMPTS {
        let mut latest = api.get(name).await?;
        mutate(&mut latest);
        match api.replace(name, &PostParams::default(), &latest).await {
            Ok(updated) => return Ok(updated),
            Err(e) if is_conflict(&e) => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(Error::Conflict(name.to_string()))
}
