//! VolSync replication orchestration
//!
//! A [`Replicator`] manages the replication children of one owner: a
//! ReplicationDestination per volume on the secondary cluster, a
//! ReplicationSource per volume on the primary, and the claims restored from
//! destination snapshots during failover.
//!
//! # Role handoff
//!
//! For a given volume a source and a destination never coexist. Reconciling
//! one role first deletes the other and stops if that deletion fails.
//!
//! # Waiting
//!
//! Nothing here blocks. Conditions that resolve on their own (the transport
//! secret arriving, a sync finishing, a pod releasing a claim) are reported as
//! [`Readiness::NotReady`], and the caller invokes the same operation again
//! later. Dropping a returned future cancels the call in flight; no state is
//! kept between calls.

mod children;
mod claim_index;
mod claims;
mod destination;
pub mod ownership;
mod restore;
pub mod schedule;
mod snapshot_class;
mod source;

use std::sync::Arc;

use k8s_openapi::api::core::v1::Secret;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::config::ReplicatorConfig;
use crate::crd::{ReplicationOwner, ReplicationSource, VolumeSnapshotClass};
use crate::kube_client::{ObjectApi, TypedApi};
use crate::Error;

pub use claim_index::{ClaimIndex, PodClaimIndex};
pub use claims::pod_claim_names;
pub use snapshot_class::snapshot_class_selector;

/// Outcome of an operation whose preconditions may not hold yet
#[derive(Clone, Debug, PartialEq)]
#[must_use]
pub enum Readiness<T> {
    /// Done; carries the result
    Ready(T),
    /// Not done yet; call again later
    NotReady,
}

impl<T> Readiness<T> {
    /// True for [`Readiness::Ready`]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    /// The result, if ready
    pub fn ready(self) -> Option<T> {
        match self {
            Self::Ready(value) => Some(value),
            Self::NotReady => None,
        }
    }

    /// Transform the ready value
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Readiness<U> {
        match self {
            Self::Ready(value) => Readiness::Ready(f(value)),
            Self::NotReady => Readiness::NotReady,
        }
    }
}

/// A source that has completed at least one sync
#[derive(Clone, Debug, PartialEq)]
pub struct SyncedSource {
    /// The reconciled ReplicationSource
    pub source: ReplicationSource,
    /// True once the requested final sync finished and the claim was removed
    pub final_sync_complete: bool,
}

/// Name of the Service VolSync creates for a destination's rsync endpoint
pub fn local_service_name(destination: &str) -> String {
    format!("volsync-rsync-dst-{destination}")
}

/// Cluster-set address of a volume's destination endpoint
///
/// Primary and secondary use the same namespace, so the source can address
/// the remote destination by its own namespace.
pub fn remote_service_address(volume: &str, namespace: &str) -> String {
    format!(
        "{}.{namespace}.svc.clusterset.local",
        local_service_name(volume)
    )
}

/// Drives the replication children of one owner
///
/// Calls for the same owner must not run concurrently; separate owners are
/// independent.
pub struct Replicator {
    api: TypedApi,
    owner: ReplicationOwner,
    config: ReplicatorConfig,
    snapshot_classes: OnceCell<Vec<VolumeSnapshotClass>>,
    claim_index: Option<Arc<dyn ClaimIndex>>,
}

impl Replicator {
    /// Create a replicator over an object API
    pub fn new(api: Arc<dyn ObjectApi>, owner: ReplicationOwner, config: ReplicatorConfig) -> Self {
        Self {
            api: TypedApi::new(api),
            owner,
            config,
            snapshot_classes: OnceCell::new(),
            claim_index: None,
        }
    }

    /// Create a replicator over a live cluster
    pub fn from_client(
        client: kube::Client,
        owner: ReplicationOwner,
        config: ReplicatorConfig,
    ) -> Self {
        Self {
            api: TypedApi::from_client(client),
            owner,
            config,
            snapshot_classes: OnceCell::new(),
            claim_index: None,
        }
    }

    /// Answer claim in-use checks from a shared index instead of listing pods
    pub fn with_claim_index(mut self, index: Arc<dyn ClaimIndex>) -> Self {
        self.claim_index = Some(index);
        self
    }

    /// Owner whose children this replicator manages
    pub fn owner(&self) -> &ReplicationOwner {
        &self.owner
    }

    /// Configuration in effect
    pub fn config(&self) -> &ReplicatorConfig {
        &self.config
    }

    fn namespace(&self) -> &str {
        &self.owner.namespace
    }

    /// Confirm the pre-provisioned SSH secret exists and adopt it
    ///
    /// Returns false while the secret is missing; VolSync would otherwise
    /// generate its own keys and the two clusters could never connect.
    async fn validate_secret_and_add_owner_ref(&self) -> Result<bool, Error> {
        let name = self.owner.transport_secret_name();

        let Some(mut secret) = self.api.get::<Secret>(Some(self.namespace()), &name).await? else {
            info!(secret = %name, "transport secret not found, waiting");
            return Ok(false);
        };

        if ownership::set_owner_reference(&mut secret, self.owner.owner_reference(false)) {
            self.api.replace(&secret).await?;
            info!(secret = %name, "owner reference added to transport secret");
        }

        debug!(secret = %name, "transport secret validated");
        Ok(true)
    }
}
