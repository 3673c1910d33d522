//! Ferry - per-volume asynchronous replication for disaster recovery
//!
//! Ferry drives VolSync replication endpoints for the persistent volumes of
//! one protected workload, across a pair of clusters. A primary cluster runs
//! a ReplicationSource per volume; the secondary runs the matching
//! ReplicationDestination and exports its rsync endpoint to the cluster set.
//! On failover the roles swap, with a final manual sync beforehand when the
//! primary is still reachable.
//!
//! Every entry point is level-triggered: call it again until it reports
//! [`volsync::Readiness::Ready`]. Nothing here sleeps or polls.
//!
//! # Modules
//!
//! - [`volsync`] - The [`volsync::Replicator`] and its managers
//! - [`crd`] - Typed VolSync, snapshot and service-export resources
//! - [`kube_client`] - Cluster API seam and create-or-update helpers
//! - [`config`] - Per-owner configuration
//! - [`telemetry`] - Tracing subscriber setup
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod config;
pub mod crd;
pub mod error;
pub mod kube_client;
pub mod telemetry;
pub mod volsync;

#[cfg(test)]
mod testing;

pub use config::ReplicatorConfig;
pub use error::Error;
pub use volsync::{ClaimIndex, PodClaimIndex, Readiness, Replicator, SyncedSource};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Shared labels and annotations
// =============================================================================

/// Label naming the owner of a child object, used for lookups by owner
pub const OWNER_LABEL: &str = "volumereplicationgroups-owner";

/// Manual trigger token that requests, and later confirms, the final sync
pub const FINAL_SYNC_TRIGGER: &str = "vrg-final-sync";

/// Label that keeps VolSync from cleaning up a snapshot it produced
pub const VOLSYNC_DO_NOT_DELETE_LABEL: &str = "volsync.backube/do-not-delete";

/// Label that keeps workload-manager cleanup away from a claim
pub const DO_NOT_DELETE_LABEL: &str = "do-not-delete";

/// Prefix of annotations belonging to the external workload manager
pub const WORKLOAD_MANAGER_ANNOTATION_PREFIX: &str = "apps.open-cluster-management.io";

/// Workload-manager annotation announcing how it reconciles a claim
pub const RECONCILE_OPTION_ANNOTATION: &str = "apps.open-cluster-management.io/reconcile-option";

/// Reconcile option under which the workload manager no longer claims the volume
pub const RECONCILE_OPTION_MERGE: &str = "merge";

/// Field manager recorded on writes
pub const FIELD_MANAGER: &str = "ferry-volsync";
