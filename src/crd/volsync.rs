//! VolSync ReplicationSource and ReplicationDestination
//!
//! Only the rsync-over-SSH transport fields this crate drives are modelled.
//! Both CRDs belong to VolSync; these definitions are clients of them and
//! are never installed by this crate.

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::TypedLocalObjectReference;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::snapshot::VOLUME_SNAPSHOT_KIND;

/// How VolSync produces the point-in-time copy it transfers
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum CopyMethod {
    /// Replicate directly from the live volume
    Direct,
    /// Clone the volume before transfer
    Clone,
    /// Snapshot the volume before transfer
    #[default]
    Snapshot,
}

impl std::fmt::Display for CopyMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direct => write!(f, "Direct"),
            Self::Clone => write!(f, "Clone"),
            Self::Snapshot => write!(f, "Snapshot"),
        }
    }
}

// =============================================================================
// ReplicationSource
// =============================================================================

/// Outbound replication endpoint for one volume
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "volsync.backube",
    version = "v1alpha1",
    kind = "ReplicationSource",
    plural = "replicationsources",
    namespaced,
    status = "ReplicationSourceStatus",
    derive = "Default",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationSourceSpec {
    /// Claim whose data is replicated
    #[serde(rename = "sourcePVC")]
    pub source_pvc: String,

    /// When syncs happen
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<ReplicationSourceTrigger>,

    /// Rsync transport settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rsync: Option<ReplicationSourceRsync>,
}

/// Sync trigger: a cron schedule or a one-shot manual token, never both
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationSourceTrigger {
    /// Cron spec for periodic syncs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,

    /// Token that triggers a single sync when it changes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual: Option<String>,
}

impl ReplicationSourceTrigger {
    /// Periodic trigger
    pub fn scheduled(cron: impl Into<String>) -> Self {
        Self {
            schedule: Some(cron.into()),
            manual: None,
        }
    }

    /// One-shot trigger
    pub fn manual(token: impl Into<String>) -> Self {
        Self {
            schedule: None,
            manual: Some(token.into()),
        }
    }
}

/// Rsync settings for a ReplicationSource
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationSourceRsync {
    /// Secret holding the SSH keys
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_keys: Option<String>,

    /// Remote destination address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// Point-in-time copy method
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copy_method: Option<CopyMethod>,

    /// Snapshot class used for the copy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_snapshot_class_name: Option<String>,
}

/// Observed state of a ReplicationSource
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationSourceStatus {
    /// Completion time of the most recent sync
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_time: Option<DateTime<Utc>>,

    /// Echo of the manual trigger token once that sync has completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_manual_sync: Option<String>,
}

impl ReplicationSourceStatus {
    /// True once at least one sync has completed
    pub fn has_synced(&self) -> bool {
        self.last_sync_time
            .is_some_and(|t| t.timestamp() != 0 || t.timestamp_subsec_nanos() != 0)
    }
}

impl ReplicationSource {
    /// True once at least one sync has completed
    pub fn has_synced(&self) -> bool {
        self.status.as_ref().is_some_and(|s| s.has_synced())
    }

    /// True once the manual sync identified by `token` has completed
    pub fn manual_sync_completed(&self, token: &str) -> bool {
        self.status
            .as_ref()
            .and_then(|s| s.last_manual_sync.as_deref())
            == Some(token)
    }
}

// =============================================================================
// ReplicationDestination
// =============================================================================

/// Inbound replication endpoint for one volume
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "volsync.backube",
    version = "v1alpha1",
    kind = "ReplicationDestination",
    plural = "replicationdestinations",
    namespaced,
    status = "ReplicationDestinationStatus",
    derive = "Default",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationDestinationSpec {
    /// Rsync transport settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rsync: Option<ReplicationDestinationRsync>,
}

/// Rsync settings for a ReplicationDestination
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationDestinationRsync {
    /// Type of the Service VolSync creates for the rsync endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_type: Option<String>,

    /// Secret holding the SSH keys
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_keys: Option<String>,

    /// Point-in-time copy method
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copy_method: Option<CopyMethod>,

    /// Size of the destination volume
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<Quantity>,

    /// Storage class of the destination volume
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,

    /// Access modes of the destination volume
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub access_modes: Vec<String>,

    /// Snapshot class used for the copy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_snapshot_class_name: Option<String>,
}

/// Rsync state reported by a ReplicationDestination
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationDestinationRsyncStatus {
    /// Address the source connects to, assigned by VolSync
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// Observed state of a ReplicationDestination
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationDestinationStatus {
    /// Rsync endpoint state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rsync: Option<ReplicationDestinationRsyncStatus>,

    /// Snapshot produced by the most recent completed sync
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_image: Option<TypedLocalObjectReference>,
}

/// True if `image` names a VolumeSnapshot
pub fn is_latest_image_ready(image: Option<&TypedLocalObjectReference>) -> bool {
    image.is_some_and(|i| !i.name.is_empty() && i.kind == VOLUME_SNAPSHOT_KIND)
}

impl ReplicationDestinationStatus {
    /// Rsync address, if VolSync has assigned one
    pub fn address(&self) -> Option<&str> {
        self.rsync.as_ref().and_then(|r| r.address.as_deref())
    }

    /// True once a sync has produced a snapshot
    pub fn has_latest_image(&self) -> bool {
        is_latest_image_ready(self.latest_image.as_ref())
    }
}

impl ReplicationDestination {
    /// Latest replicated image, if any
    pub fn latest_image(&self) -> Option<&TypedLocalObjectReference> {
        self.status.as_ref().and_then(|s| s.latest_image.as_ref())
    }

    /// True once at least one sync has produced a snapshot
    pub fn is_data_protected(&self) -> bool {
        self.status.as_ref().is_some_and(|s| s.has_latest_image())
    }

    /// Usable by a source: an address is assigned and a sync has completed
    pub fn is_ready(&self) -> bool {
        self.status
            .as_ref()
            .is_some_and(|s| s.address().is_some() && s.has_latest_image())
    }
}
