//! CSI volume snapshot resources (snapshot.storage.k8s.io/v1)

use std::borrow::Cow;
use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::ClusterResourceScope;
use kube::api::ObjectMeta;
use kube::{CustomResource, Resource};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// API group of the snapshot resources
pub const SNAPSHOT_GROUP: &str = "snapshot.storage.k8s.io";

/// Kind a replicated image must have to be usable
pub const VOLUME_SNAPSHOT_KIND: &str = "VolumeSnapshot";

/// Annotation marking the cluster-default snapshot class
pub const DEFAULT_SNAPSHOT_CLASS_ANNOTATION: &str = "snapshot.storage.kubernetes.io/is-default-class";

/// Point-in-time copy of a volume
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "snapshot.storage.k8s.io",
    version = "v1",
    kind = "VolumeSnapshot",
    plural = "volumesnapshots",
    namespaced,
    status = "VolumeSnapshotStatus",
    derive = "Default",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshotSpec {
    /// What the snapshot was taken from
    #[serde(default)]
    pub source: VolumeSnapshotSource,

    /// Snapshot class used to take it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_snapshot_class_name: Option<String>,
}

/// Origin of a snapshot: a live claim or a pre-provisioned content object
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshotSource {
    /// Claim the snapshot was taken from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_volume_claim_name: Option<String>,

    /// Pre-provisioned snapshot content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_snapshot_content_name: Option<String>,
}

/// Observed state of a snapshot
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshotStatus {
    /// True once the snapshot can back a new volume
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_to_use: Option<bool>,

    /// Minimum size of a volume restored from this snapshot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restore_size: Option<Quantity>,
}

/// Cluster-scoped snapshot mechanism for one CSI driver
///
/// Written by hand rather than derived because `driver` sits at the top
/// level instead of under a spec.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshotClass {
    /// Standard object metadata
    #[serde(default)]
    pub metadata: ObjectMeta,

    /// CSI driver (matches a storage class provisioner)
    #[serde(default)]
    pub driver: String,

    /// What happens to the snapshot content when the snapshot is deleted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<String>,

    /// Driver-specific parameters
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
}

impl VolumeSnapshotClass {
    /// Create a class for a driver
    pub fn new(name: impl Into<String>, driver: impl Into<String>) -> Self {
        Self {
            metadata: ObjectMeta {
                name: Some(name.into()),
                ..Default::default()
            },
            driver: driver.into(),
            ..Default::default()
        }
    }

    /// True if annotated as the cluster-default class
    pub fn is_default(&self) -> bool {
        self.metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(DEFAULT_SNAPSHOT_CLASS_ANNOTATION))
            .is_some_and(|v| v == "true")
    }
}

impl Resource for VolumeSnapshotClass {
    type DynamicType = ();
    type Scope = ClusterResourceScope;

    fn kind(_: &()) -> Cow<'_, str> {
        "VolumeSnapshotClass".into()
    }

    fn group(_: &()) -> Cow<'_, str> {
        SNAPSHOT_GROUP.into()
    }

    fn version(_: &()) -> Cow<'_, str> {
        "v1".into()
    }

    fn plural(_: &()) -> Cow<'_, str> {
        "volumesnapshotclasses".into()
    }

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}
