//! Resource definitions used by the replication orchestrator
//!
//! The caller-facing descriptor and owner identity live in `types`; the rest
//! are typed clients of CRDs owned by VolSync, the CSI snapshotter and the
//! multi-cluster services API.

mod service_export;
mod snapshot;
mod types;
mod volsync;

pub use service_export::ServiceExport;
pub use snapshot::{
    VolumeSnapshot, VolumeSnapshotClass, VolumeSnapshotSource, VolumeSnapshotSpec,
    VolumeSnapshotStatus, DEFAULT_SNAPSHOT_CLASS_ANNOTATION, SNAPSHOT_GROUP, VOLUME_SNAPSHOT_KIND,
};
pub use types::{ProtectedVolume, ReplicationOwner, DEFAULT_ACCESS_MODE};
pub use volsync::{
    is_latest_image_ready, CopyMethod, ReplicationDestination, ReplicationDestinationRsync,
    ReplicationDestinationRsyncStatus, ReplicationDestinationSpec, ReplicationDestinationStatus,
    ReplicationSource, ReplicationSourceRsync, ReplicationSourceSpec, ReplicationSourceStatus,
    ReplicationSourceTrigger,
};
