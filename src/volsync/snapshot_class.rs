//! Picking the snapshot class that matches a volume's storage backend

use k8s_openapi::api::storage::v1::StorageClass;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::core::Selector;
use kube::ResourceExt;
use tracing::{debug, info, instrument};

use super::Replicator;
use crate::crd::VolumeSnapshotClass;
use crate::Error;

/// Convert the configured snapshot class selector for list queries
pub fn snapshot_class_selector(selector: &LabelSelector) -> Result<Selector, Error> {
    Selector::try_from(selector.clone())
        .map_err(|e| Error::validation(format!("invalid snapshot class selector: {e}")))
}

/// First class whose driver matches, unless a later match is the default
fn pick<'a>(classes: &'a [VolumeSnapshotClass], provisioner: &str) -> Option<&'a VolumeSnapshotClass> {
    classes
        .iter()
        .filter(|class| class.driver == provisioner)
        .fold(None, |matched, class| match matched {
            None => Some(class),
            Some(_) if class.is_default() => Some(class),
            keep => keep,
        })
}

impl Replicator {
    /// Snapshot classes passing the configured selector, fetched once
    async fn snapshot_classes(&self) -> Result<&[VolumeSnapshotClass], Error> {
        self.snapshot_classes
            .get_or_try_init(|| async {
                let selector = snapshot_class_selector(&self.config.volume_snapshot_class_selector)?;
                info!(selector = %selector, "fetching volume snapshot classes");
                self.api.list::<VolumeSnapshotClass>(None, &selector).await
            })
            .await
            .map(Vec::as_slice)
    }

    /// Name of the snapshot class for volumes of a storage class
    ///
    /// Matches the storage class provisioner against snapshot class drivers.
    /// The cluster-default class wins among several matches.
    #[instrument(skip(self))]
    pub async fn volume_snapshot_class_for(
        &self,
        storage_class_name: Option<&str>,
    ) -> Result<String, Error> {
        let name = storage_class_name
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::validation("no storage class name given"))?;

        let storage_class = self
            .api
            .get::<StorageClass>(None, name)
            .await?
            .ok_or_else(|| Error::missing("StorageClass", name))?;

        let classes = self.snapshot_classes().await?;
        let class = pick(classes, &storage_class.provisioner).ok_or_else(|| {
            Error::SnapshotClassNotFound {
                provisioner: storage_class.provisioner.clone(),
            }
        })?;

        debug!(snapshot_class = %class.name_any(), "matched volume snapshot class");
        Ok(class.name_any())
    }
}
