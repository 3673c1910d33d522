//! Restoring a claim from the latest snapshot a destination received

use k8s_openapi::api::core::v1::{PersistentVolumeClaim, TypedLocalObjectReference};
use kube::ResourceExt;
use tracing::{debug, info, instrument};

use super::{ownership, Replicator};
use crate::crd::{
    is_latest_image_ready, ProtectedVolume, ReplicationDestination, VolumeSnapshot, SNAPSHOT_GROUP,
    VOLUME_SNAPSHOT_KIND,
};
use crate::{Error, VOLSYNC_DO_NOT_DELETE_LABEL};

/// Data sources are the same object when kind and name agree
fn data_source_matches(
    current: Option<&TypedLocalObjectReference>,
    desired: &TypedLocalObjectReference,
) -> bool {
    current.is_some_and(|c| c.kind == desired.kind && c.name == desired.name)
}

fn is_bound(pvc: &PersistentVolumeClaim) -> bool {
    pvc.status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        .is_some_and(|phase| phase == "Bound")
}

impl Replicator {
    /// Ensure a claim named after the volume exists, populated from the
    /// destination's latest snapshot
    ///
    /// Call only after [`Replicator::reconcile_rd`] reported the destination
    /// ready; a missing snapshot here is an error, not a wait. A claim that
    /// exists with a different data source is deleted and
    /// [`Error::RecreationRequired`] returned; the next call recreates it.
    #[instrument(skip(self, volume), fields(owner = %self.owner.name, volume = %volume.name))]
    pub async fn ensure_pvc_from_rd(
        &self,
        volume: &ProtectedVolume,
    ) -> Result<PersistentVolumeClaim, Error> {
        let rd = self
            .api
            .get::<ReplicationDestination>(Some(self.namespace()), &volume.name)
            .await?;

        let mut image = rd
            .as_ref()
            .and_then(|rd| rd.latest_image())
            .filter(|image| is_latest_image_ready(Some(*image)))
            .cloned()
            .ok_or_else(|| Error::NoLatestImage {
                volume: volume.name.clone(),
            })?;

        if image.api_group.as_deref().map_or(true, str::is_empty) {
            image.api_group = Some(SNAPSHOT_GROUP.to_string());
        }
        debug!(snapshot = %image.name, "latest image");

        let mut snapshot = self.validate_snapshot(&image.name).await?;
        let pvc = self.ensure_pvc_from_snapshot(volume, image).await?;

        // Once the claim goes, the snapshot is collected with it
        let oref = ownership::owner_reference_to(&pvc, false)?;
        if ownership::set_owner_reference(&mut snapshot, oref) {
            self.api.replace(&snapshot).await?;
            info!(snapshot = %snapshot.name_any(), "claim set as owner of snapshot");
        }

        Ok(pvc)
    }

    /// Fetch the snapshot and keep VolSync from cleaning it up
    async fn validate_snapshot(&self, name: &str) -> Result<VolumeSnapshot, Error> {
        let mut snapshot = self
            .api
            .get::<VolumeSnapshot>(Some(self.namespace()), name)
            .await?
            .ok_or_else(|| Error::missing(VOLUME_SNAPSHOT_KIND, name))?;

        if ownership::add_label(&mut snapshot, VOLSYNC_DO_NOT_DELETE_LABEL, "true") {
            snapshot = self.api.replace(&snapshot).await?;
            info!(snapshot = %name, "do-not-delete label added to snapshot");
        }

        Ok(snapshot)
    }

    async fn ensure_pvc_from_snapshot(
        &self,
        volume: &ProtectedVolume,
        image: TypedLocalObjectReference,
    ) -> Result<PersistentVolumeClaim, Error> {
        let keep_image = image.clone();
        let (pvc, outcome) = self
            .api
            .create_or_replace::<PersistentVolumeClaim, _, _>(
                self.namespace(),
                &volume.name,
                |pvc| {
                    data_source_matches(
                        pvc.spec.as_ref().and_then(|s| s.data_source.as_ref()),
                        &keep_image,
                    )
                },
                |pvc| {
                    if is_bound(pvc) {
                        debug!("claim already bound");
                        return Ok(());
                    }

                    pvc.labels_mut().extend(volume.labels.clone());

                    let first_write = pvc.metadata.creation_timestamp.is_none();
                    let spec = pvc.spec.get_or_insert_with(Default::default);
                    if first_write {
                        spec.access_modes = Some(volume.effective_access_modes());
                        spec.storage_class_name = volume.storage_class_name.clone();
                        spec.data_source = Some(image);
                    }
                    spec.resources = Some(volume.resources());
                    Ok(())
                },
            )
            .await?;

        debug!(op = %outcome, "claim from snapshot reconciled");
        Ok(pvc)
    }
}
