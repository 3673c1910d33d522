//! ReplicationDestination management (secondary cluster)

use tracing::{debug, info, instrument};

use super::{local_service_name, ownership, Readiness, Replicator};
use crate::crd::{
    CopyMethod, ProtectedVolume, ReplicationDestination, ReplicationDestinationRsync,
    ServiceExport,
};
use crate::Error;

impl Replicator {
    /// Ensure the inbound endpoint for a volume exists and report it once
    /// usable
    ///
    /// Any ReplicationSource for the same volume is deleted first. The
    /// destination is returned once VolSync has assigned it an address and
    /// completed a sync.
    #[instrument(skip(self, volume), fields(owner = %self.owner.name, volume = %volume.name))]
    pub async fn reconcile_rd(
        &self,
        volume: &ProtectedVolume,
    ) -> Result<Readiness<ReplicationDestination>, Error> {
        volume.ensure_replication_enabled()?;

        if !self.validate_secret_and_add_owner_ref().await? {
            return Ok(Readiness::NotReady);
        }

        self.delete_rs(&volume.name).await?;

        let rd = self.create_or_update_rd(volume).await?;
        self.reconcile_service_export(&rd).await?;

        if rd.status.as_ref().and_then(|s| s.address()).is_none() {
            debug!("waiting for destination address");
            return Ok(Readiness::NotReady);
        }
        if !rd.is_data_protected() {
            debug!("waiting for first sync to produce a snapshot");
            return Ok(Readiness::NotReady);
        }

        debug!("destination ready");
        Ok(Readiness::Ready(rd))
    }

    async fn create_or_update_rd(
        &self,
        volume: &ProtectedVolume,
    ) -> Result<ReplicationDestination, Error> {
        let snapshot_class = self
            .volume_snapshot_class_for(volume.storage_class_name.as_deref())
            .await?;

        let rsync = ReplicationDestinationRsync {
            service_type: Some(self.config.rsync_service_type.clone()),
            ssh_keys: Some(self.owner.transport_secret_name()),
            copy_method: Some(CopyMethod::Snapshot),
            capacity: volume.capacity_quantity(),
            storage_class_name: volume.storage_class_name.clone(),
            access_modes: volume.effective_access_modes(),
            volume_snapshot_class_name: Some(snapshot_class),
        };

        let (rd, outcome) = self
            .api
            .create_or_update::<ReplicationDestination, _>(
                self.namespace(),
                &volume.name,
                |rd| {
                    ownership::set_controller_reference(rd, &self.owner)?;
                    ownership::add_owner_label(rd, &self.owner);
                    rd.spec.rsync = Some(rsync);
                    Ok(())
                },
            )
            .await?;

        debug!(op = %outcome, "replication destination reconciled");
        Ok(rd)
    }

    /// Export the destination's rsync Service to the cluster set
    ///
    /// The export is owned by the destination, not the owner, so it goes
    /// away with the destination on failover.
    async fn reconcile_service_export(&self, rd: &ReplicationDestination) -> Result<(), Error> {
        let oref = ownership::owner_reference_to(rd, false)?;
        let name = local_service_name(&rd.metadata.name.clone().unwrap_or_default());

        let (_, outcome) = self
            .api
            .create_or_update::<ServiceExport, _>(self.namespace(), &name, |export| {
                ownership::set_owner_reference(export, oref);
                Ok(())
            })
            .await?;

        debug!(service_export = %name, op = %outcome, "service export reconciled");
        Ok(())
    }

    /// True once this owner's destination for the volume has produced a
    /// snapshot
    #[instrument(skip(self), fields(owner = %self.owner.name))]
    pub async fn is_rd_data_protected(&self, volume_name: &str) -> Result<bool, Error> {
        match self
            .api
            .get::<ReplicationDestination>(Some(self.namespace()), volume_name)
            .await?
        {
            Some(rd) => Ok(rd.is_data_protected()),
            None => {
                info!("no replication destination found");
                Ok(false)
            }
        }
    }
}
