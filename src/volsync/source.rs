//! ReplicationSource management (primary cluster)

use tracing::{debug, info, instrument};

use super::{ownership, remote_service_address, Readiness, Replicator, SyncedSource};
use crate::crd::{
    CopyMethod, ProtectedVolume, ReplicationSource, ReplicationSourceRsync,
    ReplicationSourceTrigger,
};
use crate::{Error, FINAL_SYNC_TRIGGER};

impl Replicator {
    /// Ensure the outbound endpoint for a volume exists and report it once it
    /// has synced
    ///
    /// Any ReplicationDestination for the same volume is deleted first.
    ///
    /// With `run_final_sync` the periodic schedule is swapped for a one-shot
    /// manual trigger, but only once no pod mounts the claim. When VolSync
    /// echoes the trigger back the final sync is done; the claim is then
    /// deleted and the result has `final_sync_complete` set.
    #[instrument(
        skip(self, volume),
        fields(owner = %self.owner.name, volume = %volume.name)
    )]
    pub async fn reconcile_rs(
        &self,
        volume: &ProtectedVolume,
        run_final_sync: bool,
    ) -> Result<Readiness<SyncedSource>, Error> {
        volume.ensure_replication_enabled()?;

        if !self.validate_secret_and_add_owner_ref().await? {
            return Ok(Readiness::NotReady);
        }

        self.delete_rd(&volume.name).await?;

        // An earlier pass may already have deleted the claim after the final
        // sync; a missing claim counts as not in use.
        if run_final_sync && self.pvc_in_use(&volume.name).await? {
            info!("claim still in use, deferring final sync");
            return Ok(Readiness::NotReady);
        }

        let source = self.create_or_update_rs(volume, run_final_sync).await?;

        if !source.has_synced() {
            debug!("waiting for first sync to complete");
            return Ok(Readiness::NotReady);
        }

        if run_final_sync && source.manual_sync_completed(FINAL_SYNC_TRIGGER) {
            info!("final sync complete, removing claim");
            self.delete_pvc(&volume.name).await?;
            return Ok(Readiness::Ready(SyncedSource {
                source,
                final_sync_complete: true,
            }));
        }

        if run_final_sync {
            debug!("waiting for final sync to complete");
        }
        Ok(Readiness::Ready(SyncedSource {
            source,
            final_sync_complete: false,
        }))
    }

    async fn create_or_update_rs(
        &self,
        volume: &ProtectedVolume,
        run_final_sync: bool,
    ) -> Result<ReplicationSource, Error> {
        let snapshot_class = self
            .volume_snapshot_class_for(volume.storage_class_name.as_deref())
            .await?;

        let trigger = if run_final_sync {
            ReplicationSourceTrigger::manual(FINAL_SYNC_TRIGGER)
        } else {
            ReplicationSourceTrigger::scheduled(self.config.cron_schedule()?)
        };

        let rsync = ReplicationSourceRsync {
            ssh_keys: Some(self.owner.transport_secret_name()),
            address: Some(remote_service_address(&volume.name, self.namespace())),
            copy_method: Some(CopyMethod::Snapshot),
            volume_snapshot_class_name: Some(snapshot_class),
        };

        let (source, outcome) = self
            .api
            .create_or_update::<ReplicationSource, _>(self.namespace(), &volume.name, |rs| {
                ownership::set_controller_reference(rs, &self.owner)?;
                ownership::add_owner_label(rs, &self.owner);
                rs.spec.source_pvc = volume.name.clone();
                rs.spec.trigger = Some(trigger);
                rs.spec.rsync = Some(rsync);
                Ok(())
            })
            .await?;

        debug!(op = %outcome, run_final_sync, "replication source reconciled");
        Ok(source)
    }

    /// True once this owner's source for the volume has completed a sync
    #[instrument(skip(self), fields(owner = %self.owner.name))]
    pub async fn is_rs_data_protected(&self, volume_name: &str) -> Result<bool, Error> {
        match self
            .api
            .get::<ReplicationSource>(Some(self.namespace()), volume_name)
            .await?
        {
            Some(rs) => Ok(rs.has_synced()),
            None => {
                info!("no replication source found");
                Ok(false)
            }
        }
    }
}
