//! Lookup of owned replication children and best-effort cleanup

use kube::ResourceExt;
use tracing::{debug, error, info, instrument};

use super::Replicator;
use crate::crd::{ProtectedVolume, ReplicationDestination, ReplicationSource};
use crate::kube_client::KubeObject;
use crate::Error;

impl Replicator {
    /// Children of type `K` carrying this owner's label
    pub(super) async fn list_by_owner<K: KubeObject>(&self) -> Result<Vec<K>, Error> {
        let selector = self.owner.label_selector();
        self.api
            .list::<K>(Some(self.namespace()), &selector)
            .await
            .inspect_err(|e| {
                error!(
                    kind = %K::kind(&()),
                    selector = %selector,
                    error = %e,
                    "failed to list children by owner"
                );
            })
    }

    /// Delete every named child, continuing past failures
    ///
    /// Each failure is logged; all of them are returned together as
    /// [`Error::Cleanup`].
    async fn delete_children<K: KubeObject>(&self, names: Vec<String>) -> Result<(), Error> {
        let kind = K::kind(&());
        let mut failures = Vec::new();

        for name in names {
            match self.api.delete::<K>(Some(self.namespace()), &name).await {
                Ok(true) => info!(kind = %kind, name = %name, "deleted"),
                Ok(false) => debug!(kind = %kind, name = %name, "already deleted"),
                Err(e) => {
                    error!(kind = %kind, name = %name, error = %e, "failed to delete");
                    failures.push(format!("{kind} {name}: {e}"));
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Cleanup { failures })
        }
    }

    async fn delete_named_child<K: KubeObject>(&self, volume_name: &str) -> Result<(), Error> {
        let doomed = self
            .list_by_owner::<K>()
            .await?
            .into_iter()
            .map(|obj| obj.name_any())
            .filter(|name| name == volume_name)
            .collect();
        self.delete_children::<K>(doomed).await
    }

    /// Delete this owner's ReplicationSource for a volume, if any
    #[instrument(skip(self), fields(owner = %self.owner.name))]
    pub async fn delete_rs(&self, volume_name: &str) -> Result<(), Error> {
        self.delete_named_child::<ReplicationSource>(volume_name)
            .await
    }

    /// Delete this owner's ReplicationDestination for a volume, if any
    #[instrument(skip(self), fields(owner = %self.owner.name))]
    pub async fn delete_rd(&self, volume_name: &str) -> Result<(), Error> {
        self.delete_named_child::<ReplicationDestination>(volume_name)
            .await
    }

    /// Delete every ReplicationDestination of this owner whose volume is not
    /// in `wanted`
    #[instrument(skip(self, wanted), fields(owner = %self.owner.name, wanted = wanted.len()))]
    pub async fn cleanup_rd_not_in(&self, wanted: &[ProtectedVolume]) -> Result<(), Error> {
        let doomed = self
            .list_by_owner::<ReplicationDestination>()
            .await?
            .into_iter()
            .map(|rd| rd.name_any())
            .filter(|name| !wanted.iter().any(|v| &v.name == name))
            .collect();
        self.delete_children::<ReplicationDestination>(doomed)
            .await
    }
}
