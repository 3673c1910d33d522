//! Claim in-use checks and the ownership transfer before a final sync

use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod};
use kube::core::Selector;
use kube::ResourceExt;
use tracing::{debug, error, info, instrument};

use super::{ownership, Readiness, Replicator};
use crate::{
    Error, DO_NOT_DELETE_LABEL, RECONCILE_OPTION_ANNOTATION, RECONCILE_OPTION_MERGE,
    WORKLOAD_MANAGER_ANNOTATION_PREFIX,
};

const PVC_KIND: &str = "PersistentVolumeClaim";

/// Names of the claims a pod holds
///
/// Index function for the in-use check. Pods that have run to completion
/// (`Succeeded` or `Failed`) no longer hold their claims and index nothing.
pub fn pod_claim_names(pod: &Pod) -> Vec<String> {
    let terminal = pod
        .status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        .is_some_and(|phase| phase == "Succeeded" || phase == "Failed");
    if terminal {
        return Vec::new();
    }

    pod.spec
        .iter()
        .flat_map(|spec| spec.volumes.iter().flatten())
        .filter_map(|v| v.persistent_volume_claim.as_ref())
        .map(|source| source.claim_name.clone())
        .collect()
}

impl Replicator {
    /// True if a pod in the owner's namespace still mounts the claim
    ///
    /// A claim that does not exist is not in use. Pods are looked up in the
    /// claim index when one was supplied, otherwise listed.
    #[instrument(skip(self), fields(owner = %self.owner.name))]
    pub async fn pvc_in_use(&self, pvc_name: &str) -> Result<bool, Error> {
        if self
            .api
            .get::<PersistentVolumeClaim>(Some(self.namespace()), pvc_name)
            .await?
            .is_none()
        {
            debug!("claim not found, treating as not in use");
            return Ok(false);
        }

        let users = match &self.claim_index {
            Some(index) => index.pods_using(self.namespace(), pvc_name).await,
            None => self.list_pods_using(pvc_name).await?,
        };

        if users.is_empty() {
            return Ok(false);
        }
        info!(pods = ?users, "claim is in use");
        Ok(true)
    }

    async fn list_pods_using(&self, pvc_name: &str) -> Result<Vec<String>, Error> {
        let pods = self
            .api
            .list::<Pod>(Some(self.namespace()), &Selector::default())
            .await
            .inspect_err(|e| error!(error = %e, "unable to list pods to check claim use"))?;

        Ok(pods
            .iter()
            .filter(|pod| pod_claim_names(pod).iter().any(|c| c == pvc_name))
            .map(|pod| pod.name_any())
            .collect())
    }

    /// Detach a claim from the workload manager so it survives the removal
    /// of the workload and can be used for a final sync
    ///
    /// Marks the claim do-not-delete and adds the owner as an owner. While
    /// the workload manager still asserts ownership through its
    /// reconcile-option annotation, returns [`Readiness::NotReady`].
    /// Otherwise strips the workload manager's annotations.
    #[instrument(skip(self), fields(owner = %self.owner.name))]
    pub async fn prepare_for_final_sync(
        &self,
        pvc_name: &str,
    ) -> Result<Readiness<PersistentVolumeClaim>, Error> {
        let Some(mut pvc) = self
            .api
            .get::<PersistentVolumeClaim>(Some(self.namespace()), pvc_name)
            .await?
        else {
            return Err(Error::missing(PVC_KIND, pvc_name));
        };

        let labeled = ownership::add_label(&mut pvc, DO_NOT_DELETE_LABEL, "true");
        let owned = ownership::set_owner_reference(&mut pvc, self.owner.owner_reference(false));
        if labeled || owned {
            pvc = self.api.replace(&pvc).await?;
            info!("do-not-delete label and owner reference added to claim");
        }

        if let Some(option) = pvc.annotations().get(RECONCILE_OPTION_ANNOTATION) {
            if option != RECONCILE_OPTION_MERGE {
                info!(reconcile_option = %option, "claim still owned by workload manager, waiting");
                return Ok(Readiness::NotReady);
            }
        }

        let before = pvc.annotations().len();
        pvc.annotations_mut()
            .retain(|key, _| !key.starts_with(WORKLOAD_MANAGER_ANNOTATION_PREFIX));
        if pvc.annotations().len() != before {
            pvc = self.api.replace(&pvc).await?;
            info!("workload manager annotations removed from claim");
        }

        debug!("claim ready for final sync");
        Ok(Readiness::Ready(pvc))
    }

    /// Delete a claim; a claim already gone is fine
    pub(super) async fn delete_pvc(&self, pvc_name: &str) -> Result<(), Error> {
        match self
            .api
            .delete::<PersistentVolumeClaim>(Some(self.namespace()), pvc_name)
            .await
        {
            Ok(true) => {
                info!(pvc = %pvc_name, "deleted claim");
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(e) => {
                error!(pvc = %pvc_name, error = %e, "failed to delete claim");
                Err(e)
            }
        }
    }
}
