//! Claim-name index over pods
//!
//! The in-use check asks which pods hold a claim. Callers that already watch
//! pods can keep a [`PodClaimIndex`] current from their watch events and hand
//! it to every [`Replicator`](super::Replicator) they build; the replicators
//! only read it. Without an index the check lists pods on every call.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
#[cfg(test)]
use mockall::automock;
use tokio::sync::RwLock;

use super::claims::pod_claim_names;

/// Read access to pods keyed by the claims they hold
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClaimIndex: Send + Sync {
    /// Names of pods in `namespace` holding `claim`
    async fn pods_using(&self, namespace: &str, claim: &str) -> Vec<String>;
}

type PodKey = (String, String);

#[derive(Default)]
struct IndexState {
    by_claim: BTreeMap<PodKey, BTreeSet<String>>,
    by_pod: BTreeMap<PodKey, Vec<String>>,
}

impl IndexState {
    fn unlink(&mut self, namespace: &str, pod: &str) {
        let key = (namespace.to_string(), pod.to_string());
        for claim in self.by_pod.remove(&key).unwrap_or_default() {
            let claim_key = (namespace.to_string(), claim);
            if let Some(pods) = self.by_claim.get_mut(&claim_key) {
                pods.remove(pod);
                if pods.is_empty() {
                    self.by_claim.remove(&claim_key);
                }
            }
        }
    }
}

/// Pod index maintained by the caller, keyed with [`pod_claim_names`]
#[derive(Default)]
pub struct PodClaimIndex {
    state: RwLock<IndexState>,
}

impl PodClaimIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pod as added or changed
    ///
    /// A pod that reached a terminal phase drops out of the index.
    pub async fn apply(&self, pod: &Pod) {
        let namespace = pod.namespace().unwrap_or_default();
        let name = pod.name_any();
        let claims = pod_claim_names(pod);

        let mut state = self.state.write().await;
        state.unlink(&namespace, &name);
        if claims.is_empty() {
            return;
        }
        for claim in &claims {
            state
                .by_claim
                .entry((namespace.clone(), claim.clone()))
                .or_default()
                .insert(name.clone());
        }
        state.by_pod.insert((namespace, name), claims);
    }

    /// Forget a deleted pod
    pub async fn remove(&self, pod: &Pod) {
        let namespace = pod.namespace().unwrap_or_default();
        self.state.write().await.unlink(&namespace, &pod.name_any());
    }

    /// Rebuild from a full pod list, e.g. after a watch restart
    pub async fn rebuild<'a>(&self, pods: impl IntoIterator<Item = &'a Pod>) {
        let fresh = PodClaimIndex::new();
        for pod in pods {
            fresh.apply(pod).await;
        }
        *self.state.write().await = fresh.state.into_inner();
    }
}

#[async_trait]
impl ClaimIndex for PodClaimIndex {
    async fn pods_using(&self, namespace: &str, claim: &str) -> Vec<String> {
        self.state
            .read()
            .await
            .by_claim
            .get(&(namespace.to_string(), claim.to_string()))
            .map(|pods| pods.iter().cloned().collect())
            .unwrap_or_default()
    }
}
