//! Caller-supplied types: the protected volume descriptor and the owner identity

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::VolumeResourceRequirements;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::core::{Expression, Selector};
use kube::{Resource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{Error, OWNER_LABEL};

/// Access mode applied when a descriptor does not specify any
pub const DEFAULT_ACCESS_MODE: &str = "ReadWriteOnce";

/// One persistent volume claim under protection
///
/// Supplied per call by the owning replication group reconciler; never
/// persisted by this crate.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProtectedVolume {
    /// Claim name (also the name of its ReplicationSource/Destination)
    pub name: String,

    /// Whether this volume is replicated through VolSync
    #[serde(default)]
    pub protected_by_volsync: bool,

    /// Storage class of the claim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,

    /// Desired access modes (defaults to ReadWriteOnce when empty)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub access_modes: Vec<String>,

    /// Requested capacity, e.g. "10Gi"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<String>,

    /// Labels carried over to a restored claim
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl ProtectedVolume {
    /// Create a replication-enabled descriptor for the named claim
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            protected_by_volsync: true,
            ..Default::default()
        }
    }

    /// Set the storage class and return self for chaining
    pub fn storage_class(mut self, class: impl Into<String>) -> Self {
        self.storage_class_name = Some(class.into());
        self
    }

    /// Set the capacity and return self for chaining
    pub fn capacity(mut self, capacity: impl Into<String>) -> Self {
        self.capacity = Some(capacity.into());
        self
    }

    /// Add an access mode and return self for chaining
    pub fn access_mode(mut self, mode: impl Into<String>) -> Self {
        self.access_modes.push(mode.into());
        self
    }

    /// Add a label and return self for chaining
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Fail unless the volume is marked for VolSync replication
    pub fn ensure_replication_enabled(&self) -> Result<(), Error> {
        if self.protected_by_volsync {
            Ok(())
        } else {
            Err(Error::validation(format!(
                "protected volume {} is not VolSync enabled",
                self.name
            )))
        }
    }

    /// Access modes with the single-writer default applied
    pub fn effective_access_modes(&self) -> Vec<String> {
        if self.access_modes.is_empty() {
            vec![DEFAULT_ACCESS_MODE.to_string()]
        } else {
            self.access_modes.clone()
        }
    }

    /// Requested capacity as a quantity
    pub fn capacity_quantity(&self) -> Option<Quantity> {
        self.capacity.clone().map(Quantity)
    }

    /// Resource requests for a claim holding this volume
    pub fn resources(&self) -> VolumeResourceRequirements {
        VolumeResourceRequirements {
            requests: self
                .capacity_quantity()
                .map(|q| BTreeMap::from([("storage".to_string(), q)])),
            ..Default::default()
        }
    }
}

/// Identity of the replication group on whose behalf children are managed
///
/// Children are linked to the owner twice: an owner reference for garbage
/// collection and the [`OWNER_LABEL`] for lookups by label.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplicationOwner {
    /// Owner name
    pub name: String,
    /// Owner namespace; every child lives here
    pub namespace: String,
    /// Owner uid
    pub uid: String,
    /// Owner apiVersion (e.g. "ramendr.openshift.io/v1alpha1")
    pub api_version: String,
    /// Owner kind (e.g. "VolumeReplicationGroup")
    pub kind: String,
}

impl ReplicationOwner {
    /// Create an owner identity from its parts
    pub fn new(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
        namespace: impl Into<String>,
        uid: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            uid: uid.into(),
            api_version: api_version.into(),
            kind: kind.into(),
        }
    }

    /// Read the identity of any namespaced Kubernetes object
    pub fn from_resource<K>(obj: &K) -> Result<Self, Error>
    where
        K: Resource<DynamicType = ()>,
    {
        let name = obj.name_any();
        let namespace = obj
            .namespace()
            .ok_or_else(|| Error::validation(format!("owner {name} has no namespace")))?;
        let uid = obj
            .uid()
            .ok_or_else(|| Error::validation(format!("owner {name} has no uid")))?;

        Ok(Self {
            name,
            namespace,
            uid,
            api_version: K::api_version(&()).into_owned(),
            kind: K::kind(&()).into_owned(),
        })
    }

    /// Owner reference pointing at this owner
    ///
    /// A controller reference also blocks owner deletion until the child is
    /// gone, matching what the API server expects from controllers.
    pub fn owner_reference(&self, controller: bool) -> OwnerReference {
        OwnerReference {
            api_version: self.api_version.clone(),
            kind: self.kind.clone(),
            name: self.name.clone(),
            uid: self.uid.clone(),
            controller: controller.then_some(true),
            block_owner_deletion: controller.then_some(true),
        }
    }

    /// Label selector matching every child stamped with this owner
    pub fn label_selector(&self) -> Selector {
        Expression::Equal(OWNER_LABEL.to_string(), self.name.clone()).into()
    }

    /// Name of the pre-provisioned SSH secret shared by source and destination
    pub fn transport_secret_name(&self) -> String {
        format!("{}-vs-secret", self.name)
    }
}
