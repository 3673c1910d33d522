//! Multi-cluster service export (multicluster.x-k8s.io/v1alpha1)
//!
//! Declares that the Service of the same name in the same namespace should
//! be reachable from the other clusters in the cluster set. There is no spec;
//! the name is the whole declaration.

use std::borrow::Cow;

use k8s_openapi::NamespaceResourceScope;
use kube::api::ObjectMeta;
use kube::Resource;
use serde::{Deserialize, Serialize};

/// Export of a local Service to the cluster set
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct ServiceExport {
    /// Standard object metadata
    #[serde(default)]
    pub metadata: ObjectMeta,

    /// Conditions reported by the multi-cluster controller; opaque here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<serde_json::Value>,
}

impl Resource for ServiceExport {
    type DynamicType = ();
    type Scope = NamespaceResourceScope;

    fn kind(_: &()) -> Cow<'_, str> {
        "ServiceExport".into()
    }

    fn group(_: &()) -> Cow<'_, str> {
        "multicluster.x-k8s.io".into()
    }

    fn version(_: &()) -> Cow<'_, str> {
        "v1alpha1".into()
    }

    fn plural(_: &()) -> Cow<'_, str> {
        "serviceexports".into()
    }

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}
