//! Owner labels and owner references
//!
//! All helpers mutate in place and report whether anything changed, so
//! callers can skip writes that would be no-ops.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};

use crate::crd::ReplicationOwner;
use crate::{Error, OWNER_LABEL};

/// Group part of an apiVersion ("" for the core group)
fn api_group(api_version: &str) -> &str {
    api_version
        .rsplit_once('/')
        .map(|(group, _)| group)
        .unwrap_or("")
}

/// Same referent: group, kind and name match (version and uid may differ)
fn refers_to_same(a: &OwnerReference, b: &OwnerReference) -> bool {
    api_group(&a.api_version) == api_group(&b.api_version) && a.kind == b.kind && a.name == b.name
}

/// Set a label, returning true if it was missing or different
pub fn add_label<K: Resource>(obj: &mut K, key: &str, value: &str) -> bool {
    let labels = obj.labels_mut();
    if labels.get(key).map(String::as_str) == Some(value) {
        return false;
    }
    labels.insert(key.to_string(), value.to_string());
    true
}

/// Stamp the owner label used for lookups by owner
pub fn add_owner_label<K: Resource>(obj: &mut K, owner: &ReplicationOwner) -> bool {
    add_label(obj, OWNER_LABEL, &owner.name)
}

/// Add or refresh an owner reference, returning true if the list changed
///
/// An existing reference to the same object is replaced rather than
/// duplicated.
pub fn set_owner_reference<K: Resource>(obj: &mut K, oref: OwnerReference) -> bool {
    let refs = obj.owner_references_mut();
    match refs.iter_mut().find(|r| refers_to_same(r, &oref)) {
        Some(existing) if *existing == oref => false,
        Some(existing) => {
            *existing = oref;
            true
        }
        None => {
            refs.push(oref);
            true
        }
    }
}

/// Make `owner` the controller of `obj`
///
/// Fails if a different object already controls `obj`; re-parenting would
/// hand it from one controller to another behind its back.
pub fn set_controller_reference<K: Resource>(
    obj: &mut K,
    owner: &ReplicationOwner,
) -> Result<bool, Error> {
    let oref = owner.owner_reference(true);

    if let Some(other) = obj
        .owner_references()
        .iter()
        .find(|r| r.controller == Some(true) && !refers_to_same(r, &oref))
    {
        return Err(Error::validation(format!(
            "{} is already controlled by {} {}",
            obj.name_any(),
            other.kind,
            other.name
        )));
    }

    Ok(set_owner_reference(obj, oref))
}

/// Owner reference pointing at an existing object
///
/// The object must have been read from (or written to) the cluster so that
/// it carries a uid.
pub fn owner_reference_to<K>(obj: &K, controller: bool) -> Result<OwnerReference, Error>
where
    K: Resource<DynamicType = ()>,
{
    let uid = obj.uid().ok_or_else(|| {
        Error::validation(format!(
            "{} {} has no uid and cannot be an owner",
            K::kind(&()),
            obj.name_any()
        ))
    })?;

    Ok(OwnerReference {
        api_version: K::api_version(&()).into_owned(),
        kind: K::kind(&()).into_owned(),
        name: obj.name_any(),
        uid,
        controller: controller.then_some(true),
        block_owner_deletion: controller.then_some(true),
    })
}
