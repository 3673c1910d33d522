//! In-memory [`ObjectApi`] for tests
//!
//! Stores objects as JSON keyed by resource plural, namespace and name. The
//! server-side fields the orchestrator looks at (uid, resourceVersion,
//! creationTimestamp) are assigned on create, and every write is counted so
//! tests can assert idempotence as "no further writes". Lists honour the full
//! label selector syntax.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use kube::api::DynamicObject;
use kube::core::{Selector, SelectorExt};
use serde_json::Value;

use crate::kube_client::{from_dynamic, to_dynamic, ApiTarget, KubeObject, ObjectApi};
use crate::Error;

type Key = (String, String, String);

/// Build a Kubernetes API error with the given status code
pub(crate) fn api_error(code: u16) -> kube::Error {
    kube::Error::Api(kube::core::ErrorResponse {
        status: "Failure".to_string(),
        message: format!("simulated error {code}"),
        reason: match code {
            404 => "NotFound",
            409 => "Conflict",
            _ => "InternalError",
        }
        .to_string(),
        code,
    })
}

/// Operation kinds that can be made to fail
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum Op {
    Get,
    List,
    Create,
    Replace,
    Delete,
}

#[derive(Default)]
struct State {
    objects: BTreeMap<Key, Value>,
    writes: Vec<String>,
    failures: HashSet<(Op, String, Option<String>)>,
    next_uid: u64,
}

#[derive(Default)]
pub(crate) struct FakeApi {
    state: Mutex<State>,
}

fn key(target: &ApiTarget, name: &str) -> Key {
    (
        target.resource.plural.clone(),
        target.namespace.clone().unwrap_or_default(),
        name.to_string(),
    )
}

fn typed_key<K: KubeObject>(namespace: Option<&str>, name: &str) -> Key {
    key(&ApiTarget::of::<K>(namespace), name)
}

fn labels_match(obj: &Value, selector: &Selector) -> bool {
    let labels: BTreeMap<String, String> = obj
        .pointer("/metadata/labels")
        .cloned()
        .and_then(|labels| serde_json::from_value(labels).ok())
        .unwrap_or_default();
    selector.matches(&labels)
}

fn to_value(obj: &DynamicObject) -> Value {
    serde_json::to_value(obj).expect("dynamic object serializes")
}

fn to_object(value: &Value) -> DynamicObject {
    serde_json::from_value(value.clone()).expect("stored object deserializes")
}

impl FakeApi {
    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("fake state lock")
    }

    fn check_failure(
        &self,
        op: Op,
        target: &ApiTarget,
        name: Option<&str>,
    ) -> Result<(), Error> {
        let state = self.lock();
        let kind = target.resource.kind.clone();
        let fails = state.failures.contains(&(op, kind.clone(), None))
            || name.is_some_and(|n| {
                state
                    .failures
                    .contains(&(op, kind.clone(), Some(n.to_string())))
            });
        if fails {
            Err(Error::Kube(api_error(500)))
        } else {
            Ok(())
        }
    }

    /// Make every `op` on `kind` fail
    pub(crate) fn fail(&self, op: Op, kind: &str) {
        self.lock().failures.insert((op, kind.to_string(), None));
    }

    /// Make `op` on one named object fail
    pub(crate) fn fail_named(&self, op: Op, kind: &str, name: &str) {
        self.lock()
            .failures
            .insert((op, kind.to_string(), Some(name.to_string())));
    }

    /// Seed an object without counting it as a write
    pub(crate) fn insert<K: KubeObject>(&self, obj: &K) {
        let mut value = to_value(&to_dynamic(obj).expect("seed converts"));
        let mut state = self.lock();
        state.next_uid += 1;
        let uid = format!("uid-{}", state.next_uid);
        let meta = value["metadata"]
            .as_object_mut()
            .expect("seed has metadata");
        meta.entry("uid").or_insert(Value::String(uid));
        meta.entry("resourceVersion")
            .or_insert(Value::String("1".to_string()));
        meta.entry("creationTimestamp")
            .or_insert(Value::String("2024-01-01T00:00:00Z".to_string()));

        let name = obj.meta().name.clone().unwrap_or_default();
        state
            .objects
            .insert(typed_key::<K>(obj.meta().namespace.as_deref(), &name), value);
    }

    /// Read an object back in typed form
    pub(crate) fn get_typed<K: KubeObject>(&self, namespace: Option<&str>, name: &str) -> Option<K> {
        let state = self.lock();
        state
            .objects
            .get(&typed_key::<K>(namespace, name))
            .map(|v| from_dynamic(to_object(v)).expect("stored object parses"))
    }

    pub(crate) fn exists<K: KubeObject>(&self, namespace: Option<&str>, name: &str) -> bool {
        self.lock()
            .objects
            .contains_key(&typed_key::<K>(namespace, name))
    }

    /// Change a stored object the way another controller would, without
    /// counting a write
    pub(crate) fn modify<K: KubeObject>(
        &self,
        namespace: Option<&str>,
        name: &str,
        f: impl FnOnce(&mut K),
    ) {
        let mut obj: K = self
            .get_typed(namespace, name)
            .expect("object to modify exists");
        f(&mut obj);
        let value = to_value(&to_dynamic(&obj).expect("modified object converts"));
        self.lock()
            .objects
            .insert(typed_key::<K>(namespace, name), value);
    }

    /// Number of writes (create, replace, delete) issued so far
    pub(crate) fn writes(&self) -> usize {
        self.lock().writes.len()
    }

    /// Writes issued so far, as "<op> <Kind>/<name>"
    pub(crate) fn write_log(&self) -> Vec<String> {
        self.lock().writes.clone()
    }
}

#[async_trait]
impl ObjectApi for FakeApi {
    async fn get(&self, target: &ApiTarget, name: &str) -> Result<Option<DynamicObject>, Error> {
        self.check_failure(Op::Get, target, Some(name))?;
        Ok(self.lock().objects.get(&key(target, name)).map(to_object))
    }

    async fn list(
        &self,
        target: &ApiTarget,
        selector: &Selector,
    ) -> Result<Vec<DynamicObject>, Error> {
        self.check_failure(Op::List, target, None)?;
        let state = self.lock();
        Ok(state
            .objects
            .iter()
            .filter(|((plural, ns, _), _)| {
                *plural == target.resource.plural
                    && target.namespace.as_ref().map_or(true, |t| t == ns)
            })
            .filter(|(_, v)| labels_match(v, selector))
            .map(|(_, v)| to_object(v))
            .collect())
    }

    async fn create(
        &self,
        target: &ApiTarget,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, Error> {
        let name = obj.metadata.name.clone().unwrap_or_default();
        self.check_failure(Op::Create, target, Some(&name))?;

        let mut state = self.lock();
        let k = key(target, &name);
        if state.objects.contains_key(&k) {
            return Err(Error::Kube(api_error(409)));
        }

        let mut created = obj.clone();
        state.next_uid += 1;
        created.metadata.uid = Some(format!("uid-{}", state.next_uid));
        created.metadata.resource_version = Some("1".to_string());
        created.metadata.creation_timestamp = Some(
            k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(chrono::Utc::now()),
        );

        state.objects.insert(k, to_value(&created));
        state
            .writes
            .push(format!("create {}/{}", target.resource.kind, name));
        Ok(created)
    }

    async fn replace(
        &self,
        target: &ApiTarget,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, Error> {
        let name = obj.metadata.name.clone().unwrap_or_default();
        self.check_failure(Op::Replace, target, Some(&name))?;

        let mut state = self.lock();
        let k = key(target, &name);
        let Some(current) = state.objects.get(&k) else {
            return Err(Error::Kube(api_error(404)));
        };

        let current_version = current
            .pointer("/metadata/resourceVersion")
            .and_then(Value::as_str)
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        if let Some(sent) = obj.metadata.resource_version.as_deref() {
            if sent != current_version.to_string() {
                return Err(Error::Kube(api_error(409)));
            }
        }

        let mut replaced = obj.clone();
        replaced.metadata.resource_version = Some((current_version + 1).to_string());
        state.objects.insert(k, to_value(&replaced));
        state
            .writes
            .push(format!("replace {}/{}", target.resource.kind, name));
        Ok(replaced)
    }

    async fn delete(&self, target: &ApiTarget, name: &str) -> Result<bool, Error> {
        self.check_failure(Op::Delete, target, Some(name))?;

        let mut state = self.lock();
        if state.objects.remove(&key(target, name)).is_none() {
            return Ok(false);
        }
        state
            .writes
            .push(format!("delete {}/{}", target.resource.kind, name));
        Ok(true)
    }
}
