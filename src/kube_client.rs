//! Cluster API seam
//!
//! Everything the orchestrator reads or writes goes through [`ObjectApi`], an
//! object-safe trait over `DynamicObject`. The real implementation wraps a
//! `kube::Client`; tests substitute a mock or an in-memory store.
//! [`TypedApi`] layers typed access and the create-or-update helpers on top.

use std::sync::Arc;

use async_trait::async_trait;
use kube::api::{Api, ApiResource, DeleteParams, DynamicObject, ListParams, PostParams};
use kube::core::Selector;
use kube::{Client, Resource, ResourceExt};
#[cfg(test)]
use mockall::automock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{Error, FIELD_MANAGER};

/// Which collection an operation addresses
#[derive(Clone, Debug, PartialEq)]
pub struct ApiTarget {
    /// Resource type
    pub resource: ApiResource,
    /// Namespace, or `None` for cluster-scoped types
    pub namespace: Option<String>,
}

impl ApiTarget {
    /// Target for a statically known type
    pub fn of<K: Resource<DynamicType = ()>>(namespace: Option<&str>) -> Self {
        Self {
            resource: ApiResource::erase::<K>(&()),
            namespace: namespace.map(str::to_string),
        }
    }
}

/// Trait abstracting the Kubernetes calls the orchestrator makes
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObjectApi: Send + Sync {
    /// Fetch an object, `None` if it does not exist
    async fn get(&self, target: &ApiTarget, name: &str) -> Result<Option<DynamicObject>, Error>;

    /// List objects matching a label selector; an empty selector matches all
    async fn list(
        &self,
        target: &ApiTarget,
        selector: &Selector,
    ) -> Result<Vec<DynamicObject>, Error>;

    /// Create an object
    async fn create(&self, target: &ApiTarget, obj: &DynamicObject)
        -> Result<DynamicObject, Error>;

    /// Replace an object, guarded by its resourceVersion
    async fn replace(
        &self,
        target: &ApiTarget,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, Error>;

    /// Delete an object; returns false if it was already gone
    async fn delete(&self, target: &ApiTarget, name: &str) -> Result<bool, Error>;
}

/// Real Kubernetes client implementation
#[derive(Clone)]
pub struct KubeObjectApi {
    client: Client,
}

impl KubeObjectApi {
    /// Create a new wrapper around a Kubernetes client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, target: &ApiTarget) -> Api<DynamicObject> {
        match &target.namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &target.resource),
            None => Api::all_with(self.client.clone(), &target.resource),
        }
    }

    fn post_params() -> PostParams {
        PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ObjectApi for KubeObjectApi {
    async fn get(&self, target: &ApiTarget, name: &str) -> Result<Option<DynamicObject>, Error> {
        Ok(self.api(target).get_opt(name).await?)
    }

    async fn list(
        &self,
        target: &ApiTarget,
        selector: &Selector,
    ) -> Result<Vec<DynamicObject>, Error> {
        let params = if selector.selects_all() {
            ListParams::default()
        } else {
            ListParams::default().labels_from(selector)
        };
        Ok(self.api(target).list(&params).await?.items)
    }

    async fn create(
        &self,
        target: &ApiTarget,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, Error> {
        Ok(self.api(target).create(&Self::post_params(), obj).await?)
    }

    async fn replace(
        &self,
        target: &ApiTarget,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, Error> {
        let name = obj
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| Error::validation("cannot replace an object without a name"))?;
        Ok(self
            .api(target)
            .replace(name, &Self::post_params(), obj)
            .await?)
    }

    async fn delete(&self, target: &ApiTarget, name: &str) -> Result<bool, Error> {
        match self.api(target).delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Bounds shared by every typed resource handled through [`TypedApi`]
pub trait KubeObject:
    Resource<DynamicType = ()> + Clone + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<K> KubeObject for K where
    K: Resource<DynamicType = ()> + Clone + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

/// What a create-or-update call did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The object did not exist and was created
    Created,
    /// The object existed and the mutation changed it
    Updated,
    /// The mutation left the object as it was; nothing was written
    Unchanged,
}

impl std::fmt::Display for WriteOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Updated => write!(f, "updated"),
            Self::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// Convert a typed object into its dynamic form
pub fn to_dynamic<K: KubeObject>(obj: &K) -> Result<DynamicObject, Error> {
    let mut value = serde_json::to_value(obj).map_err(|e| {
        Error::serialization(format!("failed to serialize {}: {e}", K::kind(&())))
    })?;
    if let Some(map) = value.as_object_mut() {
        map.insert(
            "apiVersion".to_string(),
            K::api_version(&()).into_owned().into(),
        );
        map.insert("kind".to_string(), K::kind(&()).into_owned().into());
    }
    serde_json::from_value(value)
        .map_err(|e| Error::serialization(format!("failed to convert {}: {e}", K::kind(&()))))
}

/// Convert a dynamic object into a typed one
pub fn from_dynamic<K: KubeObject>(obj: DynamicObject) -> Result<K, Error> {
    let value = serde_json::to_value(obj).map_err(|e| {
        Error::serialization(format!("failed to serialize {}: {e}", K::kind(&())))
    })?;
    serde_json::from_value(value)
        .map_err(|e| Error::serialization(format!("failed to parse {}: {e}", K::kind(&()))))
}

fn same_content<K: KubeObject>(a: &K, b: &K) -> Result<bool, Error> {
    let a = serde_json::to_value(a).map_err(|e| Error::serialization(e.to_string()))?;
    let b = serde_json::to_value(b).map_err(|e| Error::serialization(e.to_string()))?;
    Ok(a == b)
}

/// Typed access over an [`ObjectApi`]
#[derive(Clone)]
pub struct TypedApi {
    inner: Arc<dyn ObjectApi>,
}

impl TypedApi {
    /// Wrap an object API
    pub fn new(inner: Arc<dyn ObjectApi>) -> Self {
        Self { inner }
    }

    /// Wrap a live Kubernetes client
    pub fn from_client(client: Client) -> Self {
        Self::new(Arc::new(KubeObjectApi::new(client)))
    }

    /// Fetch an object, `None` if it does not exist
    pub async fn get<K: KubeObject>(
        &self,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<K>, Error> {
        let target = ApiTarget::of::<K>(namespace);
        self.inner
            .get(&target, name)
            .await?
            .map(from_dynamic)
            .transpose()
    }

    /// List objects matching a label selector
    pub async fn list<K: KubeObject>(
        &self,
        namespace: Option<&str>,
        selector: &Selector,
    ) -> Result<Vec<K>, Error> {
        let target = ApiTarget::of::<K>(namespace);
        self.inner
            .list(&target, selector)
            .await?
            .into_iter()
            .map(from_dynamic)
            .collect()
    }

    /// Create an object in the namespace named by its metadata
    pub async fn create<K: KubeObject>(&self, obj: &K) -> Result<K, Error> {
        let target = ApiTarget::of::<K>(obj.meta().namespace.as_deref());
        let created = self.inner.create(&target, &to_dynamic(obj)?).await?;
        from_dynamic(created)
    }

    /// Replace an object in the namespace named by its metadata
    pub async fn replace<K: KubeObject>(&self, obj: &K) -> Result<K, Error> {
        let target = ApiTarget::of::<K>(obj.meta().namespace.as_deref());
        let replaced = self.inner.replace(&target, &to_dynamic(obj)?).await?;
        from_dynamic(replaced)
    }

    /// Delete an object; returns false if it was already gone
    pub async fn delete<K: KubeObject>(
        &self,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<bool, Error> {
        let target = ApiTarget::of::<K>(namespace);
        self.inner.delete(&target, name).await
    }

    /// Fetch-or-initialize, apply `mutate`, and submit only if it changed
    /// something
    ///
    /// A new object starts from `K::default()` with name and namespace set.
    /// An error from `mutate` aborts before anything is written.
    pub async fn create_or_update<K, F>(
        &self,
        namespace: &str,
        name: &str,
        mutate: F,
    ) -> Result<(K, WriteOutcome), Error>
    where
        K: KubeObject + Default,
        F: FnOnce(&mut K) -> Result<(), Error>,
    {
        let existing = self.get::<K>(Some(namespace), name).await?;
        self.upsert(existing, namespace, name, mutate).await
    }

    /// Like [`TypedApi::create_or_update`], for objects with fields that
    /// cannot change after creation
    ///
    /// When an object exists and `keep` rejects it, the object is deleted
    /// and [`Error::RecreationRequired`] is returned. The next call finds
    /// nothing and creates it afresh.
    pub async fn create_or_replace<K, P, F>(
        &self,
        namespace: &str,
        name: &str,
        keep: P,
        mutate: F,
    ) -> Result<(K, WriteOutcome), Error>
    where
        K: KubeObject + Default,
        P: FnOnce(&K) -> bool,
        F: FnOnce(&mut K) -> Result<(), Error>,
    {
        let existing = self.get::<K>(Some(namespace), name).await?;

        if let Some(current) = &existing {
            if !keep(current) {
                let kind = K::kind(&());
                warn!(
                    kind = %kind,
                    name = %name,
                    "immutable field mismatch, deleting for recreation"
                );
                self.delete::<K>(Some(namespace), name).await?;
                return Err(Error::recreation_required(kind, name));
            }
        }

        self.upsert(existing, namespace, name, mutate).await
    }

    async fn upsert<K, F>(
        &self,
        existing: Option<K>,
        namespace: &str,
        name: &str,
        mutate: F,
    ) -> Result<(K, WriteOutcome), Error>
    where
        K: KubeObject + Default,
        F: FnOnce(&mut K) -> Result<(), Error>,
    {
        let kind = K::kind(&());

        let Some(current) = existing else {
            let mut obj = K::default();
            obj.meta_mut().name = Some(name.to_string());
            obj.meta_mut().namespace = Some(namespace.to_string());
            mutate(&mut obj)?;

            let created = self.create(&obj).await?;
            info!(kind = %kind, name = %name, "created");
            return Ok((created, WriteOutcome::Created));
        };

        let mut desired = current.clone();
        mutate(&mut desired)?;

        if same_content(&current, &desired)? {
            debug!(kind = %kind, name = %current.name_any(), "unchanged");
            return Ok((current, WriteOutcome::Unchanged));
        }

        let updated = self.replace(&desired).await?;
        info!(kind = %kind, name = %name, "updated");
        Ok((updated, WriteOutcome::Updated))
    }
}
