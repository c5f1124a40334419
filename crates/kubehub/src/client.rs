use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::Client;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value as Json;

/// One page of a list call. `continue_token` is `None` (or empty) on the last page.
#[derive(Debug, Clone)]
pub struct Page<K> {
    pub items: Vec<K>,
    pub continue_token: Option<String>,
}

impl<K> Page<K> {
    pub fn is_last(&self) -> bool {
        self.continue_token.as_deref().map_or(true, str::is_empty)
    }
}

/// Capability to reach a single kind + namespace endpoint.
///
/// Errors keep kube's HTTP classification so callers can branch on
/// [`is_not_found`] and [`is_conflict`].
#[async_trait]
pub trait KindClient<K>: Send + Sync {
    async fn get(&self, name: &str) -> kube::Result<K>;
    async fn list(&self, params: &ListParams) -> kube::Result<Page<K>>;
    /// Strategic-merge patch addressed by name.
    async fn patch(&self, name: &str, params: &PatchParams, body: &Json) -> kube::Result<K>;
    async fn create(&self, params: &PostParams, obj: &K) -> kube::Result<K>;
    /// Full-body replace addressed by name.
    async fn replace(&self, name: &str, params: &PostParams, obj: &K) -> kube::Result<K>;
    async fn delete(&self, name: &str, params: &DeleteParams) -> kube::Result<()>;
    /// The same kind reached through `namespace`, for objects found via an
    /// all-namespaces handle.
    fn in_namespace(&self, namespace: &str) -> Arc<dyn KindClient<K>>;
}

/// Collection delete of dependent objects selected by label.
#[async_trait]
pub trait Dependents: Send + Sync {
    async fn delete_matching(&self, selector: &str, params: &DeleteParams) -> kube::Result<()>;
}

/// Builds the `Api` for a namespace; empty means cluster scope or all namespaces.
pub type Scope<K> = fn(Client, &str) -> Api<K>;

/// [`KindClient`] backed by a kube `Api`, keeping the client and scope
/// builder around so it can be pointed at another namespace.
pub struct ApiClient<K> {
    api: Api<K>,
    client: Client,
    scope: Scope<K>,
}

impl<K> ApiClient<K> {
    pub fn new(client: Client, namespace: &str, scope: Scope<K>) -> Self {
        Self { api: scope(client.clone(), namespace), client, scope }
    }
}

#[async_trait]
impl<K> KindClient<K> for ApiClient<K>
where
    K: Clone + DeserializeOwned + Serialize + Debug + Send + Sync + 'static,
{
    async fn get(&self, name: &str) -> kube::Result<K> {
        self.api.get(name).await
    }

    async fn list(&self, params: &ListParams) -> kube::Result<Page<K>> {
        let list = self.api.list(params).await?;
        Ok(Page { items: list.items, continue_token: list.metadata.continue_ })
    }

    async fn patch(&self, name: &str, params: &PatchParams, body: &Json) -> kube::Result<K> {
        self.api.patch(name, params, &Patch::Strategic(body)).await
    }

    async fn create(&self, params: &PostParams, obj: &K) -> kube::Result<K> {
        self.api.create(params, obj).await
    }

    async fn replace(&self, name: &str, params: &PostParams, obj: &K) -> kube::Result<K> {
        self.api.replace(name, params, obj).await
    }

    async fn delete(&self, name: &str, params: &DeleteParams) -> kube::Result<()> {
        // Either the object (still finalizing) or a Status; both mean accepted.
        self.api.delete(name, params).await.map(|_| ())
    }

    fn in_namespace(&self, namespace: &str) -> Arc<dyn KindClient<K>> {
        Arc::new(ApiClient::new(self.client.clone(), namespace, self.scope))
    }
}

#[async_trait]
impl<K> Dependents for Api<K>
where
    K: Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    async fn delete_matching(&self, selector: &str, params: &DeleteParams) -> kube::Result<()> {
        let lp = ListParams::default().labels(selector);
        Api::delete_collection(self, params, &lp).await.map(|_| ())
    }
}

pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 404)
}

pub fn is_conflict(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 409)
}
