use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use kube::ResourceExt;
use metrics::{counter, histogram};
use rekon_core::{derive_status, Identity, StatusResult};
use rekon_kubehub::{is_not_found, settings, Dependents, KindClient};
use serde_json::Value as Json;
use tracing::{debug, info, warn};

use crate::claim::{Claim, ClaimRunner};
use crate::cleanup::Cleanups;
use crate::error::{Error, Op, Result};
use crate::kinds::{ManagedKind, OrphanPolicy, SharedKind};

/// Run one server round trip, giving up after `after`.
///
/// The outer result is the deadline; the inner one is the server's answer.
pub(crate) async fn bounded<T, F>(id: &Identity, op: Op, after: Duration, fut: F) -> Result<kube::Result<T>>
where
    F: Future<Output = kube::Result<T>>,
{
    tokio::time::timeout(after, fut).await.map_err(|_| {
        warn!(id = %id, op = %op, ?after, "request deadline exceeded");
        Error::DeadlineExceeded { id: id.clone(), op, after }
    })
}

/// A single object of kind `K`: a shared client for its endpoint plus the
/// last body seen from (or desired for) the server.
pub struct Object<K: ManagedKind> {
    client: Arc<dyn KindClient<K>>,
    dependents: Option<Arc<dyn Dependents>>,
    timeout: Duration,
    body: K,
}

impl<K: ManagedKind> Clone for Object<K> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            dependents: self.dependents.clone(),
            timeout: self.timeout,
            body: self.body.clone(),
        }
    }
}

impl<K: ManagedKind> fmt::Debug for Object<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object").field("id", &self.id()).field("body", &self.body).finish()
    }
}

impl<K: ManagedKind> Object<K> {
    /// Wrap `body` (or an empty object) with name and namespace stamped on.
    /// An empty namespace leaves whatever the body carries, and requests are
    /// then routed through that namespace; cluster-scoped kinds never get one.
    pub fn new(client: Arc<dyn KindClient<K>>, namespace: &str, name: &str, body: Option<K>) -> Self {
        let mut body = body.unwrap_or_default();
        let meta = body.meta_mut();
        meta.name = Some(name.to_string());
        let mut client = client;
        if K::CLUSTER_SCOPED {
            meta.namespace = None;
        } else if !namespace.is_empty() {
            meta.namespace = Some(namespace.to_string());
        } else if let Some(own) = meta.namespace.as_deref().filter(|ns| !ns.is_empty()) {
            client = client.in_namespace(own);
        }
        Self { client, dependents: None, timeout: settings().request_timeout, body }
    }

    /// Handle used by `delete_orphan` for kinds that clean up dependents themselves.
    pub fn with_dependents(mut self, dependents: Arc<dyn Dependents>) -> Self {
        self.dependents = Some(dependents);
        self
    }

    /// Bound every round trip of this object by `timeout` instead of
    /// `REKON_REQUEST_TIMEOUT_SECS`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn body(&self) -> &K {
        &self.body
    }

    /// Edit the desired state before the next `apply` or `update`.
    pub fn body_mut(&mut self) -> &mut K {
        &mut self.body
    }

    pub fn id(&self) -> Identity {
        let meta = self.body.meta();
        Identity::new(
            K::KIND,
            meta.name.clone().unwrap_or_default(),
            meta.namespace.clone().unwrap_or_default(),
        )
    }

    /// Strategic-merge patch the body, creating the object when the patch
    /// reports it missing. Conflicts are surfaced, never retried.
    pub async fn apply(&mut self) -> Result<()> {
        let id = self.id();
        let started = Instant::now();
        let data = serde_json::to_value(&self.body).map_err(|source| Error::Encode { id: id.clone(), source })?;
        let s = settings();

        let mut op = Op::Patch;
        let mut res = bounded(&id, op, self.timeout, self.client.patch(&id.name, &s.patch_params(), &data)).await?;
        if matches!(&res, Err(e) if is_not_found(e)) {
            info!(kind = K::KIND, name = %id.name, ns = %id.namespace, "object missing on patch; creating");
            counter!("rekon_create_fallback_total", 1u64, "kind" => K::KIND);
            op = Op::Create;
            res = bounded(&id, op, self.timeout, self.client.create(&s.post_params(), &self.body)).await?;
        }
        counter!("rekon_ops_total", 1u64, "kind" => K::KIND, "op" => "apply");

        match res {
            Ok(obj) => {
                self.body = obj;
                histogram!("rekon_op_latency_ms", started.elapsed().as_secs_f64() * 1000.0);
                debug!(id = %id, op = %op, rv = ?self.body.resource_version(), "applied");
                Ok(())
            }
            Err(e) => Err(self.fail(id, op, e)),
        }
    }

    /// Refresh the body from the server.
    pub async fn get(&mut self) -> Result<()> {
        let id = self.id();
        counter!("rekon_ops_total", 1u64, "kind" => K::KIND, "op" => "get");
        match bounded(&id, Op::Get, self.timeout, self.client.get(&id.name)).await? {
            Ok(obj) => {
                self.body = obj;
                Ok(())
            }
            Err(e) => Err(self.fail(id, Op::Get, e)),
        }
    }

    /// Delete with the process-wide propagation policy. A missing object is
    /// reported as `NotFound`.
    pub async fn delete(&self) -> Result<()> {
        let id = self.id();
        counter!("rekon_ops_total", 1u64, "kind" => K::KIND, "op" => "delete");
        let res = bounded(&id, Op::Delete, self.timeout, self.client.delete(&id.name, &settings().delete_params())).await?;
        match res {
            Ok(()) => {
                info!(id = %id, policy = ?settings().propagation, "deleted");
                Ok(())
            }
            Err(e) => Err(self.fail(id, Op::Delete, e)),
        }
    }

    /// Remove dependents the cluster will not garbage collect, leaving the
    /// object itself in place.
    pub async fn delete_orphan(&self) -> Result<()> {
        if K::ORPHAN_POLICY == OrphanPolicy::CascadeGc {
            return Ok(());
        }
        let id = self.id();
        let Some(selector) = self.body.dependents_selector() else {
            debug!(id = %id, "no dependents to clean up");
            return Ok(());
        };
        let dependents = self.dependents.as_ref().ok_or_else(|| Error::MissingDependents { id: id.clone() })?;
        counter!("rekon_ops_total", 1u64, "kind" => K::KIND, "op" => "delete_orphan");
        let res = bounded(
            &id,
            Op::DeleteDependents,
            self.timeout,
            dependents.delete_matching(&selector, &settings().delete_params()),
        )
        .await?;
        match res {
            Ok(()) => {
                info!(id = %id, selector = %selector, "deleted dependents");
                Ok(())
            }
            Err(e) => Err(self.fail(id, Op::DeleteDependents, e)),
        }
    }

    pub fn compute_status(&self, now: DateTime<Utc>) -> StatusResult {
        let deletion = self.body.meta().deletion_timestamp.as_ref().map(|t| t.0);
        derive_status(deletion, self.body.readiness(), now)
    }

    pub fn manifest(&self) -> Result<Json> {
        serde_json::to_value(&self.body).map_err(|source| Error::Encode { id: self.id(), source })
    }

    fn fail(&self, id: Identity, op: Op, source: kube::Error) -> Error {
        let err = Error::from_kube(id, op, source);
        if err.is_conflict() {
            warn!(kind = K::KIND, name = %self.body.name_any(), op = %op, "conflict");
            counter!("rekon_conflicts_total", 1u64, "kind" => K::KIND);
        } else if !err.is_not_found() {
            warn!(error = %err, "request failed");
        }
        err
    }
}

impl<K: SharedKind> Object<K> {
    /// Replace the whole object with the local body. No create fallback.
    pub async fn update(&mut self) -> Result<()> {
        let id = self.id();
        counter!("rekon_ops_total", 1u64, "kind" => K::KIND, "op" => "update");
        let s = settings();
        match bounded(&id, Op::Update, self.timeout, self.client.replace(&id.name, &s.post_params(), &self.body)).await? {
            Ok(obj) => {
                self.body = obj;
                Ok(())
            }
            Err(e) => Err(self.fail(id, Op::Update, e)),
        }
    }

    /// Create or take over the object, refusing objects that fail `claims`.
    ///
    /// A delete rollback is pushed onto `cleanups` before anything is written,
    /// so the caller can undo this step even when the write itself fails.
    pub async fn ensure(&mut self, cleanups: &mut Cleanups, claims: &[&dyn Claim]) -> Result<()> {
        let id = self.id();
        let mut existing = self.clone();
        let found = match existing.get().await {
            Ok(()) => {
                let owned = ClaimRunner::new(claims)
                    .assert(existing.body.meta())
                    .map_err(|e| e.context(format!("checking for existing {id}")))?;
                if !owned {
                    info!(id = %id, "existing object not claimed");
                    return Err(Error::AlreadyExists { id });
                }
                true
            }
            Err(e) if e.is_not_found() => false,
            Err(e) => return Err(e.context(format!("checking for existing {id}"))),
        };

        let client = self.client.clone();
        let target = id.clone();
        let after = self.timeout;
        cleanups.push(id, move || async move {
            let res = bounded(&target, Op::Delete, after, client.delete(&target.name, &settings().delete_params())).await;
            match res {
                Ok(Ok(())) => info!(id = %target, "rolled back"),
                Ok(Err(e)) if is_not_found(&e) => debug!(id = %target, "rollback target already gone"),
                Ok(Err(e)) => warn!(id = %target, error = %e, "rollback delete failed"),
                Err(e) => warn!(id = %target, error = %e, "rollback delete failed"),
            }
        });

        if found {
            self.update().await
        } else {
            self.apply().await
        }
    }
}
