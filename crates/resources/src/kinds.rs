//! Per-kind policy: readiness counters and orphan handling.

use std::fmt::Debug;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use k8s_openapi::NamespaceResourceScope;
use kube::{Api, Client};
use rekon_core::Readiness;
use serde::{de::DeserializeOwned, Serialize};

/// What `delete_orphan` does for a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrphanPolicy {
    /// Dependents carry owner references and are collected by the cluster.
    CascadeGc,
    /// Dependents outlive the parent and must be deleted explicitly.
    DeleteDependents,
}

pub trait ManagedKind:
    kube::Resource<DynamicType = ()>
    + k8s_openapi::Resource
    + Clone
    + Default
    + PartialEq
    + Serialize
    + DeserializeOwned
    + Debug
    + Send
    + Sync
    + 'static
{
    const ORPHAN_POLICY: OrphanPolicy = OrphanPolicy::CascadeGc;
    const CLUSTER_SCOPED: bool = false;

    /// Endpoint for this kind. Namespaced kinds fall back to all namespaces
    /// when `namespace` is empty.
    fn api(client: Client, namespace: &str) -> Api<Self>;

    /// Ready vs desired counters; `None` for kinds without a readiness notion.
    fn readiness(&self) -> Option<Readiness> {
        None
    }

    /// Label selector for dependents removed by `delete_orphan`.
    fn dependents_selector(&self) -> Option<String> {
        None
    }
}

fn scoped<K>(client: Client, namespace: &str) -> Api<K>
where
    K: kube::Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
{
    if namespace.is_empty() {
        Api::all(client)
    } else {
        Api::namespaced(client, namespace)
    }
}

/// Kinds that may already exist under another owner and so expose
/// `ensure` and `update`.
pub trait SharedKind: ManagedKind {}

impl ManagedKind for Deployment {
    fn api(client: Client, namespace: &str) -> Api<Self> {
        scoped(client, namespace)
    }

    fn readiness(&self) -> Option<Readiness> {
        let status = self.status.as_ref();
        let ready = status.and_then(|s| s.ready_replicas).unwrap_or(0);
        let desired = status.and_then(|s| s.replicas).unwrap_or(0);
        Some(Readiness::new(ready, desired))
    }
}

impl ManagedKind for DaemonSet {
    fn api(client: Client, namespace: &str) -> Api<Self> {
        scoped(client, namespace)
    }

    fn readiness(&self) -> Option<Readiness> {
        let (ready, desired) = self
            .status
            .as_ref()
            .map(|s| (s.number_ready, s.desired_number_scheduled))
            .unwrap_or((0, 0));
        Some(Readiness::new(ready, desired))
    }
}

impl ManagedKind for StatefulSet {
    // PVCs from volumeClaimTemplates have no owner reference to the set.
    const ORPHAN_POLICY: OrphanPolicy = OrphanPolicy::DeleteDependents;

    fn api(client: Client, namespace: &str) -> Api<Self> {
        scoped(client, namespace)
    }

    fn readiness(&self) -> Option<Readiness> {
        let status = self.status.as_ref();
        let ready = status.and_then(|s| s.ready_replicas).unwrap_or(0);
        let desired = status.map(|s| s.replicas).unwrap_or(0);
        Some(Readiness::new(ready, desired))
    }

    fn dependents_selector(&self) -> Option<String> {
        let spec = self.spec.as_ref()?;
        if spec.volume_claim_templates.as_ref().map_or(true, Vec::is_empty) {
            return None;
        }
        let labels = spec.selector.match_labels.as_ref().filter(|l| !l.is_empty())?;
        Some(labels.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join(","))
    }
}

macro_rules! namespaced_without_counters {
    ($($kind:ty),*) => {$(
        impl ManagedKind for $kind {
            fn api(client: Client, namespace: &str) -> Api<Self> {
                scoped(client, namespace)
            }
        }
    )*};
}

namespaced_without_counters!(ServiceAccount, Role, RoleBinding);

impl ManagedKind for ClusterRole {
    const CLUSTER_SCOPED: bool = true;

    fn api(client: Client, _namespace: &str) -> Api<Self> {
        Api::all(client)
    }
}

impl ManagedKind for ClusterRoleBinding {
    const CLUSTER_SCOPED: bool = true;

    fn api(client: Client, _namespace: &str) -> Api<Self> {
        Api::all(client)
    }
}

impl SharedKind for ServiceAccount {}
impl SharedKind for Role {}
impl SharedKind for RoleBinding {}
impl SharedKind for ClusterRole {}
impl SharedKind for ClusterRoleBinding {}
