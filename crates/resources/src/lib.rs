//! rekon resources: one lifecycle contract (apply, get, delete, status) over
//! heterogeneous Kubernetes kinds, with ownership claims, rollback lists and
//! paginated listing.

#![forbid(unsafe_code)]

use std::sync::Arc;

use kube::Client;
use rekon_kubehub::{ApiClient, KindClient};

mod claim;
mod cleanup;
mod error;
mod kinds;
mod lister;
mod object;
mod resource;

pub use claim::{Claim, ClaimRunner, HasLabels, ManagedBy, MANAGED_BY_KEY};
pub use cleanup::Cleanups;
pub use error::{Error, Op, Result};
pub use kinds::{ManagedKind, OrphanPolicy, SharedKind};
pub use lister::list;
pub use object::Object;
pub use resource::Resource;

pub use rekon_core::{Health, Identity, StatusResult};

/// Shared client handle for `K` in `namespace` (empty for cluster scope or
/// all namespaces). Objects wrapped around an all-namespaces handle are
/// routed through their own namespace by [`Object::new`].
pub fn handle<K: ManagedKind>(client: Client, namespace: &str) -> Arc<dyn KindClient<K>> {
    Arc::new(ApiClient::new(client, namespace, K::api))
}
