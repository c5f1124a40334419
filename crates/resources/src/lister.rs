use std::sync::Arc;

use kube::api::ListParams;
use kube::ResourceExt;
use rekon_core::Identity;
use rekon_kubehub::{settings, KindClient};
use tracing::debug;

use crate::error::{Error, Op, Result};
use crate::kinds::ManagedKind;
use crate::object::{bounded, Object};

/// List every object of `K`, following continuation tokens to the last page.
///
/// Any failing page fails the whole listing; callers never see a partial set.
/// With an empty `namespace`, each namespaced item keeps its own namespace and
/// its wrapper is routed through it.
pub async fn list<K: ManagedKind>(
    client: Arc<dyn KindClient<K>>,
    namespace: &str,
    mut params: ListParams,
) -> Result<Vec<Object<K>>> {
    if params.limit.is_none() {
        params.limit = settings().list_page_size;
    }
    let timeout = settings().request_timeout;
    let scope = Identity::new(K::KIND, "", namespace);
    let mut items = Vec::new();
    let mut pages = 0usize;
    loop {
        let page = bounded(&scope, Op::List, timeout, client.list(&params))
            .await?
            .map_err(|e| Error::from_kube(scope.clone(), Op::List, e))?;
        pages += 1;
        let last = page.is_last();
        for item in page.items {
            let name = item.name_any();
            items.push(Object::new(client.clone(), namespace, &name, Some(item)));
        }
        if last {
            break;
        }
        params.continue_token = page.continue_token;
    }
    debug!(kind = K::KIND, ns = %namespace, pages, count = items.len(), "listed");
    Ok(items)
}
