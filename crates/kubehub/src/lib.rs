//! rekon kubehub: the per-kind client capability, its kube-rs implementation,
//! and process-wide settings.

#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use kube::Client;
use tracing::debug;

mod client;
mod settings;

pub use client::{is_conflict, is_not_found, ApiClient, Dependents, KindClient, Page, Scope};
pub use settings::{settings, Propagation, Settings};

/// Build a client from the current kubeconfig context or in-cluster environment.
pub async fn get_kube_client() -> Result<Client> {
    let client = Client::try_default().await.context("building kube client from default config")?;
    debug!(namespace = %client.default_namespace(), "kube client ready");
    Ok(client)
}
