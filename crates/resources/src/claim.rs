//! Ownership claims checked against a live object before it may be taken over.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::error::Result;

pub const MANAGED_BY_KEY: &str = "app.kubernetes.io/managed-by";

/// Read-only predicate over a live object's metadata.
///
/// `Ok(false)` means the object exists but is not ours to mutate.
pub trait Claim: Send + Sync {
    fn assert(&self, meta: &ObjectMeta) -> Result<bool>;
}

impl<F> Claim for F
where
    F: Fn(&ObjectMeta) -> Result<bool> + Send + Sync,
{
    fn assert(&self, meta: &ObjectMeta) -> Result<bool> {
        self(meta)
    }
}

/// Holds when the `app.kubernetes.io/managed-by` label equals the given value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedBy(pub String);

impl ManagedBy {
    pub fn new(manager: impl Into<String>) -> Self {
        Self(manager.into())
    }
}

impl Claim for ManagedBy {
    fn assert(&self, meta: &ObjectMeta) -> Result<bool> {
        let value = meta.labels.as_ref().and_then(|l| l.get(MANAGED_BY_KEY));
        Ok(value.map(String::as_str) == Some(self.0.as_str()))
    }
}

/// Holds when every given label is present with the same value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HasLabels(pub BTreeMap<String, String>);

impl HasLabels {
    pub fn new<I, K, V>(labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(labels.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl Claim for HasLabels {
    fn assert(&self, meta: &ObjectMeta) -> Result<bool> {
        let Some(live) = meta.labels.as_ref() else {
            return Ok(self.0.is_empty());
        };
        Ok(self.0.iter().all(|(k, v)| live.get(k) == Some(v)))
    }
}

/// Conjunction of claims. Stops at the first claim that fails or errors;
/// an empty runner passes.
#[derive(Clone, Copy)]
pub struct ClaimRunner<'a> {
    claims: &'a [&'a dyn Claim],
}

impl<'a> ClaimRunner<'a> {
    pub fn new(claims: &'a [&'a dyn Claim]) -> Self {
        Self { claims }
    }
}

impl Claim for ClaimRunner<'_> {
    fn assert(&self, meta: &ObjectMeta) -> Result<bool> {
        for claim in self.claims {
            if !claim.assert(meta)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
