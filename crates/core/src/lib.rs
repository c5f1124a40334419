//! rekon core types: identities and the health state machine.

#![forbid(unsafe_code)]

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod prelude {
    pub use super::{derive_status, Health, Identity, Readiness, StatusResult};
}

/// Kind-qualified key of a live object. Namespace is empty for cluster-scoped kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identity {
    pub kind: String,
    pub name: String,
    pub namespace: String,
}

impl Identity {
    pub fn new(kind: impl Into<String>, name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self { kind: kind.into(), name: name.into(), namespace: namespace.into() }
    }

    pub fn cluster_scoped(&self) -> bool {
        self.namespace.is_empty()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}/{}", self.kind, self.name)
        } else {
            write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
        }
    }
}

/// Coarse health of a managed object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    Active,
    Waiting,
    Terminated,
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Health::Active => "active",
            Health::Waiting => "waiting",
            Health::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResult {
    pub message: String,
    pub state: Health,
    /// When the state took effect. Only `Terminated` carries its own timestamp;
    /// the other states report the observation time.
    pub since: DateTime<Utc>,
}

/// Readiness counters reported by the cluster for workload kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Readiness {
    pub ready: i32,
    pub desired: i32,
}

impl Readiness {
    pub fn new(ready: i32, desired: i32) -> Self {
        Self { ready, desired }
    }
}

/// Map observed object state to a health state.
///
/// - a deletion timestamp wins and is reported as the effective time
/// - equal counters (or no counters at all) mean `Active`
/// - anything else is `Waiting`
pub fn derive_status(
    deletion: Option<DateTime<Utc>>,
    readiness: Option<Readiness>,
    now: DateTime<Utc>,
) -> StatusResult {
    if let Some(ts) = deletion {
        return StatusResult { message: String::new(), state: Health::Terminated, since: ts };
    }
    match readiness {
        Some(r) if r.ready != r.desired => StatusResult {
            message: format!("waiting for {}/{} ready", r.ready, r.desired),
            state: Health::Waiting,
            since: now,
        },
        _ => StatusResult { message: String::new(), state: Health::Active, since: now },
    }
}
