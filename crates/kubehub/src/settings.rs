use std::time::Duration;

use kube::api::{DeleteParams, PatchParams, PostParams, PropagationPolicy};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Cascade behaviour applied to every delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Propagation {
    Foreground,
    Background,
    Orphan,
}

impl Propagation {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "foreground" => Some(Self::Foreground),
            "background" => Some(Self::Background),
            "orphan" => Some(Self::Orphan),
            _ => None,
        }
    }

    fn policy(self) -> PropagationPolicy {
        match self {
            Self::Foreground => PropagationPolicy::Foreground,
            Self::Background => PropagationPolicy::Background,
            Self::Orphan => PropagationPolicy::Orphan,
        }
    }
}

/// Process-wide knobs, read from `REKON_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Server-side field manager recorded on every write.
    pub field_manager: String,
    pub propagation: Propagation,
    /// Upper bound for a single server round trip.
    pub request_timeout: Duration,
    /// Page size for list calls; `None` leaves it to the server.
    pub list_page_size: Option<u32>,
}

const DEFAULT_FIELD_MANAGER: &str = "rekon";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

impl Default for Settings {
    fn default() -> Self {
        Self {
            field_manager: DEFAULT_FIELD_MANAGER.to_string(),
            propagation: Propagation::Foreground,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            list_page_size: None,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Parse from an arbitrary key lookup. Invalid values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut s = Self::default();
        if let Some(fm) = lookup("REKON_FIELD_MANAGER").filter(|v| !v.trim().is_empty()) {
            s.field_manager = fm.trim().to_string();
        }
        if let Some(raw) = lookup("REKON_PROPAGATION_POLICY") {
            match Propagation::parse(&raw) {
                Some(p) => s.propagation = p,
                None => warn!(value = %raw, "invalid REKON_PROPAGATION_POLICY; using foreground"),
            }
        }
        if let Some(secs) = lookup("REKON_REQUEST_TIMEOUT_SECS").and_then(|v| v.parse::<u64>().ok()) {
            if secs > 0 {
                s.request_timeout = Duration::from_secs(secs);
            }
        }
        s.list_page_size = lookup("REKON_LIST_PAGE_SIZE")
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|n| *n > 0);
        s
    }

    pub fn patch_params(&self) -> PatchParams {
        PatchParams { field_manager: Some(self.field_manager.clone()), ..Default::default() }
    }

    pub fn post_params(&self) -> PostParams {
        PostParams { field_manager: Some(self.field_manager.clone()), ..Default::default() }
    }

    pub fn delete_params(&self) -> DeleteParams {
        DeleteParams { propagation_policy: Some(self.propagation.policy()), ..Default::default() }
    }
}

static SETTINGS: Lazy<Settings> = Lazy::new(Settings::from_env);

/// Settings for this process, read from the environment on first use.
pub fn settings() -> &'static Settings {
    &SETTINGS
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_without_env() {
        let s = Settings::from_lookup(lookup(&[]));
        assert_eq!(s, Settings::default());
        assert_eq!(s.field_manager, "rekon");
        assert_eq!(s.propagation, Propagation::Foreground);
        assert_eq!(s.request_timeout, Duration::from_secs(30));
        assert_eq!(s.list_page_size, None);
    }

    #[test]
    fn env_overrides() {
        let s = Settings::from_lookup(lookup(&[
            ("REKON_FIELD_MANAGER", "deployer"),
            ("REKON_PROPAGATION_POLICY", "Background"),
            ("REKON_REQUEST_TIMEOUT_SECS", "5"),
            ("REKON_LIST_PAGE_SIZE", "100"),
        ]));
        assert_eq!(s.field_manager, "deployer");
        assert_eq!(s.propagation, Propagation::Background);
        assert_eq!(s.request_timeout, Duration::from_secs(5));
        assert_eq!(s.list_page_size, Some(100));
    }

    #[test]
    fn garbage_falls_back() {
        let s = Settings::from_lookup(lookup(&[
            ("REKON_FIELD_MANAGER", "  "),
            ("REKON_PROPAGATION_POLICY", "sideways"),
            ("REKON_REQUEST_TIMEOUT_SECS", "0"),
            ("REKON_LIST_PAGE_SIZE", "-3"),
        ]));
        assert_eq!(s, Settings::default());
    }

    #[test]
    fn params_carry_manager_and_policy() {
        let s = Settings::default();
        assert_eq!(s.patch_params().field_manager.as_deref(), Some("rekon"));
        assert_eq!(s.post_params().field_manager.as_deref(), Some("rekon"));
        assert!(matches!(s.delete_params().propagation_policy, Some(PropagationPolicy::Foreground)));
    }
}
