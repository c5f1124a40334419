use std::fmt;
use std::future::Future;

use futures::future::BoxFuture;
use rekon_core::Identity;
use tracing::debug;

type Action = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Compensating actions registered while ensuring objects, newest last.
///
/// A caller that fails part way through a multi-object rollout runs the list
/// to undo what was already done.
#[derive(Default)]
pub struct Cleanups {
    entries: Vec<(Identity, Action)>,
}

impl Cleanups {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<F, Fut>(&mut self, id: Identity, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.entries.push((id, Box::new(move || Box::pin(action()))));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Identities with a registered rollback, in registration order.
    pub fn ids(&self) -> impl Iterator<Item = &Identity> {
        self.entries.iter().map(|(id, _)| id)
    }

    pub fn append(&mut self, mut other: Cleanups) {
        self.entries.append(&mut other.entries);
    }

    /// Run every action, most recent first.
    pub async fn run(self) {
        for (id, action) in self.entries.into_iter().rev() {
            debug!(id = %id, "rolling back");
            action().await;
        }
    }
}

impl fmt::Debug for Cleanups {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn id(name: &str) -> Identity {
        Identity::new("ClusterRole", name, "")
    }

    #[tokio::test]
    async fn runs_in_reverse_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut cleanups = Cleanups::new();
        for name in ["a", "b", "c"] {
            let log = log.clone();
            cleanups.push(id(name), move || async move { log.lock().unwrap().push(name) });
        }
        assert_eq!(cleanups.len(), 3);
        cleanups.run().await;
        assert_eq!(*log.lock().unwrap(), vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn append_keeps_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut first = Cleanups::new();
        let mut second = Cleanups::new();
        let l = log.clone();
        first.push(id("a"), move || async move { l.lock().unwrap().push("a") });
        let l = log.clone();
        second.push(id("b"), move || async move { l.lock().unwrap().push("b") });
        first.append(second);
        let names: Vec<_> = first.ids().map(|i| i.name.clone()).collect();
        assert_eq!(names, vec!["a", "b"]);
        first.run().await;
        assert_eq!(*log.lock().unwrap(), vec!["b", "a"]);
    }

    #[test]
    fn debug_lists_identities() {
        let mut c = Cleanups::new();
        c.push(id("x"), || async {});
        assert!(format!("{c:?}").contains("\"x\""));
    }
}
