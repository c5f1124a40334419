use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rekon_core::{Identity, StatusResult};
use serde_json::Value as Json;

use crate::error::Result;
use crate::kinds::ManagedKind;
use crate::object::Object;

/// Lifecycle contract shared by every managed kind.
///
/// Calls that refresh the body take `&mut self`; a single instance is driven
/// by one task at a time.
#[async_trait]
pub trait Resource: Send + Sync {
    fn id(&self) -> Identity;

    async fn apply(&mut self) -> Result<()>;

    async fn get(&mut self) -> Result<()>;

    async fn delete(&self) -> Result<()>;

    async fn delete_orphan(&self) -> Result<()>;

    /// Independent copy sharing the same client.
    fn clone_resource(&self) -> Box<dyn Resource>;

    fn compute_status(&self, now: DateTime<Utc>) -> StatusResult;

    fn manifest(&self) -> Result<Json>;
}

#[async_trait]
impl<K: ManagedKind> Resource for Object<K> {
    fn id(&self) -> Identity {
        Object::id(self)
    }

    async fn apply(&mut self) -> Result<()> {
        Object::apply(self).await
    }

    async fn get(&mut self) -> Result<()> {
        Object::get(self).await
    }

    async fn delete(&self) -> Result<()> {
        Object::delete(self).await
    }

    async fn delete_orphan(&self) -> Result<()> {
        Object::delete_orphan(self).await
    }

    fn clone_resource(&self) -> Box<dyn Resource> {
        Box::new(self.clone())
    }

    fn compute_status(&self, now: DateTime<Utc>) -> StatusResult {
        Object::compute_status(self, now)
    }

    fn manifest(&self) -> Result<Json> {
        Object::manifest(self)
    }
}

impl Clone for Box<dyn Resource> {
    fn clone(&self) -> Self {
        self.clone_resource()
    }
}
