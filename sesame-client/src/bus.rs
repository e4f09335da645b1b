//! The transport contract the object model is written against.
//!
//! [`crate::dbus`] implements it over zbus. Each [`RemoteObject`] method maps
//! to one Secret Service call or property read on the object the handle was
//! resolved for; calling a method the object does not implement surfaces as
//! whatever error the service returns.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{BoxStream, Stream, StreamExt};
use sesame_core::BusError;
use tracing::debug;

pub type BusResult<T> = Result<T, BusError>;

#[async_trait]
pub trait Bus: Send + Sync {
    /// A handle on the object at absolute `path`, owned by the well-known
    /// Secret Service name. Resolving does not check that the object exists.
    async fn object(&self, path: &str) -> BusResult<Arc<dyn RemoteObject>>;
}

#[async_trait]
pub trait RemoteObject: Send + Sync {
    fn path(&self) -> &str;

    /// `Service.Collections` property.
    async fn collections(&self) -> BusResult<Vec<String>>;
    /// `Service.ReadAlias(alias)`.
    async fn read_alias(&self, alias: &str) -> BusResult<String>;
    /// `Service.CreateCollection(properties, alias)`, returning
    /// `(collection path, prompt path)`.
    async fn create_collection(
        &self,
        properties: &HashMap<String, String>,
        alias: &str,
    ) -> BusResult<(String, String)>;

    /// `Collection.Items` property.
    async fn items(&self) -> BusResult<Vec<String>>;
    /// `Collection.SearchItems(attributes)`.
    async fn search_items(&self, attributes: &HashMap<String, String>) -> BusResult<Vec<String>>;
    /// `Collection.Delete()`, returning a prompt path or `/`.
    async fn delete(&self) -> BusResult<String>;

    /// `Label` property of `interface` (collection or item).
    async fn label(&self, interface: &'static str) -> BusResult<String>;
    /// `Item.Attributes` property.
    async fn attributes(&self) -> BusResult<HashMap<String, String>>;

    /// `Prompt.Prompt(window_id)`. The outcome arrives as a `Completed` signal.
    async fn prompt(&self, window_id: &str) -> BusResult<()>;
    /// `Prompt.Dismiss()`.
    async fn dismiss(&self) -> BusResult<()>;
    /// Start listening for `Prompt.Completed` from this object. The match is
    /// released when the returned [`Subscription`] is dropped.
    async fn subscribe_completed(&self) -> BusResult<Subscription>;

    /// `org.freedesktop.DBus.Introspectable.Introspect()`.
    async fn introspect(&self) -> BusResult<String>;
}

/// Payload of a `Prompt.Completed` signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completed {
    pub dismissed: bool,
    pub result: PromptResult,
}

/// The variant `result` of `Prompt.Completed`, decoded into the shapes
/// Secret Service operations actually produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptResult {
    Empty,
    Path(String),
    Paths(Vec<String>),
    Text(String),
}

impl PromptResult {
    /// The single object path this result carries, if any.
    pub fn into_path(self) -> Option<String> {
        match self {
            Self::Path(path) => Some(path),
            Self::Paths(mut paths) if paths.len() == 1 => paths.pop(),
            _ => None,
        }
    }
}

/// A live signal match on one object. Dropping it deregisters the match.
pub struct Subscription {
    path: String,
    signals: BoxStream<'static, BusResult<Completed>>,
}

impl Subscription {
    pub fn new(
        path: impl Into<String>,
        signals: impl Stream<Item = BusResult<Completed>> + Send + 'static,
    ) -> Self {
        let path = path.into();
        debug!(path = %path, "signal subscription registered");
        Self {
            path,
            signals: signals.boxed(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// The next delivery, or `None` once the transport has closed the stream.
    pub async fn next(&mut self) -> Option<BusResult<Completed>> {
        self.signals.next().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        debug!(path = %self.path, "signal subscription released");
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("path", &self.path).finish()
    }
}
