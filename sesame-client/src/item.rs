use std::sync::Arc;

use sesame_core::path;

use crate::collection::Collection;

/// Handle on a remote item, identified by `(collection name, item name)`.
#[derive(Debug)]
pub struct Item {
    collection: Arc<Collection>,
    name: String,
}

impl Item {
    pub(crate) fn new(collection: Arc<Collection>, name: impl Into<String>) -> Self {
        Self {
            collection,
            name: name.into(),
        }
    }

    /// The registry's handle for the collection this item lives in.
    pub fn collection(&self) -> &Arc<Collection> {
        &self.collection
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn subpath(&self) -> String {
        path::item_subpath(self.collection.name(), &self.name)
    }

    pub fn path(&self) -> String {
        path::item_path(self.collection.name(), &self.name)
    }
}
