//! Identity caches for collection and item handles.
//!
//! Equal keys always resolve to the same `Arc`, so handles can be compared
//! with [`Arc::ptr_eq`]. Entries live until evicted; the registry does not
//! notice remote deletions on its own.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use sesame_core::{Result, path};
use tracing::debug;

use crate::collection::Collection;
use crate::item::Item;

#[derive(Debug, Default)]
pub struct Registry {
    collections: Mutex<HashMap<String, Arc<Collection>>>,
    items: Mutex<HashMap<(String, String), Arc<Item>>>,
}

// Entries are inserted whole, so a panic elsewhere cannot leave a map half
// updated.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The handle for `name`, created on first use. No remote call is made.
    pub fn collection(&self, name: &str) -> Arc<Collection> {
        let mut collections = lock(&self.collections);
        Arc::clone(
            collections
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Collection::new(name))),
        )
    }

    pub fn collection_by_path(&self, path: &str) -> Result<Arc<Collection>> {
        Ok(self.collection(path::collection_name_from_path(path)?))
    }

    /// The handle for item `name` in `collection`; also registers the
    /// collection.
    pub fn item(&self, collection: &str, name: &str) -> Arc<Item> {
        // Lock order is collections, then items, here and in eviction.
        let mut collections = lock(&self.collections);
        let mut items = lock(&self.items);
        let key = (collection.to_string(), name.to_string());
        if let Some(item) = items.get(&key) {
            return Arc::clone(item);
        }
        let owner = Arc::clone(
            collections
                .entry(collection.to_string())
                .or_insert_with(|| Arc::new(Collection::new(collection))),
        );
        Arc::clone(
            items
                .entry(key)
                .or_insert_with(|| Arc::new(Item::new(owner, name))),
        )
    }

    pub fn item_by_path(&self, path: &str) -> Result<Arc<Item>> {
        let (collection, name) = path::item_key_from_path(path)?;
        Ok(self.item(collection, name))
    }

    /// Forget `name` and every item cached under it.
    pub fn evict_collection(&self, name: &str) {
        let mut collections = lock(&self.collections);
        let mut items = lock(&self.items);
        let removed = collections.remove(name).is_some();
        let before = items.len();
        items.retain(|(collection, _), _| collection != name);
        debug!(
            collection = name,
            removed,
            items = before - items.len(),
            "evicted collection from registry"
        );
    }

    pub fn cached_collections(&self) -> usize {
        lock(&self.collections).len()
    }

    pub fn cached_items(&self) -> usize {
        lock(&self.items).len()
    }
}
