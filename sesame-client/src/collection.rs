use sesame_core::path;

/// Handle on a remote collection, identified by the last segment of its
/// object path.
///
/// Handles are only minted by [`crate::Registry`], which keeps one instance
/// per name. A handle carries no remote state and is not invalidated when
/// the collection is deleted elsewhere.
#[derive(Debug)]
pub struct Collection {
    name: String,
}

impl Collection {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path relative to the service root, e.g. `collection/login`.
    pub fn subpath(&self) -> String {
        path::collection_subpath(&self.name)
    }
}
