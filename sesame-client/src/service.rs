//! Client-side view of the Secret Service: collections, items and the
//! prompts that guard changes to them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use sesame_core::translate::{self, Condition};
use sesame_core::{
    COLLECTION_INTERFACE, COLLECTION_LABEL_PROPERTY, Config, Error, ITEM_INTERFACE, NO_OBJECT,
    Result, WindowIdProvider, window,
};
use tracing::{debug, info};

use crate::bus::{Bus, PromptResult};
use crate::collection::Collection;
use crate::dbus::DbusBus;
use crate::item::Item;
use crate::prompt::Prompt;
use crate::proxy::proxy;
use crate::registry::Registry;

/// A connection to the Secret Service plus the identity caches for the
/// handles it hands out.
pub struct SecretService {
    bus: Arc<dyn Bus>,
    registry: Registry,
    window: Arc<dyn WindowIdProvider>,
    prompt_timeout: Option<Duration>,
}

impl SecretService {
    pub fn new(bus: Arc<dyn Bus>, window: Arc<dyn WindowIdProvider>) -> Self {
        Self {
            bus,
            registry: Registry::new(),
            window,
            prompt_timeout: None,
        }
    }

    /// Bound every prompt wait; `None` waits until the user answers.
    pub fn with_prompt_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.prompt_timeout = timeout;
        self
    }

    /// Connect using the bus and prompt settings from `config`.
    pub async fn connect(config: &Config) -> Result<Self> {
        let bus = DbusBus::connect(config.bus.address.as_deref()).await?;
        let window = window::from_config(&config.prompt)?;
        info!("connected to secret service");
        Ok(Self::new(Arc::new(bus), window).with_prompt_timeout(config.prompt.timeout()))
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    // -----------------------------------------------------------------------
    // Collections
    // -----------------------------------------------------------------------

    pub fn collection(&self, name: &str) -> Arc<Collection> {
        self.registry.collection(name)
    }

    pub fn collection_by_path(&self, path: &str) -> Result<Arc<Collection>> {
        self.registry.collection_by_path(path)
    }

    /// Resolve an alias such as `default` via `ReadAlias`.
    pub async fn collection_by_alias(&self, alias: &str) -> Result<Arc<Collection>> {
        let service = proxy(&*self.bus, None).await?;
        let path = service.read_alias(alias).await?;
        if path == NO_OBJECT {
            return Err(Error::NotFound(format!("alias '{alias}'")));
        }
        self.collection_by_path(&path)
    }

    /// All collections, in the order the service lists them.
    pub async fn collections(&self) -> Result<Vec<Arc<Collection>>> {
        let service = proxy(&*self.bus, None).await?;
        service
            .collections()
            .await?
            .iter()
            .map(|path| self.collection_by_path(path))
            .collect()
    }

    /// Create a collection labelled `label`, optionally under `alias`.
    ///
    /// Services that need the user's consent answer with a prompt, which is
    /// completed before the new collection is returned.
    pub async fn create_collection(
        &self,
        label: &str,
        alias: Option<&str>,
    ) -> Result<Arc<Collection>> {
        let properties =
            HashMap::from([(COLLECTION_LABEL_PROPERTY.to_string(), label.to_string())]);
        let service = proxy(&*self.bus, None).await?;
        // gnome-keyring refuses any alias other than "default" with NotSupported.
        let (path, prompt_path) = translate::expect(
            service
                .create_collection(&properties, alias.unwrap_or(""))
                .await,
            &[Condition::NotSupported],
            "service",
        )?;

        let path = if path == NO_OBJECT {
            debug!(prompt = %prompt_path, "collection creation needs a prompt");
            self.complete_prompt(&prompt_path)
                .await?
                .into_path()
                .ok_or(Error::BadObjectPath(prompt_path))?
        } else {
            path
        };
        info!(path = %path, label, "created collection");
        self.collection_by_path(&path)
    }

    pub async fn collection_label(&self, collection: &Collection) -> Result<String> {
        let object = proxy(&*self.bus, Some(&collection.subpath())).await?;
        translate::expect(
            object.label(COLLECTION_INTERFACE).await,
            &[Condition::NoSuchObject],
            &describe(collection),
        )
    }

    /// Items currently in `collection`, read fresh from the service.
    pub async fn items(&self, collection: &Collection) -> Result<Vec<Arc<Item>>> {
        let object = proxy(&*self.bus, Some(&collection.subpath())).await?;
        let paths = translate::expect(
            object.items().await,
            &[Condition::NoSuchObject],
            &describe(collection),
        )?;
        paths.iter().map(|path| self.item_by_path(path)).collect()
    }

    /// Items of `collection` whose attributes include all of `attributes`.
    pub async fn search_items(
        &self,
        collection: &Collection,
        attributes: &HashMap<String, String>,
    ) -> Result<Vec<Arc<Item>>> {
        let object = proxy(&*self.bus, Some(&collection.subpath())).await?;
        let paths = translate::expect(
            object.search_items(attributes).await,
            &[Condition::NoSuchObject],
            &describe(collection),
        )?;
        paths.iter().map(|path| self.item_by_path(path)).collect()
    }

    /// Delete `collection`, completing the confirmation prompt if the
    /// service asks for one. The handle is evicted from the registry
    /// afterwards, so it must not be used again.
    pub async fn delete_collection(&self, collection: &Collection) -> Result<()> {
        let object = proxy(&*self.bus, Some(&collection.subpath())).await?;
        let prompt_path = translate::expect(
            object.delete().await,
            &[Condition::NoSuchObject],
            &describe(collection),
        )?;
        if prompt_path != NO_OBJECT {
            debug!(prompt = %prompt_path, "collection deletion needs a prompt");
            self.complete_prompt(&prompt_path).await?;
        }
        self.registry.evict_collection(collection.name());
        info!(collection = collection.name(), "deleted collection");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Items
    // -----------------------------------------------------------------------

    pub fn item(&self, collection: &str, name: &str) -> Arc<Item> {
        self.registry.item(collection, name)
    }

    pub fn item_by_path(&self, path: &str) -> Result<Arc<Item>> {
        self.registry.item_by_path(path)
    }

    /// The item's attributes as the service reports them right now.
    pub async fn attributes(&self, item: &Item) -> Result<HashMap<String, String>> {
        let object = proxy(&*self.bus, Some(&item.subpath())).await?;
        Ok(object.attributes().await?)
    }

    pub async fn item_label(&self, item: &Item) -> Result<String> {
        let object = proxy(&*self.bus, Some(&item.subpath())).await?;
        Ok(object.label(ITEM_INTERFACE).await?)
    }

    // -----------------------------------------------------------------------
    // Misc
    // -----------------------------------------------------------------------

    /// Introspection XML for `subpath` under the service root.
    pub async fn introspect(&self, subpath: Option<&str>) -> Result<String> {
        let object = proxy(&*self.bus, subpath).await?;
        let subject = object.path().to_string();
        translate::expect(object.introspect().await, &[Condition::NoSuchObject], &subject)
    }

    async fn complete_prompt(&self, prompt_path: &str) -> Result<PromptResult> {
        Prompt::new(prompt_path)
            .complete(&*self.bus, Arc::clone(&self.window), self.prompt_timeout)
            .await
    }
}

fn describe(collection: &Collection) -> String {
    format!("collection '{}'", collection.name())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeBus, Prompting};
    use sesame_core::window::FixedWindowId;

    fn service(bus: &FakeBus) -> SecretService {
        SecretService::new(
            Arc::new(bus.clone()),
            Arc::new(FixedWindowId("0x3a00007".to_string())),
        )
    }

    fn login_and_session() -> FakeBus {
        let bus = FakeBus::new();
        bus.add_collection("login", "Login");
        bus.add_collection("session", "Session");
        bus.set_alias("default", "login");
        bus.set_alias("session", "session");
        bus
    }

    fn names(collections: &[Arc<Collection>]) -> Vec<&str> {
        collections.iter().map(|c| c.name()).collect()
    }

    #[tokio::test]
    async fn lists_collections_in_service_order() {
        let bus = login_and_session();
        let ss = service(&bus);

        let collections = ss.collections().await.unwrap();

        assert_eq!(names(&collections), ["login", "session"]);
        assert!(Arc::ptr_eq(&collections[0], &ss.collection("login")));
    }

    #[tokio::test]
    async fn resolves_aliases() {
        let bus = login_and_session();
        let ss = service(&bus);

        let default = ss.collection_by_alias("default").await.unwrap();
        assert_eq!(default.name(), "login");
        assert!(Arc::ptr_eq(&default, &ss.collection("login")));

        match ss.collection_by_alias("nothing").await {
            Err(Error::NotFound(what)) => assert_eq!(what, "alias 'nothing'"),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn create_without_prompt_skips_prompt_completion() {
        let bus = FakeBus::new();
        let ss = service(&bus);

        let created = ss.create_collection("Work", None).await.unwrap();

        assert_eq!(created.name(), "work");
        assert!(bus.has_collection("work"));
        assert!(bus.calls().iter().all(|c| !c.starts_with("Prompt ")));
        assert_eq!(bus.live_subscriptions(), 0);
    }

    #[tokio::test]
    async fn create_with_prompt_completes_it_first() {
        let bus = FakeBus::new();
        bus.set_prompting(Prompting::Approve);
        let ss = service(&bus);

        let created = ss.create_collection("Work", Some("default")).await.unwrap();

        assert_eq!(created.name(), "work");
        assert!(bus.has_collection("work"));
        assert!(bus.calls().iter().any(|c| c.starts_with("Prompt ") && c.ends_with(" 0x3a00007")));
        let default = ss.collection_by_alias("default").await.unwrap();
        assert!(Arc::ptr_eq(&default, &created));
    }

    #[tokio::test]
    async fn create_dismissed() {
        let bus = FakeBus::new();
        bus.set_prompting(Prompting::Dismiss);
        let ss = service(&bus);

        let err = ss.create_collection("Work", None).await.unwrap_err();

        assert!(matches!(err, Error::PromptDismissed));
        assert!(!bus.has_collection("work"));
    }

    #[tokio::test]
    async fn unsupported_alias_is_translated() {
        let bus = FakeBus::new();
        bus.only_default_alias();
        let ss = service(&bus);

        match ss.create_collection("Work", Some("work")).await {
            Err(Error::Server(msg)) => assert_eq!(msg, "Only the 'default' alias is supported"),
            other => panic!("expected Server error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn items_are_resolved_through_the_registry() {
        let bus = login_and_session();
        bus.add_item("login", "870", &[("service", "github")]);
        bus.add_item("login", "871", &[("service", "gitlab")]);
        let ss = service(&bus);
        let login = ss.collection("login");

        let items = ss.items(&login).await.unwrap();

        let item_names: Vec<_> = items.iter().map(|i| i.name()).collect();
        assert_eq!(item_names, ["870", "871"]);
        assert!(Arc::ptr_eq(&items[0], &ss.item("login", "870")));
        assert!(Arc::ptr_eq(items[0].collection(), &login));
    }

    #[tokio::test]
    async fn search_filters_by_attributes() {
        let bus = login_and_session();
        bus.add_item("login", "870", &[("service", "github")]);
        bus.add_item("login", "871", &[("service", "gitlab")]);
        let ss = service(&bus);

        let query = HashMap::from([("service".to_string(), "gitlab".to_string())]);
        let found = ss.search_items(&ss.collection("login"), &query).await.unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name(), "871");
    }

    #[tokio::test]
    async fn attributes_are_read_live() {
        let bus = login_and_session();
        bus.add_item("login", "870", &[("service", "github"), ("user", "ann")]);
        let ss = service(&bus);
        let item = ss.item("login", "870");

        let first = ss.attributes(&item).await.unwrap();
        assert_eq!(first.get("user").map(String::as_str), Some("ann"));
        assert_eq!(first.len(), 2);

        bus.set_attributes("login", "870", &[("service", "github"), ("user", "bob")]);
        let second = ss.attributes(&item).await.unwrap();
        assert_eq!(second.get("user").map(String::as_str), Some("bob"));
    }

    #[tokio::test]
    async fn labels() {
        let bus = login_and_session();
        bus.add_item("login", "870", &[]);
        let ss = service(&bus);

        assert_eq!(ss.collection_label(&ss.collection("login")).await.unwrap(), "Login");
        assert_eq!(ss.item_label(&ss.item("login", "870")).await.unwrap(), "item 870");
    }

    #[tokio::test]
    async fn delete_without_prompt_evicts() {
        let bus = login_and_session();
        bus.add_item("login", "870", &[]);
        let ss = service(&bus);
        let login = ss.collection("login");
        ss.item("login", "870");

        ss.delete_collection(&login).await.unwrap();

        assert!(!bus.has_collection("login"));
        assert!(!Arc::ptr_eq(&login, &ss.collection("login")));
        assert_eq!(ss.registry().cached_items(), 0);
    }

    #[tokio::test]
    async fn delete_with_prompt() {
        let bus = login_and_session();
        bus.set_prompting(Prompting::Approve);
        let ss = service(&bus);

        ss.delete_collection(&ss.collection("session")).await.unwrap();

        assert!(!bus.has_collection("session"));
        assert!(bus.calls().iter().any(|c| c.starts_with("Prompt ")));
    }

    #[tokio::test]
    async fn delete_dismissed_keeps_collection() {
        let bus = login_and_session();
        bus.set_prompting(Prompting::Dismiss);
        let ss = service(&bus);
        let login = ss.collection("login");

        let err = ss.delete_collection(&login).await.unwrap_err();

        assert!(matches!(err, Error::PromptDismissed));
        assert!(bus.has_collection("login"));
        assert!(Arc::ptr_eq(&login, &ss.collection("login")));
    }

    #[tokio::test]
    async fn deleting_a_missing_collection_is_not_found() {
        let bus = login_and_session();
        let ss = service(&bus);

        match ss.delete_collection(&ss.collection("nope")).await {
            Err(Error::NotFound(what)) => assert_eq!(what, "collection 'nope'"),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn bad_paths_from_the_service_surface() {
        let bus = FakeBus::new();
        bus.add_foreign_collection_path("/org/gnome/keyring/collection/odd");
        let ss = service(&bus);

        assert!(matches!(ss.collections().await, Err(Error::BadObjectPath(_))));
    }

    #[tokio::test]
    async fn introspection() {
        let bus = login_and_session();
        let ss = service(&bus);

        let xml = ss.introspect(None).await.unwrap();
        assert!(xml.contains("org.freedesktop.Secret.Service"));
        let xml = ss.introspect(Some("collection/login")).await.unwrap();
        assert!(xml.contains("org.freedesktop.Secret.Collection"));

        match ss.introspect(Some("collection/nope")).await {
            Err(Error::NotFound(what)) => {
                assert_eq!(what, "/org/freedesktop/secrets/collection/nope")
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }
}
