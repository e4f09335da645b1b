//! In-memory Secret Service for tests, here and (with the `test-util`
//! feature) in dependent crates.
//!
//! Collections keep insertion order, prompts can approve, dismiss, hang or
//! drop their subscribers, and every call is logged as a short string.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use sesame_core::{BusError, COLLECTION_LABEL_PROPERTY, ITEM_INTERFACE, NO_OBJECT, SERVICE_PATH, path};
use tokio::sync::mpsc;

use crate::bus::{Bus, BusResult, Completed, PromptResult, RemoteObject, Subscription};

const UNKNOWN_METHOD: &str = "org.freedesktop.DBus.Error.UnknownMethod";
const NOT_SUPPORTED: &str = "org.freedesktop.DBus.Error.NotSupported";

/// What a registered prompt does when `Prompt()` is called.
#[derive(Debug, Clone)]
pub enum PromptBehavior {
    Complete(PromptResult),
    Dismiss,
    /// Never emits `Completed`.
    Hang,
    /// Closes every subscription on the prompt without emitting.
    Vanish,
}

/// Whether create/delete operations go through a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompting {
    Never,
    Approve,
    Dismiss,
    /// Prompts drop their subscribers without emitting.
    Vanish,
}

#[derive(Debug)]
enum Action {
    Create {
        name: String,
        label: String,
        alias: String,
    },
    Delete {
        name: String,
    },
}

struct FakePrompt {
    behavior: PromptBehavior,
    action: Option<Action>,
}

struct FakeItem {
    name: String,
    attributes: HashMap<String, String>,
}

struct FakeCollection {
    name: String,
    label: String,
    items: Vec<FakeItem>,
}

struct State {
    collections: Vec<FakeCollection>,
    foreign_paths: Vec<String>,
    aliases: HashMap<String, String>,
    prompts: HashMap<String, FakePrompt>,
    listeners: HashMap<String, Vec<mpsc::UnboundedSender<BusResult<Completed>>>>,
    prompting: Prompting,
    only_default_alias: bool,
    calls: Vec<String>,
    live_subscriptions: usize,
    next_prompt: u32,
}

#[derive(Clone)]
pub struct FakeBus {
    state: Arc<Mutex<State>>,
}

impl Default for FakeBus {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeBus {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                collections: Vec::new(),
                foreign_paths: Vec::new(),
                aliases: HashMap::new(),
                prompts: HashMap::new(),
                listeners: HashMap::new(),
                prompting: Prompting::Never,
                only_default_alias: false,
                calls: Vec::new(),
                live_subscriptions: 0,
                next_prompt: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn add_collection(&self, name: &str, label: &str) {
        self.lock().collections.push(FakeCollection {
            name: name.to_string(),
            label: label.to_string(),
            items: Vec::new(),
        });
    }

    /// List a path under `Collections` that is not a secrets collection path.
    pub fn add_foreign_collection_path(&self, path: &str) {
        self.lock().foreign_paths.push(path.to_string());
    }

    pub fn add_item(&self, collection: &str, name: &str, attributes: &[(&str, &str)]) {
        let mut state = self.lock();
        let collection = state
            .collections
            .iter_mut()
            .find(|c| c.name == collection)
            .unwrap();
        collection.items.push(FakeItem {
            name: name.to_string(),
            attributes: to_map(attributes),
        });
    }

    pub fn set_attributes(&self, collection: &str, name: &str, attributes: &[(&str, &str)]) {
        let mut state = self.lock();
        let item = state
            .collections
            .iter_mut()
            .find(|c| c.name == collection)
            .and_then(|c| c.items.iter_mut().find(|i| i.name == name))
            .unwrap();
        item.attributes = to_map(attributes);
    }

    pub fn set_alias(&self, alias: &str, collection: &str) {
        self.lock()
            .aliases
            .insert(alias.to_string(), collection.to_string());
    }

    pub fn set_prompting(&self, prompting: Prompting) {
        self.lock().prompting = prompting;
    }

    pub fn only_default_alias(&self) {
        self.lock().only_default_alias = true;
    }

    pub fn add_prompt(&self, path: &str, behavior: PromptBehavior) {
        self.lock().prompts.insert(
            path.to_string(),
            FakePrompt {
                behavior,
                action: None,
            },
        );
    }

    pub fn has_collection(&self, name: &str) -> bool {
        self.lock().collections.iter().any(|c| c.name == name)
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn live_subscriptions(&self) -> usize {
        self.lock().live_subscriptions
    }
}

fn to_map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn no_such_object(path: &str) -> BusError {
    BusError::remote(UNKNOWN_METHOD, format!("Object does not exist at path “{path}”"))
}

impl State {
    fn collection(&self, path: &str) -> BusResult<&FakeCollection> {
        let name = path::collection_name_from_path(path).map_err(|_| no_such_object(path))?;
        self.collections
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| no_such_object(path))
    }

    fn item(&self, path: &str) -> BusResult<&FakeItem> {
        let (collection, name) =
            path::item_key_from_path(path).map_err(|_| no_such_object(path))?;
        self.collections
            .iter()
            .find(|c| c.name == collection)
            .and_then(|c| c.items.iter().find(|i| i.name == name))
            .ok_or_else(|| no_such_object(path))
    }

    fn new_prompt(&mut self, action: Action) -> String {
        self.next_prompt += 1;
        let prompt_path = format!("{SERVICE_PATH}/prompt/u{}", self.next_prompt);
        let behavior = match (self.prompting, &action) {
            (Prompting::Dismiss, _) => PromptBehavior::Dismiss,
            (Prompting::Vanish, _) => PromptBehavior::Vanish,
            (_, Action::Create { name, .. }) => {
                PromptBehavior::Complete(PromptResult::Path(path::collection_path(name)))
            }
            (_, Action::Delete { .. }) => PromptBehavior::Complete(PromptResult::Empty),
        };
        self.prompts.insert(
            prompt_path.clone(),
            FakePrompt {
                behavior,
                action: Some(action),
            },
        );
        prompt_path
    }

    fn apply(&mut self, action: Action) {
        match action {
            Action::Create { name, label, alias } => {
                self.collections.push(FakeCollection {
                    name: name.clone(),
                    label,
                    items: Vec::new(),
                });
                if !alias.is_empty() {
                    self.aliases.insert(alias, name);
                }
            }
            Action::Delete { name } => {
                self.collections.retain(|c| c.name != name);
                self.aliases.retain(|_, target| *target != name);
            }
        }
    }

    fn emit(&mut self, path: &str, completed: Completed) {
        for listener in self.listeners.get(path).into_iter().flatten() {
            let _ = listener.send(Ok(completed.clone()));
        }
    }
}

#[async_trait]
impl Bus for FakeBus {
    async fn object(&self, path: &str) -> BusResult<Arc<dyn RemoteObject>> {
        Ok(Arc::new(FakeObject {
            path: path.to_string(),
            bus: self.clone(),
        }))
    }
}

struct FakeObject {
    path: String,
    bus: FakeBus,
}

impl FakeObject {
    fn require_root(&self) -> BusResult<()> {
        if self.path == SERVICE_PATH {
            Ok(())
        } else {
            Err(no_such_object(&self.path))
        }
    }
}

/// Decrements the live subscription count when the subscription goes away.
struct LiveGuard(FakeBus);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.lock().live_subscriptions -= 1;
    }
}

#[async_trait]
impl RemoteObject for FakeObject {
    fn path(&self) -> &str {
        &self.path
    }

    async fn collections(&self) -> BusResult<Vec<String>> {
        self.require_root()?;
        let state = self.bus.lock();
        let mut paths: Vec<String> = state
            .collections
            .iter()
            .map(|c| path::collection_path(&c.name))
            .collect();
        paths.extend(state.foreign_paths.iter().cloned());
        Ok(paths)
    }

    async fn read_alias(&self, alias: &str) -> BusResult<String> {
        self.require_root()?;
        let state = self.bus.lock();
        Ok(state
            .aliases
            .get(alias)
            .map(|name| path::collection_path(name))
            .unwrap_or_else(|| NO_OBJECT.to_string()))
    }

    async fn create_collection(
        &self,
        properties: &HashMap<String, String>,
        alias: &str,
    ) -> BusResult<(String, String)> {
        self.require_root()?;
        let mut state = self.bus.lock();
        state.calls.push(format!("CreateCollection {alias}"));
        if state.only_default_alias && !alias.is_empty() && alias != "default" {
            return Err(BusError::remote(
                NOT_SUPPORTED,
                "GDBus.Error:org.freedesktop.DBus.Error.NotSupported: Only the 'default' alias is supported",
            ));
        }
        let label = properties
            .get(COLLECTION_LABEL_PROPERTY)
            .cloned()
            .unwrap_or_default();
        let name: String = label
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
            .collect();
        let action = Action::Create {
            name: name.clone(),
            label,
            alias: alias.to_string(),
        };
        if state.prompting == Prompting::Never {
            state.apply(action);
            return Ok((path::collection_path(&name), NO_OBJECT.to_string()));
        }
        let prompt = state.new_prompt(action);
        Ok((NO_OBJECT.to_string(), prompt))
    }

    async fn items(&self) -> BusResult<Vec<String>> {
        let state = self.bus.lock();
        let collection = state.collection(&self.path)?;
        Ok(collection
            .items
            .iter()
            .map(|i| path::item_path(&collection.name, &i.name))
            .collect())
    }

    async fn search_items(&self, attributes: &HashMap<String, String>) -> BusResult<Vec<String>> {
        let state = self.bus.lock();
        let collection = state.collection(&self.path)?;
        Ok(collection
            .items
            .iter()
            .filter(|i| attributes.iter().all(|(k, v)| i.attributes.get(k) == Some(v)))
            .map(|i| path::item_path(&collection.name, &i.name))
            .collect())
    }

    async fn delete(&self) -> BusResult<String> {
        let mut state = self.bus.lock();
        state.calls.push(format!("Delete {}", self.path));
        let name = state.collection(&self.path)?.name.clone();
        if state.prompting == Prompting::Never {
            state.apply(Action::Delete { name });
            return Ok(NO_OBJECT.to_string());
        }
        Ok(state.new_prompt(Action::Delete { name }))
    }

    async fn label(&self, interface: &'static str) -> BusResult<String> {
        let state = self.bus.lock();
        if interface == ITEM_INTERFACE {
            return Ok(format!("item {}", state.item(&self.path)?.name));
        }
        Ok(state.collection(&self.path)?.label.clone())
    }

    async fn attributes(&self) -> BusResult<HashMap<String, String>> {
        let state = self.bus.lock();
        Ok(state.item(&self.path)?.attributes.clone())
    }

    async fn prompt(&self, window_id: &str) -> BusResult<()> {
        let mut state = self.bus.lock();
        state.calls.push(format!("Prompt {} {window_id}", self.path));
        let prompt = state
            .prompts
            .remove(&self.path)
            .ok_or_else(|| no_such_object(&self.path))?;
        match prompt.behavior.clone() {
            PromptBehavior::Complete(result) => {
                if let Some(action) = prompt.action {
                    state.apply(action);
                }
                state.emit(
                    &self.path,
                    Completed {
                        dismissed: false,
                        result,
                    },
                );
            }
            PromptBehavior::Dismiss => state.emit(
                &self.path,
                Completed {
                    dismissed: true,
                    result: PromptResult::Empty,
                },
            ),
            PromptBehavior::Hang => {
                state.prompts.insert(self.path.clone(), prompt);
            }
            PromptBehavior::Vanish => {
                state.listeners.remove(&self.path);
            }
        }
        Ok(())
    }

    async fn dismiss(&self) -> BusResult<()> {
        let mut state = self.bus.lock();
        state.calls.push(format!("Dismiss {}", self.path));
        state
            .prompts
            .remove(&self.path)
            .ok_or_else(|| no_such_object(&self.path))?;
        state.emit(
            &self.path,
            Completed {
                dismissed: true,
                result: PromptResult::Empty,
            },
        );
        Ok(())
    }

    async fn subscribe_completed(&self) -> BusResult<Subscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut state = self.bus.lock();
            state.listeners.entry(self.path.clone()).or_default().push(tx);
            state.live_subscriptions += 1;
        }
        let guard = LiveGuard(self.bus.clone());
        let signals = futures_util::stream::unfold((rx, guard), |(mut rx, guard)| async move {
            rx.recv().await.map(|next| (next, (rx, guard)))
        });
        Ok(Subscription::new(self.path.clone(), signals))
    }

    async fn introspect(&self) -> BusResult<String> {
        let state = self.bus.lock();
        let interface = if self.path == SERVICE_PATH {
            "org.freedesktop.Secret.Service"
        } else if state.collection(&self.path).is_ok() {
            "org.freedesktop.Secret.Collection"
        } else if state.item(&self.path).is_ok() {
            ITEM_INTERFACE
        } else {
            return Err(no_such_object(&self.path));
        };
        Ok(format!(
            "<node><interface name=\"{interface}\"></interface></node>"
        ))
    }
}
