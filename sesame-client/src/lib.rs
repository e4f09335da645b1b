pub mod bus;
pub mod collection;
pub mod dbus;
pub mod item;
pub mod prompt;
pub mod proxy;
pub mod registry;
pub mod rpc;
pub mod service;

#[cfg(any(test, feature = "test-util"))]
pub mod fake;

pub use bus::{Bus, Completed, PromptResult, RemoteObject, Subscription};
pub use collection::Collection;
pub use item::Item;
pub use registry::Registry;
pub use service::SecretService;
