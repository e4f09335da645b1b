//! zbus implementation of the [`Bus`] contract.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::StreamExt;
use sesame_core::{
    BusError, COLLECTION_INTERFACE, ITEM_INTERFACE, PROMPT_INTERFACE, SERVICE_INTERFACE,
    SERVICE_NAME,
};
use tracing::debug;
use zbus::{Connection, DBusError};
use zvariant::{OwnedObjectPath, OwnedValue, Value};

use crate::bus::{Bus, BusResult, Completed, PromptResult, RemoteObject, Subscription};

const INTROSPECTABLE_INTERFACE: &str = "org.freedesktop.DBus.Introspectable";

/// Secret Service access over a zbus connection.
#[derive(Clone)]
pub struct DbusBus {
    conn: Connection,
}

impl DbusBus {
    /// Connect to `address`, or to the session bus when `None`.
    pub async fn connect(address: Option<&str>) -> BusResult<Self> {
        let conn = match address {
            Some(address) => {
                debug!(address, "connecting to configured bus");
                zbus::connection::Builder::address(address)
                    .map_err(map_zbus_error)?
                    .build()
                    .await
            }
            None => Connection::session().await,
        }
        .map_err(map_zbus_error)?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl Bus for DbusBus {
    async fn object(&self, path: &str) -> BusResult<Arc<dyn RemoteObject>> {
        Ok(Arc::new(DbusObject {
            conn: self.conn.clone(),
            path: path.to_string(),
        }))
    }
}

struct DbusObject {
    conn: Connection,
    path: String,
}

impl DbusObject {
    async fn proxy(&self, interface: &'static str) -> BusResult<zbus::Proxy<'static>> {
        zbus::Proxy::new(&self.conn, SERVICE_NAME, self.path.clone(), interface)
            .await
            .map_err(map_zbus_error)
    }
}

fn paths(paths: Vec<OwnedObjectPath>) -> Vec<String> {
    paths.into_iter().map(|p| p.as_str().to_string()).collect()
}

#[async_trait]
impl RemoteObject for DbusObject {
    fn path(&self) -> &str {
        &self.path
    }

    async fn collections(&self) -> BusResult<Vec<String>> {
        let proxy = self.proxy(SERVICE_INTERFACE).await?;
        let collections: Vec<OwnedObjectPath> = proxy
            .get_property("Collections")
            .await
            .map_err(map_zbus_error)?;
        Ok(paths(collections))
    }

    async fn read_alias(&self, alias: &str) -> BusResult<String> {
        let proxy = self.proxy(SERVICE_INTERFACE).await?;
        let path: OwnedObjectPath = proxy
            .call("ReadAlias", &(alias,))
            .await
            .map_err(map_zbus_error)?;
        Ok(path.as_str().to_string())
    }

    async fn create_collection(
        &self,
        properties: &HashMap<String, String>,
        alias: &str,
    ) -> BusResult<(String, String)> {
        let proxy = self.proxy(SERVICE_INTERFACE).await?;
        let props: HashMap<&str, Value<'_>> = properties
            .iter()
            .map(|(k, v)| (k.as_str(), Value::from(v.as_str())))
            .collect();
        let (collection, prompt): (OwnedObjectPath, OwnedObjectPath) = proxy
            .call("CreateCollection", &(props, alias))
            .await
            .map_err(map_zbus_error)?;
        Ok((collection.as_str().to_string(), prompt.as_str().to_string()))
    }

    async fn items(&self) -> BusResult<Vec<String>> {
        let proxy = self.proxy(COLLECTION_INTERFACE).await?;
        let items: Vec<OwnedObjectPath> =
            proxy.get_property("Items").await.map_err(map_zbus_error)?;
        Ok(paths(items))
    }

    async fn search_items(&self, attributes: &HashMap<String, String>) -> BusResult<Vec<String>> {
        let proxy = self.proxy(COLLECTION_INTERFACE).await?;
        let items: Vec<OwnedObjectPath> = proxy
            .call("SearchItems", &(attributes,))
            .await
            .map_err(map_zbus_error)?;
        Ok(paths(items))
    }

    async fn delete(&self) -> BusResult<String> {
        let proxy = self.proxy(COLLECTION_INTERFACE).await?;
        let prompt: OwnedObjectPath = proxy.call("Delete", &()).await.map_err(map_zbus_error)?;
        Ok(prompt.as_str().to_string())
    }

    async fn label(&self, interface: &'static str) -> BusResult<String> {
        let proxy = self.proxy(interface).await?;
        proxy.get_property("Label").await.map_err(map_zbus_error)
    }

    async fn attributes(&self) -> BusResult<HashMap<String, String>> {
        let proxy = self.proxy(ITEM_INTERFACE).await?;
        proxy.get_property("Attributes").await.map_err(map_zbus_error)
    }

    async fn prompt(&self, window_id: &str) -> BusResult<()> {
        let proxy = self.proxy(PROMPT_INTERFACE).await?;
        proxy
            .call::<_, _, ()>("Prompt", &(window_id,))
            .await
            .map_err(map_zbus_error)
    }

    async fn dismiss(&self) -> BusResult<()> {
        let proxy = self.proxy(PROMPT_INTERFACE).await?;
        proxy
            .call::<_, _, ()>("Dismiss", &())
            .await
            .map_err(map_zbus_error)
    }

    async fn subscribe_completed(&self) -> BusResult<Subscription> {
        let proxy = self.proxy(PROMPT_INTERFACE).await?;
        // The proxy's match rule pins sender (owner of SERVICE_NAME), path,
        // interface and member. It is removed when the stream is dropped.
        let stream = proxy
            .receive_signal("Completed")
            .await
            .map_err(map_zbus_error)?;
        let signals = stream.map(|msg| decode_completed(&msg));
        Ok(Subscription::new(self.path.clone(), signals))
    }

    async fn introspect(&self) -> BusResult<String> {
        let proxy = self.proxy(INTROSPECTABLE_INTERFACE).await?;
        proxy
            .call::<_, _, String>("Introspect", &())
            .await
            .map_err(map_zbus_error)
    }
}

fn decode_completed(msg: &zbus::message::Message) -> BusResult<Completed> {
    let body = msg.body();
    let (dismissed, result): (bool, OwnedValue) = body.deserialize().map_err(map_zbus_error)?;
    Ok(Completed {
        dismissed,
        result: prompt_result(&result),
    })
}

pub(crate) fn prompt_result(value: &Value<'_>) -> PromptResult {
    match value {
        Value::ObjectPath(path) => PromptResult::Path(path.as_str().to_string()),
        Value::Str(s) if s.as_str().is_empty() => PromptResult::Empty,
        Value::Str(s) => PromptResult::Text(s.as_str().to_string()),
        Value::Array(array) => PromptResult::Paths(
            array
                .iter()
                .filter_map(|v| match v {
                    Value::ObjectPath(path) => Some(path.as_str().to_string()),
                    Value::Str(s) => Some(s.as_str().to_string()),
                    _ => None,
                })
                .collect(),
        ),
        Value::Value(inner) => prompt_result(inner),
        other => PromptResult::Text(format!("{other:?}")),
    }
}

/// Flatten a zbus error into the transport-neutral form, keeping the D-Bus
/// error name for remote failures.
pub(crate) fn map_zbus_error(err: zbus::Error) -> BusError {
    match err {
        zbus::Error::MethodError(name, detail, _) => {
            BusError::remote(name.as_str(), detail.unwrap_or_default())
        }
        zbus::Error::FDO(fdo) => BusError::remote(
            fdo.name().as_str(),
            fdo.description().unwrap_or_default(),
        ),
        other => BusError::Transport(other.to_string()),
    }
}
