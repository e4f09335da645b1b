//! Resolution of service-relative paths into remote object handles.

use std::sync::Arc;

use sesame_core::{Result, path};
use tracing::debug;

use crate::bus::{Bus, RemoteObject};

/// Handle on `/org/freedesktop/secrets[/subpath]`; the root service object
/// when `subpath` is `None`.
///
/// Every call yields a fresh handle. Whether the object exists is only
/// learned when a call on it fails with a lookup error.
pub async fn proxy(bus: &dyn Bus, subpath: Option<&str>) -> Result<Arc<dyn RemoteObject>> {
    let path = path::absolute(subpath);
    debug!(path = %path, "resolving proxy");
    Ok(bus.object(&path).await?)
}
