//! Call-then-await-signal against a single object path.
//!
//! Some Secret Service calls return immediately and report their outcome
//! later as a signal on the same object (`Prompt.Prompt` → `Completed`). The
//! subscription has to exist before the call is made, otherwise a fast
//! service can emit the signal before anyone is listening.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use sesame_core::{BusError, Error, Result};
use tracing::debug;

use crate::bus::{Bus, Completed, RemoteObject};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcState {
    Idle,
    Subscribed,
    Waiting,
    Completed,
}

/// Subscribe to `Completed` on `path`, run `invoke` against the object, then
/// wait for exactly one delivery.
///
/// The subscription is released on every exit path: when `invoke` fails,
/// when the wait times out, when the returned future is dropped, and after
/// the signal has been consumed. `timeout` of `None` waits indefinitely.
pub async fn call_and_wait<F, Fut>(
    bus: &dyn Bus,
    path: &str,
    timeout: Option<Duration>,
    invoke: F,
) -> Result<Completed>
where
    F: FnOnce(Arc<dyn RemoteObject>) -> Fut,
    Fut: Future<Output = Result<(), BusError>>,
{
    let mut state = RpcState::Idle;
    let object = bus.object(path).await?;

    let mut subscription = object.subscribe_completed().await?;
    transition(&mut state, RpcState::Subscribed, path);

    invoke(Arc::clone(&object)).await?;
    transition(&mut state, RpcState::Waiting, path);

    let delivery = match timeout {
        Some(after) => tokio::time::timeout(after, subscription.next())
            .await
            .map_err(|_| Error::Timeout {
                after,
                path: path.to_string(),
            })?,
        None => subscription.next().await,
    };
    drop(subscription);

    let completed = delivery.ok_or_else(|| Error::SignalLost(path.to_string()))??;
    transition(&mut state, RpcState::Completed, path);
    Ok(completed)
}

fn transition(state: &mut RpcState, next: RpcState, path: &str) {
    debug!(path, from = ?*state, to = ?next, "signal wait");
    *state = next;
}
