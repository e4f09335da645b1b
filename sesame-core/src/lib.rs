pub mod config;
pub mod path;
pub mod translate;
pub mod window;

use std::time::Duration;

pub use config::Config;
pub use window::WindowIdProvider;

/// Well-known bus name of the Secret Service.
pub const SERVICE_NAME: &str = "org.freedesktop.secrets";

/// Object path of the root `org.freedesktop.Secret.Service` object.
pub const SERVICE_PATH: &str = "/org/freedesktop/secrets";

pub const SERVICE_INTERFACE: &str = "org.freedesktop.Secret.Service";
pub const COLLECTION_INTERFACE: &str = "org.freedesktop.Secret.Collection";
pub const ITEM_INTERFACE: &str = "org.freedesktop.Secret.Item";
pub const PROMPT_INTERFACE: &str = "org.freedesktop.Secret.Prompt";

/// Property key used when creating a collection.
pub const COLLECTION_LABEL_PROPERTY: &str = "org.freedesktop.Secret.Collection.Label";

/// The path a service returns in place of a real object path when there is
/// nothing there: no collection behind an alias, or no prompt required.
pub const NO_OBJECT: &str = "/";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A failure reported by the bus transport.
///
/// Remote errors keep the D-Bus error name (which identifies both the error
/// domain and the specific code) alongside the human-readable message, so the
/// [`translate`] table can match on it.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("{name}: {message}")]
    Remote { name: String, message: String },
    #[error("D-Bus transport error: {0}")]
    Transport(String),
}

impl BusError {
    pub fn remote(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            name: name.into(),
            message: message.into(),
        }
    }

    /// The D-Bus error name, for remote errors.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Remote { name, .. } => Some(name),
            Self::Transport(_) => None,
        }
    }

    /// True when the service reported that the addressed object (or the
    /// interface on it) does not exist.
    pub fn is_lookup_failure(&self) -> bool {
        translate::Condition::NoSuchObject.matches(self)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A bus path did not have the shape this client expects.
    #[error("unexpected path: {0}")]
    BadObjectPath(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("prompt dismissed")]
    PromptDismissed,
    /// A server-side condition the caller anticipated, with the remote
    /// framing stripped from the message.
    #[error("{0}")]
    Server(String),
    #[error(
        "couldn't get active window ID to invoke prompt: {0} \
         (on non-X systems set prompt.window_id in the config file)"
    )]
    WindowId(String),
    #[error("timed out after {}s waiting for a signal from {path}", after.as_secs())]
    Timeout { after: Duration, path: String },
    #[error("signal subscription on {0} ended before a signal arrived")]
    SignalLost(String),
    #[error(transparent)]
    Bus(#[from] BusError),
}

impl Error {
    /// Conditions the CLI reports as a one-line message rather than a full
    /// error chain.
    pub fn is_domain(&self) -> bool {
        !matches!(self, Self::Bus(_) | Self::BadObjectPath(_) | Self::SignalLost(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
