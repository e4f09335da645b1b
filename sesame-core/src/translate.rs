//! Translation of anticipated D-Bus errors into domain errors.
//!
//! Call sites opt in to the conditions they expect with [`expect`], wrapping
//! only the single call that may raise them. Anything not listed passes
//! through as [`Error::Bus`] untouched.

use crate::{BusError, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    /// The service refused an operation it does not implement, e.g.
    /// gnome-keyring's "Only the 'default' alias is supported".
    NotSupported,
    /// The addressed object does not exist.
    NoSuchObject,
}

struct Rule {
    condition: Condition,
    names: &'static [&'static str],
}

const RULES: &[Rule] = &[
    Rule {
        condition: Condition::NotSupported,
        names: &["org.freedesktop.DBus.Error.NotSupported"],
    },
    Rule {
        condition: Condition::NoSuchObject,
        names: &[
            "org.freedesktop.DBus.Error.UnknownObject",
            "org.freedesktop.DBus.Error.UnknownMethod",
            "org.freedesktop.DBus.Error.UnknownInterface",
            "org.freedesktop.Secret.Error.NoSuchObject",
        ],
    },
];

impl Condition {
    pub fn matches(self, err: &BusError) -> bool {
        let Some(name) = err.name() else {
            return false;
        };
        RULES
            .iter()
            .filter(|rule| rule.condition == self)
            .any(|rule| rule.names.contains(&name))
    }

    fn translate(self, err: BusError, subject: &str) -> Error {
        match self {
            Self::NotSupported => match err {
                BusError::Remote { message, .. } => {
                    Error::Server(strip_remote_framing(&message).to_string())
                }
                other => Error::Bus(other),
            },
            Self::NoSuchObject => Error::NotFound(subject.to_string()),
        }
    }
}

/// Map `result`'s error through the first matching condition. `subject`
/// names the object the call addressed, for `NotFound` messages.
pub fn expect<T>(
    result: std::result::Result<T, BusError>,
    conditions: &[Condition],
    subject: &str,
) -> Result<T> {
    result.map_err(|err| match conditions.iter().find(|c| c.matches(&err)) {
        Some(condition) => {
            tracing::debug!(?condition, error = %err, "translated expected bus error");
            condition.translate(err, subject)
        }
        None => Error::Bus(err),
    })
}

/// Remove the `<prefix>:<error name>: ` framing some bindings prepend to
/// remote error messages, e.g.
/// `GDBus.Error:org.freedesktop.DBus.Error.NotSupported: Only the 'default' alias is supported`.
pub fn strip_remote_framing(message: &str) -> &str {
    let Some((head, rest)) = message.split_once(':') else {
        return message;
    };
    if head.contains(char::is_whitespace) {
        return message;
    }
    match rest.split_once(": ") {
        Some((name, body)) if !name.is_empty() && !name.contains(char::is_whitespace) => body,
        _ => message,
    }
}
