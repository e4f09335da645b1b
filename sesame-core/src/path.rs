//! Conversion between Secret Service object paths and collection/item names.
//!
//! Every domain object lives under `/org/freedesktop/secrets/`. Collections
//! are at `collection/<name>` and items at `collection/<name>/<item>`. Names
//! are used as-is: the service already hands out escaped path segments, so
//! encoding is plain concatenation.

use crate::{Error, Result, SERVICE_PATH};

const COLLECTION_SUBPATH: &str = "collection/";

/// Absolute object path for `subpath` under the service root. `None` is the
/// root service object itself.
pub fn absolute(subpath: Option<&str>) -> String {
    match subpath {
        Some(sub) if !sub.is_empty() => format!("{SERVICE_PATH}/{sub}"),
        _ => SERVICE_PATH.to_string(),
    }
}

/// Strip `/org/freedesktop/secrets/<subpath>` from the front of `path`.
pub fn strip_prefix<'a>(subpath: &str, path: &'a str) -> Result<&'a str> {
    path.strip_prefix(SERVICE_PATH)
        .and_then(|rest| rest.strip_prefix('/'))
        .and_then(|rest| rest.strip_prefix(subpath))
        .ok_or_else(|| Error::BadObjectPath(path.to_string()))
}

pub fn collection_name_from_path(path: &str) -> Result<&str> {
    strip_prefix(COLLECTION_SUBPATH, path)
}

/// Split an item path into `(collection name, item name)`.
pub fn item_key_from_path(path: &str) -> Result<(&str, &str)> {
    strip_prefix(COLLECTION_SUBPATH, path)?
        .split_once('/')
        .ok_or_else(|| Error::BadObjectPath(path.to_string()))
}

/// Subpath of a collection, relative to the service root.
pub fn collection_subpath(name: &str) -> String {
    format!("{COLLECTION_SUBPATH}{name}")
}

pub fn item_subpath(collection: &str, name: &str) -> String {
    format!("{COLLECTION_SUBPATH}{collection}/{name}")
}

pub fn collection_path(name: &str) -> String {
    absolute(Some(&collection_subpath(name)))
}

pub fn item_path(collection: &str, name: &str) -> String {
    absolute(Some(&item_subpath(collection, name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_collection_names() {
        for name in ["login", "session", "default", "_30", "a_b_c"] {
            let path = collection_path(name);
            assert_eq!(collection_name_from_path(&path).unwrap(), name);
        }
        assert_eq!(
            collection_name_from_path("/org/freedesktop/secrets/collection/login").unwrap(),
            "login"
        );
    }

    #[test]
    fn parses_item_keys() {
        let (collection, item) =
            item_key_from_path("/org/freedesktop/secrets/collection/login/870").unwrap();
        assert_eq!((collection, item), ("login", "870"));
        assert_eq!(
            item_key_from_path(&item_path("session", "1")).unwrap(),
            ("session", "1")
        );
    }

    #[test]
    fn item_split_is_on_first_slash() {
        let (collection, item) =
            item_key_from_path("/org/freedesktop/secrets/collection/login/a/b").unwrap();
        assert_eq!((collection, item), ("login", "a/b"));
    }

    #[test]
    fn rejects_foreign_prefixes() {
        for path in [
            "/",
            "",
            "/org/freedesktop/secrets",
            "/org/freedesktop/secrets/aliases/default",
            "/org/freedesktop/secretsX/collection/login",
            "/org/gnome/keyring/collection/login",
            "org/freedesktop/secrets/collection/login",
        ] {
            match collection_name_from_path(path) {
                Err(Error::BadObjectPath(p)) => assert_eq!(p, path),
                other => panic!("expected BadObjectPath for {path:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn item_path_needs_a_separator() {
        match item_key_from_path("/org/freedesktop/secrets/collection/login") {
            Err(Error::BadObjectPath(_)) => {}
            other => panic!("expected BadObjectPath, got {other:?}"),
        }
    }

    #[test]
    fn absolute_paths() {
        assert_eq!(absolute(None), "/org/freedesktop/secrets");
        assert_eq!(absolute(Some("")), "/org/freedesktop/secrets");
        assert_eq!(
            absolute(Some("collection/login")),
            "/org/freedesktop/secrets/collection/login"
        );
    }
}
