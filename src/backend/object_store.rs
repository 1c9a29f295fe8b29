//! Object-store backend over S3-like clients
//!
//! Object stores have no directories. A directory is either an explicit
//! zero-byte marker object whose key ends in `/`, or implied by any object
//! stored under its prefix. Leading `/` in paths is ignored so the same
//! configured base path works for local and remote targets.

use super::{Backend, SEPARATOR};
use crate::{Error, Result};
use std::collections::BTreeSet;

/// One connection to an object store.
///
/// Sessions are opened per backend operation and dropped when it returns.
pub trait ObjectSession {
    /// Size of the object at `key`.
    ///
    /// # Errors
    /// Returns `NotFound` if no object has that exact key
    fn head(&self, key: &str) -> Result<u64>;

    /// Whole content of the object at `key`.
    ///
    /// # Errors
    /// Returns `NotFound` if no object has that exact key
    fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Store an object, replacing any previous one.
    ///
    /// # Errors
    /// Returns error if the store rejects the write
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Remove the object at `key`.
    ///
    /// # Errors
    /// Returns `NotFound` if no object has that exact key
    fn delete(&self, key: &str) -> Result<()>;

    /// Every key starting with `prefix`, sorted.
    ///
    /// # Errors
    /// Returns error if the listing fails
    fn list_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Factory of sessions against one bucket (or equivalent namespace).
pub trait ObjectClient: Send + Sync {
    /// Open a session.
    ///
    /// # Errors
    /// Returns error if the store cannot be reached
    fn connect(&self) -> Result<Box<dyn ObjectSession + '_>>;
}

impl<T: ObjectClient + ?Sized> ObjectClient for std::sync::Arc<T> {
    fn connect(&self) -> Result<Box<dyn ObjectSession + '_>> {
        (**self).connect()
    }
}

/// [`Backend`] on top of an [`ObjectClient`].
#[derive(Debug, Clone)]
pub struct ObjectStoreBackend<C> {
    client: C,
}

impl<C: ObjectClient> ObjectStoreBackend<C> {
    /// Wrap a client
    #[must_use]
    pub const fn new(client: C) -> Self {
        Self { client }
    }

    /// Underlying client
    #[must_use]
    pub const fn client(&self) -> &C {
        &self.client
    }
}

fn key(path: &str) -> &str {
    path.trim_start_matches(SEPARATOR)
        .trim_end_matches(SEPARATOR)
}

fn dir_prefix(key: &str) -> String {
    if key.is_empty() {
        String::new()
    } else {
        format!("{key}{SEPARATOR}")
    }
}

fn found(result: Result<u64>) -> Result<bool> {
    match result {
        Ok(_) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}

fn is_dir_in(session: &dyn ObjectSession, key: &str) -> Result<bool> {
    if key.is_empty() {
        return Ok(true);
    }
    let prefix = dir_prefix(key);
    if found(session.head(&prefix))? {
        return Ok(true);
    }
    Ok(!session.list_prefix(&prefix)?.is_empty())
}

impl<C: ObjectClient> Backend for ObjectStoreBackend<C> {
    fn name(&self) -> &'static str {
        "object-store"
    }

    fn exists(&self, path: &str) -> Result<bool> {
        let key = key(path);
        let session = self.client.connect()?;
        if !key.is_empty() && found(session.head(key))? {
            return Ok(true);
        }
        is_dir_in(session.as_ref(), key)
    }

    fn list(&self, path: &str, recursive: bool) -> Result<Vec<String>> {
        let key = key(path);
        let prefix = dir_prefix(key);
        let session = self.client.connect()?;
        if !is_dir_in(session.as_ref(), key)? {
            return Err(Error::NotFound(path.to_string()));
        }

        let mut entries = BTreeSet::new();
        for object in session.list_prefix(&prefix)? {
            let Some(relative) = object.strip_prefix(&prefix) else {
                continue;
            };
            let relative = relative.trim_end_matches(SEPARATOR);
            if relative.is_empty() {
                continue;
            }
            if recursive {
                for (i, _) in relative.match_indices(SEPARATOR) {
                    entries.insert(format!("{prefix}{}", &relative[..i]));
                }
                entries.insert(format!("{prefix}{relative}"));
            } else {
                let child = relative.split(SEPARATOR).next().unwrap_or(relative);
                entries.insert(format!("{prefix}{child}"));
            }
        }
        Ok(entries.into_iter().collect())
    }

    fn mkdir(&self, path: &str) -> Result<()> {
        let key = key(path);
        if key.is_empty() {
            return Ok(());
        }
        self.client.connect()?.put(&dir_prefix(key), &[])
    }

    fn delete(&self, path: &str) -> Result<()> {
        let key = key(path);
        let session = self.client.connect()?;
        if !key.is_empty() && found(session.head(key))? {
            return session.delete(key);
        }

        let prefix = dir_prefix(key);
        let children = session
            .list_prefix(&prefix)?
            .into_iter()
            .filter(|k| *k != prefix)
            .count();
        if children > 0 {
            return Err(Error::Backend(format!(
                "delete {path}: directory not empty"
            )));
        }
        if found(session.head(&prefix))? {
            return session.delete(&prefix);
        }
        Err(Error::NotFound(path.to_string()))
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        let session = self.client.connect()?;
        session.get(key(path)).map_err(|e| match e {
            Error::NotFound(_) => Error::NotFound(path.to_string()),
            other => other,
        })
    }

    fn write(&self, path: &str, bytes: &[u8]) -> Result<()> {
        self.client.connect()?.put(key(path), bytes)
    }

    fn is_directory(&self, path: &str) -> Result<bool> {
        let session = self.client.connect()?;
        is_dir_in(session.as_ref(), key(path))
    }
}
