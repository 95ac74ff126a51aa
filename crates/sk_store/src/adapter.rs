//! The storage capability the engine consumes.
//!
//! Hosts provide the backend (IndexedDB, SQLite, a server KV, anything);
//! the engine only needs four operations. Values are opaque JSON;
//! `append` must preserve insertion order. Nothing here is assumed
//! transactional: the engine orders its writes so that partial
//! application stays recoverable.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::StoreError;

pub trait Storage {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
    fn set(&mut self, key: &str, value: Value) -> Result<(), StoreError>;
    fn has(&self, key: &str) -> Result<bool, StoreError>;
    /// Append to the list at `list_key`, creating it when absent.
    fn append(&mut self, list_key: &str, value: Value) -> Result<(), StoreError>;

    // ── Typed helpers ────────────────────────────────────────────────────────

    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError>
    where
        Self: Sized,
    {
        match self.get(key)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    fn set_json<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), StoreError>
    where
        Self: Sized,
    {
        let value = serde_json::to_value(value)?;
        self.set(key, value)
    }

    fn append_json<T: Serialize>(&mut self, list_key: &str, value: &T) -> Result<(), StoreError>
    where
        Self: Sized,
    {
        let value = serde_json::to_value(value)?;
        self.append(list_key, value)
    }

    /// The list at `list_key`, or empty when absent.
    fn get_list<T: DeserializeOwned>(&self, list_key: &str) -> Result<Vec<T>, StoreError>
    where
        Self: Sized,
    {
        match self.get(list_key)? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(Vec::new()),
        }
    }
}
