//! In-memory storage, for tests and hosts without a persistence layer.

use std::collections::HashMap;

use serde_json::Value;

use crate::adapter::Storage;
use crate::error::StoreError;

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Storage for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Value) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn has(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.entries.contains_key(key))
    }

    fn append(&mut self, list_key: &str, value: Value) -> Result<(), StoreError> {
        let entry = self
            .entries
            .entry(list_key.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        match entry {
            Value::Array(items) => {
                items.push(value);
                Ok(())
            }
            _ => Err(StoreError::Backend(format!(
                "Key {list_key} holds a non-list value"
            ))),
        }
    }
}
