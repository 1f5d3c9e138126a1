//! A namespaced key/value cache.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;

/// Raw string storage.
pub trait Store: Send {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: String);
    fn remove(&mut self, key: &str);
    fn keys(&self) -> Vec<String>;
}

#[derive(Debug, Default)]
pub struct MemoryStore(BTreeMap<String, String>);

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.0.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) {
        self.0.insert(key.to_string(), value);
    }

    fn remove(&mut self, key: &str) {
        self.0.remove(key);
    }

    fn keys(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }
}

/// Values are stored JSON-encoded under `<prefix>-<kind>-<name>`.
pub struct Storage {
    prefix: String,
    store: Box<dyn Store>,
}

impl core::fmt::Debug for Storage {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("Storage").field("prefix", &self.prefix).finish()
    }
}

impl Storage {
    pub fn new<S: 'static + Store>(prefix: &str, store: S) -> Storage {
        Storage {
            prefix: prefix.to_string(),
            store: Box::new(store),
        }
    }

    fn key(&self, kind: &str, name: &str) -> String {
        format!("{}-{}-{}", self.prefix, kind, name)
    }

    /// Returns `Ok(None)` for missing keys; undecodable values are `Error::Format`.
    pub fn get<T: DeserializeOwned>(&self, kind: &str, name: &str) -> Result<Option<T>> {
        let key = self.key(kind, name);
        match self.store.get(&key) {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|err| Error::format(key.as_str(), err)),
            None => Ok(None),
        }
    }

    pub fn set<T: Serialize>(&mut self, kind: &str, name: &str, value: &T) -> Result<()> {
        let key = self.key(kind, name);
        let raw = serde_json::to_string(value).map_err(|err| Error::format(key.clone(), err))?;
        self.store.set(&key, raw);
        Ok(())
    }

    pub fn remove(&mut self, kind: &str, name: &str) {
        let key = self.key(kind, name);
        self.store.remove(&key);
    }

    /// Removes everything under this prefix, or only one kind.
    pub fn clear(&mut self, kind: Option<&str>) {
        let prefix = match kind {
            Some(kind) => format!("{}-{}-", self.prefix, kind),
            None => format!("{}-", self.prefix),
        };
        for key in self.store.keys() {
            if key.starts_with(&prefix) {
                self.store.remove(&key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn values_round_trip_per_kind() {
        let mut storage = Storage::new("app", MemoryStore::new());
        storage.set("state", "list", &json!({ "page": 2 })).unwrap();
        storage.set("cache", "list", &"x").unwrap();

        assert_eq!(
            storage.get::<Value>("state", "list").unwrap(),
            Some(json!({ "page": 2 }))
        );
        assert_eq!(storage.get::<String>("cache", "list").unwrap().as_deref(), Some("x"));
        assert_eq!(storage.get::<Value>("state", "missing").unwrap(), None);

        storage.clear(Some("state"));
        assert_eq!(storage.get::<Value>("state", "list").unwrap(), None);
        assert!(storage.get::<String>("cache", "list").unwrap().is_some());

        storage.remove("cache", "list");
        assert_eq!(storage.get::<String>("cache", "list").unwrap(), None);
    }

    #[test]
    fn undecodable_values_are_format_errors() {
        let mut store = MemoryStore::new();
        store.set("app-state-x", "{".into());
        let storage = Storage::new("app", store);
        assert!(matches!(
            storage.get::<Value>("state", "x"),
            Err(Error::Format { .. })
        ));
    }
}
