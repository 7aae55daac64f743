//! In-process store backend

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::{ConfigStore, StoreError, StoreResult};

#[derive(Debug, Clone)]
enum Slot {
    Value(Vec<u8>),
    Hash(BTreeMap<String, Vec<u8>>),
}

/// Store held entirely in memory.
///
/// Every operation takes one lock, so each call is atomic with respect to
/// the others. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slots: Mutex<HashMap<String, Slot>>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of top-level keys, plain or hash
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if the store holds nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn plain<'a>(slots: &'a HashMap<String, Slot>, key: &str) -> StoreResult<Option<&'a Vec<u8>>> {
    match slots.get(key) {
        None => Ok(None),
        Some(Slot::Value(v)) => Ok(Some(v)),
        Some(Slot::Hash(_)) => Err(StoreError::WrongType(key.to_string())),
    }
}

fn hash<'a>(
    slots: &'a HashMap<String, Slot>,
    key: &str,
) -> StoreResult<Option<&'a BTreeMap<String, Vec<u8>>>> {
    match slots.get(key) {
        None => Ok(None),
        Some(Slot::Hash(h)) => Ok(Some(h)),
        Some(Slot::Value(_)) => Err(StoreError::WrongType(key.to_string())),
    }
}

fn hash_mut<'a>(
    slots: &'a mut HashMap<String, Slot>,
    key: &str,
) -> StoreResult<&'a mut BTreeMap<String, Vec<u8>>> {
    match slots
        .entry(key.to_string())
        .or_insert_with(|| Slot::Hash(BTreeMap::new()))
    {
        Slot::Hash(h) => Ok(h),
        Slot::Value(_) => Err(StoreError::WrongType(key.to_string())),
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let slots = self.lock();
        Ok(plain(&slots, key)?.cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> StoreResult<()> {
        let mut slots = self.lock();
        plain(&slots, key)?;
        slots.insert(key.to_string(), Slot::Value(value));
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        Ok(self.lock().remove(key).is_some())
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: Option<Vec<u8>>,
    ) -> StoreResult<bool> {
        let mut slots = self.lock();
        let current = plain(&slots, key)?.map(Vec::as_slice);
        if current != expected {
            return Ok(false);
        }
        match new {
            Some(value) => {
                slots.insert(key.to_string(), Slot::Value(value));
            }
            None => {
                slots.remove(key);
            }
        }
        Ok(true)
    }

    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<Vec<u8>>> {
        let slots = self.lock();
        Ok(hash(&slots, key)?.and_then(|h| h.get(field).cloned()))
    }

    async fn hset(&self, key: &str, field: &str, value: Vec<u8>) -> StoreResult<()> {
        let mut slots = self.lock();
        hash_mut(&mut slots, key)?.insert(field.to_string(), value);
        Ok(())
    }

    async fn hset_if_absent(&self, key: &str, field: &str, value: Vec<u8>) -> StoreResult<bool> {
        let mut slots = self.lock();
        let h = hash_mut(&mut slots, key)?;
        if h.contains_key(field) {
            return Ok(false);
        }
        h.insert(field.to_string(), value);
        Ok(true)
    }

    async fn hdel(&self, key: &str, field: &str) -> StoreResult<bool> {
        let mut slots = self.lock();
        let (removed, emptied) = match slots.get_mut(key) {
            None => return Ok(false),
            Some(Slot::Value(_)) => return Err(StoreError::WrongType(key.to_string())),
            Some(Slot::Hash(h)) => (h.remove(field).is_some(), h.is_empty()),
        };
        if emptied {
            slots.remove(key);
        }
        Ok(removed)
    }

    async fn hkeys(&self, key: &str) -> StoreResult<Vec<String>> {
        let slots = self.lock();
        Ok(hash(&slots, key)?
            .map(|h| h.keys().cloned().collect())
            .unwrap_or_default())
    }
}
