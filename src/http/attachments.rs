use std::any::Any;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

type Attachment = Arc<dyn Any + Send + Sync>;

/// String-keyed values that handlers hang off a connection or an exchange.
///
/// Backed by a `DashMap` whose default hasher is seeded per process.
#[derive(Default)]
pub struct Attachments {
    map: DashMap<String, Attachment>,
}

impl Attachments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value under `name` if present and of type `T`.
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        let value = self.map.get(name)?.value().clone();
        value.downcast::<T>().ok()
    }

    /// Stores `value`, returning whether a previous value was replaced.
    pub fn put<T: Any + Send + Sync>(&self, name: impl Into<String>, value: T) -> bool {
        self.map.insert(name.into(), Arc::new(value)).is_some()
    }

    /// Stores `value` only when `name` is vacant; returns whether it was stored.
    pub fn put_if_absent<T: Any + Send + Sync>(&self, name: impl Into<String>, value: T) -> bool {
        match self.map.entry(name.into()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(value));
                true
            }
        }
    }

    /// Replaces an existing value; does nothing when `name` is vacant.
    pub fn replace<T: Any + Send + Sync>(&self, name: &str, value: T) -> bool {
        match self.map.get_mut(name) {
            Some(mut slot) => {
                *slot = Arc::new(value) as Attachment;
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, name: &str) -> bool {
        self.map.remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }
}

impl std::fmt::Debug for Attachments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attachments")
            .field("len", &self.map.len())
            .finish()
    }
}
