use std::collections::HashMap;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeaderError {
    #[error("header map is locked")]
    Locked,
}

/// One distinct header name and every value received for it, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
struct HeaderEntry {
    /// Name as first supplied, original casing preserved.
    name: String,
    values: Vec<String>,
}

/// Case-insensitive, order-preserving multimap of header names to values.
///
/// Lookups canonicalize the name to lower case; iteration yields distinct
/// names in the order they were first inserted. Once [`HeaderMap::lock`] is
/// called every mutating operation returns [`HeaderError::Locked`].
///
/// The name index is a std `HashMap`, whose hasher is seeded per process, so
/// a client choosing colliding header names cannot degrade lookups.
#[derive(Debug, Clone, Default)]
pub struct HeaderMap {
    entries: Vec<HeaderEntry>,
    index: HashMap<String, usize>,
    locked: bool,
}

fn canonical(name: &str) -> String {
    name.to_ascii_lowercase()
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct header names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, name: &str) -> Option<&HeaderEntry> {
        self.index.get(&canonical(name)).map(|&i| &self.entries[i])
    }

    pub fn get_first(&self, name: &str) -> Option<&str> {
        self.entry(name)
            .and_then(|e| e.values.first())
            .map(String::as_str)
    }

    pub fn get_last(&self, name: &str) -> Option<&str> {
        self.entry(name)
            .and_then(|e| e.values.last())
            .map(String::as_str)
    }

    /// All values for `name` in arrival order; empty when absent.
    pub fn get_all(&self, name: &str) -> &[String] {
        self.entry(name).map(|e| e.values.as_slice()).unwrap_or(&[])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entry(name).is_some_and(|e| !e.values.is_empty())
    }

    fn check_unlocked(&self) -> Result<(), HeaderError> {
        if self.locked {
            Err(HeaderError::Locked)
        } else {
            Ok(())
        }
    }

    fn append(&mut self, name: &str, values: impl IntoIterator<Item = String>) {
        let key = canonical(name);
        match self.index.get(&key) {
            Some(&i) => self.entries[i].values.extend(values),
            None => {
                self.index.insert(key, self.entries.len());
                self.entries.push(HeaderEntry {
                    name: name.to_string(),
                    values: values.into_iter().collect(),
                });
            }
        }
    }

    fn replace(&mut self, name: &str, values: Vec<String>) {
        let key = canonical(name);
        let entry = HeaderEntry {
            name: name.to_string(),
            values,
        };
        match self.index.get(&key) {
            Some(&i) => self.entries[i] = entry,
            None => {
                self.index.insert(key, self.entries.len());
                self.entries.push(entry);
            }
        }
    }

    /// Appends a value, creating the entry if it is absent.
    pub fn add(&mut self, name: &str, value: impl Into<String>) -> Result<(), HeaderError> {
        self.check_unlocked()?;
        self.append(name, std::iter::once(value.into()));
        Ok(())
    }

    /// Appends several values for one name.
    pub fn add_values<I, V>(&mut self, name: &str, values: I) -> Result<(), HeaderError>
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.check_unlocked()?;
        self.append(name, values.into_iter().map(Into::into));
        Ok(())
    }

    /// Merges every entry of `other`, appending values for names already present.
    pub fn add_all(&mut self, other: &HeaderMap) -> Result<(), HeaderError> {
        self.check_unlocked()?;
        for entry in &other.entries {
            self.append(&entry.name, entry.values.iter().cloned());
        }
        Ok(())
    }

    /// Replaces every value for `name` with a single value.
    pub fn put(&mut self, name: &str, value: impl Into<String>) -> Result<(), HeaderError> {
        self.check_unlocked()?;
        self.replace(name, vec![value.into()]);
        Ok(())
    }

    /// Replaces every value for `name`.
    pub fn put_all<I, V>(&mut self, name: &str, values: I) -> Result<(), HeaderError>
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.check_unlocked()?;
        self.replace(name, values.into_iter().map(Into::into).collect());
        Ok(())
    }

    /// Removes `name`, returning the values it held.
    pub fn remove(&mut self, name: &str) -> Result<Option<Vec<String>>, HeaderError> {
        self.check_unlocked()?;
        let Some(pos) = self.index.remove(&canonical(name)) else {
            return Ok(None);
        };
        let removed = self.entries.remove(pos);
        for i in self.index.values_mut() {
            if *i > pos {
                *i -= 1;
            }
        }
        Ok(Some(removed.values))
    }

    /// Makes the map read-only. Idempotent.
    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Distinct header names in insertion order, original casing.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    /// `(name, values)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|e| (e.name.as_str(), e.values.as_slice()))
    }

    /// True when any comma-separated element of any value of `name` equals
    /// `token`, ignoring ASCII case.
    pub fn contains_token(&self, name: &str, token: &str) -> bool {
        self.get_all(name)
            .iter()
            .flat_map(|v| v.split(','))
            .any(|t| t.trim().eq_ignore_ascii_case(token))
    }
}
