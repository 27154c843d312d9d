//! Secret records and the secret store abstraction.
//!
//! Secrets are never written to the process environment. A store returns
//! records, the records become a [`SecretSet`], and the set is handed to
//! whatever needs it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::{Error, Result};

/// Secret values shorter than this are not masked.
pub const MIN_MASKED_LENGTH: usize = 3;

/// Which application's secrets to load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultTarget {
    pub organization: String,
    pub project: String,
    pub app: String,
}

/// A single name/value pair returned by a secret store.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretRecord {
    pub name: String,
    pub value: String,
}

impl SecretRecord {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl fmt::Debug for SecretRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretRecord")
            .field("name", &self.name)
            .field("value", &"<redacted>")
            .finish()
    }
}

/// Named secret values available to a pipeline run.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SecretSet {
    entries: BTreeMap<String, String>,
}

impl SecretSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a secret, replacing any previous value with the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    /// Like [`get`](Self::get) but missing names are an error.
    pub fn require(&self, name: &str) -> Result<&str> {
        self.get(name)
            .ok_or_else(|| Error::MissingSecret(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Secret names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Fill in names the store did not return from another source, typically
    /// the process environment. Names already present are left alone.
    /// Returns the names that were filled.
    pub fn fill_missing<'a, I, F>(&mut self, names: I, lookup: F) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
        F: Fn(&str) -> Option<String>,
    {
        let mut filled = Vec::new();
        for name in names {
            if self.contains(name) {
                continue;
            }
            if let Some(value) = lookup(name) {
                self.entries.insert(name.to_string(), value);
                filled.push(name.to_string());
            }
        }
        filled
    }

    /// Replace every secret value occurring in `input` with `***`. Values
    /// shorter than [`MIN_MASKED_LENGTH`] are left visible.
    pub fn mask(&self, input: &str) -> String {
        let mut values: Vec<&str> = self
            .entries
            .values()
            .map(String::as_str)
            .filter(|v| v.chars().count() >= MIN_MASKED_LENGTH)
            .collect();
        // Longest first so a value containing another is masked whole.
        values.sort_by_key(|v| std::cmp::Reverse(v.len()));

        let mut output = input.to_string();
        for value in values {
            if output.contains(value) {
                output = output.replace(value, "***");
            }
        }
        output
    }
}

impl FromIterator<SecretRecord> for SecretSet {
    fn from_iter<T: IntoIterator<Item = SecretRecord>>(iter: T) -> Self {
        let mut set = SecretSet::new();
        for record in iter {
            set.insert(record.name, record.value);
        }
        set
    }
}

impl fmt::Debug for SecretSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

/// Trait for secret storage backends.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Name of this backend, for logs.
    fn name(&self) -> &'static str;

    /// Load every secret of the target application.
    async fn load(&self, target: &VaultTarget) -> Result<Vec<SecretRecord>>;
}
