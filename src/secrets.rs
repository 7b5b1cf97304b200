//! Secret lookup chain
//!
//! Secrets are resolved by asking an ordered list of providers. The first
//! provider that supports a key answers it. A key may carry an inline
//! default as `NAME:default`; providers look the key up by `NAME` only and
//! [`DefaultLookup`] answers with the text after the first `:`.
//!
//! Once configuration is loaded the chain should be erased so that secret
//! material does not linger in provider caches.

use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;
use tracing::warn;
use zeroize::Zeroizing;

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("invalid secret document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0} is not a map")]
    NotAMap(String),

    #[error("{0} is not found")]
    NotFound(String),
}

/// A source of secret values
pub trait SecretLookup: Send + Sync {
    /// Returns true if this provider can answer `key`
    fn supports(&self, key: &str) -> bool;

    /// Resolve `key`, or `None` if this provider does not hold it
    fn resolve(&self, key: &str) -> Option<String>;

    /// Drop any secret material held by the provider
    fn erase(&mut self);
}

/// Strip an inline `:default` suffix from a lookup key
fn key_name(key: &str) -> &str {
    key.split(':').next().unwrap_or(key)
}

/// Reads secrets from the process environment
#[derive(Debug, Default)]
pub struct EnvLookup;

impl SecretLookup for EnvLookup {
    fn supports(&self, key: &str) -> bool {
        std::env::var_os(key_name(key)).is_some()
    }

    fn resolve(&self, key: &str) -> Option<String> {
        std::env::var(key_name(key)).ok()
    }

    fn erase(&mut self) {}
}

/// Answers any `NAME:default` key with its inline default
///
/// Supports every key that carries a default, so it belongs at the end of
/// the chain.
#[derive(Debug, Default)]
pub struct DefaultLookup;

impl SecretLookup for DefaultLookup {
    fn supports(&self, key: &str) -> bool {
        key.contains(':')
    }

    fn resolve(&self, key: &str) -> Option<String> {
        key.split_once(':').map(|(_, default)| default.to_string())
    }

    fn erase(&mut self) {}
}

/// In-memory secrets, e.g. a document handed over by a secret manager
///
/// Key names are matched case-insensitively.
#[derive(Default)]
pub struct MapLookup {
    data: HashMap<String, Zeroizing<String>>,
}

impl MapLookup {
    pub fn new(values: HashMap<String, String>) -> Self {
        let data = values
            .into_iter()
            .map(|(k, v)| (k.to_uppercase(), Zeroizing::new(v)))
            .collect();
        Self { data }
    }

    /// Build from a JSON document, descending into the object at the
    /// dotted `path` first (an empty path means the document root).
    ///
    /// Non-string leaf values are ignored.
    pub fn from_json(document: &str, path: &str) -> Result<Self, SecretError> {
        let document = Zeroizing::new(document.to_string());
        let root: Value = serde_json::from_str(&document)?;
        let mut node = &root;
        if !path.is_empty() {
            for field in path.split('.') {
                let map = node
                    .as_object()
                    .ok_or_else(|| SecretError::NotAMap(path.to_string()))?;
                node = map
                    .get(field)
                    .ok_or_else(|| SecretError::NotFound(path.to_string()))?;
            }
        }
        let map = node
            .as_object()
            .ok_or_else(|| SecretError::NotAMap(path.to_string()))?;

        let data = map
            .iter()
            .filter_map(|(k, v)| {
                v.as_str()
                    .map(|s| (k.to_uppercase(), Zeroizing::new(s.to_string())))
            })
            .collect();
        Ok(Self { data })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl SecretLookup for MapLookup {
    fn supports(&self, key: &str) -> bool {
        self.data.contains_key(&key_name(key).to_uppercase())
    }

    fn resolve(&self, key: &str) -> Option<String> {
        self.data
            .get(&key_name(key).to_uppercase())
            .map(|v| v.as_str().to_string())
    }

    fn erase(&mut self) {
        self.data.clear();
    }
}

/// Ordered provider chain; the first supporting provider wins
#[derive(Default)]
pub struct ChainLookup {
    chain: Vec<Box<dyn SecretLookup>>,
}

impl ChainLookup {
    pub fn new(chain: Vec<Box<dyn SecretLookup>>) -> Self {
        Self { chain }
    }

    /// Environment first, inline defaults last
    pub fn from_env() -> Self {
        Self::new(vec![Box::new(EnvLookup), Box::new(DefaultLookup)])
    }

    /// Insert a provider ahead of the existing ones
    pub fn prepend(&mut self, lookup: Box<dyn SecretLookup>) {
        self.chain.insert(0, lookup);
    }
}

impl SecretLookup for ChainLookup {
    fn supports(&self, key: &str) -> bool {
        self.chain.iter().any(|l| l.supports(key))
    }

    fn resolve(&self, key: &str) -> Option<String> {
        match self.chain.iter().find(|l| l.supports(key)) {
            Some(lookup) => lookup.resolve(key),
            None => {
                warn!("key {} not found in any lookup chain", key_name(key));
                None
            }
        }
    }

    fn erase(&mut self) {
        for lookup in &mut self.chain {
            lookup.erase();
        }
    }
}
