//! Per-request ambient state.
//!
//! A [`Context`] is an immutable map of string keys to JSON values. The
//! router holds one base context; each request starts from a clone of it and
//! middleware "changes" it by building a new value with [`Context::with`].
//! Nothing can write through to the base context, so requests are isolated
//! without locks.
//!
//! Cloning is one `Arc` increment. `with` copies the map once.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

#[derive(Clone, Default, PartialEq)]
pub struct Context {
    values: Arc<Map<String, Value>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self { values: Arc::new(map) }
    }

    /// Returns a new context with `key` set to `value`. `self` is unchanged.
    ///
    /// ```rust
    /// use minirpc::Context;
    ///
    /// let base = Context::new();
    /// let next = base.with("user", "ann");
    ///
    /// assert_eq!(next.get("user"), Some(&"ann".into()));
    /// assert!(base.get("user").is_none());
    /// ```
    pub fn with(&self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut values = Map::clone(&self.values);
        values.insert(key.into(), value.into());
        Self::from_map(values)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Decodes the value under `key`. `None` if it is missing or has the wrong shape.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| T::deserialize(v).ok())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.values.iter()).finish()
    }
}

impl Serialize for Context {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.values.serialize(serializer)
    }
}

impl FromIterator<(String, Value)> for Context {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self::from_map(iter.into_iter().collect())
    }
}
