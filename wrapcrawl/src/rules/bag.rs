//! The property bag shared by the rules of one query.

use std::collections::BTreeMap;

use tracing::debug;

use super::Value;

/// Named values written by `property` rules and read through `$name`
/// attribute references.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyBag {
    values: BTreeMap<String, Value>,
}

impl PropertyBag {
    /// Creates an empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a property.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Sets a property; `Null` removes it.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        if value.is_null() {
            self.values.remove(&name);
        } else {
            self.values.insert(name, value);
        }
    }

    /// Removes a property and returns it.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }

    /// Returns true if the property is set.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Returns the property names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Resolves an attribute value: `$name` reads the property's text,
    /// anything else is returned as is.
    #[must_use]
    pub fn resolve(&self, raw: &str) -> Option<String> {
        match raw.strip_prefix('$') {
            Some(name) => {
                let resolved = self.get(name).and_then(Value::as_text);
                if resolved.is_none() {
                    debug!(property = name, "Property reference has no text value");
                }
                resolved
            }
            None => Some(raw.to_string()),
        }
    }
}
