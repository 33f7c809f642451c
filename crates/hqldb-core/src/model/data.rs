use crate::value::Value;
use derive_more::{Deref, IntoIterator};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

///
/// EntityData
///
/// Dynamic-map entity state: attribute name to value, identifier and
/// version included.
///

#[derive(Clone, Debug, Default, Deref, Deserialize, IntoIterator, PartialEq, Serialize)]
#[serde(transparent)]
pub struct EntityData(BTreeMap<String, Value>);

impl EntityData {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, attribute: &str, value: impl Into<Value>) -> Self {
        self.set(attribute, value);
        self
    }

    pub fn set(&mut self, attribute: &str, value: impl Into<Value>) {
        self.0.insert(attribute.to_string(), value.into());
    }

    /// Value of `attribute`, NULL when absent.
    #[must_use]
    pub fn value(&self, attribute: &str) -> Value {
        self.0.get(attribute).cloned().unwrap_or_default()
    }
}

impl FromIterator<(String, Value)> for EntityData {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
