use crate::{sqm::SqmParameterId, value::Value};
use std::{collections::BTreeMap, fmt};

///
/// JdbcParameter
///
/// Placeholder token in a SQL AST. Ids are unique within one compiled
/// statement set; rendering turns each occurrence into `?`.
///

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct JdbcParameter(pub usize);

impl fmt::Display for JdbcParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

///
/// JdbcParameterAllocator
///

#[derive(Clone, Debug, Default)]
pub struct JdbcParameterAllocator {
    next: usize,
}

impl JdbcParameterAllocator {
    /// Continue allocating after `high_water` ids already in use.
    #[must_use]
    pub const fn starting_at(high_water: usize) -> Self {
        Self { next: high_water }
    }

    pub const fn create(&mut self) -> JdbcParameter {
        let parameter = JdbcParameter(self.next);
        self.next += 1;
        parameter
    }

    #[must_use]
    pub const fn high_water(&self) -> usize {
        self.next
    }
}

///
/// JdbcType
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JdbcType {
    Null,
    Boolean,
    BigInt,
    Double,
    Varchar,
}

impl JdbcType {
    #[must_use]
    pub const fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Boolean,
            Value::Int(_) => Self::BigInt,
            Value::Float(_) => Self::Double,
            Value::Text(_) => Self::Varchar,
        }
    }
}

///
/// JdbcParameterBinding
///

#[derive(Clone, Debug, PartialEq)]
pub struct JdbcParameterBinding {
    pub value: Value,
    pub jdbc_type: JdbcType,
}

///
/// JdbcParameterBindings
///
/// Values bound to JDBC parameters for one execution, plus the number of
/// placeholders each multi-valued domain occurrence expanded into.
///

#[derive(Clone, Debug, Default, PartialEq)]
pub struct JdbcParameterBindings {
    bindings: BTreeMap<JdbcParameter, JdbcParameterBinding>,
    expansions: BTreeMap<SqmParameterId, usize>,
}

impl JdbcParameterBindings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_binding(&mut self, parameter: JdbcParameter, value: Value) {
        let jdbc_type = JdbcType::of(&value);
        self.bindings
            .insert(parameter, JdbcParameterBinding { value, jdbc_type });
    }

    #[must_use]
    pub fn with_binding(mut self, parameter: JdbcParameter, value: Value) -> Self {
        self.add_binding(parameter, value);
        self
    }

    #[must_use]
    pub fn binding(&self, parameter: JdbcParameter) -> Option<&JdbcParameterBinding> {
        self.bindings.get(&parameter)
    }

    #[must_use]
    pub fn value(&self, parameter: JdbcParameter) -> Option<&Value> {
        self.binding(parameter).map(|b| &b.value)
    }

    #[must_use]
    pub fn contains(&self, parameter: JdbcParameter) -> bool {
        self.bindings.contains_key(&parameter)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn record_expansion(&mut self, occurrence: SqmParameterId, count: usize) {
        self.expansions.insert(occurrence, count);
    }

    #[must_use]
    pub const fn expansions(&self) -> &BTreeMap<SqmParameterId, usize> {
        &self.expansions
    }

    /// Bindings of `other` override existing ones.
    pub fn extend(&mut self, other: &Self) {
        self.bindings
            .extend(other.bindings.iter().map(|(k, v)| (*k, v.clone())));
        self.expansions.extend(other.expansions.iter());
    }
}
