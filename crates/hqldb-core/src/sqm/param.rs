use crate::value::Value;
use std::{collections::BTreeMap, fmt};
use thiserror::Error as ThisError;

///
/// ParameterError
///

#[remain::sorted]
#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum ParameterError {
    #[error("parameter list bound to {parameter} is empty")]
    EmptyList { parameter: QueryParameter },

    #[error("mixed named and positional parameters: {parameter}")]
    Mixed { parameter: QueryParameter },

    #[error("parameter {parameter} does not accept multiple values")]
    MultiValuedNotAllowed { parameter: QueryParameter },

    #[error("positional parameter ordinal must be at least 1, got ?{position}")]
    OrdinalOutOfRange { position: u32 },

    #[error("no value bound for parameter {parameter}")]
    Unbound { parameter: QueryParameter },

    #[error("could not locate parameter {parameter} in query")]
    Unknown { parameter: QueryParameter },
}

///
/// QueryParameter
///
/// A parameter as written in the query: `:name` or `?N`.
///

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum QueryParameter {
    Named(String),
    Positional(u32),
}

impl QueryParameter {
    #[must_use]
    pub fn named(name: &str) -> Self {
        Self::Named(name.to_string())
    }

    #[must_use]
    pub const fn positional(position: u32) -> Self {
        Self::Positional(position)
    }
}

impl fmt::Display for QueryParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => write!(f, ":{name}"),
            Self::Positional(position) => write!(f, "?{position}"),
        }
    }
}

impl From<&str> for QueryParameter {
    fn from(name: &str) -> Self {
        Self::named(name.trim_start_matches(':'))
    }
}

impl From<u32> for QueryParameter {
    fn from(position: u32) -> Self {
        Self::Positional(position)
    }
}

///
/// SqmParameterId
///
/// One occurrence of a query parameter in an SQM tree.
///

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SqmParameterId(pub usize);

impl fmt::Display for SqmParameterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.0)
    }
}

///
/// SqmParameterOccurrence
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SqmParameterOccurrence {
    pub id: SqmParameterId,

    /// Occurrence sits where a list may expand (`in (:ids)`).
    pub allow_multi_valued: bool,
}

///
/// DomainParameterXref
///
/// Query parameter to every SQM occurrence it binds. Built once per
/// parse and shared by every statement split from it.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DomainParameterXref {
    parameters: BTreeMap<QueryParameter, Vec<SqmParameterOccurrence>>,
    next_id: usize,
}

impl DomainParameterXref {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new occurrence of `parameter`.
    pub fn register(
        &mut self,
        parameter: QueryParameter,
        allow_multi_valued: bool,
    ) -> Result<SqmParameterId, ParameterError> {
        if let QueryParameter::Positional(0) = parameter {
            return Err(ParameterError::OrdinalOutOfRange { position: 0 });
        }
        let mixed = self.parameters.keys().next().is_some_and(|existing| {
            matches!(existing, QueryParameter::Named(_))
                != matches!(parameter, QueryParameter::Named(_))
        });
        if mixed {
            return Err(ParameterError::Mixed { parameter });
        }

        let id = SqmParameterId(self.next_id);
        self.next_id += 1;
        self.parameters
            .entry(parameter)
            .or_default()
            .push(SqmParameterOccurrence {
                id,
                allow_multi_valued,
            });

        Ok(id)
    }

    pub fn query_parameters(&self) -> impl Iterator<Item = &QueryParameter> {
        self.parameters.keys()
    }

    #[must_use]
    pub fn occurrences(&self, parameter: &QueryParameter) -> &[SqmParameterOccurrence] {
        self.parameters.get(parameter).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn contains(&self, parameter: &QueryParameter) -> bool {
        self.parameters.contains_key(parameter)
    }

    /// The query parameter an occurrence belongs to.
    #[must_use]
    pub fn parameter_of(&self, id: SqmParameterId) -> Option<&QueryParameter> {
        self.parameters
            .iter()
            .find(|(_, occurrences)| occurrences.iter().any(|o| o.id == id))
            .map(|(parameter, _)| parameter)
    }

    /// Every occurrence of `parameter` may take a list.
    #[must_use]
    pub fn allows_multi_valued(&self, parameter: &QueryParameter) -> bool {
        let occurrences = self.occurrences(parameter);
        !occurrences.is_empty() && occurrences.iter().all(|o| o.allow_multi_valued)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }
}

///
/// BoundValue
///

#[derive(Clone, Debug, PartialEq)]
pub enum BoundValue {
    Single(Value),
    Multi(Vec<Value>),
}

impl BoundValue {
    /// Number of JDBC placeholders this value occupies.
    #[must_use]
    pub const fn cardinality(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Multi(values) => values.len(),
        }
    }

    #[must_use]
    pub fn values(&self) -> &[Value] {
        match self {
            Self::Single(value) => std::slice::from_ref(value),
            Self::Multi(values) => values,
        }
    }
}

///
/// QueryParameterBindings
///
/// Domain-level values bound on a query, keyed by query parameter.
///

#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryParameterBindings {
    values: BTreeMap<QueryParameter, BoundValue>,
}

impl QueryParameterBindings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, parameter: QueryParameter, value: Value) {
        self.values.insert(parameter, BoundValue::Single(value));
    }

    pub fn bind_list(&mut self, parameter: QueryParameter, values: Vec<Value>) {
        self.values.insert(parameter, BoundValue::Multi(values));
    }

    #[must_use]
    pub fn with(mut self, parameter: impl Into<QueryParameter>, value: impl Into<Value>) -> Self {
        self.bind(parameter.into(), value.into());
        self
    }

    #[must_use]
    pub fn get(&self, parameter: &QueryParameter) -> Option<&BoundValue> {
        self.values.get(parameter)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Check the bindings against what the query declares: nothing unknown,
    /// nothing missing, lists only where a list may expand.
    pub fn validate(&self, xref: &DomainParameterXref) -> Result<(), ParameterError> {
        if let Some(parameter) = self.values.keys().find(|p| !xref.contains(p)) {
            return Err(ParameterError::Unknown {
                parameter: parameter.clone(),
            });
        }

        for parameter in xref.query_parameters() {
            match self.values.get(parameter) {
                None => {
                    return Err(ParameterError::Unbound {
                        parameter: parameter.clone(),
                    });
                }
                Some(BoundValue::Multi(values)) => {
                    if !xref.allows_multi_valued(parameter) {
                        return Err(ParameterError::MultiValuedNotAllowed {
                            parameter: parameter.clone(),
                        });
                    }
                    if values.is_empty() {
                        return Err(ParameterError::EmptyList {
                            parameter: parameter.clone(),
                        });
                    }
                }
                Some(BoundValue::Single(_)) => {}
            }
        }

        Ok(())
    }

    /// Placeholder count per occurrence, for occurrences bound to lists.
    #[must_use]
    pub fn expansions(&self, xref: &DomainParameterXref) -> BTreeMap<SqmParameterId, usize> {
        let mut expansions = BTreeMap::new();
        for parameter in xref.query_parameters() {
            if let Some(BoundValue::Multi(values)) = self.values.get(parameter) {
                for occurrence in xref.occurrences(parameter) {
                    expansions.insert(occurrence.id, values.len());
                }
            }
        }

        expansions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xref() -> DomainParameterXref {
        let mut xref = DomainParameterXref::new();
        xref.register(QueryParameter::named("name"), false)
            .expect("register should succeed");
        xref.register(QueryParameter::named("ids"), true)
            .expect("register should succeed");
        xref.register(QueryParameter::named("name"), false)
            .expect("register should succeed");
        xref
    }

    #[test]
    fn repeated_named_parameter_shares_one_query_parameter() {
        let xref = xref();

        assert_eq!(xref.len(), 2);
        assert_eq!(xref.occurrences(&QueryParameter::named("name")).len(), 2);
        assert_eq!(
            xref.parameter_of(SqmParameterId(2)),
            Some(&QueryParameter::named("name"))
        );
    }

    #[test]
    fn mixing_named_and_positional_is_rejected() {
        let mut xref = xref();
        let err = xref
            .register(QueryParameter::positional(1), false)
            .expect_err("mixing should fail");

        assert!(matches!(err, ParameterError::Mixed { .. }));
    }

    #[test]
    fn validation_reports_unbound_unknown_and_misplaced_lists() {
        let xref = xref();

        let bindings = QueryParameterBindings::new().with("name", "AF123");
        assert_eq!(
            bindings.validate(&xref),
            Err(ParameterError::Unbound {
                parameter: QueryParameter::named("ids")
            })
        );

        let mut bindings = QueryParameterBindings::new().with("name", "AF123");
        bindings.bind_list(QueryParameter::named("ids"), vec![Value::from(1), Value::from(2)]);
        assert_eq!(bindings.validate(&xref), Ok(()));
        assert_eq!(
            bindings.expansions(&xref),
            BTreeMap::from([(SqmParameterId(1), 2)])
        );

        let mut misplaced = bindings.clone();
        misplaced.bind_list(QueryParameter::named("name"), vec![Value::from("a")]);
        assert!(matches!(
            misplaced.validate(&xref),
            Err(ParameterError::MultiValuedNotAllowed { .. })
        ));

        let extra = bindings.with("other", 1);
        assert!(matches!(
            extra.validate(&xref),
            Err(ParameterError::Unknown { .. })
        ));
    }
}
