//! Result-row shaping: the transformer a query applies to each raw tuple and
//! the precedence between `select new`, custom and map/list transformers.

use crate::{error::Error, value::Value};
use std::{any::Any, collections::BTreeMap, fmt, sync::Arc, sync::OnceLock};

///
/// QueryRow
///
/// One materialized result row.
///

pub enum QueryRow {
    Tuple(Vec<Value>),
    Map(BTreeMap<String, Value>),
    List(Vec<Value>),
    Instance(Box<dyn Any + Send>),
}

impl QueryRow {
    #[must_use]
    pub fn as_tuple(&self) -> Option<&[Value]> {
        match self {
            Self::Tuple(values) => Some(values),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_tuple(self) -> Option<Vec<Value>> {
        match self {
            Self::Tuple(values) => Some(values),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(values) => Some(values),
            _ => None,
        }
    }

    /// The constructed instance, when it is a `T`.
    #[must_use]
    pub fn downcast<T: Any>(self) -> Option<T> {
        match self {
            Self::Instance(instance) => instance.downcast::<T>().ok().map(|b| *b),
            _ => None,
        }
    }
}

impl fmt::Debug for QueryRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tuple(values) => f.debug_tuple("Tuple").field(values).finish(),
            Self::Map(map) => f.debug_tuple("Map").field(map).finish(),
            Self::List(values) => f.debug_tuple("List").field(values).finish(),
            Self::Instance(_) => f.write_str("Instance(..)"),
        }
    }
}

///
/// ResultTransformer
///

pub trait ResultTransformer: Send + Sync {
    fn transform_tuple(&self, tuple: Vec<Value>, aliases: &[String]) -> Result<QueryRow, Error>;
}

///
/// AliasToEntityMapResultTransformer
/// `select new map(...)`: alias → value.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct AliasToEntityMapResultTransformer;

impl ResultTransformer for AliasToEntityMapResultTransformer {
    fn transform_tuple(&self, tuple: Vec<Value>, aliases: &[String]) -> Result<QueryRow, Error> {
        let map = tuple
            .into_iter()
            .enumerate()
            .map(|(i, value)| {
                let alias = aliases.get(i).cloned().unwrap_or_else(|| i.to_string());
                (alias, value)
            })
            .collect();

        Ok(QueryRow::Map(map))
    }
}

///
/// ToListResultTransformer
///

#[derive(Clone, Copy, Debug, Default)]
pub struct ToListResultTransformer;

impl ResultTransformer for ToListResultTransformer {
    fn transform_tuple(&self, tuple: Vec<Value>, _aliases: &[String]) -> Result<QueryRow, Error> {
        Ok(QueryRow::List(tuple))
    }
}

/// Builds an instance of a `select new` target from the selected values.
pub type Instantiator = Arc<dyn Fn(Vec<Value>) -> Result<Box<dyn Any + Send>, Error> + Send + Sync>;

///
/// ConstructorResultTransformer
/// `select new X(...)` through the instantiator registered for `X`.
///

#[derive(Clone)]
pub struct ConstructorResultTransformer {
    class_name: String,
    instantiator: Instantiator,
}

impl ConstructorResultTransformer {
    #[must_use]
    pub fn new(class_name: &str, instantiator: Instantiator) -> Self {
        Self {
            class_name: class_name.to_string(),
            instantiator,
        }
    }

    #[must_use]
    pub fn class_name(&self) -> &str {
        &self.class_name
    }
}

impl ResultTransformer for ConstructorResultTransformer {
    fn transform_tuple(&self, tuple: Vec<Value>, _aliases: &[String]) -> Result<QueryRow, Error> {
        (self.instantiator)(tuple).map(QueryRow::Instance)
    }
}

impl fmt::Debug for ConstructorResultTransformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstructorResultTransformer")
            .field("class_name", &self.class_name)
            .finish_non_exhaustive()
    }
}

type AliasSupplier = Box<dyn Fn() -> Vec<String> + Send + Sync>;

///
/// HolderInstantiator
///
/// Applies an optional transformer to each raw tuple. Aliases come from a
/// supplier invoked at most once, on the first transformed row.
///

pub struct HolderInstantiator {
    transformer: Option<Arc<dyn ResultTransformer>>,
    supplier: Option<AliasSupplier>,
    aliases: OnceLock<Vec<String>>,
}

impl HolderInstantiator {
    // every use of the constant is a fresh value
    #[allow(clippy::declare_interior_mutable_const)]
    pub const NOOP: Self = Self {
        transformer: None,
        supplier: None,
        aliases: OnceLock::new(),
    };

    #[must_use]
    pub fn new(
        transformer: Option<Arc<dyn ResultTransformer>>,
        aliases: impl Fn() -> Vec<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            transformer,
            supplier: Some(Box::new(aliases)),
            aliases: OnceLock::new(),
        }
    }

    #[must_use]
    pub const fn is_required(&self) -> bool {
        self.transformer.is_some()
    }

    /// The row itself when no transformer applies.
    pub fn instantiate(&self, row: Vec<Value>) -> Result<QueryRow, Error> {
        match &self.transformer {
            None => Ok(QueryRow::Tuple(row)),
            Some(transformer) => transformer.transform_tuple(row, self.aliases()),
        }
    }

    fn aliases(&self) -> &[String] {
        self.aliases
            .get_or_init(|| self.supplier.as_ref().map_or_else(Vec::new, |supply| supply()))
    }
}

impl fmt::Debug for HolderInstantiator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HolderInstantiator")
            .field("required", &self.is_required())
            .field("aliases", &self.aliases.get())
            .finish_non_exhaustive()
    }
}

/// A `select new` transformer wins over a custom one.
#[must_use]
pub fn holder_instantiator(
    select_new: Option<Arc<dyn ResultTransformer>>,
    custom: Option<Arc<dyn ResultTransformer>>,
    aliases: impl Fn() -> Vec<String> + Send + Sync + 'static,
) -> HolderInstantiator {
    HolderInstantiator::new(select_new.or(custom), aliases)
}

/// Constructor, then map, then list; nothing when none was requested.
#[must_use]
pub fn create_select_new_transformer(
    constructor: Option<Arc<dyn ResultTransformer>>,
    return_maps: bool,
    return_lists: bool,
) -> Option<Arc<dyn ResultTransformer>> {
    if constructor.is_some() {
        constructor
    } else if return_maps {
        Some(Arc::new(AliasToEntityMapResultTransformer))
    } else if return_lists {
        Some(Arc::new(ToListResultTransformer))
    } else {
        None
    }
}

#[must_use]
pub fn create_classic_holder_instantiator(
    constructor: Option<Arc<dyn ResultTransformer>>,
    return_maps: bool,
    return_lists: bool,
    custom: Option<Arc<dyn ResultTransformer>>,
    aliases: impl Fn() -> Vec<String> + Send + Sync + 'static,
) -> HolderInstantiator {
    holder_instantiator(
        create_select_new_transformer(constructor, return_maps, return_lists),
        custom,
        aliases,
    )
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, PartialEq)]
    struct Route {
        name: String,
        minutes: i64,
    }

    fn route_transformer() -> Arc<dyn ResultTransformer> {
        Arc::new(ConstructorResultTransformer::new(
            "Route",
            Arc::new(|values: Vec<Value>| {
                let name = values
                    .first()
                    .and_then(Value::as_text)
                    .unwrap_or_default()
                    .to_string();
                let minutes = values.get(1).and_then(Value::as_int).unwrap_or_default();
                Ok(Box::new(Route { name, minutes }) as Box<dyn Any + Send>)
            }),
        ))
    }

    fn row() -> Vec<Value> {
        vec![Value::from("AF123"), Value::Int(95)]
    }

    fn aliases() -> Vec<String> {
        vec!["name".to_string(), "minutes".to_string()]
    }

    #[test]
    fn noop_passes_the_row_through() {
        let holder = HolderInstantiator::NOOP;

        assert!(!holder.is_required());
        let out = holder
            .instantiate(row())
            .expect("instantiate should succeed")
            .into_tuple();
        assert_eq!(out, Some(row()));
    }

    #[test]
    fn constructor_wins_over_map_and_list() {
        let transformer = create_select_new_transformer(Some(route_transformer()), true, true)
            .expect("a transformer should be selected");

        let out = transformer
            .transform_tuple(row(), &aliases())
            .expect("transform should succeed");

        assert_eq!(
            out.downcast::<Route>(),
            Some(Route {
                name: "AF123".to_string(),
                minutes: 95
            })
        );
    }

    #[test]
    fn map_wins_over_list() {
        let holder = create_classic_holder_instantiator(None, true, true, None, aliases);

        let out = holder.instantiate(row()).expect("instantiate should succeed");
        let map = out.as_map().expect("row should be a map");

        assert_eq!(map.get("minutes"), Some(&Value::Int(95)));
    }

    #[test]
    fn list_results_keep_order() {
        let holder = create_classic_holder_instantiator(None, false, true, None, aliases);

        let out = holder.instantiate(row()).expect("instantiate should succeed");

        assert_eq!(out.as_list(), Some(row().as_slice()));
    }

    #[test]
    fn no_request_means_no_transformer() {
        assert!(create_select_new_transformer(None, false, false).is_none());
        assert!(!create_classic_holder_instantiator(None, false, false, None, Vec::new).is_required());
    }

    #[test]
    fn select_new_wins_over_custom() {
        let custom: Arc<dyn ResultTransformer> = Arc::new(ToListResultTransformer);
        let holder = holder_instantiator(
            Some(Arc::new(AliasToEntityMapResultTransformer)),
            Some(custom),
            aliases,
        );

        let out = holder.instantiate(row()).expect("instantiate should succeed");

        assert!(out.as_map().is_some());
    }

    #[test]
    fn custom_applies_without_select_new() {
        let custom: Arc<dyn ResultTransformer> = Arc::new(ToListResultTransformer);
        let holder = holder_instantiator(None, Some(custom), aliases);

        assert!(holder.is_required());
        assert!(
            holder
                .instantiate(row())
                .expect("instantiate should succeed")
                .as_list()
                .is_some()
        );
    }

    #[test]
    fn aliases_are_computed_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let holder = create_classic_holder_instantiator(None, true, false, None, move || {
            counted.fetch_add(1, Ordering::Relaxed);
            aliases()
        });

        assert_eq!(calls.load(Ordering::Relaxed), 0);
        for _ in 0..3 {
            holder.instantiate(row()).expect("instantiate should succeed");
        }

        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn missing_aliases_fall_back_to_positions() {
        let holder = create_classic_holder_instantiator(None, true, false, None, Vec::new);

        let out = holder.instantiate(row()).expect("instantiate should succeed");

        assert_eq!(
            out.as_map().and_then(|m| m.get("1")),
            Some(&Value::Int(95))
        );
    }
}
