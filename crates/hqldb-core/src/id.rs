//! Identifier generation for entities mapped to a database sequence.

use crate::{
    error::{Error, InternalError},
    jdbc::{JdbcCoordinator, JdbcOperation, JdbcParameterBindings},
    model::{IdGeneration, Metamodel},
    sql::{Expression, SelectItem, SelectStatement, Statement},
    value::Value,
};
use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, Mutex, PoisonError},
};
use tracing::debug;

///
/// IdentifierGenerator
///

pub trait IdentifierGenerator: Send + Sync {
    fn generate(&self, coordinator: &JdbcCoordinator) -> Result<Value, Error>;
}

///
/// SequenceGenerator
///
/// Pooled-lo optimizer: each database hit reserves `increment_size`
/// consecutive values starting at the fetched one.
///

pub struct SequenceGenerator {
    sequence: String,
    increment_size: i64,
    pool: Mutex<Pool>,
}

#[derive(Default)]
struct Pool {
    next: i64,
    upper: i64,
}

impl SequenceGenerator {
    #[must_use]
    pub fn new(sequence: &str, increment_size: i64) -> Self {
        Self {
            sequence: sequence.to_string(),
            increment_size: increment_size.max(1),
            pool: Mutex::default(),
        }
    }

    #[must_use]
    pub fn sequence(&self) -> &str {
        &self.sequence
    }

    #[must_use]
    pub const fn increment_size(&self) -> i64 {
        self.increment_size
    }

    fn fetch(&self, coordinator: &JdbcCoordinator) -> Result<i64, Error> {
        let operation = JdbcOperation::new(
            Statement::Select(SelectStatement {
                selections: vec![SelectItem {
                    expression: Expression::NextValue(self.sequence.clone()),
                    alias: None,
                }],
                ..SelectStatement::default()
            }),
            None,
        );
        let rows = coordinator.execute_query(&operation, &JdbcParameterBindings::new())?;

        rows.first()
            .and_then(|row| row.first())
            .and_then(Value::as_int)
            .ok_or_else(|| {
                InternalError::jdbc_invariant(format!(
                    "sequence '{}' returned no value",
                    self.sequence
                ))
                .into()
            })
    }
}

impl IdentifierGenerator for SequenceGenerator {
    fn generate(&self, coordinator: &JdbcCoordinator) -> Result<Value, Error> {
        let mut pool = self.pool.lock().unwrap_or_else(PoisonError::into_inner);
        if pool.next >= pool.upper {
            let lo = self.fetch(coordinator)?;
            debug!(sequence = %self.sequence, lo, "reserved identifier block");
            pool.next = lo;
            pool.upper = lo + self.increment_size;
        }

        let value = pool.next;
        pool.next += 1;

        Ok(Value::Int(value))
    }
}

impl fmt::Debug for SequenceGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequenceGenerator")
            .field("sequence", &self.sequence)
            .field("increment_size", &self.increment_size)
            .finish_non_exhaustive()
    }
}

///
/// IdentifierGenerators
///
/// One generator per sequence-mapped hierarchy, reachable from every
/// entity of that hierarchy.
///

#[derive(Clone, Default)]
pub struct IdentifierGenerators {
    generators: BTreeMap<String, Arc<dyn IdentifierGenerator>>,
}

impl IdentifierGenerators {
    #[must_use]
    pub fn from_metamodel(metamodel: &Metamodel) -> Self {
        let mut generators: BTreeMap<String, Arc<dyn IdentifierGenerator>> = BTreeMap::new();

        for root in metamodel.entities().filter(|e| !e.is_subclass()) {
            let IdGeneration::Sequence {
                name,
                increment_size,
            } = &root.identifier.generation
            else {
                continue;
            };
            let generator: Arc<dyn IdentifierGenerator> =
                Arc::new(SequenceGenerator::new(name, *increment_size));
            for entity in metamodel.hierarchy_of(root) {
                generators.insert(entity.name.clone(), Arc::clone(&generator));
            }
        }

        Self { generators }
    }

    #[must_use]
    pub fn get(&self, entity: &str) -> Option<&Arc<dyn IdentifierGenerator>> {
        self.generators.get(entity)
    }
}

impl fmt::Debug for IdentifierGenerators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.generators.keys()).finish()
    }
}
