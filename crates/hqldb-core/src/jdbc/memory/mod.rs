//! In-memory reference database executing the SQL AST directly.
//!
//! Shared tables live behind one mutex; each connection owns its local
//! temporary tables and its rows of global temporary tables. Transactions
//! keep an undo log; DDL is never transactional.

mod eval;
mod schema;

#[cfg(test)]
mod tests;

use crate::{
    jdbc::{JdbcConnection, JdbcConnectionAccess, JdbcError, JdbcOperation},
    sql::{
        Assignment, InsertSource, Predicate, Statement, TableDefinition, TableKind, UniqueKey,
    },
    value::Value,
};
use eval::{BoundRow, Env, Evaluator, Params};
use std::{
    cell::Cell,
    collections::BTreeMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

///
/// InMemoryDatabase
///

#[derive(Clone, Default)]
pub struct InMemoryDatabase {
    state: Arc<Mutex<DatabaseState>>,
}

impl InMemoryDatabase {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, DatabaseState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a permanent or global temporary table.
    pub fn create_table(&self, definition: TableDefinition) -> Result<(), JdbcError> {
        self.lock().create(definition)
    }

    pub fn create_sequence(&self, name: &str, start: i64, increment: i64) {
        self.lock().sequences.insert(
            key(name),
            Sequence {
                next: Cell::new(start),
                increment,
            },
        );
    }

    pub fn add_unique_key(&self, table: &str, name: &str, columns: &[&str]) -> Result<(), JdbcError> {
        let mut state = self.lock();
        let table = state
            .tables
            .get_mut(&key(table))
            .ok_or_else(|| JdbcError::UnknownTable {
                table: table.to_string(),
            })?;
        table.definition.unique_keys.push(UniqueKey {
            name: name.to_string(),
            columns: columns.iter().map(ToString::to_string).collect(),
        });

        Ok(())
    }

    #[must_use]
    pub fn has_table(&self, name: &str) -> bool {
        self.lock().tables.contains_key(&key(name))
    }

    /// Committed rows of a shared table, in insertion order.
    #[must_use]
    pub fn rows(&self, table: &str) -> Vec<Vec<Value>> {
        self.lock()
            .tables
            .get(&key(table))
            .map(|t| t.rows.values().cloned().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn row_count(&self, table: &str) -> usize {
        self.lock().tables.get(&key(table)).map_or(0, |t| t.rows.len())
    }

    #[must_use]
    pub fn connect(&self) -> InMemoryConnection {
        InMemoryConnection {
            state: Arc::clone(&self.state),
            local: BTreeMap::new(),
            undo: None,
        }
    }
}

impl fmt::Debug for InMemoryDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("InMemoryDatabase")
            .field("tables", &state.tables.keys().collect::<Vec<_>>())
            .field("sequences", &state.sequences.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl JdbcConnectionAccess for InMemoryDatabase {
    fn obtain_connection(&self) -> Result<Box<dyn JdbcConnection>, JdbcError> {
        Ok(Box::new(self.connect()))
    }
}

// ─────────────────────────────────────────────
// Storage
// ─────────────────────────────────────────────

fn key(name: &str) -> String {
    name.to_ascii_lowercase()
}

#[derive(Default)]
struct DatabaseState {
    tables: BTreeMap<String, Table>,
    sequences: BTreeMap<String, Sequence>,
}

impl DatabaseState {
    fn create(&mut self, definition: TableDefinition) -> Result<(), JdbcError> {
        let name = key(&definition.name);
        if self.tables.contains_key(&name) {
            return Err(JdbcError::TableExists {
                table: definition.name,
            });
        }
        self.tables.insert(name, Table::new(definition));

        Ok(())
    }
}

struct Sequence {
    next: Cell<i64>,
    increment: i64,
}

impl Sequence {
    fn next_value(&self) -> i64 {
        let value = self.next.get();
        self.next.set(value.saturating_add(self.increment));
        value
    }
}

#[derive(Clone, Debug)]
struct Table {
    definition: TableDefinition,
    rows: BTreeMap<u64, Vec<Value>>,
    next_row_id: u64,
}

impl Table {
    const fn new(definition: TableDefinition) -> Self {
        Self {
            definition,
            rows: BTreeMap::new(),
            next_row_id: 0,
        }
    }

    fn empty_copy(&self) -> Self {
        Self::new(self.definition.clone())
    }

    fn column_index(&self, column: &str) -> Result<usize, JdbcError> {
        self.definition
            .column_index(column)
            .ok_or_else(|| JdbcError::UnknownColumn {
                column: format!("{}.{column}", self.definition.name),
            })
    }

    /// Validate `changed` rows against the table as it would look with
    /// them applied.
    fn check_constraints(
        &self,
        changed: &BTreeMap<u64, Vec<Value>>,
    ) -> Result<(), JdbcError> {
        let definition = &self.definition;

        for row in changed.values() {
            for (i, column) in definition.columns.iter().enumerate() {
                let required = !column.nullable
                    || definition
                        .primary_key
                        .iter()
                        .any(|pk| pk.eq_ignore_ascii_case(&column.name));
                if required && row[i].is_null() {
                    return Err(JdbcError::ConstraintViolation {
                        constraint: format!("{}.{} not null", definition.name, column.name),
                        message: format!(
                            "NULL not allowed for column \"{}\" of table \"{}\"",
                            column.name, definition.name
                        ),
                    });
                }
            }
        }

        let mut keys: Vec<(String, &[String])> = Vec::new();
        if !definition.primary_key.is_empty() {
            keys.push((format!("PK_{}", definition.name), &definition.primary_key));
        }
        for unique in &definition.unique_keys {
            keys.push((unique.name.clone(), &unique.columns));
        }

        for (name, columns) in keys {
            let positions = columns
                .iter()
                .map(|c| self.column_index(c))
                .collect::<Result<Vec<_>, _>>()?;

            let merged = self
                .rows
                .iter()
                .filter(|(id, _)| !changed.contains_key(*id))
                .chain(changed.iter());
            let mut seen: Vec<Vec<&Value>> = Vec::new();
            for (_, row) in merged {
                let tuple: Vec<&Value> = positions.iter().map(|p| &row[*p]).collect();
                if tuple.iter().any(|v| v.is_null()) {
                    continue;
                }
                let duplicate = seen.iter().any(|other| {
                    other
                        .iter()
                        .zip(&tuple)
                        .all(|(a, b)| a.sql_cmp(b) == Some(std::cmp::Ordering::Equal))
                });
                if duplicate {
                    let rendered: Vec<String> = tuple.iter().map(ToString::to_string).collect();
                    return Err(JdbcError::ConstraintViolation {
                        constraint: name,
                        message: format!(
                            "duplicate key ({}) = ({}) in table \"{}\"",
                            columns.join(", "),
                            rendered.join(", "),
                            definition.name
                        ),
                    });
                }
                seen.push(tuple);
            }
        }

        Ok(())
    }
}

// ─────────────────────────────────────────────
// Connection
// ─────────────────────────────────────────────

enum UndoEntry {
    Inserted { table: String, row_id: u64 },
    Replaced {
        table: String,
        row_id: u64,
        row: Vec<Value>,
    },
}

///
/// InMemoryConnection
///

pub struct InMemoryConnection {
    state: Arc<Mutex<DatabaseState>>,
    local: BTreeMap<String, Table>,
    undo: Option<Vec<UndoEntry>>,
}

impl InMemoryConnection {
    fn catalog(&mut self) -> Catalog<'_> {
        Catalog {
            shared: self.state.lock().unwrap_or_else(PoisonError::into_inner),
            local: &mut self.local,
        }
    }

    fn record(undo: &mut Option<Vec<UndoEntry>>, entries: impl IntoIterator<Item = UndoEntry>) {
        if let Some(log) = undo {
            log.extend(entries);
        }
    }

    fn execute(&mut self, operation: &JdbcOperation, values: &[Value]) -> Result<u64, JdbcError> {
        let params = Params::new(operation.parameters(), values);
        let mut undo = self.undo.take();
        let result = self.execute_with(operation.statement(), &params, &mut undo);
        self.undo = undo;

        result
    }

    fn execute_with(
        &mut self,
        statement: &Statement,
        params: &Params<'_>,
        undo: &mut Option<Vec<UndoEntry>>,
    ) -> Result<u64, JdbcError> {
        let mut catalog = self.catalog();

        match statement {
            Statement::CreateTable(definition) => {
                catalog.create(definition.clone())?;
                Ok(0)
            }
            Statement::DropTable { name, if_exists } => {
                catalog.drop_table(name, *if_exists)?;
                Ok(0)
            }
            Statement::Insert(insert) => {
                let rows = {
                    let evaluator = Evaluator::new(catalog.view(), params);
                    match &insert.source {
                        InsertSource::Values(rows) => rows
                            .iter()
                            .enumerate()
                            .map(|(i, row)| {
                                let env = Env::root(&[]).with_row_number(i + 1);
                                row.iter()
                                    .map(|e| evaluator.eval(e, &env))
                                    .collect::<Result<Vec<_>, _>>()
                            })
                            .collect::<Result<Vec<_>, _>>()?,
                        InsertSource::Select(select) => evaluator.select(select, None)?,
                    }
                };
                let inserted = catalog.insert(&insert.table, &insert.columns, rows)?;
                let count = inserted.len() as u64;
                Self::record(
                    undo,
                    inserted.into_iter().map(|row_id| UndoEntry::Inserted {
                        table: key(&insert.table),
                        row_id,
                    }),
                );
                Ok(count)
            }
            Statement::Update(update) => {
                let changes = catalog.evaluate_update(
                    &update.table,
                    &update.assignments,
                    update.predicate.as_ref(),
                    params,
                )?;
                let previous = catalog.apply_update(&update.table, changes)?;
                let count = previous.len() as u64;
                Self::record(
                    undo,
                    previous
                        .into_iter()
                        .map(|(row_id, row)| UndoEntry::Replaced {
                            table: key(&update.table),
                            row_id,
                            row,
                        }),
                );
                Ok(count)
            }
            Statement::Delete(delete) => {
                let row_ids =
                    catalog.matching_rows(&delete.table, delete.predicate.as_ref(), params)?;
                let removed = catalog.delete(&delete.table, &row_ids)?;
                let count = removed.len() as u64;
                Self::record(
                    undo,
                    removed.into_iter().map(|(row_id, row)| UndoEntry::Replaced {
                        table: key(&delete.table),
                        row_id,
                        row,
                    }),
                );
                Ok(count)
            }
            Statement::Select(_) => Err(JdbcError::Unsupported {
                message: "query passed to execute_update".to_string(),
            }),
        }
    }
}

impl JdbcConnection for InMemoryConnection {
    fn execute_update(
        &mut self,
        operation: &JdbcOperation,
        values: &[Value],
    ) -> Result<u64, JdbcError> {
        self.execute(operation, values)
    }

    fn execute_query(
        &mut self,
        operation: &JdbcOperation,
        values: &[Value],
    ) -> Result<Vec<Vec<Value>>, JdbcError> {
        let Statement::Select(select) = operation.statement() else {
            return Err(JdbcError::Unsupported {
                message: "statement passed to execute_query is not a query".to_string(),
            });
        };
        let params = Params::new(operation.parameters(), values);
        let catalog = self.catalog();
        let evaluator = Evaluator::new(catalog.view(), &params);

        evaluator.select(select, None)
    }

    fn begin(&mut self) -> Result<(), JdbcError> {
        if self.undo.is_some() {
            return Err(JdbcError::Transaction {
                message: "transaction already active".to_string(),
            });
        }
        self.undo = Some(Vec::new());

        Ok(())
    }

    fn commit(&mut self) -> Result<(), JdbcError> {
        self.undo
            .take()
            .map(drop)
            .ok_or_else(|| JdbcError::Transaction {
                message: "no active transaction".to_string(),
            })
    }

    fn rollback(&mut self) -> Result<(), JdbcError> {
        let log = self.undo.take().ok_or_else(|| JdbcError::Transaction {
            message: "no active transaction".to_string(),
        })?;

        let mut catalog = self.catalog();
        for entry in log.into_iter().rev() {
            let (table, row_id, row) = match entry {
                UndoEntry::Inserted { table, row_id } => (table, row_id, None),
                UndoEntry::Replaced { table, row_id, row } => (table, row_id, Some(row)),
            };
            // tables dropped since are skipped
            let Ok(table) = catalog.table_mut(&table) else {
                continue;
            };
            match row {
                Some(row) => {
                    table.rows.insert(row_id, row);
                }
                None => {
                    table.rows.remove(&row_id);
                }
            }
        }

        Ok(())
    }
}

// ─────────────────────────────────────────────
// Catalog
// ─────────────────────────────────────────────

struct Catalog<'c> {
    shared: MutexGuard<'c, DatabaseState>,
    local: &'c mut BTreeMap<String, Table>,
}

///
/// CatalogView
/// Read-only table and sequence lookup for evaluation.
///

#[derive(Clone, Copy)]
struct CatalogView<'a> {
    shared: &'a DatabaseState,
    local: &'a BTreeMap<String, Table>,
}

impl<'a> CatalogView<'a> {
    fn table(&self, name: &str) -> Result<&'a Table, JdbcError> {
        let name_key = key(name);
        // global temporary definitions hold no rows of their own
        self.local
            .get(&name_key)
            .or_else(|| self.shared.tables.get(&name_key))
            .ok_or_else(|| JdbcError::UnknownTable {
                table: name.to_string(),
            })
    }

    fn next_value(&self, sequence: &str) -> Result<i64, JdbcError> {
        self.shared
            .sequences
            .get(&key(sequence))
            .map(Sequence::next_value)
            .ok_or_else(|| JdbcError::UnknownSequence {
                sequence: sequence.to_string(),
            })
    }
}

impl Catalog<'_> {
    fn view(&self) -> CatalogView<'_> {
        CatalogView {
            shared: &self.shared,
            local: &*self.local,
        }
    }

    fn create(&mut self, definition: TableDefinition) -> Result<(), JdbcError> {
        let name = key(&definition.name);
        match definition.kind {
            TableKind::LocalTemporary => {
                if self.local.contains_key(&name) {
                    return Err(JdbcError::TableExists {
                        table: definition.name,
                    });
                }
                self.local.insert(name, Table::new(definition));
                Ok(())
            }
            TableKind::Permanent | TableKind::GlobalTemporary => self.shared.create(definition),
        }
    }

    fn drop_table(&mut self, name: &str, if_exists: bool) -> Result<(), JdbcError> {
        let name_key = key(name);
        let local = self.local.remove(&name_key);
        let shared = match local.as_ref().map(|t| t.definition.kind) {
            Some(TableKind::LocalTemporary) => None,
            _ => self.shared.tables.remove(&name_key),
        };

        if local.is_none() && shared.is_none() && !if_exists {
            return Err(JdbcError::UnknownTable {
                table: name.to_string(),
            });
        }

        Ok(())
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut Table, JdbcError> {
        let name_key = key(name);
        if !self.local.contains_key(&name_key) {
            let shared = self
                .shared
                .tables
                .get(&name_key)
                .ok_or_else(|| JdbcError::UnknownTable {
                    table: name.to_string(),
                })?;
            if shared.definition.kind == TableKind::GlobalTemporary {
                let copy = shared.empty_copy();
                self.local.insert(name_key.clone(), copy);
            } else {
                return self
                    .shared
                    .tables
                    .get_mut(&name_key)
                    .ok_or_else(|| JdbcError::UnknownTable {
                        table: name.to_string(),
                    });
            }
        }

        self.local
            .get_mut(&name_key)
            .ok_or_else(|| JdbcError::UnknownTable {
                table: name.to_string(),
            })
    }

    fn insert(
        &mut self,
        table: &str,
        columns: &[String],
        rows: Vec<Vec<Value>>,
    ) -> Result<Vec<u64>, JdbcError> {
        let table = self.table_mut(table)?;
        let positions = columns
            .iter()
            .map(|c| table.column_index(c))
            .collect::<Result<Vec<_>, _>>()?;

        let mut staged = BTreeMap::new();
        let mut next_row_id = table.next_row_id;
        for values in rows {
            if values.len() != positions.len() {
                return Err(JdbcError::data(format!(
                    "insert into {} expects {} values, got {}",
                    table.definition.name,
                    positions.len(),
                    values.len()
                )));
            }
            let mut row = vec![Value::Null; table.definition.columns.len()];
            for (position, value) in positions.iter().zip(values) {
                row[*position] = value;
            }
            staged.insert(next_row_id, row);
            next_row_id += 1;
        }

        table.check_constraints(&staged)?;
        table.next_row_id = next_row_id;
        let ids = staged.keys().copied().collect();
        table.rows.extend(staged);

        Ok(ids)
    }

    fn matching_rows(
        &self,
        table: &str,
        predicate: Option<&Predicate>,
        params: &Params<'_>,
    ) -> Result<Vec<u64>, JdbcError> {
        let view = self.view();
        let target = view.table(table)?;
        let evaluator = Evaluator::new(view, params);

        let mut ids = Vec::new();
        for (row_id, row) in &target.rows {
            let frame = [BoundRow::target(target, row)];
            let env = Env::root(&frame);
            let keep = match predicate {
                Some(p) => evaluator.test(p, &env)? == Some(true),
                None => true,
            };
            if keep {
                ids.push(*row_id);
            }
        }

        Ok(ids)
    }

    fn evaluate_update(
        &self,
        table: &str,
        assignments: &[Assignment],
        predicate: Option<&Predicate>,
        params: &Params<'_>,
    ) -> Result<BTreeMap<u64, Vec<Value>>, JdbcError> {
        let row_ids = self.matching_rows(table, predicate, params)?;
        let view = self.view();
        let target = view.table(table)?;
        let evaluator = Evaluator::new(view, params);
        let positions = assignments
            .iter()
            .map(|a| target.column_index(&a.column))
            .collect::<Result<Vec<_>, _>>()?;

        let mut changes = BTreeMap::new();
        for row_id in row_ids {
            let Some(row) = target.rows.get(&row_id) else {
                continue;
            };
            let frame = [BoundRow::target(target, row)];
            let env = Env::root(&frame);
            let mut updated = row.clone();
            for (assignment, position) in assignments.iter().zip(&positions) {
                updated[*position] = evaluator.eval(&assignment.value, &env)?;
            }
            changes.insert(row_id, updated);
        }

        Ok(changes)
    }

    fn apply_update(
        &mut self,
        table: &str,
        changes: BTreeMap<u64, Vec<Value>>,
    ) -> Result<Vec<(u64, Vec<Value>)>, JdbcError> {
        let table = self.table_mut(table)?;
        table.check_constraints(&changes)?;

        let mut previous = Vec::with_capacity(changes.len());
        for (row_id, row) in changes {
            if let Some(old) = table.rows.insert(row_id, row) {
                previous.push((row_id, old));
            }
        }

        Ok(previous)
    }

    fn delete(
        &mut self,
        table: &str,
        row_ids: &[u64],
    ) -> Result<Vec<(u64, Vec<Value>)>, JdbcError> {
        let table = self.table_mut(table)?;

        Ok(row_ids
            .iter()
            .filter_map(|id| table.rows.remove(id).map(|row| (*id, row)))
            .collect())
    }
}
