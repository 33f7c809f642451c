use super::{CatalogView, Table};
use crate::{
    jdbc::{JdbcError, JdbcParameter},
    sql::{
        AggregateFunction, BinaryOperator, ColumnReference, ComparisonOperator, Expression,
        JoinKind, Predicate, ScalarFunction, SelectStatement,
    },
    value::Value,
};
use std::{cmp::Ordering, collections::BTreeMap};

///
/// Params
/// Bound values keyed by placeholder token.
///

pub(super) struct Params<'v> {
    values: BTreeMap<JdbcParameter, &'v Value>,
}

impl<'v> Params<'v> {
    pub(super) fn new(parameters: &[JdbcParameter], values: &'v [Value]) -> Self {
        Self {
            values: parameters.iter().copied().zip(values.iter()).collect(),
        }
    }
}

///
/// BoundRow
/// One table's row inside a frame; `None` is the null side of a left join.
///

#[derive(Clone, Copy)]
pub(super) struct BoundRow<'r> {
    alias: &'r str,
    table: &'r Table,
    row: Option<&'r [Value]>,
}

impl<'r> BoundRow<'r> {
    /// Row of an update/delete target, referenced without an alias.
    pub(super) fn target(table: &'r Table, row: &'r [Value]) -> Self {
        Self {
            alias: "",
            table,
            row: Some(row),
        }
    }

    fn matches_qualifier(&self, qualifier: &str) -> bool {
        if self.alias.is_empty() {
            self.table.definition.name.eq_ignore_ascii_case(qualifier)
        } else {
            self.alias.eq_ignore_ascii_case(qualifier)
        }
    }
}

///
/// Env
/// Column scope: the current frame, then enclosing query frames.
///

pub(super) struct Env<'e, 'r> {
    frame: &'e [BoundRow<'r>],
    outer: Option<&'e Env<'e, 'r>>,
    row_number: Option<usize>,
}

impl<'e, 'r> Env<'e, 'r> {
    pub(super) const fn root(frame: &'e [BoundRow<'r>]) -> Self {
        Self {
            frame,
            outer: None,
            row_number: None,
        }
    }

    const fn nested(frame: &'e [BoundRow<'r>], outer: Option<&'e Env<'e, 'r>>) -> Self {
        Self {
            frame,
            outer,
            row_number: None,
        }
    }

    pub(super) const fn with_row_number(mut self, row_number: usize) -> Self {
        self.row_number = Some(row_number);
        self
    }

    fn resolve(&self, column: &ColumnReference) -> Result<Value, JdbcError> {
        let mut scope = Some(self);
        while let Some(env) = scope {
            if let Some(value) = env.lookup(column)? {
                return Ok(value);
            }
            scope = env.outer;
        }

        Err(JdbcError::UnknownColumn {
            column: column.to_string(),
        })
    }

    fn lookup(&self, column: &ColumnReference) -> Result<Option<Value>, JdbcError> {
        let mut found = None;

        for bound in self.frame {
            if let Some(qualifier) = &column.qualifier
                && !bound.matches_qualifier(qualifier)
            {
                continue;
            }
            let Some(index) = bound.table.definition.column_index(&column.column) else {
                if column.qualifier.is_some() {
                    return Err(JdbcError::UnknownColumn {
                        column: column.to_string(),
                    });
                }
                continue;
            };
            if found.is_some() {
                return Err(JdbcError::AmbiguousColumn {
                    column: column.to_string(),
                });
            }
            found = Some(bound.row.map_or(Value::Null, |row| row[index].clone()));
        }

        Ok(found)
    }

    fn row_number(&self) -> Option<usize> {
        self.row_number
            .or_else(|| self.outer.and_then(Env::row_number))
    }
}

///
/// Evaluator
///

pub(super) struct Evaluator<'a> {
    catalog: CatalogView<'a>,
    params: &'a Params<'a>,
}

impl<'a> Evaluator<'a> {
    pub(super) const fn new(catalog: CatalogView<'a>, params: &'a Params<'a>) -> Self {
        Self { catalog, params }
    }

    // ─────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────

    pub(super) fn select<'r>(
        &self,
        select: &'r SelectStatement,
        outer: Option<&'r Env<'r, 'r>>,
    ) -> Result<Vec<Vec<Value>>, JdbcError>
    where
        'a: 'r,
    {
        let mut kept = Vec::new();
        for frame in self.frames(select, outer)? {
            let env = Env::nested(&frame, outer);
            let keep = match &select.predicate {
                Some(predicate) => self.test(predicate, &env)? == Some(true),
                None => true,
            };
            if keep {
                kept.push(frame);
            }
        }

        if select
            .selections
            .iter()
            .any(|s| s.expression.contains_aggregate())
        {
            let row = select
                .selections
                .iter()
                .map(|s| self.eval_grouped(&s.expression, &kept, outer))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(vec![row]);
        }

        if !select.order_by.is_empty() {
            let mut keyed = Vec::with_capacity(kept.len());
            for frame in kept {
                let env = Env::nested(&frame, outer);
                let keys = select
                    .order_by
                    .iter()
                    .map(|s| self.eval(&s.expression, &env))
                    .collect::<Result<Vec<_>, _>>()?;
                keyed.push((keys, frame));
            }
            keyed.sort_by(|(a, _), (b, _)| {
                for ((x, y), spec) in a.iter().zip(b).zip(&select.order_by) {
                    let ordering = x.total_cmp(y);
                    let ordering = if spec.descending {
                        ordering.reverse()
                    } else {
                        ordering
                    };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            });
            kept = keyed.into_iter().map(|(_, frame)| frame).collect();
        }

        let mut rows = Vec::with_capacity(kept.len());
        for (i, frame) in kept.iter().enumerate() {
            let env = Env::nested(frame, outer).with_row_number(i + 1);
            rows.push(
                select
                    .selections
                    .iter()
                    .map(|s| self.eval(&s.expression, &env))
                    .collect::<Result<Vec<_>, _>>()?,
            );
        }

        if select.distinct {
            let mut unique: Vec<Vec<Value>> = Vec::with_capacity(rows.len());
            for row in rows {
                if !unique.iter().any(|u| rows_equal(u, &row)) {
                    unique.push(row);
                }
            }
            rows = unique;
        }

        Ok(rows)
    }

    fn frames<'r>(
        &self,
        select: &'r SelectStatement,
        outer: Option<&'r Env<'r, 'r>>,
    ) -> Result<Vec<Vec<BoundRow<'r>>>, JdbcError>
    where
        'a: 'r,
    {
        let mut frames: Vec<Vec<BoundRow<'r>>> = vec![Vec::new()];

        for item in &select.from {
            let root: &'r Table = self.catalog.table(&item.root.table)?;
            let mut partial: Vec<Vec<BoundRow<'r>>> = root
                .rows
                .values()
                .map(|row| {
                    vec![BoundRow {
                        alias: &item.root.alias,
                        table: root,
                        row: Some(row),
                    }]
                })
                .collect();

            for join in &item.joins {
                let table: &'r Table = self.catalog.table(&join.table.table)?;
                let mut next = Vec::new();
                for frame in partial {
                    let mut matched = false;
                    for row in table.rows.values() {
                        let mut candidate = frame.clone();
                        candidate.push(BoundRow {
                            alias: &join.table.alias,
                            table,
                            row: Some(row),
                        });
                        let env = Env::nested(&candidate, outer);
                        if self.test(&join.on, &env)? == Some(true) {
                            matched = true;
                            next.push(candidate);
                        }
                    }
                    if !matched && join.kind == JoinKind::Left {
                        let mut candidate = frame;
                        candidate.push(BoundRow {
                            alias: &join.table.alias,
                            table,
                            row: None,
                        });
                        next.push(candidate);
                    }
                }
                partial = next;
            }

            frames = frames
                .into_iter()
                .flat_map(|frame| {
                    partial.iter().map(move |p| {
                        let mut combined = frame.clone();
                        combined.extend(p.iter().copied());
                        combined
                    })
                })
                .collect();
        }

        Ok(frames)
    }

    // ─────────────────────────────────────────
    // Expressions
    // ─────────────────────────────────────────

    pub(super) fn eval(&self, expression: &Expression, env: &Env<'_, '_>) -> Result<Value, JdbcError> {
        match expression {
            Expression::Column(column) => env.resolve(column),
            Expression::Literal(value) => Ok(value.clone()),
            Expression::Parameter(parameter) => self
                .params
                .values
                .get(parameter)
                .map(|v| (*v).clone())
                .ok_or(JdbcError::UnboundParameter {
                    parameter: *parameter,
                }),
            Expression::Binary { op, lhs, rhs } => {
                arithmetic(*op, self.eval(lhs, env)?, self.eval(rhs, env)?)
            }
            Expression::Negate(inner) => negate(self.eval(inner, env)?),
            Expression::Function { function, argument } => {
                scalar_function(*function, self.eval(argument, env)?)
            }
            Expression::Aggregate { .. } => Err(JdbcError::data(
                "aggregate function used outside of a projection",
            )),
            Expression::Subquery(select) => {
                let mut rows = self.select(select, Some(env))?;
                match rows.len() {
                    0 => Ok(Value::Null),
                    1 => Ok(rows.swap_remove(0).into_iter().next().unwrap_or_default()),
                    _ => Err(JdbcError::data(
                        "scalar subquery returned more than one row",
                    )),
                }
            }
            Expression::RowNumber => env
                .row_number()
                .map(|n| Value::Int(i64::try_from(n).unwrap_or(i64::MAX)))
                .ok_or_else(|| JdbcError::data("row_number() used outside of a projection")),
            Expression::NextValue(sequence) => self.catalog.next_value(sequence).map(Value::Int),
        }
    }

    fn eval_grouped<'r>(
        &self,
        expression: &Expression,
        frames: &[Vec<BoundRow<'r>>],
        outer: Option<&'r Env<'r, 'r>>,
    ) -> Result<Value, JdbcError> {
        match expression {
            Expression::Aggregate {
                function,
                argument,
                distinct,
            } => self.aggregate(*function, argument.as_deref(), *distinct, frames, outer),
            Expression::Binary { op, lhs, rhs } => arithmetic(
                *op,
                self.eval_grouped(lhs, frames, outer)?,
                self.eval_grouped(rhs, frames, outer)?,
            ),
            Expression::Negate(inner) => negate(self.eval_grouped(inner, frames, outer)?),
            Expression::Function { function, argument } => {
                scalar_function(*function, self.eval_grouped(argument, frames, outer)?)
            }
            Expression::Column(_) if frames.is_empty() => Ok(Value::Null),
            other => {
                let frame = frames.first().map_or(&[][..], Vec::as_slice);
                self.eval(other, &Env::nested(frame, outer))
            }
        }
    }

    fn aggregate<'r>(
        &self,
        function: AggregateFunction,
        argument: Option<&Expression>,
        distinct: bool,
        frames: &[Vec<BoundRow<'r>>],
        outer: Option<&'r Env<'r, 'r>>,
    ) -> Result<Value, JdbcError> {
        let mut values = Vec::with_capacity(frames.len());
        for frame in frames {
            let env = Env::nested(frame, outer);
            match argument {
                Some(argument) => {
                    let value = self.eval(argument, &env)?;
                    if !value.is_null() {
                        values.push(value);
                    }
                }
                None => values.push(Value::Int(1)),
            }
        }

        if distinct {
            values.sort_by(Value::total_cmp);
            values.dedup_by(|a, b| a.total_cmp(b) == Ordering::Equal);
        }

        Ok(match function {
            AggregateFunction::Count => Value::Int(i64::try_from(values.len()).unwrap_or(i64::MAX)),
            AggregateFunction::Sum => sum(&values)?,
            AggregateFunction::Avg => average(&values)?,
            AggregateFunction::Min => values
                .into_iter()
                .min_by(Value::total_cmp)
                .unwrap_or_default(),
            AggregateFunction::Max => values
                .into_iter()
                .max_by(Value::total_cmp)
                .unwrap_or_default(),
        })
    }

    // ─────────────────────────────────────────
    // Predicates
    // ─────────────────────────────────────────

    /// Three-valued evaluation; `None` is UNKNOWN.
    pub(super) fn test(&self, predicate: &Predicate, env: &Env<'_, '_>) -> Result<Option<bool>, JdbcError> {
        match predicate {
            Predicate::Comparison { lhs, op, rhs } => {
                compare(&self.eval(lhs, env)?, *op, &self.eval(rhs, env)?)
            }
            Predicate::And(parts) => {
                let mut result = Some(true);
                for part in parts {
                    match self.test(part, env)? {
                        Some(false) => return Ok(Some(false)),
                        None => result = None,
                        Some(true) => {}
                    }
                }
                Ok(result)
            }
            Predicate::Or(parts) => {
                let mut result = Some(false);
                for part in parts {
                    match self.test(part, env)? {
                        Some(true) => return Ok(Some(true)),
                        None => result = None,
                        Some(false) => {}
                    }
                }
                Ok(result)
            }
            Predicate::Not(inner) => Ok(self.test(inner, env)?.map(|b| !b)),
            Predicate::Null {
                expression,
                negated,
            } => Ok(Some(self.eval(expression, env)?.is_null() != *negated)),
            Predicate::Between {
                expression,
                lower,
                upper,
                negated,
            } => {
                let value = self.eval(expression, env)?;
                let above = compare(
                    &value,
                    ComparisonOperator::GreaterThanOrEqual,
                    &self.eval(lower, env)?,
                )?;
                let below = compare(
                    &value,
                    ComparisonOperator::LessThanOrEqual,
                    &self.eval(upper, env)?,
                )?;
                let inside = match (above, below) {
                    (Some(false), _) | (_, Some(false)) => Some(false),
                    (Some(true), Some(true)) => Some(true),
                    _ => None,
                };
                Ok(negate_if(inside, *negated))
            }
            Predicate::Like {
                expression,
                pattern,
                negated,
            } => {
                let value = self.eval(expression, env)?;
                let pattern = self.eval(pattern, env)?;
                let matched = match (&value, &pattern) {
                    (Value::Null, _) | (_, Value::Null) => None,
                    (Value::Text(text), Value::Text(pattern)) => Some(like_matches(text, pattern)),
                    _ => {
                        return Err(JdbcError::data(format!(
                            "like requires text operands, got {} and {}",
                            value.type_name(),
                            pattern.type_name()
                        )));
                    }
                };
                Ok(negate_if(matched, *negated))
            }
            Predicate::InList {
                expression,
                list,
                negated,
            } => {
                let value = self.eval(expression, env)?;
                let candidates = list
                    .iter()
                    .map(|e| self.eval(e, env))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(negate_if(contains(&value, &candidates)?, *negated))
            }
            Predicate::InSubquery {
                expression,
                subquery,
                negated,
            } => {
                let value = self.eval(expression, env)?;
                let candidates: Vec<Value> = self
                    .select(subquery, Some(env))?
                    .into_iter()
                    .map(|row| row.into_iter().next().unwrap_or_default())
                    .collect();
                Ok(negate_if(contains(&value, &candidates)?, *negated))
            }
            Predicate::Exists { subquery, negated } => {
                let found = !self.select(subquery, Some(env))?.is_empty();
                Ok(Some(found != *negated))
            }
        }
    }
}

// ─────────────────────────────────────────────
// Scalar helpers
// ─────────────────────────────────────────────

fn rows_equal(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b)
            .all(|(x, y)| x.total_cmp(y) == Ordering::Equal)
}

fn negate_if(value: Option<bool>, negated: bool) -> Option<bool> {
    value.map(|b| b != negated)
}

fn compare(
    lhs: &Value,
    op: ComparisonOperator,
    rhs: &Value,
) -> Result<Option<bool>, JdbcError> {
    if lhs.is_null() || rhs.is_null() {
        return Ok(None);
    }
    let ordering = lhs.sql_cmp(rhs).ok_or_else(|| {
        JdbcError::data(format!(
            "cannot compare {} with {}",
            lhs.type_name(),
            rhs.type_name()
        ))
    })?;

    Ok(Some(match op {
        ComparisonOperator::Equal => ordering == Ordering::Equal,
        ComparisonOperator::NotEqual => ordering != Ordering::Equal,
        ComparisonOperator::LessThan => ordering == Ordering::Less,
        ComparisonOperator::LessThanOrEqual => ordering != Ordering::Greater,
        ComparisonOperator::GreaterThan => ordering == Ordering::Greater,
        ComparisonOperator::GreaterThanOrEqual => ordering != Ordering::Less,
    }))
}

fn contains(value: &Value, candidates: &[Value]) -> Result<Option<bool>, JdbcError> {
    if value.is_null() {
        return Ok(None);
    }
    let mut unknown = false;
    for candidate in candidates {
        match compare(value, ComparisonOperator::Equal, candidate)? {
            Some(true) => return Ok(Some(true)),
            None => unknown = true,
            Some(false) => {}
        }
    }

    Ok(if unknown { None } else { Some(false) })
}

#[expect(clippy::cast_precision_loss)]
const fn as_f64(value: &Value) -> f64 {
    match value {
        Value::Int(v) => *v as f64,
        Value::Float(v) => *v,
        _ => 0.0,
    }
}

fn arithmetic(op: BinaryOperator, lhs: Value, rhs: Value) -> Result<Value, JdbcError> {
    if lhs.is_null() || rhs.is_null() {
        return Ok(Value::Null);
    }
    if op == BinaryOperator::Concat {
        return Ok(Value::Text(format!("{lhs}{rhs}")));
    }

    match (&lhs, &rhs) {
        (Value::Int(a), Value::Int(b)) => {
            let result = match op {
                BinaryOperator::Add => a.checked_add(*b),
                BinaryOperator::Subtract => a.checked_sub(*b),
                BinaryOperator::Multiply => a.checked_mul(*b),
                BinaryOperator::Divide if *b == 0 => {
                    return Err(JdbcError::data("division by zero"));
                }
                BinaryOperator::Divide => a.checked_div(*b),
                BinaryOperator::Concat => None,
            };
            result
                .map(Value::Int)
                .ok_or_else(|| JdbcError::data("numeric overflow"))
        }
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            let (a, b) = (as_f64(&lhs), as_f64(&rhs));
            let result = match op {
                BinaryOperator::Add => a + b,
                BinaryOperator::Subtract => a - b,
                BinaryOperator::Multiply => a * b,
                BinaryOperator::Divide if b == 0.0 => {
                    return Err(JdbcError::data("division by zero"));
                }
                BinaryOperator::Divide | BinaryOperator::Concat => a / b,
            };
            Ok(Value::Float(result))
        }
        _ => Err(JdbcError::data(format!(
            "cannot apply '{}' to {} and {}",
            op.sql(),
            lhs.type_name(),
            rhs.type_name()
        ))),
    }
}

fn negate(value: Value) -> Result<Value, JdbcError> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::Int(v) => v
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| JdbcError::data("numeric overflow")),
        Value::Float(v) => Ok(Value::Float(-v)),
        other => Err(JdbcError::data(format!(
            "cannot negate {}",
            other.type_name()
        ))),
    }
}

fn scalar_function(function: ScalarFunction, value: Value) -> Result<Value, JdbcError> {
    match (function, value) {
        (_, Value::Null) => Ok(Value::Null),
        (ScalarFunction::Lower, Value::Text(v)) => Ok(Value::Text(v.to_lowercase())),
        (ScalarFunction::Upper, Value::Text(v)) => Ok(Value::Text(v.to_uppercase())),
        (ScalarFunction::Length, Value::Text(v)) => Ok(Value::Int(
            i64::try_from(v.chars().count()).unwrap_or(i64::MAX),
        )),
        (ScalarFunction::Abs, Value::Int(v)) => v
            .checked_abs()
            .map(Value::Int)
            .ok_or_else(|| JdbcError::data("numeric overflow")),
        (ScalarFunction::Abs, Value::Float(v)) => Ok(Value::Float(v.abs())),
        (function, other) => Err(JdbcError::data(format!(
            "{}() does not accept {}",
            function.sql(),
            other.type_name()
        ))),
    }
}

fn sum(values: &[Value]) -> Result<Value, JdbcError> {
    if values.is_empty() {
        return Ok(Value::Null);
    }
    values
        .iter()
        .try_fold(Value::Int(0), |acc, v| arithmetic(BinaryOperator::Add, acc, v.clone()))
}

#[expect(clippy::cast_precision_loss)]
fn average(values: &[Value]) -> Result<Value, JdbcError> {
    if values.is_empty() {
        return Ok(Value::Null);
    }
    let total = sum(values)?;

    Ok(Value::Float(as_f64(&total) / values.len() as f64))
}

/// SQL `like` with `%` and `_` wildcards.
fn like_matches(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    let (mut t, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '_' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '%' {
            backtrack = Some((p, t));
            p += 1;
        } else if let Some((star, mark)) = backtrack {
            p = star + 1;
            t = mark + 1;
            backtrack = Some((star, mark + 1));
        } else {
            return false;
        }
    }
    while p < pattern.len() && pattern[p] == '%' {
        p += 1;
    }

    p == pattern.len()
}
