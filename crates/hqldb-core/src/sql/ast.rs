use crate::{jdbc::JdbcParameter, value::Value};
use std::fmt;

// ─────────────────────────────────────────────
// Operators
// ─────────────────────────────────────────────

///
/// ComparisonOperator
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ComparisonOperator {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

impl ComparisonOperator {
    #[must_use]
    pub const fn sql(self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::NotEqual => "<>",
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqual => ">=",
        }
    }
}

///
/// BinaryOperator
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Concat,
}

impl BinaryOperator {
    #[must_use]
    pub const fn sql(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Concat => "||",
        }
    }
}

///
/// AggregateFunction
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunction {
    #[must_use]
    pub const fn sql(self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Sum => "sum",
            Self::Avg => "avg",
            Self::Min => "min",
            Self::Max => "max",
        }
    }
}

///
/// ScalarFunction
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScalarFunction {
    Lower,
    Upper,
    Length,
    Abs,
}

impl ScalarFunction {
    #[must_use]
    pub const fn sql(self) -> &'static str {
        match self {
            Self::Lower => "lower",
            Self::Upper => "upper",
            Self::Length => "length",
            Self::Abs => "abs",
        }
    }
}

// ─────────────────────────────────────────────
// Expressions and predicates
// ─────────────────────────────────────────────

///
/// ColumnReference
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ColumnReference {
    pub qualifier: Option<String>,
    pub column: String,
}

impl ColumnReference {
    #[must_use]
    pub fn qualified(qualifier: &str, column: &str) -> Self {
        Self {
            qualifier: Some(qualifier.to_string()),
            column: column.to_string(),
        }
    }

    #[must_use]
    pub fn unqualified(column: &str) -> Self {
        Self {
            qualifier: None,
            column: column.to_string(),
        }
    }
}

impl fmt::Display for ColumnReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(q) => write!(f, "{q}.{}", self.column),
            None => write!(f, "{}", self.column),
        }
    }
}

///
/// Expression
///

#[derive(Clone, Debug, PartialEq)]
pub enum Expression {
    Column(ColumnReference),
    Literal(Value),
    Parameter(JdbcParameter),
    Binary {
        op: BinaryOperator,
        lhs: Box<Self>,
        rhs: Box<Self>,
    },
    Negate(Box<Self>),
    Function {
        function: ScalarFunction,
        argument: Box<Self>,
    },
    Aggregate {
        function: AggregateFunction,
        argument: Option<Box<Self>>,
        distinct: bool,
    },
    Subquery(Box<SelectStatement>),

    /// 1-based position of the produced row.
    RowNumber,
    NextValue(String),
}

impl Expression {
    #[must_use]
    pub fn column(qualifier: Option<&str>, column: &str) -> Self {
        Self::Column(ColumnReference {
            qualifier: qualifier.map(str::to_string),
            column: column.to_string(),
        })
    }

    #[must_use]
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    #[must_use]
    pub fn count_star() -> Self {
        Self::Aggregate {
            function: AggregateFunction::Count,
            argument: None,
            distinct: false,
        }
    }

    #[must_use]
    pub fn contains_aggregate(&self) -> bool {
        match self {
            Self::Aggregate { .. } => true,
            Self::Binary { lhs, rhs, .. } => lhs.contains_aggregate() || rhs.contains_aggregate(),
            Self::Negate(inner) | Self::Function { argument: inner, .. } => {
                inner.contains_aggregate()
            }
            _ => false,
        }
    }
}

///
/// Predicate
///

#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    Comparison {
        lhs: Expression,
        op: ComparisonOperator,
        rhs: Expression,
    },
    And(Vec<Self>),
    Or(Vec<Self>),
    Not(Box<Self>),
    Null {
        expression: Expression,
        negated: bool,
    },
    Between {
        expression: Expression,
        lower: Expression,
        upper: Expression,
        negated: bool,
    },
    Like {
        expression: Expression,
        pattern: Expression,
        negated: bool,
    },
    InList {
        expression: Expression,
        list: Vec<Expression>,
        negated: bool,
    },
    InSubquery {
        expression: Expression,
        subquery: Box<SelectStatement>,
        negated: bool,
    },
    Exists {
        subquery: Box<SelectStatement>,
        negated: bool,
    },
}

impl Predicate {
    #[must_use]
    pub const fn eq(lhs: Expression, rhs: Expression) -> Self {
        Self::Comparison {
            lhs,
            op: ComparisonOperator::Equal,
            rhs,
        }
    }

    /// Conjunction of `predicates`, flattening nested `And`s.
    #[must_use]
    pub fn all(predicates: impl IntoIterator<Item = Self>) -> Option<Self> {
        let mut flat = Vec::new();
        for predicate in predicates {
            match predicate {
                Self::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }

        match flat.len() {
            0 => None,
            1 => flat.pop(),
            _ => Some(Self::And(flat)),
        }
    }

    /// Add `restriction` to an optional existing predicate.
    #[must_use]
    pub fn restrict(existing: Option<Self>, restriction: Self) -> Self {
        match existing {
            Some(existing) => Self::And(vec![existing, restriction]),
            None => restriction,
        }
    }
}

// ─────────────────────────────────────────────
// Statements
// ─────────────────────────────────────────────

///
/// TableReference
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TableReference {
    pub table: String,
    pub alias: String,
}

///
/// JoinKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JoinKind {
    Inner,
    Left,
}

///
/// TableJoin
///

#[derive(Clone, Debug, PartialEq)]
pub struct TableJoin {
    pub kind: JoinKind,
    pub table: TableReference,
    pub on: Predicate,
}

///
/// FromItem
/// A root table and the tables joined to it; items are cross-joined.
///

#[derive(Clone, Debug, PartialEq)]
pub struct FromItem {
    pub root: TableReference,
    pub joins: Vec<TableJoin>,
}

///
/// SelectItem
///

#[derive(Clone, Debug, PartialEq)]
pub struct SelectItem {
    pub expression: Expression,
    pub alias: Option<String>,
}

///
/// SortSpecification
///

#[derive(Clone, Debug, PartialEq)]
pub struct SortSpecification {
    pub expression: Expression,
    pub descending: bool,
}

///
/// SelectStatement
///

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SelectStatement {
    pub distinct: bool,
    pub selections: Vec<SelectItem>,
    pub from: Vec<FromItem>,
    pub predicate: Option<Predicate>,
    pub order_by: Vec<SortSpecification>,
}

impl SelectStatement {
    /// `select <column> from <table> [where <predicate>]` without aliases.
    #[must_use]
    pub fn column_from(table: &str, column: &str, predicate: Option<Predicate>) -> Self {
        Self {
            selections: vec![SelectItem {
                expression: Expression::column(None, column),
                alias: None,
            }],
            from: vec![FromItem {
                root: TableReference {
                    table: table.to_string(),
                    alias: String::new(),
                },
                joins: Vec::new(),
            }],
            predicate,
            ..Self::default()
        }
    }
}

///
/// Assignment
///

#[derive(Clone, Debug, PartialEq)]
pub struct Assignment {
    pub column: String,
    pub value: Expression,
}

///
/// InsertSource
///

#[derive(Clone, Debug, PartialEq)]
pub enum InsertSource {
    Values(Vec<Vec<Expression>>),
    Select(Box<SelectStatement>),
}

///
/// InsertStatement
///

#[derive(Clone, Debug, PartialEq)]
pub struct InsertStatement {
    pub table: String,
    pub columns: Vec<String>,
    pub source: InsertSource,
}

///
/// UpdateStatement
/// Column references to the target table are unqualified.
///

#[derive(Clone, Debug, PartialEq)]
pub struct UpdateStatement {
    pub table: String,
    pub assignments: Vec<Assignment>,
    pub predicate: Option<Predicate>,
}

///
/// DeleteStatement
/// Column references to the target table are unqualified.
///

#[derive(Clone, Debug, PartialEq)]
pub struct DeleteStatement {
    pub table: String,
    pub predicate: Option<Predicate>,
}

///
/// TableKind
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum TableKind {
    #[default]
    Permanent,
    LocalTemporary,
    GlobalTemporary,
}

///
/// ColumnDefinition
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ColumnDefinition {
    pub name: String,
    pub nullable: bool,
}

impl ColumnDefinition {
    #[must_use]
    pub fn new(name: &str, nullable: bool) -> Self {
        Self {
            name: name.to_string(),
            nullable,
        }
    }
}

///
/// UniqueKey
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UniqueKey {
    pub name: String,
    pub columns: Vec<String>,
}

///
/// TableDefinition
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TableDefinition {
    pub name: String,
    pub kind: TableKind,
    pub columns: Vec<ColumnDefinition>,
    pub primary_key: Vec<String>,
    pub unique_keys: Vec<UniqueKey>,
}

impl TableDefinition {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn column(mut self, name: &str, nullable: bool) -> Self {
        self.columns.push(ColumnDefinition::new(name, nullable));
        self
    }

    #[must_use]
    pub fn primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = columns.iter().map(ToString::to_string).collect();
        self
    }

    #[must_use]
    pub fn unique_key(mut self, name: &str, columns: &[&str]) -> Self {
        self.unique_keys.push(UniqueKey {
            name: name.to_string(),
            columns: columns.iter().map(ToString::to_string).collect(),
        });
        self
    }

    #[must_use]
    pub const fn kind(mut self, kind: TableKind) -> Self {
        self.kind = kind;
        self
    }

    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }
}

///
/// Statement
///

#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    Select(SelectStatement),
    Insert(InsertStatement),
    Update(UpdateStatement),
    Delete(DeleteStatement),
    CreateTable(TableDefinition),
    DropTable { name: String, if_exists: bool },
}

impl Statement {
    #[must_use]
    pub const fn is_query(&self) -> bool {
        matches!(self, Self::Select(_))
    }
}
