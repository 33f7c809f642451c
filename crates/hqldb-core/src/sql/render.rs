use crate::{
    jdbc::JdbcParameter,
    sql::ast::{
        Expression, FromItem, InsertSource, JoinKind, Predicate, SelectStatement, Statement,
        TableDefinition, TableKind,
    },
};

///
/// RenderedSql
///
/// SQL text with `?` placeholders and the JDBC parameters in placeholder
/// order.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RenderedSql {
    pub sql: String,
    pub parameters: Vec<JdbcParameter>,
}

/// Render `statement`, prefixed by `/* comment */` when one is given.
#[must_use]
pub fn render(statement: &Statement, comment: Option<&str>) -> RenderedSql {
    let mut renderer = SqlAstRenderer::default();
    if let Some(comment) = comment {
        renderer.push("/* ");
        renderer.push(&comment.replace("*/", "* /"));
        renderer.push(" */ ");
    }
    renderer.statement(statement);

    RenderedSql {
        sql: renderer.sql,
        parameters: renderer.parameters,
    }
}

///
/// SqlAstRenderer
///

#[derive(Default)]
struct SqlAstRenderer {
    sql: String,
    parameters: Vec<JdbcParameter>,
}

impl SqlAstRenderer {
    fn push(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    fn statement(&mut self, statement: &Statement) {
        match statement {
            Statement::Select(select) => self.select(select),
            Statement::Insert(insert) => {
                self.push("insert into ");
                self.push(&insert.table);
                self.push(" (");
                self.push(&insert.columns.join(", "));
                self.push(") ");
                match &insert.source {
                    InsertSource::Values(rows) => {
                        self.push("values ");
                        for (i, row) in rows.iter().enumerate() {
                            if i > 0 {
                                self.push(", ");
                            }
                            self.push("(");
                            self.expression_list(row);
                            self.push(")");
                        }
                    }
                    InsertSource::Select(select) => self.select(select),
                }
            }
            Statement::Update(update) => {
                self.push("update ");
                self.push(&update.table);
                self.push(" set ");
                for (i, assignment) in update.assignments.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.push(&assignment.column);
                    self.push(" = ");
                    self.expression(&assignment.value);
                }
                self.where_clause(update.predicate.as_ref());
            }
            Statement::Delete(delete) => {
                self.push("delete from ");
                self.push(&delete.table);
                self.where_clause(delete.predicate.as_ref());
            }
            Statement::CreateTable(definition) => self.create_table(definition),
            Statement::DropTable { name, if_exists } => {
                self.push("drop table ");
                if *if_exists {
                    self.push("if exists ");
                }
                self.push(name);
            }
        }
    }

    fn create_table(&mut self, definition: &TableDefinition) {
        self.push(match definition.kind {
            TableKind::Permanent => "create table ",
            TableKind::LocalTemporary => "create local temporary table ",
            TableKind::GlobalTemporary => "create global temporary table ",
        });
        self.push(&definition.name);
        self.push(" (");

        let mut parts: Vec<String> = definition
            .columns
            .iter()
            .map(|c| {
                if c.nullable {
                    c.name.clone()
                } else {
                    format!("{} not null", c.name)
                }
            })
            .collect();
        if !definition.primary_key.is_empty() {
            parts.push(format!("primary key ({})", definition.primary_key.join(", ")));
        }
        for key in &definition.unique_keys {
            parts.push(format!(
                "constraint {} unique ({})",
                key.name,
                key.columns.join(", ")
            ));
        }

        self.push(&parts.join(", "));
        self.push(")");
    }

    fn select(&mut self, select: &SelectStatement) {
        self.push("select ");
        if select.distinct {
            self.push("distinct ");
        }
        for (i, item) in select.selections.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.expression(&item.expression);
            if let Some(alias) = &item.alias {
                self.push(" as ");
                self.push(alias);
            }
        }

        if !select.from.is_empty() {
            self.push(" from ");
            for (i, item) in select.from.iter().enumerate() {
                if i > 0 {
                    self.push(", ");
                }
                self.from_item(item);
            }
        }

        self.where_clause(select.predicate.as_ref());

        if !select.order_by.is_empty() {
            self.push(" order by ");
            for (i, sort) in select.order_by.iter().enumerate() {
                if i > 0 {
                    self.push(", ");
                }
                self.expression(&sort.expression);
                if sort.descending {
                    self.push(" desc");
                }
            }
        }
    }

    fn from_item(&mut self, item: &FromItem) {
        self.push(&item.root.table);
        if !item.root.alias.is_empty() {
            self.push(" ");
            self.push(&item.root.alias);
        }
        for join in &item.joins {
            self.push(match join.kind {
                JoinKind::Inner => " join ",
                JoinKind::Left => " left join ",
            });
            self.push(&join.table.table);
            self.push(" ");
            self.push(&join.table.alias);
            self.push(" on ");
            self.predicate(&join.on);
        }
    }

    fn where_clause(&mut self, predicate: Option<&Predicate>) {
        if let Some(predicate) = predicate {
            self.push(" where ");
            self.predicate(predicate);
        }
    }

    fn expression_list(&mut self, expressions: &[Expression]) {
        for (i, expression) in expressions.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.expression(expression);
        }
    }

    fn expression(&mut self, expression: &Expression) {
        match expression {
            Expression::Column(column) => self.push(&column.to_string()),
            Expression::Literal(value) => self.push(&value.to_sql_literal()),
            Expression::Parameter(parameter) => {
                self.parameters.push(*parameter);
                self.push("?");
            }
            Expression::Binary { op, lhs, rhs } => {
                self.operand(lhs);
                self.push(" ");
                self.push(op.sql());
                self.push(" ");
                self.operand(rhs);
            }
            Expression::Negate(inner) => {
                self.push("-");
                self.operand(inner);
            }
            Expression::Function { function, argument } => {
                self.push(function.sql());
                self.push("(");
                self.expression(argument);
                self.push(")");
            }
            Expression::Aggregate {
                function,
                argument,
                distinct,
            } => {
                self.push(function.sql());
                self.push("(");
                if *distinct {
                    self.push("distinct ");
                }
                match argument {
                    Some(argument) => self.expression(argument),
                    None => self.push("*"),
                }
                self.push(")");
            }
            Expression::Subquery(select) => {
                self.push("(");
                self.select(select);
                self.push(")");
            }
            Expression::RowNumber => self.push("row_number() over ()"),
            Expression::NextValue(sequence) => {
                self.push("next value for ");
                self.push(sequence);
            }
        }
    }

    fn operand(&mut self, expression: &Expression) {
        if matches!(expression, Expression::Binary { .. }) {
            self.push("(");
            self.expression(expression);
            self.push(")");
        } else {
            self.expression(expression);
        }
    }

    fn predicate(&mut self, predicate: &Predicate) {
        match predicate {
            Predicate::Comparison { lhs, op, rhs } => {
                self.expression(lhs);
                self.push(" ");
                self.push(op.sql());
                self.push(" ");
                self.expression(rhs);
            }
            Predicate::And(parts) => self.junction(parts, " and "),
            Predicate::Or(parts) => self.junction(parts, " or "),
            Predicate::Not(inner) => {
                self.push("not (");
                self.predicate(inner);
                self.push(")");
            }
            Predicate::Null {
                expression,
                negated,
            } => {
                self.expression(expression);
                self.push(if *negated { " is not null" } else { " is null" });
            }
            Predicate::Between {
                expression,
                lower,
                upper,
                negated,
            } => {
                self.expression(expression);
                self.push(if *negated { " not between " } else { " between " });
                self.expression(lower);
                self.push(" and ");
                self.expression(upper);
            }
            Predicate::Like {
                expression,
                pattern,
                negated,
            } => {
                self.expression(expression);
                self.push(if *negated { " not like " } else { " like " });
                self.expression(pattern);
            }
            Predicate::InList {
                expression,
                list,
                negated,
            } => {
                self.expression(expression);
                self.push(if *negated { " not in (" } else { " in (" });
                self.expression_list(list);
                self.push(")");
            }
            Predicate::InSubquery {
                expression,
                subquery,
                negated,
            } => {
                self.expression(expression);
                self.push(if *negated { " not in (" } else { " in (" });
                self.select(subquery);
                self.push(")");
            }
            Predicate::Exists { subquery, negated } => {
                self.push(if *negated { "not exists (" } else { "exists (" });
                self.select(subquery);
                self.push(")");
            }
        }
    }

    fn junction(&mut self, parts: &[Predicate], separator: &str) {
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                self.push(separator);
            }
            let nested = matches!(part, Predicate::And(_) | Predicate::Or(_));
            if nested {
                self.push("(");
            }
            self.predicate(part);
            if nested {
                self.push(")");
            }
        }
    }
}
