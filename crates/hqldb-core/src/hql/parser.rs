use crate::{
    error::Error,
    hql::{
        CollectionProperty, SyntaxError, is_any_collection_property,
        lexer::{Token, TokenKind, tokenize},
    },
    model::{MappingError, Metamodel},
    sql::{AggregateFunction, BinaryOperator, ComparisonOperator, ScalarFunction},
    sqm::{
        DomainParameterXref, QueryParameter, SqmAssignment, SqmDeleteStatement, SqmExpression,
        SqmInsertSource, SqmInsertStatement, SqmInstantiation, SqmPath, SqmPredicate, SqmRoot,
        SqmSelectStatement, SqmSelection, SqmSortSpecification, SqmStatement, SqmUpdateStatement,
    },
    value::Value,
};

/// Words that end an optional alias position.
const RESERVED: [&str; 30] = [
    "and", "as", "asc", "between", "by", "desc", "empty", "from", "group", "having", "in",
    "inner", "into", "is", "join", "left", "like", "member", "not", "of", "on", "or", "order",
    "outer", "select", "set", "union", "values", "where", "with",
];

///
/// ParsedQuery
///

#[derive(Clone, Debug, PartialEq)]
pub struct ParsedQuery {
    pub statement: SqmStatement,
    pub parameters: DomainParameterXref,
}

/// Parse `query` into an SQM statement, resolving entity names through the
/// metamodel's imports and paths against the statement's roots.
pub fn parse(query: &str, metamodel: &Metamodel) -> Result<ParsedQuery, Error> {
    let mut parser = Parser {
        query,
        tokens: tokenize(query)?,
        position: 0,
        metamodel,
        xref: DomainParameterXref::new(),
        roots: Vec::new(),
        implicit_aliases: 0,
    };

    let statement = parser.statement()?;
    if parser.peek().kind != TokenKind::End {
        return Err(parser.unexpected());
    }

    Ok(ParsedQuery {
        statement,
        parameters: parser.xref,
    })
}

///
/// Parser
///

struct Parser<'a> {
    query: &'a str,
    tokens: Vec<Token>,
    position: usize,
    metamodel: &'a Metamodel,
    xref: DomainParameterXref,

    /// Roots in scope for path resolution.
    roots: Vec<SqmRoot>,
    implicit_aliases: usize,
}

impl Parser<'_> {
    // ─────────────────────────────────────────
    // Token plumbing
    // ─────────────────────────────────────────

    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.position + offset).min(last)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.position < self.tokens.len() - 1 {
            self.position += 1;
        }
        token
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        self.peek().is_keyword(keyword)
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        let found = self.at_keyword(keyword);
        if found {
            self.advance();
        }
        found
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), Error> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.syntax(format!(
                "expecting '{keyword}', found '{}'",
                self.peek().kind
            )))
        }
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        let found = &self.peek().kind == kind;
        if found {
            self.advance();
        }
        found
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<(), Error> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.syntax(format!(
                "expecting '{kind}', found '{}'",
                self.peek().kind
            )))
        }
    }

    fn identifier(&mut self) -> Result<String, Error> {
        match &self.peek().kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected()),
        }
    }

    fn dotted_name(&mut self) -> Result<String, Error> {
        let mut name = self.identifier()?;
        while self.eat(&TokenKind::Dot) {
            name.push('.');
            name.push_str(&self.identifier()?);
        }

        Ok(name)
    }

    /// An alias in an optional position: after `as`, or any identifier that
    /// is not a reserved word.
    fn optional_alias(&mut self) -> Result<Option<String>, Error> {
        if self.eat_keyword("as") {
            return self.identifier().map(Some);
        }
        let is_alias = matches!(
            &self.peek().kind,
            TokenKind::Identifier(name) if !RESERVED.contains(&name.to_ascii_lowercase().as_str())
        );
        if is_alias {
            return self.identifier().map(Some);
        }

        Ok(None)
    }

    fn syntax(&self, message: impl Into<String>) -> Error {
        SyntaxError::new(message, self.peek().column, self.query).into()
    }

    fn unexpected(&self) -> Error {
        self.syntax(format!("unexpected token: {}", self.peek().kind))
    }

    fn semantic(&self, message: impl Into<String>) -> Error {
        Error::semantic(message, self.query)
    }

    // ─────────────────────────────────────────
    // Statements
    // ─────────────────────────────────────────

    fn statement(&mut self) -> Result<SqmStatement, Error> {
        if self.at_keyword("select") || self.at_keyword("from") {
            return self.select_statement().map(SqmStatement::Select);
        }
        if self.eat_keyword("update") {
            return self.update_statement().map(SqmStatement::Update);
        }
        if self.eat_keyword("delete") {
            return self.delete_statement().map(SqmStatement::Delete);
        }
        if self.eat_keyword("insert") {
            return self.insert_statement().map(SqmStatement::Insert);
        }

        Err(self.unexpected())
    }

    fn select_statement(&mut self) -> Result<SqmSelectStatement, Error> {
        let outer = std::mem::take(&mut self.roots);
        let result = self.select_body();
        self.roots = outer;

        result
    }

    fn select_body(&mut self) -> Result<SqmSelectStatement, Error> {
        let mut select = SqmSelectStatement::default();

        // the from clause is read first so the select clause can resolve paths
        let select_start = self.eat_keyword("select").then_some(self.position);
        if select_start.is_some() {
            self.position = self.find_from_clause()?;
        }
        self.expect_keyword("from")?;
        select.roots = self.from_clause()?;
        self.roots.clone_from(&select.roots);
        let after_from = self.position;

        match select_start {
            Some(start) => {
                self.position = start;
                self.select_clause(&mut select)?;
                if !self.at_keyword("from") {
                    return Err(self.unexpected());
                }
                self.position = after_from;
            }
            None => {
                select.selections = select
                    .roots
                    .iter()
                    .map(|root| SqmSelection {
                        expression: SqmExpression::Entity(root.alias.clone()),
                        alias: None,
                    })
                    .collect();
            }
        }

        if self.eat_keyword("where") {
            select.predicate = Some(self.predicate()?);
        }
        if self.eat_keyword("order") {
            self.expect_keyword("by")?;
            loop {
                let expression = self.expression()?;
                let descending = if self.eat_keyword("desc") {
                    true
                } else {
                    self.eat_keyword("asc");
                    false
                };
                select.order_by.push(SqmSortSpecification {
                    expression,
                    descending,
                });
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }

        Ok(select)
    }

    fn find_from_clause(&self) -> Result<usize, Error> {
        let mut depth = 0usize;
        for (i, token) in self.tokens.iter().enumerate().skip(self.position) {
            match &token.kind {
                TokenKind::LeftParen => depth += 1,
                TokenKind::RightParen => depth = depth.saturating_sub(1),
                TokenKind::End => break,
                _ if depth == 0 && token.is_keyword("from") => return Ok(i),
                _ => {}
            }
        }

        Err(self.syntax("select clause without a from clause"))
    }

    fn select_clause(&mut self, select: &mut SqmSelectStatement) -> Result<(), Error> {
        select.distinct = self.eat_keyword("distinct");

        if self.eat_keyword("new") {
            let at_paren = matches!(self.peek_at(1).kind, TokenKind::LeftParen);
            let instantiation = if at_paren && self.eat_keyword("map") {
                SqmInstantiation::Map
            } else if at_paren && self.eat_keyword("list") {
                SqmInstantiation::List
            } else {
                SqmInstantiation::Constructor(self.dotted_name()?)
            };
            self.expect(&TokenKind::LeftParen)?;
            select.selections = self.selection_list()?;
            self.expect(&TokenKind::RightParen)?;
            select.instantiation = Some(instantiation);
        } else {
            select.selections = self.selection_list()?;
        }

        Ok(())
    }

    fn selection_list(&mut self) -> Result<Vec<SqmSelection>, Error> {
        let mut selections = Vec::new();
        loop {
            let expression = self.expression()?;
            let alias = self.optional_alias()?;
            selections.push(SqmSelection { expression, alias });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }

        Ok(selections)
    }

    fn from_clause(&mut self) -> Result<Vec<SqmRoot>, Error> {
        let mut roots = vec![self.root()?];
        while self.eat(&TokenKind::Comma) {
            roots.push(self.root()?);
        }

        for (i, root) in roots.iter().enumerate() {
            if roots[..i].iter().any(|r| r.alias == root.alias) {
                return Err(self.semantic(format!("duplicate alias '{}'", root.alias)));
            }
        }

        Ok(roots)
    }

    fn root(&mut self) -> Result<SqmRoot, Error> {
        let name = self.dotted_name()?;
        let entity = self.resolve_type(&name)?;
        let alias = self.optional_alias()?;

        Ok(self.make_root(entity, alias))
    }

    fn make_root(&mut self, entity: String, alias: Option<String>) -> SqmRoot {
        match alias {
            Some(alias) => SqmRoot {
                entity,
                alias,
                implicit_alias: false,
            },
            None => {
                let alias = format!("_root{}", self.implicit_aliases);
                self.implicit_aliases += 1;
                SqmRoot {
                    entity,
                    alias,
                    implicit_alias: true,
                }
            }
        }
    }

    fn resolve_type(&self, name: &str) -> Result<String, Error> {
        self.metamodel
            .imported_type(name)
            .map(str::to_string)
            .ok_or_else(|| {
                MappingError::UnknownEntity {
                    entity: name.to_string(),
                }
                .into()
            })
    }

    fn mutation_target(&mut self) -> Result<SqmRoot, Error> {
        let root = self.root()?;
        self.roots = vec![root.clone()];

        Ok(root)
    }

    fn update_statement(&mut self) -> Result<SqmUpdateStatement, Error> {
        let versioned = self.eat_keyword("versioned");
        let target = self.mutation_target()?;
        self.expect_keyword("set")?;

        let mut assignments = Vec::new();
        loop {
            let attribute = self.assignment_target(&target)?;
            self.expect(&TokenKind::Equal)?;
            let value = self.expression()?;
            assignments.push(SqmAssignment { attribute, value });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }

        let predicate = self.where_clause()?;

        Ok(SqmUpdateStatement {
            target,
            versioned,
            assignments,
            predicate,
        })
    }

    fn assignment_target(&mut self, target: &SqmRoot) -> Result<String, Error> {
        let first = self.identifier()?;
        if !self.eat(&TokenKind::Dot) {
            return Ok(first);
        }
        let attribute = self.identifier()?;
        if first != target.alias || self.at_dot() {
            return Err(self.semantic(format!(
                "assignment target must be an attribute of '{}'",
                target.alias
            )));
        }

        Ok(attribute)
    }

    fn at_dot(&self) -> bool {
        self.peek().kind == TokenKind::Dot
    }

    fn delete_statement(&mut self) -> Result<SqmDeleteStatement, Error> {
        self.eat_keyword("from");
        let target = self.mutation_target()?;
        let predicate = self.where_clause()?;

        Ok(SqmDeleteStatement { target, predicate })
    }

    fn insert_statement(&mut self) -> Result<SqmInsertStatement, Error> {
        self.expect_keyword("into")?;
        let name = self.dotted_name()?;
        let entity = self.resolve_type(&name)?;
        let target = self.make_root(entity, None);

        self.expect(&TokenKind::LeftParen)?;
        let mut attributes = vec![self.identifier()?];
        while self.eat(&TokenKind::Comma) {
            attributes.push(self.identifier()?);
        }
        self.expect(&TokenKind::RightParen)?;

        self.roots.clear();
        let source = if self.eat_keyword("values") {
            let mut rows = Vec::new();
            loop {
                self.expect(&TokenKind::LeftParen)?;
                let mut row = vec![self.expression()?];
                while self.eat(&TokenKind::Comma) {
                    row.push(self.expression()?);
                }
                self.expect(&TokenKind::RightParen)?;
                if row.len() != attributes.len() {
                    return Err(self.semantic(format!(
                        "insert expects {} values per row, got {}",
                        attributes.len(),
                        row.len()
                    )));
                }
                rows.push(row);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            SqmInsertSource::Values(rows)
        } else if self.at_keyword("select") || self.at_keyword("from") {
            let select = self.select_statement()?;
            if select.selections.len() != attributes.len() {
                return Err(self.semantic(format!(
                    "insert expects {} selections, got {}",
                    attributes.len(),
                    select.selections.len()
                )));
            }
            SqmInsertSource::Select(Box::new(select))
        } else {
            return Err(self.unexpected());
        };

        Ok(SqmInsertStatement {
            target,
            attributes,
            source,
        })
    }

    fn where_clause(&mut self) -> Result<Option<SqmPredicate>, Error> {
        if self.eat_keyword("where") {
            self.predicate().map(Some)
        } else {
            Ok(None)
        }
    }

    // ─────────────────────────────────────────
    // Predicates
    // ─────────────────────────────────────────

    fn predicate(&mut self) -> Result<SqmPredicate, Error> {
        let mut parts = vec![self.and_predicate()?];
        while self.eat_keyword("or") {
            parts.push(self.and_predicate()?);
        }

        Ok(junction(parts, SqmPredicate::Or))
    }

    fn and_predicate(&mut self) -> Result<SqmPredicate, Error> {
        let mut parts = vec![self.not_predicate()?];
        while self.eat_keyword("and") {
            parts.push(self.not_predicate()?);
        }

        Ok(junction(parts, SqmPredicate::And))
    }

    fn not_predicate(&mut self) -> Result<SqmPredicate, Error> {
        if self.eat_keyword("not") {
            return Ok(SqmPredicate::Not(Box::new(self.not_predicate()?)));
        }

        self.primary_predicate()
    }

    fn primary_predicate(&mut self) -> Result<SqmPredicate, Error> {
        if self.peek().kind == TokenKind::LeftParen {
            // `(` opens either a nested predicate or an expression
            let saved = (self.position, self.xref.clone());
            self.advance();
            if let Ok(predicate) = self.predicate()
                && self.eat(&TokenKind::RightParen)
                && !self.at_expression_continuation()
            {
                return Ok(predicate);
            }
            (self.position, self.xref) = saved;
        }

        self.simple_predicate()
    }

    fn at_expression_continuation(&self) -> bool {
        comparison_operator(&self.peek().kind).is_some()
            || matches!(
                self.peek().kind,
                TokenKind::Plus
                    | TokenKind::Minus
                    | TokenKind::Star
                    | TokenKind::Slash
                    | TokenKind::Concat
            )
            || ["is", "between", "like", "in", "not", "member"]
                .iter()
                .any(|k| self.at_keyword(k))
    }

    fn simple_predicate(&mut self) -> Result<SqmPredicate, Error> {
        let lhs = self.expression()?;

        if self.eat_keyword("is") {
            let negated = self.eat_keyword("not");
            if self.eat_keyword("null") {
                return Ok(SqmPredicate::Null {
                    expression: lhs,
                    negated,
                });
            }
            if self.eat_keyword("empty") {
                let SqmExpression::Path(collection) = lhs else {
                    return Err(self.semantic("is empty requires a collection-valued path"));
                };
                return Ok(SqmPredicate::EmptyCollection {
                    collection,
                    negated,
                });
            }
            return Err(self.unexpected());
        }

        let negated = self.eat_keyword("not");
        if self.eat_keyword("between") {
            let lower = self.expression()?;
            self.expect_keyword("and")?;
            let upper = self.expression()?;
            return Ok(SqmPredicate::Between {
                expression: lhs,
                lower,
                upper,
                negated,
            });
        }
        if self.eat_keyword("like") {
            let pattern = self.expression()?;
            return Ok(SqmPredicate::Like {
                expression: lhs,
                pattern,
                negated,
            });
        }
        if self.eat_keyword("in") {
            return self.in_predicate(lhs, negated);
        }
        if self.eat_keyword("member") {
            self.eat_keyword("of");
            let collection = self.collection_path()?;
            return Ok(SqmPredicate::InCollection {
                expression: lhs,
                collection,
                property: CollectionProperty::Elements,
                negated,
            });
        }
        if negated {
            return Err(self.unexpected());
        }

        let Some(op) = comparison_operator(&self.peek().kind) else {
            return Err(self.syntax(format!(
                "expecting a predicate, found '{}'",
                self.peek().kind
            )));
        };
        self.advance();
        let rhs = self.expression()?;

        Ok(SqmPredicate::Comparison { lhs, op, rhs })
    }

    fn in_predicate(&mut self, lhs: SqmExpression, negated: bool) -> Result<SqmPredicate, Error> {
        let property = ["elements", "indices"]
            .into_iter()
            .find(|k| self.at_keyword(k))
            .and_then(CollectionProperty::from_name);
        if let Some(property) = property
            && self.peek_at(1).kind == TokenKind::LeftParen
        {
            self.advance();
            self.advance();
            let collection = self.collection_path()?;
            self.expect(&TokenKind::RightParen)?;
            return Ok(SqmPredicate::InCollection {
                expression: lhs,
                collection,
                property,
                negated,
            });
        }

        if is_parameter(&self.peek().kind) {
            let list = vec![self.parameter(true)?];
            return Ok(SqmPredicate::InList {
                expression: lhs,
                list,
                negated,
            });
        }

        self.expect(&TokenKind::LeftParen)?;
        let mut list = vec![self.in_list_item()?];
        while self.eat(&TokenKind::Comma) {
            list.push(self.in_list_item()?);
        }
        self.expect(&TokenKind::RightParen)?;

        Ok(SqmPredicate::InList {
            expression: lhs,
            list,
            negated,
        })
    }

    fn in_list_item(&mut self) -> Result<SqmExpression, Error> {
        let standalone = matches!(
            self.peek_at(1).kind,
            TokenKind::Comma | TokenKind::RightParen
        );
        if standalone && is_parameter(&self.peek().kind) {
            return self.parameter(true);
        }

        self.expression()
    }

    // ─────────────────────────────────────────
    // Expressions
    // ─────────────────────────────────────────

    fn expression(&mut self) -> Result<SqmExpression, Error> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOperator::Add,
                TokenKind::Minus => BinaryOperator::Subtract,
                TokenKind::Concat => BinaryOperator::Concat,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.multiplicative()?;
            lhs = SqmExpression::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn multiplicative(&mut self) -> Result<SqmExpression, Error> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOperator::Multiply,
                TokenKind::Slash => BinaryOperator::Divide,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.unary()?;
            lhs = SqmExpression::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn unary(&mut self) -> Result<SqmExpression, Error> {
        if self.eat(&TokenKind::Minus) {
            return Ok(match self.unary()? {
                SqmExpression::Literal(Value::Int(v)) => SqmExpression::Literal(Value::Int(-v)),
                SqmExpression::Literal(Value::Float(v)) => SqmExpression::Literal(Value::Float(-v)),
                other => SqmExpression::Negate(Box::new(other)),
            });
        }
        if self.eat(&TokenKind::Plus) {
            return self.unary();
        }

        self.primary()
    }

    fn primary(&mut self) -> Result<SqmExpression, Error> {
        match self.peek().kind.clone() {
            TokenKind::Integer(v) => {
                self.advance();
                Ok(SqmExpression::Literal(Value::Int(v)))
            }
            TokenKind::Decimal(v) => {
                self.advance();
                Ok(SqmExpression::Literal(Value::Float(v)))
            }
            TokenKind::Text(v) => {
                self.advance();
                Ok(SqmExpression::Literal(Value::Text(v)))
            }
            TokenKind::NamedParameter(_) | TokenKind::PositionalParameter(_) => {
                self.parameter(false)
            }
            TokenKind::LeftParen => {
                self.advance();
                let expression = self.expression()?;
                self.expect(&TokenKind::RightParen)?;
                Ok(expression)
            }
            TokenKind::Identifier(name) => {
                if self.peek_at(1).kind == TokenKind::LeftParen {
                    return self.function_call(&name);
                }
                if self.peek_at(1).kind != TokenKind::Dot {
                    let literal = match name.to_ascii_lowercase().as_str() {
                        "true" => Some(Value::Bool(true)),
                        "false" => Some(Value::Bool(false)),
                        "null" => Some(Value::Null),
                        _ => None,
                    };
                    if let Some(literal) = literal {
                        self.advance();
                        return Ok(SqmExpression::Literal(literal));
                    }
                }
                self.path_expression()
            }
            _ => Err(self.unexpected()),
        }
    }

    fn parameter(&mut self, allow_multi_valued: bool) -> Result<SqmExpression, Error> {
        let parameter = match self.peek().kind.clone() {
            TokenKind::NamedParameter(name) => QueryParameter::Named(name),
            TokenKind::PositionalParameter(position) => QueryParameter::Positional(position),
            _ => return Err(self.unexpected()),
        };
        self.advance();
        let id = self.xref.register(parameter, allow_multi_valued)?;

        Ok(SqmExpression::Parameter(id))
    }

    fn function_call(&mut self, name: &str) -> Result<SqmExpression, Error> {
        let lowered = name.to_ascii_lowercase();
        self.advance();
        self.expect(&TokenKind::LeftParen)?;

        let aggregate = match lowered.as_str() {
            "count" => Some(AggregateFunction::Count),
            "sum" => Some(AggregateFunction::Sum),
            "avg" => Some(AggregateFunction::Avg),
            "min" => Some(AggregateFunction::Min),
            "max" => Some(AggregateFunction::Max),
            _ => None,
        };
        let scalar = match lowered.as_str() {
            "lower" => Some(ScalarFunction::Lower),
            "upper" => Some(ScalarFunction::Upper),
            "length" => Some(ScalarFunction::Length),
            "abs" => Some(ScalarFunction::Abs),
            _ => None,
        };

        let expression = if let Some(function) = aggregate {
            if function == AggregateFunction::Count && self.eat(&TokenKind::Star) {
                SqmExpression::Aggregate {
                    function,
                    argument: None,
                    distinct: false,
                }
            } else {
                let distinct = self.eat_keyword("distinct");
                SqmExpression::Aggregate {
                    function,
                    argument: Some(Box::new(self.expression()?)),
                    distinct,
                }
            }
        } else if let Some(function) = scalar {
            SqmExpression::Function {
                function,
                argument: Box::new(self.expression()?),
            }
        } else if let Some(property) = CollectionProperty::from_name(name)
            && property.is_scalar()
        {
            SqmExpression::CollectionProperty {
                collection: self.collection_path()?,
                property,
            }
        } else {
            return Err(self.semantic(format!("unknown function '{name}'")));
        };

        self.expect(&TokenKind::RightParen)?;

        Ok(expression)
    }

    fn collection_path(&mut self) -> Result<SqmPath, Error> {
        match self.path_expression()? {
            SqmExpression::Path(path) => Ok(path),
            _ => Err(self.semantic("expecting a collection-valued path")),
        }
    }

    fn path_expression(&mut self) -> Result<SqmExpression, Error> {
        let mut segments = vec![self.identifier()?];
        while self.eat(&TokenKind::Dot) {
            segments.push(self.identifier()?);
        }

        self.resolve_path(&segments)
    }

    fn resolve_path(&self, segments: &[String]) -> Result<SqmExpression, Error> {
        let written = segments.join(".");
        let (alias, rest) = if let Some(root) = self.roots.iter().find(|r| r.alias == segments[0]) {
            (root.alias.as_str(), &segments[1..])
        } else if let [root] = self.roots.as_slice() {
            (root.alias.as_str(), segments)
        } else if self.roots.is_empty() {
            return Err(self.semantic(format!(
                "path '{written}' cannot be resolved outside a from clause"
            )));
        } else {
            return Err(self.semantic(format!(
                "unqualified reference '{written}' is ambiguous across roots"
            )));
        };

        match rest {
            [] => Ok(SqmExpression::Entity(alias.to_string())),
            [attribute] => Ok(SqmExpression::Path(SqmPath::new(alias, attribute))),
            [attribute, property] if is_any_collection_property(property) => {
                match CollectionProperty::from_name(property) {
                    Some(property) if property.is_scalar() => {
                        Ok(SqmExpression::CollectionProperty {
                            collection: SqmPath::new(alias, attribute),
                            property,
                        })
                    }
                    _ => Err(self.semantic(format!(
                        "'{property}' cannot be used as a value in '{written}'"
                    ))),
                }
            }
            _ => Err(self.semantic(format!("could not resolve path '{written}'"))),
        }
    }
}

fn junction(mut parts: Vec<SqmPredicate>, combine: fn(Vec<SqmPredicate>) -> SqmPredicate) -> SqmPredicate {
    if parts.len() == 1 {
        parts.remove(0)
    } else {
        combine(parts)
    }
}

const fn is_parameter(kind: &TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::NamedParameter(_) | TokenKind::PositionalParameter(_)
    )
}

const fn comparison_operator(kind: &TokenKind) -> Option<ComparisonOperator> {
    match kind {
        TokenKind::Equal => Some(ComparisonOperator::Equal),
        TokenKind::NotEqual => Some(ComparisonOperator::NotEqual),
        TokenKind::Less => Some(ComparisonOperator::LessThan),
        TokenKind::LessEqual => Some(ComparisonOperator::LessThanOrEqual),
        TokenKind::Greater => Some(ComparisonOperator::GreaterThan),
        TokenKind::GreaterEqual => Some(ComparisonOperator::GreaterThanOrEqual),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    fn parse_ok(query: &str) -> ParsedQuery {
        parse(query, &test_support::metamodel()).expect("parse should succeed")
    }

    fn select(query: &str) -> SqmSelectStatement {
        match parse_ok(query).statement {
            SqmStatement::Select(select) => select,
            other => panic!("expected a select, got {other:?}"),
        }
    }

    #[test]
    fn select_clause_resolves_against_the_later_from_clause() {
        let select = select("select f.name, f.duration as minutes from Flight f where f.id = :id");

        assert_eq!(select.roots[0].entity, "Flight");
        assert_eq!(
            select.selections[0].expression,
            SqmExpression::Path(SqmPath::new("f", "name"))
        );
        assert_eq!(select.selections[1].alias.as_deref(), Some("minutes"));
        assert!(matches!(
            select.predicate,
            Some(SqmPredicate::Comparison { op: ComparisonOperator::Equal, .. })
        ));
    }

    #[test]
    fn bare_from_selects_each_root() {
        let select = select("from Flight");

        assert!(select.roots[0].implicit_alias);
        assert_eq!(
            select.selections,
            vec![SqmSelection {
                expression: SqmExpression::Entity(select.roots[0].alias.clone()),
                alias: None,
            }]
        );
    }

    #[test]
    fn unqualified_paths_bind_to_the_single_root() {
        let select = select("from Flight where duration > 60 and name like 'AF%'");

        let Some(SqmPredicate::And(parts)) = select.predicate else {
            panic!("expected a conjunction");
        };
        assert_eq!(parts.len(), 2);
    }

    #[test]
    fn parenthesized_predicates_and_expressions_both_parse() {
        let select = select("from Flight f where (f.duration + 10) > 60 or (f.name = 'x' and f.id = 1)");

        let Some(SqmPredicate::Or(parts)) = select.predicate else {
            panic!("expected a disjunction");
        };
        assert!(matches!(parts[0], SqmPredicate::Comparison { .. }));
        assert!(matches!(parts[1], SqmPredicate::And(_)));
    }

    #[test]
    fn in_list_parameter_may_take_multiple_values() {
        let parsed = parse_ok("from Flight f where f.id in (:ids) and f.name = :ids2");

        assert!(parsed.parameters.allows_multi_valued(&QueryParameter::named("ids")));
        assert!(!parsed.parameters.allows_multi_valued(&QueryParameter::named("ids2")));
    }

    #[test]
    fn select_new_forms_are_recognised() {
        assert_eq!(
            select("select new map(f.name as n) from Flight f").instantiation,
            Some(SqmInstantiation::Map)
        );
        assert_eq!(
            select("select new list(f.name) from Flight f").instantiation,
            Some(SqmInstantiation::List)
        );
        assert_eq!(
            select("select new com.acme.FlightSummary(f.name, f.duration) from Flight f")
                .instantiation,
            Some(SqmInstantiation::Constructor("com.acme.FlightSummary".to_string()))
        );
    }

    #[test]
    fn collection_properties_parse_in_both_spellings() {
        let select = select(
            "select size(a.nicknames), a.nicknames.maxElement from Animal a where 'Rex' in elements(a.nicknames)",
        );

        assert_eq!(
            select.selections[0].expression,
            SqmExpression::CollectionProperty {
                collection: SqmPath::new("a", "nicknames"),
                property: CollectionProperty::Size,
            }
        );
        assert_eq!(
            select.selections[1].expression,
            SqmExpression::CollectionProperty {
                collection: SqmPath::new("a", "nicknames"),
                property: CollectionProperty::MaxElement,
            }
        );
        assert!(matches!(
            select.predicate,
            Some(SqmPredicate::InCollection { property: CollectionProperty::Elements, .. })
        ));
    }

    #[test]
    fn mutation_statements_parse() {
        let parsed = parse_ok("update versioned Document d set d.title = :title where d.id = 1");
        let SqmStatement::Update(update) = parsed.statement else {
            panic!("expected an update");
        };
        assert!(update.versioned);
        assert_eq!(update.assignments[0].attribute, "title");

        let parsed = parse_ok("delete Flight where duration < 10");
        assert!(matches!(parsed.statement, SqmStatement::Delete(_)));

        let parsed = parse_ok("insert into Flight (id, name, duration) values (1, 'AF1', 60), (2, 'AF2', 70)");
        let SqmStatement::Insert(insert) = parsed.statement else {
            panic!("expected an insert");
        };
        assert!(matches!(insert.source, SqmInsertSource::Values(ref rows) if rows.len() == 2));
    }

    #[test]
    fn unknown_entity_is_a_mapping_error() {
        let err = parse("from Unmapped", &test_support::metamodel()).expect_err("should fail");

        assert!(matches!(err, Error::Mapping(MappingError::UnknownEntity { .. })));
    }

    #[test]
    fn trailing_garbage_is_a_syntax_error() {
        let err = parse("from Flight f f2", &test_support::metamodel()).expect_err("should fail");

        assert!(matches!(err, Error::Syntax(_)));
    }

    #[test]
    fn imported_short_names_resolve() {
        let select = select("from Plane p");

        assert_eq!(select.roots[0].entity, "Flight");
    }
}
