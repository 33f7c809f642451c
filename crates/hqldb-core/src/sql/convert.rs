use crate::{
    error::{Error, InternalError},
    hql::{CollectionProperty, LoweredCollectionProperty, lower_collection_property},
    jdbc::{JdbcParameter, JdbcParameterAllocator, JdbcParameterBindings},
    model::{CollectionMapping, EntityMapping, InheritanceType, MappingError, Metamodel},
    naming,
    sql::ast::{
        Expression, FromItem, JoinKind, Predicate, SelectItem, SelectStatement,
        SortSpecification, TableJoin, TableReference,
    },
    sqm::{
        DomainParameterXref, ParameterError, QueryParameterBindings, SqmExpression,
        SqmParameterId, SqmPath, SqmPredicate, SqmRoot, SqmSelectStatement,
    },
    value::Value,
};
use std::{collections::BTreeMap, sync::Arc};

///
/// JdbcParameterXref
///
/// SQM parameter occurrence to every JDBC parameter created for it. An
/// occurrence converted twice (the same predicate in two statements) or
/// expanded for a list owns several.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct JdbcParameterXref(BTreeMap<SqmParameterId, Vec<JdbcParameter>>);

impl JdbcParameterXref {
    fn push(&mut self, id: SqmParameterId, parameter: JdbcParameter) {
        self.0.entry(id).or_default().push(parameter);
    }

    #[must_use]
    pub fn parameters(&self, id: SqmParameterId) -> &[JdbcParameter] {
        self.0.get(&id).map_or(&[], Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SqmParameterId, &[JdbcParameter])> {
        self.0.iter().map(|(id, params)| (*id, params.as_slice()))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

///
/// SqlTranslation
///

#[derive(Clone, Debug, PartialEq)]
pub struct SqlTranslation<T> {
    pub statement: T,
    pub jdbc_xref: JdbcParameterXref,
}

///
/// TableGroup
///
/// The physical tables of one entity reference and the SQL alias each is
/// known by. Empty aliases mean unqualified column references.
///

#[derive(Clone, Debug)]
pub struct TableGroup {
    pub entity: Arc<EntityMapping>,
    pub aliases: Vec<String>,
}

impl TableGroup {
    fn qualified(entity: Arc<EntityMapping>, root_alias: String) -> Self {
        let aliases = (0..entity.tables.len())
            .map(|i| {
                if i == 0 {
                    root_alias.clone()
                } else {
                    format!("{root_alias}{i}_")
                }
            })
            .collect();

        Self { entity, aliases }
    }

    fn unqualified(entity: Arc<EntityMapping>) -> Self {
        let aliases = vec![String::new(); entity.tables.len()];

        Self { entity, aliases }
    }

    fn qualifier(&self, table: usize) -> Option<&str> {
        self.aliases
            .get(table)
            .map(String::as_str)
            .filter(|alias| !alias.is_empty())
    }

    #[must_use]
    pub fn column(&self, table: usize, column: &str) -> Expression {
        Expression::column(self.qualifier(table), column)
    }

    #[must_use]
    pub fn id_expression(&self) -> Expression {
        self.column(0, self.entity.id_column())
    }

    /// Root table joined to every other table of the entity on the id.
    #[must_use]
    pub fn from_item(&self) -> FromItem {
        let tables = &self.entity.tables;
        let joins = tables
            .iter()
            .enumerate()
            .skip(1)
            .map(|(i, table)| TableJoin {
                kind: if table.optional {
                    JoinKind::Left
                } else {
                    JoinKind::Inner
                },
                table: TableReference {
                    table: table.name.clone(),
                    alias: self.aliases[i].clone(),
                },
                on: Predicate::eq(self.column(i, &table.key_column), self.id_expression()),
            })
            .collect();

        FromItem {
            root: TableReference {
                table: tables[0].name.clone(),
                alias: self.aliases[0].clone(),
            },
            joins,
        }
    }

    /// Discriminator restriction for a single-table subclass.
    #[must_use]
    pub fn type_restriction(&self, metamodel: &Metamodel) -> Option<Predicate> {
        let entity = &self.entity;
        if entity.inheritance != InheritanceType::SingleTable || !entity.is_subclass() {
            return None;
        }
        let discriminator = entity.discriminator.as_ref()?;

        Some(Predicate::InList {
            expression: self.column(0, &discriminator.column),
            list: metamodel
                .discriminator_values(entity)
                .into_iter()
                .map(Expression::Literal)
                .collect(),
            negated: false,
        })
    }
}

///
/// SqmToSqlConverter
///
/// Lowers SQM into the SQL AST against the metamodel. Every parameter
/// occurrence becomes fresh JDBC parameters; list-bound occurrences expand
/// to the cardinality recorded in `expansions`.
///

pub struct SqmToSqlConverter<'a> {
    metamodel: &'a Metamodel,
    query: &'a str,
    expansions: &'a BTreeMap<SqmParameterId, usize>,
    allocator: JdbcParameterAllocator,
    jdbc_xref: JdbcParameterXref,
    scope: Vec<(String, TableGroup)>,
    group_count: usize,
}

impl<'a> SqmToSqlConverter<'a> {
    #[must_use]
    pub fn new(
        metamodel: &'a Metamodel,
        query: &'a str,
        expansions: &'a BTreeMap<SqmParameterId, usize>,
    ) -> Self {
        Self {
            metamodel,
            query,
            expansions,
            allocator: JdbcParameterAllocator::default(),
            jdbc_xref: JdbcParameterXref::default(),
            scope: Vec::new(),
            group_count: 0,
        }
    }

    #[must_use]
    pub const fn metamodel(&self) -> &'a Metamodel {
        self.metamodel
    }

    /// Fresh parameter for values the converter's caller binds itself.
    pub const fn create_parameter(&mut self) -> JdbcParameter {
        self.allocator.create()
    }

    #[must_use]
    pub fn finish(self) -> JdbcParameterXref {
        self.jdbc_xref
    }

    pub fn entity(&self, root: &SqmRoot) -> Result<Arc<EntityMapping>, Error> {
        self.metamodel.entity(&root.entity).cloned().ok_or_else(|| {
            InternalError::sql_invariant(format!(
                "type '{}' reached SQL conversion without a polymorphic split",
                root.entity
            ))
            .into()
        })
    }

    /// Bring `root` into scope with generated table aliases.
    pub fn register_root(&mut self, root: &SqmRoot) -> Result<TableGroup, Error> {
        let entity = self.entity(root)?;
        let alias = naming::generate_alias(&entity.name, self.group_count);
        self.group_count += 1;
        let group = TableGroup::qualified(entity, alias);
        self.scope.push((root.alias.clone(), group.clone()));

        Ok(group)
    }

    /// Bring `root` into scope as the unaliased target of an update or delete.
    pub fn register_target(&mut self, root: &SqmRoot) -> Result<TableGroup, Error> {
        let group = TableGroup::unqualified(self.entity(root)?);
        self.scope.push((root.alias.clone(), group.clone()));

        Ok(group)
    }

    fn group(&self, alias: &str) -> Result<&TableGroup, Error> {
        self.scope
            .iter()
            .rev()
            .find(|(a, _)| a == alias)
            .map(|(_, group)| group)
            .ok_or_else(|| self.semantic(format!("unknown alias '{alias}'")))
    }

    fn semantic(&self, message: String) -> Error {
        Error::semantic(message, self.query)
    }

    // ─────────────────────────────────────────
    // Statements
    // ─────────────────────────────────────────

    /// Convert a standalone select, returning it with its parameter xref.
    pub fn translate_select(
        metamodel: &'a Metamodel,
        query: &'a str,
        expansions: &'a BTreeMap<SqmParameterId, usize>,
        select: &SqmSelectStatement,
    ) -> Result<SqlTranslation<SelectStatement>, Error> {
        let mut converter = Self::new(metamodel, query, expansions);
        let statement = converter.convert_select(select)?;

        Ok(SqlTranslation {
            statement,
            jdbc_xref: converter.finish(),
        })
    }

    pub fn convert_select(&mut self, select: &SqmSelectStatement) -> Result<SelectStatement, Error> {
        let depth = self.scope.len();
        let result = self.select_in_scope(select);
        self.scope.truncate(depth);

        result
    }

    fn select_in_scope(&mut self, select: &SqmSelectStatement) -> Result<SelectStatement, Error> {
        let mut from = Vec::with_capacity(select.roots.len());
        let mut restrictions = Vec::new();
        for root in &select.roots {
            let group = self.register_root(root)?;
            from.push(group.from_item());
            restrictions.extend(group.type_restriction(self.metamodel));
        }

        let mut selections = Vec::with_capacity(select.selections.len());
        for (i, selection) in select.selections.iter().enumerate() {
            selections.push(SelectItem {
                expression: self.expression(&selection.expression)?,
                alias: Some(naming::scalar_name(i, 0)),
            });
        }

        let mut predicates = Vec::new();
        if let Some(predicate) = &select.predicate {
            predicates.push(self.predicate(predicate)?);
        }
        predicates.extend(restrictions);

        let mut order_by = Vec::with_capacity(select.order_by.len());
        for sort in &select.order_by {
            order_by.push(SortSpecification {
                expression: self.expression(&sort.expression)?,
                descending: sort.descending,
            });
        }

        Ok(SelectStatement {
            distinct: select.distinct,
            selections,
            from,
            predicate: Predicate::all(predicates),
            order_by,
        })
    }

    // ─────────────────────────────────────────
    // Expressions
    // ─────────────────────────────────────────

    pub fn expression(&mut self, expression: &SqmExpression) -> Result<Expression, Error> {
        Ok(match expression {
            SqmExpression::Path(path) => self.path(path)?,
            SqmExpression::Entity(alias) => self.group(alias)?.id_expression(),
            SqmExpression::Literal(value) => Expression::Literal(value.clone()),
            SqmExpression::Parameter(id) => self.single_parameter(*id),
            SqmExpression::Binary { op, lhs, rhs } => Expression::Binary {
                op: *op,
                lhs: Box::new(self.expression(lhs)?),
                rhs: Box::new(self.expression(rhs)?),
            },
            SqmExpression::Negate(inner) => Expression::Negate(Box::new(self.expression(inner)?)),
            SqmExpression::Function { function, argument } => Expression::Function {
                function: *function,
                argument: Box::new(self.expression(argument)?),
            },
            SqmExpression::Aggregate {
                function,
                argument,
                distinct,
            } => Expression::Aggregate {
                function: *function,
                argument: match argument {
                    Some(argument) => Some(Box::new(self.expression(argument)?)),
                    None => None,
                },
                distinct: *distinct,
            },
            SqmExpression::CollectionProperty {
                collection,
                property,
            } => match self.lower(collection, *property)? {
                LoweredCollectionProperty::Scalar(expression) => expression,
                LoweredCollectionProperty::Values(_) => {
                    return Err(self.semantic(format!(
                        "'{property}' of '{}' yields several values",
                        collection.attribute
                    )));
                }
            },
        })
    }

    fn single_parameter(&mut self, id: SqmParameterId) -> Expression {
        let parameter = self.allocator.create();
        self.jdbc_xref.push(id, parameter);

        Expression::Parameter(parameter)
    }

    fn list_parameters(&mut self, id: SqmParameterId) -> Vec<Expression> {
        let count = self.expansions.get(&id).copied().unwrap_or(1);

        (0..count).map(|_| self.single_parameter(id)).collect()
    }

    fn path(&self, path: &SqmPath) -> Result<Expression, Error> {
        let group = self.group(&path.alias)?;
        let entity = &group.entity;
        let attribute = path.attribute.as_str();

        if attribute == "id" || entity.is_identifier(attribute) {
            return Ok(group.id_expression());
        }
        if let Some(version) = entity.version.as_ref().filter(|v| v.attribute == attribute) {
            return Ok(group.column(0, &version.column));
        }
        if let Some(basic) = entity.basic(attribute) {
            return Ok(group.column(basic.table, &basic.column));
        }
        if entity.collection(attribute).is_some() {
            return Err(self.semantic(format!(
                "collection '{attribute}' cannot be used as a value; use size(), elements() or a pseudo-property"
            )));
        }

        Err(MappingError::UnknownAttribute {
            entity: entity.name.clone(),
            attribute: attribute.to_string(),
        }
        .into())
    }

    fn collection(&self, path: &SqmPath) -> Result<(CollectionMapping, Expression), Error> {
        let group = self.group(&path.alias)?;
        let collection = group.entity.collection(&path.attribute).ok_or_else(|| {
            Error::from(MappingError::UnknownAttribute {
                entity: group.entity.name.clone(),
                attribute: path.attribute.clone(),
            })
        })?;

        Ok((collection.clone(), group.id_expression()))
    }

    fn lower(
        &self,
        path: &SqmPath,
        property: CollectionProperty,
    ) -> Result<LoweredCollectionProperty, Error> {
        let (collection, owner_key) = self.collection(path)?;

        lower_collection_property(property, &collection, owner_key).ok_or_else(|| {
            self.semantic(format!(
                "'{property}' does not apply to collection '{}'",
                path.attribute
            ))
        })
    }

    // ─────────────────────────────────────────
    // Predicates
    // ─────────────────────────────────────────

    pub fn predicate(&mut self, predicate: &SqmPredicate) -> Result<Predicate, Error> {
        Ok(match predicate {
            SqmPredicate::Comparison { lhs, op, rhs } => Predicate::Comparison {
                lhs: self.expression(lhs)?,
                op: *op,
                rhs: self.expression(rhs)?,
            },
            SqmPredicate::And(parts) => Predicate::And(self.predicates(parts)?),
            SqmPredicate::Or(parts) => Predicate::Or(self.predicates(parts)?),
            SqmPredicate::Not(inner) => Predicate::Not(Box::new(self.predicate(inner)?)),
            SqmPredicate::Null {
                expression,
                negated,
            } => Predicate::Null {
                expression: self.expression(expression)?,
                negated: *negated,
            },
            SqmPredicate::Between {
                expression,
                lower,
                upper,
                negated,
            } => Predicate::Between {
                expression: self.expression(expression)?,
                lower: self.expression(lower)?,
                upper: self.expression(upper)?,
                negated: *negated,
            },
            SqmPredicate::Like {
                expression,
                pattern,
                negated,
            } => Predicate::Like {
                expression: self.expression(expression)?,
                pattern: self.expression(pattern)?,
                negated: *negated,
            },
            SqmPredicate::InList {
                expression,
                list,
                negated,
            } => {
                let expression = self.expression(expression)?;
                let mut converted = Vec::with_capacity(list.len());
                for item in list {
                    match item {
                        SqmExpression::Parameter(id) => converted.extend(self.list_parameters(*id)),
                        other => converted.push(self.expression(other)?),
                    }
                }
                Predicate::InList {
                    expression,
                    list: converted,
                    negated: *negated,
                }
            }
            SqmPredicate::InCollection {
                expression,
                collection,
                property,
                negated,
            } => {
                let expression = self.expression(expression)?;
                match self.lower(collection, *property)? {
                    LoweredCollectionProperty::Values(subquery) => Predicate::InSubquery {
                        expression,
                        subquery: Box::new(subquery),
                        negated: *negated,
                    },
                    LoweredCollectionProperty::Scalar(_) => {
                        return Err(self.semantic(format!(
                            "'{property}' cannot be the right-hand side of in"
                        )));
                    }
                }
            }
            SqmPredicate::EmptyCollection {
                collection,
                negated,
            } => match self.lower(collection, CollectionProperty::Elements)? {
                LoweredCollectionProperty::Values(subquery) => Predicate::Exists {
                    subquery: Box::new(subquery),
                    negated: !*negated,
                },
                LoweredCollectionProperty::Scalar(_) => {
                    return Err(InternalError::sql_invariant(
                        "elements() lowered to a scalar",
                    )
                    .into());
                }
            },
        })
    }

    fn predicates(&mut self, parts: &[SqmPredicate]) -> Result<Vec<Predicate>, Error> {
        parts.iter().map(|p| self.predicate(p)).collect()
    }
}

/// Bind domain values onto the JDBC parameters a conversion created.
///
/// List values spread over the expanded placeholders of their occurrence,
/// and the cardinality of every list-bound occurrence is recorded so a
/// cached handler can tell whether its SQL still fits.
pub fn create_jdbc_parameter_bindings(
    xref: &DomainParameterXref,
    jdbc_xref: &JdbcParameterXref,
    bindings: &QueryParameterBindings,
) -> Result<JdbcParameterBindings, Error> {
    bindings.validate(xref)?;

    let mut out = JdbcParameterBindings::new();
    for (id, count) in bindings.expansions(xref) {
        out.record_expansion(id, count);
    }

    for (id, parameters) in jdbc_xref.iter() {
        let parameter = xref.parameter_of(id).ok_or_else(|| {
            InternalError::sql_invariant(format!("occurrence {id} is not in the parameter xref"))
        })?;
        let values: &[Value] = bindings
            .get(parameter)
            .map(|bound| bound.values())
            .ok_or_else(|| ParameterError::Unbound {
                parameter: parameter.clone(),
            })?;
        if values.is_empty() {
            return Err(ParameterError::EmptyList {
                parameter: parameter.clone(),
            }
            .into());
        }

        for (i, jdbc_parameter) in parameters.iter().enumerate() {
            out.add_binding(*jdbc_parameter, values[i % values.len()].clone());
        }
    }

    Ok(out)
}
