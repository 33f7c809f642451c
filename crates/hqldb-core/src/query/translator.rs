//! Query translators turn an HQL string into the concrete SQM statements a
//! plan executes. The factory resolves one by name when it boots.

use crate::{
    error::Error,
    hql::{concrete_queries, parse},
    model::Metamodel,
    sqm::{DomainParameterXref, SqmStatement, split_polymorphic},
};
use std::{collections::BTreeMap, fmt, sync::Arc};
use tracing::debug;

///
/// TranslatedStatement
///
/// One concrete statement and the parameter xref it binds through. Statements
/// split from one parse share their xref.
///

#[derive(Clone, Debug)]
pub struct TranslatedStatement {
    pub statement: SqmStatement,
    pub parameters: Arc<DomainParameterXref>,
}

///
/// Translation
///
/// Concrete statements for one query string. `select` records the written
/// statement kind, which survives a split into nothing.
///

#[derive(Clone, Debug)]
pub struct Translation {
    pub select: bool,
    pub statements: Vec<TranslatedStatement>,
}

///
/// QueryTranslator
///

pub trait QueryTranslator: Send + Sync {
    fn name(&self) -> &str;

    /// Concrete statements for `query`; none when a polymorphic reference
    /// has no mapped implementors.
    fn translate(&self, query: &str, metamodel: &Metamodel) -> Result<Translation, Error>;
}

///
/// AstQueryTranslator
///
/// Parses once, then splits polymorphic roots on the SQM tree.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct AstQueryTranslator;

impl QueryTranslator for AstQueryTranslator {
    fn name(&self) -> &str {
        "ast"
    }

    fn translate(&self, query: &str, metamodel: &Metamodel) -> Result<Translation, Error> {
        let parsed = parse(query, metamodel)?;
        let parameters = Arc::new(parsed.parameters);
        let statements = split_polymorphic(&parsed.statement, metamodel)
            .into_iter()
            .map(|statement| TranslatedStatement {
                statement,
                parameters: Arc::clone(&parameters),
            })
            .collect();

        Ok(Translation {
            select: parsed.statement.is_select(),
            statements,
        })
    }
}

///
/// ClassicQueryTranslator
///
/// Splits the query string first and parses every concrete query.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct ClassicQueryTranslator;

impl QueryTranslator for ClassicQueryTranslator {
    fn name(&self) -> &str {
        "classic"
    }

    fn translate(&self, query: &str, metamodel: &Metamodel) -> Result<Translation, Error> {
        let concrete = concrete_queries(query, metamodel);
        debug!(query, variants = concrete.len(), "split query string");

        let statements = concrete
            .iter()
            .map(|variant| {
                let parsed = parse(variant, metamodel)?;
                Ok(TranslatedStatement {
                    statement: parsed.statement,
                    parameters: Arc::new(parsed.parameters),
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;

        // nothing to parse after an empty split; the original still names the kind
        let select = match statements.first() {
            Some(first) => first.statement.is_select(),
            None => parse(query, metamodel)?.statement.is_select(),
        };

        Ok(Translation { select, statements })
    }
}

///
/// QueryTranslatorFactory
///
/// Named translators; `ast` and `classic` are always registered.
///

#[derive(Clone)]
pub struct QueryTranslatorFactory {
    translators: BTreeMap<String, Arc<dyn QueryTranslator>>,
}

impl QueryTranslatorFactory {
    #[must_use]
    pub fn new() -> Self {
        let mut factory = Self {
            translators: BTreeMap::new(),
        };
        factory.register(Arc::new(AstQueryTranslator));
        factory.register(Arc::new(ClassicQueryTranslator));

        factory
    }

    /// Register under the translator's own name, replacing any previous one.
    pub fn register(&mut self, translator: Arc<dyn QueryTranslator>) {
        self.translators
            .insert(translator.name().to_string(), translator);
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn QueryTranslator>, Error> {
        self.translators.get(name).cloned().ok_or_else(|| {
            Error::config(format!(
                "unknown query translator '{name}' (registered: {})",
                self.translators.keys().cloned().collect::<Vec<_>>().join(", ")
            ))
        })
    }
}

impl Default for QueryTranslatorFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for QueryTranslatorFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.translators.keys()).finish()
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    fn entities(statements: &[TranslatedStatement]) -> Vec<String> {
        statements
            .iter()
            .map(|t| match &t.statement {
                SqmStatement::Select(select) => select.roots[0].entity.clone(),
                other => other
                    .target()
                    .map(|root| root.entity.clone())
                    .unwrap_or_default(),
            })
            .collect()
    }

    #[test]
    fn both_translators_expand_interfaces_to_implementors() {
        let metamodel = test_support::metamodel();
        let factory = QueryTranslatorFactory::new();

        for name in ["ast", "classic"] {
            let translator = factory.resolve(name).expect("built-in should resolve");
            let out = translator
                .translate("from Named n where n.name = :name", &metamodel)
                .expect("translate should succeed");

            assert!(out.select);
            assert_eq!(entities(&out.statements), vec!["Animal", "Flight"], "{name}");
        }
    }

    #[test]
    fn ast_split_shares_one_parameter_xref() {
        let metamodel = test_support::metamodel();

        let out = AstQueryTranslator
            .translate("from Named n where n.name = :name", &metamodel)
            .expect("translate should succeed")
            .statements;

        assert!(Arc::ptr_eq(&out[0].parameters, &out[1].parameters));
    }

    #[test]
    fn interface_without_implementors_translates_to_nothing() {
        let metamodel = test_support::metamodel();

        for translator in [
            Arc::new(AstQueryTranslator) as Arc<dyn QueryTranslator>,
            Arc::new(ClassicQueryTranslator),
        ] {
            let out = translator
                .translate("from Thing", &metamodel)
                .expect("translate should succeed");
            assert!(out.statements.is_empty(), "{}", translator.name());
            assert!(out.select, "{}", translator.name());

            let out = translator
                .translate("delete from Thing", &metamodel)
                .expect("translate should succeed");
            assert!(out.statements.is_empty(), "{}", translator.name());
            assert!(!out.select, "{}", translator.name());
        }
    }

    #[test]
    fn unknown_translator_is_a_config_error() {
        let err = QueryTranslatorFactory::new()
            .resolve("antlr2")
            .err()
            .expect("unknown name should fail");

        assert!(matches!(err, Error::Config { .. }), "{err:?}");
        assert!(err.to_string().contains("ast, classic"));
    }

    #[test]
    fn registered_translators_replace_by_name() {
        #[derive(Debug)]
        struct Fixed;

        impl QueryTranslator for Fixed {
            fn name(&self) -> &str {
                "ast"
            }

            fn translate(&self, _query: &str, _metamodel: &Metamodel) -> Result<Translation, Error> {
                Ok(Translation {
                    select: true,
                    statements: Vec::new(),
                })
            }
        }

        let mut factory = QueryTranslatorFactory::new();
        factory.register(Arc::new(Fixed));

        let out = factory
            .resolve("ast")
            .expect("ast should resolve")
            .translate("from Flight", &test_support::metamodel())
            .expect("translate should succeed");
        assert!(out.statements.is_empty());
    }
}
