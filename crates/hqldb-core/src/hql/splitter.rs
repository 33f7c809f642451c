//! String-level implicit polymorphism: rewrite a query naming an interface
//! or superclass into one query per persistent implementor.

use crate::model::Metamodel;
use tracing::warn;

const DELIMITERS: &str = " \n\r\x0c\t(),";
const BEFORE_CLASS_TOKENS: [&str; 4] = ["from", "delete", "update", ","];
const NOT_AFTER_CLASS_TOKENS: [&str; 3] = ["in", "from", ")"];

///
/// Placeholder
///

#[derive(Debug)]
struct Placeholder {
    token: String,
    implementors: Vec<String>,
}

/// Expand every polymorphic type reference in `query` into its concrete
/// implementors, one output query per combination.
///
/// The select clause is copied verbatim. Whitespace and delimiters are
/// preserved. An empty result means a referenced type has no persistent
/// implementor.
#[must_use]
pub fn concrete_queries(query: &str, metamodel: &Metamodel) -> Vec<String> {
    let tokens = tokenize(query);
    if tokens.is_empty() {
        return vec![query.to_string()];
    }

    let mut template = String::with_capacity(query.len());
    let start = starting_position(&tokens, &mut template);
    let mut placeholders: Vec<Placeholder> = Vec::new();
    let mut last = tokens[start - 1].to_lowercase();

    for i in start..tokens.len() {
        let token = tokens[i];
        if is_whitespace(token) {
            template.push_str(token);
            continue;
        }

        let next = next_non_whitespace(&tokens, i).to_lowercase();
        let process = is_identifier_start(token) && is_possibly_class_name(&last, &next);
        last = token.to_lowercase();

        if process && let Some(imported) = metamodel.imported_type(token) {
            let placeholder = format!("$clazz{}$", placeholders.len());
            template.push_str(&placeholder);
            placeholders.push(Placeholder {
                token: placeholder,
                implementors: metamodel.implementors(imported),
            });
            continue;
        }

        template.push_str(token);
    }

    let results = multiply(template, &placeholders);
    if results.is_empty() {
        warn!(query, "no persistent classes found for query");
    }

    results
}

/// Split on the delimiter characters, keeping each delimiter as a token.
fn tokenize(query: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = 0;

    for (i, c) in query.char_indices() {
        if DELIMITERS.contains(c) {
            if start < i {
                tokens.push(&query[start..i]);
            }
            tokens.push(&query[i..i + c.len_utf8()]);
            start = i + c.len_utf8();
        }
    }
    if start < query.len() {
        tokens.push(&query[start..]);
    }

    tokens
}

/// Copy a leading select clause into `template`; scanning starts at `from`.
fn starting_position(tokens: &[&str], template: &mut String) -> usize {
    template.push_str(tokens[0]);
    if !tokens[0].eq_ignore_ascii_case("select") {
        return 1;
    }

    for (i, token) in tokens.iter().enumerate().skip(1) {
        if token.eq_ignore_ascii_case("from") {
            return i;
        }
        template.push_str(token);
    }

    tokens.len()
}

fn is_whitespace(token: &str) -> bool {
    token.len() == 1 && " \n\r\x0c\t".contains(token)
}

fn next_non_whitespace<'a>(tokens: &[&'a str], current: usize) -> &'a str {
    tokens[current + 1..]
        .iter()
        .find(|t| !is_whitespace(t))
        .or_else(|| tokens.last())
        .copied()
        .unwrap_or_default()
}

fn is_identifier_start(token: &str) -> bool {
    token
        .chars()
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
}

fn is_possibly_class_name(last: &str, next: &str) -> bool {
    last == "class"
        || (BEFORE_CLASS_TOKENS.contains(&last) && !NOT_AFTER_CLASS_TOKENS.contains(&next))
}

/// Replace each placeholder once per implementor: the outer loop walks a
/// placeholder's implementors, the inner loop the results so far.
fn multiply(template: String, placeholders: &[Placeholder]) -> Vec<String> {
    let mut results = vec![template];

    for placeholder in placeholders {
        let mut next = Vec::with_capacity(results.len() * placeholder.implementors.len());
        for implementor in &placeholder.implementors {
            for result in &results {
                next.push(result.replacen(&placeholder.token, implementor, 1));
            }
        }
        results = next;
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[test]
    fn interface_reference_expands_per_implementor() {
        let metamodel = test_support::metamodel();

        let queries = concrete_queries("from Named n where n.name = :name", &metamodel);

        assert_eq!(
            queries,
            vec![
                "from Animal n where n.name = :name".to_string(),
                "from Flight n where n.name = :name".to_string(),
            ]
        );
    }

    #[test]
    fn select_clause_is_never_rewritten() {
        let metamodel = test_support::metamodel();

        let queries = concrete_queries("select Named from Flight", &metamodel);

        assert_eq!(queries, vec!["select Named from Flight".to_string()]);
    }

    #[test]
    fn two_references_multiply_outer_by_replacement() {
        let metamodel = test_support::metamodel();

        let queries = concrete_queries("from Named a, Named b", &metamodel);

        assert_eq!(
            queries,
            vec![
                "from Animal a, Animal b".to_string(),
                "from Flight a, Animal b".to_string(),
                "from Animal a, Flight b".to_string(),
                "from Flight a, Flight b".to_string(),
            ]
        );
    }

    #[test]
    fn whitespace_and_delimiters_are_preserved() {
        let metamodel = test_support::metamodel();

        let queries = concrete_queries("delete  Named\twhere (id = 1)", &metamodel);

        assert_eq!(
            queries,
            vec![
                "delete  Animal\twhere (id = 1)".to_string(),
                "delete  Flight\twhere (id = 1)".to_string(),
            ]
        );
    }

    #[test]
    fn type_without_implementors_yields_nothing() {
        let metamodel = test_support::metamodel();

        assert!(concrete_queries("from Thing", &metamodel).is_empty());
    }

    #[test]
    fn empty_and_unmatched_queries_pass_through() {
        let metamodel = test_support::metamodel();

        assert_eq!(concrete_queries("", &metamodel), vec![String::new()]);
        assert_eq!(
            concrete_queries("from Unmapped u", &metamodel),
            vec!["from Unmapped u".to_string()]
        );
    }

    #[test]
    fn token_followed_by_in_is_not_a_class() {
        let metamodel = test_support::metamodel();

        let query = "from Flight f, Named in elements(f.crew)";
        assert_eq!(concrete_queries(query, &metamodel), vec![query.to_string()]);
    }
}
