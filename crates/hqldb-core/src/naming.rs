//! Synthetic SQL names: scalar column aliases for projected results and
//! table aliases for table groups.

const ALIAS_TRUNCATE_LENGTH: usize = 10;

/// Alias for column `y` of projected item `x`.
#[must_use]
pub fn scalar_name(x: usize, y: usize) -> String {
    scalar_name_with_base(&format!("col_{x}"), y)
}

#[must_use]
pub fn scalar_name_with_base(base: &str, num: usize) -> String {
    format!("{base}_{num}_")
}

/// One alias row per projected item, sized by each item's column span.
#[must_use]
pub fn generate_column_names(column_spans: &[usize]) -> Vec<Vec<String>> {
    column_spans
        .iter()
        .enumerate()
        .map(|(x, span)| (0..*span).map(|y| scalar_name(x, y)).collect())
        .collect()
}

/// Table alias derived from an entity or table name, made unique by `unique`.
///
/// The root is the unqualified name truncated to ten characters, lowercased,
/// stripped of leading non-letters, and suffixed with `x` when it would
/// otherwise end in a digit.
#[must_use]
pub fn generate_alias(description: &str, unique: usize) -> String {
    format!("{}{unique}_", alias_root(description))
}

fn alias_root(description: &str) -> String {
    let unqualified = description.rsplit('.').next().unwrap_or(description);
    let truncated: String = unqualified.chars().take(ALIAS_TRUNCATE_LENGTH).collect();
    let lowered = truncated
        .to_lowercase()
        .replace(['/', '$'], "_");
    let cleaned = lowered.trim_start_matches(|c: char| !c.is_ascii_alphabetic());

    let mut root = if cleaned.is_empty() {
        "t".to_string()
    } else {
        cleaned.to_string()
    };
    if root.ends_with(|c: char| c.is_ascii_digit()) {
        root.push('x');
    }

    root
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_names_follow_position() {
        assert_eq!(scalar_name(0, 0), "col_0_0_");
        assert_eq!(scalar_name(3, 1), "col_3_1_");
    }

    #[test]
    fn column_names_are_sized_by_span() {
        let names = generate_column_names(&[1, 2, 0]);

        assert_eq!(
            names,
            vec![
                vec!["col_0_0_".to_string()],
                vec!["col_1_0_".to_string(), "col_1_1_".to_string()],
                Vec::<String>::new(),
            ]
        );
    }

    #[test]
    fn column_names_are_unique_within_a_projection() {
        let names: Vec<String> = generate_column_names(&[3, 3, 3]).concat();
        let mut deduped = names.clone();
        deduped.sort();
        deduped.dedup();

        assert_eq!(names.len(), deduped.len());
    }

    #[test]
    fn aliases_use_the_truncated_unqualified_name() {
        assert_eq!(generate_alias("com.example.Flight", 0), "flight0_");
        assert_eq!(generate_alias("VeryLongEntityName", 2), "verylongen2_");
    }

    #[test]
    fn aliases_never_end_the_root_in_a_digit() {
        assert_eq!(generate_alias("Table2", 1), "table2x1_");
        assert_eq!(generate_alias("_9lives", 0), "lives0_");
    }
}
