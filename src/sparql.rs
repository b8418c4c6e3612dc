//! SPARQL builder (spec.md §4.4): emits parameterised SELECT/UPDATE
//! statements and binds named placeholders. Never interpolates a
//! user-supplied string directly into statement text — the only
//! interpolation permitted is for UPDATE statements, whose values have gone
//! through [`rdf_escape`] first.

use itertools::Itertools;

use crate::registry::{HostKey, TrackerKey};

/// A GROUP_CONCAT separator unlikely to occur in real tag content. The
/// open question in spec.md §9 about this sentinel applies equally here:
/// callers with literal private-use characters in their tags would need a
/// different multi-value encoding.
pub const CONCAT_SENTINEL: &str = "\u{E000}";

/// The delimiter the projection engine (spec.md §4.5) treats as a
/// various-values marker once concat aggregation has collapsed a group.
pub const VALUES_DELIMITER: char = '|';

/// Per-statement scratch: allocates fresh `?vN` select variables and
/// `~_N` value-binding placeholders. One instance per generated statement.
#[derive(Debug, Default)]
pub struct SparqlBuilderState {
    next_var: usize,
    next_binding: usize,
    bindings: Vec<(String, String)>,
}

impl SparqlBuilderState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh_var(&mut self) -> String {
        let v = format!("?v{}", self.next_var);
        self.next_var += 1;
        v
    }

    /// Register an opaque value binding and return its `~_N` placeholder.
    /// The value is never spliced into statement text.
    pub fn bind(&mut self, value: impl Into<String>) -> String {
        let id = format!("_{}", self.next_binding);
        self.next_binding += 1;
        self.bindings.push((id.clone(), value.into()));
        format!("~{id}")
    }

    pub fn bindings(&self) -> &[(String, String)] {
        &self.bindings
    }
}

#[derive(Debug, Clone)]
pub struct Statement {
    pub text: String,
    pub bindings: Vec<(String, String)>,
}

/// A column being selected, in insertion order (spec.md §4.4 "Column
/// ordering").
#[derive(Debug, Clone)]
pub struct SelectColumn {
    pub key: HostKey,
    pub tracker: TrackerKey,
}

#[derive(Debug, Clone, Copy)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone)]
pub struct SortField {
    pub var: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Default)]
pub struct Aggregates {
    pub concat_var: Option<String>,
    pub count_target: Option<CountTarget>,
    /// The variable `CountTarget::Distinct` counts over. `None` falls back
    /// to `?o` (the base row) for callers that genuinely want that, though
    /// every current caller of `Distinct` supplies a grouped dimension's
    /// variable instead (spec.md §4.6: "for genres count artists, for
    /// artists count albums").
    pub count_var: Option<String>,
    pub sum_duration_predicate: Option<&'static str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountTarget {
    Star,
    Distinct,
}

/// Escape a value for literal interpolation into an UPDATE statement, the
/// one place the builder is allowed to splice a string directly (spec.md
/// §4.4, §9 "Ad-hoc string formatting... typed builder").
///
/// Order matters: backslashes must be doubled first so the escapes added
/// for quotes/newlines below aren't themselves re-escaped.
pub fn rdf_escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'").replace('\n', "\\n")
}

/// `SELECT ?uri ?v0 ?v1 ... WHERE { ?o a <class> . ?o nie:url ?uri .
/// OPTIONAL{ pred0 ?v0 } ... . FILTER(?uri IN (~_0, ~_1, ...)) }`
pub fn build_meta(
    service_class: &str,
    columns: &[SelectColumn],
    uris: &[String],
    state: &mut SparqlBuilderState,
) -> Statement {
    let var_names: Vec<String> = columns.iter().map(|_| state.fresh_var()).collect();

    let select_list = std::iter::once("?uri".to_string())
        .chain(var_names.iter().cloned())
        .join(" ");

    let optionals = columns
        .iter()
        .zip(&var_names)
        .map(|(col, var)| format!("OPTIONAL {{ {} {var} }}", col.tracker.predicate_text))
        .join(" . ");

    let mut body = format!("?o a <{service_class}> . ?o nie:url ?uri");
    if !optionals.is_empty() {
        body.push_str(" . ");
        body.push_str(&optionals);
    }
    if !uris.is_empty() {
        let placeholders = uris.iter().map(|u| state.bind(u.clone())).join(", ");
        body.push_str(&format!(" . FILTER(?uri IN ({placeholders}))"));
    }

    Statement {
        text: format!("SELECT {select_list} WHERE {{ {body} }}"),
        bindings: state.bindings().to_vec(),
    }
}

/// `SELECT * WHERE { ?o a <class> ; nie:url ~_0 }`
pub fn build_select(service_class: &str, uri: &str, state: &mut SparqlBuilderState) -> Statement {
    let placeholder = state.bind(uri.to_string());
    Statement {
        text: format!("SELECT * WHERE {{ ?o a <{service_class}> ; nie:url {placeholder} }}"),
        bindings: state.bindings().to_vec(),
    }
}

/// The `create` shape: list query (`unique = false`) or unique-group
/// (`unique = true`), with optional `concat`/`count`/`sum` aggregate
/// columns folded in after the grouping columns.
///
/// `var_names` must already have been allocated (via [`SparqlBuilderState::fresh_var`])
/// one-for-one with `columns`, by the caller — so the caller can reference
/// a specific column's variable (e.g. for `aggregates.concat_var`) before
/// the statement text exists.
#[allow(clippy::too_many_arguments)]
pub fn build_create(
    service_class: &str,
    columns: &[SelectColumn],
    var_names: &[String],
    condition: Option<&str>,
    sort: &[SortField],
    limit: Option<u32>,
    offset: Option<u32>,
    unique: bool,
    aggregates: &Aggregates,
    state: &mut SparqlBuilderState,
) -> Statement {
    let mut select_columns: Vec<String> = var_names.to_vec();
    if let Some(concat_var) = &aggregates.concat_var {
        select_columns.push(format!(
            "(REPLACE(REPLACE(GROUP_CONCAT(DISTINCT CONCAT({concat_var}, '{CONCAT_SENTINEL}')), \
             '{CONCAT_SENTINEL},', '{VALUES_DELIMITER}'), '{CONCAT_SENTINEL}', '') AS {concat_var}_concat)"
        ));
    }
    if let Some(count) = aggregates.count_target {
        select_columns.push(match count {
            CountTarget::Star => "(COUNT(*) AS ?__count)".to_string(),
            CountTarget::Distinct => {
                let var = aggregates.count_var.as_deref().unwrap_or("?o");
                format!("(COUNT(DISTINCT {var}) AS ?__count)")
            }
        });
    }
    if let Some(sum_pred) = aggregates.sum_duration_predicate {
        select_columns.push(format!("(SUM({sum_pred}) AS ?__duration_sum)"));
    }

    let optionals = columns
        .iter()
        .zip(var_names)
        .map(|(col, var)| format!("OPTIONAL {{ {} {var} }}", col.tracker.predicate_text))
        .join(" . ");

    let mut body = format!("?o a <{service_class}>");
    if !optionals.is_empty() {
        body.push_str(" . ");
        body.push_str(&optionals);
    }
    if let Some(cond) = condition {
        body.push_str(" . ");
        body.push_str(cond);
    }

    let mut text = format!("SELECT {} WHERE {{ {body} }}", select_columns.join(" "));

    if unique && !var_names.is_empty() {
        text.push_str(&format!(" GROUP BY {}", var_names.join(" ")));
    }

    if !sort.is_empty() {
        let order = sort
            .iter()
            .map(|s| match s.direction {
                SortDirection::Ascending => format!("ASC({})", s.var),
                SortDirection::Descending => format!("DESC({})", s.var),
            })
            .join(" ");
        text.push_str(&format!(" ORDER BY {order}"));
    }
    if let Some(limit) = limit {
        text.push_str(&format!(" LIMIT {limit}"));
    }
    if let Some(offset) = offset {
        text.push_str(&format!(" OFFSET {offset}"));
    }

    Statement { text, bindings: state.bindings().to_vec() }
}

/// `DELETE { predi ?vi } INSERT { predi 'vali' } WHERE { ?o a <class> ;
/// nie:url '<escaped_uri>' . OPTIONAL{predi ?vi} }`
///
/// Values are interpolated (pre-escaped via [`rdf_escape`]) because the
/// indexer's update endpoint has no prepared-statement form.
pub fn build_update(service_class: &str, uri: &str, sets: &[(TrackerKey, String)]) -> Statement {
    let vars: Vec<String> = (0..sets.len()).map(|i| format!("?u{i}")).collect();

    let deletes = sets
        .iter()
        .zip(&vars)
        .map(|((tracker, _), var)| format!("{} {var}", tracker.predicate_text))
        .join(" . ");
    let inserts = sets
        .iter()
        .map(|(tracker, value)| format!("{} '{}'", tracker.predicate_text, rdf_escape(value)))
        .join(" . ");
    let optionals = sets
        .iter()
        .zip(&vars)
        .map(|((tracker, _), var)| format!("OPTIONAL {{ {} {var} }}", tracker.predicate_text))
        .join(" . ");

    let text = format!(
        "DELETE {{ {deletes} }} INSERT {{ {inserts} }} WHERE {{ ?o a <{service_class}> ; \
         nie:url '{}' . {optionals} }}",
        rdf_escape(uri)
    );

    Statement { text, bindings: Vec::new() }
}

/// `DELETE WHERE { ?o a <class> ; nie:url '<uri>' . ?o ?p ?v }` — removes
/// every triple about one entity in a single round trip.
pub fn build_destroy(service_class: &str, uri: &str) -> Statement {
    Statement {
        text: format!(
            "DELETE WHERE {{ ?o a <{service_class}> ; nie:url '{}' . ?o ?p ?v }}",
            rdf_escape(uri)
        ),
        bindings: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::registry::ValueType;

    fn col(key: HostKey, predicate: &'static str) -> SelectColumn {
        SelectColumn { key, tracker: TrackerKey { predicate_text: predicate, value_type: ValueType::String } }
    }

    #[test]
    fn meta_statement_orders_uri_first() {
        let mut state = SparqlBuilderState::new();
        let stmt = build_meta(
            "nmm:MusicPiece",
            &[col(HostKey::Title, "?o nie:title")],
            &["file:///a.mp3".to_string()],
            &mut state,
        );
        assert!(stmt.text.starts_with("SELECT ?uri ?v0"));
        assert!(stmt.text.contains("FILTER(?uri IN (~_0))"));
        assert_eq!(stmt.bindings, vec![("_0".to_string(), "file:///a.mp3".to_string())]);
    }

    #[test]
    fn select_by_uri_binds_value() {
        let mut state = SparqlBuilderState::new();
        let stmt = build_select("nmm:MusicPiece", "file:///a.mp3", &mut state);
        assert!(stmt.text.contains("nie:url ~_0"));
        assert_eq!(stmt.bindings[0].1, "file:///a.mp3");
    }

    #[test]
    fn create_unique_groups_by_selected_columns() {
        let mut state = SparqlBuilderState::new();
        let vars = vec![state.fresh_var()];
        let stmt = build_create(
            "nmm:MusicPiece",
            &[col(HostKey::Artist, "?o nmm:performer/nmm:artistName")],
            &vars,
            None,
            &[],
            None,
            None,
            true,
            &Aggregates::default(),
            &mut state,
        );
        assert!(stmt.text.contains("GROUP BY ?v0"));
    }

    #[test]
    fn create_list_is_not_grouped() {
        let mut state = SparqlBuilderState::new();
        let vars = vec![state.fresh_var()];
        let stmt = build_create(
            "nmm:MusicPiece",
            &[col(HostKey::Title, "?o nie:title")],
            &vars,
            None,
            &[],
            Some(10),
            Some(0),
            false,
            &Aggregates::default(),
            &mut state,
        );
        assert!(!stmt.text.contains("GROUP BY"));
        assert!(stmt.text.contains("LIMIT 10"));
        assert!(stmt.text.contains("OFFSET 0"));
    }

    #[test]
    fn distinct_count_targets_the_supplied_variable() {
        let mut state = SparqlBuilderState::new();
        let vars = vec![state.fresh_var()];
        let aggregates = Aggregates {
            count_target: Some(CountTarget::Distinct),
            count_var: Some("?v0".to_string()),
            ..Default::default()
        };
        let stmt = build_create(
            "nmm:MusicPiece",
            &[col(HostKey::Genre, "?o nfo:genre")],
            &vars,
            None,
            &[],
            None,
            None,
            true,
            &aggregates,
            &mut state,
        );
        assert!(stmt.text.contains("COUNT(DISTINCT ?v0)"));
        assert!(!stmt.text.contains("COUNT(DISTINCT ?o)"));
    }

    #[test]
    fn update_escapes_values_but_not_structure() {
        let sets = vec![(
            TrackerKey { predicate_text: "?o nie:usageCounter", value_type: ValueType::Int },
            "it's \\ a test\nline".to_string(),
        )];
        let stmt = build_update("nmm:MusicPiece", "file:///a.mp3", &sets);
        assert!(stmt.text.contains("it\\'s \\\\ a test\\nline"));
        assert!(stmt.bindings.is_empty());
    }

    #[test]
    fn destroy_deletes_every_triple_about_the_entity() {
        let stmt = build_destroy("nmm:MusicPiece", "file:///a.mp3");
        assert!(stmt.text.starts_with("DELETE WHERE"));
        assert!(stmt.text.contains("?o ?p ?v"));
    }

    #[test]
    fn rdf_escape_order_avoids_double_escaping() {
        assert_eq!(rdf_escape("back\\slash"), "back\\\\slash");
        assert_eq!(rdf_escape("quo'te"), "quo\\'te");
        assert_eq!(rdf_escape("line\none"), "line\\none");
    }
}
