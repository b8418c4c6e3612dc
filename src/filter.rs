//! Filter compiler (spec.md §4.3): turns a host filter tree into a SPARQL
//! FILTER fragment plus value bindings.
//!
//! The tree shape mirrors the teacher's `mpd_protocol::query::{Filter,
//! QueryNode}` (a flat `Filter` leaf enum plus `Filter`/`NegatedFilter`/`And`
//! combinators) extended with `Or`, since this spec requires top-level `or`
//! composition that the teacher never implemented (its `or`/`not` rules in
//! `command_parser/query.rs` are still `todo!()`).

use itertools::Itertools;

use crate::objectid::ServiceKind;
use crate::registry::{HostKey, KeyRegistry, ValueType};
use crate::sparql::SparqlBuilderState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterLeaf {
    Eq { key: HostKey, value: String },
    Lt { key: HostKey, value: String },
    Gt { key: HostKey, value: String },
    Approx { key: HostKey, value: String },
    /// `exists` has no value to bind and is explicitly unsupported.
    Exists { key: HostKey },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterNode {
    Leaf(FilterLeaf),
    NegatedLeaf(FilterLeaf),
    And(Vec<FilterNode>),
    Or(Vec<FilterNode>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    #[error("key is not supported in filters")]
    UnsupportedKey,
    #[error("`exists` filters are not supported")]
    UnsupportedFilter,
}

/// A self-contained WHERE-clause fragment: `joins` are OPTIONAL graph
/// patterns that must run before `condition`, which is the boolean
/// expression to splice into a `FILTER(...)`.
struct Fragment {
    joins: Vec<String>,
    condition: String,
}

impl Fragment {
    fn render(&self) -> String {
        let mut out = self.joins.join(" . ");
        if !out.is_empty() {
            out.push_str(" . ");
        }
        out.push_str(&format!("FILTER({})", self.condition));
        out
    }
}

/// Convert a URI-valued key's value into a filesystem path the indexer
/// stores, per spec.md §4.3 ("A URI-valued key's value is converted to a
/// filesystem path before binding").
fn uri_value_to_path(value: &str) -> String {
    value.strip_prefix("file://").unwrap_or(value).to_string()
}

fn leaf_value_type(key: HostKey) -> ValueType {
    KeyRegistry::lookup_meta(key).map(|m| m.value_type).unwrap_or(ValueType::String)
}

fn compile_leaf(
    leaf: &FilterLeaf,
    service: ServiceKind,
    state: &mut SparqlBuilderState,
) -> Result<Fragment, FilterError> {
    let key = match leaf {
        FilterLeaf::Eq { key, .. }
        | FilterLeaf::Lt { key, .. }
        | FilterLeaf::Gt { key, .. }
        | FilterLeaf::Approx { key, .. }
        | FilterLeaf::Exists { key } => *key,
    };
    if !KeyRegistry::is_supported(key) {
        return Err(FilterError::UnsupportedKey);
    }
    let tracker = KeyRegistry::lookup_tracker(key, service).ok_or(FilterError::UnsupportedKey)?;

    match leaf {
        FilterLeaf::Exists { .. } => Err(FilterError::UnsupportedFilter),
        FilterLeaf::Eq { value, .. } if value.is_empty() => {
            let var = state.fresh_var();
            Ok(Fragment {
                joins: vec![format!("OPTIONAL {{ {} {var} }}", tracker.predicate_text)],
                condition: format!("{var}='' || !bound({var})"),
            })
        }
        FilterLeaf::Eq { value, .. } => {
            let value = if key == HostKey::Uri { uri_value_to_path(value) } else { value.clone() };
            let var = state.fresh_var();
            let placeholder = state.bind(value);
            Ok(Fragment {
                joins: vec![format!("OPTIONAL {{ {} {var} }}", tracker.predicate_text)],
                condition: format!("{var} = {placeholder}"),
            })
        }
        FilterLeaf::Approx { value, .. } => {
            let var = state.fresh_var();
            let placeholder = state.bind(value.clone());
            Ok(Fragment {
                joins: vec![format!("OPTIONAL {{ {} {var} }}", tracker.predicate_text)],
                condition: format!("CONTAINS({var}, {placeholder})"),
            })
        }
        FilterLeaf::Lt { value, .. } | FilterLeaf::Gt { value, .. } => {
            let op = if matches!(leaf, FilterLeaf::Lt { .. }) { "<" } else { ">" };
            let var = state.fresh_var();
            let placeholder = state.bind(value.clone());
            // Numeric types compare numerically; dates use ISO-8601 string
            // ordering, which is lexically monotonic, so the same operator
            // works unchanged.
            let _ = leaf_value_type(key);
            Ok(Fragment {
                joins: vec![format!("OPTIONAL {{ {} {var} }}", tracker.predicate_text)],
                condition: format!("{var} {op} {placeholder}"),
            })
        }
    }
}

/// Negate a leaf. `Eq` reduces cleanly to `FILTER NOT EXISTS`; every other
/// leaf kind falls back to negating the scalar predicate in place, per the
/// spec's explicit fallback ("else negates the scalar predicate").
fn compile_negated_leaf(
    leaf: &FilterLeaf,
    service: ServiceKind,
    state: &mut SparqlBuilderState,
) -> Result<Fragment, FilterError> {
    match leaf {
        FilterLeaf::Eq { key, value } if !value.is_empty() => {
            if !KeyRegistry::is_supported(*key) {
                return Err(FilterError::UnsupportedKey);
            }
            let tracker =
                KeyRegistry::lookup_tracker(*key, service).ok_or(FilterError::UnsupportedKey)?;
            let value = if *key == HostKey::Uri { uri_value_to_path(value) } else { value.clone() };
            let var = state.fresh_var();
            let placeholder = state.bind(value);
            Ok(Fragment {
                joins: vec![],
                condition: format!(
                    "NOT EXISTS {{ {} {var} . FILTER({var} = {placeholder}) }}",
                    tracker.predicate_text
                ),
            })
        }
        other => {
            let inner = compile_leaf(other, service, state)?;
            Ok(Fragment { joins: inner.joins, condition: format!("!({})", inner.condition) })
        }
    }
}

fn compile_node(
    node: &FilterNode,
    service: ServiceKind,
    state: &mut SparqlBuilderState,
) -> Result<Fragment, FilterError> {
    match node {
        FilterNode::Leaf(leaf) => compile_leaf(leaf, service, state),
        FilterNode::NegatedLeaf(leaf) => compile_negated_leaf(leaf, service, state),
        FilterNode::And(children) => {
            let mut fragments = Vec::with_capacity(children.len());
            for child in children {
                fragments.push(compile_node(child, service, state)?);
            }
            Ok(Fragment {
                joins: fragments.iter().flat_map(|f| f.joins.clone()).collect(),
                condition: fragments.iter().map(|f| format!("({})", f.condition)).join(" && "),
            })
        }
        FilterNode::Or(children) => {
            let mut fragments = Vec::with_capacity(children.len());
            for child in children {
                fragments.push(compile_node(child, service, state)?);
            }
            Ok(Fragment {
                joins: fragments.iter().flat_map(|f| f.joins.clone()).collect(),
                condition: fragments.iter().map(|f| format!("({})", f.condition)).join(" || "),
            })
        }
    }
}

/// Compile a filter tree into a WHERE-block fragment (suitable for
/// splicing with `" . "` into the SPARQL builder's body) plus the value
/// bindings it registered on `state`.
pub fn compile(
    filter: &FilterNode,
    service: ServiceKind,
    state: &mut SparqlBuilderState,
) -> Result<String, FilterError> {
    compile_node(filter, service, state).map(|f| f.render())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn eq_produces_optional_and_filter() {
        let mut state = SparqlBuilderState::new();
        let node = FilterNode::Leaf(FilterLeaf::Eq { key: HostKey::Artist, value: "Abba".into() });
        let frag = compile(&node, ServiceKind::Music, &mut state).unwrap();
        assert!(frag.contains("OPTIONAL {"));
        assert!(frag.contains("FILTER(?v0 = ~_0)"));
        assert_eq!(state.bindings()[0].1, "Abba");
    }

    #[test]
    fn empty_string_equality_matches_unset_or_blank() {
        let mut state = SparqlBuilderState::new();
        let node = FilterNode::Leaf(FilterLeaf::Eq { key: HostKey::Genre, value: String::new() });
        let frag = compile(&node, ServiceKind::Music, &mut state).unwrap();
        assert!(frag.contains("='' || !bound("));
        assert!(state.bindings().is_empty());
    }

    #[test]
    fn exists_is_unsupported() {
        let mut state = SparqlBuilderState::new();
        let node = FilterNode::Leaf(FilterLeaf::Exists { key: HostKey::Genre });
        assert_eq!(compile(&node, ServiceKind::Music, &mut state), Err(FilterError::UnsupportedFilter));
    }

    #[test]
    fn and_concatenates_with_dot() {
        let mut state = SparqlBuilderState::new();
        let node = FilterNode::And(vec![
            FilterNode::Leaf(FilterLeaf::Eq { key: HostKey::Artist, value: "Abba".into() }),
            FilterNode::Leaf(FilterLeaf::Eq { key: HostKey::Album, value: "Gold".into() }),
        ]);
        let frag = compile(&node, ServiceKind::Music, &mut state).unwrap();
        assert!(frag.contains("&&"));
        assert_eq!(state.bindings().len(), 2);
    }

    #[test]
    fn or_joins_inside_single_filter() {
        let mut state = SparqlBuilderState::new();
        let node = FilterNode::Or(vec![
            FilterNode::Leaf(FilterLeaf::Eq { key: HostKey::Artist, value: "Abba".into() }),
            FilterNode::Leaf(FilterLeaf::Eq { key: HostKey::Artist, value: "Abba2".into() }),
        ]);
        let frag = compile(&node, ServiceKind::Music, &mut state).unwrap();
        assert!(frag.contains("||"));
    }

    #[test]
    fn negated_eq_uses_not_exists() {
        let mut state = SparqlBuilderState::new();
        let node = FilterNode::NegatedLeaf(FilterLeaf::Eq { key: HostKey::Artist, value: "Abba".into() });
        let frag = compile(&node, ServiceKind::Music, &mut state).unwrap();
        assert!(frag.contains("NOT EXISTS"));
    }

    #[test]
    fn negated_lt_falls_back_to_scalar_negation() {
        let mut state = SparqlBuilderState::new();
        let node = FilterNode::NegatedLeaf(FilterLeaf::Lt { key: HostKey::TrackNumber, value: "5".into() });
        let frag = compile(&node, ServiceKind::Music, &mut state).unwrap();
        assert!(frag.contains("!("));
        assert!(!frag.contains("NOT EXISTS"));
    }

    #[test]
    fn uri_value_is_converted_to_path() {
        let mut state = SparqlBuilderState::new();
        let node =
            FilterNode::Leaf(FilterLeaf::Eq { key: HostKey::Uri, value: "file:///music/a.mp3".into() });
        compile(&node, ServiceKind::Music, &mut state).unwrap();
        assert_eq!(state.bindings()[0].1, "/music/a.mp3");
    }
}
