//! The individual modular checks run by [`super::validate`]. Each function
//! matches the [`super::CheckFn`] signature: `(graph, original_text,
//! stripped_text, role_set_version) -> (errors, warnings)`.

use std::collections::{HashMap, HashSet};

use crate::domain::penman::Graph;

use super::Issue;

const BASE_ROLES: &[&str] = &[
    "ARG0", "ARG1", "ARG2", "ARG3", "ARG4", "ARG5", "ARG6", "ARGM-ADV", "ARGM-CAU", "ARGM-CND",
    "ARGM-DIR", "ARGM-DIS", "ARGM-EXT", "ARGM-LOC", "ARGM-MNR", "ARGM-MOD", "ARGM-NEG",
    "ARGM-PRD", "ARGM-PRP", "ARGM-REC", "ARGM-TMP",
];

const PROPBANK_EXTRA_ROLES: &[&str] = &["ARGM-CAUS", "ARGM-ADJ"];

fn allowed_roles(role_set_version: &str) -> HashSet<&'static str> {
    let mut set: HashSet<&'static str> = BASE_ROLES.iter().copied().collect();
    if role_set_version.to_lowercase().starts_with("tr-propbank") {
        set.extend(PROPBANK_EXTRA_ROLES.iter().copied());
    }
    set
}

fn is_variable_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

pub fn check_root(
    graph: &Graph,
    _original: &str,
    _stripped: &str,
    _role_set_version: &str,
) -> (Vec<Issue>, Vec<Issue>) {
    let mut errors = Vec::new();
    if graph.top.is_empty() {
        errors.push(Issue::error("missing_root", "graph has no top variable"));
        return (errors, Vec::new());
    }
    let has_instance = graph
        .instance_triples()
        .any(|t| t.source == graph.top);
    if !has_instance {
        errors.push(Issue::error(
            "uninstantiated_root",
            format!("top variable '{}' has no :instance triple", graph.top),
        ));
    }
    (errors, Vec::new())
}

pub fn check_variables(
    graph: &Graph,
    _original: &str,
    _stripped: &str,
    _role_set_version: &str,
) -> (Vec<Issue>, Vec<Issue>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let mut instances: HashMap<&str, &str> = HashMap::new();
    let mut instance_count = 0usize;
    for triple in graph.instance_triples() {
        instance_count += 1;
        if !is_variable_name(&triple.source) {
            errors.push(Issue::error(
                "invalid_variable_name",
                format!("variable '{}' is not a valid identifier", triple.source),
            ));
        }
        match instances.get(triple.source.as_str()) {
            Some(existing) if *existing != triple.target => {
                errors.push(
                    Issue::error(
                        "conflicting_instances",
                        format!(
                            "variable '{}' bound to both '{}' and '{}'",
                            triple.source, existing, triple.target
                        ),
                    )
                    .with_context(serde_json::json!({
                        "variable": triple.source,
                        "first": existing,
                        "second": triple.target,
                    })),
                );
            }
            _ => {
                instances.insert(triple.source.as_str(), triple.target.as_str());
            }
        }
    }

    if instance_count == 0 {
        warnings.push(Issue::warning("no_instances", "graph has no :instance triples"));
    }

    let mut dangling: Vec<&str> = Vec::new();
    for triple in graph.non_instance_triples() {
        let target = triple.target.as_str();
        let looks_like_variable = is_variable_name(target) && !instances.contains_key(target);
        // Constants written as bare lowercase words ("imperative", "quick") or
        // hyphenated predicate senses ("sleep-01") are variable-shaped by
        // `is_variable_name` too. Real variable tags in this corpus are short
        // mnemonic codes (b, p, c12) with no hyphen; anything longer or
        // hyphenated is a concept/constant, not a dangling reference.
        if looks_like_variable
            && target.chars().next().is_some_and(|c| c.is_lowercase())
            && target.len() <= 3
            && !target.contains('-')
        {
            dangling.push(target);
        }
    }
    dangling.sort();
    dangling.dedup();
    for var in dangling {
        errors.push(Issue::error(
            "dangling_variable",
            format!("variable '{var}' is referenced but never instantiated"),
        ));
    }

    (errors, warnings)
}

pub fn check_reentrancy(
    graph: &Graph,
    _original: &str,
    _stripped: &str,
    _role_set_version: &str,
) -> (Vec<Issue>, Vec<Issue>) {
    let instances: HashSet<&str> = graph.instance_triples().map(|t| t.source.as_str()).collect();
    let mut incoming: HashMap<&str, usize> = HashMap::new();
    for triple in graph.non_instance_triples() {
        if instances.contains(triple.target.as_str()) {
            *incoming.entry(triple.target.as_str()).or_insert(0) += 1;
        }
    }
    let mut reentrant: Vec<(&str, usize)> = incoming
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .collect();
    reentrant.sort_by_key(|(node, _)| *node);

    let warnings = reentrant
        .into_iter()
        .map(|(node, count)| {
            Issue::warning(
                "reentrancy",
                format!("node '{node}' has {count} incoming edges"),
            )
            .with_context(serde_json::json!({ "node": node, "incoming_edges": count }))
        })
        .collect();

    (Vec::new(), warnings)
}

pub fn check_triple_count(
    graph: &Graph,
    _original: &str,
    _stripped: &str,
    _role_set_version: &str,
) -> (Vec<Issue>, Vec<Issue>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if graph.triples.is_empty() {
        errors.push(Issue::error("no_triples", "graph has zero triples"));
    } else if graph.instance_triples().next().is_none() {
        warnings.push(Issue::warning(
            "no_instance_triples",
            "graph has triples but none are :instance triples",
        ));
    }

    (errors, warnings)
}

pub fn check_roles(
    graph: &Graph,
    _original: &str,
    _stripped: &str,
    role_set_version: &str,
) -> (Vec<Issue>, Vec<Issue>) {
    check_roles_for(graph, role_set_version)
}

fn check_roles_for(graph: &Graph, role_set_version: &str) -> (Vec<Issue>, Vec<Issue>) {
    let allowed = allowed_roles(role_set_version);
    let mut offenders: Vec<String> = Vec::new();
    let mut saw_arg_role = false;

    for triple in graph.non_instance_triples() {
        let upper = triple.role.to_uppercase();
        if !upper.starts_with("ARG") {
            continue;
        }
        saw_arg_role = true;
        if !allowed.contains(upper.as_str()) {
            offenders.push(upper);
        }
    }

    let mut errors = Vec::new();
    if !offenders.is_empty() {
        offenders.sort();
        offenders.dedup();
        errors.push(
            Issue::error(
                "role_mismatch",
                format!("roles not in the allowed set: {}", offenders.join(", ")),
            )
            .with_context(serde_json::json!({ "offenders": offenders })),
        );
    }

    let warnings = if !saw_arg_role {
        vec![Issue::warning(
            "no_roles_detected",
            "no PropBank-style ARG role found on the graph",
        )]
    } else {
        Vec::new()
    };

    (errors, warnings)
}

pub fn check_lint(
    graph: &Graph,
    original: &str,
    stripped: &str,
    _role_set_version: &str,
) -> (Vec<Issue>, Vec<Issue>) {
    let mut lints = Vec::new();

    let mut seen: HashSet<(&str, &str)> = HashSet::new();
    let mut duplicated: Vec<(String, String)> = Vec::new();
    for triple in &graph.triples {
        let key = (triple.source.as_str(), triple.role.as_str());
        if !seen.insert(key) {
            duplicated.push((triple.source.clone(), triple.role.clone()));
        }
    }
    duplicated.sort();
    duplicated.dedup();
    for (source, role) in duplicated {
        lints.push(Issue::lint(
            "duplicate_roles",
            format!("role ':{role}' repeated on node '{source}'"),
        ));
    }

    if original.trim() != original && original != stripped {
        lints.push(Issue::lint(
            "leading_trailing_whitespace",
            "submission had leading or trailing whitespace",
        ));
    }

    (Vec::new(), lints)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::penman::decode;

    #[test]
    fn root_missing_instance_detected() {
        let graph = decode("(b / buy-01)").unwrap();
        let (errors, _) = check_root(&graph, "", "", "tr-propbank");
        assert!(errors.is_empty());
    }

    #[test]
    fn reentrancy_counts_multiple_incoming_edges() {
        let graph =
            decode("(w / want-01 :ARG0 (b / boy) :ARG1 (g / go-01 :ARG0 b) :ARG2 b)").unwrap();
        let (_, warnings) = check_reentrancy(&graph, "", "", "tr-propbank");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].code, "reentrancy");
    }

    #[test]
    fn role_set_extends_for_tr_propbank() {
        let graph = decode("(b / buy-01 :ARGM-CAUS (c / cause-01))").unwrap();
        let (errors, _) = check_roles_for(&graph, "tr-propbank-v2");
        assert!(errors.is_empty());
        let (errors_base, _) = check_roles_for(&graph, "unknown-set");
        assert!(!errors_base.is_empty());
    }

    #[test]
    fn bare_word_and_predicate_sense_constants_are_not_flagged_as_dangling() {
        let graph = decode(
            "(s / sleep-01 :ARG0 (b / boy) :mode imperative :manner quick)",
        )
        .unwrap();
        let (errors, _) = check_variables(&graph, "", "", "tr-propbank");
        assert!(
            errors.iter().all(|e| e.code != "dangling_variable"),
            "errors: {:?}",
            errors
        );
    }

    #[test]
    fn short_uninstantiated_token_is_still_flagged_as_dangling() {
        let graph = decode("(b / boy :ARG0 (b / bark-01) :ARG1 x)").unwrap();
        let (errors, _) = check_variables(&graph, "", "", "tr-propbank");
        assert!(errors.iter().any(|e| e.code == "dangling_variable"));
    }

    #[test]
    fn duplicate_roles_are_linted() {
        let graph = decode("(b / buy-01 :ARG0 (p / person) :ARG0 (q / person))").unwrap();
        let (_, lints) = check_lint(
            &graph,
            "(b / buy-01 :ARG0 (p / person) :ARG0 (q / person))",
            "(b / buy-01 :ARG0 (p / person) :ARG0 (q / person))",
            "tr-propbank",
        );
        assert!(lints.iter().any(|l| l.code == "duplicate_roles"));
    }
}
