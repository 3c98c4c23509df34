//! The AMR validation and canonicalization pipeline: parse PENMAN text,
//! run a fixed list of pluggable checks over the decoded graph, and produce
//! a structured report plus a canonical re-encoding.

pub mod rules;

use serde::{Deserialize, Serialize};

use crate::domain::penman::{self, Graph};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
    Lint,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Issue {
    pub code: String,
    pub message: String,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

impl Issue {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            severity: Severity::Error,
            context: None,
        }
    }

    pub fn warning(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            severity: Severity::Warning,
            context: None,
        }
    }

    pub fn lint(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            severity: Severity::Lint,
            context: None,
        }
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub amr_version: String,
    pub role_set_version: String,
    pub rule_version: String,
    pub triple_count: Option<usize>,
    pub canonical_penman: Option<String>,
    pub errors: Vec<Issue>,
    pub warnings: Vec<Issue>,
}

/// The version triple a project stamps every annotation, failed submission
/// and validation report with.
#[derive(Debug, Clone)]
pub struct VersionTriple {
    pub amr_version: String,
    pub role_set_version: String,
    pub rule_version: String,
}

/// A pluggable check: given the decoded graph, the original text, the
/// stripped text, and the project's `role_set_version`, produce zero or
/// more errors/warnings. Every check runs regardless of what earlier
/// checks found.
pub type CheckFn = fn(&Graph, &str, &str, &str) -> (Vec<Issue>, Vec<Issue>);

/// The ordered list of checks the pipeline runs. A systems-language
/// equivalent of the source's `(name, fn)` tuple list: each entry is a
/// plain function with a fixed signature, registered here in order.
pub const CHECKS: &[(&str, CheckFn)] = &[
    ("root", rules::check_root),
    ("variables", rules::check_variables),
    ("reentrancy", rules::check_reentrancy),
    ("triple_count", rules::check_triple_count),
    ("roles", rules::check_roles),
    ("lint", rules::check_lint),
];

/// Runs the full pipeline: normalize, fast-reject, balance check, decode,
/// run every check, canonicalize. Never fails — parse/decode failures are
/// captured as report errors instead of a `Result::Err`.
pub fn validate(raw_text: &str, versions: &VersionTriple) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let stripped = normalize(raw_text);

    if stripped.trim().is_empty() {
        errors.push(Issue::error("empty_input", "submission is empty"));
        return finish(versions, errors, warnings, None, None);
    }

    if !penman::parens_balanced(&stripped) {
        errors.push(Issue::error(
            "parse_error",
            "unbalanced parentheses in submission",
        ));
        return finish(versions, errors, warnings, None, None);
    }

    let graph = match penman::decode(&stripped) {
        Ok(graph) => graph,
        Err(err) => {
            errors.push(
                Issue::error("parse_error", "failed to decode PENMAN graph")
                    .with_context(serde_json::json!({ "detail": err.to_string() })),
            );
            return finish(versions, errors, warnings, None, None);
        }
    };

    for (_name, check) in CHECKS {
        let (mut check_errors, mut check_warnings) =
            check(&graph, raw_text, &stripped, &versions.role_set_version);
        errors.append(&mut check_errors);
        warnings.append(&mut check_warnings);
    }

    let canonical = penman::encode(&graph);
    let triple_count = graph.triples.len();

    finish(
        versions,
        errors,
        warnings,
        Some(triple_count),
        Some(canonical),
    )
}

fn normalize(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn finish(
    versions: &VersionTriple,
    errors: Vec<Issue>,
    warnings: Vec<Issue>,
    triple_count: Option<usize>,
    canonical_penman: Option<String>,
) -> ValidationReport {
    ValidationReport {
        is_valid: errors.is_empty(),
        amr_version: versions.amr_version.clone(),
        role_set_version: versions.role_set_version.clone(),
        rule_version: versions.rule_version.clone(),
        triple_count,
        canonical_penman,
        errors,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn versions() -> VersionTriple {
        VersionTriple {
            amr_version: "1.0".to_string(),
            role_set_version: "tr-propbank".to_string(),
            rule_version: "v1".to_string(),
        }
    }

    #[test]
    fn empty_input_is_invalid() {
        let report = validate("   \n  ", &versions());
        assert!(!report.is_valid);
        assert!(report.errors.iter().any(|e| e.code == "empty_input"));
        assert!(report.canonical_penman.is_none());
    }

    #[test]
    fn valid_graph_produces_canonical_form_and_triple_count() {
        let report = validate("(b / buy-01 :ARG0 (p / person))", &versions());
        assert!(report.is_valid, "errors: {:?}", report.errors);
        assert_eq!(report.triple_count, Some(3));
        assert!(report.canonical_penman.is_some());
    }

    #[test]
    fn unbalanced_parens_yield_parse_error() {
        let report = validate("(b / buy-01", &versions());
        assert!(!report.is_valid);
        assert!(report.errors.iter().any(|e| e.code == "parse_error"));
    }

    #[test]
    fn disallowed_role_is_reported_but_canonical_form_is_still_recorded() {
        let report = validate("(b / buy-01 :ARG9 (p / person))", &versions());
        assert!(!report.is_valid);
        assert!(report.errors.iter().any(|e| e.code == "role_mismatch"));
        assert!(report.triple_count.is_some());
        assert!(report.canonical_penman.is_some());
    }

    #[test]
    fn conflicting_instance_and_dangling_variable_detected_with_canonical_form_retained() {
        let report = validate(
            "(b / boy :ARG0 (b / bark-01) :ARG1 x)",
            &versions(),
        );
        assert!(!report.is_valid);
        assert!(report
            .errors
            .iter()
            .any(|e| e.code == "conflicting_instances"));
        assert!(report.errors.iter().any(|e| e.code == "dangling_variable"));
        assert!(report.triple_count.is_some());
        assert!(report.canonical_penman.is_some());
    }

    #[test]
    fn idempotent_on_canonical_form() {
        let first = validate("(b / buy-01 :ARG0 (p / person) :ARG1 (c / car))", &versions());
        let canonical = first.canonical_penman.clone().unwrap();
        let second = validate(&canonical, &versions());
        assert_eq!(second.canonical_penman, Some(canonical));
    }
}
