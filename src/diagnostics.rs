//! Record of everything the importer recovered from or flagged.
//!
//! The importer is fail-soft: malformed fields take defaults and malformed
//! records are skipped. Nothing is lost silently though; each of those events
//! lands here with its line number so a caller can review the case.

use log::{debug, warn};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Imported, but with a defaulted value or a heuristic near its threshold.
    Warning,
    /// The record was not imported.
    Error,
}

/// Issue categories.
pub mod category {
    pub const PARSE: &str = "parse";
    pub const RECORD: &str = "record";
    pub const REVIEW: &str = "review";
    pub const MODEL: &str = "model";
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportIssue {
    pub severity: Severity,
    pub category: String,
    pub message: String,
    /// 1-based line in the input.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    /// `"Bus 14"`, `"Branch 1-2"`, ...
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportStats {
    pub buses: usize,
    pub lines: usize,
    pub transformers: usize,
    pub loads: usize,
    pub generators: usize,
    pub shunts: usize,
    pub skipped_lines: usize,
    pub defaulted_values: usize,
    /// Branches whose endpoints were not in the bus set.
    pub dropped_branches: usize,
    /// DGER records seen and not modelled.
    pub generator_records: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportDiagnostics {
    pub stats: ImportStats,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<ImportIssue>,
}

impl ImportDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(
        &mut self,
        severity: Severity,
        category: &str,
        message: String,
        line: Option<usize>,
        entity: Option<String>,
    ) {
        self.issues.push(ImportIssue {
            severity,
            category: category.to_string(),
            message,
            line,
            entity,
        });
    }

    /// A field fell back to its default value.
    pub fn defaulted(&mut self, line: usize, entity: &str, field: &str, default: f64) {
        self.stats.defaulted_values += 1;
        debug!("line {}: {}: malformed {}, defaulted to {}", line, entity, field, default);
        self.push(
            Severity::Warning,
            category::PARSE,
            format!("malformed {field}, defaulted to {default}"),
            Some(line),
            Some(entity.to_string()),
        );
    }

    /// A whole record was skipped.
    pub fn skipped(&mut self, line: usize, message: impl Into<String>) {
        self.stats.skipped_lines += 1;
        self.push(Severity::Error, category::RECORD, message.into(), Some(line), None);
    }

    /// A heuristic decided something close to its threshold.
    pub fn review(&mut self, line: usize, entity: &str, message: impl Into<String>) {
        let message = message.into();
        warn!("line {}: {}: {}", line, entity, message);
        self.push(
            Severity::Warning,
            category::REVIEW,
            message,
            Some(line),
            Some(entity.to_string()),
        );
    }

    /// Something about the input as a whole deserves a second look.
    pub fn review_input(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.push(Severity::Warning, category::REVIEW, message, None, None);
    }

    /// A model-level adjustment made after parsing (slack synthesis, demotion).
    pub fn model_warning(&mut self, entity: &str, message: impl Into<String>) {
        self.push(
            Severity::Warning,
            category::MODEL,
            message.into(),
            None,
            Some(entity.to_string()),
        );
    }

    pub fn warning_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .count()
    }

    pub fn error_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .count()
    }

    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }

    pub fn in_category<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a ImportIssue> {
        self.issues.iter().filter(move |i| i.category == category)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_by_severity() {
        let mut diag = ImportDiagnostics::new();
        diag.defaulted(3, "Bus 1", "voltage", 1.0);
        diag.skipped(4, "unparseable bus id");
        diag.review(9, "Branch 1-2", "tap 1.0012 close to nominal");

        assert_eq!(diag.warning_count(), 2);
        assert_eq!(diag.error_count(), 1);
        assert_eq!(diag.stats.defaulted_values, 1);
        assert_eq!(diag.stats.skipped_lines, 1);
        assert_eq!(diag.in_category(category::REVIEW).count(), 1);
    }

    #[test]
    fn input_review_has_no_line() {
        let mut diag = ImportDiagnostics::new();
        diag.review_input("input looks like UTF-8");
        let issue = diag.in_category(category::REVIEW).next().unwrap();
        assert_eq!(issue.severity, Severity::Warning);
        assert_eq!(issue.line, None);
        assert_eq!(issue.entity, None);
        assert_eq!(diag.stats.defaulted_values, 0);
    }

    #[test]
    fn json_shape() {
        let mut diag = ImportDiagnostics::new();
        diag.stats.buses = 14;
        diag.defaulted(47, "Bus 7", "qmax", 0.0);

        let json = diag.to_json().unwrap();
        assert!(json.contains("\"buses\": 14"));
        assert!(json.contains("\"warning\""));
        assert!(json.contains("\"line\": 47"));
        assert!(json.contains("\"entity\": \"Bus 7\""));
    }
}
