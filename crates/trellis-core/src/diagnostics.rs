//! Diagnostics collected while validating a superstructure.
//!
//! Validation walks the entity model before any optimization instance is
//! built and records everything it finds. Warnings describe unusual but
//! workable data (a unit with no declared successors, an unreachable unit);
//! errors describe data the model assembler must refuse (a split factor
//! targeting a unit that does not exist).
//!
//! # Example
//!
//! ```
//! use trellis_core::diagnostics::{Diagnostics, Severity};
//!
//! let mut diag = Diagnostics::new();
//! diag.add_warning("topology", "unit has no outgoing connections");
//! diag.add_error_with_entity("reference", "split factor targets undeclared unit", "unit 12");
//!
//! assert_eq!(diag.warning_count(), 1);
//! assert!(diag.has_errors());
//! ```

use serde::Serialize;

/// Severity level for diagnostic issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Unusual but model construction can continue
    Warning,
    /// Model construction must not proceed
    Error,
}

/// A single issue encountered while validating entity data
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticIssue {
    pub severity: Severity,
    /// Category for grouping (e.g., "reference", "topology", "parameter")
    pub category: String,
    pub message: String,
    /// Optional entity reference (e.g., "unit 12", "component Glucose")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
}

impl DiagnosticIssue {
    pub fn new(severity: Severity, category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            category: category.into(),
            message: message.into(),
            entity: None,
        }
    }

    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }
}

impl std::fmt::Display for DiagnosticIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let severity = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "[{}:{}] {}", severity, self.category, self.message)?;
        if let Some(entity) = &self.entity {
            write!(f, " ({})", entity)?;
        }
        Ok(())
    }
}

/// Collection of diagnostic issues for one validation pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<DiagnosticIssue>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_warning(&mut self, category: &str, message: &str) {
        self.issues
            .push(DiagnosticIssue::new(Severity::Warning, category, message));
    }

    pub fn add_warning_with_entity(&mut self, category: &str, message: &str, entity: &str) {
        self.issues
            .push(DiagnosticIssue::new(Severity::Warning, category, message).with_entity(entity));
    }

    pub fn add_error(&mut self, category: &str, message: &str) {
        self.issues
            .push(DiagnosticIssue::new(Severity::Error, category, message));
    }

    pub fn add_error_with_entity(&mut self, category: &str, message: &str, entity: &str) {
        self.issues
            .push(DiagnosticIssue::new(Severity::Error, category, message).with_entity(entity));
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

    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &DiagnosticIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &DiagnosticIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
    }

    /// Merge another diagnostics into this one
    pub fn merge(&mut self, other: Diagnostics) {
        self.issues.extend(other.issues);
    }

    pub fn summary(&self) -> String {
        let warnings = self.warning_count();
        let errors = self.error_count();
        match (warnings, errors) {
            (0, 0) => "No issues".to_string(),
            (w, 0) => format!("{} warning{}", w, if w == 1 { "" } else { "s" }),
            (0, e) => format!("{} error{}", e, if e == 1 { "" } else { "s" }),
            (w, e) => format!(
                "{} warning{}, {} error{}",
                w,
                if w == 1 { "" } else { "s" },
                e,
                if e == 1 { "" } else { "s" }
            ),
        }
    }
}

impl std::fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Diagnostics: {}", self.summary())?;
        for issue in &self.issues {
            writeln!(f, "  {}", issue)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_flags() {
        let mut diag = Diagnostics::new();
        diag.add_warning("topology", "unit has no successors");
        diag.add_error("reference", "connection targets undeclared unit");

        assert_eq!(diag.warning_count(), 1);
        assert_eq!(diag.error_count(), 1);
        assert!(diag.has_errors());
    }

    #[test]
    fn test_issue_display_includes_entity() {
        let issue = DiagnosticIssue::new(Severity::Error, "reference", "undeclared target")
            .with_entity("unit 12");
        let display = format!("{}", issue);
        assert!(display.contains("error"));
        assert!(display.contains("unit 12"));
    }

    #[test]
    fn test_summary_pluralization() {
        let mut diag = Diagnostics::new();
        assert_eq!(diag.summary(), "No issues");
        diag.add_warning("parameter", "defaulted full load hours");
        assert_eq!(diag.summary(), "1 warning");
        diag.add_warning("parameter", "defaulted cost exponent");
        diag.add_error("reference", "bad target");
        assert_eq!(diag.summary(), "2 warnings, 1 error");
    }

    #[test]
    fn test_serialization() {
        let mut diag = Diagnostics::new();
        diag.add_error_with_entity("reference", "undeclared target", "unit 12");
        let json = serde_json::to_string(&diag).unwrap();
        assert!(json.contains("\"error\""));
        assert!(json.contains("unit 12"));
    }

    #[test]
    fn test_merge() {
        let mut a = Diagnostics::new();
        a.add_warning("topology", "w");
        let mut b = Diagnostics::new();
        b.add_error("reference", "e");
        a.merge(b);
        assert_eq!(a.warning_count(), 1);
        assert_eq!(a.error_count(), 1);
    }
}
