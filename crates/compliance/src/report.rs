use serde::{Deserialize, Serialize};

/// Structured outcome of a FIRS validation.
///
/// The full lists are always kept; [`ComplianceReport::summary`] is for
/// short-lived notifications only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
}

impl ComplianceReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.errors.push(message.into());
        self
    }

    pub fn warning(mut self, message: impl Into<String>) -> Self {
        self.warnings.push(message.into());
        self
    }

    pub fn suggestion(mut self, message: impl Into<String>) -> Self {
        self.suggestions.push(message.into());
        self
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty() && self.suggestions.is_empty()
    }

    /// One line naming at most `limit` errors, e.g.
    /// `2 error(s): missing TIN; bad HS code (+1 more)`.
    pub fn summary(&self, limit: usize) -> String {
        if self.errors.is_empty() {
            return match self.warnings.len() {
                0 => "no issues".to_string(),
                n => format!("{n} warning(s)"),
            };
        }

        let shown: Vec<&str> = self.errors.iter().take(limit).map(String::as_str).collect();
        let hidden = self.errors.len() - shown.len();
        let mut line = format!("{} error(s): {}", self.errors.len(), shown.join("; "));
        if hidden > 0 {
            line.push_str(&format!(" (+{hidden} more)"));
        }
        line
    }
}

impl core::fmt::Display for ComplianceReport {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.summary(3))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_truncates_but_keeps_the_full_list() {
        let report = ComplianceReport::new()
            .error("buyer TIN missing")
            .error("HS code invalid on line 2")
            .error("tax category unknown")
            .warning("due date in the past");

        assert_eq!(
            report.summary(2),
            "3 error(s): buyer TIN missing; HS code invalid on line 2 (+1 more)"
        );
        assert_eq!(report.errors.len(), 3);
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn warnings_only_report_has_no_errors() {
        let report = ComplianceReport::new().warning("note is empty");
        assert!(!report.has_errors());
        assert!(!report.is_clean());
        assert_eq!(report.summary(3), "1 warning(s)");
    }
}
