//! Verification report
//!
//! Rows are appended through a [`ReportBuilder`] while the suite runs;
//! `finish` freezes them into an immutable [`VerificationReport`].

use std::fmt;

use serde::Serialize;

use crate::logging::LogLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Pass,
    Fail,
    Skip,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Pass => f.write_str("PASS"),
            Outcome::Fail => f.write_str("FAIL"),
            Outcome::Skip => f.write_str("SKIP"),
        }
    }
}

/// One row of the report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestResult {
    pub name: String,
    pub outcome: Outcome,
    pub reason: String,
    pub required: bool,
}

/// Non-fatal observation attached to the report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Note {
    pub level: LogLevel,
    pub test_name: String,
    pub message: String,
}

/// Append-only accumulator used while the suite runs
#[derive(Debug, Default)]
pub struct ReportBuilder {
    results: Vec<TestResult>,
    notes: Vec<Note>,
}

impl ReportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pass(&mut self, name: &str, required: bool, reason: impl Into<String>) {
        self.push(name, Outcome::Pass, required, reason.into());
    }

    pub fn fail(&mut self, name: &str, required: bool, reason: impl Into<String>) {
        self.push(name, Outcome::Fail, required, reason.into());
    }

    pub fn skip(&mut self, name: &str, required: bool, reason: impl Into<String>) {
        self.push(name, Outcome::Skip, required, reason.into());
    }

    pub fn note(&mut self, level: LogLevel, name: &str, message: impl Into<String>) {
        self.notes.push(Note {
            level,
            test_name: name.to_string(),
            message: message.into(),
        });
    }

    fn push(&mut self, name: &str, outcome: Outcome, required: bool, reason: String) {
        self.results.push(TestResult {
            name: name.to_string(),
            outcome,
            reason,
            required,
        });
    }

    pub fn finish(self) -> VerificationReport {
        let count = |o: Outcome| self.results.iter().filter(|r| r.outcome == o).count();
        let passed = count(Outcome::Pass);
        let failed = count(Outcome::Fail);
        let skipped = count(Outcome::Skip);
        VerificationReport {
            results: self.results,
            notes: self.notes,
            passed,
            failed,
            skipped,
        }
    }
}

/// Finished, immutable result of a verification run
#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    results: Vec<TestResult>,
    notes: Vec<Note>,
    passed: usize,
    failed: usize,
    skipped: usize,
}

impl VerificationReport {
    pub fn results(&self) -> &[TestResult] {
        &self.results
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn passed(&self) -> usize {
        self.passed
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Executed checks; skipped ones are counted separately
    pub fn total(&self) -> usize {
        self.passed + self.failed
    }

    pub fn success(&self) -> bool {
        self.failed == 0
    }

    pub fn exit_code(&self) -> i32 {
        if self.success() {
            0
        } else {
            1
        }
    }

    pub fn get(&self, name: &str) -> Option<&TestResult> {
        self.results.iter().find(|r| r.name == name)
    }

    /// Human-readable table
    pub fn render(&self) -> String {
        let mut output = String::from("Verification Report\n-------------------\n");
        for result in &self.results {
            output.push_str(&format!(
                "{:<5} {:<32} {}{}\n",
                result.outcome.to_string(),
                truncate(&result.name, 32),
                result.reason,
                if result.required { "" } else { " (optional)" }
            ));
        }
        if !self.notes.is_empty() {
            output.push_str("\nNotes:\n");
            for note in &self.notes {
                output.push_str(&format!("  [{}] {}: {}\n", note.level, note.test_name, note.message));
            }
        }
        output.push_str(&format!(
            "\nTotal: {} | Passed: {} | Failed: {} | Skipped: {}\n",
            self.total(),
            self.passed,
            self.failed,
            self.skipped
        ));
        output
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts() {
        let mut builder = ReportBuilder::new();
        builder.pass("installation", true, "claude 1.0");
        builder.fail("config_valid", true, "not JSON");
        builder.skip("capability:web_search", false, "SEARCH_API_KEY not set");
        builder.note(LogLevel::Warn, "capability:web_search", "web search unavailable");
        let report = builder.finish();

        assert_eq!(report.passed(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.total(), report.passed() + report.failed());
        assert_eq!(report.exit_code(), 1);
        assert_eq!(report.notes()[0].level, LogLevel::Warn);
    }

    #[test]
    fn test_order_preserved() {
        let mut builder = ReportBuilder::new();
        for name in ["a", "b", "c"] {
            builder.pass(name, true, "");
        }
        let report = builder.finish();
        let names: Vec<_> = report.results().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert!(report.success());
    }

    #[test]
    fn test_render_and_json() {
        let mut builder = ReportBuilder::new();
        builder.pass("workload_running", true, "running");
        let report = builder.finish();
        let text = report.render();
        assert!(text.contains("PASS  workload_running"));
        assert!(text.contains("Total: 1 | Passed: 1 | Failed: 0 | Skipped: 0"));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["results"][0]["outcome"], "PASS");
        assert_eq!(json["passed"], 1);
    }
}
