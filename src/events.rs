//! Shapes of the data the host test runner hands to a reporter.
//!
//! Every optional field defaults when absent so a sparse or partially
//! malformed payload still produces a report.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============================================================================
// onBegin
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunnerConfig {
    pub projects: Vec<ProjectConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectConfig {
    pub name: String,
    #[serde(rename = "use")]
    pub use_options: ProjectUse,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectUse {
    pub headless: Option<bool>,
    pub viewport: Option<Viewport>,
    pub is_mobile: Option<bool>,
    pub has_touch: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// A node of the runner's suite tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Suite {
    pub title: String,
    pub suites: Vec<Suite>,
    pub tests: Vec<TestCase>,
}

impl Suite {
    /// Every test in this suite and its descendants, depth first.
    pub fn all_tests(&self) -> Vec<&TestCase> {
        let mut out = Vec::new();
        self.collect_tests(&mut out);
        out
    }

    fn collect_tests<'a>(&'a self, out: &mut Vec<&'a TestCase>) {
        out.extend(self.tests.iter());
        for child in &self.suites {
            child.collect_tests(out);
        }
    }
}

// ============================================================================
// onTestEnd
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Location {
    pub file: String,
    pub line: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Annotation {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: Option<String>,
}

/// Link from a test to its enclosing suites, innermost first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SuiteRef {
    pub title: String,
    pub parent: Option<Box<SuiteRef>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TestCase {
    pub id: String,
    pub title: String,
    pub location: Location,
    pub annotations: Vec<Annotation>,
    pub retries: u32,
    pub expected_status: String,
    pub parent: Option<SuiteRef>,
}

impl TestCase {
    /// Title of the directly enclosing suite, or "" for a detached test.
    pub fn suite_title(&self) -> &str {
        self.parent.as_ref().map(|p| p.title.as_str()).unwrap_or("")
    }

    /// Titles of all enclosing suites, innermost first.
    pub fn ancestor_titles(&self) -> Vec<&str> {
        let mut titles = Vec::new();
        let mut current = self.parent.as_ref();
        while let Some(suite) = current {
            titles.push(suite.title.as_str());
            current = suite.parent.as_deref();
        }
        titles
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TestError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Attachment {
    pub name: String,
    #[serde(rename = "type", alias = "contentType")]
    pub content_type: String,
    pub path: Option<PathBuf>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TestStep {
    pub title: String,
    pub duration: f64,
    pub location: Option<Location>,
    pub steps: Vec<TestStep>,
    pub error: Option<TestError>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TestResult {
    pub status: String,
    pub duration: f64,
    pub errors: Vec<TestError>,
    pub error: Option<TestError>,
    pub retry: u32,
    pub parallel_index: i64,
    pub worker_index: i64,
    pub start_time: Option<String>,
    pub attachments: Vec<Attachment>,
    pub steps: Vec<TestStep>,
}

/// Outcome of a single test, as counted by the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestStatus {
    Passed,
    Failed,
    TimedOut,
    Skipped,
    Interrupted,
}

impl TestStatus {
    /// Parse the runner's status string. Unknown values yield `None`.
    pub fn parse(status: &str) -> Option<Self> {
        match status {
            "passed" => Some(TestStatus::Passed),
            "failed" => Some(TestStatus::Failed),
            "timedOut" => Some(TestStatus::TimedOut),
            "skipped" => Some(TestStatus::Skipped),
            "interrupted" => Some(TestStatus::Interrupted),
            _ => None,
        }
    }
}

// ============================================================================
// onEnd
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FullResult {
    pub status: String,
    pub duration: f64,
    pub start_time: Option<String>,
}
