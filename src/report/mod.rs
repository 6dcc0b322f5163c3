pub mod attachments;
pub mod steps;
pub mod writer;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::{Location, TestError, Viewport};

pub use attachments::relocate_attachments;
pub use steps::capture_steps;
pub use writer::ReportWriter;

// ============================================================================
// Data model
// ============================================================================

/// Run-wide summary. Written on its own to the result file and flattened
/// into the head of the full report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration: Option<i64>, // wall-clock ms
    pub status: Option<String>,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub timed_out: usize,
    pub interrupted: usize,
    pub total_tests: usize,
}

impl RunSummary {
    pub fn new(run_id: String, start_time: DateTime<Utc>) -> Self {
        Self {
            run_id,
            start_time,
            end_time: None,
            duration: None,
            status: None,
            passed: 0,
            failed: 0,
            skipped: 0,
            timed_out: 0,
            interrupted: 0,
            total_tests: 0,
        }
    }

    /// Sum of the five outcome counters.
    pub fn processed(&self) -> usize {
        self.passed + self.failed + self.skipped + self.timed_out + self.interrupted
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    #[serde(flatten)]
    pub summary: RunSummary,
    pub tests: Vec<TestReportEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestReportEntry {
    pub test_id: String,
    pub title: String,
    pub file: String,
    pub line: u32,
    pub suite_title: String,
    pub tags: Vec<String>,
    pub retries: u32,
    pub expected_status: String,
    pub status: String,
    pub duration: f64,
    pub start_time: String,
    pub retry: u32,
    pub worker_index: i64,
    pub parallel_index: i64,
    pub error: Option<TestError>,
    pub errors: Vec<TestError>,
    pub steps: Vec<StepSummary>,
    pub attachments: Vec<RelocatedAttachment>,
    pub browser: BrowserContext,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepSummary {
    pub name: String,
    pub duration: f64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub location: Option<Location>,
    pub error: bool,
    pub steps: Vec<StepSummary>,
}

/// An attachment as it appears in the report. Relocated attachments carry
/// `fileName`, their new `path`, and a report-relative `url`; attachments
/// without a local file keep their original fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelocatedAttachment {
    pub name: String,
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub url: Option<String>,
}

/// Per-project browser settings. An unresolved project serializes as `{}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserContext {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub headless: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub viewport: Option<Viewport>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub is_mobile: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub has_touch: Option<bool>,
}

impl BrowserContext {
    pub fn is_empty(&self) -> bool {
        *self == BrowserContext::default()
    }
}
