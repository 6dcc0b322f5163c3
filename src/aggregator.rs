use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::error::ReporterResult;
use crate::events::{ProjectConfig, RunnerConfig, TestCase, TestResult, TestStatus};
use crate::report::{
    capture_steps, relocate_attachments, BrowserContext, Report, RunSummary, TestReportEntry,
};

/// Run-scoped state: counters, resolved project contexts and the ordered
/// list of test entries. One instance per run.
pub struct RunAggregator {
    summary: RunSummary,
    entries: Vec<TestReportEntry>,
    contexts: HashMap<String, BrowserContext>,
    data_dir: PathBuf,
    started_at: DateTime<Utc>,
    begun: bool,
    finished: bool,
}

impl RunAggregator {
    pub fn new(data_dir: PathBuf) -> Self {
        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        Self {
            summary: RunSummary::new(run_id, started_at),
            entries: Vec::new(),
            contexts: HashMap::new(),
            data_dir,
            started_at,
            begun: false,
            finished: false,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.summary.run_id
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    pub fn entries(&self) -> &[TestReportEntry] {
        &self.entries
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn browser_context(&self, project: &str) -> Option<&BrowserContext> {
        self.contexts.get(project)
    }

    pub fn begin(&mut self, total_tests: usize, config: &RunnerConfig) {
        if self.begun {
            warn!("Run {} already began, ignoring repeated begin", self.summary.run_id);
            return;
        }
        self.begun = true;
        self.summary.total_tests = total_tests;

        for project in &config.projects {
            self.contexts
                .insert(project.name.clone(), resolve_context(project));
        }

        info!(
            "Run {} started: {} tests across {} projects",
            self.summary.run_id,
            total_tests,
            self.contexts.len()
        );
    }

    /// Record one finished test. The counter is bumped before attachments are
    /// copied, so a failed copy still counts the test but adds no entry.
    pub async fn test_end(&mut self, test: &TestCase, result: &TestResult) -> ReporterResult<()> {
        if self.finished {
            warn!("Test '{}' ended after the run finished, ignoring", test.title);
            return Ok(());
        }

        match TestStatus::parse(&result.status) {
            Some(TestStatus::Passed) => self.summary.passed += 1,
            Some(TestStatus::Failed) => self.summary.failed += 1,
            Some(TestStatus::Skipped) => self.summary.skipped += 1,
            Some(TestStatus::TimedOut) => self.summary.timed_out += 1,
            Some(TestStatus::Interrupted) => self.summary.interrupted += 1,
            None => debug!(
                "Unrecognized status '{}' for test '{}'",
                result.status, test.title
            ),
        }

        let browser = self.context_for(test);
        let steps = capture_steps(&result.steps, 0);
        let attachments = relocate_attachments(&result.attachments, &self.data_dir).await?;

        self.entries.push(TestReportEntry {
            test_id: test.id.clone(),
            title: test.title.clone(),
            file: test.location.file.clone(),
            line: test.location.line,
            suite_title: test.suite_title().to_string(),
            tags: test.annotations.iter().map(|a| a.kind.clone()).collect(),
            retries: test.retries,
            expected_status: test.expected_status.clone(),
            status: result.status.clone(),
            duration: result.duration,
            start_time: result.start_time.clone().unwrap_or_default(),
            retry: result.retry,
            worker_index: result.worker_index,
            parallel_index: result.parallel_index,
            error: result.error.clone(),
            errors: result.errors.clone(),
            steps,
            attachments,
            browser,
        });

        Ok(())
    }

    /// Freeze the run. Duration is wall-clock time since construction; the
    /// runner-reported duration is only logged.
    pub fn end(&mut self, status: &str, runner_duration_ms: f64) {
        if self.finished {
            warn!("Run {} already ended, ignoring repeated end", self.summary.run_id);
            return;
        }
        let now = Utc::now();
        self.summary.end_time = Some(now);
        self.summary.duration = Some((now - self.started_at).num_milliseconds());
        self.summary.status = Some(status.to_string());
        self.finished = true;

        info!(
            "Run {} finished: status={}, passed={}, failed={}, skipped={}, timedOut={}, interrupted={}",
            self.summary.run_id,
            status,
            self.summary.passed,
            self.summary.failed,
            self.summary.skipped,
            self.summary.timed_out,
            self.summary.interrupted
        );
        debug!("Runner-reported duration: {:.0}ms", runner_duration_ms);
    }

    pub fn report(&self) -> Report {
        Report {
            summary: self.summary.clone(),
            tests: self.entries.clone(),
        }
    }

    /// The outermost ancestor naming a project wins.
    fn context_for(&self, test: &TestCase) -> BrowserContext {
        test.ancestor_titles()
            .into_iter()
            .rev()
            .filter(|title| !title.is_empty())
            .find_map(|title| self.contexts.get(title))
            .cloned()
            .unwrap_or_default()
    }
}

fn resolve_context(project: &ProjectConfig) -> BrowserContext {
    let use_options = &project.use_options;
    BrowserContext {
        name: Some(project.name.clone()),
        headless: use_options.headless,
        viewport: use_options.viewport,
        is_mobile: use_options.is_mobile,
        has_touch: use_options.has_touch,
    }
}
