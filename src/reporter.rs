use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::aggregator::RunAggregator;
use crate::config::ReporterOptions;
use crate::error::ReporterResult;
use crate::events::{FullResult, RunnerConfig, Suite, TestCase, TestResult};
use crate::publish::{remote_root, AzureBlobStore, BlobStore, MirrorPublisher, PublishState};
use crate::report::{Report, ReportWriter};

/// Lifecycle callbacks the host runner drives, in order:
/// begin, any number of test ends, end, exit.
#[async_trait]
pub trait Reporter: Send {
    async fn on_begin(&mut self, config: &RunnerConfig, suite: &Suite);

    async fn on_test_end(&mut self, test: &TestCase, result: &TestResult) -> ReporterResult<()>;

    async fn on_end(&mut self, result: &FullResult) -> ReporterResult<()>;

    /// Best effort: never fails.
    async fn on_exit(&mut self);
}

pub struct ChalishaReporter {
    options: ReporterOptions,
    app_name: String,
    writer: ReportWriter,
    run: RunAggregator,
    store: Option<Arc<dyn BlobStore>>,
    publish_state: Option<PublishState>,
}

impl ChalishaReporter {
    /// Prepares (and empties) the report directory immediately.
    pub fn new(options: ReporterOptions) -> ReporterResult<Self> {
        let writer = ReportWriter::new(&options)?;
        let run = RunAggregator::new(writer.data_dir());
        let app_name = options.resolved_app_name();
        Ok(Self {
            options,
            app_name,
            writer,
            run,
            store: None,
            publish_state: None,
        })
    }

    /// Publish through this store instead of building one from the
    /// connection string.
    pub fn with_blob_store(mut self, store: Arc<dyn BlobStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn run_id(&self) -> &str {
        self.run.run_id()
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn writer(&self) -> &ReportWriter {
        &self.writer
    }

    pub fn aggregator(&self) -> &RunAggregator {
        &self.run
    }

    pub fn report(&self) -> Report {
        self.run.report()
    }

    /// Outcome of the last publish attempt; `None` if publishing was skipped.
    pub fn publish_state(&self) -> Option<PublishState> {
        self.publish_state
    }

    pub fn remote_root(&self) -> String {
        remote_root(&self.app_name, self.run.run_id())
    }

    fn blob_store(&self) -> Option<Arc<dyn BlobStore>> {
        if let Some(store) = &self.store {
            return Some(store.clone());
        }

        let azure = &self.options.uploaders.azure_blob_storage;
        let connection_string = azure.connection_string()?;
        let store = AzureBlobStore::from_connection_string(connection_string, azure.container_name.as_str())
            .and_then(|store| match azure.timeout_secs {
                Some(secs) => store.with_timeout(Duration::from_secs(secs)),
                None => Ok(store),
            });
        match store {
            Ok(store) => Some(Arc::new(store)),
            Err(e) => {
                error!("Blob storage is misconfigured, skipping upload: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl Reporter for ChalishaReporter {
    async fn on_begin(&mut self, config: &RunnerConfig, suite: &Suite) {
        self.run.begin(suite.all_tests().len(), config);
    }

    async fn on_test_end(&mut self, test: &TestCase, result: &TestResult) -> ReporterResult<()> {
        self.run.test_end(test, result).await
    }

    async fn on_end(&mut self, result: &FullResult) -> ReporterResult<()> {
        self.run.end(&result.status, result.duration);
        self.writer.write(&self.run.report())
    }

    async fn on_exit(&mut self) {
        if !self.run.is_finished() {
            warn!("Exit before end: the report on disk may be missing or stale");
        }

        if self.store.is_none() && self.options.uploaders.azure_blob_storage.connection_string().is_none() {
            info!("No blob storage connection string configured, skipping upload");
            return;
        }

        let Some(store) = self.blob_store() else {
            self.publish_state = Some(PublishState::Failed);
            return;
        };

        let concurrency = self.options.uploaders.azure_blob_storage.concurrency;
        let mut publisher = MirrorPublisher::new(store).with_concurrency(concurrency);
        let root = self.remote_root();
        info!("Uploading report for run {} to {}", self.run.run_id(), root);

        let state = publisher.publish(self.writer.report_dir(), &root).await;
        self.publish_state = Some(state);
    }
}
