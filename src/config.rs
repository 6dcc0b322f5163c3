use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ReporterError, ReporterResult};

// Report output defaults
pub const DEFAULT_REPORT_DIR: &str = "reports/chalisha-reporter/";
pub const DEFAULT_REPORT_FILE_NAME: &str = "report.json";
pub const DEFAULT_RESULT_FILE_NAME: &str = "result.json";
pub const ATTACHMENTS_DIR_NAME: &str = "data";

// Step trees deeper than this are cut off (levels 0..MAX_STEP_DEPTH-1 are kept)
pub const MAX_STEP_DEPTH: usize = 4;

// Remote publishing
pub const REMOTE_NAMESPACE: &str = "chalisha-reporter";
pub const DEFAULT_CONTAINER_NAME: &str = "reports";
pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 1;
pub const CONNECTION_STRING_ENV: &str = "CHALISHA_AZURE_STORAGE_CONNECTION_STRING";

pub const FALLBACK_APP_NAME: &str = "unknown-app";

/// Chalisha Reporter: turns a stream of test-runner lifecycle events into a JSON report.
#[derive(Parser, Debug, Clone)]
#[command(name = "chalisha-reporter")]
pub struct CliArgs {
    /// NDJSON file with lifecycle events ("-" reads stdin)
    #[arg(short = 'e', long = "events", default_value = "-")]
    pub events: PathBuf,

    /// Reporter options file (JSON)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Override the report output directory
    #[arg(short = 'o', long = "report-dir")]
    pub report_dir: Option<PathBuf>,

    /// Application name used in the remote upload path
    #[arg(short = 'n', long = "app-name")]
    pub app_name: Option<String>,

    /// Azure Blob Storage connection string (upload is skipped without one)
    #[arg(long = "connection-string", env = CONNECTION_STRING_ENV, hide_env_values = true)]
    pub connection_string: Option<String>,

    /// Azure Blob Storage container name
    #[arg(long = "container-name")]
    pub container_name: Option<String>,

    /// Number of files uploaded in parallel
    #[arg(long = "upload-concurrency")]
    pub upload_concurrency: Option<usize>,

    /// Per-request upload timeout in seconds (no timeout by default)
    #[arg(long = "upload-timeout-secs")]
    pub upload_timeout_secs: Option<u64>,

    /// Also write logs to this file
    #[arg(short = 'l', long = "log-file")]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReporterOptions {
    pub report_dir: PathBuf,
    pub report_file_name: String,
    pub result_file_name: String,
    pub app_name: Option<String>,
    pub uploaders: UploaderOptions,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UploaderOptions {
    pub azure_blob_storage: AzureBlobStorageOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AzureBlobStorageOptions {
    pub container_name: String,
    pub connection_string: Option<String>,
    pub concurrency: usize,
    /// Per-request timeout. Unset means uploads may take as long as they need.
    pub timeout_secs: Option<u64>,
}

impl Default for ReporterOptions {
    fn default() -> Self {
        Self {
            report_dir: PathBuf::from(DEFAULT_REPORT_DIR),
            report_file_name: DEFAULT_REPORT_FILE_NAME.to_string(),
            result_file_name: DEFAULT_RESULT_FILE_NAME.to_string(),
            app_name: None,
            uploaders: UploaderOptions::default(),
        }
    }
}

impl Default for AzureBlobStorageOptions {
    fn default() -> Self {
        Self {
            container_name: DEFAULT_CONTAINER_NAME.to_string(),
            connection_string: None,
            concurrency: DEFAULT_UPLOAD_CONCURRENCY,
            timeout_secs: None,
        }
    }
}

impl AzureBlobStorageOptions {
    /// The connection string, if one is set and not blank.
    pub fn connection_string(&self) -> Option<&str> {
        self.connection_string
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

impl ReporterOptions {
    /// Load options from a JSON file. Missing keys fall back to defaults.
    pub fn load(path: &Path) -> ReporterResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ReporterError::Config(format!("cannot read {:?}: {}", path, e))
        })?;
        let options: ReporterOptions = serde_json::from_str(&content)
            .map_err(|e| ReporterError::Config(format!("invalid options in {:?}: {}", path, e)))?;
        Ok(options)
    }

    /// Build options from CLI args: the config file first, then flag overrides.
    pub fn from_args(args: &CliArgs) -> ReporterResult<Self> {
        let mut options = match &args.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };

        if let Some(dir) = &args.report_dir {
            options.report_dir = dir.clone();
        }
        if let Some(name) = &args.app_name {
            options.app_name = Some(name.clone());
        }

        let azure = &mut options.uploaders.azure_blob_storage;
        if let Some(cs) = &args.connection_string {
            azure.connection_string = Some(cs.clone());
        }
        if let Some(container) = &args.container_name {
            azure.container_name = container.clone();
        }
        if let Some(n) = args.upload_concurrency {
            azure.concurrency = n;
        }
        if let Some(secs) = args.upload_timeout_secs {
            azure.timeout_secs = Some(secs);
        }

        Ok(options)
    }

    /// Application name for the remote upload path.
    /// Falls back to the working directory name when not configured.
    pub fn resolved_app_name(&self) -> String {
        if let Some(name) = self.app_name.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            return name.to_string();
        }
        std::env::current_dir()
            .ok()
            .and_then(|dir| dir.file_name().map(|n| n.to_string_lossy().to_string()))
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| FALLBACK_APP_NAME.to_string())
    }
}
