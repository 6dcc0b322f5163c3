use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::{ReporterOptions, ATTACHMENTS_DIR_NAME};
use crate::error::{ReporterError, ReporterResult};

use super::{Report, RunSummary};

/// Owns the report output directory for one run.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    report_dir: PathBuf,
    report_path: PathBuf,
    result_path: PathBuf,
}

impl ReportWriter {
    /// Resolve the output directory and make sure it exists and is empty.
    /// An existing directory is emptied, never removed.
    pub fn new(options: &ReporterOptions) -> ReporterResult<Self> {
        let report_dir = std::path::absolute(&options.report_dir).map_err(|e| {
            ReporterError::ReportDir {
                path: options.report_dir.clone(),
                source: e,
            }
        })?;

        prepare_dir(&report_dir).map_err(|e| ReporterError::ReportDir {
            path: report_dir.clone(),
            source: e,
        })?;

        info!("Report directory ready: {:?}", report_dir);

        Ok(Self {
            report_path: report_dir.join(&options.report_file_name),
            result_path: report_dir.join(&options.result_file_name),
            report_dir,
        })
    }

    pub fn report_dir(&self) -> &Path {
        &self.report_dir
    }

    pub fn report_path(&self) -> &Path {
        &self.report_path
    }

    pub fn result_path(&self) -> &Path {
        &self.result_path
    }

    /// Where relocated attachments go.
    pub fn data_dir(&self) -> PathBuf {
        self.report_dir.join(ATTACHMENTS_DIR_NAME)
    }

    /// Write the summary file and the full report file, overwriting both.
    pub fn write(&self, report: &Report) -> ReporterResult<()> {
        write_json(&self.result_path, &report.summary)?;
        write_json(&self.report_path, report)?;
        info!(
            "Report written: {:?} ({} tests)",
            self.report_path,
            report.tests.len()
        );
        Ok(())
    }

    pub fn read_summary(&self) -> ReporterResult<RunSummary> {
        let content = fs::read_to_string(&self.result_path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn read_report(&self) -> ReporterResult<Report> {
        let content = fs::read_to_string(&self.report_path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

fn prepare_dir(dir: &Path) -> std::io::Result<()> {
    if !dir.exists() {
        return fs::create_dir_all(dir);
    }

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
        debug!("Removed stale report entry {:?}", path);
    }
    Ok(())
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> ReporterResult<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).map_err(|e| ReporterError::Write {
        path: path.to_path_buf(),
        source: e,
    })
}
