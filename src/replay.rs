//! Drive a [`Reporter`] from a recorded NDJSON stream of lifecycle events.
//!
//! One event per line:
//!
//! ```text
//! {"event":"begin","config":{"projects":[...]},"suite":{...}}
//! {"event":"testEnd","test":{...},"result":{...}}
//! {"event":"end","result":{"status":"passed","duration":1234}}
//! {"event":"exit"}
//! ```

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{error, warn};

use crate::events::{FullResult, RunnerConfig, Suite, TestCase, TestResult};
use crate::reporter::Reporter;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum LifecycleEvent {
    Begin {
        #[serde(default)]
        config: RunnerConfig,
        #[serde(default)]
        suite: Suite,
    },
    TestEnd {
        #[serde(default)]
        test: TestCase,
        #[serde(default)]
        result: TestResult,
    },
    End {
        #[serde(default)]
        result: FullResult,
    },
    Exit,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub events: usize,
    pub malformed_lines: usize,
    pub failed_tests: usize,
    pub synthesized_end: bool,
    pub synthesized_exit: bool,
}

/// Feed every event in `reader` to `reporter`. Malformed lines are skipped.
/// If the stream stops before `end` or `exit`, those are delivered anyway
/// (`end` with status `interrupted`) so the report is still written.
pub async fn replay<R, B>(reporter: &mut R, reader: B) -> anyhow::Result<ReplayStats>
where
    R: Reporter + ?Sized,
    B: AsyncBufRead + Unpin,
{
    let mut stats = ReplayStats::default();
    let mut ended = false;
    let mut exited = false;
    let mut lines = reader.lines();
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }

        let event: LifecycleEvent = match serde_json::from_str(&line) {
            Ok(e) => e,
            Err(e) => {
                warn!("Skipping malformed event on line {}: {}", line_no, e);
                stats.malformed_lines += 1;
                continue;
            }
        };

        if exited {
            warn!("Ignoring event after exit on line {}", line_no);
            continue;
        }
        stats.events += 1;

        match event {
            LifecycleEvent::Begin { config, suite } => {
                reporter.on_begin(&config, &suite).await;
            }
            LifecycleEvent::TestEnd { test, result } => {
                if let Err(e) = reporter.on_test_end(&test, &result).await {
                    error!("Failed to record test '{}': {}", test.title, e);
                    stats.failed_tests += 1;
                }
            }
            LifecycleEvent::End { result } => {
                reporter.on_end(&result).await?;
                ended = true;
            }
            LifecycleEvent::Exit => {
                if !ended {
                    finish_interrupted(reporter).await?;
                    ended = true;
                    stats.synthesized_end = true;
                }
                reporter.on_exit().await;
                exited = true;
            }
        }
    }

    if !ended {
        warn!("Event stream ended without an end event");
        finish_interrupted(reporter).await?;
        stats.synthesized_end = true;
    }
    if !exited {
        reporter.on_exit().await;
        stats.synthesized_exit = true;
    }

    Ok(stats)
}

async fn finish_interrupted<R: Reporter + ?Sized>(reporter: &mut R) -> anyhow::Result<()> {
    let result = FullResult {
        status: "interrupted".to_string(),
        ..Default::default()
    };
    reporter.on_end(&result).await?;
    Ok(())
}
