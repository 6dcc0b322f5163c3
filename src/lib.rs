// Library crate for the binary and integration tests.

pub mod aggregator;
pub mod config;
pub mod error;
pub mod events;
pub mod publish;
pub mod replay;
pub mod report;
pub mod reporter;

pub use aggregator::RunAggregator;
pub use config::{CliArgs, ReporterOptions};
pub use error::{ReporterError, ReporterResult};
pub use reporter::{ChalishaReporter, Reporter};
