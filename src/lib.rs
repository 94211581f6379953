//! ffmr-bootstrap library
//!
//! Bootstraps the Freifunk Marburg statistics exporter (provision a Python
//! environment, install its dependencies, run `export.py setup_db`) and
//! exports ffmap-backend node statistics to InfluxDB.

pub mod bootstrap;
pub mod cli;
pub mod command_runner;
pub mod config_file;
pub mod environment;
pub mod error;
pub mod export;
pub mod geohash;
pub mod influx;
pub mod nodes;
pub mod process_guard;
pub mod sanity;
pub mod step_traits;
pub mod steps;
pub mod types;

#[cfg(test)]
mod test_http;

// Re-export main types for convenience
pub use bootstrap::{Bootstrap, BootstrapOutcome, PROVISION_FAILED_MESSAGE};
pub use command_runner::{CommandRunner, DryRunRunner, StepOutput, SystemRunner};
pub use config_file::BootstrapConfig;
pub use environment::Environment;
pub use error::FfmrError;
pub use export::{ExportSummary, export_nodes, insert_data};
pub use influx::{FieldValue, InfluxClient, InfluxConfig, LineWriter, Point, PointSink};
pub use nodes::{Node, NodesFile};
pub use step_traits::StepArgs;
pub use steps::{InstallArgs, InvokeArgs, ProvisionArgs};
pub use types::{FailurePolicy, Provisioner, Step};
