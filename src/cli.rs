use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::influx::{DEFAULT_HOST, DEFAULT_PORT, InfluxConfig};
use crate::nodes::DEFAULT_NODES_URL;

/// ffmr-bootstrap - set up the Freifunk Marburg statistics exporter
#[derive(Parser, Debug)]
#[command(name = "ffmr-bootstrap")]
#[command(about = "Provision a Python environment, install dependencies and run `export.py setup_db`")]
#[command(version)]
pub struct Cli {
    /// JSON configuration file (defaults apply when omitted)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory containing requirements.txt and export.py
    #[arg(short, long, global = true, default_value = ".")]
    pub workdir: PathBuf,

    /// Stop when dependency installation fails instead of invoking the entry point anyway
    #[arg(long, global = true)]
    pub strict: bool,

    /// Show the commands that would run without running them
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the bootstrap sequence (default)
    Run,
    /// Check that the provisioner, interpreter and input files are present
    Check,
    /// Validate a configuration file
    Validate {
        /// Path to configuration file to validate
        config: PathBuf,
    },
    /// Write the default configuration to a file
    InitConfig {
        /// Where to write the configuration
        path: PathBuf,
    },
    /// Fetch nodes.json and export node statistics to InfluxDB
    InsertData(InsertDataArgs),
}

#[derive(Args, Debug, Clone)]
pub struct InsertDataArgs {
    /// InfluxDB host
    #[arg(long, default_value = DEFAULT_HOST)]
    pub db_host: String,
    /// InfluxDB port
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub db_port: u16,
    /// Unprivileged InfluxDB user
    #[arg(long, default_value = "ffmr")]
    pub db_user: String,
    /// Unprivileged InfluxDB password
    #[arg(long, default_value = "ffmr")]
    pub db_password: String,
    /// InfluxDB database
    #[arg(long, default_value = "ffmr")]
    pub db_name: String,
    /// URL of nodes.json generated by ffmap-backend
    #[arg(long, default_value = DEFAULT_NODES_URL)]
    pub nodes_url: String,
}

impl InsertDataArgs {
    pub fn influx_config(&self) -> InfluxConfig {
        InfluxConfig {
            host: self.db_host.clone(),
            port: self.db_port,
            user: self.db_user.clone(),
            password: self.db_password.clone(),
            database: self.db_name.clone(),
        }
    }
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
