use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueHint};
use log::LevelFilter;

use uwb_sensor::{DriverConfig, OutputFormat};

/// CLI options for the UWB sensor driver.
#[derive(Parser, Debug)]
#[clap(author, about, version)]
pub struct Options {
    /// Path to the JSON configuration file
    #[arg(short, long, value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Serial device of the tag module
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    pub port: Option<String>,

    /// Serial baud rate
    #[arg(long)]
    pub baud: Option<u32>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Read from a simulated tag instead of the serial device
    #[arg(long)]
    pub simulate: bool,

    /// Position of the simulated tag
    #[arg(long, num_args = 3, value_names = ["X", "Y", "Z"], allow_negative_numbers = true)]
    pub tag_position: Option<Vec<f64>>,

    /// Range noise of the simulated tag (meters, standard deviation)
    #[arg(long, default_value_t = 0.05)]
    pub noise: f64,

    /// Exit after this many messages
    #[arg(short = 'n', long)]
    pub count: Option<usize>,

    /// Set the log level
    #[arg(long, default_value_t = LevelFilter::Info)]
    pub log_level: LevelFilter,

    /// Subcommand passed to the CLI.
    #[command(subcommand)]
    pub subcommands: Option<Subcommands>,
}

impl Options {
    pub fn new() -> Self {
        Self::parse()
    }

    pub fn override_config(&self, config: &mut DriverConfig) {
        if let Some(port) = &self.port {
            config.port = port.clone();
        }
        if let Some(baud) = self.baud {
            config.baud_rate = baud;
        }
    }
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Subcommands {
    /// Print the effective configuration as JSON
    DumpConfig,
    /// Print the UWBMsg message definition
    Definition,
}
