//! CLI argument parsing for the pool binary.
//!
//! Defines the `Args` struct and a function to process CLI arguments into a PoolConfig.

use clap::Parser;
use ext_config::{Config, File, FileFormat};
use pool_stratum::{config::PoolConfig, error::PoolError};
use std::path::PathBuf;

/// Holds the parsed CLI arguments for the pool binary.
#[derive(Parser, Debug)]
#[command(author, version, about = "Stratum pool CLI", long_about = None)]
pub struct Args {
    #[arg(
        short = 'c',
        long = "config",
        help = "Path to the TOML configuration file",
        default_value = "pool-config.toml"
    )]
    pub config_path: PathBuf,
    #[arg(
        short = 'f',
        long = "log-file",
        help = "Path to the log file. If not set, logs will only be written to stdout."
    )]
    pub log_file: Option<PathBuf>,
}

/// Parses CLI arguments and loads the PoolConfig from the specified file.
pub fn process_cli_args() -> Result<PoolConfig, PoolError> {
    let args = Args::parse();
    let config_path = args
        .config_path
        .to_str()
        .ok_or_else(|| PoolError::Custom("Invalid config path".to_string()))?;
    let mut config: PoolConfig = Config::builder()
        .add_source(File::new(config_path, FileFormat::Toml))
        .build()
        .and_then(|settings| settings.try_deserialize::<PoolConfig>())?;

    config.set_log_dir(args.log_file);

    Ok(config)
}
