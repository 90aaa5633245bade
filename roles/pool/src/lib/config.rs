//! ## Pool Configuration Module
//!
//! Defines [`PoolConfig`], the configuration structure of the stratum front-end, loaded from a
//! TOML file.
//!
//! This module handles:
//! - Listening address and pool wallet ([`PoolConfig`])
//! - Daemon connection and template polling ([`DaemonConfig`])
//! - Stratum endpoint behaviour: difficulties, timeouts, login separators ([`StratumConfig`])
//! - Address format rules of the network ([`NetworkConfig`])
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::PoolError;

/// Configuration for the pool stratum endpoint.
#[derive(Clone, Debug, Deserialize)]
pub struct PoolConfig {
    /// Address the stratum listener binds to, e.g. `0.0.0.0:3333`.
    pub listen_address: String,
    /// Wallet block templates are requested for.
    pub pool_wallet: String,
    pub daemon: DaemonConfig,
    pub stratum: StratumConfig,
    pub network: NetworkConfig,
    /// Accepted shares are appended here when set.
    #[serde(default)]
    pub share_log_file: Option<PathBuf>,
    #[serde(default)]
    log_file: Option<PathBuf>,
}

impl PoolConfig {
    pub fn set_log_dir(&mut self, log_dir: Option<PathBuf>) {
        if let Some(dir) = log_dir {
            self.log_file = Some(dir);
        }
    }

    pub fn log_dir(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }
}

/// Connection to the node the block templates come from.
#[derive(Clone, Debug, Deserialize)]
pub struct DaemonConfig {
    /// JSON-RPC endpoint, e.g. `http://127.0.0.1:20206/json_rpc`.
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
    /// A daemon call taking longer than this counts as a failed poll.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Bytes reserved in the template for the per-job extra nonce.
    #[serde(default = "default_reserve_size")]
    pub reserve_size: u32,
    /// Consecutive failed polls after which the pool reports itself sick.
    #[serde(default = "default_sick_threshold")]
    pub sick_threshold: u32,
}

/// Behaviour of the stratum endpoint.
#[derive(Clone, Debug, Deserialize)]
pub struct StratumConfig {
    /// Difficulty handed out when the login carries no usable fixed difficulty.
    pub default_difficulty: u64,
    /// Fixed difficulties below this value fall back to `default_difficulty`.
    pub min_fixed_difficulty: u64,
    #[serde(default = "default_connection_timeout_secs")]
    pub connection_timeout_secs: u64,
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
    /// Number of issued jobs remembered per connection.
    #[serde(default = "default_job_backlog")]
    pub job_backlog: usize,
    /// Maximum number of job pushes in flight during a broadcast.
    #[serde(default = "default_max_broadcast_concurrency")]
    pub max_broadcast_concurrency: usize,
    pub worker_id_separator: String,
    pub payment_id_separator: String,
    pub fixed_diff_separator: String,
}

/// Address format rules of the network the pool mines on.
#[derive(Clone, Debug, Deserialize)]
pub struct NetworkConfig {
    pub address_prefixes: Vec<String>,
    #[serde(default)]
    pub address_length: Option<usize>,
}

fn default_refresh_interval_ms() -> u64 {
    500
}

fn default_request_timeout_ms() -> u64 {
    3_000
}

fn default_reserve_size() -> u32 {
    8
}

fn default_sick_threshold() -> u32 {
    5
}

fn default_connection_timeout_secs() -> u64 {
    900
}

fn default_write_timeout_ms() -> u64 {
    5_000
}

fn default_job_backlog() -> usize {
    4
}

fn default_max_broadcast_concurrency() -> usize {
    1024 * 16
}

/// The three single-character separators of a composite login string.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoginSeparators {
    pub worker_id: char,
    pub payment_id: char,
    pub fixed_diff: char,
}

impl LoginSeparators {
    pub fn new(worker_id: char, payment_id: char, fixed_diff: char) -> Result<Self, PoolError> {
        if worker_id == payment_id || worker_id == fixed_diff || payment_id == fixed_diff {
            return Err(PoolError::InvalidSeparator(format!(
                "separators must be distinct, got `{worker_id}`, `{payment_id}`, `{fixed_diff}`"
            )));
        }
        Ok(Self {
            worker_id,
            payment_id,
            fixed_diff,
        })
    }
}

fn single_char(name: &str, value: &str) -> Result<char, PoolError> {
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(PoolError::InvalidSeparator(format!(
            "{name} must be exactly one character, got `{value}`"
        ))),
    }
}

impl TryFrom<&StratumConfig> for LoginSeparators {
    type Error = PoolError;

    fn try_from(config: &StratumConfig) -> Result<Self, Self::Error> {
        LoginSeparators::new(
            single_char("worker_id_separator", &config.worker_id_separator)?,
            single_char("payment_id_separator", &config.payment_id_separator)?,
            single_char("fixed_diff_separator", &config.fixed_diff_separator)?,
        )
    }
}
