use std::convert::From;

use stratum_rpc::{json_rpc::JsonRpcError, server::ERROR_CODE};

use crate::template_receiver::rpc_client::RpcError;

pub type PoolResult<T> = Result<T, PoolError>;

/// Represents various errors that can occur in the pool implementation.
#[derive(std::fmt::Debug)]
pub enum PoolError {
    /// I/O-related error.
    Io(std::io::Error),
    /// Error while loading or deserializing the configuration.
    Config(ext_config::ConfigError),
    /// Error talking to the daemon.
    Rpc(RpcError),
    /// A login separator is not a single character or collides with another one.
    InvalidSeparator(String),
    /// The remote end of a connection is gone.
    TransportClosed(String),
    /// A push did not make it into the connection outbound queue in time.
    TransportTimeout(String),
    /// Error indicating that a component has shut down unexpectedly.
    ComponentShutdown(String),
    /// Custom error message.
    Custom(String),
}

impl std::fmt::Display for PoolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use PoolError::*;
        match self {
            Io(e) => write!(f, "I/O error: `{e:?}"),
            Config(e) => write!(f, "Config error: {e:?}"),
            Rpc(e) => write!(f, "Daemon RPC error: `{e:?}`"),
            InvalidSeparator(e) => write!(f, "Invalid login separator: {e}"),
            TransportClosed(addr) => write!(f, "Connection to {addr} closed"),
            TransportTimeout(addr) => write!(f, "Timed out writing to {addr}"),
            ComponentShutdown(e) => write!(f, "Component shutdown: {e:?}"),
            Custom(e) => write!(f, "Custom error: `{e:?}`"),
        }
    }
}

impl std::error::Error for PoolError {}

impl From<std::io::Error> for PoolError {
    fn from(e: std::io::Error) -> PoolError {
        PoolError::Io(e)
    }
}

impl From<ext_config::ConfigError> for PoolError {
    fn from(e: ext_config::ConfigError) -> PoolError {
        PoolError::Config(e)
    }
}

impl From<RpcError> for PoolError {
    fn from(e: RpcError) -> PoolError {
        PoolError::Rpc(e)
    }
}

/// Outcome of a rejected stratum call.
///
/// Every variant is answered to the miner with code -1 and a fixed message; none of them closes
/// the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StratumError {
    InvalidPaymentId,
    InvalidAddress,
    JobNotReady,
    Unauthenticated,
    InvalidJobId,
    MalformedNonce,
    DuplicateShare,
    BlockExpired,
    /// Share rejected by proof-of-work verification, with the verifier's reason.
    Rejected(String),
    InvalidMethod,
}

impl StratumError {
    pub fn message(&self) -> &str {
        match self {
            StratumError::InvalidPaymentId => "Invalid paymentID used for login",
            StratumError::InvalidAddress => "Invalid address used for login",
            StratumError::JobNotReady => "Job not ready",
            StratumError::Unauthenticated => "Unauthenticated",
            StratumError::InvalidJobId => "Invalid job id",
            StratumError::MalformedNonce => "Malformed nonce",
            StratumError::DuplicateShare => "Duplicate share",
            StratumError::BlockExpired => "Block expired",
            StratumError::Rejected(reason) => reason,
            StratumError::InvalidMethod => "Invalid method",
        }
    }
}

impl std::fmt::Display for StratumError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for StratumError {}

impl From<StratumError> for JsonRpcError {
    fn from(e: StratumError) -> Self {
        JsonRpcError::new(ERROR_CODE, e.message())
    }
}
