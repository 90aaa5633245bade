use crate::methods::MethodError;
use std::fmt;

#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    Method(MethodError),
    /// A server only accepts requests; a response coming from a miner is a protocol violation.
    InvalidJsonRpcMessageKind,
    BadSerdeJson(serde_json::Error),
}

impl From<MethodError> for Error {
    fn from(inner: MethodError) -> Self {
        Error::Method(inner)
    }
}

impl From<serde_json::Error> for Error {
    fn from(inner: serde_json::Error) -> Self {
        Error::BadSerdeJson(inner)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Method(e) => write!(f, "Method error: {e:?}"),
            Error::InvalidJsonRpcMessageKind => write!(f, "Server received a json-rpc response"),
            Error::BadSerdeJson(e) => write!(f, "Bad serde json: `{e:?}`"),
        }
    }
}

impl std::error::Error for Error {}
