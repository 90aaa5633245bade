//! Stratum application protocol, login/getjob/submit dialect:
//!
//! This is the flavour of stratum spoken by CryptoNote-family miners. Unlike the bitcoin
//! `mining.*` dialect there is no subscribe/authorize handshake: a miner logs in with a composite
//! login string, gets its first job in the login reply, and then submits nonces against job ids.
//! New jobs are pushed by the server as `job` notifications.
//!
//! Every RPC request contains three parts:
//! * message ID: integer or string, echoed back verbatim in the response
//! * remote method: `login`, `getjob`, `submit` or `keepalived`
//! * parameters: a json object
//!
//! ## Responses
//! Every response contains the following parts
//! * message ID: same ID as in request, for pairing request-response together
//! * result: json object, or null on error
//! * error: null or an object `{code, message}`
//!
//! ## Notifications
//! Server pushes carry no id:
//! * `{"jsonrpc": "2.0", "method": "job", "params": <job descriptor>}`

pub mod error;
pub mod json_rpc;
pub mod methods;
pub mod server;

pub use error::Error;
pub use json_rpc::Message;
pub use methods::{client_to_server, server_to_client};
pub use server::IsServer;
