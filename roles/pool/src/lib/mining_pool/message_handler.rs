use std::sync::Arc;

use stratum_rpc::{
    client_to_server::{GetJob, KeepAlived, Login, Submit},
    server_to_client::{JobDescriptor, LoginResult, StatusResult},
    IsServer,
};

use super::StratumServer;
use crate::{error::StratumError, session::Session};

/// Binds a connection's [`Session`] to the [`StratumServer`] so incoming requests can be
/// dispatched through [`IsServer`].
pub struct SessionHandler {
    server: Arc<StratumServer>,
    session: Arc<Session>,
}

impl SessionHandler {
    pub fn new(server: Arc<StratumServer>, session: Arc<Session>) -> Self {
        Self { server, session }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }
}

impl IsServer for SessionHandler {
    type Error = StratumError;

    fn handle_login(&mut self, request: &Login) -> Result<LoginResult, StratumError> {
        self.server.handle_login_rpc(&self.session, request)
    }

    fn handle_getjob(&self, request: &GetJob) -> Result<JobDescriptor, StratumError> {
        self.server.handle_getjob_rpc(&self.session, request)
    }

    fn handle_submit(&self, request: &Submit) -> Result<StatusResult, StratumError> {
        self.server.handle_submit_rpc(&self.session, request)
    }

    fn handle_keepalived(&self, request: &KeepAlived) -> Result<StatusResult, StratumError> {
        self.server.handle_keepalived_rpc(request)
    }

    fn handle_unknown(&self, method: &str) -> StratumError {
        self.server.handle_unknown_rpc(&self.session, method)
    }
}
