use crate::{
    client_to_server,
    error::Error,
    json_rpc::{self, JsonRpcError, Response, StandardRequest},
    methods::{server_to_client, Client2Server, MethodError},
};
use serde::Serialize;
use std::convert::TryFrom;
use tracing::debug;

/// Error code used for every rejection in this dialect.
pub const ERROR_CODE: i32 = -1;

/// A stratum server represent a single connection with a client.
///
/// Implementors provide one handler per method; the provided methods take care of dispatching a
/// raw json_rpc message and of turning the handler outcome into a response that echoes the
/// request id. Handler errors are answered, never propagated, so a rejected call leaves the
/// connection usable.
pub trait IsServer {
    type Error: Into<JsonRpcError>;

    /// handle the received message and return a response if the message is a request.
    fn handle_message(
        &mut self,
        msg: json_rpc::Message,
    ) -> Result<Option<json_rpc::Response>, Error>
    where
        Self: std::marker::Sized,
    {
        match msg {
            json_rpc::Message::StandardRequest(request) => Ok(Some(self.handle_request(request))),
            json_rpc::Message::Notification(notification) => {
                debug!("Ignoring notification from client: {}", notification);
                Ok(None)
            }
            _ => {
                // Server shouldn't receive json_rpc responses
                Err(Error::InvalidJsonRpcMessageKind)
            }
        }
    }

    /// Call the right handler according with the called method
    fn handle_request(&mut self, request: StandardRequest) -> json_rpc::Response
    where
        Self: std::marker::Sized,
    {
        match Client2Server::try_from(request) {
            Ok(Client2Server::Login(login)) => {
                let outcome = self.handle_login(&login);
                respond(login.id, outcome)
            }
            Ok(Client2Server::GetJob(get_job)) => {
                let outcome = self.handle_getjob(&get_job);
                respond(get_job.id, outcome)
            }
            Ok(Client2Server::Submit(submit)) => {
                let outcome = self.handle_submit(&submit);
                respond(submit.id, outcome)
            }
            Ok(Client2Server::KeepAlived(keep_alived)) => {
                let outcome = self.handle_keepalived(&keep_alived);
                respond(keep_alived.id, outcome)
            }
            Err(MethodError::MethodNotFound(id, method)) => {
                Response::error(id, self.handle_unknown(&method).into())
            }
            Err(MethodError::ParsingMethodError(id, e)) => {
                debug!("Malformed request params: {:?}", e);
                Response::error(id, JsonRpcError::new(ERROR_CODE, "Malformed request"))
            }
            Err(MethodError::NotARequest) => Response::error(
                serde_json::Value::Null,
                JsonRpcError::new(ERROR_CODE, "Malformed request"),
            ),
        }
    }

    /// Authenticates the connection with a composite login string and returns the first job.
    fn handle_login(
        &mut self,
        request: &client_to_server::Login,
    ) -> Result<server_to_client::LoginResult, Self::Error>;

    /// Issues a fresh job to an already logged in miner.
    fn handle_getjob(
        &self,
        request: &client_to_server::GetJob,
    ) -> Result<server_to_client::JobDescriptor, Self::Error>;

    /// When miner find a nonce for a job it submits it as a share.
    fn handle_submit(
        &self,
        request: &client_to_server::Submit,
    ) -> Result<server_to_client::StatusResult, Self::Error>;

    fn handle_keepalived(
        &self,
        request: &client_to_server::KeepAlived,
    ) -> Result<server_to_client::StatusResult, Self::Error>;

    fn handle_unknown(&self, method: &str) -> Self::Error;
}

fn respond<T: Serialize, E: Into<JsonRpcError>>(
    id: serde_json::Value,
    outcome: Result<T, E>,
) -> Response {
    match outcome {
        Ok(result) => match serde_json::to_value(result) {
            Ok(result) => Response::ok(id, result),
            Err(e) => Response::error(id, JsonRpcError::new(ERROR_CODE, e.to_string())),
        },
        Err(e) => Response::error(id, e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::json_rpc::Message;
    use serde_json::json;
    use std::collections::HashSet;

    struct TestError(&'static str);

    impl From<TestError> for JsonRpcError {
        fn from(e: TestError) -> Self {
            JsonRpcError::new(ERROR_CODE, e.0)
        }
    }

    // A minimal implementation of IsServer trait for testing
    #[derive(Default)]
    struct TestServer {
        logged_in: HashSet<String>,
    }

    fn test_job() -> server_to_client::JobDescriptor {
        server_to_client::JobDescriptor {
            job_id: "1".into(),
            blob: "00".into(),
            target: "ffffffff".into(),
            height: 1,
            seed_hash: None,
        }
    }

    impl IsServer for TestServer {
        type Error = TestError;

        fn handle_login(
            &mut self,
            request: &client_to_server::Login,
        ) -> Result<server_to_client::LoginResult, TestError> {
            self.logged_in.insert(request.login.clone());
            Ok(server_to_client::LoginResult {
                id: request.login.clone(),
                job: test_job(),
                status: server_to_client::STATUS_OK.into(),
            })
        }

        fn handle_getjob(
            &self,
            request: &client_to_server::GetJob,
        ) -> Result<server_to_client::JobDescriptor, TestError> {
            if self.logged_in.contains(&request.miner_id) {
                Ok(test_job())
            } else {
                Err(TestError("Unauthenticated"))
            }
        }

        fn handle_submit(
            &self,
            _request: &client_to_server::Submit,
        ) -> Result<server_to_client::StatusResult, TestError> {
            Ok(server_to_client::StatusResult::ok())
        }

        fn handle_keepalived(
            &self,
            _request: &client_to_server::KeepAlived,
        ) -> Result<server_to_client::StatusResult, TestError> {
            Ok(server_to_client::StatusResult::keepalived())
        }

        fn handle_unknown(&self, _method: &str) -> TestError {
            TestError("Invalid method")
        }
    }

    fn request(id: serde_json::Value, method: &str, params: serde_json::Value) -> Message {
        Message::StandardRequest(StandardRequest {
            id,
            method: method.into(),
            params,
        })
    }

    #[test]
    fn test_server_answers_unknown_method() {
        let mut server = TestServer::default();
        let response = server
            .handle_message(request(json!(42), "mining.subscribe", json!([])))
            .unwrap()
            .unwrap();
        assert_eq!(response.id, json!(42));
        assert_eq!(response.error.unwrap().message, "Invalid method");
    }

    #[test]
    fn test_server_rejects_responses() {
        let mut server = TestServer::default();
        let msg = Message::OkResponse(Response::ok(json!(1), json!(true)));
        assert!(matches!(
            server.handle_message(msg),
            Err(Error::InvalidJsonRpcMessageKind)
        ));
    }

    #[test]
    fn test_server_login_then_getjob() {
        let mut server = TestServer::default();
        let login = server
            .handle_message(request(json!("a"), "login", json!({ "login": "addr" })))
            .unwrap()
            .unwrap();
        assert!(login.error.is_none());
        assert_eq!(login.result["status"], json!("OK"));

        let job = server
            .handle_message(request(json!("b"), "getjob", json!({ "id": "addr" })))
            .unwrap()
            .unwrap();
        assert_eq!(job.id, json!("b"));
        assert_eq!(job.result["job_id"], json!("1"));
    }

    #[test]
    fn test_server_handler_error_becomes_error_response() {
        let mut server = TestServer::default();
        let response = server
            .handle_message(request(json!(5), "getjob", json!({ "id": "nobody" })))
            .unwrap()
            .unwrap();
        assert_eq!(response.result, serde_json::Value::Null);
        assert_eq!(
            response.error,
            Some(JsonRpcError::new(ERROR_CODE, "Unauthenticated"))
        );
    }

    #[test]
    fn test_server_malformed_params_are_answered() {
        let mut server = TestServer::default();
        let response = server
            .handle_message(request(json!(9), "submit", json!({ "id": "addr" })))
            .unwrap()
            .unwrap();
        assert_eq!(response.id, json!(9));
        assert_eq!(response.error.unwrap().message, "Malformed request");
    }

    #[test]
    fn test_server_ignores_notifications() {
        let mut server = TestServer::default();
        let msg: Message = json_rpc::Notification::new("job", json!({})).into();
        assert!(server.handle_message(msg).unwrap().is_none());
    }
}
