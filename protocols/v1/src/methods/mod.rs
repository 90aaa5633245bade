use std::convert::{TryFrom, TryInto};

pub mod client_to_server;
pub mod server_to_client;

use crate::json_rpc::{Message, StandardRequest};

/// Errors encountered during conversion between valid json_rpc messages and stratum methods.
#[derive(Debug)]
pub enum MethodError {
    /// If the json_rpc message call a method not defined by the dialect. It contains the called
    /// method and the request id so the caller can still answer.
    MethodNotFound(serde_json::Value, String),
    /// Method can not be parsed
    ParsingMethodError(serde_json::Value, ParsingMethodError),
    /// json_rpc message is not a request
    NotARequest,
}

#[derive(Debug, PartialEq)]
pub enum ParsingMethodError {
    ValueNotAnObject(Box<serde_json::Value>),
    MissingField(&'static str),
    ValueNotAString(&'static str, Box<serde_json::Value>),
}

impl ParsingMethodError {
    pub fn not_object_from_value(v: serde_json::Value) -> Self {
        ParsingMethodError::ValueNotAnObject(Box::new(v))
    }

    pub fn not_string_from_value(field: &'static str, v: serde_json::Value) -> Self {
        ParsingMethodError::ValueNotAString(field, Box::new(v))
    }
}

/// Reads a required string field out of a params object.
pub(crate) fn required_str(
    params: &serde_json::Map<String, serde_json::Value>,
    field: &'static str,
) -> Result<String, ParsingMethodError> {
    match params.get(field) {
        Some(serde_json::Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(ParsingMethodError::not_string_from_value(
            field,
            other.clone(),
        )),
        None => Err(ParsingMethodError::MissingField(field)),
    }
}

/// Reads an optional string field; a present but non-string value is still an error.
pub(crate) fn optional_str(
    params: &serde_json::Map<String, serde_json::Value>,
    field: &'static str,
) -> Result<Option<String>, ParsingMethodError> {
    match params.get(field) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(_) => required_str(params, field).map(Some),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Client2Server {
    Login(client_to_server::Login),
    GetJob(client_to_server::GetJob),
    Submit(client_to_server::Submit),
    KeepAlived(client_to_server::KeepAlived),
}

impl TryFrom<StandardRequest> for Client2Server {
    type Error = MethodError;

    fn try_from(msg: StandardRequest) -> Result<Self, Self::Error> {
        let id = msg.id.clone();
        let parsed = match &msg.method[..] {
            "login" => msg.try_into().map(Client2Server::Login),
            "getjob" => msg.try_into().map(Client2Server::GetJob),
            "submit" => msg.try_into().map(Client2Server::Submit),
            "keepalived" => msg.try_into().map(Client2Server::KeepAlived),
            _ => return Err(MethodError::MethodNotFound(id, msg.method)),
        };
        parsed.map_err(|e| MethodError::ParsingMethodError(id, e))
    }
}

impl TryFrom<Message> for Client2Server {
    type Error = MethodError;

    fn try_from(msg: Message) -> Result<Self, Self::Error> {
        match msg {
            Message::StandardRequest(request) => request.try_into(),
            _ => Err(MethodError::NotARequest),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(method: &str, params: serde_json::Value) -> StandardRequest {
        StandardRequest {
            id: json!(3),
            method: method.to_string(),
            params,
        }
    }

    #[test]
    fn unknown_method_keeps_request_id() {
        match Client2Server::try_from(request("mining.subscribe", json!([]))) {
            Err(MethodError::MethodNotFound(id, method)) => {
                assert_eq!(id, json!(3));
                assert_eq!(method, "mining.subscribe");
            }
            other => panic!("Expected MethodNotFound, got {other:?}"),
        }
    }

    #[test]
    fn array_params_are_rejected() {
        match Client2Server::try_from(request("login", json!(["addr"]))) {
            Err(MethodError::ParsingMethodError(_, ParsingMethodError::ValueNotAnObject(_))) => {}
            other => panic!("Expected ValueNotAnObject, got {other:?}"),
        }
    }

    #[test]
    fn notifications_are_not_requests() {
        let msg: Message = crate::json_rpc::Notification::new("job", json!({})).into();
        assert!(matches!(
            Client2Server::try_from(msg),
            Err(MethodError::NotARequest)
        ));
    }
}
