//! https://www.jsonrpc.org/specification#response_object
use serde::{Deserialize, Serialize};
use std::{fmt, fmt::Display};

pub const JSONRPC_VERSION: &str = "2.0";

fn jsonrpc_version() -> String {
    JSONRPC_VERSION.to_string()
}

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(untagged)]
pub enum Message {
    StandardRequest(StandardRequest),
    Notification(Notification),
    OkResponse(Response),
    ErrorResponse(Response),
}

impl Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::StandardRequest(sr) => write!(f, "{}", sr),
            Message::Notification(n) => write!(f, "{}", n),
            Message::OkResponse(r) => write!(f, "{}", r),
            Message::ErrorResponse(r) => write!(f, "{}", r),
        }
    }
}

/// Miners send numeric ids as well as strings, so the id is kept as raw json and echoed back
/// untouched.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct StandardRequest {
    pub id: serde_json::Value,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl fmt::Display for StandardRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{ id: {}, method: {}, params: {} }}",
            self.id, self.method, self.params
        )
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Notification {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    pub method: String,
    pub params: serde_json::Value,
}

impl Notification {
    pub fn new(method: &str, params: serde_json::Value) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            method: method.to_string(),
            params,
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{ method: \"{}\", params: {} }}", self.method, self.params)
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Response {
    pub id: serde_json::Value,
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    pub error: Option<JsonRpcError>,
    pub result: serde_json::Value,
}

impl Response {
    pub fn ok(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            id,
            jsonrpc: jsonrpc_version(),
            error: None,
            result,
        }
    }

    pub fn error(id: serde_json::Value, error: JsonRpcError) -> Self {
        Self {
            id,
            jsonrpc: jsonrpc_version(),
            error: Some(error),
            result: serde_json::Value::Null,
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(err) = &self.error {
            write!(f, "{{ id: {}, error: {} }}", self.id, err)
        } else {
            write!(f, "{{ id: {}, result: {} }}", self.id, self.result)
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

impl JsonRpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}) {}", self.code, self.message)
    }
}

impl From<Response> for Message {
    fn from(res: Response) -> Self {
        if res.error.is_some() {
            Message::ErrorResponse(res)
        } else {
            Message::OkResponse(res)
        }
    }
}

impl From<StandardRequest> for Message {
    fn from(sr: StandardRequest) -> Self {
        Message::StandardRequest(sr)
    }
}

impl From<Notification> for Message {
    fn from(n: Notification) -> Self {
        Message::Notification(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_login_request_with_numeric_id() {
        let line = r#"{"id":1,"jsonrpc":"2.0","method":"login","params":{"login":"addr","pass":"x"}}"#;
        match serde_json::from_str::<Message>(line).unwrap() {
            Message::StandardRequest(req) => {
                assert_eq!(req.id, json!(1));
                assert_eq!(req.method, "login");
                assert_eq!(req.params["login"], json!("addr"));
            }
            other => panic!("Expected a request, got {other:?}"),
        }
    }

    #[test]
    fn missing_params_default_to_null() {
        let line = r#"{"id":"a","method":"keepalived"}"#;
        match serde_json::from_str::<Message>(line).unwrap() {
            Message::StandardRequest(req) => assert_eq!(req.params, serde_json::Value::Null),
            other => panic!("Expected a request, got {other:?}"),
        }
    }

    #[test]
    fn job_push_is_a_notification() {
        let line = r#"{"jsonrpc":"2.0","method":"job","params":{"job_id":"1"}}"#;
        match serde_json::from_str::<Message>(line).unwrap() {
            Message::Notification(n) => assert_eq!(n.method, "job"),
            other => panic!("Expected a notification, got {other:?}"),
        }
    }

    #[test]
    fn error_response_serializes_null_result() {
        let res = Response::error(json!(7), JsonRpcError::new(-1, "Invalid job id"));
        let value = serde_json::to_value(Message::from(res)).unwrap();
        assert_eq!(value["id"], json!(7));
        assert_eq!(value["result"], serde_json::Value::Null);
        assert_eq!(value["error"]["message"], json!("Invalid job id"));
    }
}
