use base64::Engine;
use http_body_util::{BodyExt, Full};
use hyper::{
    body::Bytes,
    header::{AUTHORIZATION, CONTENT_TYPE},
    Request,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

/// JSON-RPC client of the node the pool mines on.
#[derive(Debug)]
pub struct DaemonRpcClient {
    client: Client<HttpConnector, Full<Bytes>>,
    url: hyper::Uri,
    auth: Option<Auth>,
    /// Upper bound on one request, body included.
    timeout: Duration,
    next_id: AtomicU64,
}

impl DaemonRpcClient {
    pub fn new(url: hyper::Uri, auth: Option<Auth>, timeout: Duration) -> DaemonRpcClient {
        let client: Client<_, Full<Bytes>> = Client::builder(TokioExecutor::new()).build_http();
        DaemonRpcClient {
            client,
            url,
            auth,
            timeout,
            next_id: AtomicU64::new(1),
        }
    }

    /// Requests a fresh template paying to `wallet`, with `reserve_size` bytes left for the
    /// pool's extra nonce.
    pub async fn get_block_template(
        &self,
        wallet: &str,
        reserve_size: u32,
    ) -> Result<GetBlockTemplateReply, RpcError> {
        self.call(
            "getblocktemplate",
            json!({ "wallet_address": wallet, "reserve_size": reserve_size }),
        )
        .await
    }

    pub async fn submit_block(&self, block_hex: String) -> Result<SubmitBlockReply, RpcError> {
        self.call("submitblock", json!([block_hex])).await
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, RpcError> {
        let body = self.send_json_rpc_request(method, params).await?;
        let reply: JsonRpcResult<T> =
            serde_json::from_str(&body).map_err(|e| RpcError::Deserialization(e.to_string()))?;
        if let Some(error) = reply.error {
            return Err(RpcError::JsonRpc(error));
        }
        reply
            .result
            .ok_or_else(|| RpcError::Other(format!("`{method}` returned no result")))
    }

    async fn send_json_rpc_request(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<String, RpcError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };

        let request_body =
            serde_json::to_string(&request).map_err(|e| RpcError::Serialization(e.to_string()))?;

        let mut builder = Request::builder()
            .method("POST")
            .uri(self.url.clone())
            .header(CONTENT_TYPE, "application/json");
        if let Some(auth) = &self.auth {
            builder = builder.header(AUTHORIZATION, auth.header_value());
        }
        let req = builder
            .body(Full::<Bytes>::from(request_body))
            .map_err(|e| RpcError::Http(e.to_string()))?;

        let exchange = async {
            let response = self
                .client
                .request(req)
                .await
                .map_err(|e| RpcError::Http(e.to_string()))?;
            let status = response.status();
            let body = response
                .into_body()
                .collect()
                .await
                .map_err(|e| RpcError::Http(e.to_string()))?
                .to_bytes()
                .to_vec();
            Ok::<_, RpcError>((status, body))
        };
        let (status, body) = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| {
                RpcError::Http(format!("`{method}` timed out after {:?}", self.timeout))
            })??;

        if status.is_success() {
            String::from_utf8(body).map_err(|e| RpcError::Deserialization(e.to_string()))
        } else {
            match serde_json::from_slice::<JsonRpcResult<serde_json::Value>>(&body) {
                Ok(JsonRpcResult {
                    error: Some(error),
                    ..
                }) => Err(RpcError::JsonRpc(error)),
                _ => Err(RpcError::Http(format!("daemon answered {status}"))),
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct Auth {
    username: String,
    password: String,
}

impl Auth {
    pub fn new(username: String, password: String) -> Auth {
        Auth { username, password }
    }

    fn header_value(&self) -> String {
        format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD
                .encode(format!("{}:{}", self.username, self.password))
        )
    }
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: serde_json::Value,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResult<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

/// `getblocktemplate` result as returned by the node.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct GetBlockTemplateReply {
    pub blocktemplate_blob: String,
    pub difficulty: u64,
    pub height: u64,
    pub prev_hash: String,
    pub reserved_offset: usize,
    #[serde(default)]
    pub seed_hash: Option<String>,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct SubmitBlockReply {
    #[serde(default)]
    pub status: String,
}

#[derive(Debug)]
pub enum RpcError {
    JsonRpc(JsonRpcError),
    Deserialization(String),
    Serialization(String),
    Http(String),
    Other(String),
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RpcError::JsonRpc(e) => write!(f, "daemon error {}: {}", e.code, e.message),
            RpcError::Deserialization(e) => write!(f, "bad daemon reply: {e}"),
            RpcError::Serialization(e) => write!(f, "cannot serialize request: {e}"),
            RpcError::Http(e) => write!(f, "http: {e}"),
            RpcError::Other(e) => f.write_str(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_reply_without_seed_hash() {
        let body = r#"{
            "id": 1,
            "jsonrpc": "2.0",
            "result": {
                "blocktemplate_blob": "0a0b0c",
                "difficulty": 120000,
                "height": 4242,
                "prev_hash": "ab",
                "reserved_offset": 1,
                "status": "OK"
            }
        }"#;
        let reply: JsonRpcResult<GetBlockTemplateReply> = serde_json::from_str(body).unwrap();
        let template = reply.result.unwrap();
        assert_eq!(template.height, 4242);
        assert_eq!(template.seed_hash, None);
        assert!(reply.error.is_none());
    }

    #[test]
    fn error_reply_is_parsed() {
        let body = r#"{"id":1,"jsonrpc":"2.0","error":{"code":-9,"message":"core is busy"}}"#;
        let reply: JsonRpcResult<GetBlockTemplateReply> = serde_json::from_str(body).unwrap();
        assert_eq!(
            reply.error,
            Some(JsonRpcError {
                code: -9,
                message: "core is busy".into()
            })
        );
    }

    #[tokio::test]
    async fn silent_daemon_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url: hyper::Uri = format!("http://{}/json_rpc", listener.local_addr().unwrap())
            .parse()
            .unwrap();
        // Accept and hold the connection without ever answering.
        let held = tokio::spawn(async move { listener.accept().await.map(|(stream, _)| stream) });

        let client = DaemonRpcClient::new(url, None, Duration::from_millis(100));
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            client.get_block_template("dero1qy", 8),
        )
        .await
        .expect("request must not hang");
        match result {
            Err(RpcError::Http(e)) => assert!(e.contains("timed out")),
            other => panic!("unexpected result: {other:?}"),
        }
        drop(held);
    }

    #[test]
    fn basic_auth_header() {
        let auth = Auth::new("user".into(), "pass".into());
        assert_eq!(auth.header_value(), "Basic dXNlcjpwYXNz");
    }
}
