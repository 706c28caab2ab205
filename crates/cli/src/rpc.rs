//! Minimal JSON-RPC 2.0 client

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Value,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

pub async fn call(url: &str, method: &str, params: Value) -> Result<Value> {
    let request = JsonRpcRequest {
        jsonrpc: "2.0",
        method,
        params,
        id: 1,
    };

    let response: JsonRpcResponse = reqwest::Client::new()
        .post(url)
        .json(&request)
        .send()
        .await
        .context("Failed to connect to daemon")?
        .json()
        .await
        .context("Failed to parse response")?;

    if let Some(error) = response.error {
        anyhow::bail!("RPC error ({}): {}", error.code, error.message);
    }
    response
        .result
        .ok_or_else(|| anyhow::anyhow!("No result in response"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    #[tokio::test]
    async fn test_returns_result() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({
                "jsonrpc": "2.0",
                "method": "executions.get.v1",
                "params": { "executionId": "e-1" }
            })))
            .with_header("content-type", "application/json")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":{"execution":{"id":"e-1"}}}"#)
            .create_async()
            .await;

        let result = call(&server.url(), "executions.get.v1", json!({ "executionId": "e-1" }))
            .await
            .unwrap();
        assert_eq!(result["execution"]["id"], "e-1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rpc_error_becomes_message() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"error":{"code":4004,"message":"Job definition is disabled: job-1"}}"#)
            .create_async()
            .await;

        let err = call(&server.url(), "executions.enqueue.v1", json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "RPC error (4004): Job definition is disabled: job-1");
    }
}
