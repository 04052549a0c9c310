//! Wire format for the Delve API server.
//!
//! Delve speaks Go's `net/rpc` JSON codec: each request is one JSON object
//! `{"method", "params": [args], "id"}` and each response is one JSON object
//! `{"id", "result", "error"}`. Objects are newline-terminated on the wire.

use crate::error::RpcError;

/// A decoded response from the server.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcResponse {
    /// The request id this responds to.
    pub id: u64,
    /// The result object (`null` on error).
    pub result: serde_json::Value,
    /// The error string, when the call failed.
    pub error: Option<String>,
}

/// Serialize a request line, including the trailing newline.
pub fn encode_request(id: u64, method: &str, params: serde_json::Value) -> Vec<u8> {
    let body = serde_json::json!({
        "method": method,
        "params": [params],
        "id": id,
    })
    .to_string();
    let mut buf = Vec::with_capacity(body.len() + 1);
    buf.extend_from_slice(body.as_bytes());
    buf.push(b'\n');
    buf
}

/// Parse one response line.
pub fn decode_response(line: &str) -> Result<RpcResponse, RpcError> {
    let value: serde_json::Value = serde_json::from_str(line.trim())
        .map_err(|e| RpcError::InvalidResponse(format!("invalid JSON: {e}")))?;

    let id = value
        .get("id")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| RpcError::InvalidResponse("response has no numeric id".into()))?;

    let error = match value.get("error") {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    };

    let result = value
        .get("result")
        .cloned()
        .unwrap_or(serde_json::Value::Null);

    Ok(RpcResponse { id, result, error })
}
