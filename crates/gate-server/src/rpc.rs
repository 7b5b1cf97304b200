use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use streamgate::{AdmissionRequest, PlaybackRequest, Services};

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32000;
/// Admission status outside the protocol
pub const PROTOCOL_VIOLATION: i32 = -32001;
/// Caller failed request authorization
pub const UNAUTHORIZED: i32 = -32002;

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

pub fn create_error_response(id: Value, code: i32, message: String) -> RpcResponse {
    error!("Responding with error: code={}, message={}", code, message);
    RpcResponse {
        jsonrpc: "2.0".to_string(),
        id,
        result: None,
        error: Some(RpcError { code, message }),
    }
}

pub fn create_success_response(id: Value, result: Value) -> RpcResponse {
    RpcResponse {
        jsonrpc: "2.0".to_string(),
        id,
        result: Some(result),
        error: None,
    }
}

fn to_result<T: Serialize>(id: Value, value: &T) -> RpcResponse {
    match serde_json::to_value(value) {
        Ok(v) => create_success_response(id, v),
        Err(e) => create_error_response(id, INTERNAL_ERROR, format!("Serialization error: {}", e)),
    }
}

pub fn process_request(services: &Services, req: RpcRequest) -> RpcResponse {
    debug!("Processing request: id={:?}, method={}", req.id, req.method);

    if req.jsonrpc != "2.0" {
        return create_error_response(
            req.id,
            INVALID_REQUEST,
            "Invalid Request: jsonrpc must be \"2.0\"".to_string(),
        );
    }

    match req.method.as_str() {
        "help" => create_success_response(
            req.id,
            json!({
                "message": "streamgate server: playback authorization and stream admission",
                "methods": {
                    "admission": { "params": { "status": "opening|closing", "direction": "incoming|outgoing", "url": "string (outgoing only)" } },
                    "get_playback_url": { "params": { "table_id": "string", "service_id": "string", "user_id": "string", "authorization": { "signature": "base64", "timestamp": "ms since epoch" } } },
                    "get_status": { "params": {} },
                    "help": { "params": {} }
                }
            }),
        ),

        "get_status" => create_success_response(
            req.id,
            json!({ "status": services.playback.status() }),
        ),

        "admission" => {
            let params = match serde_json::from_value::<AdmissionRequest>(req.params) {
                Ok(p) => p,
                Err(e) => {
                    return create_error_response(
                        req.id,
                        INVALID_PARAMS,
                        format!("Invalid admission params: {}", e),
                    )
                }
            };
            match services.admission.decide(&params) {
                Ok(decision) => to_result(req.id, &decision),
                Err(e) => create_error_response(req.id, PROTOCOL_VIOLATION, e.to_string()),
            }
        }

        "get_playback_url" => {
            let params = match serde_json::from_value::<PlaybackRequest>(req.params) {
                Ok(p) => p,
                Err(e) => {
                    return create_error_response(
                        req.id,
                        INVALID_PARAMS,
                        format!("Invalid get_playback_url params: {}", e),
                    )
                }
            };
            match services.playback.get_playback_url(&params) {
                Ok(playback) => {
                    info!("Issued playback url for user {}", params.user_id);
                    to_result(req.id, &playback)
                }
                Err(e) if e.is_unauthorized() => {
                    create_error_response(req.id, UNAUTHORIZED, e.to_string())
                }
                Err(e) => create_error_response(req.id, INTERNAL_ERROR, e.to_string()),
            }
        }

        other => {
            warn!("Unknown method: {}", other);
            create_error_response(req.id, METHOD_NOT_FOUND, format!("Method not found: {}", other))
        }
    }
}
