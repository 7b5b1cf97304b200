use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

use streamgate::Services;

use crate::rpc::{
    create_error_response, process_request, RpcRequest, RpcResponse, INTERNAL_ERROR, PARSE_ERROR,
};

/// Per-request processing limit
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

async fn write_response<W>(writer: &mut W, response: &RpcResponse) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let resp_str = match serde_json::to_string(response) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to serialize response for ID {:?}: {}", response.id, e);
            r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32000,"message":"Internal Server Error"}}"#
                .to_string()
        }
    };
    writer.write_all(format!("{}\n", resp_str).as_bytes()).await?;
    writer.flush().await
}

async fn dispatch(services: &Arc<Services>, req: RpcRequest) -> RpcResponse {
    let request_id = req.id.clone();
    let method = req.method.clone();
    let services = Arc::clone(services);
    let task = tokio::task::spawn_blocking(move || process_request(&services, req));

    match tokio::time::timeout(REQUEST_TIMEOUT, task).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => create_error_response(
            request_id,
            INTERNAL_ERROR,
            format!("Request handler failed for method '{}': {}", method, e),
        ),
        Err(_) => {
            error!(
                "Request processing timed out after {:?} for Method '{}'",
                REQUEST_TIMEOUT, method
            );
            create_error_response(
                request_id,
                INTERNAL_ERROR,
                format!("Request timed out for method '{}'", method),
            )
        }
    }
}

/// Serve newline-delimited JSON-RPC requests until the reader hits EOF
pub async fn serve<R, W>(services: Arc<Services>, mut reader: R, mut writer: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let ready = json!({"jsonrpc": "2.0", "method": "server/ready", "params": {"status": "ready"}});
    writer.write_all(format!("{}\n", ready).as_bytes()).await?;
    writer.flush().await?;

    let mut line_buffer = String::new();
    loop {
        line_buffer.clear();
        if reader.read_line(&mut line_buffer).await? == 0 {
            info!("Input closed (EOF). Exiting server.");
            return Ok(());
        }

        let trimmed_line = line_buffer.trim();
        if trimmed_line.is_empty() {
            continue;
        }
        debug!("<<< Received line ({} bytes)", trimmed_line.len());

        let parsed_json: Value = match serde_json::from_str(trimmed_line) {
            Ok(v) => v,
            Err(e) => {
                let resp = create_error_response(Value::Null, PARSE_ERROR, format!("Parse error: {}", e));
                write_response(&mut writer, &resp).await?;
                continue;
            }
        };

        // Notifications carry no id and get no response
        if parsed_json.get("id").map_or(true, Value::is_null) {
            match parsed_json.get("method").and_then(Value::as_str) {
                Some(method) => info!("Received notification: {}", method),
                None => warn!("Received notification without method field"),
            }
            continue;
        }

        let id = parsed_json.get("id").cloned().unwrap_or(Value::Null);
        let req: RpcRequest = match serde_json::from_value(parsed_json) {
            Ok(r) => r,
            Err(e) => {
                let resp = create_error_response(id, PARSE_ERROR, format!("Parse error: {}", e));
                write_response(&mut writer, &resp).await?;
                continue;
            }
        };

        let response = dispatch(&services, req).await;
        write_response(&mut writer, &response).await?;
    }
}
