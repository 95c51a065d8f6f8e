//! stdio transport adapter (spec §4.7, §6) — newline-delimited JSON frames
//! on stdin/stdout. No origin check, no `Mcp-Session-Id` header: a single
//! implicit session is created when the adapter starts and terminated on
//! EOF. MUST NOT bind any network port.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tokio::io::{stdin, stdout, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, warn};

use crate::protocol::{Engine, JsonRpcRequest, RequestContext, RequestId, PROTOCOL_VERSION};
use crate::session::{mask_session_id, SessionManager};

const STDIO_STREAM: &str = "stdio";

/// Runs the stdio loop until EOF (the client closes stdin), then terminates
/// the implicit session. Returns once the loop exits cleanly.
pub async fn run_stdio(engine: Arc<Engine>, sessions: Arc<SessionManager>) -> anyhow::Result<()> {
    let session = sessions
        .create("stdio-client", None, PROTOCOL_VERSION, json!({}), HashMap::new())
        .await?;
    debug!(session_id = %mask_session_id(&session.id), "stdio session opened");

    let mut lines = BufReader::new(stdin()).lines();
    let mut out = stdout();
    let ctx = RequestContext::new(Some(session.id.clone()), STDIO_STREAM);

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<JsonRpcRequest>(line) {
            Ok(request) => engine.handle(request, &ctx).await,
            Err(e) => {
                warn!(error = %e, "malformed stdio frame");
                crate::protocol::JsonRpcResponse::error(
                    RequestId::Number(0),
                    crate::protocol::JsonRpcErrorBody {
                        code: -32700,
                        message: "parse error".to_string(),
                        data: Some(json!({ "kind": "parse_error", "retryable": false })),
                    },
                )
            }
        };
        let encoded = serde_json::to_string(&response)?;
        out.write_all(encoded.as_bytes()).await?;
        out.write_all(b"\n").await?;
        out.flush().await?;
    }

    sessions.terminate(&session.id).await?;
    debug!(session_id = %mask_session_id(&session.id), "stdio session closed (EOF)");
    Ok(())
}
