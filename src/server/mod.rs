//! Stdio request surface.
//!
//! Two wire protocols coexist on the same stream, auto-detected from the
//! first non-empty line: line-delimited JSON search requests, or JSON-RPC
//! 2.0 exposing the `code_context` tool. Responses are one line each
//! either way.

use crate::error::{Error, Result};
use crate::service::SearchService;
use crate::types::{CancelToken, SearchRequest};
use log::{debug, info, warn};
use serde_json::{json, Value};
use std::io::{BufRead, Write};
use std::sync::Arc;

/// Runs the stdio loop until EOF or cancellation.
pub fn run_stdio(service: Arc<SearchService>, token: CancelToken) -> Result<()> {
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    serve(stdin.lock(), stdout.lock(), service, token)
}

/// Protocol detection + dispatch, separated from the real streams for
/// testability.
pub fn serve<R: BufRead, W: Write>(
    reader: R,
    mut writer: W,
    service: Arc<SearchService>,
    token: CancelToken,
) -> Result<()> {
    let mut lines = reader.lines();

    // First non-empty line decides the protocol.
    let first = loop {
        match lines.next() {
            Some(Ok(line)) if line.trim().is_empty() => continue,
            Some(Ok(line)) => break line,
            Some(Err(e)) => return Err(Error::Io(e)),
            None => return Ok(()),
        }
    };

    let is_rpc = serde_json::from_str::<Value>(&first)
        .map(|v| v.get("jsonrpc").is_some())
        .unwrap_or(false);
    info!(
        "Stdio protocol detected: {}",
        if is_rpc { "json-rpc" } else { "line-json" }
    );

    let mut handle_line = |line: String, writer: &mut W| -> Result<bool> {
        if token.is_cancelled() {
            return Ok(false);
        }
        if line.trim().is_empty() {
            return Ok(true);
        }
        let reply = if is_rpc {
            handle_rpc_line(&service, &line, &token)
        } else {
            Some(handle_plain_line(&service, &line, &token))
        };
        if let Some(reply) = reply {
            writeln!(writer, "{}", reply)?;
            writer.flush()?;
        }
        Ok(true)
    };

    if !handle_line(first, &mut writer)? {
        return Ok(());
    }
    for line in lines {
        if !handle_line(line?, &mut writer)? {
            return Ok(());
        }
    }
    Ok(())
}

/// Line-delimited protocol: each line is a request object; the answer is
/// a JSON array of hits, `null` when there are none, or a structured
/// error object.
fn handle_plain_line(service: &SearchService, line: &str, token: &CancelToken) -> String {
    let request: SearchRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            return error_body("bad_query", &format!("invalid request: {}", e)).to_string();
        }
    };
    match service.search(&request, token) {
        Ok(response) if response.hits.is_empty() => "null".to_string(),
        Ok(response) => serde_json::to_string(&response.hits)
            .unwrap_or_else(|e| error_body("internal", &e.to_string()).to_string()),
        Err(e) => error_body(e.kind(), &e.to_string()).to_string(),
    }
}

fn error_body(kind: &str, message: &str) -> Value {
    json!({ "error": { "code": kind, "message": message } })
}

/// JSON-RPC 2.0: `initialize`, `tools/list`, `tools/call`. Notifications
/// (no id) get no reply.
fn handle_rpc_line(service: &SearchService, line: &str, token: &CancelToken) -> Option<String> {
    let message: Value = match serde_json::from_str(line) {
        Ok(message) => message,
        Err(e) => {
            return Some(
                rpc_error(Value::Null, -32700, &format!("parse error: {}", e), None).to_string(),
            );
        }
    };
    let id = message.get("id").cloned().unwrap_or(Value::Null);
    let method = message.get("method").and_then(|m| m.as_str()).unwrap_or("");
    if id.is_null() && !method.is_empty() {
        // Notification: side effects only.
        debug!("RPC notification {:?} ignored", method);
        return None;
    }

    let reply = match method {
        "initialize" => json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {
                "protocolVersion": "2024-11-05",
                "serverInfo": {
                    "name": "codequery",
                    "version": env!("CARGO_PKG_VERSION"),
                },
                "capabilities": { "tools": {} }
            }
        }),
        "tools/list" => json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": { "tools": [tool_descriptor()] }
        }),
        "tools/call" => return Some(handle_tool_call(service, id, &message, token).to_string()),
        other => rpc_error(id, -32601, &format!("unknown method {:?}", other), None),
    };
    Some(reply.to_string())
}

fn tool_descriptor() -> Value {
    json!({
        "name": "code_context",
        "description": "Hybrid lexical + semantic search over the indexed repositories.",
        "inputSchema": {
            "type": "object",
            "properties": {
                "query": { "type": "string" },
                "lang": { "type": "string" },
                "top_k": { "type": "integer", "minimum": 1 }
            },
            "required": ["query"]
        }
    })
}

fn handle_tool_call(service: &SearchService, id: Value, message: &Value, token: &CancelToken) -> Value {
    let params = message.get("params").cloned().unwrap_or(Value::Null);
    let name = params.get("name").and_then(|n| n.as_str()).unwrap_or("");
    if name != "code_context" {
        return rpc_error(id, -32602, &format!("unknown tool {:?}", name), None);
    }
    let arguments = params.get("arguments").cloned().unwrap_or(json!({}));
    let query = match arguments.get("query").and_then(|q| q.as_str()) {
        Some(query) if !query.trim().is_empty() => query.to_string(),
        _ => return rpc_error(id, -32602, "missing or empty query", None),
    };
    let mut request = SearchRequest::new(query);
    if let Some(top_k) = arguments.get("top_k").and_then(|k| k.as_u64()) {
        request.top_k = (top_k as usize).max(1);
    }
    if let Some(lang) = arguments.get("lang").and_then(|l| l.as_str()) {
        request.language = Some(lang.to_string());
    }

    match service.search(&request, token) {
        Ok(response) => {
            let text = serde_json::to_string_pretty(&response.hits).unwrap_or_default();
            json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {
                    "content": [{ "type": "text", "text": text }],
                    "isError": false
                }
            })
        }
        Err(e) => {
            warn!("tools/call failed: {}", e);
            rpc_error(id, e.rpc_code(), &e.to_string(), Some(json!({ "kind": e.kind() })))
        }
    }
}

fn rpc_error(id: Value, code: i64, message: &str, data: Option<Value>) -> Value {
    let mut error = json!({ "code": code, "message": message });
    if let Some(data) = data {
        error["data"] = data;
    }
    json!({ "jsonrpc": "2.0", "id": id, "error": error })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, EmbedderKind};
    use crate::lexical::LexicalIndex;
    use crate::types::CancelToken;
    use std::io::Cursor;

    fn service_with_corpus() -> (Arc<SearchService>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.index_root = Some(dir.path().join("index"));
        config.embedding.model = EmbedderKind::Hashed;
        config.embedding.dimension = 64;
        let service = Arc::new(SearchService::open(config).unwrap());

        let file = dir.path().join("auth.go");
        std::fs::write(&file, "func authenticate(user string) bool {\n\treturn true\n}\n")
            .unwrap();
        service
            .lexical_handle()
            .index_files(&[file], &CancelToken::new())
            .unwrap();
        (service, dir)
    }

    fn run(input: &str) -> String {
        let (service, _dir) = service_with_corpus();
        let mut output = Vec::new();
        serve(
            Cursor::new(input.to_string()),
            &mut output,
            service,
            CancelToken::new(),
        )
        .unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn test_line_protocol_returns_hit_array() {
        let out = run("{\"query\":\"authenticate\",\"k\":5}\n");
        let value: Value = serde_json::from_str(out.trim()).unwrap();
        let hits = value.as_array().expect("array of hits");
        assert!(!hits.is_empty());
        assert!(hits[0]["file"].as_str().unwrap().ends_with("auth.go"));
    }

    #[test]
    fn test_line_protocol_no_hits_is_null() {
        let out = run("{\"query\":\"zzzznothing\"}\n");
        assert_eq!(out.trim(), "null");
    }

    #[test]
    fn test_line_protocol_bad_json_is_structured_error() {
        let out = run("not json at all\n");
        let value: Value = serde_json::from_str(out.trim()).unwrap();
        assert_eq!(value["error"]["code"], "bad_query");
    }

    #[test]
    fn test_rpc_initialize_and_tools_list() {
        let input = concat!(
            "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"initialize\",\"params\":{}}\n",
            "{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"tools/list\"}\n",
        );
        let out = run(input);
        let lines: Vec<&str> = out.trim().lines().collect();
        assert_eq!(lines.len(), 2);
        let init: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(init["result"]["serverInfo"]["name"], "codequery");
        let list: Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(list["result"]["tools"][0]["name"], "code_context");
    }

    #[test]
    fn test_rpc_tool_call_returns_hits() {
        let input = "{\"jsonrpc\":\"2.0\",\"id\":7,\"method\":\"tools/call\",\"params\":{\"name\":\"code_context\",\"arguments\":{\"query\":\"authenticate\",\"top_k\":3}}}\n";
        let out = run(input);
        let value: Value = serde_json::from_str(out.trim()).unwrap();
        assert_eq!(value["id"], 7);
        let text = value["result"]["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("auth.go"));
    }

    #[test]
    fn test_rpc_unknown_method() {
        let out = run("{\"jsonrpc\":\"2.0\",\"id\":3,\"method\":\"nope\"}\n");
        let value: Value = serde_json::from_str(out.trim()).unwrap();
        assert_eq!(value["error"]["code"], -32601);
    }

    #[test]
    fn test_rpc_empty_query_is_invalid_params() {
        let input = "{\"jsonrpc\":\"2.0\",\"id\":4,\"method\":\"tools/call\",\"params\":{\"name\":\"code_context\",\"arguments\":{\"query\":\"  \"}}}\n";
        let out = run(input);
        let value: Value = serde_json::from_str(out.trim()).unwrap();
        assert_eq!(value["error"]["code"], -32602);
    }
}
