//! Canned adapter payloads

use dapline_core::LaunchParameters;
use serde_json::{json, Value};

/// Launch parameters for a Python program under debugpy
pub fn launch_parameters(program: &str) -> LaunchParameters {
    LaunchParameters::new()
        .with("type", "python")
        .with("request", "launch")
        .with("name", program)
        .with("program", program)
}

pub fn attach_parameters(port: u16) -> LaunchParameters {
    LaunchParameters::new()
        .with("type", "python")
        .with("request", "attach")
        .with("name", format!("attach:{}", port))
        .with("connect", json!({ "host": "127.0.0.1", "port": port }))
}

/// `threads` response body
pub fn threads_body(threads: &[(i64, &str)]) -> Value {
    let threads: Vec<Value> = threads
        .iter()
        .map(|(id, name)| json!({ "id": id, "name": name }))
        .collect();
    json!({ "threads": threads })
}

pub fn frame(id: i64, name: &str, path: &str, line: i64) -> Value {
    json!({
        "id": id,
        "name": name,
        "source": { "path": path },
        "line": line,
        "column": 1
    })
}

/// `stackTrace` response body
pub fn stack_body(frames: Vec<Value>) -> Value {
    let total = frames.len();
    json!({ "stackFrames": frames, "totalFrames": total })
}

pub fn scopes_body(scopes: &[(&str, i64)]) -> Value {
    let scopes: Vec<Value> = scopes
        .iter()
        .map(|(name, reference)| {
            json!({ "name": name, "variablesReference": reference, "expensive": false })
        })
        .collect();
    json!({ "scopes": scopes })
}

/// `variables` response body; entries are (name, value, type, reference)
pub fn variables_body(variables: &[(&str, &str, &str, i64)]) -> Value {
    let variables: Vec<Value> = variables
        .iter()
        .map(|(name, value, var_type, reference)| {
            json!({
                "name": name,
                "value": value,
                "type": var_type,
                "variablesReference": reference
            })
        })
        .collect();
    json!({ "variables": variables })
}

/// `setBreakpoints` response verifying every requested line
pub fn verified_breakpoints(lines: &[i64]) -> Value {
    let breakpoints: Vec<Value> = lines
        .iter()
        .enumerate()
        .map(|(i, line)| json!({ "id": i + 1, "verified": true, "line": line }))
        .collect();
    json!({ "breakpoints": breakpoints })
}

pub fn stopped_body(thread_id: i64, reason: &str) -> Value {
    json!({ "reason": reason, "threadId": thread_id })
}
