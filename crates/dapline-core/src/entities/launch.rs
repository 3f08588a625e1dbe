//! Launch parameters supplied by the host at session start
//!
//! An opaque JSON object passed through to the adapter's `launch`/`attach`
//! request. A few well-known keys drive session policy:
//!
//! | Key       | Meaning                                           |
//! |-----------|---------------------------------------------------|
//! | `request` | `"launch"` (default) or anything else for attach  |
//! | `type`    | adapter identity sent as `adapterID`              |
//! | `program` | shown as the session's target name                |
//! | `noDebug` | set from the [`SessionMode`]                      |

use crate::error::{Error, Result};
use crate::substitution::StringSubstitution;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

const DEFAULT_ADAPTER_ID: &str = "adapterId";
const DEFAULT_TARGET_NAME: &str = "Debug Adapter Target";

/// Whether the session starts a new debuggee or attaches to a running one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    Launch,
    Attach,
}

impl RequestKind {
    /// Protocol command name for the start request
    pub fn command(&self) -> &'static str {
        match self {
            RequestKind::Launch => "launch",
            RequestKind::Attach => "attach",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.command())
    }
}

/// Debug mode syncs breakpoints up front; run mode does not
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    #[default]
    Debug,
    Run,
}

impl SessionMode {
    pub fn syncs_breakpoints(&self) -> bool {
        matches!(self, SessionMode::Debug)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LaunchParameters(Map<String, Value>);

impl LaunchParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Parse a JSON object without substitution
    pub fn from_json(json: &str) -> Result<Self> {
        match serde_json::from_str::<Value>(json)? {
            Value::Object(map) => Ok(Self(map)),
            other => Err(Error::InvalidParameters(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Parse a JSON object, substituting variables in every string value
    ///
    /// Nested objects and arrays are walked recursively. Numbers, booleans
    /// and null pass through untouched. Any substitution failure aborts
    /// the whole parse.
    pub fn from_json_with_substitution(
        json: &str,
        substitution: &dyn StringSubstitution,
    ) -> Result<Self> {
        let params = Self::from_json(json)?;
        let mut map = Map::with_capacity(params.0.len());
        for (key, value) in params.0 {
            map.insert(key, substitute_value(value, substitution)?);
        }
        Ok(Self(map))
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn request_kind(&self) -> RequestKind {
        match self.0.get("request") {
            None => RequestKind::Launch,
            Some(Value::String(s)) if s == "launch" => RequestKind::Launch,
            Some(_) => RequestKind::Attach,
        }
    }

    pub fn adapter_id(&self) -> &str {
        match self.0.get("type") {
            Some(Value::String(s)) => s,
            _ => DEFAULT_ADAPTER_ID,
        }
    }

    pub fn target_name(&self) -> String {
        match self.0.get("program") {
            None | Some(Value::Null) => DEFAULT_TARGET_NAME.to_string(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }

    /// Record the session mode in the `noDebug` flag adapters understand
    pub fn set_no_debug(&mut self, mode: SessionMode) {
        let no_debug = matches!(mode, SessionMode::Run);
        self.0.insert("noDebug".to_string(), Value::Bool(no_debug));
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

fn substitute_value(value: Value, substitution: &dyn StringSubstitution) -> Result<Value> {
    Ok(match value {
        Value::String(s) => Value::String(substitution.substitute(&s)?),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| substitute_value(item, substitution))
                .collect::<Result<Vec<_>>>()?,
        ),
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, item) in map {
                out.insert(key, substitute_value(item, substitution)?);
            }
            Value::Object(out)
        }
        primitive => primitive,
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Upper;

    impl StringSubstitution for Upper {
        fn substitute(&self, input: &str) -> Result<String> {
            if input.contains("${undefined}") {
                return Err(Error::Substitution("undefined".to_string()));
            }
            Ok(input.to_uppercase())
        }
    }

    #[test]
    fn test_defaults_for_missing_keys() {
        let params = LaunchParameters::new();
        assert_eq!(params.request_kind(), RequestKind::Launch);
        assert_eq!(params.adapter_id(), "adapterId");
        assert_eq!(params.target_name(), "Debug Adapter Target");
    }

    #[test]
    fn test_request_kind() {
        let attach = LaunchParameters::new().with("request", "attach");
        assert_eq!(attach.request_kind(), RequestKind::Attach);
        assert_eq!(attach.request_kind().command(), "attach");

        let launch = LaunchParameters::new().with("request", "launch");
        assert_eq!(launch.request_kind(), RequestKind::Launch);

        let other = LaunchParameters::new().with("request", "remote");
        assert_eq!(other.request_kind(), RequestKind::Attach);
    }

    #[test]
    fn test_adapter_id_requires_string() {
        let params = LaunchParameters::new().with("type", 42);
        assert_eq!(params.adapter_id(), "adapterId");
        let params = LaunchParameters::new().with("type", "debugpy");
        assert_eq!(params.adapter_id(), "debugpy");
    }

    #[test]
    fn test_target_name_renders_non_strings() {
        let params = LaunchParameters::new().with("program", json!(["a", "b"]));
        assert_eq!(params.target_name(), r#"["a","b"]"#);
    }

    #[test]
    fn test_set_no_debug() {
        let mut params = LaunchParameters::new();
        params.set_no_debug(SessionMode::Run);
        assert_eq!(params.get("noDebug"), Some(&json!(true)));
        params.set_no_debug(SessionMode::Debug);
        assert_eq!(params.get("noDebug"), Some(&json!(false)));
    }

    #[test]
    fn test_substitution_walks_nested_values() {
        let json = r#"{"program": "main.py", "args": ["x", 1, null], "env": {"k": "v", "n": true}}"#;
        let params = LaunchParameters::from_json_with_substitution(json, &Upper).unwrap();
        assert_eq!(
            params.to_value(),
            json!({"program": "MAIN.PY", "args": ["X", 1, null], "env": {"k": "V", "n": true}})
        );
    }

    #[test]
    fn test_substitution_failure_aborts() {
        let json = r#"{"cwd": {"nested": ["${undefined}"]}}"#;
        let err = LaunchParameters::from_json_with_substitution(json, &Upper).unwrap_err();
        assert!(matches!(err, Error::Substitution(_)));
    }

    #[test]
    fn test_top_level_must_be_object() {
        let err = LaunchParameters::from_json("[1, 2]").unwrap_err();
        assert!(matches!(err, Error::InvalidParameters(_)));
        assert!(err.to_string().contains("an array"));

        let err = LaunchParameters::from_json("{not json").unwrap_err();
        assert!(matches!(err, Error::InvalidParameters(_)));
    }
}
