//! Request and response messages.
//!
//! Both are thin wrappers around a JSON object. Handlers read fields through
//! `get_string` / `get_int`, which return `None` for a missing key so that
//! "absent" and "empty string" stay distinguishable. Escaping of quotes,
//! backslashes and control characters is delegated to `serde_json`.

use crate::core::error::{ScribeError, ScribeResult};
use serde_json::{Map, Value};

type Fields = Map<String, Value>;

fn parse_object(line: &str) -> ScribeResult<Fields> {
    match serde_json::from_str::<Value>(line.trim()) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(_) => Err(ScribeError::bad_request("request is not a JSON object")),
        Err(e) => Err(ScribeError::bad_request(format!("malformed JSON: {}", e))),
    }
}

fn field_str<'a>(fields: &'a Fields, key: &str) -> Option<&'a str> {
    fields.get(key).and_then(Value::as_str)
}

fn field_int(fields: &Fields, key: &str) -> Option<i64> {
    match fields.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn to_line(fields: &Fields) -> String {
    let mut line = Value::Object(fields.clone()).to_string();
    line.push('\n');
    line
}

/// A decoded request line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Request {
    fields: Fields,
}

impl Request {
    /// Start building a request for `cmd`.
    pub fn new(cmd: &str) -> Self {
        let mut fields = Fields::new();
        fields.insert("cmd".to_string(), Value::from(cmd));
        Self { fields }
    }

    /// Parse a single line (without requiring the trailing newline).
    pub fn parse(line: &str) -> ScribeResult<Self> {
        parse_object(line).map(|fields| Self { fields })
    }

    /// Set a field.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// The `cmd` field, if present.
    pub fn command(&self) -> Option<&str> {
        field_str(&self.fields, "cmd")
    }

    /// String field; `None` when absent or not a string.
    pub fn get_string(&self, key: &str) -> Option<&str> {
        field_str(&self.fields, key)
    }

    /// Integer field; accepts JSON integers and integer-valued strings.
    pub fn get_int(&self, key: &str) -> Option<i64> {
        field_int(&self.fields, key)
    }

    /// String field that must be present.
    pub fn require_string(&self, key: &str) -> ScribeResult<&str> {
        self.get_string(key)
            .ok_or_else(|| ScribeError::missing_field(key))
    }

    /// String field that must be present and non-empty.
    pub fn require_non_empty(&self, key: &str) -> ScribeResult<&str> {
        match self.get_string(key) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(ScribeError::missing_field(key)),
        }
    }

    /// Integer field that must be present.
    pub fn require_int(&self, key: &str) -> ScribeResult<i64> {
        self.get_int(key)
            .ok_or_else(|| ScribeError::missing_field(key))
    }

    /// Array-of-strings field. Non-string elements are skipped.
    pub fn get_string_list(&self, key: &str) -> Vec<String> {
        match self.fields.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Serialize as a newline-terminated line.
    pub fn to_line(&self) -> String {
        to_line(&self.fields)
    }
}

/// A response line.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    fields: Fields,
}

impl Response {
    /// `{"status":"OK"}`.
    pub fn ok() -> Self {
        let mut fields = Fields::new();
        fields.insert("status".to_string(), Value::from("OK"));
        Self { fields }
    }

    /// `{"status":"OK","msg":...}`.
    pub fn ok_message(msg: &str) -> Self {
        Self::ok().with("msg", msg)
    }

    /// `{"status":"ERR","reason":...}`.
    pub fn error(reason: &str) -> Self {
        let mut fields = Fields::new();
        fields.insert("status".to_string(), Value::from("ERR"));
        fields.insert("reason".to_string(), Value::from(reason));
        Self { fields }
    }

    /// Error response carrying the wire reason of `err`.
    pub fn from_error(err: &ScribeError) -> Self {
        Self::error(err.reason())
    }

    /// Parse a response line.
    pub fn parse(line: &str) -> ScribeResult<Self> {
        parse_object(line).map(|fields| Self { fields })
    }

    /// Set a field.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// True when `status` is `OK`.
    pub fn is_ok(&self) -> bool {
        field_str(&self.fields, "status") == Some("OK")
    }

    /// The `reason` of an error response.
    pub fn reason(&self) -> Option<&str> {
        field_str(&self.fields, "reason")
    }

    /// Raw field access.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// String field.
    pub fn get_string(&self, key: &str) -> Option<&str> {
        field_str(&self.fields, key)
    }

    /// Integer field.
    pub fn get_int(&self, key: &str) -> Option<i64> {
        field_int(&self.fields, key)
    }

    /// Convert an ERR reply into [`ScribeError::Remote`].
    pub fn into_result(self) -> ScribeResult<Self> {
        if self.is_ok() {
            Ok(self)
        } else {
            Err(ScribeError::Remote {
                reason: self.reason().unwrap_or("UNKNOWN").to_string(),
            })
        }
    }

    /// The response as a JSON value.
    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    /// Serialize as a newline-terminated line.
    pub fn to_line(&self) -> String {
        to_line(&self.fields)
    }
}

impl std::fmt::Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", Value::Object(self.fields.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_and_empty_are_distinct() {
        let req = Request::parse(r#"{"cmd":"CREATE","filename":""}"#).unwrap();
        assert_eq!(req.get_string("filename"), Some(""));
        assert_eq!(req.get_string("content"), None);
        assert!(req.require_string("filename").is_ok());
        assert!(req.require_non_empty("filename").is_err());
    }

    #[test]
    fn test_get_int_accepts_strings() {
        let req = Request::parse(r#"{"a":3,"b":"-7","c":"x"}"#).unwrap();
        assert_eq!(req.get_int("a"), Some(3));
        assert_eq!(req.get_int("b"), Some(-7));
        assert_eq!(req.get_int("c"), None);
    }

    #[test]
    fn test_escaped_content_survives() {
        let content = "say \"hi\"\\ now\n\ttab";
        let line = Request::new("UPDATE").with("content", content).to_line();
        assert!(line.ends_with('\n'));
        let parsed = Request::parse(&line).unwrap();
        assert_eq!(parsed.get_string("content"), Some(content));
    }

    #[test]
    fn test_non_object_is_bad_request() {
        let err = Request::parse("[1,2]").unwrap_err();
        assert_eq!(err.reason(), "BAD_REQUEST");
        let err = Request::parse("{not json").unwrap_err();
        assert_eq!(err.reason(), "BAD_REQUEST");
    }

    #[test]
    fn test_response_error_into_result() {
        let resp = Response::error("FILE_NOT_FOUND");
        assert!(!resp.is_ok());
        match resp.into_result() {
            Err(ScribeError::Remote { reason }) => assert_eq!(reason, "FILE_NOT_FOUND"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_string_list() {
        let req = Request::parse(r#"{"files":["a.txt",1,"b.txt"]}"#).unwrap();
        assert_eq!(req.get_string_list("files"), vec!["a.txt", "b.txt"]);
        assert!(req.get_string_list("missing").is_empty());
    }
}
