// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Endpoint snapshot and the directory wire format.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{DEFAULT_TTL, MAX_TTL_SECONDS};

/// Directory code meaning "nothing changed since the fingerprint you sent".
pub const CODE_NOT_MODIFIED: i64 = 304;
/// Directory code carrying a full endpoint payload.
pub const CODE_OK: i64 = 200;

/// Immutable set of API endpoints: one primary plus ordered backups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointSet {
    primary: String,
    backups: Vec<String>,
}

impl EndpointSet {
    pub fn new(primary: impl Into<String>, backups: Vec<String>) -> Self {
        Self {
            primary: primary.into(),
            backups,
        }
    }

    pub fn primary(&self) -> &str {
        &self.primary
    }

    pub fn backups(&self) -> &[String] {
        &self.backups
    }

    /// Primary first, then backups in directory order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.primary.as_str()).chain(self.backups.iter().map(String::as_str))
    }

    pub fn len(&self) -> usize {
        1 + self.backups.len()
    }

    /// Always false: a set has at least its primary endpoint.
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Envelope returned by a directory host.
#[derive(Debug, Deserialize)]
pub(crate) struct DirectoryResponse {
    #[serde(default)]
    code: Option<Value>,
    #[serde(default)]
    data: Option<Value>,
}

impl DirectoryResponse {
    pub(crate) fn parse(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    /// Integer `code`, accepting numeric strings.
    pub(crate) fn code(&self) -> Option<i64> {
        self.code.as_ref().and_then(lenient_i64)
    }

    /// Decodes `data`; `None` when the field is absent or null.
    pub(crate) fn data(&self) -> Result<Option<DirectoryData>, serde_json::Error> {
        match &self.data {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone()).map(Some),
        }
    }
}

/// Payload of a `code == 200` directory response.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct DirectoryData {
    #[serde(rename = "default.endpoint", default)]
    default_endpoint: Option<Value>,
    #[serde(rename = "backup.endpoints", default)]
    backup_endpoints: Option<Vec<Value>>,
    #[serde(default)]
    ttl: Option<Value>,
    #[serde(default)]
    md5: Option<Value>,
}

impl DirectoryData {
    pub(crate) fn default_endpoint(&self) -> Option<String> {
        self.default_endpoint.as_ref().and_then(lenient_string)
    }

    /// Fingerprint to send as `md5`; scalars other than strings keep their JSON text.
    pub(crate) fn md5(&self) -> Option<String> {
        self.md5.as_ref().and_then(lenient_string)
    }

    /// Backup endpoints in directory order; non-string entries keep their JSON text.
    pub(crate) fn backup_endpoints(&self) -> Vec<String> {
        self.backup_endpoints
            .iter()
            .flatten()
            .map(|value| match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect()
    }

    pub(crate) fn ttl(&self) -> Duration {
        effective_ttl(self.ttl.as_ref().and_then(lenient_i64))
    }
}

/// Cache lifetime for a directory-provided `ttl` in seconds.
///
/// Missing values and values outside `(0, 86400]` fall back to 30 seconds.
pub fn effective_ttl(ttl_seconds: Option<i64>) -> Duration {
    match ttl_seconds {
        Some(secs) if secs > 0 && secs <= MAX_TTL_SECONDS => Duration::from_secs(secs as u64),
        _ => DEFAULT_TTL,
    }
}

/// String value, or the JSON text of any other non-null value.
fn lenient_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn lenient_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_set_iterates_primary_first() {
        let set = EndpointSet::new("https://e1", vec!["https://e2".into(), "https://e3".into()]);
        assert_eq!(
            set.iter().collect::<Vec<_>>(),
            vec!["https://e1", "https://e2", "https://e3"]
        );
        assert_eq!(set.len(), 3);
        assert_eq!(
            serde_json::to_value(&set).expect("serializable"),
            serde_json::json!({"primary": "https://e1", "backups": ["https://e2", "https://e3"]})
        );
    }

    #[test]
    fn ttl_outside_range_falls_back_to_default() {
        assert_eq!(effective_ttl(None), DEFAULT_TTL);
        assert_eq!(effective_ttl(Some(0)), DEFAULT_TTL);
        assert_eq!(effective_ttl(Some(-5)), DEFAULT_TTL);
        assert_eq!(effective_ttl(Some(86_401)), DEFAULT_TTL);
        assert_eq!(effective_ttl(Some(1)), Duration::from_secs(1));
        assert_eq!(effective_ttl(Some(86_400)), Duration::from_secs(86_400));
    }

    #[test]
    fn parses_full_payload() {
        let body = br#"{"code":200,"data":{"default.endpoint":"https://e1","backup.endpoints":["https://e2",7],"ttl":"60","md5":"abc"}}"#;
        let response = DirectoryResponse::parse(body).expect("valid json");
        assert_eq!(response.code(), Some(200));

        let data = response.data().expect("valid data").expect("data present");
        assert_eq!(data.default_endpoint().as_deref(), Some("https://e1"));
        assert_eq!(data.backup_endpoints(), vec!["https://e2", "7"]);
        assert_eq!(data.ttl(), Duration::from_secs(60));
        assert_eq!(data.md5().as_deref(), Some("abc"));
    }

    #[test]
    fn missing_fields_decode_as_absent() {
        let response = DirectoryResponse::parse(br#"{"msg":"oops"}"#).expect("valid json");
        assert_eq!(response.code(), None);
        assert!(response.data().expect("no data").is_none());

        let response =
            DirectoryResponse::parse(br#"{"code":200,"data":{}}"#).expect("valid json");
        let data = response.data().expect("valid data").expect("data present");
        assert!(data.default_endpoint().is_none());
        assert!(data.md5().is_none());
        assert!(data.backup_endpoints().is_empty());
        assert_eq!(data.ttl(), DEFAULT_TTL);
    }

    #[test]
    fn scalar_fields_are_read_as_text() {
        let body = br#"{"code":200,"data":{"default.endpoint":"https://e1","md5":12345}}"#;
        let data = DirectoryResponse::parse(body)
            .expect("valid json")
            .data()
            .expect("valid data")
            .expect("data present");
        assert_eq!(data.default_endpoint().as_deref(), Some("https://e1"));
        assert_eq!(data.md5().as_deref(), Some("12345"));

        let body = br#"{"code":200,"data":{"default.endpoint":null,"md5":null}}"#;
        let data = DirectoryResponse::parse(body)
            .expect("valid json")
            .data()
            .expect("valid data")
            .expect("data present");
        assert!(data.default_endpoint().is_none());
        assert!(data.md5().is_none());
    }

    #[test]
    fn rejects_non_json_body() {
        assert!(DirectoryResponse::parse(b"<html>bad gateway</html>").is_err());
    }
}
