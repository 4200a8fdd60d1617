//! Service discovery through the registry ("conscience") proxy API.
//!
//! Discovery is two-level: the registry first lists the service types known
//! in a namespace, then the instances of each type with their score and tags.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::collector::stats::cast_value;
use crate::collector::transport::{HttpTransport, TransportError};
use crate::metrics::MetricValue;

/// Error type for discovery failures.
#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveryError {
    /// The registry could not be reached or answered with an error status.
    Transport(TransportError),
    /// The registry answered with something that is not the expected JSON.
    Decode { url: String, message: String },
}

impl fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryError::Transport(e) => write!(f, "{}", e),
            DiscoveryError::Decode { url, message } => {
                write!(f, "invalid response from {}: {}", url, message)
            }
        }
    }
}

impl std::error::Error for DiscoveryError {}

impl From<TransportError> for DiscoveryError {
    fn from(e: TransportError) -> Self {
        DiscoveryError::Transport(e)
    }
}

/// Health score of a service instance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Score {
    Numeric(MetricValue),
    /// Missing or sentinel score; never published.
    Unavailable,
}

impl Score {
    fn from_json(value: &Value) -> Self {
        match value {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Score::Numeric(MetricValue::Int(i))
                } else if let Some(u) = n.as_u64() {
                    Score::Numeric(MetricValue::UInt(u))
                } else {
                    match n.as_f64() {
                        Some(f) if f.is_finite() => Score::Numeric(MetricValue::Float(f)),
                        _ => Score::Unavailable,
                    }
                }
            }
            Value::String(s) => cast_value(s)
                .numeric()
                .map_or(Score::Unavailable, Score::Numeric),
            _ => Score::Unavailable,
        }
    }

    pub fn value(&self) -> Option<MetricValue> {
        match self {
            Score::Numeric(v) => Some(*v),
            Score::Unavailable => None,
        }
    }
}

/// One service instance as listed by the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRecord {
    pub service_type: String,
    /// `host:port` of the service.
    pub address: String,
    pub score: Score,
    pub tags: BTreeMap<String, String>,
}

impl ServiceRecord {
    /// Returns the value of `tag`, if present.
    pub fn tag(&self, tag: &str) -> Option<&str> {
        self.tags.get(tag).map(String::as_str)
    }
}

#[derive(Debug, Deserialize)]
struct RawServiceRecord {
    #[serde(default)]
    addr: String,
    #[serde(default)]
    score: Value,
    #[serde(default)]
    tags: BTreeMap<String, Value>,
}

impl RawServiceRecord {
    fn into_record(self, service_type: &str) -> ServiceRecord {
        let tags = self
            .tags
            .into_iter()
            .map(|(k, v)| {
                let v = match v {
                    Value::String(s) => s,
                    Value::Null => String::new(),
                    other => other.to_string(),
                };
                (k, v)
            })
            .collect();

        ServiceRecord {
            service_type: service_type.to_string(),
            address: self.addr,
            score: Score::from_json(&self.score),
            tags,
        }
    }
}

/// Client for the registry discovery endpoints.
#[derive(Clone)]
pub struct ConscienceClient {
    transport: Arc<dyn HttpTransport>,
}

impl ConscienceClient {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// Lists the service types of `namespace`, sorted and deduplicated.
    pub fn list_types(&self, endpoint: &str, namespace: &str) -> Result<Vec<String>, DiscoveryError> {
        let url = types_url(endpoint, namespace);
        let body = self.transport.get(&url)?;
        let types: BTreeSet<String> = decode(&url, &body)?;
        Ok(types.into_iter().collect())
    }

    /// Lists the instances of one service type, in registry order.
    pub fn list_instances(
        &self,
        endpoint: &str,
        namespace: &str,
        service_type: &str,
    ) -> Result<Vec<ServiceRecord>, DiscoveryError> {
        let url = instances_url(endpoint, namespace, service_type);
        let body = self.transport.get(&url)?;
        let records: Vec<RawServiceRecord> = decode(&url, &body)?;
        Ok(records
            .into_iter()
            .map(|r| r.into_record(service_type))
            .collect())
    }
}

fn decode<T: serde::de::DeserializeOwned>(url: &str, body: &str) -> Result<T, DiscoveryError> {
    serde_json::from_str(body).map_err(|e| DiscoveryError::Decode {
        url: url.to_string(),
        message: e.to_string(),
    })
}

pub fn types_url(endpoint: &str, namespace: &str) -> String {
    format!(
        "{}/v3.0/{}/conscience/info?what=types",
        endpoint,
        urlencoding::encode(namespace)
    )
}

pub fn instances_url(endpoint: &str, namespace: &str, service_type: &str) -> String {
    format!(
        "{}/v3.0/{}/conscience/list?type={}",
        endpoint,
        urlencoding::encode(namespace),
        urlencoding::encode(service_type)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockTransport;
    use crate::collector::transport::HttpMethod;

    const ENDPOINT: &str = "http://10.0.0.1:6000";

    fn client(transport: MockTransport) -> ConscienceClient {
        ConscienceClient::new(Arc::new(transport))
    }

    #[test]
    fn test_urls_encode_namespace_and_type() {
        assert_eq!(
            types_url(ENDPOINT, "OPENIO"),
            "http://10.0.0.1:6000/v3.0/OPENIO/conscience/info?what=types"
        );
        assert_eq!(
            types_url(ENDPOINT, "my ns/1"),
            "http://10.0.0.1:6000/v3.0/my%20ns%2F1/conscience/info?what=types"
        );
        assert_eq!(
            instances_url(ENDPOINT, "OPENIO", "rawx&x=1"),
            "http://10.0.0.1:6000/v3.0/OPENIO/conscience/list?type=rawx%26x%3D1"
        );
    }

    #[test]
    fn test_list_types() {
        let mut transport = MockTransport::new();
        transport.respond(
            HttpMethod::Get,
            types_url(ENDPOINT, "OPENIO"),
            r#"["rawx","meta2","meta0","rawx"]"#,
        );

        let types = client(transport).list_types(ENDPOINT, "OPENIO").unwrap();
        assert_eq!(types, vec!["meta0", "meta2", "rawx"]);
    }

    #[test]
    fn test_list_types_transport_error() {
        let mut transport = MockTransport::new();
        transport.refuse(HttpMethod::Get, types_url(ENDPOINT, "OPENIO"));

        let err = client(transport).list_types(ENDPOINT, "OPENIO").unwrap_err();
        assert!(matches!(err, DiscoveryError::Transport(_)));
    }

    #[test]
    fn test_list_types_malformed_json() {
        let mut transport = MockTransport::new();
        transport.respond(HttpMethod::Get, types_url(ENDPOINT, "OPENIO"), "<html>");

        let err = client(transport).list_types(ENDPOINT, "OPENIO").unwrap_err();
        assert!(matches!(err, DiscoveryError::Decode { .. }));
    }

    #[test]
    fn test_list_instances() {
        let mut transport = MockTransport::new();
        transport.respond(
            HttpMethod::Get,
            instances_url(ENDPOINT, "OPENIO", "rawx"),
            r#"[
                {"addr":"10.0.0.1:6200","score":97,"tags":{"tag.vol":"/mnt/data1","tag.up":true,"stat.cpu":98.5}},
                {"addr":"10.0.0.2:6200","score":"n/a","tags":{}},
                {"addr":"10.0.0.3:6200","score":12.5},
                {"score":50}
            ]"#,
        );

        let records = client(transport)
            .list_instances(ENDPOINT, "OPENIO", "rawx")
            .unwrap();
        assert_eq!(records.len(), 4);

        assert_eq!(records[0].service_type, "rawx");
        assert_eq!(records[0].address, "10.0.0.1:6200");
        assert_eq!(records[0].score, Score::Numeric(MetricValue::Int(97)));
        assert_eq!(records[0].tag("tag.vol"), Some("/mnt/data1"));
        assert_eq!(records[0].tag("tag.up"), Some("true"));
        assert_eq!(records[0].tag("stat.cpu"), Some("98.5"));

        assert_eq!(records[1].score, Score::Unavailable);
        assert_eq!(records[2].score, Score::Numeric(MetricValue::Float(12.5)));
        assert_eq!(records[3].address, "");
    }

    #[test]
    fn test_score_from_json() {
        assert_eq!(
            Score::from_json(&Value::String("42".into())),
            Score::Numeric(MetricValue::Int(42))
        );
        assert_eq!(Score::from_json(&Value::Null), Score::Unavailable);
        assert_eq!(Score::from_json(&Value::Bool(true)), Score::Unavailable);
        assert_eq!(Score::Unavailable.value(), None);
    }
}
