//! Service stat retrieval and the `KIND NAME VALUE` line protocol.
//!
//! Services expose their counters as plain text, one sample per line:
//!
//! ```text
//! counter req.put 42
//! gauge uptime 12.5
//! config volume /mnt/data1
//! ```
//!
//! Lines are tokenized one by one; a malformed line is reported and skipped
//! without affecting the rest of the response. Only numeric values are ever
//! published.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::collector::transport::{HttpTransport, TransportError, service_url};
use crate::metrics::{MetricPoint, MetricType, MetricValue, metric_name};

/// Kind token of a stat line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatKind {
    Counter,
    Gauge,
}

impl StatKind {
    pub fn metric_type(&self) -> MetricType {
        match self {
            StatKind::Counter => MetricType::Counter,
            StatKind::Gauge => MetricType::Gauge,
        }
    }
}

impl FromStr for StatKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("counter") {
            Ok(StatKind::Counter)
        } else if s.eq_ignore_ascii_case("gauge") {
            Ok(StatKind::Gauge)
        } else {
            Err(())
        }
    }
}

/// One tokenized stat line, value not yet interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawStatLine {
    pub kind: StatKind,
    pub name: String,
    pub raw_value: String,
}

/// Result of casting a raw stat value.
#[derive(Debug, Clone, PartialEq)]
pub enum StatValue {
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
}

impl StatValue {
    /// Numeric value, `None` for text.
    pub fn numeric(&self) -> Option<MetricValue> {
        match self {
            StatValue::Int(i) => Some(MetricValue::Int(*i)),
            StatValue::UInt(u) => Some(MetricValue::UInt(*u)),
            StatValue::Float(f) => Some(MetricValue::Float(*f)),
            StatValue::Text(_) => None,
        }
    }
}

/// Casts a raw value to an integer, else a finite float, else keeps the text.
pub fn cast_value(raw: &str) -> StatValue {
    let raw = raw.trim();
    if let Ok(i) = raw.parse::<i64>() {
        return StatValue::Int(i);
    }
    if let Ok(u) = raw.parse::<u64>() {
        return StatValue::UInt(u);
    }
    match raw.parse::<f64>() {
        Ok(f) if f.is_finite() => StatValue::Float(f),
        _ => StatValue::Text(raw.to_string()),
    }
}

/// A numeric sample ready to be named and published.
#[derive(Debug, Clone, PartialEq)]
pub struct StatSample {
    pub name: String,
    pub value: MetricValue,
    pub kind: StatKind,
}

impl StatSample {
    /// Converts a raw line; text values yield `None`.
    pub fn from_raw(line: &RawStatLine) -> Option<Self> {
        let value = cast_value(&line.raw_value).numeric()?;
        Some(Self {
            name: line.name.clone(),
            value,
            kind: line.kind,
        })
    }

    /// Builds the metric point `{prefix}.{name}`.
    pub fn to_point(&self, prefix: &str) -> MetricPoint {
        MetricPoint::new(
            metric_name(prefix, &self.name),
            self.value,
            self.kind.metric_type(),
            self.value.natural_precision(),
        )
    }
}

/// Error type for a single unparseable stat line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatParseError {
    /// The line does not split into exactly three fields.
    FieldCount {
        line_no: usize,
        line: String,
        fields: usize,
    },
    /// The first field is neither `counter` nor `gauge`.
    UnknownKind {
        line_no: usize,
        line: String,
        kind: String,
    },
}

impl fmt::Display for StatParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatParseError::FieldCount {
                line_no,
                line,
                fields,
            } => write!(
                f,
                "line {}: expected 3 fields, got {}: {:?}",
                line_no, fields, line
            ),
            StatParseError::UnknownKind {
                line_no,
                line,
                kind,
            } => write!(f, "line {}: unknown kind {:?}: {:?}", line_no, kind, line),
        }
    }
}

impl std::error::Error for StatParseError {}

/// Tokenizes one line into `kind name value`.
pub fn parse_line(line_no: usize, line: &str) -> Result<RawStatLine, StatParseError> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != 3 {
        return Err(StatParseError::FieldCount {
            line_no,
            line: line.to_string(),
            fields: fields.len(),
        });
    }

    let kind = fields[0]
        .parse::<StatKind>()
        .map_err(|_| StatParseError::UnknownKind {
            line_no,
            line: line.to_string(),
            kind: fields[0].to_string(),
        })?;

    Ok(RawStatLine {
        kind,
        name: fields[1].to_string(),
        raw_value: fields[2].to_string(),
    })
}

/// Parsed content of one stat response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedStats {
    pub lines: Vec<RawStatLine>,
    pub errors: Vec<StatParseError>,
}

impl ParsedStats {
    /// Numeric samples, in response order.
    pub fn samples(&self) -> Vec<StatSample> {
        self.lines.iter().filter_map(StatSample::from_raw).collect()
    }
}

/// Parses a whole stat response. Blank lines are ignored.
pub fn parse_lines(text: &str) -> ParsedStats {
    let mut parsed = ParsedStats::default();
    for (idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(idx + 1, line) {
            Ok(raw) => parsed.lines.push(raw),
            Err(e) => parsed.errors.push(e),
        }
    }
    parsed
}

/// Error type for stat retrieval.
#[derive(Debug, Clone, PartialEq)]
pub enum StatError {
    Transport(TransportError),
}

impl fmt::Display for StatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatError::Transport(e) => write!(f, "cannot fetch stats: {}", e),
        }
    }
}

impl std::error::Error for StatError {}

impl From<TransportError> for StatError {
    fn from(e: TransportError) -> Self {
        StatError::Transport(e)
    }
}

/// Where the stats of a service are read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatSource<'a> {
    /// `GET http://{address}/stat` on the service itself.
    Direct,
    /// `POST {endpoint}/v3.0/forward/stats?id={address}` on the registry proxy.
    Forwarded { registry_endpoint: &'a str },
}

/// Retrieves and parses service stats.
#[derive(Clone)]
pub struct StatFetcher {
    transport: Arc<dyn HttpTransport>,
}

impl StatFetcher {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// Fetches the raw stat text of the service at `address`.
    pub fn fetch_raw(&self, source: StatSource<'_>, address: &str) -> Result<String, StatError> {
        let body = match source {
            StatSource::Direct => self.transport.get(&direct_url(address))?,
            StatSource::Forwarded { registry_endpoint } => self
                .transport
                .post(&forward_url(registry_endpoint, address))?,
        };
        Ok(body)
    }

    /// Fetches and parses the stats of the service at `address`.
    pub fn fetch(&self, source: StatSource<'_>, address: &str) -> Result<ParsedStats, StatError> {
        self.fetch_raw(source, address).map(|body| parse_lines(&body))
    }
}

pub fn direct_url(address: &str) -> String {
    service_url(address, "/stat")
}

pub fn forward_url(registry_endpoint: &str, address: &str) -> String {
    format!(
        "{}/v3.0/forward/stats?id={}",
        registry_endpoint,
        urlencoding::encode(address)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockTransport;
    use crate::collector::transport::HttpMethod;

    #[test]
    fn test_parse_counter_line() {
        let raw = parse_line(1, "COUNTER req.put 42").unwrap();
        let sample = StatSample::from_raw(&raw).unwrap();
        assert_eq!(sample.name, "req.put");
        assert_eq!(sample.value, MetricValue::Int(42));
        assert_eq!(sample.kind, StatKind::Counter);
    }

    #[test]
    fn test_parse_gauge_line() {
        let raw = parse_line(1, "GAUGE uptime 12.5").unwrap();
        let sample = StatSample::from_raw(&raw).unwrap();
        assert_eq!(sample.name, "uptime");
        assert_eq!(sample.value, MetricValue::Float(12.5));
        assert_eq!(sample.kind, StatKind::Gauge);
    }

    #[test]
    fn test_parse_lowercase_kind() {
        let raw = parse_line(1, "counter req.hits 7").unwrap();
        assert_eq!(raw.kind, StatKind::Counter);
    }

    #[test]
    fn test_two_token_line_is_skipped() {
        let parsed = parse_lines("COUNTER req.put 42\nGAUGE broken\nGAUGE uptime 12.5\n");
        assert_eq!(parsed.lines.len(), 2);
        assert_eq!(parsed.errors.len(), 1);
        assert!(matches!(
            parsed.errors[0],
            StatParseError::FieldCount {
                line_no: 2,
                fields: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_extra_tokens_are_rejected() {
        let err = parse_line(3, "gauge name 1 2").unwrap_err();
        assert!(matches!(err, StatParseError::FieldCount { fields: 4, .. }));
    }

    #[test]
    fn test_unknown_kind() {
        let parsed = parse_lines("config volume /mnt/data1\ncounter req.put 1\n");
        assert_eq!(parsed.lines.len(), 1);
        assert!(matches!(
            parsed.errors[0],
            StatParseError::UnknownKind { line_no: 1, .. }
        ));
    }

    #[test]
    fn test_blank_lines_ignored() {
        let parsed = parse_lines("\n\ncounter a 1\n   \n");
        assert_eq!(parsed.lines.len(), 1);
        assert!(parsed.errors.is_empty());
    }

    #[test]
    fn test_cast_value() {
        assert_eq!(cast_value("42"), StatValue::Int(42));
        assert_eq!(cast_value("-3"), StatValue::Int(-3));
        assert_eq!(
            cast_value("18446744073709551615"),
            StatValue::UInt(u64::MAX)
        );
        assert_eq!(cast_value("12.5"), StatValue::Float(12.5));
        assert_eq!(cast_value("1e3"), StatValue::Float(1000.0));
        assert_eq!(cast_value("up"), StatValue::Text("up".to_string()));
        assert_eq!(cast_value("nan"), StatValue::Text("nan".to_string()));
    }

    #[test]
    fn test_counter_beyond_i64_kept_exact() {
        let raw = parse_line(1, "counter bytes.total 18446744073709551615").unwrap();
        let point = StatSample::from_raw(&raw)
            .unwrap()
            .to_point("OPENIO.rawx.10_0_0_1:6200");

        assert_eq!(point.value, MetricValue::UInt(u64::MAX));
        assert_eq!(point.precision, 0);
        assert_eq!(point.formatted_value(), "18446744073709551615");
    }

    #[test]
    fn test_text_samples_dropped() {
        let parsed = parse_lines("gauge state up\ngauge load 0.5\n");
        let samples = parsed.samples();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].name, "load");
    }

    #[test]
    fn test_sample_to_point() {
        let raw = parse_line(1, "counter req.put 42").unwrap();
        let point = StatSample::from_raw(&raw)
            .unwrap()
            .to_point("NS.rawx.10_0_0_1:6200");
        assert_eq!(point.name, "NS.rawx.10_0_0_1:6200.req.put");
        assert_eq!(point.metric_type, MetricType::Counter);
        assert_eq!(point.precision, 0);
    }

    #[test]
    fn test_forward_url_encodes_id() {
        assert_eq!(
            forward_url("http://10.0.0.1:6000", "10.0.0.1:6120"),
            "http://10.0.0.1:6000/v3.0/forward/stats?id=10.0.0.1%3A6120"
        );
        assert_eq!(
            forward_url("http://10.0.0.1:6000", "[fe80::1]:6120"),
            "http://10.0.0.1:6000/v3.0/forward/stats?id=%5Bfe80%3A%3A1%5D%3A6120"
        );
    }

    #[test]
    fn test_fetch_direct_and_forwarded() {
        let mut transport = MockTransport::new();
        transport.respond(
            HttpMethod::Get,
            "http://10.0.0.1:6200/stat",
            "counter req.put 42\n",
        );
        transport.respond(
            HttpMethod::Post,
            "http://10.0.0.1:6000/v3.0/forward/stats?id=10.0.0.1%3A6120",
            "counter req.hits 3\ngauge cnx.client 2\n",
        );
        let fetcher = StatFetcher::new(Arc::new(transport));

        let direct = fetcher.fetch(StatSource::Direct, "10.0.0.1:6200").unwrap();
        assert_eq!(direct.lines.len(), 1);

        let forwarded = fetcher
            .fetch(
                StatSource::Forwarded {
                    registry_endpoint: "http://10.0.0.1:6000",
                },
                "10.0.0.1:6120",
            )
            .unwrap();
        assert_eq!(forwarded.samples().len(), 2);
    }

    #[test]
    fn test_fetch_transport_error() {
        let fetcher = StatFetcher::new(Arc::new(MockTransport::new()));
        let err = fetcher
            .fetch(StatSource::Direct, "10.0.0.1:6200")
            .unwrap_err();
        assert!(matches!(err, StatError::Transport(_)));
    }
}
