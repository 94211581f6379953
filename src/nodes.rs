//! ffmap-backend `nodes.json`: model, fetching, and statistics typing.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::{FfmrError, Result};
use crate::geohash;
use crate::influx::FieldValue;

pub const DEFAULT_NODES_URL: &str = "https://api.marburg.freifunk.net/nodes.json";

/// Statistics keys exported as strings
const STRING_KEYS: &[&str] = &["gateway"];
/// Statistics keys exported as floats; everything else is an integer
const FLOAT_KEYS: &[&str] = &["uptime", "loadavg", "memory_usage", "rootfs_usage"];

/// Top level of nodes.json
///
/// Version 1 keys nodes by ID; version 2 lists them. Nodes stay raw JSON
/// until [`NodesFile::nodes`] so one malformed node cannot fail the file.
#[derive(Debug, Deserialize)]
pub struct NodesFile {
    nodes: NodeCollection,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NodeCollection {
    Keyed(BTreeMap<String, Value>),
    Listed(Vec<Value>),
}

impl NodesFile {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| FfmrError::nodes(format!("invalid nodes.json: {}", e)))
    }

    pub fn len(&self) -> usize {
        match &self.nodes {
            NodeCollection::Keyed(map) => map.len(),
            NodeCollection::Listed(list) => list.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every node, parsed; the `Err` side names the node that failed.
    pub fn nodes(&self) -> Vec<std::result::Result<Node, FfmrError>> {
        let raw: Vec<(String, &Value)> = match &self.nodes {
            NodeCollection::Keyed(map) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
            NodeCollection::Listed(list) => list
                .iter()
                .enumerate()
                .map(|(i, v)| (format!("#{}", i), v))
                .collect(),
        };

        raw.into_iter()
            .map(|(key, value)| {
                Node::deserialize(value)
                    .map_err(|e| FfmrError::nodes(format!("node {}: {}", key, e)))
            })
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Node {
    pub nodeinfo: NodeInfo,
    #[serde(default)]
    pub statistics: Map<String, Value>,
    pub lastseen: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeInfo {
    pub node_id: String,
    pub hostname: String,
    #[serde(default)]
    pub system: System,
    pub software: Software,
    pub hardware: Hardware,
    #[serde(default)]
    pub location: Option<Location>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct System {
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Software {
    pub firmware: Firmware,
    pub autoupdater: Autoupdater,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Firmware {
    pub base: String,
    pub release: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Autoupdater {
    pub enabled: bool,
    pub branch: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Hardware {
    pub model: String,
    pub nproc: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Location {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl Node {
    pub fn is_gateway(&self) -> bool {
        self.nodeinfo.system.role.as_deref() == Some("gateway")
    }

    /// Tags attached to every point of this node.
    ///
    /// `location` is present only when both coordinates are valid.
    pub fn tags(&self) -> BTreeMap<String, String> {
        let info = &self.nodeinfo;
        let mut tags = BTreeMap::from([
            ("node_id".to_string(), info.node_id.clone()),
            ("hostname".to_string(), info.hostname.clone()),
            ("firmware_base".to_string(), info.software.firmware.base.clone()),
            ("firmware_release".to_string(), info.software.firmware.release.clone()),
            (
                "autoupdater_enabled".to_string(),
                python_bool(info.software.autoupdater.enabled).to_string(),
            ),
            (
                "autoupdater_branch".to_string(),
                info.software.autoupdater.branch.clone(),
            ),
            ("hardware_model".to_string(), info.hardware.model.clone()),
            ("hardware_nproc".to_string(), scalar_string(&info.hardware.nproc)),
        ]);

        if let Some(Location {
            latitude: Some(lat),
            longitude: Some(lon),
        }) = info.location
        {
            match geohash::encode(lat, lon, geohash::DEFAULT_PRECISION) {
                Ok(hash) => {
                    tags.insert("location".to_string(), hash);
                }
                Err(e) => tracing::debug!("{}: no location tag: {}", info.node_id, e),
            }
        }

        tags
    }

    pub fn last_seen(&self) -> Result<DateTime<Utc>> {
        parse_timestamp(&self.lastseen)
    }
}

/// Existing dashboards filter on the capitalized spelling
fn python_bool(value: bool) -> &'static str {
    if value { "True" } else { "False" }
}

fn scalar_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parse `lastseen`; timestamps without an offset are UTC.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|e| FfmrError::nodes(format!("invalid timestamp {:?}: {}", value, e)))
}

/// Flatten nested statistics, joining keys with `_`.
///
/// `{"traffic": {"rx": {"bytes": 1}}}` becomes `{"traffic_rx_bytes": 1}`.
pub fn flatten_statistics(stats: &Map<String, Value>) -> BTreeMap<String, Value> {
    let mut flat = BTreeMap::new();
    for (key, value) in stats {
        match value {
            Value::Object(child) => {
                for (child_key, child_value) in flatten_statistics(child) {
                    flat.insert(format!("{}_{}", key, child_key), child_value);
                }
            }
            other => {
                flat.insert(key.clone(), other.clone());
            }
        }
    }
    flat
}

/// Convert a flattened statistic to its exported type.
///
/// `None` when the value has no sensible conversion (null, arrays, text
/// that is not a number).
pub fn typed_value(key: &str, value: &Value) -> Option<FieldValue> {
    if STRING_KEYS.contains(&key) {
        // A node without a selected gateway reports null; there is nothing to write
        return match value {
            Value::Null => None,
            other => Some(FieldValue::Str(scalar_string(other))),
        };
    }

    if FLOAT_KEYS.contains(&key) {
        return match value {
            Value::Number(n) => n.as_f64().map(FieldValue::Float),
            Value::Bool(b) => Some(FieldValue::Float(if *b { 1.0 } else { 0.0 })),
            Value::String(s) => s.trim().parse().ok().map(FieldValue::Float),
            _ => None,
        };
    }

    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_u64().and_then(|u| i64::try_from(u).ok()))
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
            .map(FieldValue::Int),
        Value::Bool(b) => Some(FieldValue::Int(i64::from(*b))),
        Value::String(s) => s.trim().parse().ok().map(FieldValue::Int),
        _ => None,
    }
}

/// Download and parse nodes.json
pub fn fetch_nodes(url: &str) -> Result<NodesFile> {
    let agent = ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_secs(10))
        .timeout_read(Duration::from_secs(60))
        .build();

    let body = agent
        .get(url)
        .call()
        .map_err(|e| match e {
            ureq::Error::Status(code, _) => FfmrError::nodes(format!("{} returned HTTP {}", url, code)),
            ureq::Error::Transport(t) => FfmrError::nodes(format!("cannot reach {}: {}", url, t)),
        })?
        .into_string()?;

    NodesFile::from_json(&body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_flatten_nested() {
        let stats = object(json!({
            "clients": {"total": 3, "wifi": 2},
            "traffic": {"rx": {"bytes": 10, "packets": 1}},
            "uptime": 120.5
        }));
        let flat = flatten_statistics(&stats);

        assert_eq!(flat.get("clients_total"), Some(&json!(3)));
        assert_eq!(flat.get("clients_wifi"), Some(&json!(2)));
        assert_eq!(flat.get("traffic_rx_bytes"), Some(&json!(10)));
        assert_eq!(flat.get("traffic_rx_packets"), Some(&json!(1)));
        assert_eq!(flat.get("uptime"), Some(&json!(120.5)));
        assert_eq!(flat.len(), 5);
    }

    #[test]
    fn test_flatten_drops_empty_objects() {
        let stats = object(json!({"traffic": {}}));
        assert!(flatten_statistics(&stats).is_empty());
    }

    #[test]
    fn test_typed_values() {
        assert_eq!(
            typed_value("gateway", &json!("02:ca:ff:ee:00:01")),
            Some(FieldValue::Str("02:ca:ff:ee:00:01".into()))
        );
        assert_eq!(typed_value("gateway", &json!(null)), None);
        assert_eq!(typed_value("uptime", &json!(10)), Some(FieldValue::Float(10.0)));
        assert_eq!(typed_value("loadavg", &json!("0.5")), Some(FieldValue::Float(0.5)));
        assert_eq!(typed_value("clients_total", &json!(4)), Some(FieldValue::Int(4)));
        assert_eq!(typed_value("clients_total", &json!(4.9)), Some(FieldValue::Int(4)));
        assert_eq!(typed_value("clients_total", &json!(true)), Some(FieldValue::Int(1)));
        assert_eq!(typed_value("clients_total", &json!("7")), Some(FieldValue::Int(7)));
        assert_eq!(typed_value("clients_total", &json!(null)), None);
        assert_eq!(typed_value("clients_total", &json!("n/a")), None);
        assert_eq!(typed_value("memory_usage", &json!([1])), None);
    }

    #[test]
    fn test_parse_timestamp() {
        let naive = parse_timestamp("2016-03-01T12:30:00").unwrap();
        assert_eq!(naive.timestamp(), 1_456_835_400);

        let offset = parse_timestamp("2016-03-01T13:30:00+01:00").unwrap();
        assert_eq!(offset, naive);

        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_nodes_file_versions() {
        let v1 = NodesFile::from_json(r#"{"version": 1, "nodes": {"a": {}, "b": {}}}"#).unwrap();
        assert_eq!(v1.len(), 2);
        assert!(v1.nodes().iter().all(|n| n.is_err()));

        let v2 = NodesFile::from_json(r#"{"version": 2, "nodes": []}"#).unwrap();
        assert!(v2.is_empty());

        assert!(NodesFile::from_json(r#"{"version": 1}"#).is_err());
    }

    #[test]
    fn test_fetch_nodes() {
        let (port, server) =
            crate::test_http::serve_once("200 OK", r#"{"version": 2, "nodes": [{}, {}]}"#);
        let file = fetch_nodes(&format!("http://127.0.0.1:{}/nodes.json", port)).unwrap();

        assert_eq!(file.len(), 2);
        let received = server.join().unwrap();
        assert_eq!(received.request_line, "GET /nodes.json HTTP/1.1");
    }

    #[test]
    fn test_fetch_nodes_http_error() {
        let (port, server) = crate::test_http::serve_once("404 Not Found", "");
        let err = fetch_nodes(&format!("http://127.0.0.1:{}/nodes.json", port)).unwrap_err();
        server.join().unwrap();
        assert!(err.to_string().contains("HTTP 404"), "{}", err);
    }

    #[test]
    fn test_fetch_nodes_unreachable() {
        let url = format!("http://127.0.0.1:{}/nodes.json", crate::test_http::closed_port());
        let err = fetch_nodes(&url).unwrap_err();
        assert!(matches!(err, FfmrError::Nodes(_)));
        assert!(err.to_string().contains("cannot reach"), "{}", err);
    }
}
