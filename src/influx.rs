//! InfluxDB 1.x line protocol and HTTP write client.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;

use crate::error::{FfmrError, Result};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 8086;

/// A field value with its line-protocol type
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Str(String),
    Float(f64),
    Int(i64),
}

impl FieldValue {
    fn render(&self, out: &mut String) {
        match self {
            Self::Str(s) => {
                out.push('"');
                for c in s.chars() {
                    if c == '"' || c == '\\' {
                        out.push('\\');
                    }
                    out.push(c);
                }
                out.push('"');
            }
            Self::Float(f) => {
                let _ = write!(out, "{}", f);
            }
            Self::Int(i) => {
                let _ = write!(out, "{}i", i);
            }
        }
    }
}

/// One line-protocol point
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, FieldValue>,
    pub time: DateTime<Utc>,
}

impl Point {
    /// Render as one line of line protocol, nanosecond precision.
    ///
    /// Tags are sorted by key; tags with empty values are dropped since the
    /// protocol cannot express them.
    pub fn to_line(&self) -> Result<String> {
        if self.fields.is_empty() {
            return Err(FfmrError::influx(format!(
                "point {} has no fields",
                self.measurement
            )));
        }
        if self.fields.values().any(|v| matches!(v, FieldValue::Float(f) if !f.is_finite())) {
            return Err(FfmrError::influx(format!(
                "point {} has a non-finite float",
                self.measurement
            )));
        }
        let nanos = self.time.timestamp_nanos_opt().ok_or_else(|| {
            FfmrError::influx(format!("timestamp {} out of range", self.time))
        })?;

        let mut line = String::new();
        escape_into(&mut line, &self.measurement, &[',', ' ']);

        for (key, value) in &self.tags {
            if value.is_empty() {
                continue;
            }
            line.push(',');
            escape_into(&mut line, key, &[',', '=', ' ']);
            line.push('=');
            escape_into(&mut line, value, &[',', '=', ' ']);
        }

        let mut first = true;
        for (key, value) in &self.fields {
            line.push(if first { ' ' } else { ',' });
            first = false;
            escape_into(&mut line, key, &[',', '=', ' ']);
            line.push('=');
            value.render(&mut line);
        }

        let _ = write!(line, " {}", nanos);
        Ok(line)
    }
}

fn escape_into(out: &mut String, value: &str, special: &[char]) {
    for c in value.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
}

/// Destination for exported points
pub trait PointSink {
    fn write_points(&mut self, points: &[Point]) -> Result<()>;
}

/// Writes line protocol to any writer instead of a server
pub struct LineWriter<W: std::io::Write> {
    out: W,
}

impl<W: std::io::Write> LineWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: std::io::Write> PointSink for LineWriter<W> {
    fn write_points(&mut self, points: &[Point]) -> Result<()> {
        for point in points {
            writeln!(self.out, "{}", point.to_line()?)?;
        }
        Ok(())
    }
}

/// Connection settings for an InfluxDB 1.x server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfluxConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

/// HTTP client for the `/write` endpoint
pub struct InfluxClient {
    agent: ureq::Agent,
    config: InfluxConfig,
}

impl InfluxClient {
    pub fn new(config: InfluxConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(10))
            .timeout_read(Duration::from_secs(30))
            .build();
        Self { agent, config }
    }

    pub fn write_url(&self) -> String {
        format!("http://{}:{}/write", self.config.host, self.config.port)
    }
}

impl PointSink for InfluxClient {
    fn write_points(&mut self, points: &[Point]) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        let mut body = String::new();
        for point in points {
            body.push_str(&point.to_line()?);
            body.push('\n');
        }

        let url = self.write_url();
        self.agent
            .post(&url)
            .query("db", &self.config.database)
            .query("u", &self.config.user)
            .query("p", &self.config.password)
            .query("precision", "ns")
            .set("Content-Type", "text/plain; charset=utf-8")
            .send_string(&body)
            .map_err(|e| match e {
                ureq::Error::Status(code, response) => {
                    let detail = response.into_string().unwrap_or_default();
                    FfmrError::influx(format!("HTTP {}: {}", code, detail.trim()))
                }
                ureq::Error::Transport(t) => {
                    FfmrError::influx(format!("cannot reach {}: {}", url, t))
                }
            })?;

        tracing::debug!("Wrote {} point(s) to {}", points.len(), self.config.database);
        Ok(())
    }
}
