//! `insert-data`: nodes.json statistics into InfluxDB.
//!
//! One point per flattened statistic, measurement named after the key, a
//! single `value` field, stamped with the node's `lastseen`. Gateways are
//! skipped. Each node's points are written in one request.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::error::FfmrError;
use crate::influx::{InfluxClient, InfluxConfig, LineWriter, Point, PointSink};
use crate::nodes::{self, Node, NodesFile};

/// Counters reported after an export
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub nodes_exported: usize,
    pub gateways_skipped: usize,
    pub nodes_invalid: usize,
    pub points_written: usize,
    pub values_skipped: usize,
}

/// Points for one node, plus how many statistics could not be typed
pub fn node_points(node: &Node) -> Result<(Vec<Point>, usize), FfmrError> {
    let time = node.last_seen()?;
    let tags = node.tags();
    let mut skipped = 0;
    let mut points = Vec::new();

    for (key, value) in nodes::flatten_statistics(&node.statistics) {
        debug!("{} {}: {}", node.nodeinfo.node_id, key, value);
        match nodes::typed_value(&key, &value) {
            Some(field) => points.push(Point {
                measurement: key,
                tags: tags.clone(),
                fields: BTreeMap::from([("value".to_string(), field)]),
                time,
            }),
            None => {
                warn!(
                    "{}: skipping {} (cannot convert {})",
                    node.nodeinfo.node_id, key, value
                );
                skipped += 1;
            }
        }
    }

    Ok((points, skipped))
}

/// Export every non-gateway node to `sink`.
///
/// Malformed nodes are counted and skipped; a failed write aborts.
pub fn export_nodes<S: PointSink>(file: &NodesFile, sink: &mut S) -> Result<ExportSummary> {
    let mut summary = ExportSummary::default();

    for node in file.nodes() {
        let node = match node {
            Ok(node) => node,
            Err(e) => {
                warn!("Skipping malformed node: {}", e);
                summary.nodes_invalid += 1;
                continue;
            }
        };

        if node.is_gateway() {
            debug!("Skipping gateway {}", node.nodeinfo.node_id);
            summary.gateways_skipped += 1;
            continue;
        }

        let (points, skipped) = match node_points(&node) {
            Ok(result) => result,
            Err(e) => {
                warn!("Skipping node {}: {}", node.nodeinfo.node_id, e);
                summary.nodes_invalid += 1;
                continue;
            }
        };

        sink.write_points(&points)
            .with_context(|| format!("Failed to write points for node {}", node.nodeinfo.node_id))?;

        summary.nodes_exported += 1;
        summary.points_written += points.len();
        summary.values_skipped += skipped;
    }

    Ok(summary)
}

/// Fetch `nodes_url` and write its statistics to the configured database.
///
/// With `dry_run` the line protocol goes to stdout instead.
pub fn insert_data(influx: InfluxConfig, nodes_url: &str, dry_run: bool) -> Result<ExportSummary> {
    info!("Fetching {}", nodes_url);
    let file = nodes::fetch_nodes(nodes_url)
        .with_context(|| format!("Failed to load nodes from {}", nodes_url))?;
    info!("Fetched {} node(s)", file.len());

    let summary = if dry_run {
        let mut writer = LineWriter::new(std::io::stdout().lock());
        export_nodes(&file, &mut writer)?
    } else {
        let database = influx.database.clone();
        let mut client = InfluxClient::new(influx);
        let summary = export_nodes(&file, &mut client)?;
        info!(
            "Exported {} node(s), {} point(s) to {}",
            summary.nodes_exported, summary.points_written, database
        );
        summary
    };

    Ok(summary)
}
