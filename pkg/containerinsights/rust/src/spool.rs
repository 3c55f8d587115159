// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! File based adapters used by the standalone binary.
//!
//! Producers drop JSON arrays of records into a spool directory:
//!
//! ```text
//! <root>/perf.json              local node perf records
//! <root>/insights.json          local node insights metrics
//! <root>/nodes                  remote node names, one per line
//! <root>/<node>/perf.json       perf records of a remote node
//! <root>/<node>/insights.json
//! ```
//!
//! A file is consumed once per modification time. That per-file bookkeeping
//! is the per-node cache the collector resets and prunes.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use log::debug;

use crate::sink::Record;
use crate::source::{MetricQuery, MetricSource, NodeLister};

pub const PERF_FILE: &str = "perf.json";
pub const INSIGHTS_FILE: &str = "insights.json";
pub const NODES_FILE: &str = "nodes";

const NAMESPACE_FIELD: &str = "Namespace";

pub struct SpoolMetricSource {
    root: PathBuf,
    // (node, file) -> modification time of the last consumed snapshot;
    // the local node is keyed by an empty name
    consumed: HashMap<(String, &'static str), SystemTime>,
}

impl SpoolMetricSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        SpoolMetricSource {
            root: root.into(),
            consumed: HashMap::new(),
        }
    }

    fn read_batch(&mut self, query: &MetricQuery<'_>, file: &'static str) -> Result<Vec<Record>> {
        let path = match query.node {
            Some(node) => self.root.join(node).join(file),
            None => self.root.join(file),
        };
        let modified = match fs::metadata(&path) {
            Ok(meta) => meta
                .modified()
                .with_context(|| format!("reading mtime of {}", path.display()))?,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };

        let key = (query.node.unwrap_or_default().to_string(), file);
        if self.consumed.get(&key) == Some(&modified) {
            debug!("{} unchanged since last tick", path.display());
            return Ok(Vec::new());
        }

        let contents = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
        let records: Vec<Record> = serde_json::from_slice(&contents)
            .with_context(|| format!("parsing {}", path.display()))?;
        self.consumed.insert(key, modified);

        Ok(records
            .into_iter()
            .filter(|record| {
                record
                    .get(NAMESPACE_FIELD)
                    .and_then(|ns| ns.as_str())
                    .is_none_or(|ns| query.allows_namespace(ns))
            })
            .collect())
    }
}

impl MetricSource for SpoolMetricSource {
    fn fetch_metrics(&mut self, query: &MetricQuery<'_>) -> Result<Vec<Record>> {
        self.read_batch(query, PERF_FILE)
    }

    fn fetch_insights_metrics(&mut self, query: &MetricQuery<'_>) -> Result<Vec<Record>> {
        self.read_batch(query, INSIGHTS_FILE)
    }

    fn reset_node_cache(&mut self) {
        self.consumed.retain(|(node, _), _| node.is_empty());
    }

    fn prune_node_cache(&mut self, live_nodes: &[String]) {
        self.consumed
            .retain(|(node, _), _| node.is_empty() || live_nodes.contains(node));
    }
}

pub struct SpoolNodeLister {
    path: PathBuf,
}

impl SpoolNodeLister {
    pub fn new(root: &Path) -> Self {
        SpoolNodeLister {
            path: root.join(NODES_FILE),
        }
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }
}

impl NodeLister for SpoolNodeLister {
    fn list_nodes(&mut self) -> Result<Vec<String>> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("reading node list {}", self.path.display()))?;
        Ok(contents
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(String::from)
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeSet;

    use serde_json::json;

    use super::*;
    use crate::policy::NamespaceFilteringMode;

    fn query<'a>(node: Option<&'a str>, namespaces: &'a BTreeSet<String>) -> MetricQuery<'a> {
        MetricQuery {
            node,
            filtering_mode: NamespaceFilteringMode::Exclude,
            namespaces,
            timestamp: "2026-10-19T00:00:00Z",
        }
    }

    fn write_records(path: &Path, records: serde_json::Value) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, records.to_string()).unwrap();
    }

    #[test]
    fn test_missing_files_are_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = SpoolMetricSource::new(dir.path());
        let none = BTreeSet::new();
        assert!(source.fetch_metrics(&query(None, &none)).unwrap().is_empty());
        assert!(
            source
                .fetch_insights_metrics(&query(Some("win-1"), &none))
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_snapshot_consumed_once_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        write_records(
            &dir.path().join(PERF_FILE),
            json!([
                {"CounterName": "cpu", "Namespace": "default"},
                {"CounterName": "cpu", "Namespace": "kube-system"},
                {"CounterName": "node"}
            ]),
        );
        let excluded: BTreeSet<String> = ["kube-system".to_string()].into_iter().collect();
        let mut source = SpoolMetricSource::new(dir.path());

        let records = source.fetch_metrics(&query(None, &excluded)).unwrap();
        assert_eq!(records.len(), 2);
        assert!(source.fetch_metrics(&query(None, &excluded)).unwrap().is_empty());
    }

    #[test]
    fn test_reset_and_prune_only_touch_remote_nodes() {
        let dir = tempfile::tempdir().unwrap();
        let none = BTreeSet::new();
        write_records(&dir.path().join(PERF_FILE), json!([{"CounterName": "local"}]));
        for node in ["win-1", "win-2"] {
            write_records(&dir.path().join(node).join(PERF_FILE), json!([{"CounterName": node}]));
        }
        let mut source = SpoolMetricSource::new(dir.path());
        for node in [None, Some("win-1"), Some("win-2")] {
            assert_eq!(source.fetch_metrics(&query(node, &none)).unwrap().len(), 1);
        }

        source.prune_node_cache(&["win-1".to_string()]);
        assert!(source.fetch_metrics(&query(Some("win-1"), &none)).unwrap().is_empty());
        assert_eq!(source.fetch_metrics(&query(Some("win-2"), &none)).unwrap().len(), 1);

        source.reset_node_cache();
        assert!(source.fetch_metrics(&query(None, &none)).unwrap().is_empty());
        assert_eq!(source.fetch_metrics(&query(Some("win-1"), &none)).unwrap().len(), 1);
    }

    #[test]
    fn test_malformed_snapshot_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(INSIGHTS_FILE), "{not json").unwrap();
        let mut source = SpoolMetricSource::new(dir.path());
        let none = BTreeSet::new();
        assert!(source.fetch_insights_metrics(&query(None, &none)).is_err());
    }

    #[test]
    fn test_node_lister() {
        let dir = tempfile::tempdir().unwrap();
        let mut lister = SpoolNodeLister::new(dir.path());
        assert!(!lister.exists());
        assert!(lister.list_nodes().is_err());

        fs::write(dir.path().join(NODES_FILE), "# windows nodes\nwin-1\n\n  win-2 \n").unwrap();
        assert!(lister.exists());
        assert_eq!(lister.list_nodes().unwrap(), vec!["win-1", "win-2"]);
    }
}
