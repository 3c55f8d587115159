// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Seams towards the metric producers and the cluster node inventory.

use std::collections::BTreeSet;

use anyhow::Result;

use crate::policy::NamespaceFilteringMode;
use crate::sink::Record;

/// Parameters of a single fetch.
#[derive(Debug, Clone, Copy)]
pub struct MetricQuery<'a> {
    /// Remote node to query, `None` for the local node.
    pub node: Option<&'a str>,
    pub filtering_mode: NamespaceFilteringMode,
    pub namespaces: &'a BTreeSet<String>,
    /// Batch timestamp, RFC 3339 in UTC, shared by every record of a tick.
    pub timestamp: &'a str,
}

impl MetricQuery<'_> {
    pub fn allows_namespace(&self, namespace: &str) -> bool {
        self.filtering_mode.allows(self.namespaces, namespace)
    }
}

/// Producer of performance records.
pub trait MetricSource: Send {
    fn fetch_metrics(&mut self, query: &MetricQuery<'_>) -> Result<Vec<Record>>;

    fn fetch_insights_metrics(&mut self, query: &MetricQuery<'_>) -> Result<Vec<Record>>;

    /// Drops per-node state once the node list has been refreshed.
    fn reset_node_cache(&mut self) {}

    /// Drops per-node state of nodes absent from `live_nodes`.
    fn prune_node_cache(&mut self, _live_nodes: &[String]) {}
}

/// Lists the remote nodes a multi-node collector fans out to.
pub trait NodeLister: Send {
    fn list_nodes(&mut self) -> Result<Vec<String>>;
}
