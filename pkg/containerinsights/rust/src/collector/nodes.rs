// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::time::{Duration, Instant};

use log::{info, warn};

use crate::source::{MetricSource, NodeLister};

/// How often a multi-node collector re-lists its nodes.
pub const NODE_REFRESH_INTERVAL: Duration = Duration::from_secs(300);

/// Remote nodes a multi-node collector fans out to.
pub struct NodeRegistry {
    lister: Box<dyn NodeLister>,
    nodes: Vec<String>,
    refreshed_at: Option<Instant>,
}

impl NodeRegistry {
    pub fn new(lister: Box<dyn NodeLister>) -> Self {
        NodeRegistry {
            lister,
            nodes: Vec::new(),
            refreshed_at: None,
        }
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.refreshed_at
            .is_none_or(|at| now.saturating_duration_since(at) >= NODE_REFRESH_INTERVAL)
    }

    /// Re-lists the nodes when the refresh interval elapsed. A successful
    /// refresh resets the source's per-node cache before the new list is
    /// used; a failed one keeps the previous list until the next interval.
    /// Returns whether a refresh was attempted.
    pub fn refresh_if_due(&mut self, now: Instant, source: &mut dyn MetricSource) -> bool {
        if !self.is_due(now) {
            return false;
        }
        self.refreshed_at = Some(now);
        match self.lister.list_nodes() {
            Ok(nodes) => {
                info!("refreshed node list: {} nodes", nodes.len());
                source.reset_node_cache();
                self.nodes = nodes;
            }
            Err(e) => warn!(
                "failed to list nodes, keeping {} known nodes: {e:#}",
                self.nodes.len()
            ),
        }
        true
    }
}
