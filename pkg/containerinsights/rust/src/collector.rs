// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Periodic performance collector.
//!
//! Each tick resolves the output streams, fetches perf records and insights
//! metrics for every target node and hands non-empty batches to the sink.
//! Failures are contained per target and per batch; a tick never fails.

mod nodes;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use log::{debug, info, warn};
use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

pub use nodes::{NODE_REFRESH_INTERVAL, NodeRegistry};

use crate::config::AgentEnv;
use crate::policy::{CollectionPolicySnapshot, DEFAULT_INTERVAL_SECONDS};
use crate::routing::StreamRoutingCache;
use crate::runner::PeriodicTask;
use crate::sink::{Record, Sink};
use crate::source::{MetricQuery, MetricSource, NodeLister};
use crate::telemetry::{
    Counters, PERF_RECORD_COUNT_METRIC, TELEMETRY_FLUSH_INTERVAL, TelemetryReporter,
};

pub const PERF_DATA_TYPE: &str = "LINUX_PERF_BLOB";
pub const INSIGHTS_METRICS_DATA_TYPE: &str = "INSIGHTS_METRICS_BLOB";

pub const DEFAULT_PERF_TAG: &str = "oneagent.containerInsights.LINUX_PERF_BLOB";
pub const DEFAULT_INSIGHTS_METRICS_TAG: &str = "oneagent.containerInsights.INSIGHTS_METRICS_BLOB";
pub const DEFAULT_MDM_TAG: &str = "mdm.cadvisorperf";

/// How often a multi-node collector prunes per-node state of vanished nodes.
pub const NODE_CACHE_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

const BATCH_TIMESTAMP_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]Z");

/// Which nodes a collector gathers metrics for.
pub enum CollectorMode {
    /// The node the agent runs on.
    SingleNode,
    /// Every node returned by the lister, refreshed periodically.
    MultiNode(Box<dyn NodeLister>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorOptions {
    pub name: String,
    pub aad_msi_auth_mode: bool,
    pub test_mode: bool,
    /// Interval used until data collection settings say otherwise.
    pub run_interval: Duration,
    /// Secondary tag routed batches are also emitted to: perf and insights
    /// metrics of the local node, insights metrics only for remote nodes.
    pub mdm_tag: Option<String>,
}

impl CollectorOptions {
    pub fn new(name: impl Into<String>, env: &AgentEnv) -> Self {
        CollectorOptions {
            name: name.into(),
            aad_msi_auth_mode: env.aad_msi_auth_mode,
            test_mode: env.test_mode,
            run_interval: Duration::from_secs(DEFAULT_INTERVAL_SECONDS),
            mdm_tag: None,
        }
    }

    pub fn with_mdm_tag(mut self, tag: impl Into<String>) -> Self {
        self.mdm_tag = Some(tag.into());
        self
    }
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Perf,
    InsightsMetrics,
}

impl Stream {
    fn data_type(self) -> &'static str {
        match self {
            Stream::Perf => PERF_DATA_TYPE,
            Stream::InsightsMetrics => INSIGHTS_METRICS_DATA_TYPE,
        }
    }

    fn success_marker(self, multi_node: bool) -> &'static str {
        match (self, multi_node) {
            (Stream::Perf, false) => "cAdvisorPerfEmitStreamSuccess",
            (Stream::InsightsMetrics, false) => "cAdvisorInsightsMetricsEmitStreamSuccess",
            (Stream::Perf, true) => "winCAdvisorPerfEmitStreamSuccess",
            (Stream::InsightsMetrics, true) => "winCAdvisorInsightsMetricsEmitStreamSuccess",
        }
    }
}

pub struct Collector {
    options: CollectorOptions,
    routing: Arc<StreamRoutingCache>,
    source: Box<dyn MetricSource>,
    sink: Arc<dyn Sink>,
    telemetry: Arc<dyn TelemetryReporter>,
    nodes: Option<NodeRegistry>,
    policy: CollectionPolicySnapshot,
    perf_tag: String,
    insights_tag: String,
    config_refreshed_at: Instant,
    counters: Counters,
    cleaned_up_at: Instant,
}

impl Collector {
    pub fn new(
        options: CollectorOptions,
        mode: CollectorMode,
        routing: Arc<StreamRoutingCache>,
        source: Box<dyn MetricSource>,
        sink: Arc<dyn Sink>,
        telemetry: Arc<dyn TelemetryReporter>,
    ) -> Self {
        let now = Instant::now();
        let policy = CollectionPolicySnapshot {
            interval_seconds: options.run_interval.as_secs().max(1),
            ..Default::default()
        };
        Collector {
            nodes: match mode {
                CollectorMode::SingleNode => None,
                CollectorMode::MultiNode(lister) => Some(NodeRegistry::new(lister)),
            },
            options,
            routing,
            source,
            sink,
            telemetry,
            policy,
            perf_tag: DEFAULT_PERF_TAG.to_string(),
            insights_tag: DEFAULT_INSIGHTS_METRICS_TAG.to_string(),
            config_refreshed_at: now,
            counters: Counters::new(now),
            cleaned_up_at: now,
        }
    }

    pub fn policy(&self) -> &CollectionPolicySnapshot {
        &self.policy
    }

    pub fn perf_tag(&self) -> &str {
        &self.perf_tag
    }

    pub fn insights_tag(&self) -> &str {
        &self.insights_tag
    }

    /// Nodes targeted by a multi-node collector, empty in single-node mode.
    pub fn nodes(&self) -> &[String] {
        self.nodes.as_ref().map(NodeRegistry::nodes).unwrap_or_default()
    }

    pub fn enumerate(&mut self) {
        self.enumerate_at(Instant::now());
    }

    /// Runs one collection tick as of `now`.
    pub fn enumerate_at(&mut self, now: Instant) {
        let timestamp = batch_timestamp(OffsetDateTime::now_utc());

        if self.options.aad_msi_auth_mode {
            self.refresh_output_streams(now);
        }

        if let Some(registry) = self.nodes.as_mut() {
            registry.refresh_if_due(now, self.source.as_mut());
        }
        let targets: Vec<Option<String>> = match &self.nodes {
            Some(registry) => registry.nodes().iter().cloned().map(Some).collect(),
            None => vec![None],
        };
        for node in &targets {
            self.collect_target(node.as_deref(), &timestamp);
        }

        self.flush_telemetry(now);
        self.cleanup_node_cache(now);
    }

    fn refresh_output_streams(&mut self, now: Instant) {
        let (perf_tag, perf_cached) = self.routing.output_stream_id_and_source(
            PERF_DATA_TYPE,
            &self.perf_tag,
            now.saturating_duration_since(self.config_refreshed_at),
        );
        if !perf_cached {
            self.config_refreshed_at = now;
        }
        let (insights_tag, insights_cached) = self.routing.output_stream_id_and_source(
            INSIGHTS_METRICS_DATA_TYPE,
            &self.insights_tag,
            now.saturating_duration_since(self.config_refreshed_at),
        );
        if !insights_cached {
            self.config_refreshed_at = now;
        }

        if !(perf_cached && insights_cached) {
            let settings = self.routing.data_collection_settings();
            self.policy = CollectionPolicySnapshot::resolve(settings.as_ref(), &self.policy);
        }
        if perf_tag != self.perf_tag || insights_tag != self.insights_tag {
            info!(
                "{}: output streams perf='{perf_tag}' insights metrics='{insights_tag}'",
                self.options.name
            );
            for (data_type, tag, previous) in [
                (PERF_DATA_TYPE, &perf_tag, &self.perf_tag),
                (INSIGHTS_METRICS_DATA_TYPE, &insights_tag, &self.insights_tag),
            ] {
                if tag.is_empty() && !previous.is_empty() {
                    warn!(
                        "{}: {data_type} is not routed to any output stream, skipping it",
                        self.options.name
                    );
                }
            }
        }
        self.perf_tag = perf_tag;
        self.insights_tag = insights_tag;
    }

    fn collect_target(&mut self, node: Option<&str>, timestamp: &str) {
        let query = MetricQuery {
            node,
            filtering_mode: self.policy.filtering_mode,
            namespaces: &self.policy.namespaces,
            timestamp,
        };
        let perf = self.source.fetch_metrics(&query);
        let insights = self.source.fetch_insights_metrics(&query);

        match perf {
            Ok(records) => {
                self.counters.add(records.len());
                self.emit(Stream::Perf, &records, node);
            }
            Err(e) => self.report_failure(Stream::Perf, node, e),
        }
        match insights {
            Ok(records) => self.emit(Stream::InsightsMetrics, &records, node),
            Err(e) => self.report_failure(Stream::InsightsMetrics, node, e),
        }
    }

    fn emit(&self, stream: Stream, records: &[Record], node: Option<&str>) {
        if records.is_empty() {
            return;
        }
        let tag = match stream {
            Stream::Perf => &self.perf_tag,
            Stream::InsightsMetrics => &self.insights_tag,
        };
        if tag.is_empty() {
            debug!(
                "{}: skipping {} batch, stream is not routed",
                self.options.name,
                stream.data_type()
            );
            return;
        }

        self.sink.emit(tag, records);
        let multi_node = self.nodes.is_some();
        if let Some(mdm_tag) = &self.options.mdm_tag {
            if !multi_node || matches!(stream, Stream::InsightsMetrics) {
                self.sink.emit(mdm_tag, records);
            }
        }
        if self.options.test_mode {
            info!(
                "{} @ {}: emitted {} records{}",
                stream.success_marker(multi_node),
                batch_timestamp(OffsetDateTime::now_utc()),
                records.len(),
                node.map(|n| format!(" for node {n}")).unwrap_or_default()
            );
        }
    }

    fn report_failure(&self, stream: Stream, node: Option<&str>, err: anyhow::Error) {
        warn!(
            "{}: failed to collect {}{}: {err:#}",
            self.options.name,
            stream.data_type(),
            node.map(|n| format!(" for node {n}")).unwrap_or_default()
        );
        self.telemetry.report_exception(&err);
    }

    fn flush_telemetry(&mut self, now: Instant) {
        if let Some(count) = self.counters.take_if_due(now, TELEMETRY_FLUSH_INTERVAL) {
            self.telemetry
                .report_metric(PERF_RECORD_COUNT_METRIC, count as f64, &HashMap::new());
        }
    }

    fn cleanup_node_cache(&mut self, now: Instant) {
        let Some(registry) = &self.nodes else {
            return;
        };
        if now.saturating_duration_since(self.cleaned_up_at) < NODE_CACHE_CLEANUP_INTERVAL {
            return;
        }
        self.source.prune_node_cache(registry.nodes());
        self.cleaned_up_at = now;
    }
}

impl PeriodicTask for Collector {
    fn name(&self) -> &str {
        &self.options.name
    }

    fn run(&mut self) -> Result<()> {
        self.enumerate();
        Ok(())
    }

    fn interval(&self) -> Duration {
        self.policy.interval()
    }
}

fn batch_timestamp(now: OffsetDateTime) -> String {
    now.format(BATCH_TIMESTAMP_FORMAT)
        .unwrap_or_else(|_| now.unix_timestamp().to_string())
}
