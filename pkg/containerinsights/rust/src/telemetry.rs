// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use log::{info, warn};

/// How often accumulated record counts are reported.
pub const TELEMETRY_FLUSH_INTERVAL: Duration = Duration::from_secs(300);

pub const PERF_RECORD_COUNT_METRIC: &str = "PerfRecordCount";

/// Destination for agent health telemetry.
pub trait TelemetryReporter: Send + Sync {
    fn report_metric(&self, name: &str, value: f64, tags: &HashMap<String, String>);

    fn report_exception(&self, err: &anyhow::Error);
}

/// Writes telemetry to the agent log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl TelemetryReporter for LogReporter {
    fn report_metric(&self, name: &str, value: f64, tags: &HashMap<String, String>) {
        info!("telemetry metric {name}={value} tags={tags:?}");
    }

    fn report_exception(&self, err: &anyhow::Error) {
        warn!("telemetry exception: {err:#}");
    }
}

/// Running record count over the current telemetry window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counters {
    pub record_count: u64,
    pub window_started_at: Instant,
}

impl Counters {
    pub fn new(now: Instant) -> Self {
        Counters {
            record_count: 0,
            window_started_at: now,
        }
    }

    pub fn add(&mut self, records: usize) {
        self.record_count = self.record_count.saturating_add(records as u64);
    }

    /// Once `window` has elapsed since the last flush, returns the
    /// accumulated count and starts a new window.
    pub fn take_if_due(&mut self, now: Instant, window: Duration) -> Option<u64> {
        if now.saturating_duration_since(self.window_started_at) < window {
            return None;
        }
        let count = self.record_count;
        *self = Counters::new(now);
        Some(count)
    }
}
