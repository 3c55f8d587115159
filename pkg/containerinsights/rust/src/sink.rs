// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use log::warn;
use serde_json::{Value, json};

/// A single metric record as handed to the forwarding layer.
pub type Record = Value;

/// Forwarding layer receiving tagged metric batches.
pub trait Sink: Send + Sync {
    fn emit(&self, tag: &str, batch: &[Record]);
}

/// Writes each record as a JSON line `{"tag": ..., "record": ...}`.
pub struct ConsoleSink<W: Write + Send> {
    out: Mutex<W>,
}

impl ConsoleSink<io::Stdout> {
    pub fn stdout() -> Self {
        ConsoleSink::new(io::stdout())
    }
}

impl<W: Write + Send> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        ConsoleSink {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> Sink for ConsoleSink<W> {
    fn emit(&self, tag: &str, batch: &[Record]) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        for record in batch {
            let line = json!({ "tag": tag, "record": record });
            if let Err(e) = writeln!(out, "{line}") {
                warn!("failed to write {tag} batch: {e}");
                return;
            }
        }
        if let Err(e) = out.flush() {
            warn!("failed to flush {tag} batch: {e}");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_console_sink_writes_json_lines() {
        let sink = ConsoleSink::new(Vec::new());
        sink.emit(
            "oneagent.containerInsights.LINUX_PERF_BLOB",
            &[json!({"CounterName": "cpuUsageNanoCores"}), json!({"CounterName": "memoryRssBytes"})],
        );
        sink.emit("empty", &[]);

        let out = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<Value> = out
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["tag"], "oneagent.containerInsights.LINUX_PERF_BLOB");
        assert_eq!(lines[1]["record"]["CounterName"], "memoryRssBytes");
    }
}
