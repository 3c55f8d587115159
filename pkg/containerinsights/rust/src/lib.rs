// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Container performance collector: periodically gathers perf records and
//! insights metrics and forwards them to output streams resolved from the
//! local agent's extension configuration.

// Correctness
#![deny(clippy::indexing_slicing)]
#![deny(clippy::string_slice)]
#![deny(clippy::cast_possible_wrap)]
#![deny(clippy::undocumented_unsafe_blocks)]
// Panicking code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::unimplemented)]
#![deny(clippy::todo)]
// Debug code that shouldn't be in production
#![deny(clippy::dbg_macro)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]

pub mod collector;
pub mod config;
pub mod errors;
pub mod extension;
pub mod policy;
pub mod routing;
pub mod runner;
pub mod sink;
pub mod source;
pub mod spool;
pub mod telemetry;

// Re-export the public API
pub use collector::{Collector, CollectorMode, CollectorOptions};
pub use config::AgentEnv;
pub use extension::{ConfigFetcher, ExtensionConfigClient, ExtensionKind};
pub use policy::{CollectionPolicySnapshot, NamespaceFilteringMode};
pub use routing::StreamRoutingCache;
pub use runner::{PeriodicRunner, PeriodicTask};
pub use sink::{ConsoleSink, Record, Sink};
pub use source::{MetricQuery, MetricSource, NodeLister};
pub use telemetry::{LogReporter, TelemetryReporter};
