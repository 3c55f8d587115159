// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Collection policy derived from the extension's data collection settings.
//!
//! Each setting is validated on its own: a bad interval does not discard a
//! good namespace list and vice versa.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use log::{info, warn};
use serde_json::Value;

use crate::extension::DataCollectionSettings;

pub const DEFAULT_INTERVAL_SECONDS: u64 = 60;
pub const MIN_INTERVAL_MINUTES: u64 = 1;
pub const MAX_INTERVAL_MINUTES: u64 = 30;

const INTERVAL: &str = "interval";
const NAMESPACES: &str = "namespaces";
const NAMESPACE_FILTERING_MODE: &str = "namespacefilteringmode";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NamespaceFilteringMode {
    #[default]
    Off,
    Include,
    Exclude,
}

impl NamespaceFilteringMode {
    pub fn as_str(self) -> &'static str {
        match self {
            NamespaceFilteringMode::Off => "off",
            NamespaceFilteringMode::Include => "include",
            NamespaceFilteringMode::Exclude => "exclude",
        }
    }

    /// Whether metrics from `namespace` pass the filter. An include filter
    /// with no namespaces lets everything through.
    pub fn allows(self, namespaces: &BTreeSet<String>, namespace: &str) -> bool {
        match self {
            NamespaceFilteringMode::Off => true,
            NamespaceFilteringMode::Include => {
                namespaces.is_empty() || namespaces.contains(namespace)
            }
            NamespaceFilteringMode::Exclude => !namespaces.contains(namespace),
        }
    }
}

impl FromStr for NamespaceFilteringMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "off" => Ok(NamespaceFilteringMode::Off),
            "include" => Ok(NamespaceFilteringMode::Include),
            "exclude" => Ok(NamespaceFilteringMode::Exclude),
            _ => Err(format!("unsupported namespace filtering mode: {s}")),
        }
    }
}

impl fmt::Display for NamespaceFilteringMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interval, namespace filter and filtering mode in effect for a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionPolicySnapshot {
    pub interval_seconds: u64,
    pub namespaces: BTreeSet<String>,
    pub filtering_mode: NamespaceFilteringMode,
}

impl Default for CollectionPolicySnapshot {
    fn default() -> Self {
        CollectionPolicySnapshot {
            interval_seconds: DEFAULT_INTERVAL_SECONDS,
            namespaces: BTreeSet::new(),
            filtering_mode: NamespaceFilteringMode::Off,
        }
    }
}

impl CollectionPolicySnapshot {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    /// Builds the policy for the given settings. Without settings the prior
    /// policy stays in force. Each missing or invalid field falls back to its
    /// default on its own.
    pub fn resolve(settings: Option<&DataCollectionSettings>, prior: &Self) -> Self {
        let Some(settings) = settings.filter(|s| !s.is_empty()) else {
            return prior.clone();
        };

        let policy = CollectionPolicySnapshot {
            interval_seconds: parse_interval(settings.get(INTERVAL))
                .unwrap_or(DEFAULT_INTERVAL_SECONDS),
            namespaces: parse_namespaces(settings),
            filtering_mode: parse_filtering_mode(settings.get(NAMESPACE_FILTERING_MODE)),
        };
        info!(
            "using data collection interval {}s, namespaces {:?}, filtering mode {}",
            policy.interval_seconds, policy.namespaces, policy.filtering_mode
        );
        policy
    }
}

/// Parses an interval of the form `<minutes>m` and returns it in seconds.
fn parse_interval(value: Option<&Value>) -> Option<u64> {
    let raw = value?;
    let Some(minutes) = raw
        .as_str()
        .and_then(|s| s.strip_suffix('m'))
        .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
    else {
        warn!("data collection interval {raw} is invalid, using {DEFAULT_INTERVAL_SECONDS}s");
        return None;
    };
    match minutes.parse::<u64>() {
        Ok(m) if (MIN_INTERVAL_MINUTES..=MAX_INTERVAL_MINUTES).contains(&m) => Some(m * 60),
        _ => {
            warn!(
                "data collection interval {raw} is not within {MIN_INTERVAL_MINUTES}m..{MAX_INTERVAL_MINUTES}m, using {DEFAULT_INTERVAL_SECONDS}s"
            );
            None
        }
    }
}

/// Lowercased, deduplicated namespace list. Anything other than a non-empty
/// array yields an empty list (no filter); non-string entries are skipped.
pub(crate) fn parse_namespaces(settings: &DataCollectionSettings) -> BTreeSet<String> {
    let Some(value) = settings.get(NAMESPACES) else {
        return BTreeSet::new();
    };
    let Some(entries) = value.as_array().filter(|a| !a.is_empty()) else {
        warn!("data collection namespaces {value} are not valid, using no namespace filter");
        return BTreeSet::new();
    };
    entries
        .iter()
        .filter_map(|entry| match entry.as_str() {
            Some(ns) => Some(ns.to_lowercase()),
            None => {
                warn!("skipping invalid namespace {entry}");
                None
            }
        })
        .collect()
}

fn parse_filtering_mode(value: Option<&Value>) -> NamespaceFilteringMode {
    let Some(value) = value else {
        return NamespaceFilteringMode::default();
    };
    match value.as_str().map(str::parse::<NamespaceFilteringMode>) {
        Some(Ok(mode)) => mode,
        _ => {
            warn!("namespace filtering mode {value} is not supported, using default");
            NamespaceFilteringMode::default()
        }
    }
}
