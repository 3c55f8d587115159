// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Extension configuration pushed by the local monitoring agent: which data
//! types are routed to which output streams, and how data collection is
//! tuned for them.

use std::collections::HashMap;

use log::warn;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::policy;

pub mod client;
pub mod protocol;

pub use client::ExtensionConfigClient;

/// Data type whose output stream carries container log v2 records.
pub const CONTAINER_LOG_V2_DATA_TYPE: &str = "containerinsights_containerlogv2";

const ENABLE_CONTAINER_LOG_V2: &str = "enablecontainerlogv2";

/// Extensions the control process knows how to answer for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionKind {
    ContainerInsights,
    ContainerLogV2,
}

impl ExtensionKind {
    pub fn tag(self) -> &'static str {
        match self {
            ExtensionKind::ContainerInsights => "ContainerInsights",
            ExtensionKind::ContainerLogV2 => "ContainerLogV2Extension",
        }
    }

    pub fn version(self) -> &'static str {
        match self {
            ExtensionKind::ContainerInsights => "1",
            ExtensionKind::ContainerLogV2 => "1",
        }
    }
}

/// Source of extension configurations. Implementations never fail: any
/// problem is logged and reported as an empty list.
pub trait ConfigFetcher: Send + Sync {
    fn fetch_configurations(&self) -> Vec<ExtensionConfiguration>;
}

/// Decoded `TaggedData` payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaggedData {
    #[serde(default, rename = "extensionConfigurations")]
    pub extension_configurations: Vec<ExtensionConfiguration>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ExtensionConfiguration {
    #[serde(
        default,
        rename = "outputStreams",
        deserialize_with = "deserialize_output_streams"
    )]
    pub output_streams: HashMap<String, String>,
    #[serde(default, rename = "extensionSettings")]
    pub extension_settings: ExtensionSettings,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ExtensionSettings {
    #[serde(default, rename = "dataCollectionSettings")]
    pub data_collection_settings: Option<DataCollectionSettings>,
}

/// Data collection settings with keys folded to lowercase, so lookups are
/// case-insensitive regardless of how the control plane spells them.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(from = "Map<String, Value>")]
pub struct DataCollectionSettings(Map<String, Value>);

impl From<Map<String, Value>> for DataCollectionSettings {
    fn from(raw: Map<String, Value>) -> Self {
        DataCollectionSettings(
            raw.into_iter()
                .map(|(k, v)| (k.to_lowercase(), v))
                .collect(),
        )
    }
}

impl DataCollectionSettings {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(&key.to_lowercase())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn container_log_v2_enabled(&self) -> bool {
        match self.get(ENABLE_CONTAINER_LOG_V2) {
            Some(Value::Bool(enabled)) => *enabled,
            Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }
}

// Stream ids must be strings; anything else is dropped rather than failing
// the whole payload.
fn deserialize_output_streams<'de, D>(deserializer: D) -> Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .filter_map(|(data_type, stream)| match stream {
            Value::String(id) => Some((data_type, id)),
            other => {
                warn!("ignoring non-string output stream for {data_type}: {other}");
                None
            }
        })
        .collect())
}

/// Flattens the output streams of every configuration into a single
/// data type to stream id mapping. Later configurations win on conflicts.
pub fn stream_mapping(configs: &[ExtensionConfiguration]) -> HashMap<String, String> {
    let mut mapping = HashMap::new();
    for config in configs {
        if config.output_streams.is_empty() {
            warn!("received extension configuration without output streams");
        }
        mapping.extend(
            config
                .output_streams
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
    }
    mapping
}

/// Returns the data collection settings of the last configuration that has
/// any.
pub fn latest_data_collection_settings(
    configs: &[ExtensionConfiguration],
) -> Option<DataCollectionSettings> {
    configs
        .iter()
        .rev()
        .filter_map(|c| c.extension_settings.data_collection_settings.as_ref())
        .find(|s| !s.is_empty())
        .cloned()
}

pub fn is_data_collection_settings_configured(configs: &[ExtensionConfiguration]) -> bool {
    latest_data_collection_settings(configs).is_some()
}

/// Maps every namespace configured for container log v2 to the output
/// streams that should receive its logs.
pub fn container_log_v2_routes(configs: &[ExtensionConfiguration]) -> HashMap<String, Vec<String>> {
    let mut routes: HashMap<String, Vec<String>> = HashMap::new();
    for config in configs {
        let Some(stream_id) = config
            .output_streams
            .iter()
            .find(|(data_type, _)| data_type.eq_ignore_ascii_case(CONTAINER_LOG_V2_DATA_TYPE))
            .map(|(_, id)| id)
        else {
            continue;
        };
        let Some(settings) = config.extension_settings.data_collection_settings.as_ref() else {
            continue;
        };
        for namespace in policy::parse_namespaces(settings) {
            let streams = routes.entry(namespace).or_default();
            if !streams.contains(stream_id) {
                streams.push(stream_id.clone());
            }
        }
    }
    routes
}
