// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{info, warn};

use crate::extension::{self, ConfigFetcher, DataCollectionSettings};

/// Output stream ids handed out by the control plane carry this prefix;
/// anything else is a default fluent tag that has not been resolved yet.
pub const DCR_STREAM_ID_PREFIX: &str = "dcr-";

/// Maximum age of a cached stream id before it is resolved again.
pub const AGENT_CONFIG_REFRESH_INTERVAL: Duration = Duration::from_secs(300);

pub fn is_dcr_stream_id_tag(tag: &str) -> bool {
    tag.starts_with(DCR_STREAM_ID_PREFIX)
}

#[derive(Debug, Default)]
struct RoutingState {
    mapping: HashMap<String, String>,
    settings: Option<DataCollectionSettings>,
    rebuilds: u64,
}

/// Process-wide map from data type to output stream id, rebuilt wholesale
/// from the extension configuration.
///
/// The lookup, the fetch and the swap all happen under one lock, so two
/// collectors never rebuild concurrently and nobody observes a mapping that
/// is half old and half new.
pub struct StreamRoutingCache {
    fetcher: Arc<dyn ConfigFetcher>,
    state: Mutex<RoutingState>,
}

impl StreamRoutingCache {
    pub fn new(fetcher: Arc<dyn ConfigFetcher>) -> Self {
        StreamRoutingCache {
            fetcher,
            state: Mutex::new(RoutingState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RoutingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the stream id for `data_type`, or an empty string when the
    /// data type is not routed (the stream is opted out).
    pub fn resolve(&self, data_type: &str, use_cache: bool) -> String {
        let mut state = self.lock();
        if use_cache {
            if let Some(stream_id) = state.mapping.get(data_type) {
                return stream_id.clone();
            }
        }

        let configs = self.fetcher.fetch_configurations();
        if configs.is_empty() {
            warn!("no extension configurations received, keeping previous stream mapping");
        } else {
            let mapping = extension::stream_mapping(&configs);
            let settings = extension::latest_data_collection_settings(&configs);
            info!(
                "rebuilt stream mapping with {} data types from {} configurations",
                mapping.len(),
                configs.len()
            );
            *state = RoutingState {
                mapping,
                settings,
                rebuilds: state.rebuilds + 1,
            };
        }

        let stream_id = state.mapping.get(data_type).cloned().unwrap_or_default();
        info!("resolved stream id '{stream_id}' for data type {data_type}");
        stream_id
    }

    /// Resolves the stream id for `data_type` given the tag currently in use.
    ///
    /// The cache is trusted while the last refresh is younger than
    /// [`AGENT_CONFIG_REFRESH_INTERVAL`] and `current_tag` is either a
    /// resolved stream id or empty after a rebuild (an opted-out stream).
    /// A default fluent tag always triggers a rebuild. The returned flag
    /// tells whether the answer came from the cache; `false` means a rebuild
    /// happened.
    pub fn output_stream_id_and_source(
        &self,
        data_type: &str,
        current_tag: &str,
        since_last_refresh: Duration,
    ) -> (String, bool) {
        let fresh = since_last_refresh < AGENT_CONFIG_REFRESH_INTERVAL;
        if fresh && current_tag.is_empty() {
            let state = self.lock();
            if state.rebuilds > 0 {
                return (state.mapping.get(data_type).cloned().unwrap_or_default(), true);
            }
        }
        let from_cache = fresh && is_dcr_stream_id_tag(current_tag);
        (self.resolve(data_type, from_cache), from_cache)
    }

    /// Data collection settings captured by the most recent rebuild.
    pub fn data_collection_settings(&self) -> Option<DataCollectionSettings> {
        self.lock().settings.clone()
    }

    pub fn snapshot(&self) -> HashMap<String, String> {
        self.lock().mapping.clone()
    }

    pub fn rebuild_count(&self) -> u64 {
        self.lock().rebuilds
    }
}
