// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures of a single extension configuration round trip.
#[derive(Error, Debug)]
pub enum ExtensionError {
    #[error("could not connect to extension endpoint {}: {source}", path.display())]
    Connect { path: PathBuf, source: io::Error },

    #[error("extension socket i/o failed: {0}")]
    Io(#[from] io::Error),

    #[error("could not serialize extension request: {0}")]
    RequestBody(serde_json::Error),

    #[error("could not encode extension request: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("malformed extension response envelope: {0}")]
    Envelope(#[from] rmp_serde::decode::Error),

    #[error("extension response exceeds {limit} bytes")]
    ResponseTooLarge { limit: usize },

    #[error("extension endpoint closed the connection after {received} bytes")]
    IncompleteResponse { received: usize },

    #[error("could not decode tagged data: {0}")]
    TaggedData(#[from] serde_json::Error),
}
