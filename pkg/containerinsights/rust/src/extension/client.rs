// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::io::{ErrorKind, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info, warn};

use super::protocol::{ExtensionRequest, ExtensionResponse, decode_response};
use super::{ConfigFetcher, ExtensionConfiguration, ExtensionKind};
use crate::errors::ExtensionError;

pub const DEFAULT_SOCKET_PATH: &str = "/var/run/mdsd-ci/default_fluent.socket";

/// Upper bound on the size of a configuration response.
pub const MAX_RESPONSE_BYTES: usize = 64 * 1024;

const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(10);
const READ_CHUNK_SIZE: usize = 4096;

/// Synchronous request/response client for the extension configuration
/// endpoint of the local monitoring agent.
///
/// Every call opens its own connection, so a client can be shared freely;
/// callers that rebuild shared state from the result are responsible for
/// serializing those rebuilds.
#[derive(Debug, Clone)]
pub struct ExtensionConfigClient {
    socket_path: PathBuf,
    kind: ExtensionKind,
    io_timeout: Duration,
}

impl ExtensionConfigClient {
    pub fn new(socket_path: impl Into<PathBuf>, kind: ExtensionKind) -> Self {
        ExtensionConfigClient {
            socket_path: socket_path.into(),
            kind,
            io_timeout: DEFAULT_IO_TIMEOUT,
        }
    }

    pub fn with_io_timeout(mut self, io_timeout: Duration) -> Self {
        self.io_timeout = io_timeout;
        self
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Fetches the current extension configurations. Any failure is logged
    /// and yields an empty list; there is no retry here.
    pub fn fetch_configurations(&self) -> Vec<ExtensionConfiguration> {
        match self.round_trip() {
            Ok(configs) => configs,
            Err(e) => {
                warn!(
                    "failed to get {} extension configuration: {e}",
                    self.kind.tag()
                );
                Vec::new()
            }
        }
    }

    fn round_trip(&self) -> Result<Vec<ExtensionConfiguration>, ExtensionError> {
        let request = ExtensionRequest::new(self.kind);
        let payload = request.encode()?;

        let mut stream =
            UnixStream::connect(&self.socket_path).map_err(|source| ExtensionError::Connect {
                path: self.socket_path.clone(),
                source,
            })?;
        stream.set_read_timeout(Some(self.io_timeout))?;
        stream.set_write_timeout(Some(self.io_timeout))?;

        info!(
            "requesting {} configuration from {} (request id {})",
            request.tag,
            self.socket_path.display(),
            request.request_id
        );
        stream.write_all(&payload)?;
        stream.flush()?;

        let response = read_response(&mut stream, MAX_RESPONSE_BYTES)?;
        let configs = response.configurations()?;
        debug!(
            "request {} returned {} extension configurations",
            request.request_id,
            configs.len()
        );
        Ok(configs)
    }
}

impl ConfigFetcher for ExtensionConfigClient {
    fn fetch_configurations(&self) -> Vec<ExtensionConfiguration> {
        ExtensionConfigClient::fetch_configurations(self)
    }
}

/// Reads until a complete envelope has arrived, the peer closes the
/// connection, or more than `limit` bytes were received.
fn read_response<R: Read>(reader: &mut R, limit: usize) -> Result<ExtensionResponse, ExtensionError> {
    let mut buf = Vec::with_capacity(READ_CHUNK_SIZE);
    let mut chunk = [0u8; READ_CHUNK_SIZE];
    loop {
        let n = match reader.read(&mut chunk) {
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        if n == 0 {
            return decode_response(&buf)?.ok_or(ExtensionError::IncompleteResponse {
                received: buf.len(),
            });
        }
        if buf.len() + n > limit {
            return Err(ExtensionError::ResponseTooLarge { limit });
        }
        buf.extend_from_slice(chunk.get(..n).unwrap_or_default());
        if let Some(response) = decode_response(&buf)? {
            return Ok(response);
        }
    }
}
