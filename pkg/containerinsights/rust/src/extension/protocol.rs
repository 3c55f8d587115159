// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Wire format spoken with the local control process.
//!
//! A request is a JSON object carried as a MessagePack string. The answer
//! is a MessagePack map carrying a `TaggedData` string whose content is the
//! JSON configuration document.
//! Older control processes answer with the same map encoded as JSON text,
//! which is accepted too.

use std::io;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ExtensionConfiguration, ExtensionKind, TaggedData};
use crate::errors::ExtensionError;

const AGENT_TAGGED_DATA: &str = "AgentTaggedData";

#[derive(Debug, Serialize)]
pub struct ExtensionRequest {
    #[serde(rename = "Request")]
    pub request: &'static str,
    #[serde(rename = "RequestId")]
    pub request_id: String,
    #[serde(rename = "Tag")]
    pub tag: &'static str,
    #[serde(rename = "Version")]
    pub version: &'static str,
}

impl ExtensionRequest {
    pub fn new(kind: ExtensionKind) -> Self {
        ExtensionRequest {
            request: AGENT_TAGGED_DATA,
            request_id: Uuid::new_v4().to_string(),
            tag: kind.tag(),
            version: kind.version(),
        }
    }

    /// JSON body wrapped in a MessagePack string, the framing the control
    /// process reads.
    pub fn encode(&self) -> Result<Vec<u8>, ExtensionError> {
        let body = serde_json::to_string(self).map_err(ExtensionError::RequestBody)?;
        Ok(rmp_serde::to_vec(&body)?)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ExtensionResponse {
    #[serde(default, rename = "TaggedData")]
    pub tagged_data: String,
}

impl ExtensionResponse {
    /// Decodes the inner JSON document. An empty `TaggedData` means the
    /// extension has nothing configured.
    pub fn configurations(&self) -> Result<Vec<ExtensionConfiguration>, ExtensionError> {
        if self.tagged_data.trim().is_empty() {
            return Ok(Vec::new());
        }
        let data: TaggedData = serde_json::from_str(&self.tagged_data)?;
        Ok(data.extension_configurations)
    }
}

/// Attempts to decode a response envelope from the bytes received so far.
///
/// Returns `Ok(None)` when the buffer holds a truncated but otherwise valid
/// prefix, so the caller should read more.
pub fn decode_response(buf: &[u8]) -> Result<Option<ExtensionResponse>, ExtensionError> {
    let msgpack_err = match rmp_serde::from_slice::<ExtensionResponse>(buf) {
        Ok(response) => return Ok(Some(response)),
        Err(e) if is_truncated(&e) => return Ok(None),
        Err(e) => e,
    };

    match serde_json::from_slice::<ExtensionResponse>(buf) {
        Ok(response) => Ok(Some(response)),
        Err(e) if e.is_eof() => Ok(None),
        Err(_) => Err(ExtensionError::Envelope(msgpack_err)),
    }
}

fn is_truncated(err: &rmp_serde::decode::Error) -> bool {
    use rmp_serde::decode::Error;
    match err {
        Error::InvalidMarkerRead(e) | Error::InvalidDataRead(e) => {
            e.kind() == io::ErrorKind::UnexpectedEof
        }
        _ => false,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn msgpack_response(tagged_data: &str) -> Vec<u8> {
        let mut envelope = HashMap::new();
        envelope.insert("TaggedData", tagged_data);
        rmp_serde::to_vec_named(&envelope).unwrap()
    }

    #[test]
    fn test_request_is_json_inside_msgpack_string() {
        let request = ExtensionRequest::new(ExtensionKind::ContainerInsights);
        let bytes = request.encode().unwrap();
        assert!(
            rmp_serde::from_slice::<HashMap<String, String>>(&bytes).is_err(),
            "request must not be a bare map"
        );
        let body: String = rmp_serde::from_slice(&bytes).unwrap();
        let decoded: HashMap<String, String> = serde_json::from_str(&body).unwrap();

        assert_eq!(decoded["Request"], "AgentTaggedData");
        assert_eq!(decoded["Tag"], "ContainerInsights");
        assert_eq!(decoded["Version"], "1");
        assert_eq!(decoded["RequestId"], request.request_id);
        assert!(Uuid::parse_str(&decoded["RequestId"]).is_ok());
    }

    #[test]
    fn test_request_ids_are_unique() {
        let a = ExtensionRequest::new(ExtensionKind::ContainerInsights);
        let b = ExtensionRequest::new(ExtensionKind::ContainerInsights);
        assert_ne!(a.request_id, b.request_id);
    }

    #[test]
    fn test_decode_msgpack_envelope() {
        let bytes = msgpack_response(
            r#"{"extensionConfigurations":[{"outputStreams":{"LINUX_PERF_BLOB":"dcr-1"}}]}"#,
        );
        let response = decode_response(&bytes).unwrap().unwrap();
        let configs = response.configurations().unwrap();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].output_streams["LINUX_PERF_BLOB"], "dcr-1");
    }

    #[test]
    fn test_decode_json_envelope() {
        let body = serde_json::json!({
            "TaggedData": r#"{"extensionConfigurations":[{"outputStreams":{"A":"dcr-a"}}]}"#
        });
        let bytes = serde_json::to_vec(&body).unwrap();
        let response = decode_response(&bytes).unwrap().unwrap();
        assert_eq!(response.configurations().unwrap().len(), 1);
    }

    #[test]
    fn test_truncated_envelope_needs_more() {
        let bytes = msgpack_response(r#"{"extensionConfigurations":[]}"#);
        for cut in [0, 1, bytes.len() / 2, bytes.len() - 1] {
            assert!(
                decode_response(&bytes[..cut]).unwrap().is_none(),
                "prefix of {cut} bytes should ask for more"
            );
        }

        let json = br#"{"TaggedData": "{\"extensionConfigurations\""#;
        assert!(decode_response(json).unwrap().is_none());
    }

    #[test]
    fn test_garbage_envelope_is_rejected() {
        assert!(decode_response(b"\xc1\xc1\xc1").is_err());
        assert!(decode_response(b"not an envelope").is_err());
    }

    #[test]
    fn test_malformed_tagged_data() {
        let response = ExtensionResponse {
            tagged_data: "{not json".to_string(),
        };
        assert!(matches!(
            response.configurations(),
            Err(ExtensionError::TaggedData(_))
        ));
    }

    #[test]
    fn test_empty_tagged_data() {
        let response = ExtensionResponse::default();
        assert!(response.configurations().unwrap().is_empty());
    }
}
