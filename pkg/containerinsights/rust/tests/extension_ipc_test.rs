// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::indexing_slicing)]

use std::collections::HashMap;
use std::io::{Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use ci_perf::extension::client::MAX_RESPONSE_BYTES;
use ci_perf::{ExtensionConfigClient, ExtensionKind, StreamRoutingCache};
use tempfile::TempDir;

const CONFIGS: &str = r#"{"extensionConfigurations": [{
    "outputStreams": {
        "LINUX_PERF_BLOB": "dcr-0123456789abcdef",
        "INSIGHTS_METRICS_BLOB": "dcr-fedcba9876543210"
    },
    "extensionSettings": {"dataCollectionSettings": {"interval": "5m"}}
}]}"#;

enum Reply {
    MsgPack(String),
    Json(String),
    Raw(Vec<u8>),
    Hangup,
}

type Requests = Arc<Mutex<Vec<HashMap<String, String>>>>;

/// Answers `connections` requests on a unix socket the way the local agent
/// does, recording each decoded request.
fn serve(path: &Path, reply: Reply, connections: usize) -> (Requests, JoinHandle<()>) {
    let listener = UnixListener::bind(path).unwrap();
    let requests: Requests = Arc::default();
    let recorded = requests.clone();
    let handle = thread::spawn(move || {
        for stream in listener.incoming().take(connections) {
            let mut stream = stream.unwrap();
            recorded.lock().unwrap().push(read_request(&mut stream));
            let payload = match &reply {
                Reply::MsgPack(tagged) => {
                    rmp_serde::to_vec_named(&HashMap::from([("TaggedData", tagged)])).unwrap()
                }
                Reply::Json(tagged) => serde_json::to_vec(&serde_json::json!({
                    "TaggedData": tagged
                }))
                .unwrap(),
                Reply::Raw(bytes) => bytes.clone(),
                Reply::Hangup => continue,
            };
            // the client may give up early on oversized replies
            let _ = stream.write_all(&payload);
        }
    });
    (requests, handle)
}

fn read_request(stream: &mut UnixStream) -> HashMap<String, String> {
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    let mut buf = Vec::new();
    let mut chunk = [0u8; 512];
    loop {
        let n = stream.read(&mut chunk).expect("request never completed");
        assert!(n > 0, "client closed before sending a request");
        buf.extend_from_slice(&chunk[..n]);
        // the control process reads a MessagePack string holding JSON
        if let Ok(body) = rmp_serde::from_slice::<String>(&buf) {
            return serde_json::from_str(&body).expect("request body is not JSON");
        }
    }
}

fn client(dir: &TempDir) -> ExtensionConfigClient {
    ExtensionConfigClient::new(
        dir.path().join("default_fluent.socket"),
        ExtensionKind::ContainerInsights,
    )
    .with_io_timeout(Duration::from_secs(2))
}

#[test]
fn test_msgpack_reply() {
    let dir = TempDir::new().unwrap();
    let client = client(&dir);
    let (requests, server) = serve(client.socket_path(), Reply::MsgPack(CONFIGS.to_string()), 1);

    let configs = client.fetch_configurations();
    server.join().unwrap();

    assert_eq!(configs.len(), 1);
    assert_eq!(
        configs[0].output_streams["LINUX_PERF_BLOB"],
        "dcr-0123456789abcdef"
    );

    let requests = requests.lock().unwrap();
    let request = &requests[0];
    assert_eq!(request["Request"], "AgentTaggedData");
    assert_eq!(request["Tag"], "ContainerInsights");
    assert_eq!(request["Version"], "1");
    assert!(uuid::Uuid::parse_str(&request["RequestId"]).is_ok());
}

#[test]
fn test_request_ids_are_unique() {
    let dir = TempDir::new().unwrap();
    let client = client(&dir);
    let (requests, server) = serve(client.socket_path(), Reply::MsgPack(CONFIGS.to_string()), 2);

    client.fetch_configurations();
    client.fetch_configurations();
    server.join().unwrap();

    let requests = requests.lock().unwrap();
    assert_ne!(requests[0]["RequestId"], requests[1]["RequestId"]);
}

#[test]
fn test_json_reply() {
    let dir = TempDir::new().unwrap();
    let client = client(&dir);
    let (_, server) = serve(client.socket_path(), Reply::Json(CONFIGS.to_string()), 1);

    let configs = client.fetch_configurations();
    server.join().unwrap();

    assert_eq!(configs.len(), 1);
    assert_eq!(configs[0].output_streams.len(), 2);
}

#[test]
fn test_failures_yield_no_configurations() {
    let dir = TempDir::new().unwrap();
    let client = client(&dir);

    // nobody listening
    assert!(client.fetch_configurations().is_empty());

    let (_, server) = serve(client.socket_path(), Reply::Hangup, 1);
    assert!(client.fetch_configurations().is_empty());
    server.join().unwrap();
}

#[test]
fn test_garbage_and_oversized_replies() {
    let dir = TempDir::new().unwrap();
    let client = client(&dir);
    let garbage = b"\xc1\xc1\xc1 definitely not an envelope".to_vec();
    let (_, server) = serve(client.socket_path(), Reply::Raw(garbage), 1);
    assert!(client.fetch_configurations().is_empty());
    server.join().unwrap();

    let dir = TempDir::new().unwrap();
    let client = self::client(&dir);
    let oversized = "x".repeat(MAX_RESPONSE_BYTES + 1);
    let (_, server) = serve(client.socket_path(), Reply::MsgPack(oversized), 1);
    assert!(client.fetch_configurations().is_empty());
    server.join().unwrap();
}

#[test]
fn test_routing_cache_over_socket() {
    let dir = TempDir::new().unwrap();
    let client = client(&dir);
    let (requests, server) = serve(client.socket_path(), Reply::MsgPack(CONFIGS.to_string()), 1);
    let routing = StreamRoutingCache::new(Arc::new(client));

    assert_eq!(
        routing.resolve("LINUX_PERF_BLOB", false),
        "dcr-0123456789abcdef"
    );
    // served from the rebuilt mapping, no second round trip
    assert_eq!(
        routing.resolve("INSIGHTS_METRICS_BLOB", true),
        "dcr-fedcba9876543210"
    );
    server.join().unwrap();

    assert_eq!(requests.lock().unwrap().len(), 1);
    let settings = routing.data_collection_settings().unwrap();
    assert_eq!(settings.get("Interval").unwrap(), "5m");
}
