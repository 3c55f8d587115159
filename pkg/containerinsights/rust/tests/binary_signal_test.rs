// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::cast_possible_wrap)]

use std::fs;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tempfile::TempDir;

const COLLECTOR_BIN: &str = env!("CARGO_BIN_EXE_ci-perf-collector");

fn spawn_collector(spool: &TempDir) -> Child {
    Command::new(COLLECTOR_BIN)
        .env("CI_PERF_SPOOL_DIR", spool.path())
        .env("CI_PERF_LOG_LEVEL", "debug")
        .env("CONTAINER_TYPE", "")
        .env_remove("AAD_MSI_AUTH_MODE")
        .stdout(Stdio::null())
        .spawn()
        .expect("Failed to spawn collector")
}

fn stop_with(mut child: Child, sig: Signal) {
    // Give it time to install its signal handlers
    thread::sleep(Duration::from_millis(500));
    assert!(
        child.try_wait().unwrap().is_none(),
        "collector should keep running until signaled"
    );

    signal::kill(Pid::from_raw(child.id() as i32), sig).expect("Failed to send signal");

    let status = child.wait().expect("Failed to wait on child");
    assert!(status.success(), "collector should exit cleanly on {sig:?}");
}

#[test]
fn test_single_node_collector_stops_on_sigterm() {
    let spool = TempDir::new().unwrap();
    stop_with(spawn_collector(&spool), Signal::SIGTERM);
}

#[test]
fn test_multi_node_collector_stops_on_sigint() {
    let spool = TempDir::new().unwrap();
    fs::write(spool.path().join("nodes"), "win-1\nwin-2\n").unwrap();
    stop_with(spawn_collector(&spool), Signal::SIGINT);
}
