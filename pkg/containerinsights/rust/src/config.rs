// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use log::warn;

use crate::extension::client::DEFAULT_SOCKET_PATH;

pub const AAD_MSI_AUTH_MODE_ENV: &str = "AAD_MSI_AUTH_MODE";
pub const TEST_MODE_ENV: &str = "ISTEST";
pub const OS_TYPE_ENV: &str = "OS_TYPE";
pub const CONTAINER_TYPE_ENV: &str = "CONTAINER_TYPE";
pub const LOG_LEVEL_ENV: &str = "CI_PERF_LOG_LEVEL";
pub const SPOOL_DIR_ENV: &str = "CI_PERF_SPOOL_DIR";

const DEFAULT_SPOOL_DIR: &str = "/var/run/ci-perf/spool";
const PROMETHEUS_SIDECAR: &str = "prometheussidecar";

/// Toggles the agent reads from its environment at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentEnv {
    /// Output streams are resolved dynamically through the extension.
    pub aad_msi_auth_mode: bool,
    /// Extra success logging consumed by end-to-end tests.
    pub test_mode: bool,
    pub is_windows: bool,
    pub container_type: Option<String>,
    pub log_level: log::Level,
    pub spool_dir: PathBuf,
}

impl AgentEnv {
    pub fn from_env() -> Self {
        AgentEnv {
            aad_msi_auth_mode: get_env_bool(AAD_MSI_AUTH_MODE_ENV),
            test_mode: get_env_bool(TEST_MODE_ENV),
            is_windows: env::var(OS_TYPE_ENV)
                .is_ok_and(|os| os.trim().eq_ignore_ascii_case("windows")),
            container_type: env::var(CONTAINER_TYPE_ENV)
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            log_level: get_log_level(),
            spool_dir: env::var(SPOOL_DIR_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_SPOOL_DIR)),
        }
    }

    /// Socket of the local agent answering extension configuration requests.
    /// The prometheus sidecar talks to its own agent instance.
    pub fn extension_socket_path(&self) -> PathBuf {
        match self.container_type.as_deref() {
            Some(t) if t.eq_ignore_ascii_case(PROMETHEUS_SIDECAR) => {
                PathBuf::from(format!("/var/run/mdsd-{PROMETHEUS_SIDECAR}/default_fluent.socket"))
            }
            _ => PathBuf::from(DEFAULT_SOCKET_PATH),
        }
    }
}

fn get_env_bool(name: &str) -> bool {
    match env::var(name) {
        Ok(val) => val.trim().eq_ignore_ascii_case("true"),
        Err(_) => false,
    }
}

fn get_log_level() -> log::Level {
    let Ok(raw) = env::var(LOG_LEVEL_ENV) else {
        return log::Level::Info;
    };
    log::Level::from_str(raw.trim()).unwrap_or_else(|_| {
        warn!("invalid {LOG_LEVEL_ENV} value {raw:?}, using info");
        log::Level::Info
    })
}
