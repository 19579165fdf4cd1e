// Copyright 2025 RisingWave Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The `[coordinator]` section of the cluster configuration file.

use std::fs;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::rpc::RetryPolicy;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Seconds between queue-summary polling cycles over the live tablet
    /// servers.
    #[serde(default = "default::poll_interval_sec")]
    pub poll_interval_sec: u64,

    /// Upper bound on tablet servers polled concurrently within one cycle.
    #[serde(default = "default::poll_concurrency")]
    pub poll_concurrency: usize,

    /// Pooled connections kept per peer.
    #[serde(default = "default::connection_pool_size")]
    pub connection_pool_size: u16,

    /// Retries allowed when notifying a tablet server of a completed
    /// compaction.
    #[serde(default = "default::completion_retry_attempts")]
    pub completion_retry_attempts: usize,

    #[serde(default = "default::retry_initial_backoff_ms")]
    pub retry_initial_backoff_ms: u64,

    #[serde(default = "default::retry_max_backoff_ms")]
    pub retry_max_backoff_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        toml::from_str("").unwrap()
    }
}

impl CoordinatorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_sec)
    }

    pub fn completion_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_budget(
            Duration::from_millis(self.retry_initial_backoff_ms),
            Duration::from_millis(self.retry_max_backoff_ms),
            self.completion_retry_attempts,
        )
    }

    pub fn cancel_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::until_backoff_cap(
            Duration::from_millis(self.retry_initial_backoff_ms),
            Duration::from_millis(self.retry_max_backoff_ms),
        )
    }
}

/// No given `path` means to use default config.
pub fn load_config(path: &str) -> CoordinatorConfig {
    if path.is_empty() {
        tracing::warn!("coordinator config not given, using default config");
        return CoordinatorConfig::default();
    }
    let config_str = fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("failed to open config file '{}': {}", path, e));
    toml::from_str(config_str.as_str()).unwrap_or_else(|e| panic!("parse error {}", e))
}

mod default {
    pub fn poll_interval_sec() -> u64 {
        60
    }

    pub fn poll_concurrency() -> usize {
        8
    }

    pub fn connection_pool_size() -> u16 {
        2
    }

    pub fn completion_retry_attempts() -> usize {
        10
    }

    pub fn retry_initial_backoff_ms() -> u64 {
        1000
    }

    pub fn retry_max_backoff_ms() -> u64 {
        60_000
    }
}
