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

//! Value types shared by the coordinator, its peers and their mocks.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{ensure, Context};

/// General host address and port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostAddr {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for HostAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for HostAddr {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .with_context(|| format!("invalid address: {s}"))?;
        ensure!(!host.is_empty(), "invalid host in address: {s}");
        let port = port
            .parse()
            .with_context(|| format!("invalid port in address: {s}"))?;
        Ok(HostAddr {
            host: host.to_string(),
            port,
        })
    }
}

/// Identity of one tablet-server session. A restarted tablet server comes
/// back with a fresh session token and therefore a distinct identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TabletServerId {
    pub addr: HostAddr,
    pub session: String,
}

impl fmt::Display for TabletServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.addr, self.session)
    }
}

/// Coordinator-wide unique handle for one in-flight external compaction.
/// Minted by the tablet server at reservation time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExternalCompactionId(String);

impl ExternalCompactionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExternalCompactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A (queue, priority) advertisement slot. Queue names are interned by the
/// job index, so identical pairs share one allocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueAndPriority {
    queue: Arc<str>,
    priority: i64,
}

impl QueueAndPriority {
    pub fn new(queue: Arc<str>, priority: i64) -> Self {
        Self { queue, priority }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn priority(&self) -> i64 {
        self.priority
    }
}

impl fmt::Display for QueueAndPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.queue, self.priority)
    }
}

/// One entry of a tablet server's answer to `compaction_queue_info`: it has
/// compaction work pending in `queue` at `priority`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSummary {
    pub queue: String,
    pub priority: i64,
}

/// The tablet range a job compacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabletExtent {
    pub table: String,
    pub end_row: Option<String>,
    pub prev_end_row: Option<String>,
}

impl fmt::Display for TabletExtent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let row = |r: &Option<String>| r.clone().unwrap_or_else(|| "<".to_string());
        write!(
            f,
            "{};{};{}",
            self.table,
            row(&self.end_row),
            row(&self.prev_end_row)
        )
    }
}

/// Concrete job descriptor returned by a tablet server when a reservation
/// succeeds. Opaque to the dispatcher beyond its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionJob {
    pub id: ExternalCompactionId,
    pub extent: TabletExtent,
    pub queue: String,
    pub priority: i64,
    pub input_files: Vec<String>,
}

/// Job state as reported by compactors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionState {
    Started,
    InProgress,
    Succeeded,
    Failed,
    Cancelled,
}

impl fmt::Display for CompactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompactionState::Started => "STARTED",
            CompactionState::InProgress => "IN_PROGRESS",
            CompactionState::Succeeded => "SUCCEEDED",
            CompactionState::Failed => "FAILED",
            CompactionState::Cancelled => "CANCELLED",
        };
        write!(f, "{s}")
    }
}

/// One status report appended to a running compaction's update log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub timestamp_ms: i64,
    pub state: CompactionState,
    pub message: String,
}

/// Final counters reported by the compactor on completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactionStats {
    pub file_size: u64,
    pub entries_written: u64,
}

/// A status entry as served back to tablet servers, enriched with the
/// compaction id and the worker executing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionStatus {
    pub timestamp_ms: i64,
    pub external_compaction_id: ExternalCompactionId,
    pub compactor_address: HostAddr,
    pub state: CompactionState,
    pub message: String,
}
