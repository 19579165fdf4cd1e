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

use async_trait::async_trait;

use crate::model::{CompactionJob, ExternalCompactionId, HostAddr, QueueSummary};
use crate::rpc::client::RpcClient;
use crate::rpc::error::Result;

/// Outbound surface of a tablet server, as seen by the coordinator.
#[async_trait]
pub trait TabletServerRpc: RpcClient {
    /// Summaries of the compaction work this tablet server has pending,
    /// one entry per (queue, priority) it wants served.
    async fn compaction_queue_info(&self) -> Result<Vec<QueueSummary>>;

    /// Ask the tablet server to hand out a concrete job for `queue` at
    /// `priority`, to be executed by the compactor at `compactor_address`.
    /// Returns `None` when the server advertised but has nothing ready.
    async fn reserve_compaction_job(
        &self,
        queue: &str,
        priority: i64,
        compactor_address: &HostAddr,
    ) -> Result<Option<CompactionJob>>;

    /// Notify the tablet server that the compaction finished with the given
    /// final counters.
    async fn compaction_job_finished(
        &self,
        id: &ExternalCompactionId,
        file_size: u64,
        entries_written: u64,
    ) -> Result<()>;
}
