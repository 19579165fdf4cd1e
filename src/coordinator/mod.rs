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

//! The dispatch engine: matches compaction work advertised by tablet
//! servers to compactor workers pulling from named queues, and tracks every
//! reserved job until its owner has been told of the outcome.

mod poller;
pub mod queue_index;
pub mod running;

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use itertools::Itertools;
pub use poller::start_queue_poller;
pub use queue_index::JobIndex;
pub use running::{RunningCompaction, RunningTable};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::oneshot::Sender;
use tokio::task::JoinHandle;

use crate::cluster::{start_membership_reactor, LiveTabletServerSet, MembershipEvent};
use crate::config::CoordinatorConfig;
use crate::error::{Error, Result};
use crate::model::{
    CompactionJob, CompactionState, CompactionStats, CompactionStatus, ExternalCompactionId,
    HostAddr, TabletServerId,
};
use crate::rpc::{retry_rpc, CompactorRpc, RpcClientPool, TabletServerRpc};

pub type CompactionCoordinatorRef<T, C> = Arc<CompactionCoordinator<T, C>>;

/// The single live coordinator instance. Owns the advertisement index, the
/// running table and the client pools; every RPC handler runs against one
/// shared reference.
pub struct CompactionCoordinator<T, C>
where
    T: TabletServerRpc,
    C: CompactorRpc,
{
    config: CoordinatorConfig,

    job_index: JobIndex,
    running: RunningTable,
    live_servers: LiveTabletServerSet,

    tserver_clients: RpcClientPool<T>,
    compactor_clients: RpcClientPool<C>,
}

impl<T, C> CompactionCoordinator<T, C>
where
    T: TabletServerRpc,
    C: CompactorRpc,
{
    pub fn new(config: CoordinatorConfig) -> Self {
        let tserver_clients = RpcClientPool::new(config.connection_pool_size);
        let compactor_clients = RpcClientPool::new(config.connection_pool_size);
        Self {
            config,
            job_index: JobIndex::default(),
            running: RunningTable::default(),
            live_servers: LiveTabletServerSet::default(),
            tserver_clients,
            compactor_clients,
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn job_index(&self) -> &JobIndex {
        &self.job_index
    }

    pub fn running_table(&self) -> &RunningTable {
        &self.running
    }

    pub fn live_tablet_servers(&self) -> &LiveTabletServerSet {
        &self.live_servers
    }

    /// Hand the next compaction job of `queue_name` to the compactor at
    /// `compactor_address`. `Ok(None)` is the empty-job sentinel: the queue
    /// has no work to give out right now.
    ///
    /// Every loop iteration drains one candidate from the index, so the
    /// call terminates once the queue is exhausted. A candidate that fails
    /// to produce a job is not re-added; the next polling cycle brings it
    /// back if it still has work.
    pub async fn get_compaction_job(
        &self,
        queue_name: &str,
        compactor_address: &HostAddr,
    ) -> Result<Option<CompactionJob>> {
        tracing::debug!(
            queue = queue_name,
            compactor = %compactor_address,
            "compaction job requested"
        );
        loop {
            let Some((priority, tserver)) = self.job_index.pick_highest(queue_name) else {
                tracing::debug!(
                    queue = queue_name,
                    compactor = %compactor_address,
                    "no tablet servers for queue, returning empty job"
                );
                return Ok(None);
            };
            tracing::debug!(
                tserver = %tserver,
                priority,
                queue = queue_name,
                "reserving compaction from tablet server"
            );
            let client = match self.tserver_clients.get_by_addr(tserver.addr.clone()).await {
                Ok(client) => client,
                Err(e) => {
                    tracing::warn!(
                        tserver = %tserver,
                        error = %e,
                        "failed to connect to tablet server, trying next"
                    );
                    continue;
                }
            };
            match client
                .reserve_compaction_job(queue_name, priority, compactor_address)
                .await
            {
                Ok(Some(job)) => {
                    let rc = Arc::new(RunningCompaction::new(
                        job.clone(),
                        compactor_address.clone(),
                        tserver,
                    ));
                    self.running.insert(job.id.clone(), rc)?;
                    tracing::debug!(
                        id = %job.id,
                        compactor = %compactor_address,
                        "returning external compaction job"
                    );
                    return Ok(Some(job));
                }
                Ok(None) => {
                    tracing::debug!(
                        queue = queue_name,
                        tserver = %tserver,
                        "no compactions ready on tablet server, trying next"
                    );
                }
                Err(e) => {
                    self.tserver_clients.invalidate(&tserver.addr).await;
                    tracing::warn!(
                        tserver = %tserver,
                        error = %e,
                        "error reserving compaction, trying next tablet server"
                    );
                }
            }
        }
    }

    /// Append a compactor's status report to the running compaction's log.
    pub fn update_compaction_status(
        &self,
        id: &ExternalCompactionId,
        state: CompactionState,
        message: String,
        timestamp_ms: i64,
    ) -> Result<()> {
        tracing::info!(
            %id,
            timestamp = timestamp_ms,
            %state,
            message = message.as_str(),
            "compaction status update"
        );
        match self.running.get(id) {
            Some(rc) => {
                rc.add_update(timestamp_ms, state, message);
                Ok(())
            }
            None => Err(Error::UnknownCompactionId(id.clone())),
        }
    }

    /// Snapshot of all recorded status updates. Empty when the id is
    /// unknown; this surface never fails.
    pub fn get_compaction_status(&self, id: &ExternalCompactionId) -> Vec<CompactionStatus> {
        let Some(rc) = self.running.get(id) else {
            return Vec::new();
        };
        rc.updates()
            .into_iter()
            .map(|update| CompactionStatus {
                timestamp_ms: update.timestamp_ms,
                external_compaction_id: id.clone(),
                compactor_address: rc.compactor_address().clone(),
                state: update.state,
                message: update.message,
            })
            .collect()
    }

    /// Record the final stats of a compaction and tell the issuing tablet
    /// server, retrying within the configured budget. When every retry
    /// fails the entry stays in the running table for the tablet server's
    /// own completion poll to drain.
    pub async fn compaction_completed(
        &self,
        id: &ExternalCompactionId,
        stats: CompactionStats,
    ) -> Result<()> {
        tracing::info!(%id, ?stats, "compaction completed");
        let Some(rc) = self.running.get(id) else {
            tracing::error!(%id, "completion reported for unknown compaction");
            return Err(Error::UnknownCompactionId(id.clone()));
        };
        rc.set_completed(stats.clone());

        let tserver = rc.tserver().clone();
        let (file_size, entries_written) = (stats.file_size, stats.entries_written);
        let notified = retry_rpc(self.config.completion_retry_policy(), || {
            let addr = tserver.addr.clone();
            async move {
                let client = self.tserver_clients.get_by_addr(addr.clone()).await?;
                match client
                    .compaction_job_finished(id, file_size, entries_written)
                    .await
                {
                    Ok(()) => Ok(()),
                    Err(e) => {
                        self.tserver_clients.invalidate(&addr).await;
                        Err(e)
                    }
                }
            }
        })
        .await;

        match notified {
            Ok(()) => {
                self.running.remove_if(id, &rc);
                tracing::info!(
                    tserver = %tserver,
                    %id,
                    "tablet server notified of compaction completion"
                );
            }
            Err(e) => {
                tracing::error!(
                    tserver = %tserver,
                    %id,
                    error = %e,
                    "giving up notifying tablet server of completed compaction, \
                     entry stays until the tablet server polls"
                );
            }
        }
        Ok(())
    }

    /// Completion poll from the tablet server. Returns the stats and drops
    /// the entry once the compaction is complete; `None` while it is still
    /// running.
    pub fn is_compaction_completed(
        &self,
        id: &ExternalCompactionId,
    ) -> Result<Option<CompactionStats>> {
        let Some(rc) = self.running.get(id) else {
            tracing::error!(%id, "completion check for unknown compaction");
            return Err(Error::UnknownCompactionId(id.clone()));
        };
        if rc.is_completed() {
            self.running.remove_if(id, &rc);
            Ok(Some(rc.stats().unwrap_or_default()))
        } else {
            tracing::debug!(%id, "completion check but compaction is not complete");
            Ok(None)
        }
    }

    /// Best-effort cancellation. Unknown and already-completed ids are
    /// no-ops; otherwise the compactor is told to abandon the job. The
    /// entry itself is removed later by the completion or membership paths.
    pub async fn cancel_compaction(&self, id: &ExternalCompactionId) -> Result<()> {
        tracing::info!(%id, "compaction cancel requested");
        let Some(rc) = self.running.get(id) else {
            return Ok(());
        };
        if rc.is_completed() {
            return Ok(());
        }
        let compactor = rc.compactor_address().clone();
        let cancelled = retry_rpc(self.config.cancel_retry_policy(), || {
            let addr = compactor.clone();
            async move {
                let client = self.compactor_clients.get_by_addr(addr.clone()).await?;
                match client.cancel(id).await {
                    Ok(()) => Ok(()),
                    Err(e) => {
                        self.compactor_clients.invalidate(&addr).await;
                        Err(e)
                    }
                }
            }
        })
        .await;
        if let Err(e) = cancelled {
            tracing::error!(
                compactor = %compactor,
                %id,
                error = %e,
                "unable to reach compactor to cancel running compaction"
            );
        }
        Ok(())
    }

    /// One polling cycle: ask every live tablet server for its queue
    /// summaries and fold them into the index. Per-server failures are
    /// logged and skipped; membership events are the only authority for
    /// removals.
    pub async fn poll_queue_summaries(&self) {
        let servers = self.live_servers.current();
        stream::iter(servers)
            .for_each_concurrent(self.config.poll_concurrency, |tsi| async move {
                tracing::debug!(
                    tserver = %tsi,
                    "contacting tablet server for compaction queue summaries"
                );
                if let Err(e) = self.pull_queue_summaries(&tsi).await {
                    tracing::warn!(
                        tserver = %tsi,
                        error = %e,
                        "error getting compaction queue summaries from tablet server"
                    );
                }
            })
            .await;
    }

    async fn pull_queue_summaries(&self, tsi: &TabletServerId) -> Result<()> {
        let client = self.tserver_clients.get_by_addr(tsi.addr.clone()).await?;
        let summaries = client.compaction_queue_info().await?;
        for summary in summaries {
            self.job_index
                .add(tsi.clone(), &summary.queue, summary.priority);
        }
        Ok(())
    }

    /// Fold one membership delta in: refresh the live set the poller reads,
    /// then retire every deleted tablet server. Added servers need no
    /// action; the next polling cycle picks them up.
    pub async fn apply_membership_update(&self, event: MembershipEvent) {
        let MembershipEvent {
            current,
            deleted,
            added,
        } = event;
        if !added.is_empty() {
            tracing::debug!(count = added.len(), "tablet servers added");
        }
        self.live_servers.replace(current);
        for tsi in deleted {
            self.retire_tablet_server(&tsi).await;
        }
    }

    async fn retire_tablet_server(&self, tsi: &TabletServerId) {
        tracing::info!(tserver = %tsi, "tablet server lost, purging its advertisements");
        let victims = self.running.by_tablet_server(tsi);
        let removed = self.job_index.remove_tserver(tsi);
        if !removed.is_empty() {
            tracing::debug!(
                tserver = %tsi,
                slots = %removed.iter().join(", "),
                "advertisement slots removed"
            );
        }
        for id in victims {
            if let Err(e) = self.cancel_compaction(&id).await {
                tracing::error!(
                    %id,
                    tserver = %tsi,
                    error = %e,
                    "error cancelling running compaction of removed tablet server"
                );
            }
        }
    }
}

/// Start the coordinator's long-running tasks: the queue poller and the
/// membership reactor.
pub fn start_coordinator_workers<T, C>(
    coordinator: CompactionCoordinatorRef<T, C>,
    membership_rx: UnboundedReceiver<MembershipEvent>,
) -> Vec<(JoinHandle<()>, Sender<()>)>
where
    T: TabletServerRpc,
    C: CompactorRpc,
{
    vec![
        start_queue_poller(coordinator.clone()),
        start_membership_reactor(coordinator, membership_rx),
    ]
}
