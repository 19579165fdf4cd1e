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

use tokio::sync::oneshot::Sender;
use tokio::task::JoinHandle;

use crate::coordinator::CompactionCoordinatorRef;
use crate::rpc::{CompactorRpc, TabletServerRpc};

/// Starts the task that periodically refreshes the job index from the live
/// tablet servers. The interval counts from tick to tick, so a slow cycle
/// delays the next one instead of drifting.
pub fn start_queue_poller<T, C>(
    coordinator: CompactionCoordinatorRef<T, C>,
) -> (JoinHandle<()>, Sender<()>)
where
    T: TabletServerRpc,
    C: CompactorRpc,
{
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel();
    let join_handle = tokio::spawn(async move {
        let mut poll_interval = tokio::time::interval(coordinator.config().poll_interval());
        poll_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = poll_interval.tick() => {}
                _ = &mut shutdown_rx => {
                    tracing::info!("Queue poller is stopped");
                    return;
                }
            }
            coordinator.poll_queue_summaries().await;
        }
    });
    (join_handle, shutdown_tx)
}
