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

//! Consumption of the external membership watch. Deltas arrive on a channel
//! and are applied by a dedicated reactor task, so every mutation of the
//! coordinator's state happens off the watcher's callback thread.

use std::collections::HashSet;

use parking_lot::RwLock;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::oneshot::Sender;
use tokio::task::JoinHandle;

use crate::coordinator::CompactionCoordinatorRef;
use crate::model::TabletServerId;
use crate::rpc::{CompactorRpc, TabletServerRpc};

/// One delta of the live tablet-server set.
#[derive(Debug, Clone, Default)]
pub struct MembershipEvent {
    pub current: HashSet<TabletServerId>,
    pub deleted: Vec<TabletServerId>,
    pub added: Vec<TabletServerId>,
}

/// Snapshot of the live tablet-server set, replaced by the membership
/// reactor and read by the queue poller.
#[derive(Default)]
pub struct LiveTabletServerSet {
    servers: RwLock<HashSet<TabletServerId>>,
}

impl LiveTabletServerSet {
    pub fn replace(&self, current: HashSet<TabletServerId>) {
        *self.servers.write() = current;
    }

    pub fn current(&self) -> Vec<TabletServerId> {
        self.servers.read().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.servers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.read().is_empty()
    }
}

/// Starts the task reacting to membership deltas.
pub fn start_membership_reactor<T, C>(
    coordinator: CompactionCoordinatorRef<T, C>,
    mut membership_rx: UnboundedReceiver<MembershipEvent>,
) -> (JoinHandle<()>, Sender<()>)
where
    T: TabletServerRpc,
    C: CompactorRpc,
{
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel();
    let join_handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                event = membership_rx.recv() => {
                    match event {
                        Some(event) => coordinator.apply_membership_update(event).await,
                        None => {
                            return;
                        }
                    }
                }
                _ = &mut shutdown_rx => {
                    tracing::info!("Membership reactor is stopped");
                    return;
                }
            }
        }
    });
    (join_handle, shutdown_tx)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::LiveTabletServerSet;
    use crate::test_utils::tserver_id;

    #[test]
    fn test_replace_swaps_the_whole_set() {
        let live = LiveTabletServerSet::default();
        assert!(live.is_empty());

        live.replace(HashSet::from([tserver_id(9001), tserver_id(9002)]));
        assert_eq!(live.len(), 2);

        live.replace(HashSet::from([tserver_id(9002)]));
        let current = live.current();
        assert_eq!(current, vec![tserver_id(9002)]);
    }
}
