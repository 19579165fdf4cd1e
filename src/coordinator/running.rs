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

use std::collections::HashMap;
use std::sync::Arc;

use itertools::Itertools;
use parking_lot::{Mutex, RwLock};

use crate::error::{Error, Result};
use crate::model::{
    CompactionJob, CompactionState, CompactionStats, ExternalCompactionId, HostAddr, StatusUpdate,
    TabletServerId,
};

/// One reserved, in-flight external compaction. Identity is fixed at
/// reservation time; the progress log behind the entry lock is the only
/// mutable part.
pub struct RunningCompaction {
    job: CompactionJob,
    compactor_address: HostAddr,
    tserver: TabletServerId,
    progress: Mutex<Progress>,
}

#[derive(Default)]
struct Progress {
    /// Status reports in arrival order. The timestamp field is
    /// informational; ordering is by receipt.
    updates: Vec<StatusUpdate>,
    stats: Option<CompactionStats>,
    completed: bool,
}

impl RunningCompaction {
    pub fn new(job: CompactionJob, compactor_address: HostAddr, tserver: TabletServerId) -> Self {
        Self {
            job,
            compactor_address,
            tserver,
            progress: Mutex::new(Progress::default()),
        }
    }

    pub fn job(&self) -> &CompactionJob {
        &self.job
    }

    pub fn compactor_address(&self) -> &HostAddr {
        &self.compactor_address
    }

    pub fn tserver(&self) -> &TabletServerId {
        &self.tserver
    }

    pub fn add_update(&self, timestamp_ms: i64, state: CompactionState, message: String) {
        self.progress.lock().updates.push(StatusUpdate {
            timestamp_ms,
            state,
            message,
        });
    }

    pub fn set_completed(&self, stats: CompactionStats) {
        let mut progress = self.progress.lock();
        progress.stats = Some(stats);
        progress.completed = true;
    }

    pub fn is_completed(&self) -> bool {
        self.progress.lock().completed
    }

    pub fn stats(&self) -> Option<CompactionStats> {
        self.progress.lock().stats.clone()
    }

    pub fn updates(&self) -> Vec<StatusUpdate> {
        self.progress.lock().updates.clone()
    }
}

/// The set of in-flight reserved jobs, keyed by external compaction id.
#[derive(Default)]
pub struct RunningTable {
    compactions: RwLock<HashMap<ExternalCompactionId, Arc<RunningCompaction>>>,
}

impl RunningTable {
    /// Fails when the id is already tracked: ids are minted per reservation
    /// and must never be assigned twice.
    pub fn insert(&self, id: ExternalCompactionId, rc: Arc<RunningCompaction>) -> Result<()> {
        use std::collections::hash_map::Entry;
        match self.compactions.write().entry(id) {
            Entry::Occupied(occupied) => Err(Error::DuplicateCompactionId(occupied.key().clone())),
            Entry::Vacant(vacant) => {
                vacant.insert(rc);
                Ok(())
            }
        }
    }

    pub fn get(&self, id: &ExternalCompactionId) -> Option<Arc<RunningCompaction>> {
        self.compactions.read().get(id).cloned()
    }

    pub fn remove(&self, id: &ExternalCompactionId) -> Option<Arc<RunningCompaction>> {
        self.compactions.write().remove(id)
    }

    /// Compare-and-remove: drops the entry only while it still maps to the
    /// given reservation, so a concurrent re-reservation is not clobbered.
    pub fn remove_if(&self, id: &ExternalCompactionId, rc: &Arc<RunningCompaction>) -> bool {
        let mut compactions = self.compactions.write();
        match compactions.get(id) {
            Some(current) if Arc::ptr_eq(current, rc) => {
                compactions.remove(id);
                true
            }
            _ => false,
        }
    }

    /// Ids of every running compaction issued by `tsi`. Linear scan; only
    /// membership removals walk the table this way.
    pub fn by_tablet_server(&self, tsi: &TabletServerId) -> Vec<ExternalCompactionId> {
        self.compactions
            .read()
            .iter()
            .filter(|(_, rc)| rc.tserver() == tsi)
            .map(|(id, _)| id.clone())
            .sorted_by(|a, b| a.as_str().cmp(b.as_str()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.compactions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.compactions.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{RunningCompaction, RunningTable};
    use crate::error::Error;
    use crate::model::{CompactionState, CompactionStats};
    use crate::test_utils::{compactor_addr, test_job, tserver_id};

    fn running(port: u16) -> (RunningTable, Arc<RunningCompaction>) {
        let table = RunningTable::default();
        let job = test_job("default", 10);
        let rc = Arc::new(RunningCompaction::new(
            job.clone(),
            compactor_addr(7000),
            tserver_id(port),
        ));
        table.insert(job.id.clone(), rc.clone()).unwrap();
        (table, rc)
    }

    #[test]
    fn test_insert_rejects_duplicate_id() {
        let (table, rc) = running(9001);
        let id = rc.job().id.clone();
        let err = table.insert(id.clone(), rc.clone()).unwrap_err();
        assert!(matches!(err, Error::DuplicateCompactionId(dup) if dup == id));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_remove_if_compares_the_reservation() {
        let (table, rc) = running(9001);
        let id = rc.job().id.clone();
        let other = Arc::new(RunningCompaction::new(
            rc.job().clone(),
            compactor_addr(7001),
            tserver_id(9002),
        ));
        assert!(!table.remove_if(&id, &other));
        assert_eq!(table.len(), 1);
        assert!(table.remove_if(&id, &rc));
        assert!(table.is_empty());
        assert!(!table.remove_if(&id, &rc));
        assert!(table.remove(&id).is_none());
    }

    #[test]
    fn test_by_tablet_server() {
        let table = RunningTable::default();
        let t1 = tserver_id(9001);
        let t2 = tserver_id(9002);
        let mut expected = Vec::new();
        for i in 0..3 {
            let job = test_job("default", i);
            expected.push(job.id.clone());
            table
                .insert(
                    job.id.clone(),
                    Arc::new(RunningCompaction::new(
                        job,
                        compactor_addr(7000),
                        t1.clone(),
                    )),
                )
                .unwrap();
        }
        let other = test_job("default", 0);
        table
            .insert(
                other.id.clone(),
                Arc::new(RunningCompaction::new(
                    other,
                    compactor_addr(7001),
                    t2.clone(),
                )),
            )
            .unwrap();

        expected.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        assert_eq!(table.by_tablet_server(&t1), expected);
        assert_eq!(table.by_tablet_server(&t2).len(), 1);
        assert!(table
            .by_tablet_server(&tserver_id(9003))
            .is_empty());
    }

    #[test]
    fn test_progress_log_keeps_arrival_order() {
        let (_table, rc) = running(9001);
        rc.add_update(200, CompactionState::Started, "starting".to_string());
        rc.add_update(100, CompactionState::InProgress, "40%".to_string());
        let updates = rc.updates();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].timestamp_ms, 200);
        assert_eq!(updates[1].timestamp_ms, 100);

        assert!(!rc.is_completed());
        assert_eq!(rc.stats(), None);
        rc.set_completed(CompactionStats {
            file_size: 100,
            entries_written: 7,
        });
        assert!(rc.is_completed());
        assert_eq!(rc.stats().unwrap().entries_written, 7);
    }
}
