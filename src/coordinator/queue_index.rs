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

//! Priority-ordered index of pending compaction advertisements.
//!
//! The forward map ranks tablet servers per queue by priority, preserving
//! arrival order within a priority so the oldest advertiser is drained
//! first. The reverse map exists to excise one tablet server from every
//! bucket it appears in when membership reports it gone. Both maps and the
//! queue-name intern table live under a single mutex; every operation keeps
//! them mutually consistent:
//!
//! - a tablet server is in a forward bucket iff the slot is in its reverse
//!   entry;
//! - no bucket and no reverse entry is ever left empty.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use indexmap::IndexSet;
use itertools::Itertools;
use parking_lot::Mutex;

use crate::model::{QueueAndPriority, TabletServerId};

#[derive(Default)]
pub struct JobIndex {
    core: Mutex<JobIndexCore>,
}

#[derive(Default)]
struct JobIndexCore {
    /// queue -> priority -> tablet servers, in advertisement arrival order.
    queues: HashMap<Arc<str>, BTreeMap<i64, IndexSet<TabletServerId>>>,
    /// tablet server -> every (queue, priority) slot it occupies.
    index: HashMap<TabletServerId, HashSet<QueueAndPriority>>,
    /// Canonicalized queue names.
    queue_names: HashSet<Arc<str>>,
}

impl JobIndexCore {
    fn intern(&mut self, name: &str) -> Arc<str> {
        match self.queue_names.get(name) {
            Some(interned) => interned.clone(),
            None => {
                let interned: Arc<str> = Arc::from(name);
                self.queue_names.insert(interned.clone());
                interned
            }
        }
    }
}

impl JobIndex {
    /// Record that `tsi` has work pending in `queue` at `priority`.
    /// Idempotent; a re-advertisement keeps the original arrival position.
    pub fn add(&self, tsi: TabletServerId, queue: &str, priority: i64) {
        let mut core = self.core.lock();
        let queue = core.intern(queue);
        let JobIndexCore { queues, index, .. } = &mut *core;
        queues
            .entry(queue.clone())
            .or_default()
            .entry(priority)
            .or_default()
            .insert(tsi.clone());
        index
            .entry(tsi)
            .or_default()
            .insert(QueueAndPriority::new(queue, priority));
    }

    /// Drain the first tablet server of the highest-priority bucket of
    /// `queue`. Emptied buckets are pruned in the same step.
    pub fn pick_highest(&self, queue: &str) -> Option<(i64, TabletServerId)> {
        let mut core = self.core.lock();
        let queue = core.queue_names.get(queue)?.clone();
        let JobIndexCore { queues, index, .. } = &mut *core;
        let buckets = queues.get_mut(&queue)?;
        let (&priority, tservers) = buckets.iter_mut().next_back()?;
        let tsi = tservers
            .shift_remove_index(0)
            .expect("bucket is never left empty");
        if tservers.is_empty() {
            buckets.remove(&priority);
        }
        if buckets.is_empty() {
            queues.remove(&queue);
        }
        if let Entry::Occupied(mut occupied) = index.entry(tsi.clone()) {
            occupied
                .get_mut()
                .remove(&QueueAndPriority::new(queue, priority));
            if occupied.get().is_empty() {
                occupied.remove();
            }
        }
        Some((priority, tsi))
    }

    /// Remove `tsi` from every bucket it appears in and return the slots it
    /// occupied, highest priority first per queue.
    pub fn remove_tserver(&self, tsi: &TabletServerId) -> Vec<QueueAndPriority> {
        let mut core = self.core.lock();
        let JobIndexCore { queues, index, .. } = &mut *core;
        let Some(slots) = index.remove(tsi) else {
            return Vec::new();
        };
        for qp in &slots {
            let Some(buckets) = queues.get_mut(qp.queue()) else {
                continue;
            };
            if let Some(tservers) = buckets.get_mut(&qp.priority()) {
                tservers.shift_remove(tsi);
                if tservers.is_empty() {
                    buckets.remove(&qp.priority());
                }
            }
            if buckets.is_empty() {
                queues.remove(qp.queue());
            }
        }
        slots
            .into_iter()
            .sorted_by(|a, b| {
                a.queue()
                    .cmp(b.queue())
                    .then(b.priority().cmp(&a.priority()))
            })
            .collect()
    }

    /// Read-only copy for diagnostics.
    pub fn snapshot(&self) -> BTreeMap<String, BTreeMap<i64, Vec<TabletServerId>>> {
        let core = self.core.lock();
        core.queues
            .iter()
            .map(|(queue, buckets)| {
                (
                    queue.to_string(),
                    buckets
                        .iter()
                        .map(|(priority, tservers)| {
                            (*priority, tservers.iter().cloned().collect_vec())
                        })
                        .collect::<BTreeMap<_, _>>(),
                )
            })
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn check_invariants(&self) {
        let core = self.core.lock();
        for (queue, buckets) in &core.queues {
            assert!(!buckets.is_empty(), "queue {queue} has no buckets");
            for (priority, tservers) in buckets {
                assert!(!tservers.is_empty(), "empty bucket {queue}:{priority}");
                for tsi in tservers {
                    let slots = core
                        .index
                        .get(tsi)
                        .unwrap_or_else(|| panic!("no reverse entry for {tsi}"));
                    assert!(
                        slots.contains(&QueueAndPriority::new(queue.clone(), *priority)),
                        "reverse entry of {tsi} misses {queue}:{priority}"
                    );
                }
            }
        }
        for (tsi, slots) in &core.index {
            assert!(!slots.is_empty(), "tablet server {tsi} occupies no slots");
            for qp in slots {
                let present = core
                    .queues
                    .get(qp.queue())
                    .and_then(|buckets| buckets.get(&qp.priority()))
                    .map(|tservers| tservers.contains(tsi))
                    .unwrap_or(false);
                assert!(present, "forward bucket {qp} misses {tsi}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::JobIndex;
    use crate::test_utils::tserver_id;

    #[test]
    fn test_highest_priority_wins() {
        let index = JobIndex::default();
        let t1 = tserver_id(9001);
        let t2 = tserver_id(9002);
        index.add(t1.clone(), "default", 10);
        index.add(t2.clone(), "default", 20);

        assert_eq!(index.pick_highest("default"), Some((20, t2)));
        assert_eq!(index.pick_highest("default"), Some((10, t1)));
        assert_eq!(index.pick_highest("default"), None);
        index.check_invariants();
        assert!(index.snapshot().is_empty());
    }

    #[test]
    fn test_fifo_within_priority() {
        let index = JobIndex::default();
        let t1 = tserver_id(9001);
        let t2 = tserver_id(9002);
        index.add(t1.clone(), "default", 10);
        index.add(t2.clone(), "default", 10);
        // Re-advertising must not move t1 behind t2.
        index.add(t1.clone(), "default", 10);

        assert_eq!(index.pick_highest("default"), Some((10, t1)));
        assert_eq!(index.pick_highest("default"), Some((10, t2)));
        assert_eq!(index.pick_highest("default"), None);
    }

    #[test]
    fn test_unknown_queue_yields_nothing() {
        let index = JobIndex::default();
        assert_eq!(index.pick_highest("nope"), None);
        index.add(tserver_id(9001), "default", 1);
        assert_eq!(index.pick_highest("nope"), None);
    }

    #[test]
    fn test_remove_tserver_excises_every_slot() {
        let index = JobIndex::default();
        let t1 = tserver_id(9001);
        let t2 = tserver_id(9002);
        index.add(t1.clone(), "default", 10);
        index.add(t1.clone(), "default", 20);
        index.add(t1.clone(), "root", 5);
        index.add(t2.clone(), "default", 10);

        let removed = index.remove_tserver(&t1);
        let slots: Vec<_> = removed
            .iter()
            .map(|qp| (qp.queue().to_string(), qp.priority()))
            .collect();
        assert_eq!(
            slots,
            vec![
                ("default".to_string(), 20),
                ("default".to_string(), 10),
                ("root".to_string(), 5)
            ]
        );
        index.check_invariants();

        // t2's slot survives, t1's are gone along with the emptied "root".
        let snapshot = index.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot["default"][&10], vec![t2]);

        // Removing an unknown tablet server is a no-op.
        assert!(index.remove_tserver(&t1).is_empty());
    }

    #[test]
    fn test_queues_are_independent() {
        let index = JobIndex::default();
        let t1 = tserver_id(9001);
        index.add(t1.clone(), "default", 10);
        index.add(t1.clone(), "root", 30);

        assert_eq!(index.pick_highest("default"), Some((10, t1.clone())));
        assert_eq!(index.pick_highest("default"), None);
        assert_eq!(index.pick_highest("root"), Some((30, t1)));
    }

    #[test]
    fn test_random_ops_preserve_invariants() {
        let index = JobIndex::default();
        let mut rng = StdRng::seed_from_u64(0xc0ffee);
        let queues = ["default", "root", "user"];
        let servers: Vec<_> = (0..8).map(|i| tserver_id(9100 + i)).collect();
        for _ in 0..2000 {
            match rng.gen_range(0..4) {
                0 | 1 => {
                    let tsi = servers[rng.gen_range(0..servers.len())].clone();
                    let queue = queues[rng.gen_range(0..queues.len())];
                    let priority = rng.gen_range(1..5);
                    index.add(tsi, queue, priority);
                }
                2 => {
                    let queue = queues[rng.gen_range(0..queues.len())];
                    let _ = index.pick_highest(queue);
                }
                _ => {
                    let tsi = &servers[rng.gen_range(0..servers.len())];
                    index.remove_tserver(tsi);
                }
            }
            index.check_invariants();
        }
    }
}
