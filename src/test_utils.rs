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

//! In-memory tablet servers and compactors for tests. Mock peers register
//! their shared state in a process-wide table keyed by address, which is
//! what the pooled client constructors look up; every test allocates fresh
//! ports so parallel tests do not collide.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::config::CoordinatorConfig;
use crate::coordinator::{CompactionCoordinator, CompactionCoordinatorRef};
use crate::model::{
    CompactionJob, ExternalCompactionId, HostAddr, QueueSummary, TabletExtent, TabletServerId,
};
use crate::rpc::error::{Result, RpcError};
use crate::rpc::{CompactorRpc, RpcClient, TabletServerRpc};

static NEXT_PORT: AtomicU16 = AtomicU16::new(20000);

static TABLET_SERVERS: LazyLock<Mutex<HashMap<HostAddr, Arc<MockTabletServerState>>>> =
    LazyLock::new(Default::default);
static COMPACTORS: LazyLock<Mutex<HashMap<HostAddr, Arc<MockCompactorState>>>> =
    LazyLock::new(Default::default);

pub type TestCoordinatorRef =
    CompactionCoordinatorRef<MockTabletServerClient, MockCompactorClient>;

pub fn tserver_id(port: u16) -> TabletServerId {
    TabletServerId {
        addr: HostAddr {
            host: "127.0.0.1".to_string(),
            port,
        },
        session: format!("session-{port}"),
    }
}

pub fn compactor_addr(port: u16) -> HostAddr {
    HostAddr {
        host: "127.0.0.1".to_string(),
        port,
    }
}

pub fn test_job(queue: &str, priority: i64) -> CompactionJob {
    CompactionJob {
        id: ExternalCompactionId::new(format!("ECID:{}", Uuid::new_v4())),
        extent: TabletExtent {
            table: "2a".to_string(),
            end_row: Some("m".to_string()),
            prev_end_row: None,
        },
        queue: queue.to_string(),
        priority,
        input_files: vec!["f1.rf".to_string(), "f2.rf".to_string()],
    }
}

/// Config with millisecond back-offs so retry paths finish quickly.
pub fn test_config() -> CoordinatorConfig {
    CoordinatorConfig {
        retry_initial_backoff_ms: 1,
        retry_max_backoff_ms: 4,
        ..CoordinatorConfig::default()
    }
}

pub fn setup_coordinator(config: CoordinatorConfig) -> TestCoordinatorRef {
    Arc::new(CompactionCoordinator::new(config))
}

struct MockTabletServerState {
    addr: HostAddr,
    summaries: Mutex<Vec<QueueSummary>>,
    jobs: Mutex<HashMap<(String, i64), VecDeque<CompactionJob>>>,
    reserve_calls: Mutex<Vec<(String, i64, HostAddr)>>,
    finished: Mutex<Vec<(ExternalCompactionId, u64, u64)>>,
    unreachable: AtomicBool,
    connects: AtomicUsize,
}

impl MockTabletServerState {
    fn check_reachable(&self) -> Result<()> {
        if self.unreachable.load(Ordering::Relaxed) {
            Err(RpcError::Unreachable(self.addr.clone()))
        } else {
            Ok(())
        }
    }
}

/// Handle used by tests to script one mock tablet server.
pub struct MockTabletServer {
    id: TabletServerId,
    state: Arc<MockTabletServerState>,
}

impl MockTabletServer {
    pub fn id(&self) -> TabletServerId {
        self.id.clone()
    }

    /// Advertise pending work in `queue` at `priority` without queueing a
    /// reservable job, like a tablet server whose compaction was handled
    /// locally in the meantime.
    pub fn advertise(&self, queue: &str, priority: i64) {
        self.state.summaries.lock().push(QueueSummary {
            queue: queue.to_string(),
            priority,
        });
    }

    pub fn add_job(&self, job: CompactionJob) {
        self.state
            .jobs
            .lock()
            .entry((job.queue.clone(), job.priority))
            .or_default()
            .push_back(job);
    }

    /// Advertise and queue one reservable job.
    pub fn offer(&self, queue: &str, priority: i64) -> CompactionJob {
        let job = test_job(queue, priority);
        self.advertise(queue, priority);
        self.add_job(job.clone());
        job
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.unreachable.store(unreachable, Ordering::Relaxed);
    }

    pub fn reserve_calls(&self) -> Vec<(String, i64, HostAddr)> {
        self.state.reserve_calls.lock().clone()
    }

    pub fn finished_notifications(&self) -> Vec<(ExternalCompactionId, u64, u64)> {
        self.state.finished.lock().clone()
    }

    /// How many client connections were established to this server.
    pub fn connect_count(&self) -> usize {
        self.state.connects.load(Ordering::Relaxed)
    }
}

pub fn test_tablet_server() -> MockTabletServer {
    let port = NEXT_PORT.fetch_add(1, Ordering::Relaxed);
    let id = tserver_id(port);
    let state = Arc::new(MockTabletServerState {
        addr: id.addr.clone(),
        summaries: Mutex::default(),
        jobs: Mutex::default(),
        reserve_calls: Mutex::default(),
        finished: Mutex::default(),
        unreachable: AtomicBool::new(false),
        connects: AtomicUsize::new(0),
    });
    TABLET_SERVERS.lock().insert(id.addr.clone(), state.clone());
    MockTabletServer { id, state }
}

#[derive(Clone)]
pub struct MockTabletServerClient {
    state: Arc<MockTabletServerState>,
}

#[async_trait]
impl RpcClient for MockTabletServerClient {
    async fn new_client(addr: HostAddr) -> Result<Self> {
        let state = TABLET_SERVERS
            .lock()
            .get(&addr)
            .cloned()
            .ok_or_else(|| RpcError::Unreachable(addr.clone()))?;
        state.check_reachable()?;
        state.connects.fetch_add(1, Ordering::Relaxed);
        Ok(Self { state })
    }
}

#[async_trait]
impl TabletServerRpc for MockTabletServerClient {
    async fn compaction_queue_info(&self) -> Result<Vec<QueueSummary>> {
        self.state.check_reachable()?;
        Ok(self.state.summaries.lock().clone())
    }

    async fn reserve_compaction_job(
        &self,
        queue: &str,
        priority: i64,
        compactor_address: &HostAddr,
    ) -> Result<Option<CompactionJob>> {
        self.state.check_reachable()?;
        self.state.reserve_calls.lock().push((
            queue.to_string(),
            priority,
            compactor_address.clone(),
        ));
        Ok(self
            .state
            .jobs
            .lock()
            .get_mut(&(queue.to_string(), priority))
            .and_then(|jobs| jobs.pop_front()))
    }

    async fn compaction_job_finished(
        &self,
        id: &ExternalCompactionId,
        file_size: u64,
        entries_written: u64,
    ) -> Result<()> {
        self.state.check_reachable()?;
        self.state
            .finished
            .lock()
            .push((id.clone(), file_size, entries_written));
        Ok(())
    }
}

struct MockCompactorState {
    addr: HostAddr,
    cancelled: Mutex<Vec<ExternalCompactionId>>,
    unreachable: AtomicBool,
}

/// Handle used by tests to script one mock compactor worker.
pub struct MockCompactor {
    state: Arc<MockCompactorState>,
}

impl MockCompactor {
    pub fn addr(&self) -> HostAddr {
        self.state.addr.clone()
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.unreachable.store(unreachable, Ordering::Relaxed);
    }

    pub fn cancelled(&self) -> Vec<ExternalCompactionId> {
        self.state.cancelled.lock().clone()
    }
}

pub fn test_compactor() -> MockCompactor {
    let port = NEXT_PORT.fetch_add(1, Ordering::Relaxed);
    let state = Arc::new(MockCompactorState {
        addr: compactor_addr(port),
        cancelled: Mutex::default(),
        unreachable: AtomicBool::new(false),
    });
    COMPACTORS.lock().insert(state.addr.clone(), state.clone());
    MockCompactor { state }
}

#[derive(Clone)]
pub struct MockCompactorClient {
    state: Arc<MockCompactorState>,
}

#[async_trait]
impl RpcClient for MockCompactorClient {
    async fn new_client(addr: HostAddr) -> Result<Self> {
        let state = COMPACTORS
            .lock()
            .get(&addr)
            .cloned()
            .ok_or_else(|| RpcError::Unreachable(addr.clone()))?;
        Ok(Self { state })
    }
}

#[async_trait]
impl CompactorRpc for MockCompactorClient {
    async fn cancel(&self, id: &ExternalCompactionId) -> Result<()> {
        if self.state.unreachable.load(Ordering::Relaxed) {
            return Err(RpcError::Unreachable(self.state.addr.clone()));
        }
        self.state.cancelled.lock().push(id.clone());
        Ok(())
    }
}
