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

//! Coordinator of external tablet compactions.
//!
//! Tablet servers advertise compaction work into named queues; compactor
//! workers pull jobs from the single live coordinator, which reserves
//! concrete jobs from the owning tablet servers, tracks them to completion
//! and reconciles when participants disappear. The RPC transport, the
//! coordinator lock and the membership watch are external collaborators:
//! the transport reaches peers through the traits in [`rpc`], and membership
//! deltas arrive on a channel of [`cluster::MembershipEvent`]s.

#![warn(clippy::dbg_macro)]
#![warn(clippy::explicit_into_iter_loop)]
#![warn(clippy::explicit_iter_loop)]
#![warn(clippy::inconsistent_struct_constructor)]
#![warn(clippy::map_flatten)]
#![warn(clippy::await_holding_lock)]
#![deny(unused_must_use)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod cluster;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod model;
pub mod rpc;
#[cfg(any(test, feature = "test"))]
pub mod test_utils;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::cluster::MembershipEvent;
pub use crate::config::{load_config, CoordinatorConfig};
pub use crate::coordinator::{
    start_coordinator_workers, CompactionCoordinator, CompactionCoordinatorRef,
};
pub use crate::error::{Error, Result};
use crate::rpc::{CompactorRpc, TabletServerRpc};

#[derive(Debug, Parser)]
pub struct CoordinatorOpts {
    /// Address the embedding process binds its client service to and
    /// advertises under the coordinator lock.
    #[arg(long, default_value = "127.0.0.1:5780")]
    pub listen_addr: String,

    /// No given `config_path` means to use default config.
    #[arg(long, default_value = "")]
    pub config_path: String,
}

/// Start the coordinator over the given transport client types and run its
/// workers until they exit.
pub fn start<T, C>(
    opts: CoordinatorOpts,
    membership_rx: UnboundedReceiver<MembershipEvent>,
) -> Pin<Box<dyn Future<Output = ()> + Send>>
where
    T: TabletServerRpc,
    C: CompactorRpc,
{
    Box::pin(async move {
        let config = load_config(&opts.config_path);
        tracing::info!("Compaction coordinator advertising at {}", opts.listen_addr);
        let coordinator = Arc::new(CompactionCoordinator::<T, C>::new(config));
        let workers = start_coordinator_workers(coordinator, membership_rx);
        let (join_handles, shutdown_txs): (Vec<_>, Vec<_>) = workers.into_iter().unzip();
        // Dropping a sender stops its worker; hold them for the lifetime of
        // the service.
        let _shutdown_txs = shutdown_txs;
        for join_handle in join_handles {
            join_handle.await.unwrap();
        }
    })
}
