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

use std::any::type_name;
use std::fmt;
use std::iter::repeat;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use futures::future::try_join_all;
use moka::future::Cache;
use rand::seq::SliceRandom;

use crate::model::HostAddr;
use crate::rpc::error::Result;

#[async_trait]
pub trait RpcClient: Send + Sync + 'static + Clone {
    async fn new_client(addr: HostAddr) -> Result<Self>;

    async fn new_clients(addr: HostAddr, size: usize) -> Result<Arc<Vec<Self>>> {
        try_join_all(repeat(addr).take(size).map(Self::new_client))
            .await
            .map(Arc::new)
    }
}

/// Pool of connected clients, one set per peer address. Connections are
/// established lazily and reused until invalidated by a failed call.
pub struct RpcClientPool<S> {
    connection_pool_size: u16,

    clients: Cache<HostAddr, Arc<Vec<S>>>,
}

impl<S> fmt::Debug for RpcClientPool<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcClientPool")
            .field("connection_pool_size", &self.connection_pool_size)
            .field("type", &type_name::<S>())
            .field("len", &self.clients.entry_count())
            .finish()
    }
}

impl<S> RpcClientPool<S>
where
    S: RpcClient,
{
    /// Create a new pool with the given `connection_pool_size`, which is the
    /// number of connections to each peer that will be reused.
    pub fn new(connection_pool_size: u16) -> Self {
        Self {
            connection_pool_size,
            clients: Cache::new(u64::MAX),
        }
    }

    /// Create a pool for ad-hoc usage, where the number of connections to
    /// each peer is 1.
    pub fn adhoc() -> Self {
        Self::new(1)
    }

    /// Gets an RPC client for the given addr. If the connection is not
    /// established, a new client will be created and returned.
    pub async fn get_by_addr(&self, addr: HostAddr) -> Result<S> {
        Ok(self
            .clients
            .try_get_with(
                addr.clone(),
                S::new_clients(addr.clone(), self.connection_pool_size as usize),
            )
            .await
            .with_context(|| format!("failed to create RPC client to {addr}"))?
            .choose(&mut rand::thread_rng())
            .unwrap()
            .clone())
    }

    /// Drops the cached connections to `addr` so the next call reconnects.
    pub async fn invalidate(&self, addr: &HostAddr) {
        self.clients.invalidate(addr).await;
    }

    pub fn invalidate_all(&self) {
        self.clients.invalidate_all()
    }
}
