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

//! Client side of the coordinator's outbound RPC surface. The transport is
//! an external collaborator; peers are reached through the [`TabletServerRpc`]
//! and [`CompactorRpc`] traits, pooled per address.

pub mod client;
pub mod compactor_client;
pub mod error;
pub mod retry;
pub mod tserver_client;

pub use client::{RpcClient, RpcClientPool};
pub use compactor_client::CompactorRpc;
pub use error::RpcError;
pub use retry::{retry_rpc, RetryPolicy};
pub use tserver_client::TabletServerRpc;
