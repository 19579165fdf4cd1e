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

use thiserror::Error;

use crate::model::HostAddr;

pub type Result<T, E = RpcError> = std::result::Result<T, E>;

/// Transport-level failure of an outbound call. All variants are transient
/// from the coordinator's point of view and eligible for retry.
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("peer {0} is unreachable")]
    Unreachable(HostAddr),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}
