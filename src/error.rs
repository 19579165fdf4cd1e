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

use crate::model::ExternalCompactionId;
use crate::rpc::error::RpcError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The id is not in the running table. Raised to callers of
    /// `update_compaction_status`, `compaction_completed` and
    /// `is_compaction_completed`; cancellation and status reads treat it as
    /// a no-op instead.
    #[error("unknown external compaction id {0}")]
    UnknownCompactionId(ExternalCompactionId),
    #[error("external compaction {0} is already running")]
    DuplicateCompactionId(ExternalCompactionId),
    #[error("rpc error: {0}")]
    Rpc(#[from] RpcError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}
