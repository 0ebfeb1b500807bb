// Copyright 2021 The repcrec Authors.
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

use std::sync::Arc;

use crate::types::TransactionState;

/// Protocol violations. Each of them terminates the replay; lock contention
/// and unavailable replicas are never reported through this type.
#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    #[error("trying to begin transaction {0} when it already exists")]
    DuplicateTransaction(String),

    #[error("trying to operate as transaction {0}, but it doesn't exist")]
    UnknownTransaction(String),

    /// An operation arrives for a transaction which is blocked, waiting or
    /// already finished.
    #[error("transaction {name} received another operation while it is {state}")]
    NotRunning {
        name: String,
        state: TransactionState,
    },

    #[error("operation '{0}' is not supported")]
    UnsupportedOperation(String),

    #[error("invalid site id {0}")]
    UnknownSite(u64),

    #[error("variable {0} doesn't exist")]
    UnknownVariable(String),

    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("broken io request")]
    Io(Arc<std::io::Error>),

    #[error("serialize snapshot")]
    Json(Arc<serde_json::Error>),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Io(Arc::new(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Error {
        Error::Json(Arc::new(err))
    }
}
