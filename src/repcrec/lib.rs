//! # repcrec
//!
//! `repcrec` is a replicated concurrency control and recovery simulator. A
//! fixed fleet of sites stores integer variables; even variables are
//! replicated on every site, odd variables live on a single home site.
//!
//! Transactions run under strict two-phase locking with the available copies
//! approach:
//!
//! - a read is served by the first stable replica granting a read lock
//! - a write must lock every stable replica before any of them is written
//! - a transaction aborts at commit time if a site it accessed has failed
//!   since the first access
//! - read-only transactions read a snapshot taken at begin, without locks
//! - deadlocks are broken by aborting a victim of the wait-for cycle
//!
//! Operations which can't proceed are buffered and retried every tick, the
//! transaction waiting the longest first. A logical clock advances once per
//! input line.

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

extern crate chrono;
extern crate log;
extern crate serde;
extern crate serde_json;
extern crate thiserror;

mod database;
mod error;
mod recovery;

pub mod clock;
pub mod constant;
pub mod deadlock;
pub mod logger;
pub mod operation;
pub mod site;
pub mod site_manager;
pub mod transaction;
pub mod transaction_manager;
pub mod types;

pub use clock::Clock;
pub use database::{Database, DatabaseOption};
pub use deadlock::{DeadlockManager, VictimPolicy};
pub use error::Error;
pub use operation::Operation;
pub use recovery::RecoveryManager;
pub use site_manager::SiteManager;
pub use transaction_manager::{TransactionManager, TxnRef};
