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

use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::{debug, info, trace};

use crate::transaction::Transaction;
use crate::types::*;

#[derive(Debug, Default, Clone)]
struct LockEntry {
    readers: BTreeSet<String>,
    writer: Option<String>,
}

impl LockEntry {
    fn is_free(&self) -> bool {
        self.readers.is_empty() && self.writer.is_none()
    }
}

/// A lock request which has been denied and not been granted since.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockWait {
    pub transaction: String,
    pub variable: String,
    pub mode: LockMode,
}

#[derive(Debug, Clone)]
pub struct Site {
    pub id: u64,
    pub state: SiteState,

    /// Committed replicas, keyed by variable id.
    data: BTreeMap<u64, Variable>,

    locks: HashMap<String, LockEntry>,
    /// Values written under a write lock but not committed yet.
    uncommitted: HashMap<String, i64>,
    waits: Vec<LockWait>,

    /// Logical times at which this site has failed.
    failures: Vec<Time>,
}

impl Site {
    pub fn new(id: u64, data: Vec<Variable>) -> Site {
        Site {
            id,
            state: SiteState::Stable,
            data: data.into_iter().map(|v| (v.id, v)).collect(),
            locks: HashMap::new(),
            uncommitted: HashMap::new(),
            waits: Vec::new(),
            failures: Vec::new(),
        }
    }

    fn variable(&self, name: &str) -> Option<&Variable> {
        parse_variable_id(name).and_then(|id| self.data.get(&id))
    }

    fn variable_mut(&mut self, name: &str) -> Option<&mut Variable> {
        match parse_variable_id(name) {
            Some(id) => self.data.get_mut(&id),
            None => None,
        }
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.variable(name).is_some()
    }

    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.data.values()
    }

    pub fn is_stable(&self) -> bool {
        self.state == SiteState::Stable
    }

    fn record_wait(&mut self, transaction: &str, variable: &str, mode: LockMode) {
        let wait = LockWait {
            transaction: transaction.to_owned(),
            variable: variable.to_owned(),
            mode,
        };
        if !self.waits.contains(&wait) {
            trace!(
                "site {} records {} waiting for {:?} lock on {}",
                self.id,
                transaction,
                mode,
                variable
            );
            self.waits.push(wait);
        }
    }

    fn erase_wait(&mut self, transaction: &str, variable: &str) {
        self.waits
            .retain(|w| !(w.transaction == transaction && w.variable == variable));
    }

    pub fn forget_waits(&mut self, transaction: &str) {
        self.waits.retain(|w| w.transaction != transaction);
    }

    /// Read-only transactions read their snapshot, so they never take a read
    /// lock.
    pub fn try_read_lock(&mut self, txn: &Transaction, variable: &str) -> bool {
        if txn.read_only {
            return true;
        }
        let name = txn.name.as_str();
        let entry = self.locks.entry(variable.to_owned()).or_default();
        match entry.writer.clone() {
            Some(writer) if writer != name => {
                self.record_wait(name, variable, LockMode::Read);
                false
            }
            Some(_) => {
                self.erase_wait(name, variable);
                true
            }
            None => {
                entry.readers.insert(name.to_owned());
                self.erase_wait(name, variable);
                true
            }
        }
    }

    /// A sole reader upgrades its read lock.
    pub fn try_write_lock(&mut self, txn: &Transaction, variable: &str) -> bool {
        let name = txn.name.as_str();
        let entry = self.locks.entry(variable.to_owned()).or_default();
        let conflict = entry.writer.as_ref().map(|w| w != name).unwrap_or(false)
            || entry.readers.iter().any(|r| r != name);
        if conflict {
            self.record_wait(name, variable, LockMode::Write);
            false
        } else {
            entry.writer = Some(name.to_owned());
            self.erase_wait(name, variable);
            true
        }
    }

    /// Read `variable` on behalf of `txn`: the snapshot for read-only
    /// transactions, the own uncommitted value for the write lock holder, the
    /// committed value otherwise. A read-only transaction which began while no
    /// replica was stable has no snapshot value and reads the committed one.
    pub fn read_data(&self, txn: &Transaction, variable: &str) -> Option<i64> {
        if txn.read_only {
            return txn
                .snapshot_value(variable)
                .or_else(|| self.read_committed(variable));
        }
        if self.write_lock_holder(variable) == Some(txn.name.as_str()) {
            if let Some(value) = self.uncommitted.get(variable) {
                return Some(*value);
            }
        }
        self.read_committed(variable)
    }

    /// Lock-free read of the committed value.
    pub fn read_committed(&self, variable: &str) -> Option<i64> {
        self.variable(variable).map(|v| v.value)
    }

    /// REQUIRES the caller holds the write lock of `variable`.
    pub fn write_data(&mut self, variable: &str, value: i64) {
        trace!("site {} buffers {}={}", self.id, variable, value);
        self.uncommitted.insert(variable.to_owned(), value);
    }

    /// Overwrite the committed value without locking, used by recovery.
    pub fn refresh(&mut self, variable: &str, value: i64) {
        if let Some(v) = self.variable_mut(variable) {
            v.value = value;
        }
    }

    /// Apply the uncommitted values of every variable write-locked by `txn`.
    pub fn commit(&mut self, txn: &str) {
        let written = self
            .locks
            .iter()
            .filter(|(_, e)| e.writer.as_deref() == Some(txn))
            .map(|(var, _)| var.clone())
            .collect::<Vec<_>>();
        for var in written {
            if let Some(value) = self.uncommitted.remove(&var) {
                debug!("site {} applies {}={} of {}", self.id, var, value, txn);
                if let Some(v) = self.variable_mut(&var) {
                    v.value = value;
                }
            }
        }
    }

    /// Release every lock, wait and uncommitted value of `txn`.
    pub fn clear_locks(&mut self, txn: &str) {
        let uncommitted = &mut self.uncommitted;
        for (var, entry) in self.locks.iter_mut() {
            entry.readers.remove(txn);
            if entry.writer.as_deref() == Some(txn) {
                entry.writer = None;
                uncommitted.remove(var);
            }
        }
        self.locks.retain(|_, e| !e.is_free());
        self.waits.retain(|w| w.transaction != txn);
    }

    pub fn fail(&mut self, time: Time) {
        info!("site {} fails at {}", self.id, time);
        self.state = SiteState::Failed;
        self.failures.push(time);
        self.locks.clear();
        self.uncommitted.clear();
        self.waits.clear();
    }

    pub fn recover(&mut self) {
        if self.state == SiteState::Failed {
            info!("site {} is recovering", self.id);
            self.state = SiteState::Recovering;
        }
    }

    /// Has the site failed after `time`?
    pub fn failed_since(&self, time: Time) -> bool {
        self.failures.iter().any(|f| *f > time)
    }

    pub fn write_lock_holder(&self, variable: &str) -> Option<&str> {
        self.locks
            .get(variable)
            .and_then(|e| e.writer.as_deref())
    }

    pub fn uncommitted_value(&self, variable: &str) -> Option<i64> {
        self.uncommitted.get(variable).cloned()
    }

    pub fn waits(&self) -> &[LockWait] {
        &self.waits
    }

    /// The transactions, other than the waiter, holding a lock which conflicts
    /// with `wait`.
    pub fn conflicting_holders(&self, wait: &LockWait) -> Vec<String> {
        let entry = match self.locks.get(&wait.variable) {
            Some(entry) => entry,
            None => return Vec::new(),
        };
        let mut holders = BTreeSet::new();
        if let Some(writer) = &entry.writer {
            holders.insert(writer.clone());
        }
        if wait.mode == LockMode::Write {
            holders.extend(entry.readers.iter().cloned());
        }
        holders.remove(&wait.transaction);
        holders.into_iter().collect()
    }

    /// Render the committed values, only `variable` if given.
    pub fn dump(&self, variable: Option<&str>) -> String {
        let values = self
            .data
            .values()
            .filter(|v| variable.map(|name| v.name() == name).unwrap_or(true))
            .map(|v| v.to_string())
            .collect::<Vec<_>>();
        format!("site {} ({}) - {}", self.id, self.state, values.join(", "))
    }
}

impl std::fmt::Display for Site {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "site {}", self.id)
    }
}
