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

use log::{debug, info, trace};

use crate::clock::Clock;
use crate::deadlock::DeadlockManager;
use crate::error::Error;
use crate::operation::Operation;
use crate::site_manager::SiteManager;
use crate::transaction::Transaction;
use crate::types::*;

/// How the acting transaction of a read or write is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnRef {
    /// Replaying the buffered operation of the transaction at this index.
    Replay(usize),
    /// Look the transaction up by the name carried by the operation. A lookup
    /// of a waiting transaction runs deadlock detection first.
    Lookup,
}

/// Drives transactions through strict two-phase locking over the replicated
/// sites.
///
/// Reads are served by the first stable replica granting a read lock. Writes
/// must lock every stable replica before any of them is written, so a later
/// site failure can't make committed replicas diverge.
#[derive(Debug)]
pub struct TransactionManager {
    clock: Clock,
    sites: SiteManager,
    transactions: Vec<Transaction>,
    deadlock_manager: DeadlockManager,
}

impl TransactionManager {
    pub fn new(clock: Clock, sites: SiteManager, deadlock_manager: DeadlockManager) -> Self {
        TransactionManager {
            clock,
            sites,
            transactions: Vec::new(),
            deadlock_manager,
        }
    }

    pub fn time(&self) -> Time {
        self.clock.time()
    }

    pub fn tick(&mut self) -> Time {
        self.clock.tick()
    }

    pub fn sites(&self) -> &SiteManager {
        &self.sites
    }

    pub fn sites_mut(&mut self) -> &mut SiteManager {
        &mut self.sites
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn transaction(&self, name: &str) -> Option<&Transaction> {
        self.transactions.iter().find(|t| t.is_named(name))
    }

    /// Rerun the waiting transactions, then run `operations` in order.
    pub fn execute(&mut self, operations: &[Operation]) -> Result<(), Error> {
        self.rerun_transactions()?;
        for op in operations {
            self.run_operation(op, TxnRef::Lookup)?;
        }
        Ok(())
    }

    /// Replay the buffered operation of every waiting transaction, the one
    /// waiting the longest first.
    fn rerun_transactions(&mut self) -> Result<(), Error> {
        let mut waiting = self
            .transactions
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_waiting())
            .map(|(idx, t)| (t.wait_time, idx))
            .collect::<Vec<_>>();
        waiting.sort_by_key(|(wait_time, _)| *wait_time);

        for (_, idx) in waiting {
            let txn = &self.transactions[idx];
            let op = match txn.buffered() {
                Some(op) if txn.is_waiting() => op.clone(),
                _ => continue,
            };
            trace!("{} rerun {} of transaction {}", self.clock, op, txn);
            self.run_operation(&op, TxnRef::Replay(idx))?;
        }
        Ok(())
    }

    pub fn run_operation(&mut self, op: &Operation, txn_ref: TxnRef) -> Result<(), Error> {
        match op {
            Operation::Begin { transaction } => self.begin_transaction(transaction, false),
            Operation::BeginReadOnly { transaction } => self.begin_transaction(transaction, true),
            Operation::Read {
                transaction,
                variable,
            } => self.read_variable(op, transaction, variable, txn_ref),
            Operation::Write {
                transaction,
                variable,
                value,
            } => self.write_variable(op, transaction, variable, *value, txn_ref),
            Operation::End { transaction } => self.end_transaction(transaction),
            Operation::Dump { .. } | Operation::Fail { .. } | Operation::Recover { .. } => {
                Err(Error::UnsupportedOperation(op.to_string()))
            }
        }
    }

    fn begin_transaction(&mut self, name: &str, read_only: bool) -> Result<(), Error> {
        if self.transactions.iter().any(|t| t.is_named(name)) {
            return Err(Error::DuplicateTransaction(name.to_owned()));
        }

        let mut txn = Transaction::new(name, read_only, self.clock.time());
        if read_only {
            txn = txn.with_snapshot(self.sites.stable_snapshot());
        }
        info!(
            "{} transaction {} begins{}",
            self.clock,
            txn,
            if read_only { " (read-only)" } else { "" }
        );
        self.transactions.push(txn);
        Ok(())
    }

    fn resolve(&mut self, name: &str, txn_ref: TxnRef) -> Result<usize, Error> {
        match txn_ref {
            TxnRef::Replay(idx) => Ok(idx),
            TxnRef::Lookup => self.get_transaction(name),
        }
    }

    fn stable_sites_with(&self, variable: &str) -> Vec<u64> {
        self.sites
            .sites_with_variable(variable, Some(SiteState::Stable))
            .iter()
            .map(|s| s.id)
            .collect()
    }

    fn read_variable(
        &mut self,
        op: &Operation,
        name: &str,
        variable: &str,
        txn_ref: TxnRef,
    ) -> Result<(), Error> {
        let idx = self.resolve(name, txn_ref)?;
        let time = self.clock.time();

        let stable_sites = self.stable_sites_with(variable);
        if stable_sites.is_empty() {
            self.buffer_operation(idx, op, TransactionState::Waiting);
            return Ok(());
        }

        for site_id in stable_sites {
            let txn = &self.transactions[idx];
            let site = self.sites.site_mut(site_id)?;
            if !site.try_read_lock(txn, variable) {
                continue;
            }
            if let Some(value) = site.read_data(txn, variable) {
                info!(
                    "{} transaction {} reads {}={} from {}",
                    self.clock, txn, variable, value, site
                );
                let txn = &mut self.transactions[idx];
                txn.add_site(site_id, time);
                txn.record_read(variable, value);
                txn.clear_buffer();
                self.sites.forget_waits(&self.transactions[idx].name);
                return Ok(());
            }
        }

        self.buffer_operation(idx, op, TransactionState::Blocked);
        Ok(())
    }

    fn write_variable(
        &mut self,
        op: &Operation,
        name: &str,
        variable: &str,
        value: i64,
        txn_ref: TxnRef,
    ) -> Result<(), Error> {
        let idx = self.resolve(name, txn_ref)?;
        let time = self.clock.time();
        if self.transactions[idx].read_only {
            return Err(Error::UnsupportedOperation(format!(
                "{} in read-only transaction",
                op
            )));
        }

        let stable_sites = self.stable_sites_with(variable);
        if stable_sites.is_empty() {
            self.buffer_operation(idx, op, TransactionState::Waiting);
            return Ok(());
        }

        // Every stable replica is asked even after a denial, and granted
        // locks are kept when the write can't proceed.
        let mut locked_all_sites = true;
        for site_id in &stable_sites {
            let txn = &self.transactions[idx];
            if self.sites.site_mut(*site_id)?.try_write_lock(txn, variable) {
                self.transactions[idx].add_site(*site_id, time);
            } else {
                locked_all_sites = false;
            }
        }

        if !locked_all_sites {
            self.buffer_operation(idx, op, TransactionState::Blocked);
            return Ok(());
        }

        self.transactions[idx].clear_buffer();
        for site_id in &stable_sites {
            self.sites.site_mut(*site_id)?.write_data(variable, value);
        }
        let txn = &self.transactions[idx];
        self.sites.forget_waits(&txn.name);
        info!(
            "{} transaction {} writes {}={} to sites {:?}",
            self.clock, txn, variable, value, stable_sites
        );
        Ok(())
    }

    fn end_transaction(&mut self, name: &str) -> Result<(), Error> {
        let idx = self.get_transaction(name)?;
        self.transactions[idx].end_time = Some(self.clock.time());

        if self.transactions[idx].can_commit(&self.sites) {
            self.commit(idx);
        } else {
            self.abort(idx);
        }

        self.rerun_transactions()
    }

    fn commit(&mut self, idx: usize) {
        let time = self.clock.time();
        let txn = &mut self.transactions[idx];
        info!("{} transaction {} committed", self.clock, txn);
        txn.commit(&mut self.sites, time);
    }

    fn abort(&mut self, idx: usize) {
        let time = self.clock.time();
        let txn = &mut self.transactions[idx];
        info!("{} transaction {} aborted", self.clock, txn);
        txn.abort(&mut self.sites, time);
    }

    /// Only the first deferral is kept until the transaction makes progress.
    fn buffer_operation(&mut self, idx: usize, op: &Operation, state: TransactionState) {
        let time = self.clock.time();
        let txn = &mut self.transactions[idx];
        if txn.buffer.is_some() {
            trace!("{} transaction {} already has a buffered operation", self.clock, txn);
            return;
        }
        debug!("{} transaction {} is {} on {}", self.clock, txn, state, op);
        txn.state = state;
        txn.wait_time = Some(time);
        txn.buffer = Some(op.clone());
    }

    /// Case-insensitive lookup. New demand on a waiting transaction triggers
    /// deadlock detection and a rerun pass; the transaction must be running
    /// afterwards.
    fn get_transaction(&mut self, name: &str) -> Result<usize, Error> {
        let idx = self
            .transactions
            .iter()
            .position(|t| t.is_named(name))
            .ok_or_else(|| Error::UnknownTransaction(name.to_owned()))?;

        if self.transactions[idx].is_waiting() {
            let time = self.clock.time();
            self.deadlock_manager
                .detect_deadlocks(&mut self.transactions, &mut self.sites, time);
            self.rerun_transactions()?;
        }

        let txn = &self.transactions[idx];
        if txn.state != TransactionState::Running {
            return Err(Error::NotRunning {
                name: txn.name.clone(),
                state: txn.state,
            });
        }
        Ok(idx)
    }
}
