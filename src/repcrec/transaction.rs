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

use std::collections::HashMap;

use crate::operation::Operation;
use crate::site_manager::SiteManager;
use crate::types::*;

#[derive(Debug, Clone)]
pub struct Transaction {
    pub name: String,
    pub read_only: bool,
    pub start_time: Time,
    pub end_time: Option<Time>,
    pub state: TransactionState,

    /// When the buffered operation was deferred.
    pub wait_time: Option<Time>,

    /// At most one deferred operation, the first one since the last progress.
    pub(crate) buffer: Option<Operation>,

    /// Touched sites with the time of the first access, in access order.
    sites: Vec<(u64, Time)>,

    /// Committed values at begin, only for read-only transactions. Variables
    /// without a stable replica at begin are absent.
    snapshot: HashMap<String, i64>,

    /// Values returned by successful reads, in read order.
    reads: Vec<(String, i64)>,
}

impl Transaction {
    pub fn new(name: &str, read_only: bool, start_time: Time) -> Transaction {
        Transaction {
            name: name.to_owned(),
            read_only,
            start_time,
            end_time: None,
            state: TransactionState::Running,
            wait_time: None,
            buffer: None,
            sites: Vec::new(),
            snapshot: HashMap::new(),
            reads: Vec::new(),
        }
    }

    pub fn with_snapshot(mut self, variables: Vec<Variable>) -> Transaction {
        self.snapshot = variables.into_iter().map(|v| (v.name(), v.value)).collect();
        self
    }

    pub fn snapshot_value(&self, variable: &str) -> Option<i64> {
        self.snapshot.get(variable).cloned()
    }

    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// Either waiting for a replica or blocked by a lock.
    pub fn is_waiting(&self) -> bool {
        matches!(
            self.state,
            TransactionState::Waiting | TransactionState::Blocked
        )
    }

    pub fn buffered(&self) -> Option<&Operation> {
        self.buffer.as_ref()
    }

    /// Drop the buffered operation, the transaction is making progress again.
    pub fn clear_buffer(&mut self) {
        self.buffer = None;
        self.wait_time = None;
        self.state = TransactionState::Running;
    }

    /// Record an access to `site`, only the first access time is kept.
    pub fn add_site(&mut self, site: u64, time: Time) {
        if !self.sites.iter().any(|(id, _)| *id == site) {
            self.sites.push((site, time));
        }
    }

    pub fn record_read(&mut self, variable: &str, value: i64) {
        self.reads.push((variable.to_owned(), value));
    }

    pub fn reads(&self) -> &[(String, i64)] {
        &self.reads
    }

    pub fn sites_touched(&self) -> &[(u64, Time)] {
        &self.sites
    }

    pub fn stable_sites_touched(&self, sites: &SiteManager) -> Vec<u64> {
        self.sites
            .iter()
            .filter(|(id, _)| sites.site(*id).map(|s| s.is_stable()).unwrap_or(false))
            .map(|(id, _)| *id)
            .collect()
    }

    /// A transaction can't commit once a site it accessed has failed after
    /// that access.
    pub fn can_commit(&self, sites: &SiteManager) -> bool {
        self.sites.iter().all(|(id, first_access)| {
            sites
                .site(*id)
                .map(|s| !s.failed_since(*first_access))
                .unwrap_or(true)
        })
    }

    /// Apply the writes at every stable touched site and release the locks
    /// held there.
    pub fn commit(&mut self, sites: &mut SiteManager, time: Time) {
        self.state = TransactionState::Committed;
        self.end_time.get_or_insert(time);
        self.buffer = None;
        for id in self.stable_sites_touched(sites) {
            if let Ok(site) = sites.site_mut(id) {
                site.commit(&self.name);
                site.clear_locks(&self.name);
            }
        }
        sites.forget_waits(&self.name);
    }

    /// Release the locks held at every touched site, nothing is applied.
    pub fn abort(&mut self, sites: &mut SiteManager, time: Time) {
        self.state = TransactionState::Aborted;
        self.end_time.get_or_insert(time);
        self.buffer = None;
        for (id, _) in &self.sites {
            if let Ok(site) = sites.site_mut(*id) {
                site.clear_locks(&self.name);
            }
        }
        sites.forget_waits(&self.name);
    }
}

impl std::fmt::Display for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::site::Site;

    #[test]
    fn first_access_time_is_kept() {
        let mut txn = Transaction::new("T1", false, 1);
        txn.add_site(3, 2);
        txn.add_site(1, 3);
        txn.add_site(3, 4);
        assert_eq!(txn.sites_touched(), &[(3, 2), (1, 3)][..]);
    }

    #[test]
    fn can_not_commit_after_site_failure() {
        let mut sites = SiteManager::default();
        let mut txn = Transaction::new("T1", false, 1);
        txn.add_site(2, 3);
        txn.add_site(5, 3);
        assert!(txn.can_commit(&sites));

        // a failure before the first access doesn't matter
        sites.site_mut(5).unwrap().fail(2);
        assert!(txn.can_commit(&sites));

        sites.site_mut(2).unwrap().fail(4);
        assert!(!txn.can_commit(&sites));
        assert_eq!(txn.stable_sites_touched(&sites), Vec::<u64>::new());
    }

    #[test]
    fn stable_sites_touched() {
        let mut sites = SiteManager::default();
        let mut txn = Transaction::new("T1", false, 1);
        txn.add_site(7, 1);
        txn.add_site(2, 1);
        sites.site_mut(2).unwrap().fail(2);
        assert_eq!(txn.stable_sites_touched(&sites), vec![7]);
    }

    #[test]
    fn waiting_states() {
        let mut txn = Transaction::new("t1", false, 1);
        assert!(txn.is_named("T1"));
        assert!(!txn.is_waiting());

        txn.state = TransactionState::Blocked;
        txn.wait_time = Some(3);
        txn.buffer = Some(Operation::End {
            transaction: "T1".to_owned(),
        });
        assert!(txn.is_waiting());

        txn.clear_buffer();
        assert!(txn.buffered().is_none());
        assert_eq!(txn.state, TransactionState::Running);
        assert_eq!(txn.wait_time, None);

        txn.state = TransactionState::Waiting;
        assert!(txn.is_waiting());
        txn.state = TransactionState::Aborted;
        assert!(!txn.is_waiting());
    }

    #[test]
    fn read_only_snapshot() {
        let txn = Transaction::new("T1", true, 1)
            .with_snapshot(vec![Variable::new(1), Variable { id: 2, value: 7 }]);
        assert_eq!(txn.snapshot_value("x2"), Some(7));
        assert_eq!(txn.snapshot_value("x1"), Some(10));
        assert_eq!(txn.snapshot_value("x3"), None);
    }

    #[test]
    fn read_only_falls_back_to_committed() {
        let mut site = Site::new(4, vec![Variable { id: 3, value: 33 }]);
        let txn = Transaction::new("T2", true, 1).with_snapshot(vec![Variable::new(2)]);
        assert_eq!(site.read_data(&txn, "x2"), Some(20));
        assert!(site.try_read_lock(&txn, "x3"));
        assert_eq!(site.read_data(&txn, "x3"), Some(33));
        // read-only reads never lock
        assert!(site.waits().is_empty());
        assert_eq!(site.write_lock_holder("x3"), None);
    }
}
