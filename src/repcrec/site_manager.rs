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

use log::{info, trace};

use crate::constant::*;
use crate::error::Error;
use crate::operation::Operation;
use crate::site::Site;
use crate::types::*;

/// Owns the fleet of sites. The replication placement is fixed at
/// construction: even variables live on every site, odd variable `x<i>` lives
/// on site `1 + i mod num_sites` only.
#[derive(Debug, Clone)]
pub struct SiteManager {
    sites: Vec<Site>,
    num_variables: u64,
}

impl Default for SiteManager {
    fn default() -> SiteManager {
        SiteManager::new(DEFAULT_NUM_SITES, DEFAULT_NUM_VARIABLES)
    }
}

impl SiteManager {
    pub fn new(num_sites: u64, num_variables: u64) -> SiteManager {
        let variables = (FIRST_ID..=num_variables)
            .map(Variable::new)
            .collect::<Vec<_>>();

        let sites = (FIRST_ID..=num_sites)
            .map(|site_id| {
                let data = variables
                    .iter()
                    .filter(|v| is_replicated(v.id) || site_id == home_site(v.id, num_sites))
                    .map(|v| Variable::new(v.id))
                    .collect::<Vec<_>>();
                Site::new(site_id, data)
            })
            .collect::<Vec<_>>();

        info!(
            "setup {} sites with {} variables",
            sites.len(),
            variables.len()
        );
        SiteManager {
            sites,
            num_variables,
        }
    }

    pub fn sites(&self) -> &[Site] {
        &self.sites
    }

    pub fn site(&self, id: u64) -> Result<&Site, Error> {
        self.sites
            .iter()
            .find(|s| s.id == id)
            .ok_or(Error::UnknownSite(id))
    }

    pub fn site_mut(&mut self, id: u64) -> Result<&mut Site, Error> {
        self.sites
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(Error::UnknownSite(id))
    }

    /// Serve dump requests, other operations are only traced. Returns the
    /// dumped lines.
    pub fn execute(&self, operations: &[Operation]) -> Vec<String> {
        let mut lines = Vec::new();
        for op in operations {
            match op {
                Operation::Dump { site, variable } => {
                    for line in self.dump(*site, variable.as_deref()) {
                        info!("{}", line);
                        lines.push(line);
                    }
                }
                _ => trace!("{}", op),
            }
        }
        lines
    }

    /// Render the state of sites. A variable filter supersedes the site
    /// filter: `dump(3, x4)` shows `x4` on every site holding it.
    pub fn dump(&self, site_id: Option<u64>, variable: Option<&str>) -> Vec<String> {
        let sites = match variable {
            Some(name) => self.sites_with_variable(name, None),
            None => self
                .sites
                .iter()
                .filter(|s| site_id.map(|id| s.id == id).unwrap_or(true))
                .collect(),
        };
        sites.iter().map(|s| s.dump(variable)).collect()
    }

    /// Sites holding a replica of `variable` in ascending id order, only those
    /// in `state` if given.
    pub fn sites_with_variable(&self, variable: &str, state: Option<SiteState>) -> Vec<&Site> {
        self.sites
            .iter()
            .filter(|s| s.has_variable(variable))
            .filter(|s| state.map(|st| s.state == st).unwrap_or(true))
            .collect()
    }

    /// Fail if `name` isn't one of the variables of the fleet.
    pub fn check_variable(&self, name: &str) -> Result<(), Error> {
        match parse_variable_id(name) {
            Some(id) if id <= self.num_variables => Ok(()),
            _ => Err(Error::UnknownVariable(name.to_owned())),
        }
    }

    /// The committed value of every variable as seen by the stable sites.
    pub fn snapshot(&self) -> Vec<Variable> {
        (FIRST_ID..=self.num_variables)
            .map(|id| {
                let mut variable = Variable::new(id);
                self.set_committed_value(&mut variable);
                variable
            })
            .collect()
    }

    /// Like `snapshot`, but only the variables held by some stable site.
    pub fn stable_snapshot(&self) -> Vec<Variable> {
        (FIRST_ID..=self.num_variables)
            .map(Variable::new)
            .filter_map(|mut variable| {
                if self.set_committed_value(&mut variable) {
                    Some(variable)
                } else {
                    None
                }
            })
            .collect()
    }

    /// Adopt the committed value of the first stable site holding `variable`.
    /// Returns false and leaves the value untouched if no such site exists.
    pub fn set_committed_value(&self, variable: &mut Variable) -> bool {
        let name = variable.name();
        let value = self
            .sites_with_variable(&name, Some(SiteState::Stable))
            .into_iter()
            .find_map(|site| site.read_committed(&name));
        match value {
            Some(value) => {
                variable.value = value;
                true
            }
            None => false,
        }
    }

    /// Drop the recorded lock waits of `txn`, it is no longer blocked.
    pub fn forget_waits(&mut self, txn: &str) {
        for site in &mut self.sites {
            site.forget_waits(txn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replication_placement() {
        let manager = SiteManager::default();
        assert_eq!(manager.sites().len(), 10);
        for id in 1..=20u64 {
            let name = variable_name(id);
            let ids = manager
                .sites_with_variable(&name, None)
                .iter()
                .map(|s| s.id)
                .collect::<Vec<_>>();
            if id % 2 == 0 {
                assert_eq!(ids, (1..=10).collect::<Vec<_>>(), "{}", name);
            } else {
                assert_eq!(ids, vec![1 + id % 10], "{}", name);
            }
        }
    }

    #[test]
    fn sites_with_variable_by_state() {
        let mut manager = SiteManager::default();
        manager.site_mut(2).unwrap().fail(1);
        manager.site_mut(4).unwrap().fail(1);

        let stable = manager
            .sites_with_variable("x2", Some(SiteState::Stable))
            .iter()
            .map(|s| s.id)
            .collect::<Vec<_>>();
        assert_eq!(stable, vec![1, 3, 5, 6, 7, 8, 9, 10]);

        let failed = manager
            .sites_with_variable("x2", Some(SiteState::Failed))
            .iter()
            .map(|s| s.id)
            .collect::<Vec<_>>();
        assert_eq!(failed, vec![2, 4]);

        assert!(manager
            .sites_with_variable("x3", Some(SiteState::Stable))
            .is_empty());
        assert!(manager.sites_with_variable("x21", None).is_empty());
    }

    #[test]
    fn dump_variable_supersedes_site() {
        let manager = SiteManager::default();

        assert_eq!(manager.dump(None, None).len(), 10);

        let site = manager.dump(Some(3), None);
        assert_eq!(site.len(), 1);
        assert!(site[0].starts_with("site 3 (Stable) - x2: 20"));

        let odd = manager.dump(Some(3), Some("x3"));
        assert_eq!(odd, vec!["site 4 (Stable) - x3: 30".to_owned()]);

        let even = manager.dump(Some(3), Some("x4"));
        assert_eq!(even.len(), 10);
        assert_eq!(even[0], "site 1 (Stable) - x4: 40");
    }

    #[test]
    fn execute_only_dumps() {
        let manager = SiteManager::default();
        let ops = vec![
            Operation::Begin {
                transaction: "T1".to_owned(),
            },
            Operation::Dump {
                site: Some(1),
                variable: None,
            },
            Operation::Fail { site: 1 },
        ];
        let lines = manager.execute(&ops);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("site 1 "));
        assert_eq!(manager.site(1).unwrap().state, SiteState::Stable);
    }

    #[test]
    fn snapshot_reads_first_stable_site() {
        let mut manager = SiteManager::default();
        manager.site_mut(1).unwrap().refresh("x2", 111);
        manager.site_mut(2).unwrap().refresh("x2", 222);

        let snapshot = manager.snapshot();
        assert_eq!(snapshot.len(), 20);
        assert_eq!(snapshot[1], Variable { id: 2, value: 111 });

        manager.site_mut(1).unwrap().fail(1);
        assert_eq!(manager.snapshot()[1].value, 222);
    }

    #[test]
    fn committed_value_without_stable_site() {
        let mut manager = SiteManager::default();
        manager.site_mut(4).unwrap().refresh("x3", 33);
        manager.site_mut(4).unwrap().fail(1);

        let mut variable = Variable::new(3);
        assert!(!manager.set_committed_value(&mut variable));
        assert_eq!(variable.value, 30);

        let mut variable = Variable::new(4);
        assert!(manager.set_committed_value(&mut variable));
        assert_eq!(variable.value, 40);
    }

    #[test]
    fn stable_snapshot_skips_unavailable_variables() {
        let mut manager = SiteManager::default();
        manager.site_mut(4).unwrap().fail(1);
        manager.site_mut(1).unwrap().refresh("x2", 21);

        let snapshot = manager.stable_snapshot();
        assert_eq!(snapshot.len(), 19);
        assert!(snapshot.iter().all(|v| v.id != 3));
        assert_eq!(snapshot[1], Variable { id: 2, value: 21 });
        // the full snapshot still lists every variable
        assert_eq!(manager.snapshot().len(), 20);
    }

    #[test]
    fn check_variable_range() {
        let manager = SiteManager::new(10, 20);
        assert!(manager.check_variable("x20").is_ok());
        assert!(manager.check_variable("X1").is_ok());
        match manager.check_variable("x21") {
            Err(Error::UnknownVariable(name)) => assert_eq!(name, "x21"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(manager.check_variable("x0").is_err());
    }

    #[test]
    fn unknown_site() {
        let manager = SiteManager::default();
        match manager.site(11) {
            Err(Error::UnknownSite(11)) => {}
            other => panic!("unexpected {:?}", other.map(|s| s.id)),
        }
    }
}
