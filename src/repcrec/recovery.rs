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

use log::{debug, info};

use crate::constant::is_replicated;
use crate::error::Error;
use crate::site_manager::SiteManager;
use crate::types::*;

/// Applies the failure timeline to the sites. A recovered site serves
/// requests again from the tick after its recovery.
#[derive(Debug, Default, Clone)]
pub struct RecoveryManager {}

impl RecoveryManager {
    pub fn new() -> RecoveryManager {
        RecoveryManager {}
    }

    pub fn fail(&self, sites: &mut SiteManager, site_id: u64, time: Time) -> Result<(), Error> {
        sites.site_mut(site_id)?.fail(time);
        Ok(())
    }

    pub fn recover(&self, sites: &mut SiteManager, site_id: u64) -> Result<(), Error> {
        sites.site_mut(site_id)?.recover();
        Ok(())
    }

    /// Promote every recovering site to stable. Replicated variables missed
    /// the commits made while the site was down, so they are refreshed from
    /// the stable replicas first. Returns the promoted site ids.
    pub fn stabilize(&self, sites: &mut SiteManager) -> Vec<u64> {
        let recovering = sites
            .sites()
            .iter()
            .filter(|s| s.state == SiteState::Recovering)
            .map(|s| s.id)
            .collect::<Vec<_>>();

        for site_id in &recovering {
            let refreshed = match sites.site(*site_id) {
                Ok(site) => site
                    .variables()
                    .filter(|v| is_replicated(v.id))
                    .filter_map(|v| {
                        let mut latest = v.clone();
                        if sites.set_committed_value(&mut latest) {
                            Some(latest)
                        } else {
                            None
                        }
                    })
                    .collect::<Vec<_>>(),
                Err(_) => continue,
            };
            if let Ok(site) = sites.site_mut(*site_id) {
                for v in refreshed {
                    debug!("site {} refreshes {}", site_id, v);
                    site.refresh(&v.name(), v.value);
                }
                site.state = SiteState::Stable;
                info!("site {} is stable again", site_id);
            }
        }
        recovering
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fail_and_recover_sites() {
        let mut sites = SiteManager::default();
        let recovery = RecoveryManager::new();

        recovery.fail(&mut sites, 3, 2).unwrap();
        assert_eq!(sites.site(3).unwrap().state, SiteState::Failed);
        assert!(recovery.stabilize(&mut sites).is_empty());

        recovery.recover(&mut sites, 3).unwrap();
        assert_eq!(sites.site(3).unwrap().state, SiteState::Recovering);
        assert!(sites
            .sites_with_variable("x2", Some(SiteState::Stable))
            .iter()
            .all(|s| s.id != 3));

        assert_eq!(recovery.stabilize(&mut sites), vec![3]);
        assert_eq!(sites.site(3).unwrap().state, SiteState::Stable);
    }

    #[test]
    fn unknown_site() {
        let mut sites = SiteManager::default();
        let recovery = RecoveryManager::new();
        assert!(recovery.fail(&mut sites, 0, 1).is_err());
        assert!(recovery.recover(&mut sites, 11).is_err());
    }

    #[test]
    fn refresh_replicated_variables() {
        let mut sites = SiteManager::default();
        let recovery = RecoveryManager::new();

        recovery.fail(&mut sites, 4, 1).unwrap();
        // commits made while site 4 is down
        for site in 1..=10 {
            if site != 4 {
                sites.site_mut(site).unwrap().refresh("x2", 222);
            }
        }
        // the single copy of x3 is only changed on site 4
        sites.site_mut(4).unwrap().refresh("x3", 333);

        recovery.recover(&mut sites, 4).unwrap();
        recovery.stabilize(&mut sites);

        let site = sites.site(4).unwrap();
        assert_eq!(site.read_committed("x2"), Some(222));
        assert_eq!(site.read_committed("x4"), Some(40));
        assert_eq!(site.read_committed("x3"), Some(333));
    }
}
