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

use log::{debug, error};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::constant::*;
use crate::deadlock::{DeadlockManager, VictimPolicy};
use crate::error::Error;
use crate::operation::{is_blank, parse_line, Operation};
use crate::recovery::RecoveryManager;
use crate::site_manager::SiteManager;
use crate::transaction_manager::TransactionManager;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseOption {
    /// Specify the number of sites, numbered from 1. Odd variable `x<i>` is
    /// placed on site `1 + i mod num_sites`.
    ///
    /// default: 10
    pub num_sites: u64,

    /// Specify the number of variables, named `x1` to `x<num_variables>`.
    /// Variable `x<i>` starts with value `10 * i`.
    ///
    /// default: 20
    pub num_variables: u64,

    /// Specify which transaction of a deadlock cycle is aborted.
    ///
    /// default: Youngest
    pub victim_policy: VictimPolicy,
}

impl Default for DatabaseOption {
    fn default() -> DatabaseOption {
        DatabaseOption {
            num_sites: DEFAULT_NUM_SITES,
            num_variables: DEFAULT_NUM_VARIABLES,
            victim_policy: VictimPolicy::default(),
        }
    }
}

/// Replays an operation stream tick by tick.
#[derive(Debug)]
pub struct Database {
    option: DatabaseOption,
    tm: TransactionManager,
    recovery: RecoveryManager,
}

impl Database {
    pub fn new(option: DatabaseOption) -> Database {
        let sites = SiteManager::new(option.num_sites, option.num_variables);
        let tm = TransactionManager::new(
            Clock::new(),
            sites,
            DeadlockManager::new(option.victim_policy),
        );
        Database {
            option,
            tm,
            recovery: RecoveryManager::new(),
        }
    }

    pub fn option(&self) -> &DatabaseOption {
        &self.option
    }

    pub fn transaction_manager(&self) -> &TransactionManager {
        &self.tm
    }

    pub fn sites(&self) -> &SiteManager {
        self.tm.sites()
    }

    pub fn time(&self) -> u64 {
        self.tm.time()
    }

    /// Run one tick. Sites recovered during the previous tick become stable
    /// first, then failures and recoveries of this tick apply before any
    /// transaction runs. Dumps are served last. Returns the dumped lines.
    pub fn step(&mut self, operations: &[Operation]) -> Result<Vec<String>, Error> {
        for variable in operations.iter().filter_map(Operation::variable) {
            self.tm.sites().check_variable(variable)?;
        }

        let time = self.tm.tick();
        debug!("tick {} with {} operations", time, operations.len());

        self.recovery.stabilize(self.tm.sites_mut());
        for op in operations {
            match op {
                Operation::Fail { site } => {
                    self.recovery.fail(self.tm.sites_mut(), *site, time)?
                }
                Operation::Recover { site } => {
                    self.recovery.recover(self.tm.sites_mut(), *site)?
                }
                _ => {}
            }
        }

        let transactional = operations
            .iter()
            .filter(|op| op.is_transactional())
            .cloned()
            .collect::<Vec<_>>();
        self.tm.execute(&transactional)?;

        Ok(self.tm.sites().execute(operations))
    }

    /// Replay `input`, one tick per line. Blank and comment lines don't tick.
    /// The first protocol violation stops the replay.
    pub fn run(&mut self, input: &str) -> Result<Vec<String>, Error> {
        let mut dumped = Vec::new();
        for (idx, line) in input.lines().enumerate() {
            if is_blank(line) {
                continue;
            }
            let result = parse_line(line, idx + 1).and_then(|ops| self.step(&ops));
            match result {
                Ok(lines) => dumped.extend(lines),
                Err(err) => {
                    error!("[T={}] {}", self.tm.time(), err);
                    return Err(err);
                }
            }
        }
        Ok(dumped)
    }

    /// The committed values seen by the stable sites, as JSON.
    pub fn snapshot_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string_pretty(&self.tm.sites().snapshot())?)
    }
}

impl Default for Database {
    fn default() -> Database {
        Database::new(DatabaseOption::default())
    }
}
