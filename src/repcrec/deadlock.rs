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

use std::collections::{BTreeMap, BTreeSet, HashSet};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::site_manager::SiteManager;
use crate::transaction::Transaction;
use crate::types::Time;

/// Edges from a waiting transaction to the transactions it waits for.
pub type WaitForGraph = BTreeMap<String, BTreeSet<String>>;

/// Which transaction of a cycle is aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VictimPolicy {
    /// The transaction with the latest start time, later begin wins ties.
    Youngest,
    /// The transaction with the earliest start time, earlier begin wins ties.
    Oldest,
}

impl Default for VictimPolicy {
    fn default() -> VictimPolicy {
        VictimPolicy::Youngest
    }
}

#[derive(Debug, Default, Clone)]
pub struct DeadlockManager {
    policy: VictimPolicy,
}

impl DeadlockManager {
    pub fn new(policy: VictimPolicy) -> DeadlockManager {
        DeadlockManager { policy }
    }

    /// Build the wait-for graph from the waits recorded by every site. Only
    /// waiting transactions contribute edges and only live transactions are
    /// pointed to.
    pub fn wait_for_graph(
        &self,
        transactions: &[Transaction],
        sites: &SiteManager,
    ) -> WaitForGraph {
        let waiting = transactions
            .iter()
            .filter(|t| t.is_waiting())
            .map(|t| t.name.as_str())
            .collect::<HashSet<_>>();
        let live = transactions
            .iter()
            .filter(|t| !t.state.is_terminal())
            .map(|t| t.name.as_str())
            .collect::<HashSet<_>>();

        let mut graph = WaitForGraph::new();
        for site in sites.sites() {
            for wait in site.waits() {
                if !waiting.contains(wait.transaction.as_str()) {
                    continue;
                }
                for holder in site.conflicting_holders(wait) {
                    if live.contains(holder.as_str()) {
                        graph
                            .entry(wait.transaction.clone())
                            .or_default()
                            .insert(holder);
                    }
                }
            }
        }
        graph
    }

    /// Abort victims until the wait-for graph has no cycle. Returns the names
    /// of the aborted transactions in abort order.
    pub fn detect_deadlocks(
        &self,
        transactions: &mut [Transaction],
        sites: &mut SiteManager,
        time: Time,
    ) -> Vec<String> {
        let mut victims = Vec::new();
        loop {
            let graph = self.wait_for_graph(transactions, sites);
            let cycle = match find_cycle(&graph) {
                Some(cycle) => cycle,
                None => break,
            };
            let idx = match self.choose_victim(&cycle, transactions) {
                Some(idx) => idx,
                None => break,
            };
            let victim = &mut transactions[idx];
            info!(
                "deadlock detected among {:?}, transaction {} aborted",
                cycle, victim.name
            );
            victim.abort(sites, time);
            victims.push(victim.name.clone());
        }
        if victims.is_empty() {
            debug!("no deadlock found among {} transactions", transactions.len());
        }
        victims
    }

    fn choose_victim(&self, cycle: &[String], transactions: &[Transaction]) -> Option<usize> {
        let members = transactions
            .iter()
            .enumerate()
            .filter(|(_, t)| cycle.contains(&t.name))
            .map(|(idx, t)| (t.start_time, idx));
        let chosen = match self.policy {
            VictimPolicy::Youngest => members.max(),
            VictimPolicy::Oldest => members.min(),
        };
        chosen.map(|(_, idx)| idx)
    }
}

/// Find any cycle, visiting nodes in name order so the result is
/// deterministic.
pub fn find_cycle(graph: &WaitForGraph) -> Option<Vec<String>> {
    let mut visited = HashSet::new();
    for start in graph.keys() {
        if visited.contains(start) {
            continue;
        }
        let mut path = Vec::new();
        if let Some(cycle) = visit(graph, start, &mut visited, &mut path) {
            return Some(cycle);
        }
    }
    None
}

fn visit<'a>(
    graph: &'a WaitForGraph,
    node: &'a String,
    visited: &mut HashSet<&'a String>,
    path: &mut Vec<&'a String>,
) -> Option<Vec<String>> {
    if let Some(pos) = path.iter().position(|n| *n == node) {
        return Some(path[pos..].iter().map(|n| (*n).clone()).collect());
    }
    if !visited.insert(node) {
        return None;
    }
    path.push(node);
    if let Some(next) = graph.get(node) {
        for n in next {
            if let Some(cycle) = visit(graph, n, visited, path) {
                return Some(cycle);
            }
        }
    }
    path.pop();
    None
}
