//! The crate `types` defines a set types used by repcrec.

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

use serde::{Deserialize, Serialize};

use crate::constant::*;

/// Logical time, advanced once per input line.
pub type Time = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SiteState {
    Stable,
    Failed,
    /// The site is up again but not yet trusted to serve requests.
    Recovering,
}

impl std::fmt::Display for SiteState {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionState {
    Running,
    /// No live replica of the requested variable exists.
    Waiting,
    /// A live replica exists but the lock was denied.
    Blocked,
    Committed,
    Aborted,
}

impl TransactionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionState::Committed | TransactionState::Aborted)
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LockMode {
    Read,
    Write,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub id: u64,
    pub value: i64,
}

impl Variable {
    pub fn new(id: u64) -> Variable {
        Variable {
            id,
            value: id as i64 * INITIAL_VALUE_FACTOR,
        }
    }

    pub fn name(&self) -> String {
        variable_name(self.id)
    }
}

impl std::fmt::Display for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}: {}", self.name(), self.value)
    }
}

pub fn variable_name(id: u64) -> String {
    format!("{}{}", VARIABLE_PREFIX, id)
}

/// Parse `x<id>` (case-insensitive) into the variable id.
pub fn parse_variable_id(name: &str) -> Option<u64> {
    let name = name.trim();
    if name.len() <= VARIABLE_PREFIX.len()
        || !name[..VARIABLE_PREFIX.len()].eq_ignore_ascii_case(VARIABLE_PREFIX)
    {
        return None;
    }
    name[VARIABLE_PREFIX.len()..]
        .parse::<u64>()
        .ok()
        .filter(|id| *id >= FIRST_ID)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variable_initial_value() {
        let v = Variable::new(4);
        assert_eq!(v.name(), "x4");
        assert_eq!(v.value, 40);
        assert_eq!(format!("{}", v), "x4: 40");
    }

    #[test]
    fn parse_variable_names() {
        assert_eq!(parse_variable_id("x1"), Some(1));
        assert_eq!(parse_variable_id("X20"), Some(20));
        assert_eq!(parse_variable_id(" x7 "), Some(7));
        assert_eq!(parse_variable_id("x0"), None);
        assert_eq!(parse_variable_id("x"), None);
        assert_eq!(parse_variable_id("y3"), None);
        assert_eq!(parse_variable_id("x-3"), None);
    }

    #[test]
    fn terminal_states() {
        assert!(TransactionState::Committed.is_terminal());
        assert!(TransactionState::Aborted.is_terminal());
        assert!(!TransactionState::Running.is_terminal());
        assert!(!TransactionState::Waiting.is_terminal());
        assert!(!TransactionState::Blocked.is_terminal());
    }
}
