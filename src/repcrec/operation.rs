//! The crate `operation` defines the instructions replayed by repcrec and the
//! parser of the textual operation stream.
//!
//! Every input line is a tick of the logical clock. A line holds one or more
//! operations separated by `;`:
//!
//! ```text
//! begin(T1); beginRO(T2)
//! W(T1, x2, 50)
//! R(T2, x2)
//! fail(3)
//! recover(3)
//! dump(x2)
//! end(T1)
//! ```

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

use crate::error::Error;
use crate::types::{parse_variable_id, variable_name};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Begin {
        transaction: String,
    },
    BeginReadOnly {
        transaction: String,
    },
    Read {
        transaction: String,
        variable: String,
    },
    Write {
        transaction: String,
        variable: String,
        value: i64,
    },
    End {
        transaction: String,
    },
    Dump {
        site: Option<u64>,
        variable: Option<String>,
    },
    Fail {
        site: u64,
    },
    Recover {
        site: u64,
    },
}

impl Operation {
    /// Operations which are dispatched to the transaction manager.
    pub fn is_transactional(&self) -> bool {
        match self {
            Operation::Begin { .. }
            | Operation::BeginReadOnly { .. }
            | Operation::Read { .. }
            | Operation::Write { .. }
            | Operation::End { .. } => true,
            Operation::Dump { .. } | Operation::Fail { .. } | Operation::Recover { .. } => false,
        }
    }

    /// The variable named by the operation, if any.
    pub fn variable(&self) -> Option<&str> {
        match self {
            Operation::Read { variable, .. } | Operation::Write { variable, .. } => {
                Some(variable.as_str())
            }
            Operation::Dump { variable, .. } => variable.as_deref(),
            _ => None,
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Operation::Begin { transaction } => write!(f, "begin({})", transaction),
            Operation::BeginReadOnly { transaction } => write!(f, "beginRO({})", transaction),
            Operation::Read {
                transaction,
                variable,
            } => write!(f, "R({}, {})", transaction, variable),
            Operation::Write {
                transaction,
                variable,
                value,
            } => write!(f, "W({}, {}, {})", transaction, variable, value),
            Operation::End { transaction } => write!(f, "end({})", transaction),
            Operation::Dump { site, variable } => match (site, variable) {
                (Some(s), Some(v)) => write!(f, "dump({}, {})", s, v),
                (Some(s), None) => write!(f, "dump({})", s),
                (None, Some(v)) => write!(f, "dump({})", v),
                (None, None) => write!(f, "dump()"),
            },
            Operation::Fail { site } => write!(f, "fail({})", site),
            Operation::Recover { site } => write!(f, "recover({})", site),
        }
    }
}

/// Is the line empty or only a comment?
pub fn is_blank(line: &str) -> bool {
    let line = line.trim();
    line.is_empty() || line.starts_with("//") || line.starts_with('#')
}

/// Parse all operations of an input line. `line_no` is only used to report
/// errors.
pub fn parse_line(line: &str, line_no: usize) -> Result<Vec<Operation>, Error> {
    let line = match line.find("//") {
        Some(pos) => &line[..pos],
        None => line,
    };
    line.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse_operation(s).map_err(|reason| Error::Parse { line: line_no, reason }))
        .collect()
}

fn parse_operation(input: &str) -> Result<Operation, String> {
    let open = input
        .find('(')
        .ok_or_else(|| format!("expect '(' in '{}'", input))?;
    if !input.ends_with(')') {
        return Err(format!("expect ')' at the end of '{}'", input));
    }
    let keyword = input[..open].trim().to_ascii_lowercase();
    let args = input[open + 1..input.len() - 1]
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    let op = match (keyword.as_str(), args.as_slice()) {
        ("begin", [txn]) => Operation::Begin {
            transaction: txn.to_string(),
        },
        ("beginro", [txn]) => Operation::BeginReadOnly {
            transaction: txn.to_string(),
        },
        ("r", [txn, var]) => Operation::Read {
            transaction: txn.to_string(),
            variable: parse_variable(var)?,
        },
        ("w", [txn, var, value]) => Operation::Write {
            transaction: txn.to_string(),
            variable: parse_variable(var)?,
            value: value
                .parse::<i64>()
                .map_err(|e| format!("invalid value '{}': {}", value, e))?,
        },
        ("end", [txn]) => Operation::End {
            transaction: txn.to_string(),
        },
        ("dump", []) => Operation::Dump {
            site: None,
            variable: None,
        },
        ("dump", [arg]) => match parse_variable_id(arg) {
            Some(id) => Operation::Dump {
                site: None,
                variable: Some(variable_name(id)),
            },
            None => Operation::Dump {
                site: Some(parse_site(arg)?),
                variable: None,
            },
        },
        ("dump", [site, var]) => Operation::Dump {
            site: Some(parse_site(site)?),
            variable: Some(parse_variable(var)?),
        },
        ("fail", [site]) => Operation::Fail {
            site: parse_site(site)?,
        },
        ("recover", [site]) => Operation::Recover {
            site: parse_site(site)?,
        },
        _ => {
            return Err(format!(
                "unknown operation '{}' with {} argument(s)",
                keyword,
                args.len()
            ))
        }
    };
    Ok(op)
}

fn parse_variable(input: &str) -> Result<String, String> {
    parse_variable_id(input)
        .map(variable_name)
        .ok_or_else(|| format!("invalid variable '{}'", input))
}

fn parse_site(input: &str) -> Result<u64, String> {
    input
        .parse::<u64>()
        .map_err(|e| format!("invalid site '{}': {}", input, e))
}
