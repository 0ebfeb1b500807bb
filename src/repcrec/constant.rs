//! The crate `constant` defines a set constant used by repcrec.

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

/// The number of sites of the default deployment.
pub const DEFAULT_NUM_SITES: u64 = 10;

/// The number of variables of the default deployment.
pub const DEFAULT_NUM_VARIABLES: u64 = 20;

/// Any valid site id or variable id will large than zero.
pub const FIRST_ID: u64 = 1;

/// The initial value of variable `x<id>` is `id * INITIAL_VALUE_FACTOR`.
pub const INITIAL_VALUE_FACTOR: i64 = 10;

/// The logical time before the first tick.
pub const INITIAL_TIME: u64 = 0;

/// The prefix of every variable name.
pub const VARIABLE_PREFIX: &str = "x";

/// A helper function is used to detect whether a variable is replicated to
/// every site, or homed at a single one.
pub fn is_replicated(variable_id: u64) -> bool {
    variable_id % 2 == 0
}

/// The site which homes a non-replicated variable.
pub fn home_site(variable_id: u64, num_sites: u64) -> u64 {
    FIRST_ID + variable_id % num_sites
}
