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

use crate::constant::INITIAL_TIME;
use crate::types::Time;

/// A monotonic logical clock. Only the driver ticks it.
#[derive(Debug, Clone)]
pub struct Clock {
    time: Time,
}

impl Default for Clock {
    fn default() -> Clock {
        Clock { time: INITIAL_TIME }
    }
}

impl Clock {
    pub fn new() -> Clock {
        Clock::default()
    }

    pub fn time(&self) -> Time {
        self.time
    }

    pub fn tick(&mut self) -> Time {
        self.time += 1;
        self.time
    }
}

impl std::fmt::Display for Clock {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "[T={}]", self.time)
    }
}
