//! A stdout logger for the replay tools. The library itself only talks to the
//! `log` facade.

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

use std::collections::HashSet;

use chrono::{DateTime, Local};
use log::{Level, LevelFilter, Metadata, Record};

#[derive(Debug)]
pub struct SimpleLogger {
    /// Prefix every record with level and wall clock time.
    pub verbose: bool,
}

static QUIET_LOGGER: SimpleLogger = SimpleLogger { verbose: false };
static VERBOSE_LOGGER: SimpleLogger = SimpleLogger { verbose: true };

impl SimpleLogger {
    fn prefix(level: Level) -> String {
        let now: DateTime<Local> = Local::now();
        let p = match level {
            Level::Debug => "D",
            Level::Info => "I",
            Level::Error => "E",
            Level::Warn => "W",
            Level::Trace => "T",
        };
        [p, &now.format("%Y-%m-%d %H:%M:%S").to_string()].join("")
    }
}

impl log::Log for SimpleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        let mut allowed_targets = HashSet::new();
        allowed_targets.insert("repcrec");
        allowed_targets.insert("replay");
        let crate_name = metadata.target().split("::").next().unwrap_or("");
        allowed_targets.contains(crate_name) || metadata.level() <= Level::Warn
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        if self.verbose {
            println!(
                "[{} - {}:{}] {}",
                Self::prefix(record.level()),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            );
        } else if record.level() <= Level::Warn {
            eprintln!("{}: {}", record.level(), record.args());
        } else {
            println!("{}", record.args());
        }
    }

    fn flush(&self) {}
}

/// Install the logger as the global `log` sink. Fails if another logger is
/// already installed.
pub fn init(level: LevelFilter, verbose: bool) -> Result<(), log::SetLoggerError> {
    let logger = if verbose {
        &VERBOSE_LOGGER
    } else {
        &QUIET_LOGGER
    };
    log::set_logger(logger).map(|()| log::set_max_level(level))
}

#[cfg(test)]
static SETUP_LOGGER: std::sync::Once = std::sync::Once::new();

/// Install the verbose logger once for all tests of the crate.
#[cfg(test)]
pub(crate) fn setup_test_logger() {
    SETUP_LOGGER.call_once(|| {
        init(LevelFilter::Trace, true).expect("init logger");
    });
}
