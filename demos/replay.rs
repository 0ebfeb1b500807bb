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

extern crate anyhow;
extern crate clap;
extern crate log;
extern crate repcrec;
extern crate serde;
extern crate toml;

use std::io::Read;

use anyhow::{anyhow, Context, Result};
use clap::{App, Arg};
use log::{info, LevelFilter};
use repcrec::{Database, DatabaseOption};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Config {
    database: DatabaseOption,
}

fn load_config(path: Option<&str>) -> Result<Config> {
    match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("read config file {}", path))?;
            toml::from_str(&content).with_context(|| format!("parse config file {}", path))
        }
        None => Ok(Config::default()),
    }
}

fn read_input(path: Option<&str>) -> Result<String> {
    match path {
        Some(path) => {
            std::fs::read_to_string(path).with_context(|| format!("read input file {}", path))
        }
        None => {
            let mut content = String::new();
            std::io::stdin()
                .read_to_string(&mut content)
                .context("read input from stdin")?;
            Ok(content)
        }
    }
}

fn main() -> Result<()> {
    let matches = App::new("demos/replay")
        .version("v0.1.0")
        .author("Patrick")
        .about("replay an operation stream against the replicated database")
        .arg(
            Arg::with_name("input")
                .index(1)
                .help("path of the operation stream, stdin if absent"),
        )
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .takes_value(true)
                .help("path of config file"),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("log every decision with time and source location"),
        )
        .arg(
            Arg::with_name("snapshot")
                .short("s")
                .long("snapshot")
                .help("print the committed values as JSON at the end"),
        )
        .get_matches();

    let verbose = matches.is_present("verbose");
    let level = if verbose {
        LevelFilter::Trace
    } else {
        LevelFilter::Info
    };
    repcrec::logger::init(level, verbose).map_err(|e| anyhow!("init logger: {}", e))?;

    let config = load_config(matches.value_of("config"))?;
    let input = read_input(matches.value_of("input"))?;

    let mut db = Database::new(config.database);
    info!("replay with {:?}", db.option());
    db.run(&input)?;

    if matches.is_present("snapshot") {
        println!("{}", db.snapshot_json()?);
    }
    Ok(())
}
