// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

use std::collections::BTreeSet;
use std::path::PathBuf;

use clap::Parser;
use slog::Drain;
use slog::Logger;
use slog::o;

use ofpipe::print::print_cache;
use ofpipe::print::print_rules_into;
use ofpipeadm::install_topology;
use ofpipeadm::load_topology;

/// Synthesize and inspect multi-cluster pipeline rules.
#[derive(Debug, Parser)]
#[command(version)]
enum Command {
    /// Check that a topology file is valid and that every rule it calls
    /// for can be built.
    CheckConfig {
        file: PathBuf,
    },

    /// Print the rules a topology file calls for.
    DumpFlows {
        file: PathBuf,

        /// Print as JSON.
        #[arg(long)]
        json: bool,

        /// Print what the switch would hold, rather than the replay
        /// cache.
        #[arg(long)]
        installed: bool,

        /// The cookie round to allocate from.
        #[arg(long, default_value_t = 1)]
        round: u16,
    },
}

fn build_logger() -> Logger {
    let decorator = slog_term::TermDecorator::new().stderr().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_envlogger::new(drain);
    let drain = slog_async::Async::new(drain).build().fuse();
    Logger::root(drain, o!())
}

fn main() -> anyhow::Result<()> {
    let cmd = Command::parse();
    let log = build_logger();

    match cmd {
        Command::CheckConfig { file } => {
            let topo = load_topology(&file)?;
            let ids: BTreeSet<_> =
                topo.clusters.iter().map(|c| &c.id).collect();
            if ids.len() != topo.clusters.len() {
                anyhow::bail!("{}: duplicate cluster ID", file.display());
            }

            let client = install_topology(&topo, 1, &log)?;
            println!(
                "{}: {} clusters, {} rules",
                file.display(),
                topo.clusters.len(),
                client.feature().cache().num_rules(),
            );
        }

        Command::DumpFlows { file, json, installed, round } => {
            let topo = load_topology(&file)?;
            let client = install_topology(&topo, round, &log)?;
            let mut out = std::io::stdout();

            match (json, installed) {
                (false, false) => print_cache(&client.dump_cache())?,
                (false, true) => {
                    let rules = client.installer().installed();
                    print_rules_into(&mut out, &rules)?;
                }
                (true, false) => {
                    let cache = client.dump_cache();
                    serde_json::to_writer_pretty(&mut out, &cache)?;
                    println!();
                }
                (true, true) => {
                    let rules = client.installer().installed();
                    serde_json::to_writer_pretty(&mut out, &rules)?;
                    println!();
                }
            }
        }
    }

    Ok(())
}
