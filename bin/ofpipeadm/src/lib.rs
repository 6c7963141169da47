// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Routines shared by the ofpipeadm subcommands.

use anyhow::Context;
use multicluster::cfg::Topology;
use multicluster::client::Client;
use multicluster::engine::Multicluster;
use ofpipe::ExecCtx;
use ofpipe::SlogLog;
use ofpipe::api::RuleDump;
use ofpipe::cookie::Allocator;
use ofpipe::install::InstallError;
use ofpipe::install::InstallOp;
use ofpipe::install::RuleInstaller;
use ofpipe::rule::Rule;
use ofpipe::rule_table::FlowTables;
use ofpipe::table::Pipeline;
use slog::Logger;
use slog::debug;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

/// An installer which logs what it would send to the switch and keeps
/// the result in memory.
pub struct DryRunInstaller {
    tables: Mutex<FlowTables>,
    log: Logger,
}

impl DryRunInstaller {
    pub fn new(log: Logger) -> Self {
        Self { tables: Mutex::new(FlowTables::default()), log }
    }

    /// Every rule the switch would hold.
    pub fn installed(&self) -> Vec<RuleDump> {
        let tables =
            self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        tables.rules().map(RuleDump::from).collect()
    }

    fn apply(
        &self,
        op: InstallOp,
        rules: &[Rule],
        f: impl Fn(&mut FlowTables, &Rule),
    ) -> Result<(), InstallError> {
        let mut tables =
            self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        for rule in rules {
            debug!(self.log, "{} {}", op, rule);
            f(&mut *tables, rule);
        }
        Ok(())
    }
}

impl RuleInstaller for DryRunInstaller {
    fn add_rules(&self, rules: &[Rule]) -> Result<(), InstallError> {
        self.apply(InstallOp::Add, rules, |t, r| {
            let _ = t.add(r.clone());
        })
    }

    fn modify_rules(&self, rules: &[Rule]) -> Result<(), InstallError> {
        self.apply(InstallOp::Modify, rules, |t, r| {
            let _ = t.modify(r.clone());
        })
    }

    fn delete_rules(&self, rules: &[Rule]) -> Result<(), InstallError> {
        self.apply(InstallOp::Delete, rules, |t, r| {
            let _ = t.delete(&r.key());
        })
    }
}

/// Read a topology file.
pub fn load_topology(path: &Path) -> anyhow::Result<Topology> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    toml::from_str(&s)
        .with_context(|| format!("failed to parse {}", path.display()))
}

/// Synthesize and install every rule `topo` calls for.
pub fn install_topology(
    topo: &Topology,
    round: u16,
    log: &Logger,
) -> anyhow::Result<Client<DryRunInstaller>> {
    let mc = Multicluster::new(
        Arc::new(Allocator::new(round)),
        Pipeline::default(),
        &topo.multicluster,
    )
    .context("bad multicluster config")?;

    let client = Client::new(
        mc,
        topo.node.clone(),
        DryRunInstaller::new(log.clone()),
        ExecCtx { log: Box::new(SlogLog(log.clone())) },
    );

    client
        .install_classifier_flows(topo.node.tunnel_port, topo.node.is_gateway)
        .context("failed to install classifier rules")?;

    for cluster in &topo.clusters {
        client.install_cluster_flows(cluster).with_context(|| {
            format!("failed to install rules for cluster {}", cluster.id)
        })?;
    }

    Ok(client)
}
