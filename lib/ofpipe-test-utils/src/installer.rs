// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! An installer standing in for the switch.

use ofpipe::install::InstallError;
use ofpipe::install::InstallOp;
use ofpipe::install::RuleInstaller;
use ofpipe::predicate::FlowMeta;
use ofpipe::rule::Rule;
use ofpipe::rule::RuleKey;
use ofpipe::rule_table::FlowTables;
use ofpipe::table::TableId;
use std::sync::Mutex;

/// One call made to the installer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstallRecord {
    pub op: InstallOp,
    pub rules: Vec<Rule>,
}

#[derive(Default)]
struct State {
    tables: FlowTables,
    ops: Vec<InstallRecord>,
    fail_next: Option<InstallError>,
}

impl State {
    fn is_installed(&self, key: &RuleKey) -> bool {
        self.tables
            .get(key.table)
            .is_some_and(|t| t.rules().iter().any(|r| r.key() == *key))
    }
}

/// Keeps rules in a set of [`FlowTables`] the way the switch would,
/// and records every call made to it.
///
/// A failure can be queued with [`RecordingInstaller::fail_next()`];
/// the next call then returns it without touching the tables.
#[derive(Default)]
pub struct RecordingInstaller {
    state: Mutex<State>,
}

impl RecordingInstaller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next call, whatever it is, with `err`.
    pub fn fail_next(&self, err: InstallError) {
        self.state.lock().unwrap().fail_next = Some(err);
    }

    /// Every installed rule, by table and then evaluation order.
    pub fn installed(&self) -> Vec<Rule> {
        self.state.lock().unwrap().tables.rules().cloned().collect()
    }

    pub fn num_installed(&self) -> usize {
        self.state.lock().unwrap().tables.num_rules()
    }

    /// The rule `meta` hits in `table`.
    pub fn lookup(&self, table: TableId, meta: &FlowMeta) -> Option<Rule> {
        self.state.lock().unwrap().tables.lookup(table, meta).cloned()
    }

    /// Lose every installed rule, as a restarted switch does. The
    /// record of calls is kept.
    pub fn reset_switch(&self) {
        self.state.lock().unwrap().tables.clear();
    }

    pub fn ops(&self) -> Vec<InstallRecord> {
        self.state.lock().unwrap().ops.clone()
    }

    pub fn clear_ops(&self) {
        self.state.lock().unwrap().ops.clear();
    }

    fn record(
        &self,
        op: InstallOp,
        rules: &[Rule],
        apply: impl FnOnce(&mut FlowTables, &[Rule]),
    ) -> Result<(), InstallError> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.fail_next.take() {
            return Err(err);
        }

        if op == InstallOp::Modify {
            if let Some(missing) =
                rules.iter().find(|r| !state.is_installed(&r.key()))
            {
                return Err(InstallError::Rejected {
                    op,
                    rule: missing.to_string(),
                    msg: "no such flow".to_string(),
                });
            }
        }

        apply(&mut state.tables, rules);
        state.ops.push(InstallRecord { op, rules: rules.to_vec() });
        Ok(())
    }
}

impl RuleInstaller for RecordingInstaller {
    fn add_rules(&self, rules: &[Rule]) -> Result<(), InstallError> {
        self.record(InstallOp::Add, rules, |tables, rules| {
            for rule in rules {
                let _ = tables.add(rule.clone());
            }
        })
    }

    fn modify_rules(&self, rules: &[Rule]) -> Result<(), InstallError> {
        self.record(InstallOp::Modify, rules, |tables, rules| {
            for rule in rules {
                let _ = tables.modify(rule.clone());
            }
        })
    }

    fn delete_rules(&self, rules: &[Rule]) -> Result<(), InstallError> {
        self.record(InstallOp::Delete, rules, |tables, rules| {
            for rule in rules {
                let _ = tables.delete(&rule.key());
            }
        })
    }
}
