// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! An in-memory model of the rules installed in the switch.
//!
//! The switch keeps, per table, a list of rules evaluated by priority
//! and then by insertion order; installing a rule whose
//! [`RuleKey`] is already present replaces the installed one. This
//! module keeps the same structure so installers which don't talk to
//! a real switch (dry runs, tests) can still answer "which rule would
//! this packet hit".

use crate::predicate::FlowMeta;
use crate::rule::Rule;
use crate::rule::RuleKey;
use crate::table::TableId;
use std::collections::BTreeMap;

#[derive(Debug, Eq, PartialEq)]
pub enum RulePlace {
    Insert(usize),
    End,
    Replace(usize),
}

/// The rules of a single table, in evaluation order.
#[derive(Clone, Debug, Default)]
pub struct RuleTable {
    rules: Vec<Rule>,
}

impl RuleTable {
    /// Install `rule`, returning the rule it replaced, if any.
    pub fn add(&mut self, rule: Rule) -> Option<Rule> {
        match self.find_pos(&rule) {
            RulePlace::End => {
                self.rules.push(rule);
                None
            }

            RulePlace::Insert(idx) => {
                self.rules.insert(idx, rule);
                None
            }

            RulePlace::Replace(idx) => {
                Some(core::mem::replace(&mut self.rules[idx], rule))
            }
        }
    }

    // Find the position in which to insert this rule. Higher priority
    // rules come first; at equal priority the newer rule goes last.
    fn find_pos(&self, rule: &Rule) -> RulePlace {
        let key = rule.key();
        if let Some(idx) = self.rules.iter().position(|r| r.key() == key) {
            return RulePlace::Replace(idx);
        }

        for (i, r) in self.rules.iter().enumerate() {
            if rule.priority() > r.priority() {
                return RulePlace::Insert(i);
            }
        }

        RulePlace::End
    }

    /// Find the first rule matching `meta`.
    pub fn find_match(&self, meta: &FlowMeta) -> Option<&Rule> {
        self.rules.iter().find(|r| r.is_match(meta))
    }

    /// Replace the actions and cookie of the rule with the same key.
    /// Returns the previous rule, or `None` if no rule has the key.
    pub fn modify(&mut self, rule: Rule) -> Option<Rule> {
        let key = rule.key();
        let idx = self.rules.iter().position(|r| r.key() == key)?;
        Some(core::mem::replace(&mut self.rules[idx], rule))
    }

    pub fn remove(&mut self, key: &RuleKey) -> Option<Rule> {
        let idx = self.rules.iter().position(|r| r.key() == *key)?;
        Some(self.rules.remove(idx))
    }

    pub fn num_rules(&self) -> usize {
        self.rules.len()
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }
}

/// Every table of the switch.
#[derive(Clone, Debug, Default)]
pub struct FlowTables {
    tables: BTreeMap<TableId, RuleTable>,
}

impl FlowTables {
    pub fn add(&mut self, rule: Rule) -> Option<Rule> {
        self.tables.entry(rule.table().id).or_default().add(rule)
    }

    pub fn modify(&mut self, rule: Rule) -> Option<Rule> {
        self.tables.get_mut(&rule.table().id)?.modify(rule)
    }

    pub fn delete(&mut self, key: &RuleKey) -> Option<Rule> {
        let table = self.tables.get_mut(&key.table)?;
        let res = table.remove(key);
        if table.num_rules() == 0 {
            self.tables.remove(&key.table);
        }
        res
    }

    pub fn get(&self, table: TableId) -> Option<&RuleTable> {
        self.tables.get(&table)
    }

    /// Find the rule `meta` hits in `table`.
    pub fn lookup(&self, table: TableId, meta: &FlowMeta) -> Option<&Rule> {
        self.tables.get(&table)?.find_match(meta)
    }

    /// Every installed rule, by table and then evaluation order.
    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.tables.values().flat_map(|t| t.rules().iter())
    }

    pub fn num_rules(&self) -> usize {
        self.tables.values().map(RuleTable::num_rules).sum()
    }

    /// Forget every rule, as the switch does when it restarts.
    pub fn clear(&mut self) {
        self.tables.clear();
    }
}
