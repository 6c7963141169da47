// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Compute the switch operations taking one rule set to another.

use crate::rule::Rule;
use crate::rule::RuleKey;
use std::collections::BTreeMap;

/// The operations needed to replace one rule set with another.
///
/// `add` and `modify` keep the order of the new set and `delete` keeps
/// the order of the old one, so the relative order synthesis produced
/// is the order the switch sees.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RuleSetDiff {
    pub add: Vec<Rule>,
    pub modify: Vec<Rule>,
    pub delete: Vec<Rule>,
}

impl RuleSetDiff {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.modify.is_empty() && self.delete.is_empty()
    }

    pub fn len(&self) -> usize {
        self.add.len() + self.modify.len() + self.delete.len()
    }
}

/// Diff `old` against `new`, pairing rules by [`RuleKey`].
///
/// A rule whose key is only in `new` is added, and one whose key is
/// only in `old` is deleted. A rule present in both is modified when
/// its actions or cookie changed, and left alone otherwise.
pub fn diff(old: &[Rule], new: &[Rule]) -> RuleSetDiff {
    let old_by_key: BTreeMap<RuleKey, &Rule> =
        old.iter().map(|r| (r.key(), r)).collect();
    let new_by_key: BTreeMap<RuleKey, &Rule> =
        new.iter().map(|r| (r.key(), r)).collect();

    let mut res = RuleSetDiff::default();

    for rule in new {
        match old_by_key.get(&rule.key()) {
            None => res.add.push(rule.clone()),
            Some(prev) => {
                if prev.actions() != rule.actions()
                    || prev.cookie() != rule.cookie()
                {
                    res.modify.push(rule.clone());
                }
            }
        }
    }

    for rule in old {
        if !new_by_key.contains_key(&rule.key()) {
            res.delete.push(rule.clone());
        }
    }

    res
}
