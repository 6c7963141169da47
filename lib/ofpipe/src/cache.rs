// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! The replay cache.
//!
//! A feature records, under a logical key of its choosing, the rule
//! set it last installed for that key. When the switch loses its
//! tables the cache is exported and every rule is reinstalled exactly
//! as it was, cookies included, without synthesizing anything anew.
//!
//! The cache only ever describes rules; it never talks to the switch.
//! Removing an entry hands back the rules so the caller can delete
//! them from the switch.

use crate::api::CacheEntryDump;
use crate::api::RuleDump;
use crate::cookie::Category;
use crate::rule::Rule;
use core::fmt::Display;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

#[derive(Debug)]
struct Entry {
    // Position of the key in insertion order.
    order: u64,
    rules: Vec<Rule>,
}

#[derive(Debug)]
struct Inner<K> {
    entries: BTreeMap<K, Entry>,
    by_category: BTreeMap<Category, BTreeSet<K>>,
    next_order: u64,
}

impl<K: Clone + Ord> Inner<K> {
    fn index(&mut self, key: &K, rules: &[Rule]) {
        for cat in categories(rules) {
            self.by_category.entry(cat).or_default().insert(key.clone());
        }
    }

    fn unindex(&mut self, key: &K, rules: &[Rule]) {
        for cat in categories(rules) {
            if let Some(keys) = self.by_category.get_mut(&cat) {
                keys.remove(key);
                if keys.is_empty() {
                    self.by_category.remove(&cat);
                }
            }
        }
    }

    fn remove(&mut self, key: &K) -> Option<Vec<Rule>> {
        let entry = self.entries.remove(key)?;
        self.unindex(key, &entry.rules);
        Some(entry.rules)
    }

    fn ordered(&self) -> Vec<(&K, &Entry)> {
        let mut all: Vec<_> = self.entries.iter().collect();
        all.sort_by_key(|(_, e)| e.order);
        all
    }
}

fn categories(rules: &[Rule]) -> BTreeSet<Category> {
    rules.iter().filter_map(|r| r.cookie().category()).collect()
}

/// A map from logical key to the most recent rule set for that key.
///
/// All operations take `&self` and may be called concurrently.
#[derive(Debug)]
pub struct FlowCache<K> {
    inner: Mutex<Inner<K>>,
}

impl<K: Clone + Ord> Default for FlowCache<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Clone + Ord> FlowCache<K> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: BTreeMap::new(),
                by_category: BTreeMap::new(),
                next_order: 0,
            }),
        }
    }

    // Every mutation leaves the maps consistent before it can panic,
    // so a poisoned lock still guards valid state.
    fn lock(&self) -> MutexGuard<'_, Inner<K>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record `rules` under `key`, returning the set it replaces.
    ///
    /// A replaced key keeps its original position in the export order.
    pub fn put(&self, key: K, rules: Vec<Rule>) -> Option<Vec<Rule>> {
        let mut inner = self.lock();

        match inner.entries.get(&key).map(|e| e.order) {
            Some(order) => {
                let old = inner.remove(&key);
                inner.index(&key, &rules);
                inner.entries.insert(key, Entry { order, rules });
                old
            }

            None => {
                let order = inner.next_order;
                inner.next_order += 1;
                inner.index(&key, &rules);
                inner.entries.insert(key, Entry { order, rules });
                None
            }
        }
    }

    pub fn get(&self, key: &K) -> Option<Vec<Rule>> {
        self.lock().entries.get(key).map(|e| e.rules.clone())
    }

    /// Remove `key`, returning its rules, or `None` if the key was not
    /// cached.
    pub fn delete(&self, key: &K) -> Option<Vec<Rule>> {
        self.lock().remove(key)
    }

    /// Every cached rule: keys in insertion order, and each key's rules
    /// in the order they were put.
    pub fn get_all(&self) -> Vec<Rule> {
        let inner = self.lock();
        inner.ordered().into_iter().flat_map(|(_, e)| e.rules.clone()).collect()
    }

    /// The cached keys, in insertion order.
    pub fn keys(&self) -> Vec<K> {
        self.lock().ordered().into_iter().map(|(k, _)| k.clone()).collect()
    }

    /// The keys holding at least one rule owned by `category`.
    pub fn keys_in_category(&self, category: Category) -> Vec<K> {
        self.lock()
            .by_category
            .get(&category)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Remove every key holding a rule owned by `category`.
    ///
    /// The removed entries are returned in insertion order.
    pub fn delete_category(&self, category: Category) -> Vec<(K, Vec<Rule>)> {
        let mut inner = self.lock();
        let Some(keys) = inner.by_category.get(&category).cloned() else {
            return vec![];
        };

        let mut removed: Vec<(u64, K, Vec<Rule>)> = keys
            .into_iter()
            .filter_map(|k| {
                let order = inner.entries.get(&k)?.order;
                let rules = inner.remove(&k)?;
                Some((order, k, rules))
            })
            .collect();
        removed.sort_by_key(|(order, _, _)| *order);
        removed.into_iter().map(|(_, k, rules)| (k, rules)).collect()
    }

    /// The number of cached keys.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The number of cached rules across all keys.
    pub fn num_rules(&self) -> usize {
        self.lock().entries.values().map(|e| e.rules.len()).sum()
    }
}

impl<K: Clone + Ord + Display> FlowCache<K> {
    pub fn dump(&self) -> Vec<CacheEntryDump> {
        self.lock()
            .ordered()
            .into_iter()
            .map(|(k, e)| CacheEntryDump {
                key: k.to_string(),
                rules: e.rules.iter().map(RuleDump::from).collect(),
            })
            .collect()
    }
}
