// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Serializable snapshots of rules and replay caches.

use serde::Deserialize;
use serde::Serialize;

/// A snapshot of a single finalized rule.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RuleDump {
    /// The name of the table the rule lives in.
    pub table: String,
    pub table_id: u8,
    pub priority: u16,
    pub cookie: u64,
    /// The name of the feature owning the cookie.
    pub category: String,
    /// The match predicates, in switch syntax.
    pub matches: Vec<String>,
    /// The actions, in switch syntax and in execution order.
    pub actions: Vec<String>,
}

/// The rule set cached under a single key.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct CacheEntryDump {
    pub key: String,
    pub rules: Vec<RuleDump>,
}

/// The replay cache of a feature.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct DumpCacheResp {
    pub feature: String,
    pub entries: Vec<CacheEntryDump>,
}

impl DumpCacheResp {
    /// The total number of rules across every entry.
    pub fn num_rules(&self) -> usize {
        self.entries.iter().map(|e| e.rules.len()).sum()
    }
}
