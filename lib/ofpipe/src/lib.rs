// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! The flow pipeline engine.
//!
//! This crate turns routing and NAT intent into immutable match-action
//! rules scoped to the tables of a multi-table switch pipeline. It
//! provides the pieces every pipeline feature is built from:
//!
//! * [`cookie`]: the per-feature rule identifiers.
//! * [`table`]: the static registry of pipeline tables.
//! * [`predicate`], [`action`], [`fields`]: what a rule matches and does.
//! * [`rule`]: the rule builder and the finalized [`rule::Rule`].
//! * [`ct`]: conntrack zone assignment per IP protocol.
//! * [`cache`]: the replay cache used to reinstall rules verbatim.
//! * [`diff`], [`install`]: the seam to the dataplane installer.

#![deny(unreachable_patterns)]
#![deny(unused_must_use)]

pub use ofpipe_api as api;

pub mod action;
pub mod cache;
pub mod cookie;
pub mod ct;
pub mod diff;
pub mod feature;
pub mod fields;
pub mod install;
pub mod predicate;
pub mod print;
pub mod provider;
pub mod rule;
pub mod rule_table;
pub mod table;

pub use provider::*;

/// The execution context handed to components which need to report
/// on what they are doing.
pub struct ExecCtx {
    pub log: Box<dyn LogProvider>,
}
