// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! The Multicluster pipeline feature.
//!
//! Traffic between member clusters of a cluster set travels through
//! a tunnel between each cluster's gateway nodes. To tell it apart
//! from ordinary intra-cluster tunnel traffic, cross-cluster packets
//! carry a reserved virtual MAC as their destination. On a gateway,
//! connections to a remote cluster's Services are translated twice:
//! destination first (to pick a Service endpoint), then source (to the
//! local gateway IP) so that replies come back through this gateway.
//!
//! The [`engine`] synthesizes the rules for all of this and keeps the
//! replay cache. The [`client::Client`] drives install, uninstall and
//! replay through a [`ofpipe::install::RuleInstaller`].

#![deny(unreachable_patterns)]
#![deny(unused_must_use)]

pub mod api;
pub mod cfg;
pub mod client;
pub mod engine;
