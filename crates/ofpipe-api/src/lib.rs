// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Types shared by the flow pipeline engine, the features built on
//! top of it, and the administration tooling.

#![deny(unreachable_patterns)]
#![deny(unused_must_use)]

pub mod dump;
pub mod ip;
pub mod mac;

pub use dump::*;
pub use ip::*;
pub use mac::*;

/// The overall version of the API. Anytime a dump or configuration
/// type is added, removed, or modified, this number should increment.
pub const API_VERSION: u64 = 1;
