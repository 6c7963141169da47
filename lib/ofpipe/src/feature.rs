// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

use crate::cookie::Category;
use crate::rule::BuildError;
use crate::rule::Rule;

/// A pipeline feature: a source of rules owning one cookie category.
pub trait Feature {
    fn name(&self) -> &'static str;

    fn category(&self) -> Category;

    /// The rules installed once, when the pipeline is first set up.
    fn init_rules(&self) -> Result<Vec<Rule>, BuildError>;

    /// Every rule to reinstall after the switch has lost its tables,
    /// exactly as previously installed.
    fn replay_rules(&self) -> Vec<Rule>;
}
