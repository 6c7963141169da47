// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! The seam between rule synthesis and the switch.
//!
//! Encoding rules for the switch's control channel and managing that
//! channel is the job of a [`RuleInstaller`]. Rules are always handed
//! over as ordered slices, and an installer must apply them in that
//! order (or atomically).

use crate::diff::RuleSetDiff;
use crate::rule::Rule;
use core::fmt;
use core::fmt::Display;
use thiserror::Error;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InstallOp {
    Add,
    Modify,
    Delete,
}

impl Display for InstallOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::Add => "add",
            Self::Modify => "modify",
            Self::Delete => "delete",
        };
        write!(f, "{s}")
    }
}

#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum InstallError {
    #[error("switch rejected {op} of {rule}: {msg}")]
    Rejected { op: InstallOp, rule: String, msg: String },

    #[error("switch unavailable: {0}")]
    Unavailable(String),
}

pub trait RuleInstaller: Send + Sync {
    fn add_rules(&self, rules: &[Rule]) -> Result<(), InstallError>;

    /// Replace the actions and cookie of installed rules with the same
    /// [`crate::rule::RuleKey`].
    fn modify_rules(&self, rules: &[Rule]) -> Result<(), InstallError>;

    fn delete_rules(&self, rules: &[Rule]) -> Result<(), InstallError>;

    /// Apply a diff: additions first, then modifications, then
    /// deletions. Empty operations are skipped.
    fn apply(&self, diff: &RuleSetDiff) -> Result<(), InstallError> {
        if !diff.add.is_empty() {
            self.add_rules(&diff.add)?;
        }
        if !diff.modify.is_empty() {
            self.modify_rules(&diff.modify)?;
        }
        if !diff.delete.is_empty() {
            self.delete_rules(&diff.delete)?;
        }
        Ok(())
    }
}
