// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Providers let the engine report on its work without tying it to
//! one logging setup. Tests want plain output they can read next to
//! a failed assertion; the agent and the admin tool want structured
//! logs carrying the feature and key being worked on.

use core::fmt;
use core::fmt::Display;
use slog::Logger;
use slog::error;
use slog::info;
use slog::warn;

/// A logging provider provides the means to log messages to some
/// destination based on the context the engine is running in.
///
/// Logging levels are provided by [`LogLevel`]. These levels will map
/// to the underlying provider with varying degrees of success.
pub trait LogProvider: Send + Sync {
    /// Log a message at the specified level.
    fn log(&self, level: LogLevel, msg: &str);
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LogLevel {
    Note,
    Warn,
    Error,
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let level_s = match self {
            Self::Note => "[NOTE]",
            Self::Warn => "[WARN]",
            Self::Error => "[ERROR]",
        };
        write!(f, "{level_s}")
    }
}

#[derive(Clone, Copy)]
pub struct PrintlnLog;

impl LogProvider for PrintlnLog {
    fn log(&self, level: LogLevel, msg: &str) {
        println!("{level} {msg}");
    }
}

/// Log through an [`slog::Logger`].
#[derive(Clone)]
pub struct SlogLog(pub Logger);

impl LogProvider for SlogLog {
    fn log(&self, level: LogLevel, msg: &str) {
        match level {
            LogLevel::Note => info!(self.0, "{}", msg),
            LogLevel::Warn => warn!(self.0, "{}", msg),
            LogLevel::Error => error!(self.0, "{}", msg),
        }
    }
}
