// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! Outcome of a ci runner

use std::fmt;

/// What happened when a runner was launched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunnerStatus {
    /// Not launched yet
    #[default]
    NotRan,
    /// The check passed
    Success,
    /// The check ran and found issues
    CheckFailed,
    /// The check could not run
    Error,
}

impl RunnerStatus {
    /// Whether the check passed
    #[must_use]
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl fmt::Display for RunnerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NotRan => "not ran",
            Self::Success => "success",
            Self::CheckFailed => "check failed",
            Self::Error => "error",
        };
        f.write_str(text)
    }
}
