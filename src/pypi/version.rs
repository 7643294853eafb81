// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! Release version numbers

use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised by version handling
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    /// Not `major.minor[.patch][a|bN]`
    #[error("invalid version number '{0}'")]
    Invalid(String),

    /// The minimum version is a prerelease
    #[error("Minimum version {0} cannot be a pre-release.")]
    PrereleaseMinimum(String),

    /// The minimum version is below 0.0.1
    #[error("Minimum version {0} must be 0.0.1 or higher.")]
    MinimumTooLow(String),
}

static STRICT: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^(\d+)\.(\d+)(?:\.(\d+))?(?:([ab])(\d+))?$").ok());

/// Alpha or beta
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// `a`
    Alpha,
    /// `b`
    Beta,
}

impl Stage {
    fn letter(self) -> char {
        match self {
            Self::Alpha => 'a',
            Self::Beta => 'b',
        }
    }
}

/// A prerelease marker such as `a1`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Prerelease {
    /// Alpha or beta
    pub stage: Stage,
    /// Prerelease number
    pub number: u64,
}

/// A strict `major.minor[.patch][a|bN]` version
///
/// A missing patch is zero: `3.8` equals `3.8.0`. A prerelease sorts
/// before its release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StrictVersion {
    /// Major number
    pub major: u64,
    /// Minor number
    pub minor: u64,
    /// Patch number
    pub patch: u64,
    /// Prerelease marker, if any
    pub prerelease: Option<Prerelease>,
}

impl StrictVersion {
    /// A release version
    #[must_use]
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            prerelease: None,
        }
    }

    /// Parse a version
    ///
    /// # Errors
    ///
    /// Fails when the text is not a strict version.
    pub fn parse(text: &str) -> Result<Self, VersionError> {
        let invalid = || VersionError::Invalid(text.to_string());
        let captures = STRICT.as_ref().and_then(|re| re.captures(text)).ok_or_else(invalid)?;
        let number = |index: usize| -> Result<u64, VersionError> {
            captures
                .get(index)
                .map_or(Ok(0), |m| m.as_str().parse().map_err(|_| invalid()))
        };

        let prerelease = match (captures.get(4), captures.get(5)) {
            (Some(stage), Some(_)) => Some(Prerelease {
                stage: if stage.as_str() == "a" { Stage::Alpha } else { Stage::Beta },
                number: number(5)?,
            }),
            _ => None,
        };

        Ok(Self {
            major: number(1)?,
            minor: number(2)?,
            patch: number(3)?,
            prerelease,
        })
    }

    /// Whether this is a prerelease
    #[must_use]
    pub fn is_prerelease(&self) -> bool {
        self.prerelease.is_some()
    }

    /// Move to the next release
    ///
    /// `1.4.4` becomes `1.4.5`; a prerelease such as `1.4.5a3` becomes `1.4.5`.
    pub fn bump_next_release(&mut self) {
        if self.prerelease.is_none() {
            self.patch += 1;
        }
        self.prerelease = None;
    }

    /// Move to the next prerelease
    ///
    /// `1.4.5a4` becomes `1.4.5a5`. A release such as `1.4.4` becomes
    /// `1.4.5a1`, or `1.4.4a1` when `patch` is false.
    pub fn bump_next_prerelease(&mut self, patch: bool) {
        match &mut self.prerelease {
            Some(prerelease) => prerelease.number += 1,
            None => {
                self.patch += u64::from(patch);
                self.prerelease = Some(Prerelease {
                    stage: Stage::Alpha,
                    number: 1,
                });
            }
        }
    }
}

impl Ord for StrictVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (&self.prerelease, &other.prerelease) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(mine), Some(theirs)) => mine.cmp(theirs),
            })
    }
}

impl PartialOrd for StrictVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for StrictVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for StrictVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(prerelease) = &self.prerelease {
            write!(f, "{}{}", prerelease.stage.letter(), prerelease.number)?;
        }
        Ok(())
    }
}

// =========================================================================
// Loose versions
// =========================================================================

/// One piece of a [`LooseVersion`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Component {
    /// A run of digits
    Number(u64),
    /// A run of letters
    Text(String),
}

impl PartialOrd for Component {
    /// Numbers and text do not compare
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Number(mine), Self::Number(theirs)) => Some(mine.cmp(theirs)),
            (Self::Text(mine), Self::Text(theirs)) => Some(mine.cmp(theirs)),
            _ => None,
        }
    }
}

/// Any version string, compared piece by piece
///
/// Accepts versions that do not follow the strict scheme, such as
/// `2.0.dev1` or `2021.3.post2`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LooseVersion {
    text: String,
    components: Vec<Component>,
}

impl LooseVersion {
    /// Split a version into numbers and letters
    #[must_use]
    pub fn new(text: &str) -> Self {
        let mut components = Vec::new();
        let mut chars = text.chars().peekable();
        while let Some(&c) = chars.peek() {
            if c.is_ascii_digit() {
                let mut run = String::new();
                while let Some(&d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                    run.push(d);
                    chars.next();
                }
                components.push(
                    run.parse()
                        .map_or_else(|_| Component::Text(run), Component::Number),
                );
            } else if c.is_ascii_lowercase() {
                let mut run = String::new();
                while let Some(&l) = chars.peek().filter(|l| l.is_ascii_lowercase()) {
                    run.push(l);
                    chars.next();
                }
                components.push(Component::Text(run));
            } else if c == '.' {
                chars.next();
            } else {
                // anything else between the pieces is kept verbatim: `RC`, `-`, `+local`
                let mut run = String::new();
                while let Some(&o) = chars
                    .peek()
                    .filter(|o| !o.is_ascii_digit() && !o.is_ascii_lowercase() && **o != '.')
                {
                    run.push(o);
                    chars.next();
                }
                components.push(Component::Text(run));
            }
        }

        Self {
            text: text.to_string(),
            components,
        }
    }

    /// The pieces of the version
    #[must_use]
    pub fn components(&self) -> &[Component] {
        &self.components
    }
}

impl PartialOrd for LooseVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        for (mine, theirs) in self.components.iter().zip(&other.components) {
            match mine.partial_cmp(theirs)? {
                Ordering::Equal => continue,
                unequal => return Some(unequal),
            }
        }
        Some(self.components.len().cmp(&other.components.len()))
    }
}

impl fmt::Display for LooseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Sort versions, newest first unless `oldest_first`
///
/// When two versions cannot be compared, the whole list is sorted as text.
pub fn sort_versions<V: PartialOrd + fmt::Display>(versions: &mut [V], oldest_first: bool) {
    let mut incomparable = false;
    versions.sort_by(|a, b| {
        a.partial_cmp(b).unwrap_or_else(|| {
            incomparable = true;
            Ordering::Equal
        })
    });
    if incomparable {
        versions.sort_by_cached_key(ToString::to_string);
    }
    if !oldest_first {
        versions.reverse();
    }
}
