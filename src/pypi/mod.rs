// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! Package index queries and next-version computation

mod version;

pub use version::{
    sort_versions, Component, LooseVersion, Prerelease, Stage, StrictVersion, VersionError,
};

use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, trace};

/// Errors raised while querying an index
#[derive(Debug, Error)]
pub enum PypiError {
    /// The index could not be reached or answered with an error
    #[error("Cannot query {url}: {source}")]
    Http {
        /// The requested URL
        url: String,
        /// The transport or status error
        #[source]
        source: reqwest::Error,
    },

    /// A version is invalid
    #[error(transparent)]
    Version(#[from] VersionError),

    /// The package already has this version
    #[error("{package}=={version} already exists.")]
    VersionExists {
        /// Package name
        package: String,
        /// The existing version
        version: String,
    },
}

/// Anything that lists the released versions of a package
pub trait VersionSource {
    /// Raw version strings; an unknown package has none
    ///
    /// # Errors
    ///
    /// Fails when the source cannot be queried.
    fn releases(&self, package: &str) -> Result<Vec<String>, PypiError>;
}

#[derive(Debug, Deserialize)]
struct PackageInfo {
    #[serde(default)]
    releases: BTreeMap<String, serde_json::Value>,
}

/// A pypi-compatible index such as `https://pypi.org`
#[derive(Debug, Clone)]
pub struct PypiIndex {
    url: String,
    client: reqwest::blocking::Client,
}

impl PypiIndex {
    /// An index at `url`
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            client: reqwest::blocking::Client::new(),
        }
    }

    /// The index url
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl VersionSource for PypiIndex {
    fn releases(&self, package: &str) -> Result<Vec<String>, PypiError> {
        let url = format!("{}/pypi/{package}/json", self.url);
        let http_error = |source| PypiError::Http {
            url: url.clone(),
            source,
        };
        debug!("GET {url}");

        let response = self.client.get(&url).send().map_err(http_error)?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            debug!("{package} is unknown to {}", self.url);
            return Ok(Vec::new());
        }
        let info: PackageInfo = response
            .error_for_status()
            .map_err(http_error)?
            .json()
            .map_err(http_error)?;
        Ok(info.releases.into_keys().collect())
    }
}

/// Strict versions of a package, newest first unless `oldest_first`
///
/// Versions outside the strict scheme are skipped.
///
/// # Errors
///
/// Fails when the source cannot be queried.
pub fn obtain_versions(
    source: &dyn VersionSource,
    package: &str,
    oldest_first: bool,
) -> Result<Vec<StrictVersion>, PypiError> {
    let mut versions: Vec<StrictVersion> = source
        .releases(package)?
        .iter()
        .filter_map(|raw| {
            StrictVersion::parse(raw)
                .map_err(|error| trace!("skipping {raw}: {error}"))
                .ok()
        })
        .collect();
    sort_versions(&mut versions, oldest_first);
    Ok(versions)
}

/// All versions of a package, whatever their scheme
///
/// # Errors
///
/// Fails when the source cannot be queried.
pub fn obtain_loose_versions(
    source: &dyn VersionSource,
    package: &str,
    oldest_first: bool,
) -> Result<Vec<LooseVersion>, PypiError> {
    let mut versions: Vec<LooseVersion> = source
        .releases(package)?
        .iter()
        .map(|raw| LooseVersion::new(raw))
        .collect();
    sort_versions(&mut versions, oldest_first);
    Ok(versions)
}

/// The most recent version that is not a prerelease
///
/// # Errors
///
/// Fails when the source cannot be queried.
pub fn obtain_latest_release(
    source: &dyn VersionSource,
    package: &str,
) -> Result<Option<StrictVersion>, PypiError> {
    Ok(obtain_versions(source, package, false)?
        .into_iter()
        .find(|version| !version.is_prerelease()))
}

/// Fail when `version` was already released
///
/// # Errors
///
/// `VersionExists` when the version is listed, or a query error.
pub fn raise_if_exists(source: &dyn VersionSource, package: &str, version: &str) -> Result<(), PypiError> {
    if source.releases(package)?.iter().any(|release| release == version) {
        return Err(PypiError::VersionExists {
            package: package.to_string(),
            version: version.to_string(),
        });
    }
    Ok(())
}

/// The version to publish next
///
/// The latest version (prereleases included) is bumped to the next release,
/// or the next prerelease. A `minimum` above it wins; for a prerelease the
/// minimum becomes its first prerelease, `2.0` giving `2.0.0a1`.
///
/// # Errors
///
/// Fails when the minimum is a prerelease or below `0.0.1`, or when the
/// source cannot be queried.
pub fn compute_next_version(
    source: &dyn VersionSource,
    package: &str,
    prerelease: bool,
    minimum: &str,
) -> Result<StrictVersion, PypiError> {
    let mut lower_bound = StrictVersion::parse(minimum)?;
    if lower_bound.is_prerelease() {
        return Err(VersionError::PrereleaseMinimum(minimum.to_string()).into());
    }
    if lower_bound < StrictVersion::new(0, 0, 1) {
        return Err(VersionError::MinimumTooLow(minimum.to_string()).into());
    }

    if prerelease {
        lower_bound.bump_next_prerelease(false);
    }

    let Some(mut latest) = obtain_versions(source, package, false)?.into_iter().next() else {
        return Ok(lower_bound);
    };

    if prerelease {
        latest.bump_next_prerelease(true);
    } else {
        latest.bump_next_release();
    }

    Ok(lower_bound.max(latest))
}

/// The default lowest version to publish
pub const DEFAULT_MINIMUM_VERSION: &str = "0.0.1";
