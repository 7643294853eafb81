// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! Amazon Resource Name parsing
//!
//! ```
//! use devkit::arn::Arn;
//!
//! let arn: Arn = "arn:aws:ssm:us-east-1:123:parameter/a/b".parse().unwrap();
//! assert_eq!(arn.resource_type(), "parameter");
//! assert_eq!(arn.resource_id(), "a/b");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const PREFIX: &str = "arn";

/// ARN parsing errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArnError {
    /// The value does not start with `arn:`
    #[error("{0:?} is not an ARN: it must start with \"arn:\"")]
    MissingPrefix(String),

    /// The value has fewer than six `:`-separated parts
    #[error("{0:?} is not an ARN: expected arn:partition:service:region:account:resource")]
    MissingParts(String),
}

/// An Amazon Resource Name
///
/// `arn:partition:service:region:account-id:resource`, where the resource
/// may itself contain `:` or `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Arn {
    partition: String,
    service: String,
    region: String,
    account: String,
    resource: String,
}

/// The partition of ARNs built with [`Arn::new`]
pub const DEFAULT_PARTITION: &str = "aws";

impl Arn {
    /// An ARN in the [`DEFAULT_PARTITION`], without region or account
    #[must_use]
    pub fn new(service: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            partition: DEFAULT_PARTITION.to_string(),
            service: service.into(),
            region: String::new(),
            account: String::new(),
            resource: resource.into(),
        }
    }

    /// Set the partition
    #[must_use]
    pub fn with_partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = partition.into();
        self
    }

    /// Set the region
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Set the account id
    #[must_use]
    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = account.into();
        self
    }

    /// Parse an ARN
    ///
    /// Parts are kept as written: an empty partition stays empty.
    ///
    /// # Errors
    ///
    /// Returns [`ArnError`] when the prefix or a part is missing.
    pub fn parse(value: &str) -> Result<Self, ArnError> {
        let mut parts = value.splitn(6, ':');
        if parts.next() != Some(PREFIX) {
            return Err(ArnError::MissingPrefix(value.to_string()));
        }

        let mut next = || {
            parts
                .next()
                .map(str::to_string)
                .ok_or_else(|| ArnError::MissingParts(value.to_string()))
        };
        Ok(Self {
            partition: next()?,
            service: next()?,
            region: next()?,
            account: next()?,
            resource: next()?,
        })
    }

    /// The partition, usually `aws`
    #[must_use]
    pub fn partition(&self) -> &str {
        &self.partition
    }

    /// The service namespace, e.g. `ssm`
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// The region; empty for global resources
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// The account id; empty for some resources such as S3 buckets
    #[must_use]
    pub fn account(&self) -> &str {
        &self.account
    }

    /// The full resource part
    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// The resource type: whatever precedes the first `:` or `/`
    ///
    /// Empty when the resource has no separator.
    #[must_use]
    pub fn resource_type(&self) -> &str {
        self.split_resource().map_or("", |(kind, _)| kind)
    }

    /// The resource id: whatever follows the first `:` or `/`
    ///
    /// Empty when the resource has no separator.
    #[must_use]
    pub fn resource_id(&self) -> &str {
        self.split_resource().map_or("", |(_, id)| id)
    }

    fn split_resource(&self) -> Option<(&str, &str)> {
        let index = self.resource.find(|c| c == ':' || c == '/')?;
        Some((&self.resource[..index], &self.resource[index + 1..]))
    }
}

impl FromStr for Arn {
    type Err = ArnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Arn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{PREFIX}:{}:{}:{}:{}:{}",
            self.partition, self.service, self.region, self.account, self.resource
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ssm_parameter() {
        let arn = Arn::parse("arn:aws:ssm:us-east-1:123:parameter/a/b").unwrap();
        assert_eq!(arn.partition(), "aws");
        assert_eq!(arn.service(), "ssm");
        assert_eq!(arn.region(), "us-east-1");
        assert_eq!(arn.account(), "123");
        assert_eq!(arn.resource(), "parameter/a/b");
        assert_eq!(arn.resource_type(), "parameter");
        assert_eq!(arn.resource_id(), "a/b");
    }

    #[test]
    fn test_colon_separated_resource() {
        let arn: Arn = "arn:aws:lambda:us-east-1:123456789012:function:my-function:1"
            .parse()
            .unwrap();
        assert_eq!(arn.resource_type(), "function");
        assert_eq!(arn.resource_id(), "my-function:1");
    }

    #[test]
    fn test_resource_without_separator() {
        let arn = Arn::parse("arn:aws:s3:::my_corporate_bucket").unwrap();
        assert_eq!(arn.region(), "");
        assert_eq!(arn.account(), "");
        assert_eq!(arn.resource(), "my_corporate_bucket");
        assert_eq!(arn.resource_type(), "");
        assert_eq!(arn.resource_id(), "");
    }

    #[test]
    fn test_display_round_trips() {
        let text = "arn:aws:iam::123456789012:user/Development/product_1234/*";
        assert_eq!(Arn::parse(text).unwrap().to_string(), text);
    }

    #[test]
    fn test_built_arn_defaults_to_aws_partition() {
        let arn = Arn::new("ssm", "parameter/a").with_region("us-east-1").with_account("123");
        assert_eq!(arn.partition(), DEFAULT_PARTITION);
        assert_eq!(arn.to_string(), "arn:aws:ssm:us-east-1:123:parameter/a");
        assert_eq!(Arn::parse(&arn.to_string()).unwrap(), arn);

        let china = Arn::new("s3", "bucket").with_partition("aws-cn");
        assert_eq!(china.to_string(), "arn:aws-cn:s3:::bucket");

        // parsing keeps what is written
        assert_eq!(Arn::parse("arn::s3:::bucket").unwrap().partition(), "");
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            Arn::parse("nope:aws:s3:::bucket"),
            Err(ArnError::MissingPrefix(_))
        ));
        assert!(matches!(
            Arn::parse("arn:aws:s3"),
            Err(ArnError::MissingParts(_))
        ));
    }
}
