// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! Resources created for a test and deleted afterwards

use std::ops::{Deref, DerefMut};
use tracing::{debug, warn};

/// Something a test creates outside of the process, such as a queue or a bucket
pub trait TemporaryResource {
    /// Create the resource
    ///
    /// # Errors
    ///
    /// Whatever prevented the creation.
    fn create_resource(&mut self) -> anyhow::Result<()>;

    /// Delete the resource and everything it created
    ///
    /// # Errors
    ///
    /// Whatever prevented the deletion.
    fn delete_resource(&mut self) -> anyhow::Result<()>;

    /// Create the resource and delete it when the guard goes out of scope
    ///
    /// # Errors
    ///
    /// Creation errors. Nothing is deleted then.
    fn auto_delete(mut self) -> anyhow::Result<AutoDelete<Self>>
    where
        Self: Sized,
    {
        self.create_resource()?;
        Ok(AutoDelete {
            resource: self,
            deleted: false,
        })
    }
}

/// Deletes its resource once, on [`AutoDelete::delete`] or on drop
///
/// Deletion errors on drop are logged, not raised.
#[derive(Debug)]
pub struct AutoDelete<R: TemporaryResource> {
    resource: R,
    deleted: bool,
}

impl<R: TemporaryResource> AutoDelete<R> {
    /// Delete the resource now, reporting failures
    ///
    /// # Errors
    ///
    /// Whatever prevented the deletion.
    pub fn delete(mut self) -> anyhow::Result<()> {
        self.deleted = true;
        self.resource.delete_resource()
    }
}

impl<R: TemporaryResource> Deref for AutoDelete<R> {
    type Target = R;

    fn deref(&self) -> &R {
        &self.resource
    }
}

impl<R: TemporaryResource> DerefMut for AutoDelete<R> {
    fn deref_mut(&mut self) -> &mut R {
        &mut self.resource
    }
}

impl<R: TemporaryResource> Drop for AutoDelete<R> {
    fn drop(&mut self) {
        if !self.deleted {
            self.deleted = true;
            match self.resource.delete_resource() {
                Ok(()) => debug!("deleted temporary resource"),
                Err(error) => warn!(error = %error, "failed to delete temporary resource"),
            }
        }
    }
}
