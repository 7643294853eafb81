// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! Devkit library - building blocks for developer tooling
//!
//! Environment-backed settings, forgiving deserialization, ARN parsing,
//! terminal styles and process helpers, plus the engines behind the `stew`
//! (poetry project orchestration) and `pypi` (version calculator) tools.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod arn;
pub mod commands;
pub mod config;
pub mod flex;
pub mod pypi;
pub mod settings;
pub mod stew;
pub mod styles;
pub mod systools;
pub mod testing;
