// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! Process, stream and filesystem helpers

mod filesystem;
mod process;
mod streams;

pub use filesystem::{
    find_application, find_paths, find_repo_root, replace_if_different, require_application,
    safe_text_write, FilesystemError, SearchScope,
};
pub use process::{
    build_command, check_call, check_output, check_run, DetailedProcessError, ProcessError,
    RunOptions,
};
pub use streams::filter_ansi;
