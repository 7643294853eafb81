// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! Helpers for tests that share external resources

pub mod resource;
pub mod wait;

use chrono::Local;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

/// Separates the parts of a [`TestId`]
pub const DELIMITER: char = '.';

const REPLACEMENT: char = '-';

struct Process {
    timestamp: String,
    pid: String,
    host: String,
    executor: String,
}

static PROCESS: Lazy<Process> = Lazy::new(|| Process {
    timestamp: Local::now().format("%m%d%H%M%S").to_string(),
    pid: std::process::id().to_string(),
    host: host_name(),
    executor: std::env::var("EXECUTOR_NUMBER").unwrap_or_else(|_| "default".to_string()),
});

static SEQUENCES: Lazy<Mutex<HashMap<String, u64>>> = Lazy::new(|| Mutex::new(HashMap::new()));

fn host_name() -> String {
    ["HOSTNAME", "COMPUTERNAME"]
        .iter()
        .find_map(|key| std::env::var(key).ok())
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|host| host.trim().to_string())
        .filter(|host| !host.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

/// Keep `[A-Za-z0-9_-]`, replace everything else (the delimiter included)
fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { REPLACEMENT })
        .collect()
}

/// A unique-enough, human-readable id for resources created by tests
///
/// Made of the friendly name, the process start time, the pid, the host,
/// the `EXECUTOR_NUMBER` variable and a per-name sequence number. Threads
/// get different sequence numbers, processes different pids and CI
/// executors different labels.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TestId {
    friendly_name: String,
    sequence: u64,
    id: String,
}

impl TestId {
    /// Next id for `friendly_name`
    pub fn new(friendly_name: impl Into<String>) -> Self {
        let friendly_name = friendly_name.into();
        let sequence = {
            let mut sequences = SEQUENCES.lock().unwrap_or_else(PoisonError::into_inner);
            let next = sequences.entry(friendly_name.clone()).or_insert(0);
            let sequence = *next;
            *next += 1;
            sequence
        };

        let process = &*PROCESS;
        let sequence_part = sequence.to_string();
        let id = [
            friendly_name.as_str(),
            process.timestamp.as_str(),
            process.pid.as_str(),
            process.host.as_str(),
            process.executor.as_str(),
            sequence_part.as_str(),
        ]
        .iter()
        .map(|part| sanitize(part))
        .collect::<Vec<_>>()
        .join(&DELIMITER.to_string());

        Self {
            friendly_name,
            sequence,
            id,
        }
    }

    /// The name given at creation
    #[must_use]
    pub fn friendly_name(&self) -> &str {
        &self.friendly_name
    }

    /// How many ids were created for this name before this one
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// The full id
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}
