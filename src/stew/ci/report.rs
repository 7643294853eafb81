// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! JUnit XML reports for runners that do not write their own

use super::status::RunnerStatus;
use crate::stew::StewError;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::fs;
use std::path::Path;

/// One `<testcase>` of a report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    /// Case name, the runner's
    pub name: String,
    /// Grouping, usually `ci.<project>`
    pub classname: String,
    /// The outcome
    pub status: RunnerStatus,
    /// Whatever the runner printed
    pub output: Vec<String>,
}

impl TestCase {
    /// A case for `runner` on `project`
    pub fn new(runner: &str, project: &str, status: RunnerStatus, output: &[String]) -> Self {
        Self {
            name: runner.to_string(),
            classname: format!("ci.{project}"),
            status,
            output: output.to_vec(),
        }
    }
}

/// Render a report with a single suite
///
/// # Errors
///
/// Fails when the XML cannot be produced.
pub fn render_junit_report(suite: &str, cases: &[TestCase]) -> Result<String, quick_xml::Error> {
    let failures = cases.iter().filter(|case| case.status == RunnerStatus::CheckFailed).count();
    let errors = cases.iter().filter(|case| case.status == RunnerStatus::Error).count();
    let skipped = cases.iter().filter(|case| case.status == RunnerStatus::NotRan).count();
    let (tests, failures, errors, skipped) = (
        cases.len().to_string(),
        failures.to_string(),
        errors.to_string(),
        skipped.to_string(),
    );

    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new("testsuites")))?;

    let mut start = BytesStart::new("testsuite");
    start.push_attribute(("name", suite));
    start.push_attribute(("tests", tests.as_str()));
    start.push_attribute(("failures", failures.as_str()));
    start.push_attribute(("errors", errors.as_str()));
    start.push_attribute(("skipped", skipped.as_str()));
    writer.write_event(Event::Start(start))?;

    for case in cases {
        let mut start = BytesStart::new("testcase");
        start.push_attribute(("name", case.name.as_str()));
        start.push_attribute(("classname", case.classname.as_str()));
        writer.write_event(Event::Start(start))?;

        let output = case.output.join("\n");
        let detail = match case.status {
            RunnerStatus::Success => None,
            RunnerStatus::CheckFailed => Some(("failure", "The check reported issues.")),
            RunnerStatus::Error => Some(("error", "The check could not complete.")),
            RunnerStatus::NotRan => Some(("skipped", "The check did not run.")),
        };
        if let Some((element, message)) = detail {
            let mut start = BytesStart::new(element);
            start.push_attribute(("message", message));
            writer.write_event(Event::Start(start))?;
            writer.write_event(Event::Text(BytesText::new(&output)))?;
            writer.write_event(Event::End(BytesEnd::new(element)))?;
        } else if !output.is_empty() {
            writer.write_event(Event::Start(BytesStart::new("system-out")))?;
            writer.write_event(Event::Text(BytesText::new(&output)))?;
            writer.write_event(Event::End(BytesEnd::new("system-out")))?;
        }

        writer.write_event(Event::End(BytesEnd::new("testcase")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("testsuite")))?;
    writer.write_event(Event::End(BytesEnd::new("testsuites")))?;
    Ok(String::from_utf8_lossy(&writer.into_inner()).into_owned())
}

/// Write a report to `path`, creating its folder
///
/// # Errors
///
/// Fails on I/O errors.
pub fn write_junit_report(path: &Path, suite: &str, cases: &[TestCase]) -> Result<(), StewError> {
    let xml = render_junit_report(suite, cases)
        .map_err(|error| StewError::Project(format!("Cannot write the report {}: {error}", path.display())))?;
    if let Some(folder) = path.parent() {
        fs::create_dir_all(folder).map_err(StewError::io("Cannot create", folder))?;
    }
    fs::write(path, xml).map_err(StewError::io("Cannot write", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_render_counts_and_escapes() {
        let cases = vec![
            TestCase::new("black", "my-lib", RunnerStatus::Success, &[]),
            TestCase::new(
                "flake8",
                "my-lib",
                RunnerStatus::CheckFailed,
                &["lib/a.py:1:1: E302 <expected> 2 blank lines".to_string()],
            ),
        ];
        let xml = render_junit_report("flake8", &cases).unwrap();

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>"));
        assert!(xml.contains("tests=\"2\""));
        assert!(xml.contains("failures=\"1\""));
        assert!(xml.contains("errors=\"0\""));
        assert!(xml.contains("classname=\"ci.my-lib\""));
        assert!(xml.contains("&lt;expected&gt;"));
        assert!(xml.contains("<failure message=\"The check reported issues.\">"));
    }

    #[test]
    fn test_write_creates_folder() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".ci").join("poetry-check.3.11.4.xml");
        write_junit_report(&path, "poetry-check", &[TestCase::new("poetry-check", "lib", RunnerStatus::Error, &[])]).unwrap();
        let written = fs::read_to_string(path).unwrap();
        assert!(written.contains("<error message="));
    }
}
