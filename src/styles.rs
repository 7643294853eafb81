// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! Opinionated styles for CLI messaging
//!
//! ```no_run
//! use devkit::styles::{echo, NOISE};
//!
//! echo::step("Launching some process...");
//! echo::normal("Preparing work...");
//! for work in ["a", "b"] {
//!     NOISE.item().echo(work);
//! }
//! echo::success("");
//! ```
//!
//! Emojis can be interpolated with the `!!name!!` syntax, e.g. `!!sparkles!!`.

use owo_colors::{OwoColorize, Style};
use std::fmt::Display;
use std::io::IsTerminal;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Bullet used for list items: a round, centered dot
pub const ITEM_BULLET: &str = "\u{b7}";

const EMOJI_DELIMITER: &str = "!!";

static COLORS: AtomicBool = AtomicBool::new(true);

/// Enable or disable colors globally
pub fn set_colors(enabled: bool) {
    COLORS.store(enabled, Ordering::Relaxed);
}

/// Enable colors unless disabled or stdout is not a terminal
pub fn init_colors(no_color: bool) {
    set_colors(!no_color && std::io::stdout().is_terminal());
}

fn colors_enabled() -> bool {
    COLORS.load(Ordering::Relaxed)
}

/// Aliases understood by the `!!name!!` syntax
const EMOJIS: &[(&str, &str)] = &[
    ("sparkles", "\u{2728}"),
    ("snake", "\u{1f40d}"),
    ("mega", "\u{1f4e3}"),
    ("robot_face", "\u{1f916}"),
    ("warning", "\u{26a0}\u{fe0f}"),
    ("heavy_check_mark", "\u{2714}\u{fe0f}"),
    ("collision", "\u{1f4a5}"),
    ("exclamation", "\u{2757}"),
    ("bug", "\u{1f41b}"),
    ("hourglass", "\u{231b}"),
    ("thumbs_up", "\u{1f44d}"),
    ("stuck_out_tongue_winking_eye", "\u{1f61c}"),
    ("package", "\u{1f4e6}"),
    ("mag", "\u{1f50d}"),
];

/// Replace known `!!name!!` tokens; unknown ones are left as-is
#[must_use]
pub fn emojize(message: &str) -> String {
    let mut output = String::with_capacity(message.len());
    let mut rest = message;
    while let Some(start) = rest.find(EMOJI_DELIMITER) {
        let after = &rest[start + EMOJI_DELIMITER.len()..];
        let Some(end) = after.find(EMOJI_DELIMITER) else {
            break;
        };
        let name = &after[..end];
        match EMOJIS.iter().find(|(alias, _)| *alias == name) {
            Some((_, emoji)) => {
                output.push_str(&rest[..start]);
                output.push_str(emoji);
                rest = &after[end + EMOJI_DELIMITER.len()..];
            }
            None => {
                // keep the first delimiter and retry from the second one
                output.push_str(&rest[..start + EMOJI_DELIMITER.len()]);
                rest = after;
            }
        }
    }
    output.push_str(rest);
    output
}

/// Color scheme of a [`Pretty`] style
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    /// Bright cyan
    Step,
    /// Dim bold yellow
    Outcome,
    /// Dim bold white
    Normal,
    /// Dim white
    Noise,
    /// Yellow
    Suggest,
    /// Yellow
    Warning,
    /// Green
    Success,
    /// Red
    Error,
    /// Dim red
    ErrorDetails,
    /// No styling
    Plain,
}

impl Tone {
    fn style(self) -> Style {
        match self {
            Self::Step => Style::new().bright_cyan(),
            Self::Outcome => Style::new().yellow().dimmed().bold(),
            Self::Normal => Style::new().white().dimmed().bold(),
            Self::Noise => Style::new().white().dimmed(),
            Self::Suggest | Self::Warning => Style::new().yellow(),
            Self::Success => Style::new().green(),
            Self::Error => Style::new().red(),
            Self::ErrorDetails => Style::new().red().dimmed(),
            Self::Plain => Style::new(),
        }
    }
}

/// A message style; styles are `Copy` and tweaked per call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pretty {
    tone: Tone,
    emoji: Option<&'static str>,
    pad_before: bool,
    pad_after: bool,
    item: bool,
    stderr: bool,
    default_text: Option<&'static str>,
}

impl Pretty {
    /// A plain style of the given tone
    #[must_use]
    pub const fn new(tone: Tone) -> Self {
        Self {
            tone,
            emoji: None,
            pad_before: false,
            pad_after: false,
            item: false,
            stderr: false,
            default_text: None,
        }
    }

    /// Prefix messages with an emoji alias
    #[must_use]
    pub const fn with_emoji(mut self, emoji: &'static str) -> Self {
        self.emoji = Some(emoji);
        self
    }

    /// Remove the emoji
    #[must_use]
    pub const fn without_emoji(mut self) -> Self {
        self.emoji = None;
        self
    }

    /// Feed a newline before the message
    #[must_use]
    pub const fn with_pad_before(mut self, pad: bool) -> Self {
        self.pad_before = pad;
        self
    }

    /// Feed a newline after the message
    #[must_use]
    pub const fn with_pad_after(mut self, pad: bool) -> Self {
        self.pad_after = pad;
        self
    }

    /// Display as a bullet point (emojis are skipped)
    #[must_use]
    pub const fn item(mut self) -> Self {
        self.item = true;
        self
    }

    /// Write to stderr instead of stdout
    #[must_use]
    pub const fn to_stderr(mut self) -> Self {
        self.stderr = true;
        self
    }

    /// Text used when the message is empty
    #[must_use]
    pub const fn with_default(mut self, text: &'static str) -> Self {
        self.default_text = Some(text);
        self
    }

    /// Format a message without displaying it
    pub fn prettify(&self, message: impl Display) -> String {
        let mut message = message.to_string();
        if message.is_empty() {
            if let Some(default_text) = self.default_text {
                message = default_text.to_string();
            }
        }

        if self.item {
            message = format!(" {ITEM_BULLET} {message}");
        } else if let Some(emoji) = self.emoji {
            message = format!("{EMOJI_DELIMITER}{emoji}{EMOJI_DELIMITER} {message}");
        }
        if self.pad_before {
            message.insert(0, '\n');
        }
        if self.pad_after {
            message.push('\n');
        }
        if message.contains(EMOJI_DELIMITER) {
            message = emojize(&message);
        }

        if colors_enabled() && self.tone != Tone::Plain {
            message.style(self.tone.style()).to_string()
        } else {
            message
        }
    }

    /// Display a message
    pub fn echo(&self, message: impl Display) {
        let message = self.prettify(message);
        if self.stderr {
            eprintln!("{message}");
        } else {
            println!("{message}");
        }
    }
}

/// Announces a step of the process
pub const STEP: Pretty = Pretty::new(Tone::Step)
    .with_pad_before(true)
    .with_pad_after(true);
/// The outcome of a step
pub const OUTCOME: Pretty = Pretty::new(Tone::Outcome).with_emoji("mega");
/// Regular information
pub const NORMAL: Pretty = Pretty::new(Tone::Normal);
/// Low-importance details
pub const NOISE: Pretty = Pretty::new(Tone::Noise);
/// A hint for the user
pub const SUGGEST: Pretty = Pretty::new(Tone::Suggest)
    .with_emoji("robot_face")
    .with_pad_before(true)
    .with_pad_after(true);
/// Something went sideways but we carry on
pub const WARNING: Pretty = Pretty::new(Tone::Warning)
    .with_emoji("warning")
    .with_pad_before(true)
    .with_pad_after(true);
/// Something completed successfully
pub const SUCCESS: Pretty = Pretty::new(Tone::Success)
    .with_emoji("heavy_check_mark")
    .with_pad_before(true)
    .with_pad_after(true)
    .with_default("Success!");
/// A failure
pub const ERROR: Pretty = Pretty::new(Tone::Error)
    .with_emoji("collision")
    .with_pad_before(true)
    .with_pad_after(true)
    .to_stderr();
/// Details of a failure
pub const ERROR_DETAILS: Pretty = Pretty::new(Tone::ErrorDetails).to_stderr();
/// Unstyled output, e.g. for values consumed by scripts
pub const PASSTHROUGH: Pretty = Pretty::new(Tone::Plain);

/// Shorthands over the default styles
pub mod echo {
    use super::{
        Display, ERROR, ERROR_DETAILS, NOISE, NORMAL, OUTCOME, PASSTHROUGH, STEP, SUCCESS,
        SUGGEST, WARNING,
    };

    /// See [`super::STEP`]
    pub fn step(message: impl Display) {
        STEP.echo(message);
    }

    /// See [`super::OUTCOME`]
    pub fn outcome(message: impl Display) {
        OUTCOME.echo(message);
    }

    /// See [`super::NORMAL`]
    pub fn normal(message: impl Display) {
        NORMAL.echo(message);
    }

    /// See [`super::NOISE`]
    pub fn noise(message: impl Display) {
        NOISE.echo(message);
    }

    /// See [`super::SUGGEST`]
    pub fn suggest(message: impl Display) {
        SUGGEST.echo(message);
    }

    /// See [`super::WARNING`]
    pub fn warning(message: impl Display) {
        WARNING.echo(message);
    }

    /// See [`super::SUCCESS`]; an empty message prints the default text
    pub fn success(message: impl Display) {
        SUCCESS.echo(message);
    }

    /// See [`super::ERROR`]
    pub fn error(message: impl Display) {
        ERROR.echo(message);
    }

    /// See [`super::ERROR_DETAILS`]
    pub fn error_details(message: impl Display) {
        ERROR_DETAILS.echo(message);
    }

    /// See [`super::PASSTHROUGH`]
    pub fn passthrough(message: impl Display) {
        PASSTHROUGH.echo(message);
    }
}

// =============================================================================
// Graceful failures
// =============================================================================

/// A controlled failure, displayed without a backtrace
///
/// Anything else reaching the top of a CLI is reported as unhandled.
#[derive(Debug, Error)]
#[error("{cause}")]
pub struct ExitWithFailure {
    cause: String,
    failures: Vec<String>,
    suggestions: Vec<String>,
    exit_code: u8,
}

impl ExitWithFailure {
    /// A failure caused by `cause`
    pub fn new(cause: impl Display) -> Self {
        Self {
            cause: cause.to_string(),
            failures: Vec::new(),
            suggestions: Vec::new(),
            exit_code: 1,
        }
    }

    /// Objects helping to diagnose the failure, shown as bullet points
    #[must_use]
    pub fn with_failures<I, D>(mut self, failures: I) -> Self
    where
        I: IntoIterator<Item = D>,
        D: Display,
    {
        self.failures = failures.into_iter().map(|f| f.to_string()).collect();
        self
    }

    /// Hints that may fix the problem
    #[must_use]
    pub fn with_suggestions<I, D>(mut self, suggestions: I) -> Self
    where
        I: IntoIterator<Item = D>,
        D: Display,
    {
        self.suggestions = suggestions.into_iter().map(|s| s.to_string()).collect();
        self
    }

    /// The process exit code (default 1)
    #[must_use]
    pub fn with_exit_code(mut self, exit_code: u8) -> Self {
        self.exit_code = exit_code;
        self
    }

    /// The process exit code
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }

    /// The failures
    #[must_use]
    pub fn failures(&self) -> &[String] {
        &self.failures
    }

    /// The suggestions
    #[must_use]
    pub fn suggestions(&self) -> &[String] {
        &self.suggestions
    }

    /// Pretty lines describing the failure
    #[must_use]
    pub fn report(&self) -> Vec<String> {
        let mut lines = vec![ERROR
            .with_pad_after(false)
            .with_emoji("exclamation")
            .prettify(&self.cause)];
        lines.extend(
            self.failures
                .iter()
                .map(|failure| ERROR_DETAILS.item().prettify(failure)),
        );
        match self.suggestions.as_slice() {
            [] => {}
            [single] => lines.push(SUGGEST.prettify(single)),
            many => {
                lines.push(
                    SUGGEST
                        .with_pad_after(false)
                        .prettify("The following hints may help diagnose the issue:"),
                );
                lines.extend(many.iter().map(|hint| NORMAL.item().prettify(hint)));
            }
        }
        lines.push(String::new());
        lines
    }
}

/// Report the outcome of a CLI and produce its exit code
///
/// [`ExitWithFailure`] errors are reported gracefully; any other error is
/// reported as unhandled.
#[must_use]
pub fn conclude(result: anyhow::Result<()>) -> ExitCode {
    let Err(error) = result else {
        return ExitCode::SUCCESS;
    };

    let (lines, code) = match error.downcast_ref::<ExitWithFailure>() {
        Some(failure) => (failure.report(), failure.exit_code()),
        None => (
            vec![
                ERROR.with_pad_after(false).prettify(format!("{error:?}")),
                SUGGEST.with_emoji("bug").prettify(
                    "This is an unhandled error; report it if you can't fix it! !!stuck_out_tongue_winking_eye!!",
                ),
            ],
            1,
        ),
    };
    for line in lines {
        eprintln!("{line}");
    }
    ExitCode::from(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn without_colors() {
        set_colors(false);
    }

    #[test]
    fn test_emojize() {
        assert_eq!(emojize("!!sparkles!! !!snake!!"), "\u{2728} \u{1f40d}");
        assert_eq!(emojize("!!unknown!! text"), "!!unknown!! text");
        assert_eq!(emojize("a !! b !!bug!!"), "a !! b \u{1f41b}");
        assert_eq!(emojize("dangling !!"), "dangling !!");
    }

    #[test]
    fn test_prettify_layout() {
        without_colors();
        assert_eq!(NOISE.item().prettify("x"), format!(" {ITEM_BULLET} x"));
        assert_eq!(
            STEP.prettify("go"),
            "\ngo\n"
        );
        assert_eq!(
            SUCCESS.with_pad_before(false).with_pad_after(false).prettify(""),
            "\u{2714}\u{fe0f} Success!"
        );
        // items never carry the emoji
        assert_eq!(OUTCOME.item().prettify("done"), format!(" {ITEM_BULLET} done"));
    }

    #[test]
    fn test_exit_with_failure_report() {
        without_colors();
        let failure = ExitWithFailure::new("Found 2 outdated file(s).")
            .with_failures(["a/poetry.lock", "b/poetry.lock"])
            .with_suggestions(["Run fix-outdated"]);
        let report = failure.report();
        assert_eq!(report[0], "\n\u{2757} Found 2 outdated file(s).");
        assert_eq!(report[1], format!(" {ITEM_BULLET} a/poetry.lock"));
        assert_eq!(report[3], "\n\u{1f916} Run fix-outdated\n");
        assert_eq!(report.last().map(String::as_str), Some(""));
        assert_eq!(failure.exit_code(), 1);
    }

    #[test]
    fn test_multiple_suggestions() {
        without_colors();
        let report = ExitWithFailure::new("nope")
            .with_suggestions(["one", "two"])
            .report();
        assert!(report[1].contains("The following hints may help diagnose the issue:"));
        assert_eq!(report[2], format!(" {ITEM_BULLET} one"));
        assert_eq!(report[3], format!(" {ITEM_BULLET} two"));
    }
}
