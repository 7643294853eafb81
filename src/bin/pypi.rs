// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! pypi CLI - the versions of a package on a pypi index

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use devkit::commands::pypi;
use devkit::config::PypiConfig;
use devkit::pypi::{PypiIndex, DEFAULT_MINIMUM_VERSION};
use devkit::styles;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "pypi")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Package {
    /// The package name
    package: String,

    /// The pypi index host, in the form "https://pypi.org"
    #[arg(long)]
    index: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the most recent official release
    CurrentVersion {
        #[command(flatten)]
        target: Package,
    },

    /// Print the version number for the next release
    NextVersion {
        #[command(flatten)]
        target: Package,

        /// Compute the next prerelease instead
        #[arg(long)]
        prerelease: bool,

        /// The lowest acceptable version
        #[arg(long, default_value = DEFAULT_MINIMUM_VERSION)]
        minimum_version: String,
    },

    /// Print the versions of a package, grouped by major version
    Versions {
        #[command(flatten)]
        target: Package,
    },

    /// Exit with an error when the version already exists
    RaiseIfExists {
        #[command(flatten)]
        target: Package,

        /// The version about to be published
        version: String,
    },
}

impl Commands {
    fn target(&self) -> &Package {
        match self {
            Self::CurrentVersion { target }
            | Self::NextVersion { target, .. }
            | Self::Versions { target }
            | Self::RaiseIfExists { target, .. } => target,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    styles::init_colors(cli.no_color);
    styles::conclude(run(cli))
}

fn run(cli: Cli) -> Result<()> {
    let target = cli.command.target();
    let config = PypiConfig::from_process()?.with_index(target.index.clone());
    let index = PypiIndex::new(config.index()?);
    let package = target.package.as_str();

    match &cli.command {
        Commands::CurrentVersion { .. } => pypi::current_version(&index, package),
        Commands::NextVersion {
            prerelease,
            minimum_version,
            ..
        } => pypi::next_version(&index, package, *prerelease, minimum_version),
        Commands::Versions { .. } => pypi::versions(&index, package),
        Commands::RaiseIfExists { version, .. } => pypi::raise_if_exists(&index, package, version),
    }
}
