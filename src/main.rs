// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! stew CLI - poetry projects and their ci, across a whole repository

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use devkit::commands::{self, StewContext, INTRO};
use devkit::config::StewConfig;
use devkit::styles::{self, echo};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "stew")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-error logs)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Where to look for projects (defaults to the repository root)
    #[arg(long, global = true, env = "STEW_PATH")]
    path: Option<PathBuf>,

    /// Report what would change without writing anything
    #[arg(long, global = true)]
    dry_run: bool,

    /// Running unattended: check, never fix
    #[arg(long, global = true)]
    ci_mode: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Exit with an error when lock files are out of sync with their pyproject.toml
    CheckOutdated,

    /// Update the outdated lock files and pydev requirements
    FixOutdated,

    /// Bump the locked versions of every project
    Bump,

    /// Store a project and its locked dependencies as wheels, for offline installs
    Build {
        /// The project to build
        project_name: String,

        /// Where the wheels go (defaults to .wheels at the repository root)
        #[arg(long)]
        directory: Option<PathBuf>,

        /// The python executable to build with (defaults to every environment of the project)
        #[arg(long)]
        python: Option<PathBuf>,
    },

    /// Remove the egg-info folders of the projects
    FreshEggs {
        /// Only the projects whose name contains this
        project_name: Option<String>,
    },

    /// Write the dev-dependencies of local dependencies into pydev projects
    PullDevRequirements,

    /// Print the folder of a project
    Locate {
        /// The exact project name
        project_name: String,
    },

    /// Recreate the environments of the projects
    Refresh {
        /// Only the projects whose name contains this
        project_name: Option<String>,

        /// The name must match exactly
        #[arg(long)]
        exact_match: bool,
    },

    /// Launch the ci runners on all environments
    Ci {
        /// Only the projects whose name contains this
        project_name: Option<String>,

        /// The name must match exactly
        #[arg(long)]
        exact_match: bool,

        /// Let runners fix what they can before checking
        #[arg(long)]
        fix: bool,

        /// Only launch these runners (repeatable)
        #[arg(long = "check")]
        checks: Vec<String>,
    },

    /// Generate shell completions
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: clap_complete::Shell,
    },
}

impl Commands {
    /// Commands whose output is consumed by scripts
    fn is_quiet(&self) -> bool {
        matches!(self, Self::Locate { .. } | Self::Completions { .. })
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = match cli.verbose {
        0 if cli.quiet => tracing::Level::ERROR,
        0 => tracing::Level::INFO,
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
    if !cli.command.is_quiet() {
        echo::step(INTRO);
    }

    let config = StewConfig::from_process()?.with_flags(cli.verbose > 0, cli.ci_mode, cli.dry_run);
    let context = StewContext::new(cli.path, config);

    // Execute command
    match cli.command {
        Commands::CheckOutdated => commands::outdated::check(&context),
        Commands::FixOutdated => commands::outdated::fix(&context),
        Commands::Bump => commands::bump::run(&context),
        Commands::Build {
            project_name,
            directory,
            python,
        } => commands::build::run(&context, &project_name, directory, python),
        Commands::FreshEggs { project_name } => commands::fresh_eggs::run(&context, project_name),
        Commands::PullDevRequirements => commands::pull_dev_requirements::run(&context),
        Commands::Locate { project_name } => commands::locate::run(&context, &project_name),
        Commands::Refresh {
            project_name,
            exact_match,
        } => commands::refresh::run(&context, project_name, exact_match),
        Commands::Ci {
            project_name,
            exact_match,
            fix,
            checks,
        } => commands::ci::run(&context, project_name, exact_match, fix, &checks),
        Commands::Completions { shell } => commands::completions::run(shell, &mut Cli::command()),
    }
}
