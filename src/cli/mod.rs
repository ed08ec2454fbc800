//! Command line interface definition using clap.
//!
//! Positional tokens name what to build or clean; everything else selects the
//! axis point, the artefact kind, and how `make` runs.

use camino::Utf8PathBuf;
use clap::Parser;

use crate::artifact::ArtifactKind;
use crate::axis::BuildType;
use crate::runner::{MakeOptions, Parallelism};

mod parsing;

use parsing::parse_jobs;

/// Maximum number of jobs accepted by the CLI.
pub(crate) const MAX_JOBS: usize = 64;

/// Build or clean targets of a multi-package repository through `make`.
#[derive(Debug, Clone, Default, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Targets: declared ids, target directories, `all`, `tests`,
    /// `everything`, or one of the clean actions. Defaults to `all`.
    #[arg(value_name = "TARGET")]
    pub targets: Vec<String>,

    /// Run as if started in this directory.
    #[arg(short = 'C', long, value_name = "DIR")]
    pub directory: Option<Utf8PathBuf>,

    /// Enable verbose logging and echo executed recipes.
    #[arg(short, long)]
    pub verbose: bool,

    /// Run one recipe at a time.
    #[arg(long, conflicts_with = "jobs")]
    pub serial_build: bool,

    /// Limit the number of parallel recipes.
    ///
    /// Values must be between 1 and 64.
    #[arg(short, long, value_name = "N", value_parser = parse_jobs)]
    pub jobs: Option<usize>,

    /// Build type of the selected axis point.
    #[arg(short = 'b', long, value_enum, default_value_t = BuildType::Release)]
    pub build_type: BuildType,

    /// Compiler of the selected axis point; defaults to the probe's choice.
    #[arg(short = 'c', long, value_name = "COMPILER")]
    pub compiler: Option<String>,

    /// Build only the direct dependencies of the named targets.
    #[arg(long)]
    pub deps_only: bool,

    /// Generate tidy information instead of building.
    #[arg(long)]
    pub gen_tidy_info: bool,

    /// Build and run package tests.
    #[arg(long)]
    pub test_packages: bool,

    /// Print the available compilers and build types as JSON and exit.
    #[arg(long)]
    pub available_options: bool,

    /// Write the generated Makefile to FILE (`-` for stdout) and exit.
    #[arg(long, value_name = "FILE")]
    pub emit: Option<Utf8PathBuf>,
}

impl Cli {
    /// Artefact kind requested for every resolved target.
    #[must_use]
    pub const fn artifact_kind(&self) -> ArtifactKind {
        ArtifactKind::requested(self.gen_tidy_info, self.test_packages)
    }

    /// Flags shared by every `make` run of this invocation.
    #[must_use]
    pub const fn make_options(&self) -> MakeOptions {
        let parallelism = match (self.serial_build, self.jobs) {
            (true, _) => Parallelism::Serial,
            (false, Some(n)) => Parallelism::Jobs(n),
            (false, None) => Parallelism::Unlimited,
        };
        MakeOptions {
            parallelism,
            verbose: self.verbose,
        }
    }
}
