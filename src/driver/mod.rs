//! Per-target driver protocol.
//!
//! Every target directory holds an executable driver. The orchestrator (and
//! the generated rule file) invoke it as
//! `./driver [--verbose] -c <compiler> -b <build type> [mode flags]`. This
//! module owns the argument contract in both directions: [`DriverInvocation`]
//! renders the arguments a rule passes and parses them back on the driver
//! side. [`dispatch`] turns a parsed invocation into [`DriverAction`]s that a
//! [`Driver`] implementation performs.

mod dispatch;
mod script;

pub use dispatch::{
    DriverAction, DriverContext, DriverDescriptor, Capabilities, DispatchError, dispatch,
};
pub use script::ScriptDriver;

use anyhow::Result;
use clap::Parser;
use std::ffi::OsString;
use std::fmt::{self, Display, Formatter};
use thiserror::Error;

use crate::axis::BuildType;

/// Mode a driver runs in. Exactly one per invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverMode {
    /// Build the package and leave the dependency marker.
    Build,
    /// Report whether the package sources changed.
    CheckChanges,
    /// Export the package without building it.
    ExportOnly,
    /// Build the package in place, outside the package cache.
    BuildLocally,
    /// Generate tidy information for the package.
    GenTidyInfo,
    /// Build and run the package tests.
    TestPackage,
    /// Generate tidy information for the package tests.
    TestTidyInfo,
    /// Remove the package from the package cache.
    RemovePackage,
    /// Print `<name>/<version>` and exit.
    NameOnly,
}

impl DriverMode {
    /// Command-line flags selecting this mode.
    #[must_use]
    pub const fn flags(self) -> &'static [&'static str] {
        match self {
            Self::Build => &[],
            Self::CheckChanges => &["--check-changes"],
            Self::ExportOnly => &["--export-only"],
            Self::BuildLocally => &["--build-locally"],
            Self::GenTidyInfo => &["--gen-tidy-info"],
            Self::TestPackage => &["--test-package"],
            Self::TestTidyInfo => &["--gen-tidy-info", "--test-package"],
            Self::RemovePackage => &["--remove-package"],
            Self::NameOnly => &["--name-only"],
        }
    }

    /// Return `true` for modes the executor re-runs on every request; such
    /// modes must be idempotent.
    #[must_use]
    pub const fn always_rerun(self) -> bool {
        matches!(
            self,
            Self::CheckChanges | Self::GenTidyInfo | Self::TestPackage | Self::TestTidyInfo
        )
    }

    /// Return `true` for modes that need a compiler and build type.
    #[must_use]
    pub const fn needs_axis(self) -> bool {
        !matches!(
            self,
            Self::NameOnly | Self::RemovePackage | Self::CheckChanges | Self::ExportOnly
        )
    }
}

impl Display for DriverMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Build => "build",
            Self::CheckChanges => "check-changes",
            Self::ExportOnly => "export-only",
            Self::BuildLocally => "build-locally",
            Self::GenTidyInfo => "gen-tidy-info",
            Self::TestPackage => "test-package",
            Self::TestTidyInfo => "test-tidy-info",
            Self::RemovePackage => "remove-package",
            Self::NameOnly => "name-only",
        })
    }
}

/// Errors raised while parsing driver arguments.
#[derive(Debug, Error)]
pub enum DriverArgsError {
    /// The arguments are not valid for the driver command line.
    #[error(transparent)]
    Cli(#[from] clap::Error),
    /// More than one mode flag was given outside the one legal combination.
    #[error("conflicting driver modes: {}", .0.join(" "))]
    ConflictingModes(Vec<&'static str>),
}

#[derive(Debug, Parser)]
#[command(name = "driver", about = "Per-target build driver")]
struct DriverArgs {
    /// Show verbose output.
    #[arg(long)]
    verbose: bool,
    /// Compiler to build with.
    #[arg(short, long)]
    compiler: Option<String>,
    /// Build type to build with.
    #[arg(short = 'b', long = "build-type", value_enum)]
    build_type: Option<BuildType>,
    /// Print the package reference.
    #[arg(long)]
    name_only: bool,
    /// Build the package locally.
    #[arg(long)]
    build_locally: bool,
    /// Export the package without building.
    #[arg(long)]
    export_only: bool,
    /// Generate tidy information.
    #[arg(long)]
    gen_tidy_info: bool,
    /// Run package-level tests.
    #[arg(long)]
    test_package: bool,
    /// Remove the package from the package cache.
    #[arg(long)]
    remove_package: bool,
    /// Check whether the package changed.
    #[arg(long)]
    check_changes: bool,
}

impl DriverArgs {
    fn mode(&self) -> Result<DriverMode, DriverArgsError> {
        let selected: Vec<(&'static str, DriverMode)> = [
            (self.name_only, "--name-only", DriverMode::NameOnly),
            (self.build_locally, "--build-locally", DriverMode::BuildLocally),
            (self.export_only, "--export-only", DriverMode::ExportOnly),
            (self.gen_tidy_info, "--gen-tidy-info", DriverMode::GenTidyInfo),
            (self.test_package, "--test-package", DriverMode::TestPackage),
            (self.remove_package, "--remove-package", DriverMode::RemovePackage),
            (self.check_changes, "--check-changes", DriverMode::CheckChanges),
        ]
        .into_iter()
        .filter(|(set, _, _)| *set)
        .map(|(_, flag, mode)| (flag, mode))
        .collect();
        match selected.as_slice() {
            [] => Ok(DriverMode::Build),
            [(_, mode)] => Ok(*mode),
            [(_, DriverMode::GenTidyInfo), (_, DriverMode::TestPackage)] => {
                Ok(DriverMode::TestTidyInfo)
            }
            _ => Err(DriverArgsError::ConflictingModes(
                selected.iter().map(|(flag, _)| *flag).collect(),
            )),
        }
    }
}

/// Arguments passed to a driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverInvocation {
    /// Request verbose output.
    pub verbose: bool,
    /// Compiler identifier.
    pub compiler: Option<String>,
    /// Build type.
    pub build_type: Option<BuildType>,
    /// Selected mode.
    pub mode: DriverMode,
}

impl DriverInvocation {
    /// Invocation for `mode` at a compiler and build type.
    #[must_use]
    pub fn new(compiler: impl Into<String>, build_type: BuildType, mode: DriverMode) -> Self {
        Self {
            verbose: false,
            compiler: Some(compiler.into()),
            build_type: Some(build_type),
            mode,
        }
    }

    /// Invocation for `mode` without an axis point.
    #[must_use]
    pub const fn bare(mode: DriverMode) -> Self {
        Self {
            verbose: false,
            compiler: None,
            build_type: None,
            mode,
        }
    }

    /// Render the argument vector, excluding the program name.
    #[must_use]
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if self.verbose {
            args.push(String::from("--verbose"));
        }
        if let Some(compiler) = &self.compiler {
            args.push(String::from("-c"));
            args.push(compiler.clone());
        }
        if let Some(build_type) = self.build_type {
            args.push(String::from("-b"));
            args.push(build_type.as_str().to_owned());
        }
        args.extend(self.mode.flags().iter().map(|flag| (*flag).to_owned()));
        args
    }

    /// Parse a driver command line. The first item is the program name.
    ///
    /// # Errors
    ///
    /// Returns [`DriverArgsError`] for unknown flags, missing values, or
    /// illegal mode combinations.
    pub fn parse<I, T>(args: I) -> Result<Self, DriverArgsError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let parsed = DriverArgs::try_parse_from(args)?;
        let mode = parsed.mode()?;
        Ok(Self {
            verbose: parsed.verbose,
            compiler: parsed.compiler,
            build_type: parsed.build_type,
            mode,
        })
    }
}

/// Performs driver actions.
pub trait Driver {
    /// Carry out one action.
    ///
    /// # Errors
    ///
    /// Returns an error when the action fails; remaining actions are skipped.
    fn perform(&mut self, action: &DriverAction) -> Result<()>;
}

/// Dispatch `invocation` and perform the resulting actions in order.
///
/// # Errors
///
/// Returns the dispatch error or the first failing action.
pub fn run<D: Driver + ?Sized>(
    driver: &mut D,
    descriptor: &DriverDescriptor,
    invocation: &DriverInvocation,
    context: &DriverContext,
) -> Result<()> {
    let actions = dispatch(descriptor, invocation, context)?;
    tracing::debug!(
        target_id = descriptor.target,
        mode = %invocation.mode,
        actions = actions.len(),
        "dispatching driver invocation"
    );
    for action in &actions {
        driver.perform(action)?;
    }
    Ok(())
}
