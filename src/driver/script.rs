//! Driver that performs each action by running a script.

use anyhow::{Context, Result, bail};
use camino::{Utf8Path, Utf8PathBuf};
use std::ffi::OsString;
use std::io::{self, Write};
use std::process::Command;

use super::{Driver, DriverAction};

/// Runs `<scripts dir>/<script> <args…>` from the package directory.
#[derive(Debug, Clone)]
pub struct ScriptDriver {
    scripts_dir: Utf8PathBuf,
    working_dir: Utf8PathBuf,
    orchestrator: Utf8PathBuf,
    env: Vec<(String, OsString)>,
}

/// A fully resolved script command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptCommand {
    /// Program to run.
    pub program: Utf8PathBuf,
    /// Arguments, excluding the program.
    pub args: Vec<String>,
    /// Working directory.
    pub working_dir: Utf8PathBuf,
}

impl ScriptDriver {
    /// Create a driver running scripts from `scripts_dir` inside
    /// `working_dir`.
    #[must_use]
    pub fn new(scripts_dir: impl Into<Utf8PathBuf>, working_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            scripts_dir: scripts_dir.into(),
            working_dir: working_dir.into(),
            orchestrator: Utf8PathBuf::from(env!("CARGO_PKG_NAME")),
            env: Vec::new(),
        }
    }

    /// Program used to build in-tree dependencies before a local build.
    #[must_use]
    pub fn with_orchestrator(mut self, program: impl Into<Utf8PathBuf>) -> Self {
        self.orchestrator = program.into();
        self
    }

    /// Extra environment for every script.
    #[must_use]
    pub fn with_env(mut self, vars: Vec<(String, OsString)>) -> Self {
        self.env = vars;
        self
    }

    fn script(&self, name: &str) -> Utf8PathBuf {
        self.scripts_dir.join(name)
    }

    fn in_package(&self, name: &str, args: Vec<String>) -> ScriptCommand {
        ScriptCommand {
            program: self.script(name),
            args,
            working_dir: self.working_dir.clone(),
        }
    }

    /// Command performing `action`, or `None` when no process is needed.
    #[must_use]
    pub fn command_for(&self, action: &DriverAction) -> Option<ScriptCommand> {
        let command = match action {
            DriverAction::PrintReference(_) => return None,
            DriverAction::RemovePackage { reference } => {
                self.in_package("remove-package.sh", vec![reference.clone()])
            }
            DriverAction::CheckChanges { export_marker } => {
                self.in_package("check-changes.sh", vec![export_marker.to_string()])
            }
            DriverAction::ExportOnly => self.in_package("export-only.sh", Vec::new()),
            DriverAction::BuildDependencies { point, target } => ScriptCommand {
                program: self.orchestrator.clone(),
                args: vec![
                    String::from("-c"),
                    point.compiler.clone(),
                    String::from("-b"),
                    point.build_type.as_str().to_owned(),
                    String::from("--deps-only"),
                    target.clone(),
                ],
                working_dir: self.working_dir.clone(),
            },
            DriverAction::BuildLocally { .. } => self.in_package("build-locally.sh", Vec::new()),
            DriverAction::GenerateTidyInfo {
                working_dir,
                destination,
                ..
            } => ScriptCommand {
                program: self.script("build-tidy.sh"),
                args: vec![destination.to_string()],
                working_dir: working_dir.clone(),
            },
            DriverAction::BuildPackage { marker, .. } => {
                self.in_package("build-lib-notest.sh", vec![marker.to_string()])
            }
            DriverAction::TestPackage { marker, .. } => {
                self.in_package("build-lib-test.sh", vec![marker.to_string()])
            }
            DriverAction::ExportPackage { marker, .. } => {
                self.in_package("export.sh", vec![marker.to_string()])
            }
        };
        Some(command)
    }

    fn execute(&self, command: &ScriptCommand) -> Result<()> {
        tracing::info!(
            program = %command.program,
            args = ?command.args,
            dir = %command.working_dir,
            "running driver script"
        );
        let status = Command::new(command.program.as_std_path())
            .args(&command.args)
            .current_dir(command.working_dir.as_std_path())
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_os_str())))
            .status()
            .with_context(|| format!("failed to start {}", command.program))?;
        if !status.success() {
            bail!("{} failed with {status}", display_name(&command.program));
        }
        Ok(())
    }
}

fn display_name(program: &Utf8Path) -> &str {
    program.file_name().unwrap_or(program.as_str())
}

impl Driver for ScriptDriver {
    fn perform(&mut self, action: &DriverAction) -> Result<()> {
        if let DriverAction::PrintReference(reference) = action {
            let mut out = io::stdout().lock();
            writeln!(out, "{reference}").context("failed to write package reference")?;
            return Ok(());
        }
        match self.command_for(action) {
            Some(command) => self.execute(&command),
            None => Ok(()),
        }
    }
}
