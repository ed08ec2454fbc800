//! Toolchain discovery through the external probe program.
//!
//! The probe reports the compiler catalogue as JSON and, for a single axis
//! point, the environment every driver must run with. Only the probe knows
//! how compilers are located; this module merely validates and applies its
//! answers.

use anyhow::{Context, Result, bail, ensure};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::env;
use std::ffi::OsString;
use std::process::Command;

use crate::axis::{AxisPoint, BuildAxis, BuildType};
use crate::target::is_valid_name;

/// Compilers and build types available on this host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolchainCatalogue {
    /// Compiler used when none is requested.
    #[serde(rename = "DEFAULT_COMPILER")]
    pub default_compiler: String,
    /// Every compiler the probe found, in discovery order.
    #[serde(rename = "AVAILABLE_COMPILERS")]
    pub compilers: Vec<String>,
    /// Build types the toolchain supports.
    #[serde(rename = "AVAILABLE_BUILD_TYPES")]
    pub build_types: Vec<BuildType>,
}

impl ToolchainCatalogue {
    /// Build axis spanned by the catalogue.
    #[must_use]
    pub fn axis(&self) -> BuildAxis {
        BuildAxis::new(self.compilers.clone(), self.build_types.clone())
    }

    /// Check the catalogue is usable.
    ///
    /// # Errors
    ///
    /// Fails when no compiler was found, the default is not among them, or a
    /// compiler name cannot appear in a marker path.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.compilers.is_empty(),
            "the toolchain probe found no compiler"
        );
        ensure!(
            self.compilers.contains(&self.default_compiler),
            "default compiler `{}` is not among the available compilers ({})",
            self.default_compiler,
            self.compilers.join(", ")
        );
        if let Some(invalid) = self.compilers.iter().find(|c| !is_valid_name(c)) {
            bail!(
                "the toolchain probe reported compiler `{invalid}`, which is not a valid name \
                 (use letters, digits, `-`, `_`, `.` or `+`)"
            );
        }
        Ok(())
    }

    /// Resolve the axis point selected on the command line.
    ///
    /// # Errors
    ///
    /// Fails when the compiler or build type is not part of the catalogue.
    pub fn select(&self, compiler: Option<&str>, build_type: BuildType) -> Result<AxisPoint> {
        let compiler = compiler.unwrap_or(&self.default_compiler);
        if !self.compilers.iter().any(|c| c == compiler) {
            bail!(
                "unknown compiler `{compiler}` (choose from {})",
                self.compilers.join(", ")
            );
        }
        if !self.build_types.contains(&build_type) {
            bail!("build type `{build_type}` is not supported by the toolchain");
        }
        Ok(AxisPoint::new(compiler, build_type))
    }

    /// Render the catalogue as the JSON object printed by
    /// `--available-options`.
    ///
    /// # Errors
    ///
    /// Propagates serialisation failures.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("failed to serialise toolchain catalogue")
    }
}

/// Environment pinned for one axis point.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ToolchainEnvironment {
    /// C compiler.
    #[serde(rename = "CC")]
    pub cc: String,
    /// C++ compiler.
    #[serde(rename = "CXX")]
    pub cxx: String,
    /// Directory prepended to `PATH`, when the compiler is not on it.
    #[serde(rename = "PATH", default)]
    pub path: Option<String>,
    /// Further variables exported verbatim.
    #[serde(flatten)]
    pub extra: IndexMap<String, String>,
}

impl ToolchainEnvironment {
    /// Variables to set on child processes, given the inherited `PATH`.
    ///
    /// # Errors
    ///
    /// Fails when the combined `PATH` cannot be joined.
    pub fn variables(&self, inherited_path: Option<OsString>) -> Result<Vec<(String, OsString)>> {
        let mut vars = vec![
            (String::from("CC"), OsString::from(&self.cc)),
            (String::from("CXX"), OsString::from(&self.cxx)),
        ];
        vars.extend(
            self.extra
                .iter()
                .map(|(key, value)| (key.clone(), OsString::from(value))),
        );
        if let Some(prefix) = self.path.as_deref().filter(|p| !p.is_empty()) {
            let inherited = inherited_path.unwrap_or_default();
            let joined = env::join_paths(
                std::iter::once(OsString::from(prefix))
                    .chain(env::split_paths(&inherited).map(OsString::from)),
            )
            .with_context(|| format!("cannot prepend {prefix} to PATH"))?;
            vars.push((String::from("PATH"), joined));
        }
        Ok(vars)
    }
}

/// Source of toolchain information.
#[cfg_attr(test, mockall::automock)]
pub trait ToolchainProbe {
    /// Report the compiler catalogue.
    ///
    /// # Errors
    ///
    /// Fails when the probe cannot be run or its answer cannot be parsed.
    fn catalogue(&self) -> Result<ToolchainCatalogue>;

    /// Report the environment for one axis point.
    ///
    /// # Errors
    ///
    /// Fails when the probe cannot be run or its answer cannot be parsed.
    fn environment(&self, point: &AxisPoint) -> Result<ToolchainEnvironment>;
}

/// Probe backed by an executable speaking the JSON protocol.
#[derive(Debug, Clone)]
pub struct CommandProbe {
    program: Utf8PathBuf,
    working_dir: Utf8PathBuf,
}

impl CommandProbe {
    /// Run `program` from `working_dir`.
    #[must_use]
    pub fn new(program: impl Into<Utf8PathBuf>, working_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            program: program.into(),
            working_dir: working_dir.into(),
        }
    }

    /// Path of the probe program.
    #[must_use]
    pub fn program(&self) -> &Utf8Path {
        &self.program
    }

    fn query(&self, args: &[&str]) -> Result<Vec<u8>> {
        tracing::debug!(program = %self.program, ?args, "querying toolchain probe");
        let output = Command::new(self.program.as_std_path())
            .args(args)
            .current_dir(self.working_dir.as_std_path())
            .output()
            .with_context(|| format!("failed to run toolchain probe {}", self.program))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "toolchain probe {} failed ({}): {}",
                self.program,
                output.status,
                stderr.trim()
            );
        }
        Ok(output.stdout)
    }
}

impl ToolchainProbe for CommandProbe {
    fn catalogue(&self) -> Result<ToolchainCatalogue> {
        let stdout = self.query(&["--show-all-json"])?;
        let catalogue: ToolchainCatalogue = serde_json::from_slice(&stdout)
            .with_context(|| format!("toolchain probe {} printed invalid JSON", self.program))?;
        catalogue.validate()?;
        Ok(catalogue)
    }

    fn environment(&self, point: &AxisPoint) -> Result<ToolchainEnvironment> {
        let stdout = self.query(&[
            "-c",
            &point.compiler,
            "-b",
            point.build_type.as_str(),
            "--json",
        ])?;
        serde_json::from_slice(&stdout).with_context(|| {
            format!(
                "toolchain probe {} printed an invalid environment for {point}",
                self.program
            )
        })
    }
}

/// A selected axis point together with its pinned environment.
#[derive(Debug, Clone)]
pub struct Toolchain {
    /// Selected compiler and build type.
    pub point: AxisPoint,
    /// Environment reported for `point`.
    pub environment: ToolchainEnvironment,
}

impl Toolchain {
    /// Select an axis point from `catalogue` and ask `probe` for its
    /// environment.
    ///
    /// # Errors
    ///
    /// Fails when the selection is not in the catalogue or the probe fails.
    pub fn select<P: ToolchainProbe + ?Sized>(
        probe: &P,
        catalogue: &ToolchainCatalogue,
        compiler: Option<&str>,
        build_type: BuildType,
    ) -> Result<Self> {
        let point = catalogue.select(compiler, build_type)?;
        let environment = probe.environment(&point)?;
        tracing::debug!(%point, cc = %environment.cc, "selected toolchain");
        Ok(Self { point, environment })
    }
}
