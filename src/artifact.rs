//! Artifacts and their marker files.
//!
//! An artifact is the outcome of running one driver mode for one target at
//! one axis point. Its marker file lives under the deps directory:
//! `<deps>/<compiler>/<build type>/<target>.<ext>`.

use camino::{Utf8Path, Utf8PathBuf};
use std::fmt::{self, Display, Formatter};

use crate::axis::AxisPoint;

/// What an artifact records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// The target's sources were checked for changes.
    CheckChanges,
    /// The target is built and available to its dependents.
    DependencySatisfied,
    /// Tidy information was generated for the package.
    TidyInfo,
    /// The package tests were built and run.
    TestBinary,
    /// Tidy information was generated for the package tests.
    TestTidyInfo,
}

impl ArtifactKind {
    /// Every kind, in rule emission order.
    pub const ALL: [Self; 5] = [
        Self::CheckChanges,
        Self::DependencySatisfied,
        Self::TidyInfo,
        Self::TestBinary,
        Self::TestTidyInfo,
    ];

    /// Marker file extension.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::CheckChanges => "check",
            Self::DependencySatisfied => "dep",
            Self::TidyInfo => "tidy",
            Self::TestBinary => "test",
            Self::TestTidyInfo => "testtidy",
        }
    }

    /// Kind requested by the orchestrator's `--gen-tidy-info` and
    /// `--test-packages` flags.
    #[must_use]
    pub const fn requested(gen_tidy_info: bool, test_packages: bool) -> Self {
        match (gen_tidy_info, test_packages) {
            (true, true) => Self::TestTidyInfo,
            (true, false) => Self::TidyInfo,
            (false, true) => Self::TestBinary,
            (false, false) => Self::DependencySatisfied,
        }
    }

    /// Return `true` when the executor must run the rule on every request.
    #[must_use]
    pub const fn always_rerun(self) -> bool {
        !matches!(self, Self::DependencySatisfied)
    }
}

impl Display for ArtifactKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// One (compiler, build type, target, kind) tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Artifact<'a> {
    /// Axis point the artifact belongs to.
    pub point: &'a AxisPoint,
    /// Target id.
    pub target: &'a str,
    /// What the artifact records.
    pub kind: ArtifactKind,
}

impl<'a> Artifact<'a> {
    /// Construct an artifact.
    #[must_use]
    pub const fn new(point: &'a AxisPoint, target: &'a str, kind: ArtifactKind) -> Self {
        Self {
            point,
            target,
            kind,
        }
    }

    /// Marker path under `deps_dir`.
    #[must_use]
    pub fn marker(&self, deps_dir: &Utf8Path) -> Utf8PathBuf {
        deps_dir
            .join(&self.point.compiler)
            .join(self.point.build_type.as_str())
            .join(format!("{}.{}", self.target, self.kind.extension()))
    }
}
