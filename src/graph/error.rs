//! Validation failures raised while building the target graph.

// The unused_assignments lint fires on miette/thiserror derive output in some
// Rust versions but not others, so `#[expect]` cannot be used here.
#![allow(
    clippy::allow_attributes,
    clippy::allow_attributes_without_reason,
    unused_assignments
)]

use camino::Utf8PathBuf;
use itertools::Itertools;
use miette::Diagnostic;
use std::fmt::{self, Display, Formatter};
use thiserror::Error;

/// Why a declaration entry is malformed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Malformation {
    /// A dependency is listed more than once.
    DuplicateDependency(String),
    /// The target uses a name reserved for a pseudo-target.
    ReservedName,
    /// The id contains characters a rule file cannot carry.
    InvalidId,
}

impl Display for Malformation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateDependency(dep) => write!(f, "lists dependency `{dep}` more than once"),
            Self::ReservedName => f.write_str("uses a reserved pseudo-target name"),
            Self::InvalidId => f.write_str(
                "is not a valid id (use letters, digits, `-`, `_`, `.` or `+`)",
            ),
        }
    }
}

/// A dependency edge pointing at an undeclared target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingDependency {
    /// Target declaring the dependency.
    pub target: String,
    /// The undeclared dependency id.
    pub dependency: String,
}

impl Display for MissingDependency {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "`{}` -> `{}`", self.target, self.dependency)
    }
}

/// Why a target's driver cannot be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverProblem {
    /// Nothing exists at the driver path.
    Missing,
    /// The path exists but is not a regular file.
    NotAFile,
    /// The file lacks execute permission.
    NotExecutable,
}

impl Display for DriverProblem {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Missing => "does not exist",
            Self::NotAFile => "is not a regular file",
            Self::NotExecutable => "is not executable",
        })
    }
}

/// Errors raised while validating the target declaration.
#[derive(Debug, Clone, Error, Diagnostic, PartialEq, Eq)]
pub enum GraphError {
    /// A declaration entry breaks a structural rule.
    #[error("target `{target}` {problem}")]
    #[diagnostic(
        code(keelson::graph::malformed_declaration),
        help(
            "Use plain ids, list each dependency once, and do not declare reserved names."
        )
    )]
    MalformedDeclaration {
        /// Offending target id.
        target: String,
        /// What is wrong with the entry.
        problem: Malformation,
    },

    /// One or more dependencies name undeclared targets.
    #[error("undeclared dependencies: {}", format_missing(.missing))]
    #[diagnostic(
        code(keelson::graph::undefined_dependency),
        help("Declare the dependency in the target declaration or remove the edge.")
    )]
    UndefinedDependency {
        /// Every offending edge, in declaration order.
        missing: Vec<MissingDependency>,
    },

    /// A target has no usable driver.
    #[error("driver for target `{target}` at {path} {problem}")]
    #[diagnostic(
        code(keelson::graph::missing_driver),
        help("Create the driver file in the target directory and mark it executable.")
    )]
    MissingDriver {
        /// Target whose driver is unusable.
        target: String,
        /// Expected driver path.
        path: Utf8PathBuf,
        /// What is wrong with the path.
        problem: DriverProblem,
    },

    /// The dependency edges form a cycle.
    #[error("target `{target}` is part of a dependency cycle: {}", .cycle.join(" -> "))]
    #[diagnostic(
        code(keelson::graph::cyclic_dependency),
        help("Break the cycle by removing one of the listed dependency edges.")
    )]
    CyclicDependency {
        /// First node found with a back-edge into the traversal stack.
        target: String,
        /// Cycle path, starting and ending at `target`.
        cycle: Vec<String>,
    },
}

fn format_missing(missing: &[MissingDependency]) -> String {
    missing.iter().join(", ")
}
