//! Build axis definitions.
//!
//! The axis is the cross product of the compilers reported by the toolchain
//! probe and the fixed set of build types. Each point is an independent build
//! configuration: markers, prerequisites, and driver invocations never cross
//! from one point to another.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

/// Optimisation profile passed to every driver.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    ValueEnum,
    Serialize,
    Deserialize,
)]
pub enum BuildType {
    /// Unoptimised build with debug information.
    #[value(name = "debug")]
    #[serde(rename = "debug")]
    Debug,
    /// Optimised build without debug information.
    #[default]
    #[value(name = "release")]
    #[serde(rename = "release")]
    Release,
    /// Optimised build that keeps debug information.
    #[value(name = "relwithdebinfo")]
    #[serde(rename = "relwithdebinfo")]
    RelWithDebInfo,
    /// Build optimised for binary size.
    #[value(name = "minsizerel")]
    #[serde(rename = "minsizerel")]
    MinSizeRel,
}

impl BuildType {
    /// Every build type in axis order.
    pub const ALL: [Self; 4] = [
        Self::Debug,
        Self::Release,
        Self::RelWithDebInfo,
        Self::MinSizeRel,
    ];

    /// Identifier used on the command line, in marker paths, and in driver
    /// arguments.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Release => "release",
            Self::RelWithDebInfo => "relwithdebinfo",
            Self::MinSizeRel => "minsizerel",
        }
    }
}

impl Display for BuildType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when a build type identifier is not part of the fixed set.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown build type `{0}` (choose from debug, release, relwithdebinfo, minsizerel)")]
pub struct UnknownBuildType(pub String);

impl FromStr for BuildType {
    type Err = UnknownBuildType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|build_type| build_type.as_str() == s)
            .ok_or_else(|| UnknownBuildType(s.to_owned()))
    }
}

/// A single (compiler, build type) configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AxisPoint {
    /// Compiler identifier as reported by the toolchain probe.
    pub compiler: String,
    /// Build type of this configuration.
    pub build_type: BuildType,
}

impl AxisPoint {
    /// Construct an axis point.
    #[must_use]
    pub fn new(compiler: impl Into<String>, build_type: BuildType) -> Self {
        Self {
            compiler: compiler.into(),
            build_type,
        }
    }
}

impl Display for AxisPoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.compiler, self.build_type)
    }
}

/// Cross product of compilers and build types.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildAxis {
    compilers: Vec<String>,
    build_types: Vec<BuildType>,
}

impl BuildAxis {
    /// Construct an axis from explicit compiler and build type lists.
    ///
    /// Duplicates are dropped while keeping the first occurrence so the axis
    /// order stays stable.
    #[must_use]
    pub fn new(compilers: Vec<String>, build_types: Vec<BuildType>) -> Self {
        let mut unique_compilers: Vec<String> = Vec::with_capacity(compilers.len());
        for compiler in compilers {
            if !unique_compilers.contains(&compiler) {
                unique_compilers.push(compiler);
            }
        }
        let mut unique_types: Vec<BuildType> = Vec::with_capacity(build_types.len());
        for build_type in build_types {
            if !unique_types.contains(&build_type) {
                unique_types.push(build_type);
            }
        }
        Self {
            compilers: unique_compilers,
            build_types: unique_types,
        }
    }

    /// Axis spanning `compilers` and every build type.
    #[must_use]
    pub fn with_all_build_types(compilers: Vec<String>) -> Self {
        Self::new(compilers, BuildType::ALL.to_vec())
    }

    /// Compilers on this axis, in discovery order.
    #[must_use]
    pub fn compilers(&self) -> &[String] {
        &self.compilers
    }

    /// Build types on this axis.
    #[must_use]
    pub fn build_types(&self) -> &[BuildType] {
        &self.build_types
    }

    /// Return `true` when `point` lies on the axis.
    #[must_use]
    pub fn contains(&self, point: &AxisPoint) -> bool {
        self.compilers.contains(&point.compiler) && self.build_types.contains(&point.build_type)
    }

    /// Iterate over every axis point, compilers outer and build types inner.
    pub fn points(&self) -> impl Iterator<Item = AxisPoint> + '_ {
        self.compilers.iter().flat_map(move |compiler| {
            self.build_types
                .iter()
                .map(move |build_type| AxisPoint::new(compiler.clone(), *build_type))
        })
    }

    /// Number of axis points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.compilers.len() * self.build_types.len()
    }

    /// Return `true` when the axis has no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("debug", BuildType::Debug)]
    #[case("release", BuildType::Release)]
    #[case("relwithdebinfo", BuildType::RelWithDebInfo)]
    #[case("minsizerel", BuildType::MinSizeRel)]
    fn build_type_parses_identifiers(#[case] raw: &str, #[case] expected: BuildType) {
        assert_eq!(raw.parse::<BuildType>(), Ok(expected));
        assert_eq!(expected.to_string(), raw);
    }

    #[rstest]
    fn build_type_rejects_unknown_identifier() {
        let err = "fast".parse::<BuildType>().expect_err("unknown build type");
        assert_eq!(err, UnknownBuildType("fast".into()));
    }

    #[rstest]
    fn points_iterate_compilers_outer() {
        let axis = BuildAxis::new(
            vec!["gcc".into(), "clang".into()],
            vec![BuildType::Debug, BuildType::Release],
        );
        let points: Vec<String> = axis.points().map(|p| p.to_string()).collect();
        assert_eq!(
            points,
            vec!["gcc/debug", "gcc/release", "clang/debug", "clang/release"]
        );
        assert_eq!(axis.len(), 4);
    }

    #[rstest]
    fn new_drops_duplicate_entries() {
        let axis = BuildAxis::new(
            vec!["gcc".into(), "gcc".into()],
            vec![BuildType::Release, BuildType::Release],
        );
        assert_eq!(axis.compilers(), ["gcc".to_owned()]);
        assert_eq!(axis.build_types(), [BuildType::Release]);
    }

    #[rstest]
    fn contains_checks_both_dimensions() {
        let axis = BuildAxis::with_all_build_types(vec!["gcc".into()]);
        assert!(axis.contains(&AxisPoint::new("gcc", BuildType::MinSizeRel)));
        assert!(!axis.contains(&AxisPoint::new("clang", BuildType::Release)));
    }
}
