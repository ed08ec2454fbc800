//! Target identities and the reserved pseudo-target names.

use camino::{Utf8Path, Utf8PathBuf};
use std::fmt::{self, Display, Formatter};

/// Classification of a resolved identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetCategory {
    /// A package living at the repository root under its own id.
    Normal,
    /// A test package living under the test subtree.
    Test,
    /// A pseudo-target that expands into real targets.
    AggregateCreative,
    /// A pseudo-target that removes build state.
    AggregateDestructive,
}

impl TargetCategory {
    /// Return `true` for categories that build something.
    #[must_use]
    pub const fn is_creative(self) -> bool {
        !matches!(self, Self::AggregateDestructive)
    }
}

/// A declared, buildable target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    id: String,
    category: TargetCategory,
    dependencies: Vec<String>,
    directory: Utf8PathBuf,
}

impl Target {
    pub(crate) const fn new(
        id: String,
        category: TargetCategory,
        dependencies: Vec<String>,
        directory: Utf8PathBuf,
    ) -> Self {
        Self {
            id,
            category,
            dependencies,
            directory,
        }
    }

    /// Canonical identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Either [`TargetCategory::Normal`] or [`TargetCategory::Test`].
    #[must_use]
    pub const fn category(&self) -> TargetCategory {
        self.category
    }

    /// Direct dependencies in declaration order.
    #[must_use]
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Absolute directory holding the target's driver.
    #[must_use]
    pub fn directory(&self) -> &Utf8Path {
        &self.directory
    }
}

/// Pseudo-targets that expand into sets of real targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Aggregate {
    /// Every normal target.
    All,
    /// Every test target.
    Tests,
    /// Every normal and test target.
    Everything,
}

impl Aggregate {
    /// All creative aggregates.
    pub const ALL: [Self; 3] = [Self::All, Self::Tests, Self::Everything];

    /// Reserved name of the aggregate.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Tests => "tests",
            Self::Everything => "everything",
        }
    }

    /// Look up an aggregate by reserved name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str() == name)
    }
}

impl Display for Aggregate {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pseudo-targets forwarded verbatim to the destructive path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DestructiveAction {
    /// Remove all build and tidy state.
    Clean,
    /// Remove build state only.
    BuildClean,
    /// Remove tidy output only.
    TidyClean,
    /// Remove everything, including exported packages.
    DistClean,
}

impl DestructiveAction {
    /// All destructive actions.
    pub const ALL: [Self; 4] = [Self::Clean, Self::BuildClean, Self::TidyClean, Self::DistClean];

    /// Reserved name of the action.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::BuildClean => "buildclean",
            Self::TidyClean => "tidyclean",
            Self::DistClean => "distclean",
        }
    }

    /// Look up an action by reserved name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str() == name)
    }
}

impl Display for DestructiveAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Return `true` when `name` is reserved for a pseudo-target.
#[must_use]
pub fn is_reserved(name: &str) -> bool {
    Aggregate::from_name(name).is_some() || DestructiveAction::from_name(name).is_some()
}

/// Return `true` when `name` can name a target or compiler.
///
/// Names become path segments of marker files, which `make` reads as target
/// and prerequisite words, so only letters, digits, `-`, `_`, `.` and `+`
/// are accepted. `.` and `..` are rejected.
#[must_use]
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '+'))
}

/// Every reserved name, creative aggregates first.
pub fn reserved_names() -> impl Iterator<Item = &'static str> {
    Aggregate::ALL
        .into_iter()
        .map(Aggregate::as_str)
        .chain(DestructiveAction::ALL.into_iter().map(DestructiveAction::as_str))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("all", true)]
    #[case("everything", true)]
    #[case("distclean", true)]
    #[case("shared", false)]
    #[case("ALL", false)]
    fn reserved_names_are_exact(#[case] name: &str, #[case] reserved: bool) {
        assert_eq!(is_reserved(name), reserved);
    }

    #[rstest]
    #[case("crash-consensus", true)]
    #[case("test-memstore", true)]
    #[case("clang-15", true)]
    #[case("g++", true)]
    #[case("lib_x.v2", true)]
    #[case("", false)]
    #[case(".", false)]
    #[case("..", false)]
    #[case("foo bar", false)]
    #[case("a:b", false)]
    #[case("lib%x", false)]
    #[case("net#2", false)]
    #[case("a/b", false)]
    #[case("x=y", false)]
    fn names_make_can_carry(#[case] name: &str, #[case] valid: bool) {
        assert_eq!(is_valid_name(name), valid);
    }

    #[rstest]
    fn reserved_names_list_creative_first() {
        let names: Vec<_> = reserved_names().collect();
        assert_eq!(
            names,
            vec![
                "all",
                "tests",
                "everything",
                "clean",
                "buildclean",
                "tidyclean",
                "distclean"
            ]
        );
    }
}
