//! Target declaration loading.
//!
//! The declaration is a YAML mapping from target identifier to the ordered
//! list of identifiers it depends on:
//!
//! ```yaml
//! shared: []
//! memstore: [shared]
//! test-memstore: [memstore]
//! ```
//!
//! Declaration order is preserved so diagnostics, cycle witnesses, and the
//! generated rule file are reproducible. A `null` value is read as an empty
//! dependency list. Parsing performs no validation beyond the YAML shape; the
//! structural checks live in [`crate::graph`].

use anyhow::{Context, Result};
use indexmap::IndexMap;
use std::fs;
use std::path::Path;

mod diagnostics;

pub use diagnostics::{DeclarationError, map_yaml_error};

/// Default file name of the declaration at the repository root.
pub const DECLARATION_FILE: &str = "targets.yaml";

/// Parsed target declaration in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Declaration {
    entries: IndexMap<String, Vec<String>>,
}

impl Declaration {
    /// Build a declaration from `(id, dependencies)` pairs.
    ///
    /// # Examples
    ///
    /// ```
    /// use keelson::declaration::Declaration;
    ///
    /// let decl = Declaration::from_entries([("a", vec![]), ("b", vec!["a"])]);
    /// assert_eq!(decl.dependencies("b"), Some(&["a".to_owned()][..]));
    /// ```
    #[must_use]
    pub fn from_entries<I, K, D, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, D)>,
        K: Into<String>,
        D: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entries = entries
            .into_iter()
            .map(|(id, deps)| (id.into(), deps.into_iter().map(Into::into).collect()))
            .collect();
        Self { entries }
    }

    /// Parse a declaration, labelling diagnostics with `name`.
    ///
    /// # Errors
    ///
    /// Returns [`DeclarationError::Parse`] when the YAML is malformed or is not
    /// a mapping of identifiers to lists of identifiers.
    pub fn from_str_named(yaml: &str, name: &str) -> Result<Self, DeclarationError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let raw: IndexMap<String, Option<Vec<String>>> =
            serde_saphyr::from_str(yaml).map_err(|err| DeclarationError::Parse {
                name: name.to_owned(),
                source: map_yaml_error(err, yaml, name),
            })?;
        let entries = raw
            .into_iter()
            .map(|(id, deps)| (id, deps.unwrap_or_default()))
            .collect();
        Ok(Self { entries })
    }

    /// Load a declaration from `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or fails to parse.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path_ref = path.as_ref();
        let data = fs::read_to_string(path_ref)
            .with_context(|| format!("reading target declaration {}", path_ref.display()))?;
        let decl = Self::from_str_named(&data, &path_ref.display().to_string())?;
        tracing::debug!(
            path = %path_ref.display(),
            targets = decl.len(),
            "loaded target declaration"
        );
        Ok(decl)
    }

    /// Iterate over `(id, dependencies)` in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(id, deps)| (id.as_str(), deps.as_slice()))
    }

    /// Identifiers in declaration order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Dependencies declared for `id`.
    #[must_use]
    pub fn dependencies(&self, id: &str) -> Option<&[String]> {
        self.entries.get(id).map(Vec::as_slice)
    }

    /// Return `true` when `id` is declared.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Number of declared targets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Return `true` when nothing is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::str::FromStr for Declaration {
    type Err = DeclarationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_named(s, DECLARATION_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn preserves_declaration_order() {
        let decl: Declaration = "zeta: []\nalpha: [zeta]\nmid: [alpha, zeta]\n"
            .parse()
            .expect("parse declaration");
        let ids: Vec<&str> = decl.ids().collect();
        assert_eq!(ids, vec!["zeta", "alpha", "mid"]);
        assert_eq!(
            decl.dependencies("mid"),
            Some(&["alpha".to_owned(), "zeta".to_owned()][..])
        );
    }

    #[rstest]
    fn keeps_duplicate_dependencies_for_validation() {
        let decl: Declaration = "x: [x, x]\n".parse().expect("parse declaration");
        assert_eq!(decl.dependencies("x").map(<[String]>::len), Some(2));
    }

    #[rstest]
    fn null_dependencies_read_as_empty() {
        let decl: Declaration = "shared:\nconn: [shared]\n".parse().expect("parse");
        assert_eq!(decl.dependencies("shared"), Some(&[][..]));
    }

    #[rstest]
    #[case("")]
    #[case("   \n")]
    fn blank_input_is_empty(#[case] yaml: &str) {
        let decl: Declaration = yaml.parse().expect("parse");
        assert!(decl.is_empty());
    }

    #[rstest]
    fn rejects_non_list_dependencies() {
        let err = "a: {b: c}\n".parse::<Declaration>().expect_err("shape error");
        assert!(matches!(err, DeclarationError::Parse { .. }));
    }
}
