//! Resolution of user-supplied target tokens.
//!
//! A token is either a symbolic id (a declared target or a reserved
//! pseudo-target name) or a path, relative to the invocation directory, of a
//! target directory. Resolution runs against the raw declaration because it
//! happens before the graph is validated.

mod error;

pub use error::ResolveError;

use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexSet;
use std::fs;
use std::path::PathBuf;

use crate::config::Workspace;
use crate::declaration::Declaration;
use crate::target::{Aggregate, DestructiveAction, TargetCategory, reserved_names};

/// A token resolved to its canonical id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedToken {
    /// Canonical id.
    pub id: String,
    /// Classification of `id`.
    pub category: TargetCategory,
}

/// What an invocation asks for once its tokens are normalised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetRequest {
    /// Build the listed ids, which may include creative aggregates.
    Build(Vec<String>),
    /// Run the listed destructive actions.
    Destroy(Vec<DestructiveAction>),
}

/// Resolves tokens against a declaration within a workspace.
#[derive(Debug, Clone)]
pub struct Resolver<'a> {
    declaration: &'a Declaration,
    workspace: &'a Workspace,
    invocation_dir: Utf8PathBuf,
}

impl<'a> Resolver<'a> {
    /// Create a resolver interpreting path tokens relative to
    /// `invocation_dir`.
    #[must_use]
    pub fn new(
        declaration: &'a Declaration,
        workspace: &'a Workspace,
        invocation_dir: impl Into<Utf8PathBuf>,
    ) -> Self {
        Self {
            declaration,
            workspace,
            invocation_dir: invocation_dir.into(),
        }
    }

    /// Resolve a single token.
    ///
    /// Exact id matches win over paths, so a directory named like a reserved
    /// target still resolves to the reserved target.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::UnknownTarget`] listing every valid choice.
    pub fn classify(&self, token: &str) -> Result<ResolvedToken, ResolveError> {
        if let Some(category) = self.symbolic_category(token) {
            return Ok(ResolvedToken {
                id: token.to_owned(),
                category,
            });
        }
        if let Some(id) = self.match_directory(token) {
            tracing::debug!(token, id, "resolved path token");
            return Ok(ResolvedToken {
                category: self.workspace.category_of(id),
                id: id.to_owned(),
            });
        }
        Err(ResolveError::UnknownTarget {
            token: token.to_owned(),
            choices: self.choices(),
        })
    }

    /// Classify `tokens` in order and enforce creative/destructive
    /// exclusion. An empty token list means `all`.
    ///
    /// Duplicates are dropped, keeping the first occurrence.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::UnknownTarget`] for the first unresolvable
    /// token or [`ResolveError::MixedTargetKinds`] as soon as both kinds
    /// have been seen.
    pub fn normalize<S: AsRef<str>>(&self, tokens: &[S]) -> Result<TargetRequest, ResolveError> {
        if tokens.is_empty() {
            return Ok(TargetRequest::Build(vec![Aggregate::All.as_str().to_owned()]));
        }
        let mut creative: IndexSet<String> = IndexSet::new();
        let mut destructive: IndexSet<DestructiveAction> = IndexSet::new();
        for token in tokens {
            let resolved = self.classify(token.as_ref())?;
            if let Some(action) = DestructiveAction::from_name(&resolved.id) {
                destructive.insert(action);
            } else {
                creative.insert(resolved.id);
            }
            if let (Some(c), Some(d)) = (creative.first(), destructive.first()) {
                return Err(ResolveError::MixedTargetKinds {
                    creative: c.clone(),
                    destructive: d.as_str().to_owned(),
                });
            }
        }
        if destructive.is_empty() {
            Ok(TargetRequest::Build(creative.into_iter().collect()))
        } else {
            Ok(TargetRequest::Destroy(destructive.into_iter().collect()))
        }
    }

    /// Replace creative aggregates by the targets they stand for.
    ///
    /// The result is duplicate-free and follows declaration order.
    /// Destructive names are passed through unchanged after the targets.
    #[must_use]
    pub fn expand_aggregates<S: AsRef<str>>(&self, ids: &[S]) -> Vec<String> {
        let mut wanted: IndexSet<&str> = IndexSet::new();
        let mut passthrough: IndexSet<&str> = IndexSet::new();
        for id in ids {
            let id = id.as_ref();
            match Aggregate::from_name(id) {
                Some(aggregate) => {
                    wanted.extend(
                        self.declaration
                            .ids()
                            .filter(|declared| self.in_aggregate(aggregate, declared)),
                    );
                }
                None if self.declaration.contains(id) => {
                    wanted.insert(id);
                }
                None => {
                    passthrough.insert(id);
                }
            }
        }
        self.declaration
            .ids()
            .filter(|declared| wanted.contains(declared))
            .chain(passthrough)
            .map(str::to_owned)
            .collect()
    }

    /// Union of the direct dependencies of `ids`, in declaration order.
    #[must_use]
    pub fn dependencies_only<S: AsRef<str>>(&self, ids: &[S]) -> Vec<String> {
        let deps: IndexSet<&str> = ids
            .iter()
            .filter_map(|id| self.declaration.dependencies(id.as_ref()))
            .flatten()
            .map(String::as_str)
            .collect();
        self.declaration
            .ids()
            .filter(|declared| deps.contains(declared))
            .map(str::to_owned)
            .collect()
    }

    fn in_aggregate(&self, aggregate: Aggregate, id: &str) -> bool {
        match aggregate {
            Aggregate::All => !self.workspace.is_test_id(id),
            Aggregate::Tests => self.workspace.is_test_id(id),
            Aggregate::Everything => true,
        }
    }

    fn symbolic_category(&self, token: &str) -> Option<TargetCategory> {
        if Aggregate::from_name(token).is_some() {
            Some(TargetCategory::AggregateCreative)
        } else if DestructiveAction::from_name(token).is_some() {
            Some(TargetCategory::AggregateDestructive)
        } else if self.declaration.contains(token) {
            Some(self.workspace.category_of(token))
        } else {
            None
        }
    }

    fn match_directory(&self, token: &str) -> Option<&'a str> {
        let candidate = self.invocation_dir.join(token);
        if !candidate.is_dir() {
            return None;
        }
        let identity = canonical(&candidate)?;
        self.declaration.ids().find(|id| {
            canonical(&self.workspace.target_directory(id)).is_some_and(|dir| dir == identity)
        })
    }

    fn choices(&self) -> Vec<String> {
        reserved_names()
            .map(str::to_owned)
            .chain(self.declaration.ids().map(str::to_owned))
            .collect()
    }
}

fn canonical(path: &Utf8Path) -> Option<PathBuf> {
    fs::canonicalize(path).ok()
}
