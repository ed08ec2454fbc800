//! The validated target dependency graph.
//!
//! [`TargetGraph::load`] checks a [`Declaration`] against the workspace:
//! structure first, then dependency references, then driver files. Each
//! check covers the whole declaration before the next one starts, so a
//! declaration with several kinds of problems always reports the same one.
//!
//! Acyclicity is tracked separately. Only an [`AcyclicGraph`], obtained from
//! [`TargetGraph::into_acyclic`], can be handed to the plan generator.

mod cycle;
mod error;

pub use error::{DriverProblem, GraphError, Malformation, MissingDependency};

use indexmap::{IndexMap, IndexSet};
use std::collections::HashSet;
use std::fs;
use std::ops::Deref;

use camino::Utf8Path;

use crate::config::Workspace;
use crate::declaration::Declaration;
use crate::target::{Target, TargetCategory, is_reserved, is_valid_name};

/// Every declared target, keyed by id in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetGraph {
    targets: IndexMap<String, Target>,
}

impl TargetGraph {
    /// Build and validate the graph for `declaration` inside `workspace`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::MalformedDeclaration`],
    /// [`GraphError::UndefinedDependency`] or [`GraphError::MissingDriver`],
    /// checked in that order.
    pub fn load(declaration: &Declaration, workspace: &Workspace) -> Result<Self, GraphError> {
        let graph = Self::assemble(declaration, workspace)?;
        for id in graph.targets.keys() {
            let path = workspace.driver_path(id);
            inspect_driver(&path).map_err(|problem| GraphError::MissingDriver {
                target: id.clone(),
                path,
                problem,
            })?;
        }
        tracing::debug!(targets = graph.len(), "loaded target graph");
        Ok(graph)
    }

    /// Structural and reference checks only; driver files are not inspected.
    pub(crate) fn assemble(
        declaration: &Declaration,
        workspace: &Workspace,
    ) -> Result<Self, GraphError> {
        check_structure(declaration)?;
        check_references(declaration)?;
        let targets = declaration
            .iter()
            .map(|(id, deps)| {
                let target = Target::new(
                    id.to_owned(),
                    workspace.category_of(id),
                    deps.to_vec(),
                    workspace.target_directory(id),
                );
                (id.to_owned(), target)
            })
            .collect();
        Ok(Self { targets })
    }

    /// Look up a target by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Target> {
        self.targets.get(id)
    }

    /// Return `true` when `id` is a declared target.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.targets.contains_key(id)
    }

    /// Targets in declaration order.
    pub fn targets(&self) -> impl Iterator<Item = &Target> {
        self.targets.values()
    }

    /// Ids in declaration order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(String::as_str)
    }

    /// Ids of the given category in declaration order.
    pub fn ids_of(&self, category: TargetCategory) -> impl Iterator<Item = &str> {
        self.targets
            .values()
            .filter(move |t| t.category() == category)
            .map(Target::id)
    }

    /// Number of targets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Return `true` when nothing is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Direct dependencies of `id`, or `None` when `id` is undeclared.
    #[must_use]
    pub fn direct_dependencies(&self, id: &str) -> Option<&[String]> {
        self.targets.get(id).map(Target::dependencies)
    }

    /// Every target reachable from `seeds` along dependency edges.
    ///
    /// Seeds appear only when another seed reaches them. The result follows
    /// declaration order.
    pub fn transitive_closure<'a, I>(&self, seeds: I) -> Vec<&str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut reached: HashSet<&str> = HashSet::new();
        let mut pending: Vec<&str> = Vec::new();
        for seed in seeds {
            if let Some(deps) = self.direct_dependencies(seed) {
                pending.extend(deps.iter().map(String::as_str));
            }
        }
        while let Some(id) = pending.pop() {
            let Some((key, target)) = self.targets.get_key_value(id) else {
                continue;
            };
            if reached.insert(key.as_str()) {
                pending.extend(target.dependencies().iter().map(String::as_str));
            }
        }
        self.ids().filter(|id| reached.contains(id)).collect()
    }

    /// First node found with a back-edge into the traversal stack.
    #[must_use]
    pub fn detect_cycle(&self) -> Option<&str> {
        let found = cycle::find_cycle(&self.targets)?;
        self.targets
            .get_key_value(found.witness.as_str())
            .map(|(key, _)| key.as_str())
    }

    /// Run cycle detection once and certify the graph as acyclic.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::CyclicDependency`] naming the witness and the
    /// cycle path.
    pub fn into_acyclic(self) -> Result<AcyclicGraph, GraphError> {
        match cycle::find_cycle(&self.targets) {
            Some(found) => Err(GraphError::CyclicDependency {
                target: found.witness,
                cycle: found.path,
            }),
            None => Ok(AcyclicGraph { graph: self }),
        }
    }
}

/// A [`TargetGraph`] known to be free of dependency cycles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcyclicGraph {
    graph: TargetGraph,
}

impl AcyclicGraph {
    /// Release the underlying graph.
    #[must_use]
    pub fn into_inner(self) -> TargetGraph {
        self.graph
    }
}

impl Deref for AcyclicGraph {
    type Target = TargetGraph;

    fn deref(&self) -> &Self::Target {
        &self.graph
    }
}

fn check_structure(declaration: &Declaration) -> Result<(), GraphError> {
    for (id, deps) in declaration.iter() {
        if !is_valid_name(id) {
            return Err(GraphError::MalformedDeclaration {
                target: id.to_owned(),
                problem: Malformation::InvalidId,
            });
        }
        if is_reserved(id) {
            return Err(GraphError::MalformedDeclaration {
                target: id.to_owned(),
                problem: Malformation::ReservedName,
            });
        }
        let mut seen: IndexSet<&str> = IndexSet::with_capacity(deps.len());
        for dep in deps {
            if !seen.insert(dep.as_str()) {
                return Err(GraphError::MalformedDeclaration {
                    target: id.to_owned(),
                    problem: Malformation::DuplicateDependency(dep.clone()),
                });
            }
        }
    }
    Ok(())
}

fn check_references(declaration: &Declaration) -> Result<(), GraphError> {
    let missing: Vec<MissingDependency> = declaration
        .iter()
        .flat_map(|(id, deps)| {
            deps.iter()
                .filter(|dep| !declaration.contains(dep))
                .map(move |dep| MissingDependency {
                    target: id.to_owned(),
                    dependency: dep.clone(),
                })
        })
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(GraphError::UndefinedDependency { missing })
    }
}

fn inspect_driver(path: &Utf8Path) -> Result<(), DriverProblem> {
    let metadata = fs::metadata(path).map_err(|_| DriverProblem::Missing)?;
    if !metadata.is_file() {
        return Err(DriverProblem::NotAFile);
    }
    if is_executable(&metadata) {
        Ok(())
    } else {
        Err(DriverProblem::NotExecutable)
    }
}

#[cfg(unix)]
fn is_executable(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &fs::Metadata) -> bool {
    true
}
