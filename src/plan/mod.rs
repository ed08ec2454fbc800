//! Build plan generation.
//!
//! The plan is a flat list of [`Rule`]s covering every target at every axis
//! point. It is independent of the request: the orchestrator prunes work by
//! asking the executor for specific marker paths (see [`check_targets`] and
//! [`artifact_targets`]).

use camino::Utf8PathBuf;
use std::collections::HashSet;

use crate::artifact::{Artifact, ArtifactKind};
use crate::axis::{AxisPoint, BuildAxis};
use crate::config::Workspace;
use crate::driver::{DriverInvocation, DriverMode};
use crate::graph::AcyclicGraph;

/// How a rule runs a driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipe {
    /// Absolute directory the driver runs from.
    pub directory: Utf8PathBuf,
    /// Driver file name inside `directory`.
    pub driver: String,
    /// Driver invocation; verbosity is decided when the rule runs.
    pub invocation: DriverInvocation,
}

/// One executor rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// Root-relative marker path produced by the rule.
    pub output: Utf8PathBuf,
    /// Root-relative prerequisites, in order.
    pub prerequisites: Vec<Utf8PathBuf>,
    /// Run on every request regardless of timestamps.
    pub always_rerun: bool,
    /// Command run by the rule.
    pub recipe: Recipe,
}

/// Every rule for a graph and an axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPlan {
    rules: Vec<Rule>,
}

/// Driver mode producing an artifact of `kind`.
#[must_use]
pub const fn mode_for(kind: ArtifactKind) -> DriverMode {
    match kind {
        ArtifactKind::CheckChanges => DriverMode::CheckChanges,
        ArtifactKind::DependencySatisfied => DriverMode::Build,
        ArtifactKind::TidyInfo => DriverMode::GenTidyInfo,
        ArtifactKind::TestBinary => DriverMode::TestPackage,
        ArtifactKind::TestTidyInfo => DriverMode::TestTidyInfo,
    }
}

impl BuildPlan {
    /// Generate the plan: the bootstrap rule first, then for every axis
    /// point (compilers outer, build types inner) and every target in
    /// declaration order, one rule per [`ArtifactKind`].
    #[must_use]
    pub fn generate(graph: &AcyclicGraph, axis: &BuildAxis, workspace: &Workspace) -> Self {
        let bootstrap = workspace.bootstrap_marker();
        let driver = &workspace.layout().driver;
        let deps_dir = &workspace.layout().deps_dir;
        let mut rules = Vec::with_capacity(1 + axis.len() * graph.len() * ArtifactKind::ALL.len());
        rules.push(Rule {
            output: bootstrap.clone(),
            prerequisites: Vec::new(),
            always_rerun: true,
            recipe: Recipe {
                directory: workspace.bootstrap_directory(),
                driver: driver.clone(),
                invocation: DriverInvocation::bare(DriverMode::ExportOnly),
            },
        });

        for point in axis.points() {
            for target in graph.targets() {
                let id = target.id();
                let marker = |kind| Artifact::new(&point, id, kind).marker(deps_dir);
                let rule = |kind: ArtifactKind, extra: Vec<Utf8PathBuf>| {
                    let mut prerequisites = vec![bootstrap.clone()];
                    prerequisites.extend(extra);
                    Rule {
                        output: marker(kind),
                        prerequisites,
                        always_rerun: kind.always_rerun(),
                        recipe: Recipe {
                            directory: target.directory().to_path_buf(),
                            driver: driver.clone(),
                            invocation: DriverInvocation::new(
                                point.compiler.clone(),
                                point.build_type,
                                mode_for(kind),
                            ),
                        },
                    }
                };

                let mut dep_prereqs = vec![workspace.export_marker(id)];
                dep_prereqs.extend(target.dependencies().iter().map(|dep| {
                    Artifact::new(&point, dep, ArtifactKind::DependencySatisfied).marker(deps_dir)
                }));

                rules.push(rule(ArtifactKind::CheckChanges, Vec::new()));
                rules.push(rule(ArtifactKind::DependencySatisfied, dep_prereqs));
                rules.push(rule(
                    ArtifactKind::TidyInfo,
                    vec![marker(ArtifactKind::DependencySatisfied)],
                ));
                rules.push(rule(
                    ArtifactKind::TestBinary,
                    vec![marker(ArtifactKind::DependencySatisfied)],
                ));
                rules.push(rule(
                    ArtifactKind::TestTidyInfo,
                    vec![marker(ArtifactKind::TestBinary)],
                ));
            }
        }
        tracing::debug!(rules = rules.len(), "generated build plan");
        Self { rules }
    }

    /// Rules in emission order.
    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// The toolchain bootstrap rule.
    #[must_use]
    pub fn bootstrap(&self) -> Option<&Rule> {
        self.rules.first()
    }

    /// Rule producing `output`.
    #[must_use]
    pub fn find(&self, output: &str) -> Option<&Rule> {
        self.rules.iter().find(|rule| rule.output == output)
    }
}

/// Executor targets running change checks for `ids` and everything they
/// depend on, at `point`. The bootstrap marker comes first.
#[must_use]
pub fn check_targets<S: AsRef<str>>(
    graph: &AcyclicGraph,
    workspace: &Workspace,
    point: &AxisPoint,
    ids: &[S],
) -> Vec<Utf8PathBuf> {
    let requested: HashSet<&str> = ids.iter().map(|id| id.as_ref()).collect();
    let closure: HashSet<&str> = graph
        .transitive_closure(ids.iter().map(|id| id.as_ref()))
        .into_iter()
        .collect();
    let deps_dir = &workspace.layout().deps_dir;
    std::iter::once(workspace.bootstrap_marker())
        .chain(
            graph
                .ids()
                .filter(|id| requested.contains(id) || closure.contains(id))
                .map(|id| Artifact::new(point, id, ArtifactKind::CheckChanges).marker(deps_dir)),
        )
        .collect()
}

/// Executor targets producing `kind` for each of `ids` at `point`.
#[must_use]
pub fn artifact_targets<S: AsRef<str>>(
    workspace: &Workspace,
    point: &AxisPoint,
    ids: &[S],
    kind: ArtifactKind,
) -> Vec<Utf8PathBuf> {
    let deps_dir = &workspace.layout().deps_dir;
    ids.iter()
        .map(|id| Artifact::new(point, id.as_ref(), kind).marker(deps_dir))
        .collect()
}
