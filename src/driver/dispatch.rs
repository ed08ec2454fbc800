//! Mapping of driver invocations onto concrete actions.

use camino::{Utf8Path, Utf8PathBuf};
use std::env;
use thiserror::Error;

use super::{DriverInvocation, DriverMode};
use crate::artifact::{Artifact, ArtifactKind};
use crate::axis::{AxisPoint, BuildType};
use crate::config::Workspace;
use executor_env::INVOKED_FROM_ORCHESTRATOR_ENV;

/// Directory under a package holding its test package.
pub const TEST_PACKAGE_DIR: &str = "test";

/// Directory under the root receiving generated tidy information.
pub const TIDY_DIR: &str = ".tidy-builds";

/// What a driver is able to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// The package can be built and tested.
    pub buildable: bool,
    /// Tidy information can be generated.
    pub tidyable: bool,
    /// The built package is exported after building.
    pub exportable: bool,
    /// Local builds do not rebuild in-tree dependencies first.
    pub out_of_tree: bool,
}

impl Capabilities {
    /// Buildable and tidyable, not exported, in-tree.
    pub const DEFAULT: Self = Self {
        buildable: true,
        tidyable: true,
        exportable: false,
        out_of_tree: false,
    };
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Static description of a target's driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverDescriptor {
    /// Target id the driver belongs to.
    pub target: &'static str,
    /// Package name in the package manager.
    pub package: &'static str,
    /// Package version.
    pub version: &'static str,
    /// Enabled capabilities.
    pub capabilities: Capabilities,
}

impl DriverDescriptor {
    /// Describe a driver with default capabilities.
    ///
    /// ```
    /// use keelson::driver::DriverDescriptor;
    ///
    /// const NET: DriverDescriptor = DriverDescriptor::new("net", "acme-net", "0.3.1")
    ///     .exportable(true);
    /// assert_eq!(NET.reference(), "acme-net/0.3.1");
    /// ```
    #[must_use]
    pub const fn new(target: &'static str, package: &'static str, version: &'static str) -> Self {
        Self {
            target,
            package,
            version,
            capabilities: Capabilities::DEFAULT,
        }
    }

    /// Set whether the package can be built.
    #[must_use]
    pub const fn buildable(mut self, enabled: bool) -> Self {
        self.capabilities.buildable = enabled;
        self
    }

    /// Set whether tidy information can be generated.
    #[must_use]
    pub const fn tidyable(mut self, enabled: bool) -> Self {
        self.capabilities.tidyable = enabled;
        self
    }

    /// Set whether the package is exported after building.
    #[must_use]
    pub const fn exportable(mut self, enabled: bool) -> Self {
        self.capabilities.exportable = enabled;
        self
    }

    /// Set whether local builds skip rebuilding in-tree dependencies.
    #[must_use]
    pub const fn out_of_tree(mut self, enabled: bool) -> Self {
        self.capabilities.out_of_tree = enabled;
        self
    }

    /// Package reference, `<name>/<version>`.
    #[must_use]
    pub fn reference(&self) -> String {
        format!("{}/{}", self.package, self.version)
    }
}

/// Facts about the environment a driver runs in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverContext {
    /// Absolute repository root.
    pub root: Utf8PathBuf,
    /// Absolute package directory.
    pub directory: Utf8PathBuf,
    /// Root-relative deps directory.
    pub deps_dir: Utf8PathBuf,
    /// The orchestrator started this driver.
    pub invoked_from_orchestrator: bool,
    /// Compiler used when a direct invocation names none.
    pub default_compiler: Option<String>,
    /// The package carries a test package.
    pub has_test_package: bool,
}

impl DriverContext {
    /// Context for `target` inside `workspace`, probing the filesystem for
    /// a test package.
    #[must_use]
    pub fn for_target(
        workspace: &Workspace,
        target: &str,
        invoked_from_orchestrator: bool,
        default_compiler: Option<String>,
    ) -> Self {
        let directory = workspace.target_directory(target);
        let has_test_package = directory.join(TEST_PACKAGE_DIR).is_dir();
        Self {
            root: workspace.root().to_path_buf(),
            directory,
            deps_dir: workspace.layout().deps_dir.clone(),
            invoked_from_orchestrator,
            default_compiler,
            has_test_package,
        }
    }

    /// Return `true` when the orchestrator marker variable is set.
    #[must_use]
    pub fn invoked_from_env() -> bool {
        env::var_os(INVOKED_FROM_ORCHESTRATOR_ENV).is_some()
    }

    fn marker(&self, point: &AxisPoint, target: &str, kind: ArtifactKind) -> Utf8PathBuf {
        self.root
            .join(Artifact::new(point, target, kind).marker(&self.deps_dir))
    }

    fn tidy_destination(&self, working_dir: &Utf8Path) -> Utf8PathBuf {
        let relative = working_dir.strip_prefix(&self.root).unwrap_or(working_dir);
        let mut mangled: String = relative
            .as_str()
            .chars()
            .map(|c| if c == '/' || c == '.' { '_' } else { c })
            .collect();
        mangled.push('_');
        self.root.join(TIDY_DIR).join(mangled)
    }
}

/// A single step a driver performs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverAction {
    /// Print the package reference.
    PrintReference(String),
    /// Remove the package from the package cache.
    RemovePackage {
        /// Package reference.
        reference: String,
    },
    /// Refresh the export marker when the package changed.
    CheckChanges {
        /// Absolute export marker path.
        export_marker: Utf8PathBuf,
    },
    /// Export the package without building.
    ExportOnly,
    /// Build the target's in-tree dependencies through the orchestrator.
    BuildDependencies {
        /// Axis point to build at.
        point: AxisPoint,
        /// Target whose dependencies are built.
        target: String,
    },
    /// Build the package in place.
    BuildLocally {
        /// Axis point to build at.
        point: AxisPoint,
    },
    /// Generate tidy information.
    GenerateTidyInfo {
        /// Axis point to analyse.
        point: AxisPoint,
        /// Directory to run in.
        working_dir: Utf8PathBuf,
        /// Output directory for the tidy information.
        destination: Utf8PathBuf,
    },
    /// Build the package and leave the dependency marker.
    BuildPackage {
        /// Axis point to build at.
        point: AxisPoint,
        /// Absolute dependency marker path.
        marker: Utf8PathBuf,
    },
    /// Build and run the test package.
    TestPackage {
        /// Axis point to test at.
        point: AxisPoint,
        /// Absolute test marker path.
        marker: Utf8PathBuf,
    },
    /// Export the built package.
    ExportPackage {
        /// Axis point that was built.
        point: AxisPoint,
        /// Absolute dependency marker path.
        marker: Utf8PathBuf,
    },
}

/// Invocations a driver refuses.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// The mode needs a compiler and build type but one is missing.
    #[error("mode {mode} requires both -c/--compiler and -b/--build-type")]
    MissingAxis {
        /// Requested mode.
        mode: DriverMode,
    },
    /// The mode is only available through the orchestrator.
    #[error("mode {mode} cannot be used when running a driver directly")]
    NotAllowedDirectly {
        /// Requested mode.
        mode: DriverMode,
    },
    /// The mode is only available when running a driver directly.
    #[error("mode {mode} is only available when running a driver directly")]
    DirectOnly {
        /// Requested mode.
        mode: DriverMode,
    },
}

/// Map `invocation` onto the actions `descriptor` performs in `context`.
///
/// # Errors
///
/// Returns [`DispatchError`] when the invocation is not acceptable in the
/// current context.
pub fn dispatch(
    descriptor: &DriverDescriptor,
    invocation: &DriverInvocation,
    context: &DriverContext,
) -> Result<Vec<DriverAction>, DispatchError> {
    let mode = invocation.mode;
    match mode {
        DriverMode::NameOnly => return Ok(vec![DriverAction::PrintReference(descriptor.reference())]),
        DriverMode::RemovePackage => {
            return Ok(vec![DriverAction::RemovePackage {
                reference: descriptor.reference(),
            }]);
        }
        DriverMode::CheckChanges => {
            let export_marker = context.root.join(
                context
                    .deps_dir
                    .join("exports")
                    .join(format!("{}.build", descriptor.target)),
            );
            return Ok(vec![DriverAction::CheckChanges { export_marker }]);
        }
        DriverMode::ExportOnly => return Ok(vec![DriverAction::ExportOnly]),
        _ => {}
    }

    let point = resolve_point(invocation, context)?;
    let caps = descriptor.capabilities;
    let mut actions = Vec::new();

    if !context.invoked_from_orchestrator {
        match mode {
            DriverMode::BuildLocally if caps.buildable => {
                if !caps.out_of_tree {
                    actions.push(DriverAction::BuildDependencies {
                        point: point.clone(),
                        target: descriptor.target.to_owned(),
                    });
                }
                actions.push(DriverAction::BuildLocally { point });
            }
            DriverMode::GenTidyInfo | DriverMode::TestTidyInfo => {
                push_tidy(&mut actions, caps.tidyable, mode, point, context);
            }
            _ => return Err(DispatchError::NotAllowedDirectly { mode }),
        }
        return Ok(actions);
    }

    match mode {
        DriverMode::BuildLocally => return Err(DispatchError::DirectOnly { mode }),
        DriverMode::GenTidyInfo | DriverMode::TestTidyInfo => {
            push_tidy(&mut actions, caps.tidyable, mode, point, context);
        }
        DriverMode::TestPackage => {
            if caps.buildable && context.has_test_package {
                let marker = context.marker(&point, descriptor.target, ArtifactKind::TestBinary);
                actions.push(DriverAction::TestPackage { point, marker });
            }
        }
        _ => {
            let marker =
                context.marker(&point, descriptor.target, ArtifactKind::DependencySatisfied);
            if caps.buildable {
                actions.push(DriverAction::BuildPackage {
                    point: point.clone(),
                    marker: marker.clone(),
                });
            }
            if caps.exportable {
                actions.push(DriverAction::ExportPackage { point, marker });
            }
        }
    }
    Ok(actions)
}

fn resolve_point(
    invocation: &DriverInvocation,
    context: &DriverContext,
) -> Result<AxisPoint, DispatchError> {
    let missing = || DispatchError::MissingAxis {
        mode: invocation.mode,
    };
    if context.invoked_from_orchestrator {
        let compiler = invocation.compiler.clone().ok_or_else(missing)?;
        let build_type = invocation.build_type.ok_or_else(missing)?;
        return Ok(AxisPoint::new(compiler, build_type));
    }
    let compiler = invocation
        .compiler
        .clone()
        .or_else(|| context.default_compiler.clone())
        .ok_or_else(missing)?;
    Ok(AxisPoint::new(
        compiler,
        invocation.build_type.unwrap_or(BuildType::Release),
    ))
}

fn push_tidy(
    actions: &mut Vec<DriverAction>,
    tidyable: bool,
    mode: DriverMode,
    point: AxisPoint,
    context: &DriverContext,
) {
    if !tidyable {
        return;
    }
    let working_dir = if mode == DriverMode::TestTidyInfo && context.has_test_package {
        context.directory.join(TEST_PACKAGE_DIR)
    } else {
        context.directory.clone()
    };
    let destination = context.tidy_destination(&working_dir);
    actions.push(DriverAction::GenerateTidyInfo {
        point,
        working_dir,
        destination,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    const NET: DriverDescriptor = DriverDescriptor::new("net", "acme-net", "0.3.1");

    #[fixture]
    fn orchestrated() -> DriverContext {
        DriverContext {
            root: Utf8PathBuf::from("/repo"),
            directory: Utf8PathBuf::from("/repo/net"),
            deps_dir: Utf8PathBuf::from(".deps"),
            invoked_from_orchestrator: true,
            default_compiler: None,
            has_test_package: true,
        }
    }

    #[fixture]
    fn direct() -> DriverContext {
        DriverContext {
            invoked_from_orchestrator: false,
            default_compiler: Some("gcc".into()),
            ..orchestrated()
        }
    }

    fn at(mode: DriverMode) -> DriverInvocation {
        DriverInvocation::new("gcc", BuildType::Debug, mode)
    }

    fn point() -> AxisPoint {
        AxisPoint::new("gcc", BuildType::Debug)
    }

    #[rstest]
    fn name_only_prints_reference(orchestrated: DriverContext) {
        let actions = dispatch(&NET, &DriverInvocation::bare(DriverMode::NameOnly), &orchestrated)
            .expect("dispatch");
        assert_eq!(actions, vec![DriverAction::PrintReference("acme-net/0.3.1".into())]);
    }

    #[rstest]
    fn check_changes_targets_export_marker(direct: DriverContext) {
        let actions = dispatch(&NET, &DriverInvocation::bare(DriverMode::CheckChanges), &direct)
            .expect("dispatch");
        assert_eq!(
            actions,
            vec![DriverAction::CheckChanges {
                export_marker: Utf8PathBuf::from("/repo/.deps/exports/net.build"),
            }]
        );
    }

    #[rstest]
    fn build_mode_builds_then_exports(orchestrated: DriverContext) {
        let descriptor = NET.exportable(true);
        let actions = dispatch(&descriptor, &at(DriverMode::Build), &orchestrated).expect("dispatch");
        let marker = Utf8PathBuf::from("/repo/.deps/gcc/debug/net.dep");
        assert_eq!(
            actions,
            vec![
                DriverAction::BuildPackage {
                    point: point(),
                    marker: marker.clone(),
                },
                DriverAction::ExportPackage {
                    point: point(),
                    marker,
                },
            ]
        );
    }

    #[rstest]
    fn test_mode_writes_test_marker(orchestrated: DriverContext) {
        let actions = dispatch(&NET, &at(DriverMode::TestPackage), &orchestrated).expect("dispatch");
        assert_eq!(
            actions,
            vec![DriverAction::TestPackage {
                point: point(),
                marker: Utf8PathBuf::from("/repo/.deps/gcc/debug/net.test"),
            }]
        );
    }

    #[rstest]
    fn test_mode_without_test_package_is_noop(orchestrated: DriverContext) {
        let context = DriverContext {
            has_test_package: false,
            ..orchestrated
        };
        let actions = dispatch(&NET, &at(DriverMode::TestPackage), &context).expect("dispatch");
        assert!(actions.is_empty());
    }

    #[rstest]
    fn test_tidy_runs_in_test_package(orchestrated: DriverContext) {
        let actions = dispatch(&NET, &at(DriverMode::TestTidyInfo), &orchestrated).expect("dispatch");
        assert_eq!(
            actions,
            vec![DriverAction::GenerateTidyInfo {
                point: point(),
                working_dir: Utf8PathBuf::from("/repo/net/test"),
                destination: Utf8PathBuf::from("/repo/.tidy-builds/net_test_"),
            }]
        );
    }

    #[rstest]
    fn disabled_capability_is_successful_noop(orchestrated: DriverContext) {
        let descriptor = NET.tidyable(false);
        let actions = dispatch(&descriptor, &at(DriverMode::GenTidyInfo), &orchestrated).expect("dispatch");
        assert!(actions.is_empty());
    }

    #[rstest]
    fn orchestrated_build_requires_axis(orchestrated: DriverContext) {
        let err = dispatch(&NET, &DriverInvocation::bare(DriverMode::Build), &orchestrated)
            .expect_err("missing axis");
        assert_eq!(err, DispatchError::MissingAxis { mode: DriverMode::Build });
    }

    #[rstest]
    #[case(DriverMode::Build)]
    #[case(DriverMode::TestPackage)]
    fn direct_invocation_rejects_orchestrated_modes(direct: DriverContext, #[case] mode: DriverMode) {
        let err = dispatch(&NET, &at(mode), &direct).expect_err("rejected");
        assert_eq!(err, DispatchError::NotAllowedDirectly { mode });
    }

    #[rstest]
    fn direct_build_locally_uses_defaults(direct: DriverContext) {
        let actions = dispatch(&NET, &DriverInvocation::bare(DriverMode::BuildLocally), &direct)
            .expect("dispatch");
        let expected = AxisPoint::new("gcc", BuildType::Release);
        assert_eq!(
            actions,
            vec![
                DriverAction::BuildDependencies {
                    point: expected.clone(),
                    target: "net".into(),
                },
                DriverAction::BuildLocally { point: expected },
            ]
        );
    }

    #[rstest]
    fn out_of_tree_skips_dependency_build(direct: DriverContext) {
        let descriptor = NET.out_of_tree(true);
        let actions = dispatch(&descriptor, &at(DriverMode::BuildLocally), &direct).expect("dispatch");
        assert_eq!(actions, vec![DriverAction::BuildLocally { point: point() }]);
    }

    #[rstest]
    fn build_locally_is_refused_under_orchestrator(orchestrated: DriverContext) {
        let err = dispatch(&NET, &at(DriverMode::BuildLocally), &orchestrated).expect_err("refused");
        assert_eq!(err, DispatchError::DirectOnly { mode: DriverMode::BuildLocally });
    }
}
