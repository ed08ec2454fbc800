//! Workspace discovery and layout configuration.
//!
//! A workspace is the directory tree rooted at the nearest ancestor holding
//! [`ROOT_MARKER`]. Its layout has sensible defaults and may be overridden by
//! a `[layout]` table in [`CONFIG_FILE`] at the root.
//!
//! ```toml
//! [layout]
//! test_subtree = "ci/tests"
//! driver = "build-driver"
//! ```

use anyhow::{Context, Result, ensure};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fs;

use crate::axis::BuildAxis;
use crate::target::TargetCategory;
use crate::toolchain::ToolchainCatalogue;

/// File marking the repository root.
pub const ROOT_MARKER: &str = ".keelson-root";

/// Optional layout overrides at the repository root.
pub const CONFIG_FILE: &str = "keelson.toml";

const BOOTSTRAP_MARKER: &str = "toolchain-options.check";
const EXPORTS_DIR: &str = "exports";

/// Where things live inside a workspace, relative to its root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkspaceLayout {
    /// Target declaration file.
    pub declaration: Utf8PathBuf,
    /// File name of the per-target driver.
    pub driver: String,
    /// Identifier prefix marking test targets.
    pub test_prefix: String,
    /// Directory holding test targets, keyed by id without the prefix.
    pub test_subtree: Utf8PathBuf,
    /// Directory holding markers and the rule file.
    pub deps_dir: Utf8PathBuf,
    /// Generated rule file.
    pub rule_file: Utf8PathBuf,
    /// Directory of the toolchain bootstrap driver.
    pub bootstrap_dir: Utf8PathBuf,
    /// Directory receiving destructive actions.
    pub toolchain_dir: Utf8PathBuf,
    /// Toolchain probe program.
    pub probe: Utf8PathBuf,
    /// Scripts run by script-backed drivers.
    pub scripts_dir: Utf8PathBuf,
}

impl Default for WorkspaceLayout {
    fn default() -> Self {
        Self {
            declaration: Utf8PathBuf::from(crate::declaration::DECLARATION_FILE),
            driver: String::from("driver"),
            test_prefix: String::from("test-"),
            test_subtree: Utf8PathBuf::from(".ci/tests"),
            deps_dir: Utf8PathBuf::from(".deps"),
            rule_file: Utf8PathBuf::from(".deps/Makefile.generated"),
            bootstrap_dir: Utf8PathBuf::from("toolchain/options"),
            toolchain_dir: Utf8PathBuf::from("toolchain"),
            probe: Utf8PathBuf::from("toolchain/probe"),
            scripts_dir: Utf8PathBuf::from("toolchain/scripts"),
        }
    }
}

impl WorkspaceLayout {
    fn validate(&self) -> Result<()> {
        ensure!(!self.test_prefix.is_empty(), "layout.test_prefix must not be empty");
        ensure!(
            !self.driver.is_empty() && !self.driver.contains('/'),
            "layout.driver must be a plain file name, got `{}`",
            self.driver
        );
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    layout: WorkspaceLayout,
}

/// A discovered workspace: its absolute root plus the layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: Utf8PathBuf,
    layout: WorkspaceLayout,
}

impl Workspace {
    /// Construct a workspace from an absolute root and a layout.
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>, layout: WorkspaceLayout) -> Self {
        Self {
            root: root.into(),
            layout,
        }
    }

    /// Locate the workspace enclosing `start` and read its configuration.
    ///
    /// # Errors
    ///
    /// Returns an error when no ancestor of `start` carries [`ROOT_MARKER`]
    /// or when [`CONFIG_FILE`] cannot be read or parsed.
    pub fn discover(start: &Utf8Path) -> Result<Self> {
        let start = start
            .canonicalize_utf8()
            .with_context(|| format!("failed to resolve directory {start}"))?;
        let root = start
            .ancestors()
            .find(|dir| dir.join(ROOT_MARKER).is_file())
            .with_context(|| {
                format!("no {ROOT_MARKER} found in {start} or any parent directory")
            })?
            .to_path_buf();
        tracing::debug!(root = %root, "discovered workspace root");
        let layout = read_layout(&root)?;
        Ok(Self::new(root, layout))
    }

    /// Absolute repository root.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Active layout.
    #[must_use]
    pub const fn layout(&self) -> &WorkspaceLayout {
        &self.layout
    }

    /// Return `true` when `id` names a test target.
    #[must_use]
    pub fn is_test_id(&self, id: &str) -> bool {
        id.starts_with(&self.layout.test_prefix)
    }

    /// Category of a declared id: test when prefixed, else normal.
    #[must_use]
    pub fn category_of(&self, id: &str) -> TargetCategory {
        if self.is_test_id(id) {
            TargetCategory::Test
        } else {
            TargetCategory::Normal
        }
    }

    /// Absolute directory of the target `id`.
    #[must_use]
    pub fn target_directory(&self, id: &str) -> Utf8PathBuf {
        match id.strip_prefix(self.layout.test_prefix.as_str()) {
            Some(stem) => self.root.join(&self.layout.test_subtree).join(stem),
            None => self.root.join(id),
        }
    }

    /// Absolute path of the driver for target `id`.
    #[must_use]
    pub fn driver_path(&self, id: &str) -> Utf8PathBuf {
        self.target_directory(id).join(&self.layout.driver)
    }

    /// Absolute path of the target declaration.
    #[must_use]
    pub fn declaration_path(&self) -> Utf8PathBuf {
        self.root.join(&self.layout.declaration)
    }

    /// Absolute path of the generated rule file.
    #[must_use]
    pub fn rule_file_path(&self) -> Utf8PathBuf {
        self.root.join(&self.layout.rule_file)
    }

    /// Absolute directory of the toolchain bootstrap driver.
    #[must_use]
    pub fn bootstrap_directory(&self) -> Utf8PathBuf {
        self.root.join(&self.layout.bootstrap_dir)
    }

    /// Absolute directory receiving destructive actions.
    #[must_use]
    pub fn toolchain_directory(&self) -> Utf8PathBuf {
        self.root.join(&self.layout.toolchain_dir)
    }

    /// Absolute path of the toolchain probe.
    #[must_use]
    pub fn probe_path(&self) -> Utf8PathBuf {
        self.root.join(&self.layout.probe)
    }

    /// Absolute scripts directory for script-backed drivers.
    #[must_use]
    pub fn scripts_directory(&self) -> Utf8PathBuf {
        self.root.join(&self.layout.scripts_dir)
    }

    /// Root-relative marker of the toolchain bootstrap.
    #[must_use]
    pub fn bootstrap_marker(&self) -> Utf8PathBuf {
        self.layout.deps_dir.join(BOOTSTRAP_MARKER)
    }

    /// Root-relative export marker of target `id`.
    #[must_use]
    pub fn export_marker(&self, id: &str) -> Utf8PathBuf {
        self.layout
            .deps_dir
            .join(EXPORTS_DIR)
            .join(format!("{id}.build"))
    }
}

fn read_layout(root: &Utf8Path) -> Result<WorkspaceLayout> {
    let path = root.join(CONFIG_FILE);
    if !path.is_file() {
        return Ok(WorkspaceLayout::default());
    }
    let text = fs::read_to_string(&path).with_context(|| format!("failed to read {path}"))?;
    let file: ConfigFile =
        toml::from_str(&text).with_context(|| format!("failed to parse {path}"))?;
    file.layout
        .validate()
        .with_context(|| format!("invalid layout in {path}"))?;
    tracing::debug!(path = %path, "loaded layout overrides");
    Ok(file.layout)
}

/// Configuration resolved once per invocation and passed down explicitly.
#[derive(Debug, Clone)]
pub struct Config {
    workspace: Workspace,
    catalogue: ToolchainCatalogue,
    axis: BuildAxis,
}

impl Config {
    /// Combine a workspace with the discovered toolchain catalogue.
    #[must_use]
    pub fn new(workspace: Workspace, catalogue: ToolchainCatalogue) -> Self {
        let axis = catalogue.axis();
        Self {
            workspace,
            catalogue,
            axis,
        }
    }

    /// The discovered workspace.
    #[must_use]
    pub const fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Compilers and build types reported by the probe.
    #[must_use]
    pub const fn catalogue(&self) -> &ToolchainCatalogue {
        &self.catalogue
    }

    /// Build axis spanned by the catalogue.
    #[must_use]
    pub const fn axis(&self) -> &BuildAxis {
        &self.axis
    }
}
