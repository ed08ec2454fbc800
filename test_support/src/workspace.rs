//! Throwaway repositories for orchestrator tests.
//!
//! A [`TestWorkspace`] is a temporary directory carrying the root marker, a
//! `targets.yaml`, executable drivers, and a scripted toolchain probe.

use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use tempfile::TempDir;

use crate::write_executable;

/// Prefix marking test targets in the default layout.
pub const TEST_PREFIX: &str = "test-";

/// Directory holding test targets in the default layout.
pub const TEST_SUBTREE: &str = ".ci/tests";

/// Compilers reported by [`TestWorkspace::install_probe`] unless overridden.
pub const DEFAULT_COMPILERS: [&str; 2] = ["gcc", "clang"];

/// A temporary repository in the default layout.
#[derive(Debug)]
pub struct TestWorkspace {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl TestWorkspace {
    /// Create an empty workspace containing only the root marker.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be prepared.
    #[must_use]
    pub fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf())
            .expect("utf8 temp dir")
            .canonicalize_utf8()
            .expect("canonical temp dir");
        fs::write(root.join(".keelson-root"), "").expect("write root marker");
        Self { _dir: dir, root }
    }

    /// Absolute, canonical root.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Directory of target `id` in the default layout.
    #[must_use]
    pub fn target_dir(&self, id: &str) -> Utf8PathBuf {
        id.strip_prefix(TEST_PREFIX).map_or_else(
            || self.root.join(id),
            |rest| self.root.join(TEST_SUBTREE).join(rest),
        )
    }

    /// Write `content` to `relative`, creating parent directories.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be written.
    pub fn write(&self, relative: &str, content: &str) -> Utf8PathBuf {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(&path, content).expect("write file");
        path
    }

    /// Write `yaml` as the target declaration.
    pub fn declare(&self, yaml: &str) -> &Self {
        self.write("targets.yaml", yaml);
        self
    }

    /// Declare `entries` in order and give every target a driver.
    pub fn with_targets(&self, entries: &[(&str, &[&str])]) -> &Self {
        let yaml: String = entries
            .iter()
            .map(|(id, deps)| {
                if deps.is_empty() {
                    format!("{id}: []\n")
                } else {
                    format!("{id}: [{}]\n", deps.join(", "))
                }
            })
            .collect();
        self.declare(&yaml);
        for (id, _) in entries {
            self.add_driver(id);
        }
        self
    }

    /// Create an executable driver for `id` that exits successfully.
    pub fn add_driver(&self, id: &str) -> Utf8PathBuf {
        let path = self.target_dir(id).join("driver");
        write_executable(&path, "#!/bin/sh\nexit 0\n");
        path
    }

    /// Install a toolchain probe reporting `compilers` (the first is the
    /// default) and every build type.
    pub fn install_probe(&self, compilers: &[&str]) -> Utf8PathBuf {
        let default = compilers.first().copied().unwrap_or("gcc");
        let list = compilers
            .iter()
            .map(|c| format!("\"{c}\""))
            .collect::<Vec<_>>()
            .join(",");
        let script = format!(
            concat!(
                "#!/bin/sh\n",
                "if [ \"$1\" = \"--show-all-json\" ]; then\n",
                "  printf '%s\\n' '{{\"DEFAULT_COMPILER\":\"{default}\",",
                "\"AVAILABLE_COMPILERS\":[{list}],",
                "\"AVAILABLE_BUILD_TYPES\":[\"debug\",\"release\",\"relwithdebinfo\",\"minsizerel\"]}}'\n",
                "  exit 0\n",
                "fi\n",
                "printf '{{\"CC\":\"%s\",\"CXX\":\"%s++\",\"PATH\":null}}\\n' \"$2\" \"$2\"\n",
            ),
            default = default,
            list = list,
        );
        let path = self.root.join("toolchain/probe");
        write_executable(&path, &script);
        path
    }

    /// Generated rule file in the default layout.
    #[must_use]
    pub fn rule_file(&self) -> Utf8PathBuf {
        self.root.join(".deps/Makefile.generated")
    }
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}
