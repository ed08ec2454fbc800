//! Test utilities for the orchestrator.
//!
//! This crate provides throwaway workspaces, a scripted stand-in for `make`
//! that records how it was called, and guards for environment mutation.

pub mod env_lock;
pub mod env_var_guard;
pub mod workspace;

pub use env_lock::EnvLock;
pub use env_var_guard::EnvVarGuard;
pub use workspace::TestWorkspace;

use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use tempfile::TempDir;

/// Write `content` to `path` and mark it executable.
///
/// # Panics
///
/// Panics if the file cannot be written.
pub fn write_executable(path: &Utf8Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent");
    }
    fs::write(path, content).expect("write script");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).expect("chmod");
    }
}

/// A fake `make` recording its arguments and selected environment
/// variables, one line per call.
#[derive(Debug)]
pub struct FakeMake {
    _dir: TempDir,
    program: Utf8PathBuf,
    args_log: Utf8PathBuf,
    env_log: Utf8PathBuf,
}

impl FakeMake {
    /// Create a fake whose n-th call exits with `exit_codes[n]`; calls
    /// beyond the list succeed.
    ///
    /// # Panics
    ///
    /// Panics if the script cannot be written.
    #[must_use]
    pub fn new(exit_codes: &[i32]) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let base = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 temp dir");
        let program = base.join("make");
        let args_log = base.join("args.log");
        let env_log = base.join("env.log");
        let arms: String = exit_codes
            .iter()
            .enumerate()
            .map(|(i, code)| format!("  {}) exit {code} ;;\n", i + 1))
            .collect();
        let script = format!(
            concat!(
                "#!/bin/sh\n",
                "printf '%s\\n' \"$*\" >> '{args}'\n",
                "printf '%s|%s|%s|%s\\n' \"${{KEELSON_INVOKED_FROM_BUILDSCRIPT:-}}\" ",
                "\"${{KEELSON_BUILD_VERBOSITY:-}}\" \"${{CC:-}}\" \"${{CXX:-}}\" >> '{env}'\n",
                "n=$(wc -l < '{args}' | tr -d ' ')\n",
                "case $n in\n",
                "{arms}",
                "esac\n",
                "exit 0\n",
            ),
            args = args_log,
            env = env_log,
            arms = arms,
        );
        write_executable(&program, &script);
        Self {
            _dir: dir,
            program,
            args_log,
            env_log,
        }
    }

    /// Path of the fake executable.
    #[must_use]
    pub fn program(&self) -> &Utf8Path {
        &self.program
    }

    /// Argument lines, one per call, words joined by single spaces.
    #[must_use]
    pub fn invocations(&self) -> Vec<String> {
        read_lines(&self.args_log)
    }

    /// Environment lines, one per call:
    /// `invoked|verbosity|CC|CXX`.
    #[must_use]
    pub fn environments(&self) -> Vec<String> {
        read_lines(&self.env_log)
    }
}

fn read_lines(path: &Utf8Path) -> Vec<String> {
    fs::read_to_string(path)
        .map(|text| text.lines().map(str::to_owned).collect())
        .unwrap_or_default()
}
