//! Rule file and emitted plan output.
//!
//! The rule file is replaced atomically and only when its digest changes, so
//! `make` sees either the old or the new plan and an unchanged plan keeps its
//! timestamp.

use anyhow::{Context, Result, anyhow};
use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs as cap_fs};
use sha2::digest::Output;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, Write};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Return `true` when `path` is the `-` sentinel meaning standard output.
#[must_use]
pub fn is_stdout_path(path: &Utf8Path) -> bool {
    path.as_str() == "-"
}

fn digest(bytes: &[u8]) -> Output<Sha256> {
    Sha256::digest(bytes)
}

fn existing_digest(path: &Utf8Path) -> Result<Option<Output<Sha256>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(digest(&bytes))),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("failed to read rule file {path}")),
    }
}

/// Write `content` to `path` unless the file already holds it. Returns
/// whether the file was written.
///
/// # Errors
///
/// Fails when the existing file cannot be read or the replacement cannot be
/// written or renamed into place.
pub fn write_rule_file_if_changed(path: &Utf8Path, content: &str) -> Result<bool> {
    let wanted = digest(content.as_bytes());
    if existing_digest(path)? == Some(wanted) {
        debug!(path = %path, "rule file unchanged");
        return Ok(false);
    }
    let parent = path
        .parent()
        .filter(|p| !p.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    fs::create_dir_all(parent).with_context(|| format!("failed to create directory {parent}"))?;
    let mut tmp = NamedTempFile::new_in(parent)
        .with_context(|| format!("failed to create temporary file in {parent}"))?;
    {
        let handle = tmp.as_file_mut();
        handle
            .write_all(content.as_bytes())
            .context("failed to write rule file")?;
        handle.flush().context("failed to flush rule file")?;
        handle.sync_all().context("failed to sync rule file")?;
    }
    tmp.persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("failed to replace rule file {path}"))?;
    info!(path = %path, "wrote rule file");
    Ok(true)
}

fn open_parent(path: &Utf8Path) -> Result<(cap_fs::Dir, Utf8PathBuf)> {
    if path.is_relative() {
        let dir = cap_fs::Dir::open_ambient_dir(".", ambient_authority())
            .context("failed to open the current directory")?;
        return Ok((dir, path.to_owned()));
    }
    let (base, dir) = path
        .ancestors()
        .skip(1)
        .find_map(|candidate| {
            cap_fs::Dir::open_ambient_dir(candidate, ambient_authority())
                .ok()
                .map(|dir| (candidate, dir))
        })
        .ok_or_else(|| anyhow!("no existing parent directory for {path}"))?;
    let relative = path
        .strip_prefix(base)
        .with_context(|| format!("failed to make {path} relative to {base}"))?
        .to_owned();
    Ok((dir, relative))
}

/// Write an emitted plan to `path`, creating missing parent directories.
///
/// # Errors
///
/// Fails when the file or its parents cannot be created or written.
pub fn write_emit_file(path: &Utf8Path, content: &str) -> Result<()> {
    let (dir, relative) = open_parent(path)?;
    if let Some(parent) = relative.parent().filter(|p| !p.as_str().is_empty()) {
        dir.create_dir_all(parent)
            .with_context(|| format!("failed to create directory {parent}"))?;
    }
    let mut file = dir
        .create(&relative)
        .with_context(|| format!("failed to create {path}"))?;
    file.write_all(content.as_bytes())
        .with_context(|| format!("failed to write {path}"))?;
    file.sync_all()
        .with_context(|| format!("failed to sync {path}"))?;
    info!(path = %path, "emitted build plan");
    Ok(())
}

/// Write `content` to standard output. A closed pipe is not an error.
///
/// # Errors
///
/// Fails on any other write error.
pub fn write_stdout(content: &str) -> Result<()> {
    let mut out = io::stdout().lock();
    match out.write_all(content.as_bytes()).and_then(|()| out.flush()) {
        Err(err) if err.kind() != io::ErrorKind::BrokenPipe => {
            Err(err).context("failed to write to standard output")
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    #[fixture]
    fn dir() -> (TempDir, Utf8PathBuf) {
        let tmp = tempfile::tempdir().expect("temp dir");
        let path = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).expect("utf8 path");
        (tmp, path)
    }

    #[rstest]
    #[case("-", true)]
    #[case("plan.mk", false)]
    #[case("./-", false)]
    fn detects_stdout_sentinel(#[case] candidate: &str, #[case] expected: bool) {
        assert_eq!(is_stdout_path(Utf8Path::new(candidate)), expected);
    }

    #[rstest]
    fn rule_file_written_once(dir: (TempDir, Utf8PathBuf)) {
        let (_tmp, root) = dir;
        let path = root.join(".deps/Makefile.generated");
        assert!(write_rule_file_if_changed(&path, "FORCE:\n").expect("first write"));
        assert!(!write_rule_file_if_changed(&path, "FORCE:\n").expect("second write"));
        assert_eq!(fs::read_to_string(&path).expect("read"), "FORCE:\n");
    }

    #[rstest]
    fn changed_plan_replaces_rule_file(dir: (TempDir, Utf8PathBuf)) {
        let (_tmp, root) = dir;
        let path = root.join("Makefile.generated");
        fs::write(&path, "old").expect("seed");
        assert!(write_rule_file_if_changed(&path, "new").expect("write"));
        assert_eq!(fs::read_to_string(&path).expect("read"), "new");
        let leftovers: Vec<_> = fs::read_dir(&root).expect("list").collect();
        assert_eq!(leftovers.len(), 1, "temporary files must not remain");
    }

    #[rstest]
    fn emit_creates_parents(dir: (TempDir, Utf8PathBuf)) {
        let (_tmp, root) = dir;
        let path = root.join("nested/out/plan.mk");
        write_emit_file(&path, "FORCE:\n").expect("emit");
        assert_eq!(fs::read_to_string(&path).expect("read"), "FORCE:\n");
    }
}
