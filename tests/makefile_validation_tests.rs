//! Feeds generated rule files to the real `make`.
//!
//! The repository root contains a space and the target and compiler names
//! use every punctuation character ids may carry, so a dry run only succeeds
//! when `make` parses each target and prerequisite as a single word.

#![cfg(unix)]

use camino::{Utf8Path, Utf8PathBuf};
use keelson::axis::{BuildAxis, BuildType};
use keelson::config::{Workspace, WorkspaceLayout};
use keelson::declaration::Declaration;
use keelson::graph::TargetGraph;
use keelson::makefile_gen;
use keelson::plan::BuildPlan;
use std::fs;
use std::process::Command;
use test_support::write_executable;

const TARGETS: [(&str, &[&str]); 3] = [
    ("core_lib.v2", &[]),
    ("crash-consensus", &["core_lib.v2"]),
    ("test-crash-consensus", &["crash-consensus"]),
];

fn make_available() -> bool {
    Command::new("make")
        .arg("--version")
        .output()
        .is_ok_and(|out| out.status.success())
}

fn write_rule_file(root: &Utf8Path) -> Utf8PathBuf {
    let workspace = Workspace::new(root, WorkspaceLayout::default());
    let declaration =
        Declaration::from_entries(TARGETS.iter().map(|(id, deps)| (*id, deps.iter().copied())));
    for (id, _) in TARGETS {
        write_executable(&workspace.driver_path(id), "#!/bin/sh\nexit 0\n");
        let export = root.join(workspace.export_marker(id));
        fs::create_dir_all(export.parent().expect("export parent")).expect("exports dir");
        fs::write(&export, "").expect("export marker");
    }
    let graph = TargetGraph::load(&declaration, &workspace)
        .and_then(TargetGraph::into_acyclic)
        .expect("acyclic graph");
    let axis = BuildAxis::new(
        vec!["gcc".into(), "clang-15".into(), "g++".into()],
        vec![BuildType::Release, BuildType::MinSizeRel],
    );
    let text = makefile_gen::generate(&BuildPlan::generate(&graph, &axis, &workspace));
    let rule_file = workspace.rule_file_path();
    fs::create_dir_all(rule_file.parent().expect("rule file parent")).expect("deps dir");
    fs::write(&rule_file, text).expect("write rule file");
    rule_file
}

fn dry_run(root: &Utf8Path, rule_file: &Utf8Path, goal: &str) -> String {
    let out = Command::new("make")
        .args(["-n", "-f", rule_file.as_str(), goal])
        .current_dir(root)
        .env_remove("KEELSON_BUILD_VERBOSITY")
        .output()
        .expect("spawn make");
    assert!(
        out.status.success(),
        "make -n {goal} failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8(out.stdout).expect("stdout utf8")
}

#[test]
fn generated_rule_file_is_accepted_by_make() {
    if !make_available() {
        eprintln!("skipping test: make must be installed for integration tests");
        return;
    }
    let dir = tempfile::tempdir().expect("tempdir");
    let base = Utf8Path::from_path(dir.path()).expect("utf8 tempdir");
    let root = base.join("repo with space");
    fs::create_dir_all(&root).expect("root");
    let rule_file = write_rule_file(&root);

    let checks = dry_run(&root, &rule_file, ".deps/g++/minsizerel/crash-consensus.check");
    assert!(checks.contains("--export-only"), "{checks}");
    assert!(checks.contains("--check-changes"), "{checks}");

    let build = dry_run(
        &root,
        &rule_file,
        ".deps/clang-15/release/test-crash-consensus.testtidy",
    );
    let position = |needle: &str| {
        build
            .find(needle)
            .unwrap_or_else(|| panic!("missing {needle} in {build}"))
    };
    assert!(position("/core_lib.v2") < position("/crash-consensus"));
    assert!(position("/crash-consensus") < position("--test-package"));
    assert!(build.contains("clang-15"), "{build}");
}
