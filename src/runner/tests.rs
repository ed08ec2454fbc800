//! Orchestration tests driving a fake `make`.

#![cfg(unix)]

use super::*;
use crate::axis::BuildType;
use crate::graph::GraphError;
use crate::resolve::ResolveError;
use crate::toolchain::{MockToolchainProbe, ToolchainCatalogue, ToolchainEnvironment};
use indexmap::IndexMap;
use rstest::{fixture, rstest};
use test_support::{FakeMake, TestWorkspace};

#[fixture]
fn repo() -> TestWorkspace {
    let repo = TestWorkspace::new();
    repo.with_targets(&[
        ("core", &[]),
        ("net", &["core"]),
        ("test-net", &["net"]),
    ]);
    repo
}

fn probe() -> MockToolchainProbe {
    let mut probe = MockToolchainProbe::new();
    probe.expect_catalogue().returning(|| {
        Ok(ToolchainCatalogue {
            default_compiler: "gcc".into(),
            compilers: vec!["gcc".into(), "clang".into()],
            build_types: BuildType::ALL.to_vec(),
        })
    });
    probe.expect_environment().returning(|point| {
        Ok(ToolchainEnvironment {
            cc: point.compiler.clone(),
            cxx: format!("{}++", point.compiler),
            path: None,
            extra: IndexMap::new(),
        })
    });
    probe
}

fn run_in<P: ToolchainProbe + ?Sized>(
    repo: &TestWorkspace,
    make: &FakeMake,
    probe: &P,
    cli: &Cli,
) -> Result<u8> {
    let workspace = Workspace::discover(repo.root()).expect("workspace");
    Session {
        workspace,
        invocation_dir: repo.root(),
        probe,
        make_program: make.program().to_path_buf(),
    }
    .run(cli)
}

fn cli(targets: &[&str]) -> Cli {
    Cli {
        targets: targets.iter().map(|t| (*t).to_owned()).collect(),
        ..Cli::default()
    }
}

#[rstest]
fn builds_every_normal_target_by_default(repo: TestWorkspace) {
    let make = FakeMake::new(&[]);
    let code = run_in(&repo, &make, &probe(), &cli(&[])).expect("run");
    assert_eq!(code, 0);
    let rule_file = repo.rule_file();
    assert_eq!(
        make.invocations(),
        [
            format!(
                "-j -s -f {rule_file} .deps/toolchain-options.check .deps/gcc/release/core.check .deps/gcc/release/net.check"
            ),
            format!("-j -s -f {rule_file} .deps/gcc/release/core.dep .deps/gcc/release/net.dep"),
        ]
    );
    assert!(rule_file.is_file());
    assert_eq!(make.environments(), ["1||gcc|gcc++", "1||gcc|gcc++"]);
}

#[rstest]
fn failing_checks_stop_the_build(repo: TestWorkspace) {
    let make = FakeMake::new(&[2]);
    let code = run_in(&repo, &make, &probe(), &cli(&["net"])).expect("run");
    assert_eq!(code, 2);
    assert_eq!(make.invocations().len(), 1);
}

#[rstest]
fn build_failure_is_the_exit_code(repo: TestWorkspace) {
    let make = FakeMake::new(&[0, 4]);
    let code = run_in(&repo, &make, &probe(), &cli(&["net"])).expect("run");
    assert_eq!(code, 4);
    assert_eq!(make.invocations().len(), 2);
}

#[rstest]
fn destructive_request_skips_graph_and_probe() {
    let repo = TestWorkspace::new();
    repo.declare("core: []\nnet: [core]\n");
    let make = FakeMake::new(&[]);
    let code = run_in(&repo, &make, &MockToolchainProbe::new(), &cli(&["clean", "distclean"]))
        .expect("run");
    assert_eq!(code, 0);
    assert_eq!(
        make.invocations(),
        [format!("-j -s -C {}/toolchain clean distclean", repo.root())]
    );
    assert!(!repo.rule_file().exists());
}

#[rstest]
fn unknown_token_fails_before_make(repo: TestWorkspace) {
    let make = FakeMake::new(&[]);
    let err = run_in(&repo, &make, &MockToolchainProbe::new(), &cli(&["nope"]))
        .expect_err("unknown target");
    assert!(matches!(
        err.downcast_ref::<ResolveError>(),
        Some(ResolveError::UnknownTarget { .. })
    ));
    assert!(make.invocations().is_empty());
}

#[rstest]
fn mixed_tokens_fail(repo: TestWorkspace) {
    let make = FakeMake::new(&[]);
    let err = run_in(&repo, &make, &MockToolchainProbe::new(), &cli(&["all", "clean"]))
        .expect_err("mixed kinds");
    assert!(matches!(
        err.downcast_ref::<ResolveError>(),
        Some(ResolveError::MixedTargetKinds { .. })
    ));
    assert!(make.invocations().is_empty());
}

#[rstest]
fn cyclic_declaration_fails_before_probe() {
    let repo = TestWorkspace::new();
    repo.with_targets(&[("a", &["b"]), ("b", &["a"])]);
    let make = FakeMake::new(&[]);
    let err = run_in(&repo, &make, &MockToolchainProbe::new(), &cli(&["a"]))
        .expect_err("cycle");
    assert!(matches!(
        err.downcast_ref::<GraphError>(),
        Some(GraphError::CyclicDependency { .. })
    ));
    assert!(make.invocations().is_empty());
}

#[rstest]
fn deps_only_builds_direct_dependencies(repo: TestWorkspace) {
    let make = FakeMake::new(&[]);
    let request = Cli {
        deps_only: true,
        compiler: Some("clang".into()),
        build_type: BuildType::Debug,
        ..cli(&["test-net"])
    };
    run_in(&repo, &make, &probe(), &request).expect("run");
    let invocations = make.invocations();
    assert_eq!(
        invocations.last().map(String::as_str),
        Some(format!("-j -s -f {} .deps/clang/debug/net.dep", repo.rule_file()).as_str())
    );
}

#[rstest]
fn requested_kind_selects_markers(repo: TestWorkspace) {
    let make = FakeMake::new(&[]);
    let request = Cli {
        gen_tidy_info: true,
        test_packages: true,
        serial_build: true,
        ..cli(&["tests"])
    };
    run_in(&repo, &make, &probe(), &request).expect("run");
    assert_eq!(
        make.invocations().last().map(String::as_str),
        Some(format!("-s -f {} .deps/gcc/release/test-net.testtidy", repo.rule_file()).as_str())
    );
}

#[rstest]
fn verbose_runs_export_verbosity(repo: TestWorkspace) {
    let make = FakeMake::new(&[]);
    let request = Cli {
        verbose: true,
        jobs: Some(3),
        ..cli(&["core"])
    };
    run_in(&repo, &make, &probe(), &request).expect("run");
    let invocations = make.invocations();
    assert!(invocations.iter().all(|line| line.starts_with("-j 3 -f ")));
    assert_eq!(make.environments().first().map(String::as_str), Some("1|1|gcc|gcc++"));
}

#[rstest]
fn unchanged_plan_keeps_rule_file(repo: TestWorkspace) {
    let make = FakeMake::new(&[]);
    run_in(&repo, &make, &probe(), &cli(&["core"])).expect("first run");
    let first = std::fs::metadata(repo.rule_file())
        .and_then(|m| m.modified())
        .expect("mtime");
    run_in(&repo, &make, &probe(), &cli(&["net"])).expect("second run");
    let second = std::fs::metadata(repo.rule_file())
        .and_then(|m| m.modified())
        .expect("mtime");
    assert_eq!(first, second);
}

#[rstest]
fn emit_writes_plan_without_running_make(repo: TestWorkspace) {
    let make = FakeMake::new(&[]);
    let request = Cli {
        emit: Some(Utf8PathBuf::from("out/plan.mk")),
        ..Cli::default()
    };
    let code = run_in(&repo, &make, &probe(), &request).expect("run");
    assert_eq!(code, 0);
    let text = std::fs::read_to_string(repo.root().join("out/plan.mk")).expect("plan");
    assert!(text.starts_with("ifneq ($(KEELSON_BUILD_VERBOSITY),)"));
    assert!(text.contains(".deps/clang/minsizerel/test-net.testtidy:"));
    assert!(make.invocations().is_empty());
}

#[rstest]
fn child_environment_pins_toolchain() {
    let toolchain = Toolchain {
        point: crate::axis::AxisPoint::new("gcc", BuildType::Release),
        environment: ToolchainEnvironment {
            cc: "gcc-13".into(),
            cxx: "g++-13".into(),
            path: Some("/opt/gcc/bin".into()),
            extra: IndexMap::new(),
        },
    };
    let vars = child_environment(false, Some(&toolchain), Some(OsString::from("/usr/bin")))
        .expect("environment");
    let names: Vec<&str> = vars.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(
        names,
        ["KEELSON_INVOKED_FROM_BUILDSCRIPT", "CC", "CXX", "PATH"]
    );
    assert_eq!(
        vars.last().map(|(_, v)| v.clone()),
        Some(OsString::from("/opt/gcc/bin:/usr/bin"))
    );
}
