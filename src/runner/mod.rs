//! CLI execution and orchestration.
//!
//! This module keeps `main` minimal by providing a single entry point that
//! turns a parsed [`Cli`] into executor runs:
//!
//! 1. load the declaration and normalise the tokens;
//! 2. hand destructive requests straight to the toolchain makefile;
//! 3. validate the graph, expand aggregates, apply dependencies-only;
//! 4. probe the toolchain and render the plan;
//! 5. refresh the rule file when the plan changed;
//! 6. run change checks, then build the requested artefacts.
//!
//! Domain errors surface before any subprocess starts. The returned code is
//! the exit status of the first failing executor run, or of the last one.

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::env;
use std::ffi::OsString;
use tracing::debug;

use crate::cli::Cli;
use crate::config::{Config, Workspace};
use crate::declaration::Declaration;
use crate::graph::{AcyclicGraph, TargetGraph};
use crate::makefile_gen;
use crate::plan::{self, BuildPlan};
use crate::resolve::{Resolver, TargetRequest};
use crate::target::DestructiveAction;
use crate::toolchain::{CommandProbe, Toolchain, ToolchainProbe};
use executor_env::{BUILD_VERBOSITY_ENV, INVOKED_FROM_ORCHESTRATOR_ENV};

mod process;

pub use process::{
    Executor, MAKE_PROGRAM, MakeOptions, Parallelism, exit_code, resolve_make_program,
};

/// Directory the invocation acts from: `-C` resolved against the current
/// directory, or the current directory itself.
///
/// # Errors
///
/// Fails when the current directory is unavailable or not valid UTF-8, or
/// when the requested directory does not exist.
pub fn invocation_directory(cli: &Cli) -> Result<Utf8PathBuf> {
    let cwd = env::current_dir().context("failed to read the current directory")?;
    let cwd = Utf8PathBuf::from_path_buf(cwd)
        .map_err(|p| anyhow::anyhow!("current directory {} is not valid UTF-8", p.display()))?;
    let dir = cli
        .directory
        .as_ref()
        .map_or_else(|| cwd.clone(), |d| cwd.join(d));
    dir.canonicalize_utf8()
        .with_context(|| format!("failed to resolve directory {dir}"))
}

/// Environment exported to `make` and every driver it runs.
///
/// # Errors
///
/// Fails when the toolchain `PATH` cannot be combined with `inherited_path`.
pub fn child_environment(
    verbose: bool,
    toolchain: Option<&Toolchain>,
    inherited_path: Option<OsString>,
) -> Result<Vec<(String, OsString)>> {
    let mut vars = vec![(
        INVOKED_FROM_ORCHESTRATOR_ENV.to_owned(),
        OsString::from("1"),
    )];
    if verbose {
        vars.push((BUILD_VERBOSITY_ENV.to_owned(), OsString::from("1")));
    }
    if let Some(selected) = toolchain {
        vars.extend(selected.environment.variables(inherited_path)?);
    }
    Ok(vars)
}

/// Execute the parsed [`Cli`], returning the process exit code.
///
/// # Errors
///
/// Returns [`crate::graph::GraphError`] and [`crate::resolve::ResolveError`]
/// for invalid declarations and requests; any other failure (I/O, probe,
/// YAML) is reported with context.
pub fn run(cli: &Cli) -> Result<u8> {
    let invocation_dir = invocation_directory(cli)?;
    let workspace = Workspace::discover(&invocation_dir)?;
    let probe = CommandProbe::new(workspace.probe_path(), workspace.root());
    let session = Session {
        workspace,
        invocation_dir: &invocation_dir,
        probe: &probe,
        make_program: resolve_make_program(),
    };
    session.run(cli)
}

/// Everything an invocation acts on besides the command line.
#[derive(Debug)]
pub struct Session<'a, P: ?Sized> {
    /// Discovered workspace.
    pub workspace: Workspace,
    /// Directory path tokens are resolved against.
    pub invocation_dir: &'a Utf8Path,
    /// Source of the toolchain catalogue and environments.
    pub probe: &'a P,
    /// Executor program.
    pub make_program: Utf8PathBuf,
}

impl<P: ToolchainProbe + ?Sized> Session<'_, P> {
    /// Run the invocation described by `cli`.
    ///
    /// # Errors
    ///
    /// See [`run`].
    pub fn run(self, cli: &Cli) -> Result<u8> {
        let Self {
            workspace,
            invocation_dir,
            probe,
            make_program: program,
        } = self;
        orchestrate(cli, workspace, invocation_dir, probe, program)
    }
}

fn orchestrate<P: ToolchainProbe + ?Sized>(
    cli: &Cli,
    workspace: Workspace,
    invocation_dir: &Utf8Path,
    probe: &P,
    program: Utf8PathBuf,
) -> Result<u8> {
    if cli.available_options {
        let catalogue = probe.catalogue()?;
        process::write_stdout(&format!("{}\n", catalogue.to_json()?))?;
        return Ok(0);
    }

    let declaration = Declaration::from_path(workspace.declaration_path())?;
    let resolver = Resolver::new(&declaration, &workspace, invocation_dir);
    let request = if cli.emit.is_some() {
        TargetRequest::Build(Vec::new())
    } else {
        resolver.normalize(&cli.targets)?
    };
    let requested = match request {
        TargetRequest::Destroy(actions) => {
            let child_env = child_environment(cli.verbose, None, None)?;
            let executor = Executor::new(program, cli.make_options(), workspace.root())
                .with_env(child_env);
            return run_destructive(&executor, &workspace, &actions);
        }
        TargetRequest::Build(ids) => ids,
    };

    let graph = TargetGraph::load(&declaration, &workspace)?.into_acyclic()?;
    debug!(targets = graph.len(), "validated target graph");
    let ids = if cli.emit.is_some() {
        Vec::new()
    } else {
        let expanded = resolver.expand_aggregates(&requested);
        if cli.deps_only {
            resolver.dependencies_only(&expanded)
        } else {
            expanded
        }
    };
    debug!(?ids, "resolved target set");

    let catalogue = probe.catalogue()?;
    let config = Config::new(workspace, catalogue);
    if let Some(path) = &cli.emit {
        return emit(&render(&graph, &config), path, invocation_dir).map(|()| 0);
    }
    build(cli, &graph, &config, probe, program, &ids)
}

fn build<P: ToolchainProbe + ?Sized>(
    cli: &Cli,
    graph: &AcyclicGraph,
    config: &Config,
    probe: &P,
    program: Utf8PathBuf,
    ids: &[String],
) -> Result<u8> {
    let toolchain = Toolchain::select(
        probe,
        config.catalogue(),
        cli.compiler.as_deref(),
        cli.build_type,
    )?;
    let rule_file = refresh_rule_file(graph, config)?;

    let child_env = child_environment(cli.verbose, Some(&toolchain), env::var_os("PATH"))?;
    let workspace = config.workspace();
    let executor =
        Executor::new(program, cli.make_options(), workspace.root()).with_env(child_env);

    let checks = plan::check_targets(graph, workspace, &toolchain.point, ids);
    let code = executor.run_rule_file(&rule_file, &checks)?;
    if code != 0 {
        debug!(code, "change checks failed");
        return Ok(code);
    }
    if ids.is_empty() {
        debug!("nothing to build");
        return Ok(0);
    }
    let artifacts = plan::artifact_targets(workspace, &toolchain.point, ids, cli.artifact_kind());
    executor.run_rule_file(&rule_file, &artifacts)
}

fn emit(text: &str, path: &Utf8Path, invocation_dir: &Utf8Path) -> Result<()> {
    if process::is_stdout_path(path) {
        return process::write_stdout(text);
    }
    process::write_emit_file(&invocation_dir.join(path), text)
}

fn render(graph: &AcyclicGraph, config: &Config) -> String {
    let plan = BuildPlan::generate(graph, config.axis(), config.workspace());
    makefile_gen::generate(&plan)
}

fn refresh_rule_file(graph: &AcyclicGraph, config: &Config) -> Result<Utf8PathBuf> {
    let rule_file = config.workspace().rule_file_path();
    let written = process::write_rule_file_if_changed(&rule_file, &render(graph, config))?;
    debug!(path = %rule_file, written, "rule file up to date");
    Ok(rule_file)
}

fn run_destructive(
    executor: &Executor,
    workspace: &Workspace,
    actions: &[DestructiveAction],
) -> Result<u8> {
    let goals: Vec<&str> = actions.iter().map(|action| action.as_str()).collect();
    debug!(?goals, "running destructive actions");
    executor.run_in_directory(&workspace.toolchain_directory(), &goals)
}

#[cfg(test)]
mod tests;
