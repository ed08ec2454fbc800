//! Application entry point.
//!
//! Parses command-line arguments, delegates execution to [`runner::run`], and
//! maps the outcome to the process exit code.

use clap::Parser;
use keelson::{cli::Cli, graph::GraphError, resolve::ResolveError, runner};
use miette::Diagnostic;
use std::io::{self, Write};
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::fmt;

/// Exit code for invalid declarations and requests.
const DOMAIN_ERROR_EXIT: u8 = 2;

fn domain_diagnostic(err: &anyhow::Error) -> Option<&dyn Diagnostic> {
    err.downcast_ref::<GraphError>()
        .map(|e| e as &dyn Diagnostic)
        .or_else(|| err.downcast_ref::<ResolveError>().map(|e| e as &dyn Diagnostic))
}

fn report(err: &anyhow::Error) -> io::Result<u8> {
    let mut stderr = io::stderr().lock();
    if let Some(diagnostic) = domain_diagnostic(err) {
        let code = diagnostic
            .code()
            .map_or_else(String::new, |c| format!("[{c}]"));
        match diagnostic.help() {
            Some(help) => writeln!(stderr, "error{code}: {diagnostic} ({help})")?,
            None => writeln!(stderr, "error{code}: {diagnostic}")?,
        }
        return Ok(DOMAIN_ERROR_EXIT);
    }
    writeln!(stderr, "error: {err:#}")?;
    Ok(1)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let max_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::ERROR
    };
    fmt()
        .with_max_level(max_level)
        .with_writer(io::stderr)
        .init();
    match runner::run(&cli) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            tracing::debug!(error = ?err, "run failed");
            ExitCode::from(report(&err).unwrap_or(1))
        }
    }
}
