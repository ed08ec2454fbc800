//! Executor process handling: program resolution, argument assembly, output
//! forwarding, and exit status mapping.

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::ffi::OsString;
use std::io::{self, BufReader};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::{env, thread};
use tracing::info;

use executor_env::MAKE_ENV;

mod file_io;
mod redaction;
mod streaming;

pub use file_io::{is_stdout_path, write_emit_file, write_rule_file_if_changed, write_stdout};
use redaction::redact_assignments;
use streaming::{ForwardStats, forward_child_output};

/// Default executor program.
pub const MAKE_PROGRAM: &str = "make";

fn resolve_make_program_with<F>(mut read_env: F) -> Utf8PathBuf
where
    F: FnMut(&str) -> Option<OsString>,
{
    read_env(MAKE_ENV)
        .filter(|value| !value.is_empty())
        .and_then(|value| Utf8PathBuf::from_path_buf(value.into()).ok())
        .unwrap_or_else(|| Utf8PathBuf::from(MAKE_PROGRAM))
}

/// Executor program, honouring the `KEELSON_MAKE` override.
#[must_use]
pub fn resolve_make_program() -> Utf8PathBuf {
    resolve_make_program_with(|key| env::var_os(key))
}

/// How many recipes `make` may run at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parallelism {
    /// One recipe at a time.
    Serial,
    /// No limit.
    Unlimited,
    /// At most this many recipes.
    Jobs(usize),
}

/// Flags shared by every executor run of an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MakeOptions {
    /// Recipe parallelism.
    pub parallelism: Parallelism,
    /// Echo recipes and directory changes.
    pub verbose: bool,
}

impl MakeOptions {
    /// Command-line flags for `make`.
    #[must_use]
    pub fn flags(&self) -> Vec<String> {
        let mut flags = Vec::new();
        match self.parallelism {
            Parallelism::Serial => {}
            Parallelism::Unlimited => flags.push(String::from("-j")),
            Parallelism::Jobs(n) => {
                flags.push(String::from("-j"));
                flags.push(n.to_string());
            }
        }
        if !self.verbose {
            flags.push(String::from("-s"));
        }
        flags
    }
}

/// A configured executor: program, flags, working directory, and the
/// environment added on top of the inherited one.
#[derive(Debug, Clone)]
pub struct Executor {
    program: Utf8PathBuf,
    options: MakeOptions,
    working_dir: Utf8PathBuf,
    env: Vec<(String, OsString)>,
}

impl Executor {
    /// Create an executor running `program` from `working_dir`.
    #[must_use]
    pub fn new(
        program: impl Into<Utf8PathBuf>,
        options: MakeOptions,
        working_dir: impl Into<Utf8PathBuf>,
    ) -> Self {
        Self {
            program: program.into(),
            options,
            working_dir: working_dir.into(),
            env: Vec::new(),
        }
    }

    /// Variables exported to `make` and, through it, to every driver.
    #[must_use]
    pub fn with_env(mut self, vars: Vec<(String, OsString)>) -> Self {
        self.env = vars;
        self
    }

    /// Program this executor runs.
    #[must_use]
    pub fn program(&self) -> &Utf8Path {
        &self.program
    }

    /// Arguments building `targets` from `rule_file`.
    #[must_use]
    pub fn rule_file_args(&self, rule_file: &Utf8Path, targets: &[Utf8PathBuf]) -> Vec<String> {
        let mut args = self.options.flags();
        args.push(String::from("-f"));
        args.push(rule_file.to_string());
        args.extend(targets.iter().map(ToString::to_string));
        args
    }

    /// Arguments running `goals` from the makefile in `directory`.
    #[must_use]
    pub fn directory_args(&self, directory: &Utf8Path, goals: &[&str]) -> Vec<String> {
        let mut args = self.options.flags();
        args.push(String::from("-C"));
        args.push(directory.to_string());
        args.extend(goals.iter().map(|goal| (*goal).to_owned()));
        args
    }

    /// Build `targets` from `rule_file`, returning the exit code.
    ///
    /// # Errors
    ///
    /// Fails when the executor cannot be started.
    pub fn run_rule_file(&self, rule_file: &Utf8Path, targets: &[Utf8PathBuf]) -> Result<u8> {
        self.run(&self.rule_file_args(rule_file, targets))
    }

    /// Run `goals` from the makefile in `directory`, returning the exit code.
    ///
    /// # Errors
    ///
    /// Fails when the executor cannot be started.
    pub fn run_in_directory(&self, directory: &Utf8Path, goals: &[&str]) -> Result<u8> {
        self.run(&self.directory_args(directory, goals))
    }

    fn command(&self, args: &[String]) -> Command {
        let mut cmd = Command::new(self.program.as_std_path());
        cmd.args(args)
            .current_dir(self.working_dir.as_std_path())
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_os_str())))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    fn run(&self, args: &[String]) -> Result<u8> {
        let mut cmd = self.command(args);
        info!(
            program = %self.program,
            dir = %self.working_dir,
            env = ?self.env.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(),
            "running {} {}",
            self.program,
            redact_assignments(args).join(" ")
        );
        let child = cmd
            .spawn()
            .with_context(|| format!("failed to start {}", self.program))?;
        let status = stream_output(child)
            .with_context(|| format!("failed to collect output of {}", self.program))?;
        let code = exit_code(status);
        tracing::debug!(program = %self.program, %status, code, "executor finished");
        Ok(code)
    }
}

/// Process exit code for `status`; a signal-terminated child maps to
/// `128 + signal`.
#[must_use]
pub fn exit_code(status: ExitStatus) -> u8 {
    if let Some(code) = status.code() {
        return u8::try_from(code & 0xff).unwrap_or(1);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return u8::try_from(128 + signal).unwrap_or(u8::MAX);
        }
    }
    1
}

fn report_forwarding(result: thread::Result<ForwardStats>, stream: &str) {
    match result {
        Ok(stats) if stats.write_failed => {
            tracing::debug!(stream, "parent {stream} closed; child output truncated");
        }
        Ok(_) => {}
        Err(err) => tracing::warn!("{stream} forwarding thread panicked: {err:?}"),
    }
}

fn stream_output(mut child: Child) -> io::Result<ExitStatus> {
    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        if let Err(err) = child.kill() {
            tracing::debug!("failed to kill child with missing pipes: {err}");
        }
        child.wait()?;
        return Err(io::Error::other("child process is missing an output pipe"));
    };
    let out = thread::spawn(move || {
        forward_child_output(BufReader::new(stdout), io::stdout().lock(), "stdout")
    });
    let err = thread::spawn(move || {
        forward_child_output(BufReader::new(stderr), io::stderr().lock(), "stderr")
    });
    let status = child.wait()?;
    report_forwarding(out.join(), "stdout");
    report_forwarding(err.join(), "stderr");
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn make_override_wins() {
        let resolved = resolve_make_program_with(|_| Some(OsString::from("/opt/gmake")));
        assert_eq!(resolved, "/opt/gmake");
    }

    #[rstest]
    #[case(None)]
    #[case(Some(OsString::new()))]
    fn make_defaults_without_override(#[case] value: Option<OsString>) {
        let resolved = resolve_make_program_with(|_| value.clone());
        assert_eq!(resolved, MAKE_PROGRAM);
    }

    #[rstest]
    #[case(Parallelism::Unlimited, false, &["-j", "-s"])]
    #[case(Parallelism::Serial, false, &["-s"])]
    #[case(Parallelism::Jobs(4), true, &["-j", "4"])]
    #[case(Parallelism::Serial, true, &[])]
    fn flags_follow_options(
        #[case] parallelism: Parallelism,
        #[case] verbose: bool,
        #[case] expected: &[&str],
    ) {
        let options = MakeOptions {
            parallelism,
            verbose,
        };
        assert_eq!(options.flags(), expected);
    }

    #[rstest]
    fn rule_file_args_end_with_targets() {
        let executor = Executor::new(
            "make",
            MakeOptions {
                parallelism: Parallelism::Serial,
                verbose: true,
            },
            "/repo",
        );
        let args = executor.rule_file_args(
            Utf8Path::new("/repo/.deps/Makefile.generated"),
            &[Utf8PathBuf::from(".deps/toolchain-options.check")],
        );
        assert_eq!(
            args,
            [
                "-f",
                "/repo/.deps/Makefile.generated",
                ".deps/toolchain-options.check"
            ]
        );
    }

    #[rstest]
    fn directory_args_change_directory_first() {
        let executor = Executor::new(
            "make",
            MakeOptions {
                parallelism: Parallelism::Unlimited,
                verbose: false,
            },
            "/repo",
        );
        let args = executor.directory_args(Utf8Path::new("/repo/toolchain"), &["clean", "distclean"]);
        assert_eq!(args, ["-j", "-s", "-C", "/repo/toolchain", "clean", "distclean"]);
    }

    #[cfg(unix)]
    #[rstest]
    #[case("exit 0", 0)]
    #[case("exit 3", 3)]
    #[case("kill -TERM $$", 143)]
    fn exit_codes_follow_child(#[case] script: &str, #[case] expected: u8) {
        let status = Command::new("sh")
            .arg("-c")
            .arg(script)
            .status()
            .expect("run sh");
        assert_eq!(exit_code(status), expected);
    }
}
