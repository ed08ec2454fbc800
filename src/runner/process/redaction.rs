//! Redaction of secrets from logged executor arguments.
//!
//! `make` accepts `NAME=value` assignments on its command line; values of
//! assignments whose name looks like a credential are masked before logging.

const MASK: &str = "***REDACTED***";

const SENSITIVE_FRAGMENTS: [&str; 6] = ["PASSWORD", "TOKEN", "SECRET", "API_KEY", "APIKEY", "AUTH"];

fn is_sensitive_name(name: &str) -> bool {
    let upper = name.trim().to_ascii_uppercase();
    SENSITIVE_FRAGMENTS
        .iter()
        .any(|fragment| upper.contains(fragment))
}

/// Mask the value of `arg` when it assigns a sensitive variable.
///
/// # Examples
/// ```ignore
/// assert_eq!(redact_assignment("API_TOKEN=abc"), "API_TOKEN=***REDACTED***");
/// assert_eq!(redact_assignment("-j"), "-j");
/// ```
pub(super) fn redact_assignment(arg: &str) -> String {
    match arg.split_once('=') {
        Some((name, _)) if !name.starts_with('-') && is_sensitive_name(name) => {
            format!("{}={MASK}", name.trim())
        }
        _ => arg.to_owned(),
    }
}

/// Redact every argument in `args`.
pub(super) fn redact_assignments(args: &[String]) -> Vec<String> {
    args.iter().map(|arg| redact_assignment(arg)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("API_TOKEN=abc", "API_TOKEN=***REDACTED***")]
    #[case("db_password = hunter2", "db_password=***REDACTED***")]
    #[case("CC=gcc", "CC=gcc")]
    #[case(".deps/gcc/release/net.dep", ".deps/gcc/release/net.dep")]
    #[case("--eval=SECRET=x", "--eval=SECRET=x")]
    fn masks_only_sensitive_assignments(#[case] arg: &str, #[case] expected: &str) {
        assert_eq!(redact_assignment(arg), expected);
    }

    #[rstest]
    fn redacts_each_argument() {
        let args = vec![String::from("-s"), String::from("AUTH_HEADER=x")];
        assert_eq!(redact_assignments(&args), ["-s", "AUTH_HEADER=***REDACTED***"]);
    }
}
