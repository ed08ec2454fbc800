#![forbid(unsafe_code)]

//! Shared environment constants used across keelson crates (library, tests, and
//! helpers).

/// Environment variable override for the `make` executable.
///
/// # Examples
///
/// ```
/// use executor_env::MAKE_ENV;
/// assert_eq!(MAKE_ENV, "KEELSON_MAKE");
/// ```
pub const MAKE_ENV: &str = "KEELSON_MAKE";

/// Marker exported to every child process started by the orchestrator.
///
/// Drivers use its presence to skip re-resolving the compiler and build type
/// that the orchestrator already pinned.
pub const INVOKED_FROM_ORCHESTRATOR_ENV: &str = "KEELSON_INVOKED_FROM_BUILDSCRIPT";

/// Switches the generated Makefile into verbose mode when non-empty.
pub const BUILD_VERBOSITY_ENV: &str = "KEELSON_BUILD_VERBOSITY";
