//! Failures raised while resolving target tokens.

// The unused_assignments lint fires on miette/thiserror derive output in some
// Rust versions but not others, so `#[expect]` cannot be used here.
#![allow(
    clippy::allow_attributes,
    clippy::allow_attributes_without_reason,
    unused_assignments
)]

use miette::Diagnostic;
use thiserror::Error;

/// Errors raised by the token resolver.
#[derive(Debug, Clone, Error, Diagnostic, PartialEq, Eq)]
pub enum ResolveError {
    /// The token is neither a known id nor a target directory.
    #[error("unknown target `{token}` (choose from {})", .choices.join(", "))]
    #[diagnostic(
        code(keelson::resolve::unknown_target),
        help("Pass a declared target id, a reserved name, or the path of a target directory.")
    )]
    UnknownTarget {
        /// The token as given.
        token: String,
        /// Every valid choice: reserved names first, then declared ids.
        choices: Vec<String>,
    },

    /// Creative and destructive tokens were requested together.
    #[error("cannot mix creative target `{creative}` with destructive target `{destructive}`")]
    #[diagnostic(
        code(keelson::resolve::mixed_target_kinds),
        help("Run destructive targets such as `clean` in a separate invocation.")
    )]
    MixedTargetKinds {
        /// First creative id seen.
        creative: String,
        /// First destructive id seen.
        destructive: String,
    },
}
