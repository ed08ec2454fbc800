//! Keelson core library.
//!
//! Keelson builds the packages of a multi-package repository in dependency
//! order. A `targets.yaml` declaration becomes a validated [`graph`] of
//! targets; command-line tokens are [`resolve`]d against it; the graph and
//! the toolchain [`axis`] are compiled into a Makefile ([`plan`],
//! [`makefile_gen`]); and `make` runs each target's driver, which follows the
//! [`driver`] protocol.

pub mod artifact;
pub mod axis;
pub mod cli;
pub mod config;
pub mod declaration;
pub mod driver;
pub mod graph;
pub mod makefile_gen;
pub mod plan;
pub mod resolve;
pub mod runner;
pub mod target;
pub mod toolchain;
