//! Injector CLI - command line front end for the prefab injector
//!
//! `prefab-injector` submits tasks and batches, queries persisted state and
//! runs the worker daemon. Results are JSON on stdout; logs go to stderr.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod cli;
pub mod logging;
pub mod run;

pub use cli::{command, CliArgs, CliError, LogFormat, Mode};
pub use run::{execute, Exit};
