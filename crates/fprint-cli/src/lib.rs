//! fprint-cli - command-line fingerprint verification
//!
//! Library half of the `fprint-verify` binary: config overrides, the
//! verify command and console reporting.

pub mod commands;
pub mod report;

pub use commands::{effective_config, init_config, verify, BusArg, ConfigOverrides};
