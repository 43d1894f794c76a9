//! Error taxonomy for the solver.
//!
//! Every failure is fatal: nothing is silently recovered, and no error
//! crosses the per-timestep loop boundary without aborting the run.

use thiserror::Error;

/// All the ways a simulation can fail.
#[derive(Debug, Error)]
pub enum MpmError {
    /// Unknown command, wrong arity, bad enum value in the input script.
    #[error("parse error (line {line}): {msg}")]
    Parse { line: usize, msg: String },

    /// Inconsistent setup: missing material, missing region, tag collision.
    #[error("configuration error: {0}")]
    Config(String),

    /// Runtime integration failure: J <= 0, NaN timestep, polar
    /// decomposition breakdown. Carries the offending particle and step.
    #[error("integration error at step {timestep}, particle {particle}: {msg}")]
    Integration {
        particle: usize,
        timestep: u64,
        msg: String,
    },

    /// A particle left the problem box in updated-Lagrangian mode.
    #[error("domain error at step {timestep}, particle {particle}: {msg}")]
    Domain {
        particle: usize,
        timestep: u64,
        msg: String,
    },

    /// Dump or restart file failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Restart snapshot could not be encoded or decoded.
    #[error("restart serialization error: {0}")]
    Restart(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MpmError>;

impl MpmError {
    pub fn config(msg: impl Into<String>) -> Self {
        MpmError::Config(msg.into())
    }

    pub fn parse(line: usize, msg: impl Into<String>) -> Self {
        MpmError::Parse {
            line,
            msg: msg.into(),
        }
    }
}
