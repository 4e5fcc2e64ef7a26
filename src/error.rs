//! Error kinds for the analyze pipeline and numerical kernels.
//!
//! Mirrors the `problemo`/`derive_more` pattern the teacher crate uses for
//! its linear-solver errors (`LinearSolverError` in the Cholesky/LU
//! modules): a flat `Display + Error` enum convertible into a
//! [`problemo::Problem`] via `.via(...)`.

use derive_more::{Display, Error};

/// Error kinds raised by the analyze ("blend") pipeline and the numerical
/// factorization kernels.
#[derive(Debug, Display, Error, PartialEq)]
pub enum BlendError {
    /// Invalid iparm/dparm, inconsistent processor/thread counts, a step
    /// invoked before its prerequisite, or `blcolmin > blcolmax`.
    #[display("invalid parameter: {message}")]
    BadParameter { message: String },

    /// Allocation failure during analyze or numerical factorization.
    #[display("memory allocation failed: {message}")]
    OutOfMemory { message: String },

    /// An invariant checked by `symbol_check` / `cand_check` /
    /// `solver_check` did not hold.
    #[display("internal invariant violated: {message}")]
    InternalInvariant { message: String },

    /// A pipeline stage was asked to run before its prerequisite stage.
    #[display("step '{step}' requires '{prerequisite}' to run first")]
    MissingPrerequisite {
        step: &'static str,
        prerequisite: &'static str,
    },
}

impl BlendError {
    pub fn bad_parameter(message: impl Into<String>) -> Self {
        BlendError::BadParameter {
            message: message.into(),
        }
    }

    pub fn out_of_memory(message: impl Into<String>) -> Self {
        BlendError::OutOfMemory {
            message: message.into(),
        }
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        BlendError::InternalInvariant {
            message: message.into(),
        }
    }
}
