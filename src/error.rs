use thiserror::Error;

use crate::{aig::AigError, cnf::CnfError, solver::SolverError, testcase::TestCaseError};

/// The result of an analysis.
pub type Result<T> = std::result::Result<T, Error>;

/// Error returned when an analysis could not run to completion.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Aig(#[from] AigError),

    #[error("{0}")]
    Cnf(#[from] CnfError),

    #[error("{0}")]
    Solver(#[from] SolverError),

    #[error("{0}")]
    TestCase(#[from] TestCaseError),

    /// More latches reserved for the protection logic than the circuit has.
    #[error("{reserved} error latches requested but the circuit has only {latches} latches")]
    TooManyErrLatches { reserved: usize, latches: usize },

    /// The analysis needs definite inputs.
    #[error("test case {0} has free inputs, which this analysis does not support")]
    UnexpectedFreeInputs(usize),

    /// The environment model does not fit the circuit.
    #[error("environment model needs {expected} {what} but has {found}")]
    EnvironmentMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
}
