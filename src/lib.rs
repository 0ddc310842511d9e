pub mod aig;
pub mod analysis;
pub mod cnf;
pub mod config;
pub mod encode;
pub mod error;
pub mod sim;
pub mod solver;
pub mod testcase;
pub mod trace;
pub mod translate;

// Re-exporting symbols and modules.
pub use aig::{Aig, AigError, AigLit};
pub use analysis::{
    BddAnalysis, DefinitelyProtected, FalsePositiveAnalysis, FalsePositiveReport,
    SimulationAnalysis, VulnerabilityAnalysis, VulnerabilityReport,
};
pub use cnf::{Clause, Cnf, CnfError, Lit};
pub use config::{Backend, FalsePositiveMode, Options, ProtectedMode};
pub use error::{Error, Result};
pub use solver::{Answer, BddSolver, DecisionProcedure, SatSolver, SolverError};
pub use testcase::{InputValue, TestCase};
pub use trace::{ErrorTrace, SuperfluousTrace};
pub use translate::Translation;
