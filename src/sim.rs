//! Step-by-step simulation of an [`Aig`](crate::aig::Aig).
//!
//! Every simulator follows the same sequence for one time step: set the inputs, propagate
//! the AND gates in topological order, read the outputs and the alarm, then switch the
//! latches to their next state. They differ only in the domain of the values:
//!
//! - [`AigSimulator`]: Booleans, used for golden runs and simulation-based analysis;
//! - [`SymbolicSimulator`]: SAT literals, gates are encoded through an
//!   [`Encoder`](crate::encode::Encoder);
//! - [`BddSimulator`]: BDDs, concrete inputs only.
//!
//! Values are indexed by AIG variable, variable 0 being the constant false.

mod bdd;
mod concrete;
mod symbolic;

pub use bdd::BddSimulator;
pub use concrete::AigSimulator;
pub use symbolic::SymbolicSimulator;
