//! The decision procedure abstraction used by every symbolic analysis.
//!
//! A [`DecisionProcedure`] offers one-shot checks of a whole [`Cnf`] and an incremental
//! session protocol:
//!
//! ```text
//! NO_SESSION --start_session--> OPEN --(add_* | inc_* | push | pop)--> OPEN
//! OPEN --end_session--> NO_SESSION
//! ```
//!
//! [`push`] saves the current session, [`pop`] restores the last saved one. Incremental
//! operations without an open session fail with [`SolverError::NoSession`].
//!
//! Two backends are available: [`SatSolver`] (CaDiCaL) and [`BddSolver`].
//!
//! [`push`]: DecisionProcedure::push
//! [`pop`]: DecisionProcedure::pop

mod bdd;
mod sat;

use std::collections::HashMap;

use thiserror::Error;

use crate::cnf::{Cnf, Lit};

pub use bdd::BddSolver;
pub use sat::SatSolver;

/// Error returned when the session protocol is violated or a backend fails.
#[derive(Debug, Error)]
pub enum SolverError {
    /// An incremental operation was called without an open session.
    #[error("no open incremental session")]
    NoSession,

    /// [`DecisionProcedure::pop`] without a matching push.
    #[error("pop without matching push")]
    NothingToPop,

    /// [`DecisionProcedure::push`] on a session started without push/pop support.
    #[error("push/pop was not enabled when the session started")]
    PushPopDisabled,

    /// The backend answered neither SAT nor UNSAT.
    #[error("the sat solver returned neither sat nor unsat")]
    Unknown,

    /// A variable beyond the capacity of the BDD variable set.
    #[error("variable {0} exceeds the bdd variable capacity {1}")]
    VariableOutOfRange(u32, u16),

    /// The BDD backend cannot represent free inputs.
    #[error("free inputs are not supported by the bdd backend")]
    FreeInputs,
}

/// Outcome of a satisfiability check with model or core extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    /// Satisfiable, with one signed literal per variable of interest, in the order given.
    Sat(Vec<Lit>),
    /// Unsatisfiable, with a subset of the assumptions that is already unsatisfiable.
    Unsat(Vec<Lit>),
}

impl Answer {
    pub fn is_sat(&self) -> bool {
        matches!(self, Answer::Sat(_))
    }

    pub fn model(&self) -> Option<&[Lit]> {
        match self {
            Answer::Sat(model) => Some(model),
            Answer::Unsat(_) => None,
        }
    }

    pub fn core(&self) -> Option<&[Lit]> {
        match self {
            Answer::Sat(_) => None,
            Answer::Unsat(core) => Some(core),
        }
    }
}

/// A model restricted to some variables, for quick lookups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Model(HashMap<u32, bool>);

impl Model {
    /// The value of `lit`, `None` if its variable is not part of the model.
    ///
    /// Constants are always known.
    pub fn value(&self, lit: Lit) -> Option<bool> {
        if lit.is_constant() {
            return Some(lit == Lit::TRUE);
        }
        self.0.get(&lit.var()).map(|&v| lit.eval(v))
    }

    /// Whether `lit` is known to be true.
    pub fn is_true(&self, lit: Lit) -> bool {
        self.value(lit) == Some(true)
    }
}

impl From<&[Lit]> for Model {
    fn from(lits: &[Lit]) -> Self {
        Model(lits.iter().map(|l| (l.var(), l.is_positive())).collect())
    }
}

/// A satisfiability checker, see the [module documentation](self).
pub trait DecisionProcedure {
    /// One-shot check of `cnf`, nothing is kept across calls.
    fn is_sat(&mut self, cnf: &Cnf) -> Result<bool, SolverError>;

    /// One-shot check of `cnf` under `assumptions`, returning a model over
    /// `vars_of_interest` or an unsatisfiable core of the assumptions.
    fn is_sat_model_or_core(
        &mut self,
        cnf: &Cnf,
        assumptions: &[Lit],
        vars_of_interest: &[Lit],
    ) -> Result<Answer, SolverError>;

    /// Starts a new session, discarding any previous one.
    ///
    /// Variables in `keep` must not be eliminated by preprocessing. `use_push_pop`
    /// announces nested [`push`](DecisionProcedure::push) calls.
    fn start_session(&mut self, keep: &[Lit], use_push_pop: bool);

    fn has_session(&self) -> bool;

    /// Discards the session and all saved states.
    fn end_session(&mut self);

    /// Marks `var` as a variable whose value will be queried later.
    fn add_var_to_keep(&mut self, var: Lit) -> Result<(), SolverError>;

    fn add_clause(&mut self, clause: &[Lit]) -> Result<(), SolverError>;

    fn add_unit(&mut self, lit: Lit) -> Result<(), SolverError> {
        self.add_clause(&[lit])
    }

    /// Adds every literal of `cube` as a unit clause.
    fn add_cube(&mut self, cube: &[Lit]) -> Result<(), SolverError> {
        for &lit in cube {
            self.add_unit(lit)?;
        }
        Ok(())
    }

    /// Adds the negation of `cube` as one clause.
    fn add_neg_cube(&mut self, cube: &[Lit]) -> Result<(), SolverError> {
        let clause: Vec<Lit> = cube.iter().map(|&l| !l).collect();
        self.add_clause(&clause)
    }

    fn add_cnf(&mut self, cnf: &Cnf) -> Result<(), SolverError> {
        for clause in cnf.clauses() {
            self.add_clause(clause.lits())?;
        }
        Ok(())
    }

    fn inc_is_sat(&mut self, assumptions: &[Lit]) -> Result<bool, SolverError>;

    fn inc_model_or_core(
        &mut self,
        assumptions: &[Lit],
        vars_of_interest: &[Lit],
    ) -> Result<Answer, SolverError> {
        self.inc_model_or_core2(assumptions, &[], vars_of_interest)
    }

    /// Like [`inc_model_or_core`](DecisionProcedure::inc_model_or_core), but
    /// `more_assumptions` are assumed without ever being part of the core.
    fn inc_model_or_core2(
        &mut self,
        core_assumptions: &[Lit],
        more_assumptions: &[Lit],
        vars_of_interest: &[Lit],
    ) -> Result<Answer, SolverError>;

    /// Saves the current session.
    fn push(&mut self) -> Result<(), SolverError>;

    /// Restores the session saved by the last [`push`](DecisionProcedure::push).
    fn pop(&mut self) -> Result<(), SolverError>;
}

/// Tries to flip every literal of `model` with probability 1/2, keeping a flip only
/// if `check` still succeeds with the flipped model.
pub(crate) fn randomize_model<R: rand::Rng>(
    model: &mut [Lit],
    rng: &mut R,
    mut check: impl FnMut(&[Lit]) -> Result<bool, SolverError>,
) -> Result<(), SolverError> {
    for i in 0..model.len() {
        if model[i].is_constant() || !rng.gen_bool(0.5) {
            continue;
        }
        model[i] = !model[i];
        if !check(model)? {
            model[i] = !model[i];
        }
    }
    Ok(())
}

/// Drops each literal of `core` whose removal keeps `still_unsat` true.
pub(crate) fn minimize_core(
    core: &mut Vec<Lit>,
    mut still_unsat: impl FnMut(&[Lit]) -> Result<bool, SolverError>,
) -> Result<(), SolverError> {
    let mut i = 0;
    while i < core.len() {
        let mut reduced = core.clone();
        reduced.remove(i);
        if still_unsat(&reduced)? {
            *core = reduced;
        } else {
            i += 1;
        }
    }
    Ok(())
}
