//! BDD backend: the session is the conjunction of its clauses as a single [`Bdd`].
//!
//! SAT variable `v` is BDD variable `v - 1`. The variable set is fixed when the solver is
//! built, so literals beyond its capacity are rejected.

use biodivine_lib_bdd::{Bdd, BddVariable, BddVariableSet};
use rand::{SeedableRng, rngs::StdRng};

use crate::{
    cnf::{Cnf, Lit},
    config::Options,
    solver::{Answer, DecisionProcedure, SolverError, minimize_core, randomize_model},
};

/// Capacity used by [`BddSolver::new`].
pub const DEFAULT_CAPACITY: u16 = 4096;

pub struct BddSolver {
    vars: BddVariableSet,
    variables: Vec<BddVariable>,
    frames: Vec<Bdd>,
    use_push_pop: bool,
    rand_models: bool,
    rng: StdRng,
}

impl BddSolver {
    pub fn new(options: &Options) -> Self {
        Self::with_capacity(DEFAULT_CAPACITY, options)
    }

    /// A solver accepting the SAT variables `1..=capacity`.
    pub fn with_capacity(capacity: u16, options: &Options) -> Self {
        let vars = BddVariableSet::new_anonymous(capacity);
        let variables = vars.variables();
        BddSolver {
            vars,
            variables,
            frames: Vec::new(),
            use_push_pop: false,
            rand_models: options.rand_models,
            rng: StdRng::seed_from_u64(options.seed),
        }
    }

    pub fn capacity(&self) -> u16 {
        self.variables.len() as u16
    }

    fn variable(&self, var: u32) -> Result<BddVariable, SolverError> {
        self.variables
            .get(var as usize - 1)
            .copied()
            .ok_or(SolverError::VariableOutOfRange(var, self.capacity()))
    }

    fn literal(&self, lit: Lit) -> Result<Bdd, SolverError> {
        let var = self.variable(lit.var())?;
        Ok(self.vars.mk_literal(var, lit.is_positive()))
    }

    fn clause(&self, clause: &[Lit]) -> Result<Bdd, SolverError> {
        let mut bdd = self.vars.mk_false();
        for &lit in clause {
            bdd = bdd.or(&self.literal(lit)?);
        }
        Ok(bdd)
    }

    fn cube(&self, cube: &[Lit]) -> Result<Bdd, SolverError> {
        let mut bdd = self.vars.mk_true();
        for &lit in cube {
            bdd = bdd.and(&self.literal(lit)?);
        }
        Ok(bdd)
    }

    fn cnf(&self, cnf: &Cnf) -> Result<Bdd, SolverError> {
        let mut bdd = self.vars.mk_true();
        for clause in cnf.clauses() {
            bdd = bdd.and(&self.clause(clause.lits())?);
            if bdd.is_false() {
                break;
            }
        }
        Ok(bdd)
    }

    fn model_or_core(
        &mut self,
        formula: &Bdd,
        core_assumptions: &[Lit],
        more_assumptions: &[Lit],
        vars_of_interest: &[Lit],
    ) -> Result<Answer, SolverError> {
        let more = formula.and(&self.cube(more_assumptions)?);
        let constrained = more.and(&self.cube(core_assumptions)?);

        let Some(witness) = constrained.sat_witness() else {
            let mut core = core_assumptions.to_vec();
            minimize_core(&mut core, |c| Ok(more.and(&self.cube(c)?).is_false()))?;
            return Ok(Answer::Unsat(core));
        };

        let mut model = Vec::with_capacity(vars_of_interest.len());
        for l in vars_of_interest {
            let var = Lit::positive(l.var());
            let value = witness.value(self.variable(l.var())?);
            model.push(if value { var } else { !var });
        }
        if self.rand_models {
            let mut rng = std::mem::replace(&mut self.rng, StdRng::seed_from_u64(0));
            let result = randomize_model(&mut model, &mut rng, |m| {
                Ok(!constrained.and(&self.cube(m)?).is_false())
            });
            self.rng = rng;
            result?;
        }
        Ok(Answer::Sat(model))
    }

    fn top(&mut self) -> Result<&mut Bdd, SolverError> {
        self.frames.last_mut().ok_or(SolverError::NoSession)
    }
}

impl Default for BddSolver {
    fn default() -> Self {
        Self::new(&Options::default())
    }
}

impl DecisionProcedure for BddSolver {
    fn is_sat(&mut self, cnf: &Cnf) -> Result<bool, SolverError> {
        Ok(!self.cnf(cnf)?.is_false())
    }

    fn is_sat_model_or_core(
        &mut self,
        cnf: &Cnf,
        assumptions: &[Lit],
        vars_of_interest: &[Lit],
    ) -> Result<Answer, SolverError> {
        let formula = self.cnf(cnf)?;
        self.model_or_core(&formula, assumptions, &[], vars_of_interest)
    }

    fn start_session(&mut self, _keep: &[Lit], use_push_pop: bool) {
        // nothing is ever eliminated, every variable stays queryable
        self.frames = vec![self.vars.mk_true()];
        self.use_push_pop = use_push_pop;
    }

    fn has_session(&self) -> bool {
        !self.frames.is_empty()
    }

    fn end_session(&mut self) {
        self.frames.clear();
    }

    fn add_var_to_keep(&mut self, var: Lit) -> Result<(), SolverError> {
        self.top()?;
        self.variable(var.var()).map(|_| ())
    }

    fn add_clause(&mut self, clause: &[Lit]) -> Result<(), SolverError> {
        let bdd = self.clause(clause)?;
        let top = self.top()?;
        *top = top.and(&bdd);
        Ok(())
    }

    fn inc_is_sat(&mut self, assumptions: &[Lit]) -> Result<bool, SolverError> {
        let cube = self.cube(assumptions)?;
        let top = self.top()?;
        Ok(!top.and(&cube).is_false())
    }

    fn inc_model_or_core2(
        &mut self,
        core_assumptions: &[Lit],
        more_assumptions: &[Lit],
        vars_of_interest: &[Lit],
    ) -> Result<Answer, SolverError> {
        let formula = self.top()?.clone();
        self.model_or_core(&formula, core_assumptions, more_assumptions, vars_of_interest)
    }

    fn push(&mut self) -> Result<(), SolverError> {
        let top = self.top()?.clone();
        if !self.use_push_pop {
            return Err(SolverError::PushPopDisabled);
        }
        self.frames.push(top);
        Ok(())
    }

    fn pop(&mut self) -> Result<(), SolverError> {
        match self.frames.len() {
            0 => Err(SolverError::NoSession),
            1 => Err(SolverError::NothingToPop),
            _ => {
                self.frames.pop();
                Ok(())
            }
        }
    }
}
