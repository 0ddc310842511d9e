//! [CaDiCaL][cadical] backend.
//!
//! CaDiCaL cannot clone a running solver, so every session is a stack of frames, each
//! owning its own `cadical::Solver`. A push starts a fresh solver and replays the clause
//! log of the current frame into it; a pop simply drops the top frame.
//!
//! [cadical]: https://fmv.jku.at/cadical/

use rand::{SeedableRng, rngs::StdRng};

use crate::{
    cnf::{Cnf, Lit},
    config::Options,
    solver::{Answer, DecisionProcedure, SolverError, minimize_core, randomize_model},
};

struct Frame {
    solver: cadical::Solver,
    /// Every clause of the frame, only kept when push/pop is enabled.
    log: Vec<Vec<i32>>,
}

impl Frame {
    fn new() -> Self {
        Frame {
            solver: cadical::Solver::new(),
            log: Vec::new(),
        }
    }

    fn replay(log: &[Vec<i32>]) -> Self {
        let mut solver = cadical::Solver::new();
        for clause in log {
            solver.add_clause(clause.iter().copied());
        }
        Frame {
            solver,
            log: log.to_vec(),
        }
    }
}

/// Incremental SAT solving with CaDiCaL.
pub struct SatSolver {
    frames: Vec<Frame>,
    use_push_pop: bool,
    keep: Vec<Lit>,
    rand_models: bool,
    min_cores: bool,
    rng: StdRng,
}

impl SatSolver {
    pub fn new(options: &Options) -> Self {
        SatSolver {
            frames: Vec::new(),
            use_push_pop: false,
            keep: Vec::new(),
            rand_models: options.rand_models,
            min_cores: options.min_cores,
            rng: StdRng::seed_from_u64(options.seed),
        }
    }

    /// Variables announced through [`DecisionProcedure::start_session`] and
    /// [`DecisionProcedure::add_var_to_keep`].
    pub fn kept_vars(&self) -> &[Lit] {
        &self.keep
    }

    fn top(&mut self) -> Result<&mut Frame, SolverError> {
        self.frames.last_mut().ok_or(SolverError::NoSession)
    }
}

impl Default for SatSolver {
    fn default() -> Self {
        Self::new(&Options::default())
    }
}

fn solve(solver: &mut cadical::Solver, assumptions: &[Lit]) -> Result<bool, SolverError> {
    solver
        .solve_with(assumptions.iter().map(|l| l.to_i32()))
        .ok_or(SolverError::Unknown)
}

/// Value of `var` in the last model, variables unknown to the solver are false.
fn var_value(solver: &cadical::Solver, var: u32) -> bool {
    if var as i32 > solver.max_variable() {
        return false;
    }
    solver.value(var as i32) == Some(true)
}

fn model_or_core(
    solver: &mut cadical::Solver,
    core_assumptions: &[Lit],
    more_assumptions: &[Lit],
    vars_of_interest: &[Lit],
    rng: Option<&mut StdRng>,
    min_cores: bool,
) -> Result<Answer, SolverError> {
    let mut assumptions = core_assumptions.to_vec();
    assumptions.extend_from_slice(more_assumptions);

    if solve(solver, &assumptions)? {
        let mut model: Vec<Lit> = vars_of_interest
            .iter()
            .map(|l| {
                let var = Lit::positive(l.var());
                if var_value(solver, l.var()) { var } else { !var }
            })
            .collect();
        if let Some(rng) = rng {
            randomize_model(&mut model, rng, |m| {
                let mut a = assumptions.clone();
                a.extend_from_slice(m);
                solve(solver, &a)
            })?;
        }
        tracing::trace!("model: {:?}", model);
        return Ok(Answer::Sat(model));
    }

    let mut core: Vec<Lit> = core_assumptions
        .iter()
        .copied()
        .filter(|l| solver.failed(l.to_i32()))
        .collect();
    if min_cores {
        let before = core.len();
        minimize_core(&mut core, |c| {
            let mut a = c.to_vec();
            a.extend_from_slice(more_assumptions);
            solve(solver, &a).map(|sat| !sat)
        })?;
        tracing::trace!("core minimization: {} --> {}", before, core.len());
    }
    Ok(Answer::Unsat(core))
}

impl DecisionProcedure for SatSolver {
    fn is_sat(&mut self, cnf: &Cnf) -> Result<bool, SolverError> {
        let mut solver: cadical::Solver = cadical::Solver::new();
        for clause in cnf.clauses() {
            solver.add_clause(clause.lits().iter().map(|l| l.to_i32()));
        }
        solver.solve().ok_or(SolverError::Unknown)
    }

    fn is_sat_model_or_core(
        &mut self,
        cnf: &Cnf,
        assumptions: &[Lit],
        vars_of_interest: &[Lit],
    ) -> Result<Answer, SolverError> {
        let mut solver = cadical::Solver::new();
        for clause in cnf.clauses() {
            solver.add_clause(clause.lits().iter().map(|l| l.to_i32()));
        }
        let rng = self.rand_models.then_some(&mut self.rng);
        model_or_core(
            &mut solver,
            assumptions,
            &[],
            vars_of_interest,
            rng,
            self.min_cores,
        )
    }

    fn start_session(&mut self, keep: &[Lit], use_push_pop: bool) {
        self.frames = vec![Frame::new()];
        self.use_push_pop = use_push_pop;
        self.keep = keep.to_vec();
    }

    fn has_session(&self) -> bool {
        !self.frames.is_empty()
    }

    fn end_session(&mut self) {
        self.frames.clear();
        self.keep.clear();
    }

    fn add_var_to_keep(&mut self, var: Lit) -> Result<(), SolverError> {
        self.top()?;
        self.keep.push(var);
        Ok(())
    }

    fn add_clause(&mut self, clause: &[Lit]) -> Result<(), SolverError> {
        let log = self.use_push_pop;
        let frame = self.top()?;
        let raw: Vec<i32> = clause.iter().map(|l| l.to_i32()).collect();
        frame.solver.add_clause(raw.iter().copied());
        if log {
            frame.log.push(raw);
        }
        Ok(())
    }

    fn inc_is_sat(&mut self, assumptions: &[Lit]) -> Result<bool, SolverError> {
        let frame = self.top()?;
        solve(&mut frame.solver, assumptions)
    }

    fn inc_model_or_core2(
        &mut self,
        core_assumptions: &[Lit],
        more_assumptions: &[Lit],
        vars_of_interest: &[Lit],
    ) -> Result<Answer, SolverError> {
        let frame = self.frames.last_mut().ok_or(SolverError::NoSession)?;
        let rng = self.rand_models.then_some(&mut self.rng);
        model_or_core(
            &mut frame.solver,
            core_assumptions,
            more_assumptions,
            vars_of_interest,
            rng,
            self.min_cores,
        )
    }

    fn push(&mut self) -> Result<(), SolverError> {
        if !self.use_push_pop {
            return Err(if self.has_session() {
                SolverError::PushPopDisabled
            } else {
                SolverError::NoSession
            });
        }
        let frame = Frame::replay(&self.top()?.log);
        self.frames.push(frame);
        tracing::trace!("push: {} frames", self.frames.len());
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

#[cfg(test)]
mod test {
    use super::*;
    use crate::cnf::cnf;

    fn lits(raw: &[i32]) -> Vec<Lit> {
        raw.iter().map(|&l| Lit::from(l)).collect()
    }

    #[test]
    fn simple_sat_test() {
        let mut s = SatSolver::default();
        assert!(s.is_sat(&cnf(&[&[2, 3], &[-2]])).unwrap());
        assert!(!s.is_sat(&cnf(&[&[2], &[-2]])).unwrap());
        assert!(!s.is_sat(&Cnf::unsat()).unwrap());
    }

    #[test]
    fn model_test() {
        let mut s = SatSolver::default();
        let f = cnf(&[&[-1], &[2, 3], &[-2]]);
        let answer = s.is_sat_model_or_core(&f, &[], &lits(&[-3, 2])).unwrap();
        assert_eq!(answer, Answer::Sat(lits(&[3, -2])));
    }

    #[test]
    fn core_test() {
        let mut s = SatSolver::new(&Options::default().with_min_cores(true));
        // 4 is irrelevant, 2 and 3 conflict
        let f = cnf(&[&[-2, -3]]);
        let answer = s.is_sat_model_or_core(&f, &lits(&[4, 2, 3]), &[]).unwrap();
        let core = answer.core().unwrap();
        assert_eq!(core.len(), 2);
        assert!(core.contains(&Lit::from(2)));
        assert!(core.contains(&Lit::from(3)));
    }

    #[test]
    fn more_assumptions_not_in_core_test() {
        let mut s = SatSolver::new(&Options::default().with_min_cores(true));
        s.start_session(&[], false);
        s.add_clause(&lits(&[-2, -3])).unwrap();
        let answer = s
            .inc_model_or_core2(&lits(&[2, 4]), &lits(&[3]), &[])
            .unwrap();
        assert_eq!(answer, Answer::Unsat(lits(&[2])));
    }

    #[test]
    fn incremental_test() {
        let mut s = SatSolver::default();
        s.start_session(&[], false);
        s.add_unit(Lit::TRUE).unwrap();
        s.add_clause(&lits(&[2, 3])).unwrap();
        assert!(s.inc_is_sat(&lits(&[-2])).unwrap());
        assert!(!s.inc_is_sat(&lits(&[-2, -3])).unwrap());
        s.add_neg_cube(&lits(&[2, 3])).unwrap();
        let answer = s.inc_model_or_core(&lits(&[2]), &lits(&[2, 3])).unwrap();
        assert_eq!(answer, Answer::Sat(lits(&[2, -3])));
        s.end_session();
        assert!(!s.has_session());
    }

    #[test]
    fn push_pop_test() {
        let mut s = SatSolver::default();
        s.start_session(&[], true);
        s.add_clause(&lits(&[2, 3])).unwrap();
        s.push().unwrap();
        s.add_cube(&lits(&[-2, -3])).unwrap();
        assert!(!s.inc_is_sat(&[]).unwrap());
        s.pop().unwrap();
        assert!(s.inc_is_sat(&[]).unwrap());
        assert!(!s.inc_is_sat(&lits(&[-2, -3])).unwrap());
        assert!(matches!(s.pop(), Err(SolverError::NothingToPop)));
    }

    #[test]
    fn no_session_test() {
        let mut s = SatSolver::default();
        assert!(matches!(
            s.add_clause(&lits(&[2])),
            Err(SolverError::NoSession)
        ));
        assert!(matches!(s.inc_is_sat(&[]), Err(SolverError::NoSession)));
        assert!(matches!(s.pop(), Err(SolverError::NoSession)));
        s.start_session(&[], false);
        assert!(matches!(s.push(), Err(SolverError::PushPopDisabled)));
    }

    #[test]
    fn random_models_stay_models_test() {
        let mut s = SatSolver::new(&Options::default().with_rand_models(true).with_seed(3));
        let f = cnf(&[&[2, 3], &[-4, 5]]);
        for _ in 0..10 {
            let answer = s
                .is_sat_model_or_core(&f, &[], &lits(&[2, 3, 4, 5]))
                .unwrap();
            let model = answer.model().unwrap();
            assert!(f.is_sat_by(model));
        }
    }
}
