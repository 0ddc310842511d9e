//! Fault-injection analyses.
//!
//! Every analysis injects single bit-flips into the latches of a circuit whose last
//! output is the alarm. The last [`Options::num_err_latches`] latches belong to the
//! protection logic: they are never flipped and never compared.
//!
//! - [`VulnerabilityAnalysis`]: flips changing an output without alarm, on SAT;
//! - [`BddAnalysis`]: the same search on BDDs;
//! - [`SimulationAnalysis`]: the same search by explicit concrete flips;
//! - [`FalsePositiveAnalysis`]: flips raising the alarm although nothing went wrong;
//! - [`DefinitelyProtected`]: latches whose flips are harmless from any state.
//!
//! The symbolic engines encode the golden and faulty runs step by step through an
//! [`Encoder`], with fresh selector variables choosing the flipped latch (`c_j`) and the
//! flip time step (`f_t`). At most one of each is true, which restricts every model to a
//! single fault.

mod bdd;
mod false_positive;
mod protected;
mod simulation;
mod vulnerability;

use std::collections::BTreeSet;

use crate::{
    aig::{Aig, AigLit},
    cnf::{Clause, Lit},
    config::{Backend, Options},
    encode::Encoder,
    error::{Error, Result},
    solver::{BddSolver, DecisionProcedure, SatSolver, SolverError},
    testcase::{TestCase, TestCaseError},
    trace::{ErrorTrace, SuperfluousTrace},
};

pub use bdd::BddAnalysis;
pub use false_positive::FalsePositiveAnalysis;
pub use protected::DefinitelyProtected;
pub use simulation::SimulationAnalysis;
pub use vulnerability::VulnerabilityAnalysis;

/// A latch subject to fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Component {
    /// Position among the latches of the circuit.
    pub index: usize,
    pub lit: AigLit,
}

/// All latches except the last `num_err_latches`.
pub fn checked_latches(aig: &Aig, num_err_latches: usize) -> Result<Vec<Component>> {
    let latches = aig.num_latches();
    if num_err_latches > latches {
        return Err(Error::TooManyErrLatches {
            reserved: num_err_latches,
            latches,
        });
    }
    Ok(aig.latches()[..latches - num_err_latches]
        .iter()
        .enumerate()
        .map(|(index, latch)| Component {
            index,
            lit: latch.lit,
        })
        .collect())
}

/// Outcome of a vulnerability search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VulnerabilityReport {
    /// Latches with at least one undetected harmful flip.
    pub vulnerable: BTreeSet<AigLit>,
    /// One witness per vulnerable latch, if diagnostics are enabled.
    pub traces: Vec<ErrorTrace>,
}

/// The golden run raised the alarm, the false positive search stopped there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmWithoutError {
    /// Index of the test case.
    pub testcase: usize,
    pub timestep: usize,
}

/// Outcome of a false positive search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FalsePositiveReport {
    /// Latches with at least one superfluous trace.
    pub detected: BTreeSet<AigLit>,
    pub traces: Vec<SuperfluousTrace>,
    pub alarm_without_error: Option<AlarmWithoutError>,
}

impl FalsePositiveReport {
    /// Whether any false positive was found, including an alarm of the golden run.
    pub fn found(&self) -> bool {
        !self.traces.is_empty() || self.alarm_without_error.is_some()
    }
}

/// The decision procedure selected by `options`.
pub(crate) fn make_solver(options: &Options) -> Box<dyn DecisionProcedure> {
    match options.backend {
        Backend::Sat => Box::new(SatSolver::new(options)),
        Backend::Bdd => Box::new(BddSolver::new(options)),
    }
}

/// Checks the width of every test case, and the absence of free inputs unless allowed.
pub(crate) fn check_test_cases(
    aig: &Aig,
    testcases: &[TestCase],
    allow_free_inputs: bool,
) -> Result<()> {
    for (index, tc) in testcases.iter().enumerate() {
        if tc.num_inputs() != aig.num_inputs() {
            return Err(TestCaseError::WidthMismatch {
                step: 0,
                expected: aig.num_inputs(),
                found: tc.num_inputs(),
            }
            .into());
        }
        if !allow_free_inputs && tc.has_free_inputs() {
            return Err(Error::UnexpectedFreeInputs(index));
        }
    }
    Ok(())
}

/// Moves the pending clauses of `enc` into `solver`.
pub(crate) fn flush(enc: &mut Encoder, solver: &mut dyn DecisionProcedure) -> Result<()> {
    solver.add_cnf(&enc.take_clauses())?;
    Ok(())
}

/// Adds `lits` as a clause after folding the constants away.
pub(crate) fn add_folded(
    solver: &mut dyn DecisionProcedure,
    lits: Vec<Lit>,
) -> std::result::Result<(), SolverError> {
    match Clause::from(lits).fold_constants() {
        Some(clause) => solver.add_clause(clause.lits()),
        None => Ok(()),
    }
}

#[cfg(test)]
mod test {
    use std::{cell::RefCell, rc::Rc};

    use super::*;
    use crate::{
        aig::fixtures,
        cnf::Cnf,
        config::{FalsePositiveMode, ProtectedMode},
        solver::{Answer, Model},
        testcase::model_checking_test_case,
    };

    /// One incremental query seen by a [`Recording`] solver.
    pub(super) struct Sample {
        session: usize,
        vars_of_interest: Vec<Lit>,
        model: Option<Vec<Lit>>,
    }

    /// A [`SatSolver`] keeping every incremental query and its model.
    pub(super) struct Recording {
        inner: SatSolver,
        sessions: usize,
        samples: Rc<RefCell<Vec<Sample>>>,
    }

    impl Recording {
        pub(super) fn new() -> (Self, Rc<RefCell<Vec<Sample>>>) {
            let samples = Rc::new(RefCell::new(Vec::new()));
            let solver = Recording {
                inner: SatSolver::default(),
                sessions: 0,
                samples: Rc::clone(&samples),
            };
            (solver, samples)
        }
    }

    impl DecisionProcedure for Recording {
        fn is_sat(&mut self, cnf: &Cnf) -> std::result::Result<bool, SolverError> {
            self.inner.is_sat(cnf)
        }

        fn is_sat_model_or_core(
            &mut self,
            cnf: &Cnf,
            assumptions: &[Lit],
            vars_of_interest: &[Lit],
        ) -> std::result::Result<Answer, SolverError> {
            self.inner
                .is_sat_model_or_core(cnf, assumptions, vars_of_interest)
        }

        fn start_session(&mut self, keep: &[Lit], use_push_pop: bool) {
            self.sessions += 1;
            self.inner.start_session(keep, use_push_pop);
        }

        fn has_session(&self) -> bool {
            self.inner.has_session()
        }

        fn end_session(&mut self) {
            self.inner.end_session();
        }

        fn add_var_to_keep(&mut self, var: Lit) -> std::result::Result<(), SolverError> {
            self.inner.add_var_to_keep(var)
        }

        fn add_clause(&mut self, clause: &[Lit]) -> std::result::Result<(), SolverError> {
            self.inner.add_clause(clause)
        }

        fn inc_is_sat(&mut self, assumptions: &[Lit]) -> std::result::Result<bool, SolverError> {
            self.inner.inc_is_sat(assumptions)
        }

        fn inc_model_or_core2(
            &mut self,
            core_assumptions: &[Lit],
            more_assumptions: &[Lit],
            vars_of_interest: &[Lit],
        ) -> std::result::Result<Answer, SolverError> {
            let answer =
                self.inner
                    .inc_model_or_core2(core_assumptions, more_assumptions, vars_of_interest)?;
            self.samples.borrow_mut().push(Sample {
                session: self.sessions,
                vars_of_interest: vars_of_interest.to_vec(),
                model: answer.model().map(<[Lit]>::to_vec),
            });
            Ok(answer)
        }

        fn push(&mut self) -> std::result::Result<(), SolverError> {
            self.inner.push()
        }

        fn pop(&mut self) -> std::result::Result<(), SolverError> {
            self.inner.pop()
        }
    }

    /// Number of true selectors and true flips of every recorded model.
    ///
    /// The variables of interest must start with the `num_selectors` selectors, followed
    /// by one flip per step of the session so far. A new step is recognized by a change of
    /// the variables of interest.
    pub(super) fn fault_counts(samples: &[Sample], num_selectors: usize) -> Vec<(usize, usize)> {
        let mut counts = Vec::new();
        let mut step = 0;
        for (i, sample) in samples.iter().enumerate() {
            if i > 0 {
                let previous = &samples[i - 1];
                if previous.session != sample.session {
                    step = 0;
                } else if previous.vars_of_interest != sample.vars_of_interest {
                    step += 1;
                }
            }
            let Some(model) = sample.model.as_deref() else {
                continue;
            };
            let model = Model::from(model);
            let voi = &sample.vars_of_interest;
            let count = |lits: &[Lit]| lits.iter().filter(|&&l| model.is_true(l)).count();
            counts.push((
                count(&voi[..num_selectors]),
                count(&voi[num_selectors..num_selectors + step + 1]),
            ));
        }
        counts
    }

    fn concrete_cases(num_inputs: usize) -> Vec<TestCase> {
        let patterns: [&[bool]; 3] = [&[false], &[true], &[false, true]];
        patterns
            .iter()
            .map(|p| {
                let steps: Vec<Vec<bool>> = (0..5)
                    .map(|t| vec![p[t % p.len()]; num_inputs])
                    .collect();
                TestCase::from_bools(num_inputs, &steps).unwrap()
            })
            .collect()
    }

    #[test]
    fn checked_latches_test() {
        let aig = fixtures::parse(fixtures::TOGGLE_PARTIAL);
        let all = checked_latches(&aig, 0).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[2], Component { index: 2, lit: 14 });
        assert_eq!(checked_latches(&aig, 2).unwrap().len(), 1);
        assert!(matches!(
            checked_latches(&aig, 4),
            Err(Error::TooManyErrLatches {
                reserved: 4,
                latches: 3
            })
        ));
    }

    #[test]
    fn check_test_cases_test() {
        let aig = fixtures::parse(fixtures::THREE_BY_THREE);
        let narrow = TestCase::from_bools(2, &[vec![true, false]]).unwrap();
        assert!(matches!(
            check_test_cases(&aig, &[narrow], true),
            Err(Error::TestCase(TestCaseError::WidthMismatch { .. }))
        ));
        let free = crate::testcase::model_checking_test_case(2, 3);
        assert!(check_test_cases(&aig, std::slice::from_ref(&free), true).is_ok());
        assert!(matches!(
            check_test_cases(&aig, &[free], false),
            Err(Error::UnexpectedFreeInputs(0))
        ));
    }

    #[test]
    fn engines_agree_test() {
        for text in [
            fixtures::TOGGLE_PARTIAL,
            fixtures::TOGGLE_PERFECT,
            fixtures::THREE_BY_THREE,
            fixtures::ONE_LATCH_PROTECTED,
        ] {
            let aig = fixtures::parse(text);
            let tcs = concrete_cases(aig.num_inputs());
            let options = Options::default();

            let sat = VulnerabilityAnalysis::new(&aig, &options)
                .unwrap()
                .analyze(&tcs)
                .unwrap();
            let single = VulnerabilityAnalysis::new(&aig, &options)
                .unwrap()
                .analyze_single_time(&tcs)
                .unwrap();
            let bdd = BddAnalysis::new(&aig, &options)
                .unwrap()
                .analyze(&tcs)
                .unwrap();
            let sim = SimulationAnalysis::new(&aig, &options)
                .unwrap()
                .analyze(&tcs)
                .unwrap();
            let bdd_options = options.clone().with_backend(Backend::Bdd);
            let on_bdd = VulnerabilityAnalysis::new(&aig, &bdd_options)
                .unwrap()
                .analyze(&tcs)
                .unwrap();

            assert_eq!(sat.vulnerable, sim.vulnerable, "{}", text);
            assert_eq!(single.vulnerable, sim.vulnerable, "{}", text);
            assert_eq!(bdd.vulnerable, sim.vulnerable, "{}", text);
            assert_eq!(on_bdd.vulnerable, sim.vulnerable, "{}", text);
        }
    }

    #[test]
    fn free_inputs_agree_test() {
        // the output is latch and input: only an input of 1 shows the flip
        let gated = "aag 3 1 1 2 1\n2\n4 4\n6\n0\n6 4 2\n";
        for (text, expected) in [
            (gated, BTreeSet::from([4])),
            (fixtures::TOGGLE_PARTIAL, BTreeSet::from([14])),
            (fixtures::TOGGLE_PERFECT, BTreeSet::new()),
            (fixtures::THREE_BY_THREE, BTreeSet::from([8, 10, 12])),
            (fixtures::ONE_LATCH_PROTECTED, BTreeSet::new()),
        ] {
            let aig = Aig::from_ascii(text.as_bytes()).unwrap();
            let tcs = vec![model_checking_test_case(3, aig.num_inputs())];
            let options = Options::default();

            let sat = VulnerabilityAnalysis::new(&aig, &options)
                .unwrap()
                .analyze(&tcs)
                .unwrap();
            let single = VulnerabilityAnalysis::new(&aig, &options)
                .unwrap()
                .analyze_single_time(&tcs)
                .unwrap();
            let sim = SimulationAnalysis::new(&aig, &options)
                .unwrap()
                .analyze(&tcs)
                .unwrap();

            assert_eq!(sim.vulnerable, expected, "{}", text);
            assert_eq!(sat.vulnerable, expected, "{}", text);
            assert_eq!(single.vulnerable, expected, "{}", text);
            for trace in sat.traces.iter().chain(&single.traces) {
                assert_eq!(trace.inputs().len(), trace.error_timestep() + 1);
            }
        }
    }

    #[test]
    fn protected_are_not_vulnerable_test() {
        for text in [
            fixtures::TOGGLE_PARTIAL,
            fixtures::TOGGLE_PERFECT,
            fixtures::THREE_BY_THREE,
        ] {
            let aig = fixtures::parse(text);
            let tcs = concrete_cases(aig.num_inputs());
            let options = Options::default();
            let vulnerable = VulnerabilityAnalysis::new(&aig, &options)
                .unwrap()
                .analyze(&tcs)
                .unwrap()
                .vulnerable;
            for mode in [ProtectedMode::OneStep, ProtectedMode::KStep(3)] {
                let protected = DefinitelyProtected::new(&aig, &options, mode)
                    .unwrap()
                    .analyze()
                    .unwrap();
                assert!(protected.is_disjoint(&vulnerable), "{} {:?}", text, mode);
            }
        }
    }

    #[test]
    fn false_positive_modes_agree_test() {
        let aig = fixtures::parse(fixtures::SUPERFLUOUS_ALARM);
        let tcs = concrete_cases(1);
        let options = Options::default();
        for mode in [
            FalsePositiveMode::SymbTime,
            FalsePositiveMode::SymbTimeLocation,
            FalsePositiveMode::SymbTimeFreeInputs,
            FalsePositiveMode::SymbTimeLocationFreeInputs,
        ] {
            let report = FalsePositiveAnalysis::new(&aig, &options, mode)
                .unwrap()
                .analyze(&tcs)
                .unwrap();
            assert_eq!(report.detected, BTreeSet::from([4]), "{:?}", mode);
            assert!(report.alarm_without_error.is_none());
        }
    }
}
