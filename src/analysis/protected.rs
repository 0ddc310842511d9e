use std::collections::BTreeSet;

use tracing::{debug, info};

use super::{Component, add_folded, checked_latches, flush, make_solver};
use crate::{
    aig::{Aig, AigError, AigLit},
    cnf::Lit,
    config::{Options, ProtectedMode},
    encode::Encoder,
    error::Result,
    sim::SymbolicSimulator,
    solver::{DecisionProcedure, Model},
};

/// Proves latches protected for every state, reachable or not.
///
/// The golden run starts in an open state with open inputs and never raises the alarm. A
/// latch is definitely protected if flipping it in that state either raises the alarm
/// before any output differs, or leaves no trace:
///
/// - [`ProtectedMode::OneStep`]: within the step of the flip, all latches at once with
///   one selector each;
/// - [`ProtectedMode::KStep`]: within `k` steps, one latch at a time on top of a shared
///   golden unrolling restored with push/pop.
///
/// The last [`Options::num_err_latches`] latches are ignored when comparing states.
pub struct DefinitelyProtected<'a> {
    aig: &'a Aig,
    options: &'a Options,
    mode: ProtectedMode,
    solver: Box<dyn DecisionProcedure>,
}

impl<'a> DefinitelyProtected<'a> {
    pub fn new(aig: &'a Aig, options: &'a Options, mode: ProtectedMode) -> Result<Self> {
        if aig.alarm().is_none() {
            return Err(AigError::MissingAlarm.into());
        }
        Ok(DefinitelyProtected {
            aig,
            options,
            mode,
            solver: make_solver(options),
        })
    }

    /// Literals of the definitely protected latches.
    pub fn analyze(&mut self) -> Result<BTreeSet<AigLit>> {
        let checked = checked_latches(self.aig, self.options.num_err_latches)?;
        info!("definitely protected ({:?}): {} latches", self.mode, checked.len());
        let protected = match self.mode {
            ProtectedMode::OneStep => self.one_step(&checked)?,
            ProtectedMode::KStep(k) => self.k_step(&checked, k.max(1))?,
        };
        info!("{} of {} latches definitely protected", protected.len(), checked.len());
        Ok(protected)
    }

    fn compared(&self) -> usize {
        self.aig.num_latches() - self.options.num_err_latches
    }

    fn one_step(&mut self, checked: &[Component]) -> Result<BTreeSet<AigLit>> {
        let compared = self.compared();
        let solver = self.solver.as_mut();
        let mut enc = Encoder::with_and_cache();
        let selectors: Vec<Lit> = checked.iter().map(|_| enc.fresh()).collect();
        solver.start_session(&selectors, false);
        solver.add_unit(Lit::TRUE)?;
        enc.at_most_one(&selectors);

        let mut golden = SymbolicSimulator::new(self.aig);
        golden.set_state_values_open(&mut enc);
        golden.set_input_values_open(&mut enc);
        golden.simulate_step(&mut enc);
        enc.add_lits(&[!golden.alarm_value()]);

        let mut faulty = golden.clone();
        for (component, &c) in checked.iter().zip(&selectors) {
            let old = faulty.read_cnf_value(component.lit);
            let new = enc.xor(old, c);
            faulty.set_latch_value(component.index, new);
        }
        faulty.simulate_step(&mut enc);
        enc.add_lits(&[!faulty.alarm_value()]);

        let ok = golden.output_values();
        let err = faulty.output_values();
        let n = ok.len() - 1;
        let mut problem = enc.differs(&ok[..n], &err[..n]);
        problem.extend(enc.differs(
            &golden.next_latch_values()[..compared],
            &faulty.next_latch_values()[..compared],
        ));
        flush(&mut enc, solver)?;
        add_folded(solver, problem)?;

        let mut protected: BTreeSet<AigLit> = checked.iter().map(|c| c.lit).collect();
        loop {
            let answer = solver.inc_model_or_core(&[], &selectors)?;
            let Some(model) = answer.model() else {
                break;
            };
            let model = Model::from(model);
            let Some(k) = (0..selectors.len()).find(|&k| model.is_true(selectors[k])) else {
                break;
            };
            debug!("latch {} is not protected within one step", checked[k].lit);
            protected.remove(&checked[k].lit);
            solver.add_unit(!selectors[k])?;
        }
        solver.end_session();
        Ok(protected)
    }

    fn k_step(&mut self, checked: &[Component], k: usize) -> Result<BTreeSet<AigLit>> {
        let compared = self.compared();
        let solver = self.solver.as_mut();
        let mut enc = Encoder::with_and_cache();
        solver.start_session(&[], true);
        solver.add_unit(Lit::TRUE)?;

        // the golden unrolling is shared by all latches
        let mut golden = SymbolicSimulator::new(self.aig);
        golden.set_state_values_open(&mut enc);
        let initial_state = golden.latch_values();
        let mut inputs = Vec::with_capacity(k);
        let mut outputs = Vec::with_capacity(k);
        for i in 0..k {
            golden.set_input_values_open(&mut enc);
            golden.simulate_step(&mut enc);
            enc.add_lits(&[!golden.alarm_value()]);
            inputs.push(golden.input_values());
            outputs.push(golden.output_values());
            if i + 1 < k {
                golden.switch_to_next_state();
            }
        }
        let golden_next = golden.next_latch_values();
        flush(&mut enc, solver)?;
        solver.push()?;
        let base = enc.clone();

        let mut protected = BTreeSet::new();
        for component in checked {
            let mut enc = base.clone();
            let mut faulty = SymbolicSimulator::new(self.aig);
            faulty.set_latch_values(&initial_state);
            faulty.set_latch_value(component.index, !initial_state[component.index]);

            let mut no_alarm_until = Lit::TRUE;
            let mut errors = Vec::with_capacity(k);
            for i in 0..k {
                faulty.set_cnf_input_values(&inputs[i]);
                faulty.simulate_step(&mut enc);
                no_alarm_until = enc.and(no_alarm_until, !faulty.alarm_value());

                let err = faulty.output_values();
                let n = err.len() - 1;
                let mut differs = enc.differs(&outputs[i][..n], &err[..n]);
                if i + 1 == k {
                    differs.extend(enc.differs(
                        &golden_next[..compared],
                        &faulty.next_latch_values()[..compared],
                    ));
                } else {
                    faulty.switch_to_next_state();
                }
                let problem = enc.fresh();
                differs.push(!problem);
                enc.add_clause(differs.into());
                errors.push(enc.and(no_alarm_until, problem));
            }
            flush(&mut enc, solver)?;
            add_folded(solver, errors)?;

            if solver.inc_is_sat(&[])? {
                debug!("latch {} is not protected within {} steps", component.lit, k);
            } else {
                debug!("latch {} is protected within {} steps", component.lit, k);
                protected.insert(component.lit);
            }
            solver.pop()?;
            solver.push()?;
        }
        solver.end_session();
        Ok(protected)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{aig::fixtures, config::Backend};

    #[test]
    fn one_step_test() {
        let aig = fixtures::parse(fixtures::TOGGLE_PARTIAL);
        let options = Options::default();
        let mut analysis =
            DefinitelyProtected::new(&aig, &options, ProtectedMode::OneStep).unwrap();
        assert_eq!(analysis.analyze().unwrap(), BTreeSet::from([4, 6]));
    }

    #[test]
    fn k_step_test() {
        let aig = fixtures::parse(fixtures::TOGGLE_PARTIAL);
        let options = Options::default();
        for k in [1, 3] {
            let mut analysis =
                DefinitelyProtected::new(&aig, &options, ProtectedMode::KStep(k)).unwrap();
            assert_eq!(analysis.analyze().unwrap(), BTreeSet::from([4, 6]), "k={}", k);
        }
    }

    #[test]
    fn unprotected_circuit_test() {
        let aig = fixtures::parse(fixtures::THREE_BY_THREE);
        let options = Options::default();
        for mode in [ProtectedMode::OneStep, ProtectedMode::KStep(2)] {
            let mut analysis = DefinitelyProtected::new(&aig, &options, mode).unwrap();
            assert!(analysis.analyze().unwrap().is_empty());
        }
    }

    #[test]
    fn masked_flip_test() {
        // a flipped toggle stays flipped
        let aig = fixtures::parse(fixtures::ONE_LATCH_PROTECTED);
        let options = Options::default();
        let mut analysis =
            DefinitelyProtected::new(&aig, &options, ProtectedMode::KStep(2)).unwrap();
        assert!(analysis.analyze().unwrap().is_empty());

        // the latch is overwritten before it is ever read
        let text = "aag 2 1 1 2 0\n2\n4 0\n2\n0\n";
        let aig = Aig::from_ascii(text.as_bytes()).unwrap();
        let mut analysis =
            DefinitelyProtected::new(&aig, &options, ProtectedMode::OneStep).unwrap();
        assert_eq!(analysis.analyze().unwrap(), BTreeSet::from([4]));
    }

    #[test]
    fn bdd_backend_test() {
        let aig = fixtures::parse(fixtures::TOGGLE_PERFECT);
        let options = Options::default().with_backend(Backend::Bdd);
        for mode in [ProtectedMode::OneStep, ProtectedMode::KStep(2)] {
            let mut analysis = DefinitelyProtected::new(&aig, &options, mode).unwrap();
            assert_eq!(analysis.analyze().unwrap(), BTreeSet::from([4, 6]));
        }
    }
}
