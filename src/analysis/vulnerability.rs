use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use super::{
    Component, VulnerabilityReport, add_folded, check_test_cases, checked_latches, flush,
    make_solver,
};
use crate::{
    aig::{Aig, AigError},
    cnf::{Clause, Cnf, Lit},
    config::Options,
    encode::Encoder,
    error::Result,
    sim::{AigSimulator, SymbolicSimulator},
    solver::{DecisionProcedure, Model},
    testcase::TestCase,
    trace::ErrorTrace,
    translate::{Translation, aig_lit_to_cnf_lit},
};

/// Searches for flips changing an output while the alarm stays low.
///
/// Both the flipped latch and the flip time step are symbolic: every checked latch `j` has
/// a selector `c_j` and every step `t` a selector `f_t`, and latch `j` is flipped at step
/// `t` iff both hold. One incremental session is used per test case; latches found
/// vulnerable are neither flipped nor searched again in later test cases.
///
/// Free inputs of a test case are left open to the solver: the golden run is then
/// symbolic too, may not raise the alarm, and the inputs of a trace come from the model.
pub struct VulnerabilityAnalysis<'a> {
    aig: &'a Aig,
    options: &'a Options,
    solver: Box<dyn DecisionProcedure>,
}

impl<'a> VulnerabilityAnalysis<'a> {
    /// Uses the backend selected by `options`.
    pub fn new(aig: &'a Aig, options: &'a Options) -> Result<Self> {
        Self::with_solver(aig, options, make_solver(options))
    }

    pub fn with_solver(
        aig: &'a Aig,
        options: &'a Options,
        solver: Box<dyn DecisionProcedure>,
    ) -> Result<Self> {
        if aig.alarm().is_none() {
            return Err(AigError::MissingAlarm.into());
        }
        Ok(VulnerabilityAnalysis {
            aig,
            options,
            solver,
        })
    }

    pub fn analyze(&mut self, testcases: &[TestCase]) -> Result<VulnerabilityReport> {
        check_test_cases(self.aig, testcases, true)?;
        let checked = checked_latches(self.aig, self.options.num_err_latches)?;
        info!(
            "vulnerability analysis: {} latches, {} test cases",
            checked.len(),
            testcases.len()
        );

        let mut enc = Encoder::new();
        let selectors: Vec<Lit> = checked.iter().map(|_| enc.fresh()).collect();
        let first_step_var = enc.next_var();
        let mut remaining: BTreeSet<usize> = (0..checked.len()).collect();
        let mut report = VulnerabilityReport::default();

        for (index, tc) in testcases.iter().enumerate() {
            if remaining.is_empty() {
                break;
            }
            debug!(
                "test case {}: {} steps, free inputs: {}",
                index,
                tc.len(),
                tc.has_free_inputs()
            );

            enc.reset_to(first_step_var);
            self.solver.start_session(&selectors, false);
            self.solver.add_unit(Lit::TRUE)?;
            enc.at_most_one(&selectors);
            self.run_testcase(tc, &checked, &selectors, &mut remaining, &mut enc, &mut report)?;
            self.solver.end_session();
        }

        info!(
            "{} of {} latches vulnerable",
            report.vulnerable.len(),
            checked.len()
        );
        Ok(report)
    }

    fn run_testcase(
        &mut self,
        tc: &TestCase,
        checked: &[Component],
        selectors: &[Lit],
        remaining: &mut BTreeSet<usize>,
        enc: &mut Encoder,
        report: &mut VulnerabilityReport,
    ) -> Result<()> {
        let solver = self.solver.as_mut();
        let mut golden = SymbolicSimulator::new(self.aig);
        let mut faulty = SymbolicSimulator::new(self.aig);
        let mut flips: Vec<Lit> = Vec::new();
        let mut enables: Vec<Lit> = Vec::new();
        let mut cnf_inputs: Vec<Vec<Lit>> = Vec::new();

        for t in 0..tc.len() {
            golden.set_input_values(tc.step(t), enc);
            golden.simulate_step(enc);
            let golden_alarm = golden.alarm_value();
            if !golden_alarm.is_constant() {
                enc.add_lits(&[!golden_alarm]);
            }
            let golden_outputs = golden.output_values();
            let inputs = golden.input_values();
            faulty.set_cnf_input_values(&inputs);
            cnf_inputs.push(inputs);

            let f = enc.fresh();
            for &k in remaining.iter() {
                let old = faulty.read_cnf_value(checked[k].lit);
                let new = enc.flip_if(old, selectors[k], f);
                faulty.set_latch_value(checked[k].index, new);
            }
            for &previous in &flips {
                enc.add_lits(&[!f, !previous]);
            }
            flips.push(f);

            faulty.simulate_step(enc);
            enc.add_lits(&[!faulty.alarm_value()]);

            let outputs = faulty.output_values();
            let n = outputs.len() - 1;
            let mut diff = enc.differs(&golden_outputs[..n], &outputs[..n]);
            let enable = enc.fresh();
            diff.push(enable);
            flush(enc, solver)?;
            add_folded(solver, diff)?;
            enables.push(!enable);

            faulty.switch_to_next_state();
            golden.switch_to_next_state();

            let mut vars_of_interest = selectors.to_vec();
            vars_of_interest.extend_from_slice(&flips);
            vars_of_interest.extend_from_slice(golden.open_input_vars());
            loop {
                let answer = solver.inc_model_or_core(&enables, &vars_of_interest)?;
                let Some(model) = answer.model() else {
                    break;
                };
                let model = Model::from(model);
                debug!("step {}: model {:?}", t, answer.model());
                let Some(k) = (0..selectors.len()).find(|&k| model.is_true(selectors[k])) else {
                    warn!("step {}: output differs without any selected latch", t);
                    break;
                };
                solver.add_unit(!selectors[k])?;
                remaining.remove(&k);

                let latch = checked[k].lit;
                let flipped = flips.iter().position(|&f| model.is_true(f)).unwrap_or(t);
                info!(
                    "latch {} is vulnerable: flipped at {}, wrong output at {}",
                    latch, flipped, t
                );
                report.vulnerable.insert(latch);
                if self.options.diagnostic {
                    let inputs = witness_inputs(tc, t + 1, &cnf_inputs, &model);
                    report
                        .traces
                        .push(ErrorTrace::new(latch, flipped, t, inputs));
                }
            }

            // the output check of this step is done, only the alarm constraints stay active
            if let Some(last) = enables.last_mut() {
                *last = !*last;
            }
            if remaining.is_empty() {
                break;
            }
        }
        Ok(())
    }

    /// One latch at a time, with a symbolic flip time step only.
    ///
    /// The transition relation is unrolled by renaming a copy of
    /// [`Translation::trans`] for every step, with the definite inputs substituted by
    /// their values. Each step ends with a one-shot query.
    pub fn analyze_single_time(&mut self, testcases: &[TestCase]) -> Result<VulnerabilityReport> {
        check_test_cases(self.aig, testcases, true)?;
        let translation = Translation::new(self.aig)?;
        let checked = checked_latches(self.aig, self.options.num_err_latches)?;
        info!(
            "single time vulnerability analysis: {} latches, {} test cases",
            checked.len(),
            testcases.len()
        );

        let mut report = VulnerabilityReport::default();
        for component in checked {
            for tc in testcases {
                let Some(trace) = self.single_time_witness(&translation, component, tc)? else {
                    continue;
                };
                info!("latch {} is vulnerable: {}", component.lit, trace);
                report.vulnerable.insert(component.lit);
                if self.options.diagnostic {
                    report.traces.push(trace);
                }
                break;
            }
        }
        Ok(report)
    }

    fn single_time_witness(
        &mut self,
        translation: &Translation,
        component: Component,
        tc: &TestCase,
    ) -> Result<Option<ErrorTrace>> {
        let aig = self.aig;
        let n = aig.num_outputs() - 1;
        let num_vars = translation.max_cnf_var() as usize + 1;

        let mut enc = Encoder::new();
        let mut unrolled = Cnf::new();
        unrolled.add_true_constant();
        let mut golden = SymbolicSimulator::new(aig);
        // concrete twin of the golden run, as long as every input so far is definite
        let mut concrete = Some(AigSimulator::new(aig));
        let mut state = golden.latch_values();
        let mut golden_alarm = false;
        let mut flips: Vec<Lit> = Vec::new();
        let mut open_inputs: Vec<Lit> = Vec::new();
        let mut cnf_inputs: Vec<Vec<Lit>> = Vec::new();

        for t in 0..tc.len() {
            let values = tc.step(t);
            if values.iter().any(|v| v.is_free()) {
                concrete = None;
            }
            if let Some(concrete) = concrete.as_mut() {
                concrete.simulate_step(&tc.bools(t));
                // a flip at t visible right away needs no solver
                let mut flipped = concrete.clone();
                flipped.flip_latch(component.index);
                flipped.propagate();
                if !golden_alarm
                    && !flipped.alarm()
                    && flipped.outputs()[..n] != concrete.outputs()[..n]
                {
                    debug!("latch {}: concrete flip at {} is visible", component.lit, t);
                    let inputs = (0..=t).map(|s| tc.bools(s)).collect();
                    return Ok(Some(ErrorTrace::new(component.lit, t, t, inputs)));
                }
                golden_alarm |= concrete.alarm();
            }

            let f = enc.fresh();
            let mut map = vec![0u32; num_vars];
            let mut input_values: Vec<Option<bool>> = vec![None; num_vars];
            map[1] = 1;
            let latches = translation.pres_state_vars().iter().zip(&state);
            for (k, (&latch, &value)) in latches.enumerate() {
                let value = if k == component.index {
                    enc.flip(value, f)
                } else {
                    value
                };
                let renamed = enc.fresh();
                enc.equal(renamed, value);
                map[latch.var() as usize] = renamed.var();
            }
            for (&input, &value) in translation.inputs().iter().zip(values) {
                let renamed = enc.fresh();
                map[input.var() as usize] = renamed.var();
                match value.to_bool() {
                    Some(b) => input_values[input.var() as usize] = Some(b),
                    None => open_inputs.push(renamed),
                }
            }
            for gate in aig.ands() {
                map[aig_lit_to_cnf_lit(gate.lhs).var() as usize] = enc.fresh().var();
            }

            let mut copy = translation.trans().clone();
            copy.rename_vars(&map)?;
            for (var, value) in input_values.iter().enumerate() {
                if let Some(value) = *value {
                    copy.set_var_value(map[var], value);
                }
            }
            let at_step = |lit: Lit| -> Lit {
                let var = lit.var() as usize;
                let base = match input_values[var] {
                    Some(true) => Lit::TRUE,
                    Some(false) => Lit::FALSE,
                    None => Lit::positive(map[var]),
                };
                if lit.is_positive() { base } else { !base }
            };

            // the golden run reads the same input literals
            let inputs: Vec<Lit> = translation.inputs().iter().map(|&i| at_step(i)).collect();
            golden.set_cnf_input_values(&inputs);
            golden.simulate_step(&mut enc);
            let golden_alarm_value = golden.alarm_value();
            if !golden_alarm_value.is_constant() {
                enc.add_lits(&[!golden_alarm_value]);
            }
            cnf_inputs.push(inputs);

            let outputs: Vec<Lit> = translation.outputs().iter().map(|&o| at_step(o)).collect();
            let diff = Clause::from(enc.differs(&golden.output_values()[..n], &outputs));

            unrolled.add_cnf(&copy);
            unrolled.add_cnf(&enc.take_clauses());
            let no_alarm = Clause::from(vec![!at_step(translation.alarm_output())]);
            unrolled.add_clause_if(no_alarm.fold_constants());
            for &previous in &flips {
                unrolled.add2(!f, !previous);
            }
            flips.push(f);

            let mut query = unrolled.clone();
            query.add_clause_if(diff.fold_constants());
            let mut vars_of_interest = flips.clone();
            vars_of_interest.extend_from_slice(&open_inputs);

            let answer = self.solver.is_sat_model_or_core(&query, &[], &vars_of_interest)?;
            if let Some(model) = answer.model() {
                let model = Model::from(model);
                let flipped = flips.iter().position(|&f| model.is_true(f)).unwrap_or(t);
                let inputs = witness_inputs(tc, t + 1, &cnf_inputs, &model);
                return Ok(Some(ErrorTrace::new(component.lit, flipped, t, inputs)));
            }

            state = translation
                .next_state_vars()
                .iter()
                .map(|&next| at_step(next))
                .collect();
            golden.switch_to_next_state();
            if let Some(concrete) = concrete.as_mut() {
                concrete.switch_to_next_state();
            }
        }
        Ok(None)
    }
}

/// Input values of the first `len` steps of `tc`, free inputs taken from `model`.
fn witness_inputs(
    tc: &TestCase,
    len: usize,
    cnf_inputs: &[Vec<Lit>],
    model: &Model,
) -> Vec<Vec<bool>> {
    let concrete = tc.prefix(len).concretize(cnf_inputs, model);
    (0..concrete.len()).map(|t| concrete.bools(t)).collect()
}

#[cfg(test)]
mod test {
    use std::collections::BTreeSet;

    use super::*;
    use crate::{
        aig::fixtures,
        analysis::test::{Recording, fault_counts},
        config::Backend,
        solver::{BddSolver, SatSolver},
        testcase::{InputValue, model_checking_test_case},
    };

    fn toggles(len: usize) -> Vec<TestCase> {
        let steps: Vec<Vec<bool>> = (0..len).map(|t| vec![t % 2 == 1]).collect();
        vec![TestCase::from_bools(1, &steps).unwrap()]
    }

    #[test]
    fn toggle_partial_test() {
        let aig = fixtures::parse(fixtures::TOGGLE_PARTIAL);
        let options = Options::default();
        let mut analysis = VulnerabilityAnalysis::new(&aig, &options).unwrap();
        let report = analysis.analyze(&toggles(3)).unwrap();
        assert_eq!(report.vulnerable, BTreeSet::from([14]));
        assert_eq!(report.traces.len(), 1);
        let trace = &report.traces[0];
        assert_eq!(trace.latch(), 14);
        assert_eq!(trace.error_timestep(), 0);
        assert_eq!(trace.flipped_timestep(), 0);
        assert_eq!(trace.inputs().len(), 1);
    }

    #[test]
    fn toggle_perfect_test() {
        let aig = fixtures::parse(fixtures::TOGGLE_PERFECT);
        let options = Options::default();
        let mut analysis = VulnerabilityAnalysis::new(&aig, &options).unwrap();
        let report = analysis.analyze(&toggles(4)).unwrap();
        assert!(report.vulnerable.is_empty());
        assert!(report.traces.is_empty());
    }

    #[test]
    fn err_latches_are_not_flipped_test() {
        // with l3 reserved, the remaining latches are all protected
        let aig = fixtures::parse(fixtures::TOGGLE_PARTIAL);
        let options = Options::default().with_num_err_latches(1);
        let mut analysis = VulnerabilityAnalysis::new(&aig, &options).unwrap();
        assert!(analysis.analyze(&toggles(3)).unwrap().vulnerable.is_empty());
    }

    #[test]
    fn single_fault_traces_test() {
        // every trace replays to a wrong output without alarm
        let aig = fixtures::parse(fixtures::THREE_BY_THREE);
        let steps = vec![
            vec![false, false, false],
            vec![false, true, false],
            vec![true, true, true],
        ];
        let tcs = vec![TestCase::from_bools(3, &steps).unwrap()];
        let options = Options::default();
        let report = VulnerabilityAnalysis::new(&aig, &options)
            .unwrap()
            .analyze(&tcs)
            .unwrap();
        assert_eq!(report.vulnerable, BTreeSet::from([8, 10, 12]));
        for trace in &report.traces {
            let index = aig.latch_index(trace.latch()).unwrap();
            let mut ok = AigSimulator::new(&aig);
            let mut err = AigSimulator::new(&aig);
            for (t, step) in trace.inputs().iter().enumerate() {
                if t == trace.flipped_timestep() {
                    err.flip_latch(index);
                }
                ok.simulate_step(step);
                err.simulate_step(step);
                assert!(!err.alarm());
                if t == trace.error_timestep() {
                    assert_ne!(ok.outputs(), err.outputs());
                }
                ok.switch_to_next_state();
                err.switch_to_next_state();
            }
        }
    }

    #[test]
    fn single_fault_models_test() {
        // every model selects exactly one latch and one flip time step
        let aig = fixtures::parse(fixtures::THREE_BY_THREE);
        let options = Options::default();
        let steps = vec![
            vec![false, false, false],
            vec![false, true, false],
            vec![true, true, true],
        ];
        for tc in [
            TestCase::from_bools(3, &steps).unwrap(),
            model_checking_test_case(2, 3),
        ] {
            let (solver, samples) = Recording::new();
            let report = VulnerabilityAnalysis::with_solver(&aig, &options, Box::new(solver))
                .unwrap()
                .analyze(&[tc])
                .unwrap();
            assert_eq!(report.vulnerable, BTreeSet::from([8, 10, 12]));
            let counts = fault_counts(&samples.borrow(), 3);
            assert_eq!(counts, vec![(1, 1); 3]);
        }
    }

    #[test]
    fn free_inputs_test() {
        // the output is latch and input, the flip only shows with an input of 1
        let text = "aag 3 1 1 2 1\n2\n4 4\n6\n0\n6 4 2\n";
        let aig = Aig::from_ascii(text.as_bytes()).unwrap();
        let options = Options::default();
        let tcs = vec![TestCase::new(1, vec![vec![InputValue::Free]]).unwrap()];

        let report = VulnerabilityAnalysis::new(&aig, &options)
            .unwrap()
            .analyze(&tcs)
            .unwrap();
        assert_eq!(report.vulnerable, BTreeSet::from([4]));
        assert_eq!(report.traces[0].inputs(), &[vec![true]]);

        let single = VulnerabilityAnalysis::new(&aig, &options)
            .unwrap()
            .analyze_single_time(&tcs)
            .unwrap();
        assert_eq!(single.vulnerable, BTreeSet::from([4]));
        assert_eq!(single.traces[0].inputs(), &[vec![true]]);

        // a definite 0 hides it
        let zero = vec![TestCase::from_bools(1, &[vec![false]]).unwrap()];
        let mut analysis = VulnerabilityAnalysis::new(&aig, &options).unwrap();
        assert!(analysis.analyze(&zero).unwrap().vulnerable.is_empty());
        assert!(analysis.analyze_single_time(&zero).unwrap().vulnerable.is_empty());
    }

    #[test]
    fn free_inputs_keep_golden_alarm_low_test() {
        // the alarm is the input, so the witness must keep it at 0
        let text = "aag 2 1 1 2 0\n2\n4 4\n4\n2\n";
        let aig = Aig::from_ascii(text.as_bytes()).unwrap();
        let options = Options::default();
        let tcs = vec![model_checking_test_case(1, 1)];
        let report = VulnerabilityAnalysis::new(&aig, &options)
            .unwrap()
            .analyze(&tcs)
            .unwrap();
        assert_eq!(report.vulnerable, BTreeSet::from([4]));
        assert_eq!(report.traces[0].inputs(), &[vec![false]]);
    }

    #[test]
    fn backends_agree_test() {
        let aig = fixtures::parse(fixtures::TOGGLE_PARTIAL);
        let options = Options::default();
        let sat = VulnerabilityAnalysis::with_solver(&aig, &options, Box::new(SatSolver::default()))
            .unwrap()
            .analyze(&toggles(4))
            .unwrap();
        let bdd = VulnerabilityAnalysis::with_solver(&aig, &options, Box::new(BddSolver::default()))
            .unwrap()
            .analyze(&toggles(4))
            .unwrap();
        assert_eq!(sat, bdd);

        let options = Options::default().with_backend(Backend::Bdd);
        let selected = VulnerabilityAnalysis::new(&aig, &options)
            .unwrap()
            .analyze(&toggles(4))
            .unwrap();
        assert_eq!(sat.vulnerable, selected.vulnerable);
    }

    #[test]
    fn single_time_test() {
        let aig = fixtures::parse(fixtures::TOGGLE_PARTIAL);
        let options = Options::default();
        let mut analysis = VulnerabilityAnalysis::new(&aig, &options).unwrap();
        let report = analysis.analyze_single_time(&toggles(3)).unwrap();
        assert_eq!(report.vulnerable, BTreeSet::from([14]));

        let aig = fixtures::parse(fixtures::ONE_LATCH_PROTECTED);
        let mut analysis = VulnerabilityAnalysis::new(&aig, &options).unwrap();
        assert!(analysis.analyze_single_time(&toggles(3)).unwrap().vulnerable.is_empty());
    }

    #[test]
    fn delayed_error_test() {
        // the flipped latch only reaches the output one step later
        let text = "aag 3 1 2 2 0\n2\n4 0\n6 4\n6\n0\n";
        let aig = Aig::from_ascii(text.as_bytes()).unwrap();
        let options = Options::default();
        let tcs = vec![TestCase::from_bools(1, &[vec![false], vec![false]]).unwrap()];

        let report = VulnerabilityAnalysis::new(&aig, &options)
            .unwrap()
            .analyze(&tcs)
            .unwrap();
        assert_eq!(report.vulnerable, BTreeSet::from([4, 6]));
        let delayed = report.traces.iter().find(|t| t.latch() == 4).unwrap();
        assert_eq!(delayed.flipped_timestep(), 0);
        assert_eq!(delayed.error_timestep(), 1);

        let single = VulnerabilityAnalysis::new(&aig, &options)
            .unwrap()
            .analyze_single_time(&tcs)
            .unwrap();
        assert_eq!(single.vulnerable, report.vulnerable);
    }

    #[test]
    fn missing_alarm_test() {
        let aig = Aig::from_ascii("aag 1 1 0 0 0\n2\n".as_bytes()).unwrap();
        let options = Options::default();
        assert!(VulnerabilityAnalysis::new(&aig, &options).is_err());
    }
}
