use std::collections::BTreeSet;

use biodivine_lib_bdd::{Bdd, BddVariableSet};
use tracing::{debug, info};

use super::{VulnerabilityReport, check_test_cases, checked_latches};
use crate::{
    aig::{Aig, AigError},
    config::Options,
    error::Result,
    sim::{AigSimulator, BddSimulator},
    solver::SolverError,
    testcase::TestCase,
    trace::ErrorTrace,
};

/// The vulnerability search of [`VulnerabilityAnalysis`](super::VulnerabilityAnalysis)
/// computed with BDDs instead of clauses.
///
/// The BDD variables are the latch selectors `c_j` followed by one flip selector per time
/// step. Test cases must not contain free inputs.
pub struct BddAnalysis<'a> {
    aig: &'a Aig,
    options: &'a Options,
}

impl<'a> BddAnalysis<'a> {
    pub fn new(aig: &'a Aig, options: &'a Options) -> Result<Self> {
        if aig.alarm().is_none() {
            return Err(AigError::MissingAlarm.into());
        }
        Ok(BddAnalysis { aig, options })
    }

    pub fn analyze(&self, testcases: &[TestCase]) -> Result<VulnerabilityReport> {
        check_test_cases(self.aig, testcases, true)?;
        let checked = checked_latches(self.aig, self.options.num_err_latches)?;
        let steps = testcases.iter().map(TestCase::len).max().unwrap_or(0);
        let num_vars = checked.len() + steps;
        let capacity = u16::try_from(num_vars)
            .map_err(|_| SolverError::VariableOutOfRange(num_vars as u32, u16::MAX))?;
        info!(
            "bdd vulnerability analysis: {} latches, {} test cases",
            checked.len(),
            testcases.len()
        );

        let vars = BddVariableSet::new_anonymous(capacity);
        let variables = vars.variables();
        let selectors: Vec<Bdd> = variables[..checked.len()]
            .iter()
            .map(|&v| vars.mk_var(v))
            .collect();
        let mut single_location = vars.mk_true();
        let mut any_selected = vars.mk_false();
        for c in &selectors {
            single_location = single_location.and(&any_selected.and(c).not());
            any_selected = any_selected.or(c);
        }

        let mut remaining: BTreeSet<usize> = (0..checked.len()).collect();
        let mut blocked = vars.mk_true();
        let mut report = VulnerabilityReport::default();

        for tc in testcases {
            let mut golden = AigSimulator::new(self.aig);
            let mut faulty = BddSimulator::new(self.aig, &vars);
            let mut no_alarm = vars.mk_true();
            let mut single_time = vars.mk_true();
            let mut any_flip = vars.mk_false();
            let mut inputs: Vec<Vec<bool>> = Vec::new();

            for t in 0..tc.len() {
                if remaining.is_empty() {
                    break;
                }
                faulty.set_input_values(tc.step(t))?;
                let step = tc.bools(t);
                golden.simulate_step(&step);
                inputs.push(step);

                let f = vars.mk_var(variables[checked.len() + t]);
                single_time = single_time.and(&any_flip.and(&f).not());
                any_flip = any_flip.or(&f);
                for &k in &remaining {
                    let index = checked[k].index;
                    let old = faulty.read(checked[k].lit);
                    faulty.set_latch_value(index, old.xor(&selectors[k].and(&f)));
                }
                faulty.simulate_step();
                no_alarm = no_alarm.and(&faulty.alarm_value().not());

                let golden_outputs = golden.outputs();
                let outputs = faulty.output_values();
                let mut differs = vars.mk_false();
                for (out, &ok) in outputs.iter().zip(&golden_outputs[..golden_outputs.len() - 1]) {
                    differs = differs.or(&if ok { out.not() } else { out.clone() });
                }

                let mut witnesses = no_alarm
                    .and(&differs)
                    .and(&single_location)
                    .and(&single_time)
                    .and(&blocked);
                while let Some(valuation) = witnesses.sat_witness() {
                    let Some(k) = (0..checked.len()).find(|&k| valuation.value(variables[k])) else {
                        break;
                    };
                    let flipped = (0..=t)
                        .find(|&s| valuation.value(variables[checked.len() + s]))
                        .unwrap_or(t);
                    let latch = checked[k].lit;
                    debug!("bdd witness: latch {} flipped at {}, error at {}", latch, flipped, t);
                    info!("latch {} is vulnerable", latch);

                    blocked = blocked.and(&selectors[k].not());
                    witnesses = witnesses.and(&selectors[k].not());
                    remaining.remove(&k);
                    report.vulnerable.insert(latch);
                    if self.options.diagnostic {
                        report
                            .traces
                            .push(ErrorTrace::new(latch, flipped, t, inputs.clone()));
                    }
                }

                faulty.switch_to_next_state();
                golden.switch_to_next_state();
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{aig::fixtures, error::Error, testcase::model_checking_test_case};

    #[test]
    fn toggle_partial_test() {
        let aig = fixtures::parse(fixtures::TOGGLE_PARTIAL);
        let options = Options::default();
        let steps = vec![vec![false]; 3];
        let tcs = vec![TestCase::from_bools(1, &steps).unwrap()];
        let report = BddAnalysis::new(&aig, &options).unwrap().analyze(&tcs).unwrap();
        assert_eq!(report.vulnerable, BTreeSet::from([14]));
        assert_eq!(report.traces.len(), 1);
        assert_eq!(report.traces[0].flipped_timestep(), 0);
    }

    #[test]
    fn free_inputs_test() {
        let aig = fixtures::parse(fixtures::ONE_LATCH_FP2);
        let options = Options::default();
        let tcs = vec![model_checking_test_case(2, 1)];
        let result = BddAnalysis::new(&aig, &options).unwrap().analyze(&tcs);
        assert!(matches!(result, Err(Error::Solver(SolverError::FreeInputs))));
    }
}
