use tracing::{debug, info, warn};

use super::{Component, VulnerabilityReport, check_test_cases, checked_latches};
use crate::{
    aig::{Aig, AigError},
    config::Options,
    error::{Error, Result},
    sim::AigSimulator,
    testcase::{InputValue, TestCase},
    trace::ErrorTrace,
};

/// Free inputs of a test case are expanded over all assignments, up to this many.
const MAX_FREE_INPUTS: usize = 20;

/// Vulnerability search by explicit flips.
///
/// Every checked latch is flipped at every step of every test case, and the faulty run is
/// simulated until the alarm fires, an output differs or its state joins the golden one.
pub struct SimulationAnalysis<'a> {
    aig: &'a Aig,
    options: &'a Options,
}

/// What became of one injected flip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Detected,
    /// Wrong output at the given step without any alarm.
    Vulnerable(usize),
    Masked,
}

impl<'a> SimulationAnalysis<'a> {
    pub fn new(aig: &'a Aig, options: &'a Options) -> Result<Self> {
        if aig.alarm().is_none() {
            return Err(AigError::MissingAlarm.into());
        }
        Ok(SimulationAnalysis { aig, options })
    }

    pub fn analyze(&self, testcases: &[TestCase]) -> Result<VulnerabilityReport> {
        check_test_cases(self.aig, testcases, true)?;
        let mut remaining = checked_latches(self.aig, self.options.num_err_latches)?;
        info!(
            "simulation analysis: {} latches, {} test cases",
            remaining.len(),
            testcases.len()
        );

        let mut report = VulnerabilityReport::default();
        for (index, tc) in testcases.iter().enumerate() {
            for inputs in expand(index, tc)? {
                remaining.retain(|&component| match self.find_error(component, &inputs) {
                    Some(trace) => {
                        info!("latch {} is vulnerable: {}", component.lit, trace);
                        report.vulnerable.insert(component.lit);
                        if self.options.diagnostic {
                            report.traces.push(trace);
                        }
                        false
                    }
                    None => true,
                });
                if remaining.is_empty() {
                    return Ok(report);
                }
            }
        }
        Ok(report)
    }

    /// The first flip of `component` leading to a wrong output, if any.
    fn find_error(&self, component: Component, inputs: &[Vec<bool>]) -> Option<ErrorTrace> {
        let mut golden = AigSimulator::new(self.aig);
        for (flip, step) in inputs.iter().enumerate() {
            let mut faulty = golden.clone();
            faulty.flip_latch(component.index);
            match self.replay(faulty, golden.clone(), &inputs[flip..]) {
                Outcome::Vulnerable(after) => {
                    let error = flip + after;
                    return Some(ErrorTrace::new(
                        component.lit,
                        flip,
                        error,
                        inputs[..=error].to_vec(),
                    ));
                }
                outcome => debug!("latch {} flipped at {}: {:?}", component.lit, flip, outcome),
            }

            golden.simulate_step(step);
            if golden.alarm() {
                // any later flip happens after an alarm
                return None;
            }
            golden.switch_to_next_state();
        }
        None
    }

    fn replay(
        &self,
        mut faulty: AigSimulator,
        mut golden: AigSimulator,
        inputs: &[Vec<bool>],
    ) -> Outcome {
        let n = self.aig.num_outputs() - 1;
        for (t, step) in inputs.iter().enumerate() {
            faulty.simulate_step(step);
            golden.simulate_step(step);
            if faulty.alarm() {
                return Outcome::Detected;
            }
            if faulty.outputs()[..n] != golden.outputs()[..n] {
                return Outcome::Vulnerable(t);
            }
            if faulty.next_state() == golden.next_state() {
                return Outcome::Masked;
            }
            faulty.switch_to_next_state();
            golden.switch_to_next_state();
        }
        Outcome::Masked
    }
}

/// Every concrete input sequence of a test case.
fn expand(index: usize, tc: &TestCase) -> Result<Vec<Vec<Vec<bool>>>> {
    let free: Vec<(usize, usize)> = tc
        .steps()
        .iter()
        .enumerate()
        .flat_map(|(t, step)| {
            step.iter()
                .enumerate()
                .filter(|(_, v)| v.is_free())
                .map(move |(i, _)| (t, i))
        })
        .collect();
    if free.len() > MAX_FREE_INPUTS {
        warn!(
            "test case {} has {} free inputs, too many to enumerate",
            index,
            free.len()
        );
        return Err(Error::UnexpectedFreeInputs(index));
    }

    let base: Vec<Vec<bool>> = (0..tc.len()).map(|t| tc.bools(t)).collect();
    Ok((0..1u32 << free.len())
        .map(|bits| {
            let mut inputs = base.clone();
            for (k, &(t, i)) in free.iter().enumerate() {
                inputs[t][i] = bits & (1 << k) != 0;
            }
            inputs
        })
        .collect())
}
