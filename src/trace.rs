//! Diagnostic traces produced by the analyses.
//!
//! Both trace types are immutable values built once a witness is found.

use std::fmt::{self, Write};

use crate::{
    aig::{Aig, AigLit},
    sim::AigSimulator,
    testcase::TestCase,
};

/// A flip raising the alarm although the outputs stay correct and the state converges
/// back to the golden one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuperfluousTrace {
    component: AigLit,
    component_index: usize,
    flip_timestep: usize,
    alarm_timestep: usize,
    error_gone_timestep: usize,
    testcase: TestCase,
}

impl SuperfluousTrace {
    pub fn new(
        component: AigLit,
        component_index: usize,
        flip_timestep: usize,
        alarm_timestep: usize,
        error_gone_timestep: usize,
        testcase: TestCase,
    ) -> Self {
        SuperfluousTrace {
            component,
            component_index,
            flip_timestep,
            alarm_timestep,
            error_gone_timestep,
            testcase,
        }
    }

    /// Literal of the flipped latch.
    pub fn component(&self) -> AigLit {
        self.component
    }

    /// Index of the flipped latch.
    pub fn component_index(&self) -> usize {
        self.component_index
    }

    pub fn flip_timestep(&self) -> usize {
        self.flip_timestep
    }

    /// First step with a raised alarm.
    pub fn alarm_timestep(&self) -> usize {
        self.alarm_timestep
    }

    /// First step where the faulty state equals the golden state.
    pub fn error_gone_timestep(&self) -> usize {
        self.error_gone_timestep
    }

    /// The test case the trace was found on, concrete for free input searches.
    pub fn testcase(&self) -> &TestCase {
        &self.testcase
    }

    /// Replays the golden and the faulty run up to the step where the error is gone.
    pub fn render(&self, aig: &Aig) -> String {
        let mut out = String::new();
        let _ = self.render_into(aig, &mut out);
        out
    }

    fn render_into(&self, aig: &Aig, out: &mut String) -> fmt::Result {
        writeln!(out, "{}", self)?;
        let mut ok = AigSimulator::new(aig);
        let mut err = AigSimulator::new(aig);

        writeln!(out, "[SIM] i=?: state | inputs | outputs | next state")?;
        writeln!(out, "-------------------------------------------------")?;
        let steps = self.error_gone_timestep.min(self.testcase.len());
        for j in 0..steps {
            let inputs = self.testcase.bools(j);
            if j == self.flip_timestep {
                err.flip_latch(self.component_index);
            }
            ok.simulate_step(&inputs);
            err.simulate_step(&inputs);
            writeln!(out, "[ OK] i={}: {}", j, state_string(&ok, &inputs))?;
            if j >= self.flip_timestep {
                write!(out, "[ERR] i={}: {}", j, state_string(&err, &inputs))?;
                if j == self.flip_timestep {
                    write!(out, " <<< flipped in this state!")?;
                }
                if j + 1 == self.error_gone_timestep {
                    write!(out, " <<< error gone in next state!")?;
                }
                writeln!(out)?;
            }
            ok.switch_to_next_state();
            err.switch_to_next_state();
        }
        Ok(())
    }
}

impl fmt::Display for SuperfluousTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "component={} flip_timestep={}, alarm_timestep={},error_gone_ts={}",
            self.component, self.flip_timestep, self.alarm_timestep, self.error_gone_timestep
        )
    }
}

/// A flip changing an output without any alarm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorTrace {
    latch: AigLit,
    flipped_timestep: usize,
    error_timestep: usize,
    inputs: Vec<Vec<bool>>,
}

impl ErrorTrace {
    /// `inputs` must cover the steps `0..=error_timestep`.
    pub fn new(
        latch: AigLit,
        flipped_timestep: usize,
        error_timestep: usize,
        inputs: Vec<Vec<bool>>,
    ) -> Self {
        debug_assert!(flipped_timestep <= error_timestep);
        debug_assert!(inputs.len() > error_timestep);
        ErrorTrace {
            latch,
            flipped_timestep,
            error_timestep,
            inputs,
        }
    }

    pub fn latch(&self) -> AigLit {
        self.latch
    }

    pub fn flipped_timestep(&self) -> usize {
        self.flipped_timestep
    }

    /// Step with the wrong output.
    pub fn error_timestep(&self) -> usize {
        self.error_timestep
    }

    pub fn inputs(&self) -> &[Vec<bool>] {
        &self.inputs
    }

    /// Replays the golden and the faulty run side by side.
    ///
    /// Each row shows `state inputs outputs next_state` as bit strings.
    pub fn render(&self, aig: &Aig) -> String {
        let mut out = String::new();
        // writing into a String cannot fail
        let _ = self.render_into(aig, &mut out);
        out
    }

    fn render_into(&self, aig: &Aig, out: &mut String) -> fmt::Result {
        writeln!(out, "{}", self)?;
        let mut ok = AigSimulator::new(aig);
        let mut err = AigSimulator::new(aig);
        let latch_index = aig.latch_index(self.latch);

        writeln!(out, "[SIM] i=?: state | inputs | outputs | next state")?;
        writeln!(out, "-------------------------------------------------")?;
        for (j, inputs) in self.inputs.iter().enumerate().take(self.error_timestep + 1) {
            if j == self.flipped_timestep {
                if let Some(index) = latch_index {
                    err.flip_latch(index);
                }
            }
            ok.simulate_step(inputs);
            err.simulate_step(inputs);
            writeln!(out, "[ OK] i={}: {}", j, state_string(&ok, inputs))?;
            if j >= self.flipped_timestep {
                write!(out, "[ERR] i={}: {}", j, state_string(&err, inputs))?;
                if j == self.flipped_timestep {
                    write!(out, " <<< flipped in this state!")?;
                }
                if j == self.error_timestep {
                    write!(out, " <<< wrong output in this state!")?;
                }
                writeln!(out)?;
            }
            ok.switch_to_next_state();
            err.switch_to_next_state();
        }
        Ok(())
    }
}

fn bits(values: &[bool]) -> String {
    values.iter().map(|&b| if b { '1' } else { '0' }).collect()
}

fn state_string(sim: &AigSimulator, inputs: &[bool]) -> String {
    format!(
        "{} {} {} {}",
        bits(&sim.state()),
        bits(inputs),
        bits(&sim.outputs()),
        bits(&sim.next_state())
    )
}

impl fmt::Display for ErrorTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Latch: {} flipped at i={}, error at i={}",
            self.latch, self.flipped_timestep, self.error_timestep
        )
    }
}
