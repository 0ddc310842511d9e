use crate::aig::{Aig, AigLit, is_negated, var};

/// Concrete two-valued simulation.
#[derive(Debug, Clone)]
pub struct AigSimulator<'a> {
    aig: &'a Aig,
    results: Vec<bool>,
}

impl<'a> AigSimulator<'a> {
    /// A simulator with every latch in its initial state.
    pub fn new(aig: &'a Aig) -> Self {
        let mut sim = AigSimulator {
            aig,
            results: vec![false; aig.maxvar() as usize + 1],
        };
        sim.init_latches();
        sim
    }

    pub fn init_latches(&mut self) {
        for latch in self.aig.latches() {
            self.results[var(latch.lit) as usize] = latch.init_value();
        }
    }

    pub fn value(&self, lit: AigLit) -> bool {
        self.results[var(lit) as usize] ^ is_negated(lit)
    }

    pub fn set_inputs(&mut self, inputs: &[bool]) {
        debug_assert_eq!(inputs.len(), self.aig.num_inputs());
        for (&i, &v) in self.aig.inputs().iter().zip(inputs) {
            self.results[var(i) as usize] = v;
        }
    }

    /// Sets the inputs and propagates the AND gates.
    pub fn simulate_step(&mut self, inputs: &[bool]) {
        self.set_inputs(inputs);
        self.propagate();
    }

    /// Propagates the AND gates from the current inputs and latches.
    pub fn propagate(&mut self) {
        for gate in self.aig.ands() {
            self.results[var(gate.lhs) as usize] = self.value(gate.rhs0) && self.value(gate.rhs1);
        }
    }

    /// All outputs, the alarm last.
    pub fn outputs(&self) -> Vec<bool> {
        self.aig.outputs().iter().map(|&o| self.value(o)).collect()
    }

    pub fn alarm(&self) -> bool {
        self.aig.alarm().is_some_and(|a| self.value(a))
    }

    pub fn state(&self) -> Vec<bool> {
        self.aig.latches().iter().map(|l| self.value(l.lit)).collect()
    }

    pub fn set_state(&mut self, state: &[bool]) {
        for (latch, &v) in self.aig.latches().iter().zip(state) {
            self.results[var(latch.lit) as usize] = v;
        }
    }

    /// Inverts the current value of the latch with index `latch`.
    pub fn flip_latch(&mut self, latch: usize) {
        let v = var(self.aig.latches()[latch].lit) as usize;
        self.results[v] = !self.results[v];
    }

    pub fn next_state(&self) -> Vec<bool> {
        self.aig
            .latches()
            .iter()
            .map(|l| self.value(l.next))
            .collect()
    }

    pub fn switch_to_next_state(&mut self) {
        let next = self.next_state();
        self.set_state(&next);
    }
}
