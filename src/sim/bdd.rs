use biodivine_lib_bdd::{Bdd, BddVariableSet};

use crate::{
    aig::{Aig, AigLit, is_negated, var},
    solver::SolverError,
    testcase::InputValue,
};

/// Simulation over BDDs of a shared [`BddVariableSet`].
///
/// Inputs must be definite; latches may hold arbitrary BDDs, which is how faults are
/// injected.
#[derive(Clone)]
pub struct BddSimulator<'a> {
    aig: &'a Aig,
    vars: &'a BddVariableSet,
    results: Vec<Bdd>,
}

impl<'a> BddSimulator<'a> {
    pub fn new(aig: &'a Aig, vars: &'a BddVariableSet) -> Self {
        let mut sim = BddSimulator {
            aig,
            vars,
            results: vec![vars.mk_false(); aig.maxvar() as usize + 1],
        };
        sim.init_latches();
        sim
    }

    pub fn init_latches(&mut self) {
        for latch in self.aig.latches() {
            self.results[var(latch.lit) as usize] = self.constant(latch.init_value());
        }
    }

    fn constant(&self, value: bool) -> Bdd {
        if value {
            self.vars.mk_true()
        } else {
            self.vars.mk_false()
        }
    }

    pub fn read(&self, lit: AigLit) -> Bdd {
        let value = &self.results[var(lit) as usize];
        if is_negated(lit) {
            value.not()
        } else {
            value.clone()
        }
    }

    /// Fails on free inputs, which have no BDD counterpart here.
    pub fn set_input_values(&mut self, values: &[InputValue]) -> Result<(), SolverError> {
        debug_assert_eq!(values.len(), self.aig.num_inputs());
        for (&input, &value) in self.aig.inputs().iter().zip(values) {
            let value = value.to_bool().ok_or(SolverError::FreeInputs)?;
            self.results[var(input) as usize] = self.constant(value);
        }
        Ok(())
    }

    pub fn simulate_step(&mut self) {
        for gate in self.aig.ands() {
            let value = self.read(gate.rhs0).and(&self.read(gate.rhs1));
            self.results[var(gate.lhs) as usize] = value;
        }
    }

    /// Every output, the alarm last.
    pub fn output_values(&self) -> Vec<Bdd> {
        self.aig.outputs().iter().map(|&o| self.read(o)).collect()
    }

    pub fn alarm_value(&self) -> Bdd {
        self.aig
            .alarm()
            .map_or_else(|| self.vars.mk_false(), |a| self.read(a))
    }

    pub fn latch_values(&self) -> Vec<Bdd> {
        self.aig.latches().iter().map(|l| self.read(l.lit)).collect()
    }

    pub fn set_latch_value(&mut self, index: usize, value: Bdd) {
        let v = var(self.aig.latches()[index].lit) as usize;
        self.results[v] = value;
    }

    pub fn next_latch_values(&self) -> Vec<Bdd> {
        self.aig.latches().iter().map(|l| self.read(l.next)).collect()
    }

    pub fn switch_to_next_state(&mut self) {
        let next = self.next_latch_values();
        for (latch, value) in self.aig.latches().iter().zip(next) {
            self.results[var(latch.lit) as usize] = value;
        }
    }
}
