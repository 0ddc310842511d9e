use crate::{
    aig::{Aig, AigLit, is_negated, var},
    cnf::Lit,
    encode::Encoder,
    testcase::InputValue,
};

/// Simulation over SAT literals.
///
/// Gate values are literals produced by the [`Encoder`] passed to
/// [`simulate_step`](SymbolicSimulator::simulate_step). Several simulators may share one
/// encoder, and thus one variable numbering, to build golden and faulty runs side by side.
#[derive(Debug, Clone)]
pub struct SymbolicSimulator<'a> {
    aig: &'a Aig,
    results: Vec<Lit>,
    open_input_vars: Vec<Lit>,
    time_index: usize,
}

impl<'a> SymbolicSimulator<'a> {
    pub fn new(aig: &'a Aig) -> Self {
        let mut sim = SymbolicSimulator {
            aig,
            results: vec![Lit::FALSE; aig.maxvar() as usize + 1],
            open_input_vars: Vec::new(),
            time_index: 0,
        };
        sim.init_latches();
        sim
    }

    /// Sets every latch to its initial constant and rewinds the time index.
    pub fn init_latches(&mut self) {
        for latch in self.aig.latches() {
            self.results[var(latch.lit) as usize] = if latch.init_value() {
                Lit::TRUE
            } else {
                Lit::FALSE
            };
        }
        self.time_index = 0;
    }

    /// Number of simulated steps since the latches were initialized.
    pub fn time_index(&self) -> usize {
        self.time_index
    }

    /// The literal of an AIG literal, following its negation.
    pub fn read_cnf_value(&self, lit: AigLit) -> Lit {
        let value = self.results[var(lit) as usize];
        if is_negated(lit) { !value } else { value }
    }

    pub fn result_value(&self, aig_var: usize) -> Lit {
        self.results[aig_var]
    }

    pub fn set_result_value(&mut self, aig_var: usize, value: Lit) {
        self.results[aig_var] = value;
    }

    /// Concrete inputs become constants, free inputs fresh variables.
    ///
    /// The fresh variables are appended to [`open_input_vars`](Self::open_input_vars).
    pub fn set_input_values(&mut self, values: &[InputValue], enc: &mut Encoder) {
        debug_assert_eq!(values.len(), self.aig.num_inputs());
        for (&input, &value) in self.aig.inputs().iter().zip(values) {
            let lit = match value {
                InputValue::True => Lit::TRUE,
                InputValue::False => Lit::FALSE,
                InputValue::Free => {
                    let v = enc.fresh();
                    self.open_input_vars.push(v);
                    v
                }
            };
            self.results[var(input) as usize] = lit;
        }
    }

    /// Every input becomes a fresh variable.
    pub fn set_input_values_open(&mut self, enc: &mut Encoder) {
        for &input in self.aig.inputs() {
            self.results[var(input) as usize] = enc.fresh();
        }
    }

    /// Every latch becomes a fresh variable, ie an arbitrary state.
    pub fn set_state_values_open(&mut self, enc: &mut Encoder) {
        for latch in self.aig.latches() {
            self.results[var(latch.lit) as usize] = enc.fresh();
        }
    }

    /// Uses the given literals as inputs.
    pub fn set_cnf_input_values(&mut self, values: &[Lit]) {
        debug_assert_eq!(values.len(), self.aig.num_inputs());
        for (&input, &value) in self.aig.inputs().iter().zip(values) {
            self.results[var(input) as usize] = value;
        }
    }

    /// Uses the given literals as current state.
    pub fn set_latch_values(&mut self, values: &[Lit]) {
        debug_assert_eq!(values.len(), self.aig.num_latches());
        for (latch, &value) in self.aig.latches().iter().zip(values) {
            self.results[var(latch.lit) as usize] = value;
        }
    }

    /// Replaces the current value of latch number `index`.
    pub fn set_latch_value(&mut self, index: usize, value: Lit) {
        let v = var(self.aig.latches()[index].lit) as usize;
        self.results[v] = value;
    }

    /// Encodes every AND gate of the current step.
    pub fn simulate_step(&mut self, enc: &mut Encoder) {
        for gate in self.aig.ands() {
            let rhs0 = self.read_cnf_value(gate.rhs0);
            let rhs1 = self.read_cnf_value(gate.rhs1);
            self.results[var(gate.lhs) as usize] = enc.and(rhs0, rhs1);
        }
        self.time_index += 1;
    }

    /// Every output, the alarm last.
    pub fn output_values(&self) -> Vec<Lit> {
        self.aig
            .outputs()
            .iter()
            .map(|&o| self.read_cnf_value(o))
            .collect()
    }

    pub fn alarm_value(&self) -> Lit {
        self.aig
            .alarm()
            .map_or(Lit::FALSE, |a| self.read_cnf_value(a))
    }

    pub fn input_values(&self) -> Vec<Lit> {
        self.aig
            .inputs()
            .iter()
            .map(|&i| self.read_cnf_value(i))
            .collect()
    }

    pub fn latch_values(&self) -> Vec<Lit> {
        self.aig
            .latches()
            .iter()
            .map(|l| self.read_cnf_value(l.lit))
            .collect()
    }

    pub fn next_latch_values(&self) -> Vec<Lit> {
        self.aig
            .latches()
            .iter()
            .map(|l| self.read_cnf_value(l.next))
            .collect()
    }

    pub fn switch_to_next_state(&mut self) {
        let next = self.next_latch_values();
        self.set_latch_values(&next);
    }

    /// Fresh variables created for free inputs, in order of creation.
    pub fn open_input_vars(&self) -> &[Lit] {
        &self.open_input_vars
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        aig::fixtures,
        sim::AigSimulator,
        solver::{Answer, DecisionProcedure, SatSolver},
    };

    #[test]
    fn concrete_inputs_fold_test() {
        // with concrete inputs and initial state, every value is a constant
        let aig = fixtures::parse(fixtures::TOGGLE_PARTIAL);
        let mut enc = Encoder::new();
        let mut sym = SymbolicSimulator::new(&aig);
        let mut sim = AigSimulator::new(&aig);
        for _ in 0..4 {
            sym.set_input_values(&[InputValue::True], &mut enc);
            sym.simulate_step(&mut enc);
            sim.simulate_step(&[true]);
            let expected: Vec<Lit> = sim
                .outputs()
                .iter()
                .map(|&b| if b { Lit::TRUE } else { Lit::FALSE })
                .collect();
            assert_eq!(sym.output_values(), expected);
            sym.switch_to_next_state();
            sim.switch_to_next_state();
        }
        assert!(enc.take_clauses().is_empty());
        assert_eq!(sym.time_index(), 4);
    }

    #[test]
    fn open_state_matches_concrete_test() {
        // every model of the open state simulation is a concrete run
        let aig = fixtures::parse(fixtures::THREE_BY_THREE);
        let mut enc = Encoder::new();
        let mut sym = SymbolicSimulator::new(&aig);
        sym.set_state_values_open(&mut enc);
        sym.set_input_values(
            &[InputValue::Free, InputValue::True, InputValue::Free],
            &mut enc,
        );
        assert_eq!(sym.open_input_vars().len(), 2);
        sym.simulate_step(&mut enc);

        let mut solver = SatSolver::default();
        solver.start_session(&[], false);
        solver.add_unit(Lit::TRUE).unwrap();
        solver.add_cnf(&enc.take_clauses()).unwrap();

        let state = sym.latch_values();
        let inputs = sym.input_values();
        let outputs = sym.output_values();
        let mut voi = state.clone();
        voi.extend(inputs.iter().filter(|l| !l.is_constant()));
        voi.extend(outputs.iter().filter(|l| !l.is_constant()));

        let Answer::Sat(model) = solver.inc_model_or_core(&[], &voi).unwrap() else {
            panic!("simulation must be satisfiable");
        };
        let m = crate::solver::Model::from(&model[..]);
        let value = |l: Lit| m.value(l).unwrap();

        let mut sim = AigSimulator::new(&aig);
        sim.set_state(&state.iter().map(|&l| value(l)).collect::<Vec<_>>());
        sim.simulate_step(&inputs.iter().map(|&l| value(l)).collect::<Vec<_>>());
        let expected = sim.outputs();
        let got: Vec<bool> = outputs.iter().map(|&l| value(l)).collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn switch_to_next_state_test() {
        let aig = fixtures::parse(fixtures::TOGGLE_PERFECT);
        let mut enc = Encoder::new();
        let mut sym = SymbolicSimulator::new(&aig);
        sym.set_input_values(&[InputValue::False], &mut enc);
        sym.simulate_step(&mut enc);
        assert_eq!(sym.next_latch_values(), vec![Lit::TRUE, Lit::TRUE]);
        sym.switch_to_next_state();
        assert_eq!(sym.latch_values(), vec![Lit::TRUE, Lit::TRUE]);
        sym.set_latch_value(1, Lit::FALSE);
        sym.simulate_step(&mut enc);
        assert_eq!(sym.alarm_value(), Lit::TRUE);
    }
}
