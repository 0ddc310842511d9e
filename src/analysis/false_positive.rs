use tracing::{debug, info, warn};

use super::{
    AlarmWithoutError, Component, FalsePositiveReport, add_folded, check_test_cases,
    checked_latches, flush, make_solver,
};
use crate::{
    aig::{Aig, AigError},
    cnf::Lit,
    config::{Backend, FalsePositiveMode, Options},
    encode::Encoder,
    error::{Error, Result},
    sim::{AigSimulator, SymbolicSimulator},
    solver::{DecisionProcedure, Model, SolverError},
    testcase::TestCase,
    trace::SuperfluousTrace,
};

/// Searches for superfluous alarms: a flip raises the alarm, yet every relevant output
/// stays correct and the faulty state joins the golden one again.
///
/// The flip time step is always symbolic. Depending on the [`FalsePositiveMode`], the
/// latch is either fixed by an outer loop or chosen by selectors `c_j`, and free inputs
/// of the test cases are either rejected or left open to the solver.
///
/// An optional environment model tells which outputs matter. It reads the circuit inputs
/// followed by all golden outputs, and its output `i` states whether output `i` of the
/// circuit is relevant at that step. In the free input modes, an additional last output
/// constrains the inputs.
///
/// If the golden run raises the alarm, the search stops right away and reports it.
pub struct FalsePositiveAnalysis<'a> {
    aig: &'a Aig,
    options: &'a Options,
    mode: FalsePositiveMode,
    environment: Option<&'a Aig>,
    solver: Box<dyn DecisionProcedure>,
}

/// Where the flip happens.
#[derive(Debug, Clone, Copy)]
enum Location<'c> {
    Fixed(Component),
    Symbolic(&'c [Component]),
}

impl<'a> FalsePositiveAnalysis<'a> {
    pub fn new(aig: &'a Aig, options: &'a Options, mode: FalsePositiveMode) -> Result<Self> {
        if mode.free_inputs() && options.backend == Backend::Bdd {
            return Err(SolverError::FreeInputs.into());
        }
        Self::with_solver(aig, options, mode, make_solver(options))
    }

    pub fn with_solver(
        aig: &'a Aig,
        options: &'a Options,
        mode: FalsePositiveMode,
        solver: Box<dyn DecisionProcedure>,
    ) -> Result<Self> {
        if aig.alarm().is_none() {
            return Err(AigError::MissingAlarm.into());
        }
        Ok(FalsePositiveAnalysis {
            aig,
            options,
            mode,
            environment: None,
            solver,
        })
    }

    /// Only outputs marked relevant by `environment` have to stay correct.
    pub fn with_environment(mut self, environment: &'a Aig) -> Result<Self> {
        let expected = self.aig.num_inputs() + self.aig.num_outputs();
        if environment.num_inputs() != expected {
            return Err(Error::EnvironmentMismatch {
                what: "inputs",
                expected,
                found: environment.num_inputs(),
            });
        }
        let expected = self.aig.num_outputs() - 1;
        if environment.num_outputs() < expected {
            return Err(Error::EnvironmentMismatch {
                what: "outputs",
                expected,
                found: environment.num_outputs(),
            });
        }
        self.environment = Some(environment);
        Ok(self)
    }

    pub fn analyze(&mut self, testcases: &[TestCase]) -> Result<FalsePositiveReport> {
        check_test_cases(self.aig, testcases, self.mode.free_inputs())?;
        let checked = checked_latches(self.aig, self.options.num_err_latches)?;
        info!(
            "false positive analysis ({:?}): {} latches, {} test cases",
            self.mode,
            checked.len(),
            testcases.len()
        );

        let mut report = FalsePositiveReport::default();
        if self.mode.symbolic_location() {
            for (index, tc) in testcases.iter().enumerate() {
                if self.run(index, tc, Location::Symbolic(&checked), &mut report)? {
                    return Ok(report);
                }
            }
        } else {
            for &component in &checked {
                for (index, tc) in testcases.iter().enumerate() {
                    if self.run(index, tc, Location::Fixed(component), &mut report)? {
                        return Ok(report);
                    }
                }
            }
        }

        info!(
            "{} superfluous traces on {} latches",
            report.traces.len(),
            report.detected.len()
        );
        Ok(report)
    }

    /// One incremental session over one test case.
    ///
    /// Returns true if the golden run raised the alarm.
    fn run(
        &mut self,
        index: usize,
        tc: &TestCase,
        location: Location,
        report: &mut FalsePositiveReport,
    ) -> Result<bool> {
        let aig = self.aig;
        let free_inputs = self.mode.free_inputs();
        let compared = aig.num_latches() - self.options.num_err_latches;
        let n = aig.num_outputs() - 1;
        let solver = self.solver.as_mut();

        let mut enc = Encoder::with_and_cache();
        let selectors: Vec<Lit> = match location {
            Location::Fixed(_) => Vec::new(),
            Location::Symbolic(components) => components.iter().map(|_| enc.fresh()).collect(),
        };
        solver.start_session(&selectors, false);
        solver.add_unit(Lit::TRUE)?;
        enc.at_most_one(&selectors);

        let mut golden = SymbolicSimulator::new(aig);
        let mut faulty = SymbolicSimulator::new(aig);
        let mut environment = self.environment.map(SymbolicSimulator::new);
        // concrete twin of the golden run, to settle single flips without solver
        let mut concrete =
            (!free_inputs && self.environment.is_none()).then(|| AigSimulator::new(aig));

        let mut flips: Vec<Lit> = Vec::new();
        let mut flip_steps: Vec<usize> = Vec::new();
        let mut alarms: Vec<Lit> = Vec::new();
        let mut enables: Vec<Lit> = Vec::new();
        let mut cnf_inputs: Vec<Vec<Lit>> = Vec::new();

        for t in 0..tc.len() {
            golden.set_input_values(tc.step(t), &mut enc);
            golden.simulate_step(&mut enc);
            let golden_alarm = golden.alarm_value();
            if golden_alarm == Lit::TRUE {
                warn!("alarm raised without error: test case {}, step {}", index, t);
                report.alarm_without_error = Some(AlarmWithoutError {
                    testcase: index,
                    timestep: t,
                });
                solver.end_session();
                return Ok(true);
            }
            if golden_alarm != Lit::FALSE {
                enc.add_lits(&[!golden_alarm]);
            }
            let inputs = golden.input_values();
            let golden_outputs = golden.output_values();
            faulty.set_cnf_input_values(&inputs);
            cnf_inputs.push(inputs.clone());
            if let Some(concrete) = concrete.as_mut() {
                concrete.simulate_step(&tc.bools(t));
            }

            match location {
                Location::Fixed(component) => {
                    let mut flip_now = true;
                    if let Some(concrete) = concrete.as_ref() {
                        let mut flipped = concrete.clone();
                        flipped.flip_latch(component.index);
                        flipped.propagate();
                        let same_outputs = flipped.outputs()[..n] == concrete.outputs()[..n];
                        if same_outputs
                            && flipped.alarm()
                            && flipped.next_state()[..compared] == concrete.next_state()[..compared]
                        {
                            debug!(
                                "latch {}: concrete flip at {} is superfluous",
                                component.lit, t
                            );
                            report.detected.insert(component.lit);
                            report.traces.push(SuperfluousTrace::new(
                                component.lit,
                                component.index,
                                t,
                                t,
                                t + 1,
                                tc.prefix(t + 1),
                            ));
                            flip_now = false;
                        } else {
                            flip_now = same_outputs;
                        }
                    }
                    if flip_now {
                        let f = enc.fresh();
                        let old = faulty.read_cnf_value(component.lit);
                        let new = enc.flip(old, f);
                        faulty.set_latch_value(component.index, new);
                        for &previous in &flips {
                            enc.add_lits(&[!f, !previous]);
                        }
                        flips.push(f);
                        flip_steps.push(t);
                    }
                }
                Location::Symbolic(components) => {
                    let f = enc.fresh();
                    for (component, &c) in components.iter().zip(&selectors) {
                        let old = faulty.read_cnf_value(component.lit);
                        let new = enc.flip_if(old, c, f);
                        faulty.set_latch_value(component.index, new);
                    }
                    for &previous in &flips {
                        enc.add_lits(&[!f, !previous]);
                    }
                    flips.push(f);
                    flip_steps.push(t);
                }
            }

            faulty.simulate_step(&mut enc);
            alarms.push(faulty.alarm_value());

            // relevant outputs must stay correct
            let outputs = faulty.output_values();
            let relevant: Option<Vec<Lit>> = environment.as_mut().map(|env| {
                let mut env_inputs = inputs.clone();
                env_inputs.extend_from_slice(&golden_outputs);
                env.set_cnf_input_values(&env_inputs);
                env.simulate_step(&mut enc);
                env.output_values()
            });
            for i in 0..n {
                let guard = relevant.as_ref().map_or(Lit::TRUE, |r| r[i]);
                let (ok, out) = (golden_outputs[i], outputs[i]);
                add_folded(solver, vec![!guard, !ok, out])?;
                add_folded(solver, vec![!guard, ok, !out])?;
            }
            if let Some(relevant) = relevant.as_ref() {
                if free_inputs && relevant.len() == golden_outputs.len() {
                    add_folded(solver, vec![relevant[n]])?;
                }
            }

            // ... and the state must be the golden one again
            let enable = enc.fresh();
            let mut assumptions = enables.clone();
            assumptions.push(!enable);
            enables.push(enable);
            let golden_next = golden.next_latch_values();
            let faulty_next = faulty.next_latch_values();
            for (&ok, &next) in golden_next[..compared].iter().zip(&faulty_next[..compared]) {
                if ok.is_constant() {
                    assumptions.push(if ok == Lit::TRUE { next } else { !next });
                } else {
                    add_folded(solver, vec![enable, !ok, next])?;
                    add_folded(solver, vec![enable, ok, !next])?;
                }
            }
            let mut some_alarm = alarms.clone();
            some_alarm.push(enable);
            flush(&mut enc, solver)?;
            add_folded(solver, some_alarm)?;

            golden.switch_to_next_state();
            faulty.switch_to_next_state();
            if let Some(env) = environment.as_mut() {
                env.switch_to_next_state();
            }
            if let Some(concrete) = concrete.as_mut() {
                concrete.switch_to_next_state();
            }

            let mut vars_of_interest = selectors.clone();
            vars_of_interest.extend_from_slice(&flips);
            vars_of_interest.extend(alarms.iter().filter(|a| !a.is_constant()));
            vars_of_interest.extend_from_slice(golden.open_input_vars());
            loop {
                let answer = solver.inc_model_or_core(&assumptions, &vars_of_interest)?;
                let Some(model) = answer.model() else {
                    break;
                };
                let model = Model::from(model);
                let Some(i) = flips.iter().position(|&f| model.is_true(f)) else {
                    warn!("step {}: superfluous alarm without any flip", t);
                    break;
                };
                let component = match location {
                    Location::Fixed(component) => {
                        solver.add_unit(!flips[i])?;
                        component
                    }
                    Location::Symbolic(components) => {
                        let Some(k) = (0..selectors.len()).find(|&k| model.is_true(selectors[k]))
                        else {
                            warn!("step {}: superfluous alarm without any selected latch", t);
                            break;
                        };
                        solver.add_clause(&[!flips[i], !selectors[k]])?;
                        components[k]
                    }
                };
                let flip = flip_steps[i];
                let alarm = alarms
                    .iter()
                    .position(|&a| model.is_true(a))
                    .unwrap_or(flip);
                let testcase = tc.prefix(t + 1).concretize(&cnf_inputs, &model);
                info!(
                    "superfluous alarm: latch {} flipped at {}, alarm at {}, gone at {}",
                    component.lit,
                    flip,
                    alarm,
                    t + 1
                );
                report.detected.insert(component.lit);
                report.traces.push(SuperfluousTrace::new(
                    component.lit,
                    component.index,
                    flip,
                    alarm,
                    t + 1,
                    testcase,
                ));
            }
        }
        solver.end_session();
        Ok(false)
    }
}
