//! Translation of an [`Aig`] into its CNF transition relation `T(x, i, o, x')`.
//!
//! The AIG literal `l` is mapped to the SAT literal `(l >> 1) + 1`, negated when `l` is odd,
//! see [`aig_lit_to_cnf_lit`]. AIG variable 0 (the constant) thus becomes SAT variable 1,
//! which is why [`Lit::FALSE`] is `1`.

use crate::{
    aig::{Aig, AigError, AigLit},
    cnf::{Clause, Cnf, Lit},
};

/// Maps an AIGER literal onto a SAT literal.
pub fn aig_lit_to_cnf_lit(aig_lit: AigLit) -> Lit {
    let cnf_lit = Lit::positive(((aig_lit >> 1) + 1) as u32);
    if aig_lit & 1 == 1 { !cnf_lit } else { cnf_lit }
}

/// The transition relation of a circuit together with its signal literals.
///
/// Built once per circuit and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    trans: Cnf,
    inputs: Vec<Lit>,
    outputs: Vec<Lit>,
    alarm_output: Lit,
    pres_state_vars: Vec<Lit>,
    next_state_vars: Vec<Lit>,
    max_cnf_var: u32,
}

impl Translation {
    /// Translates `aig`: three clauses per AND gate, in the order of the gates.
    pub fn new(aig: &Aig) -> Result<Self, AigError> {
        let alarm = aig.alarm().ok_or(AigError::MissingAlarm)?;

        let mut trans = Cnf::new();
        for gate in aig.ands() {
            let out = aig_lit_to_cnf_lit(gate.lhs);
            let rhs1 = aig_lit_to_cnf_lit(gate.rhs1);
            let rhs0 = aig_lit_to_cnf_lit(gate.rhs0);

            trans.add2(!out, rhs1);
            trans.add2(!out, rhs0);
            trans.add3(out, !rhs1, !rhs0);
        }

        let outputs = aig.outputs()[..aig.num_outputs() - 1]
            .iter()
            .map(|&o| aig_lit_to_cnf_lit(o))
            .collect();

        Ok(Translation {
            trans,
            inputs: aig.inputs().iter().map(|&i| aig_lit_to_cnf_lit(i)).collect(),
            outputs,
            alarm_output: aig_lit_to_cnf_lit(alarm),
            pres_state_vars: aig
                .latches()
                .iter()
                .map(|l| aig_lit_to_cnf_lit(l.lit))
                .collect(),
            next_state_vars: aig
                .latches()
                .iter()
                .map(|l| aig_lit_to_cnf_lit(l.next))
                .collect(),
            max_cnf_var: (aig.maxvar() + 1) as u32,
        })
    }

    /// The AND gate clauses only.
    pub fn trans(&self) -> &Cnf {
        &self.trans
    }

    /// The unit clause pinning the constant variable.
    pub fn constant_clause(&self) -> Clause {
        Clause::from(vec![Lit::TRUE])
    }

    /// [`trans`] plus [`constant_clause`].
    ///
    /// [`trans`]: Translation::trans
    /// [`constant_clause`]: Translation::constant_clause
    pub fn full_cnf(&self) -> Cnf {
        let mut cnf = Cnf::new();
        cnf.add_clause(self.constant_clause());
        cnf.add_cnf(&self.trans);
        cnf
    }

    pub fn inputs(&self) -> &[Lit] {
        &self.inputs
    }

    /// The outputs, without the alarm.
    pub fn outputs(&self) -> &[Lit] {
        &self.outputs
    }

    pub fn alarm_output(&self) -> Lit {
        self.alarm_output
    }

    pub fn pres_state_vars(&self) -> &[Lit] {
        &self.pres_state_vars
    }

    pub fn next_state_vars(&self) -> &[Lit] {
        &self.next_state_vars
    }

    /// Bounds every variable of [`trans`](Translation::trans).
    pub fn max_cnf_var(&self) -> u32 {
        self.max_cnf_var
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use super::*;
    use crate::aig::fixtures;
    use proptest::prelude::*;

    #[test]
    fn three_by_three_test() {
        let aig = fixtures::parse(fixtures::THREE_BY_THREE);
        let t = Translation::new(&aig).unwrap();

        assert_eq!(t.trans().len(), 3 * aig.num_ands());
        assert_eq!(t.inputs().len(), 3);
        assert_eq!(t.outputs().len(), 3);
        assert_eq!(t.pres_state_vars().len(), 3);
        assert_eq!(t.next_state_vars().len(), 3);
        assert!(!t.outputs().contains(&t.alarm_output()));
        assert_eq!(t.alarm_output(), Lit::FALSE);
        assert_eq!(t.max_cnf_var(), 10);
        assert_eq!(t.full_cnf().len(), 3 * aig.num_ands() + 1);
        assert!(t.trans().vars().iter().all(|&v| v <= t.max_cnf_var()));
    }

    #[test]
    fn missing_alarm_test() {
        let aig = Aig::from_ascii("aag 1 1 0 0 0\n2\n".as_bytes()).unwrap();
        assert!(matches!(
            Translation::new(&aig),
            Err(AigError::MissingAlarm)
        ));
    }

    #[test]
    fn and_gate_truth_table_test() {
        // for every complement combination of 6 = a & b, the three clauses agree with the gate
        for rhs0 in [2u64, 3] {
            for rhs1 in [4u64, 5] {
                let text = format!("aag 3 2 0 1 1\n2\n4\n6\n6 {} {}\n", rhs0, rhs1);
                let aig = Aig::from_ascii(text.as_bytes()).unwrap();
                let t = Translation::new(&aig).unwrap();
                for bits in 0..8u32 {
                    let values: HashMap<u32, bool> =
                        (0..3).map(|k| (k + 2, bits & (1 << k) != 0)).collect();
                    let a = aig_lit_to_cnf_lit(rhs0).eval(values[&aig_lit_to_cnf_lit(rhs0).var()]);
                    let b = aig_lit_to_cnf_lit(rhs1).eval(values[&aig_lit_to_cnf_lit(rhs1).var()]);
                    let o = values[&4];
                    assert_eq!(t.trans().eval(&values), o == (a && b));
                }
            }
        }
    }

    #[test]
    fn transition_relation_is_functional_test() {
        // for each state and input, exactly one assignment of the gates satisfies T
        let aig = fixtures::parse(fixtures::TOGGLE_PARTIAL);
        let t = Translation::new(&aig).unwrap();
        let gate_vars: Vec<u32> = aig
            .ands()
            .iter()
            .map(|g| aig_lit_to_cnf_lit(g.lhs).var())
            .collect();
        let leaf_vars: Vec<u32> = t
            .inputs()
            .iter()
            .chain(t.pres_state_vars())
            .map(|l| l.var())
            .collect();

        for leaves in 0..(1u32 << leaf_vars.len()) {
            let mut models = 0;
            for gates in 0..(1u32 << gate_vars.len()) {
                let mut values = HashMap::new();
                for (k, &v) in leaf_vars.iter().enumerate() {
                    values.insert(v, leaves & (1 << k) != 0);
                }
                for (k, &v) in gate_vars.iter().enumerate() {
                    values.insert(v, gates & (1 << k) != 0);
                }
                if t.trans().eval(&values) {
                    models += 1;
                }
            }
            assert_eq!(models, 1);
        }
    }

    proptest! {
        #[test]
        fn aig_lit_mapping_test(k in 0u64..1_000_000) {
            prop_assert_eq!(aig_lit_to_cnf_lit(2 * k), Lit::positive((k + 1) as u32));
            prop_assert_eq!(aig_lit_to_cnf_lit(2 * k + 1), !Lit::positive((k + 1) as u32));
        }
    }
}
