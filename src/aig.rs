//! Module defining the [`Aig`] struct: a parsed, immutable sequential circuit.
//!
//! Literals follow the AIGER convention: a literal is `2 * variable + negated`,
//! literal `0` is the constant false and literal `1` the constant true.
//!
//! The last output of every circuit handled by this crate is the *alarm*, the signal
//! raised by the protection logic once it detects a bit-flip. See [`Aig::alarm`].

pub mod error;
mod parser;

use std::collections::{HashMap, HashSet};

pub use error::{AigError, ParserError, Result};

/// An AIGER literal.
pub type AigLit = u64;

/// The constant false literal.
pub const AIG_FALSE: AigLit = 0;
/// The constant true literal.
pub const AIG_TRUE: AigLit = 1;

/// Largest variable index accepted in a header, so that every variable (shifted by the
/// reserved SAT constant) fits a signed 32-bit SAT literal.
pub const MAX_VAR: u64 = i32::MAX as u64 - 1;

/// Variable of an AIGER literal.
pub fn var(lit: AigLit) -> u64 {
    lit >> 1
}

/// Whether the literal is a complemented edge.
pub fn is_negated(lit: AigLit) -> bool {
    lit & 1 != 0
}

/// A latch with its current state literal, the literal defining its next state
/// and its reset value (`None` for an uninitialized latch).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Latch {
    pub lit: AigLit,
    pub next: AigLit,
    pub reset: Option<bool>,
}

impl Latch {
    /// Value of the latch at time step 0, uninitialized latches start at false.
    pub fn init_value(&self) -> bool {
        self.reset.unwrap_or(false)
    }
}

/// `lhs = rhs0 & rhs1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AndGate {
    pub lhs: AigLit,
    pub rhs0: AigLit,
    pub rhs1: AigLit,
}

/// A whole AIG.
///
/// AND gates are kept in topological order, so simulating them in sequence is enough
/// to evaluate every gate once its fanins are known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aig {
    maxvar: u64,
    inputs: Vec<AigLit>,
    latches: Vec<Latch>,
    outputs: Vec<AigLit>,
    ands: Vec<AndGate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Definition {
    Input,
    Latch,
    And(usize),
}

impl Aig {
    /// Builds an AIG, checking its integrity and sorting the AND gates topologically.
    pub fn new(
        maxvar: u64,
        inputs: Vec<AigLit>,
        latches: Vec<Latch>,
        outputs: Vec<AigLit>,
        ands: Vec<AndGate>,
    ) -> Result<Self> {
        if maxvar > MAX_VAR {
            return Err(AigError::VariableOutOfRange(maxvar.saturating_mul(2), MAX_VAR));
        }
        let mut aig = Aig {
            maxvar,
            inputs,
            latches,
            outputs,
            ands,
        };
        let defs = aig.check_integrity()?;
        aig.ands = aig.topological_sort(&defs)?;
        Ok(aig)
    }

    pub fn maxvar(&self) -> u64 {
        self.maxvar
    }

    pub fn inputs(&self) -> &[AigLit] {
        &self.inputs
    }

    pub fn latches(&self) -> &[Latch] {
        &self.latches
    }

    /// All outputs, the alarm included (last one).
    pub fn outputs(&self) -> &[AigLit] {
        &self.outputs
    }

    pub fn ands(&self) -> &[AndGate] {
        &self.ands
    }

    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    pub fn num_latches(&self) -> usize {
        self.latches.len()
    }

    pub fn num_outputs(&self) -> usize {
        self.outputs.len()
    }

    pub fn num_ands(&self) -> usize {
        self.ands.len()
    }

    /// The alarm output, ie the last output.
    pub fn alarm(&self) -> Option<AigLit> {
        self.outputs.last().copied()
    }

    /// Index of the latch with the given (even) literal.
    pub fn latch_index(&self, lit: AigLit) -> Option<usize> {
        self.latches.iter().position(|l| l.lit == lit)
    }

    /// Checks that every variable is defined once, by an input, a latch or an AND gate,
    /// and that every used literal refers to a defined variable.
    fn check_integrity(&self) -> Result<HashMap<u64, Definition>> {
        let mut defs = HashMap::new();

        let mut define = |lit: AigLit, def: Definition| -> Result<()> {
            if is_negated(lit) {
                return Err(AigError::NegatedDefinition(lit));
            }
            if var(lit) == 0 {
                return Err(AigError::ConstantRedefined);
            }
            if var(lit) > self.maxvar {
                return Err(AigError::VariableOutOfRange(lit, self.maxvar));
            }
            if defs.insert(var(lit), def).is_some() {
                return Err(AigError::DuplicateDefinition(lit));
            }
            Ok(())
        };

        for &i in &self.inputs {
            define(i, Definition::Input)?;
        }
        for l in &self.latches {
            define(l.lit, Definition::Latch)?;
        }
        for (idx, a) in self.ands.iter().enumerate() {
            define(a.lhs, Definition::And(idx))?;
        }

        let used = self
            .latches
            .iter()
            .map(|l| l.next)
            .chain(self.outputs.iter().copied())
            .chain(self.ands.iter().flat_map(|a| [a.rhs0, a.rhs1]));
        for lit in used {
            if var(lit) != 0 && !defs.contains_key(&var(lit)) {
                return Err(AigError::UndefinedLiteral(lit));
            }
        }

        Ok(defs)
    }

    /// Returns the AND gates in topological order, will error if a combinational cycle is found.
    ///
    /// Latches break cycles: a latch output is a leaf, just like an input.
    fn topological_sort(&self, defs: &HashMap<u64, Definition>) -> Result<Vec<AndGate>> {
        let mut sort = Vec::with_capacity(self.ands.len());
        let mut seen = HashSet::new();
        let mut done = HashSet::new();

        for root in 0..self.ands.len() {
            let mut stack: Vec<(usize, bool)> = vec![(root, false)];

            while let Some((idx, last_time)) = stack.pop() {
                // Post order
                if last_time {
                    done.insert(idx);
                    sort.push(self.ands[idx]);
                    continue;
                }

                if done.contains(&idx) {
                    continue;
                } else if seen.contains(&idx) {
                    return Err(AigError::CombinationalCycle(self.ands[idx].lhs));
                }

                seen.insert(idx);
                stack.push((idx, true));

                let gate = self.ands[idx];
                for fanin in [gate.rhs0, gate.rhs1] {
                    if let Some(&Definition::And(fanin_idx)) = defs.get(&var(fanin)) {
                        if !done.contains(&fanin_idx) {
                            stack.push((fanin_idx, false));
                        }
                    }
                }
            }
        }

        Ok(sort)
    }
}
