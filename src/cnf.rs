//! Conjunctive normal form formulas, the common currency between the translator,
//! the simulators and the decision procedures.
//!
//! A [`Cnf`] is an ordered list of [`Clause`]s, each an ordered list of [`Lit`]s.
//! Variable `1` is reserved for the constant: [`Lit::FALSE`] is `1` and [`Lit::TRUE`] is `-1`.
//! Asserting the unit clause `-1` (see [`Cnf::add_true_constant`]) pins the constant,
//! so encodings can mention [`Lit::TRUE`] and [`Lit::FALSE`] like any other literal.
//!
//! DIMACS reading and writing lives in the `dimacs` submodule, see [`Cnf::from_dimacs`]
//! and [`Cnf::to_dimacs`].

use std::{
    collections::{BTreeSet, HashMap, HashSet},
    fmt,
    ops::Not,
};

use thiserror::Error;

mod dimacs;

/// Error returned when a CNF operation failed.
#[derive(Debug, Error)]
pub enum CnfError {
    /// No `p cnf <max_var> <num_clauses>` header before the first clause.
    #[error("missing dimacs header")]
    MissingHeader,

    /// The header is malformed or appears twice.
    #[error("malformed dimacs header: {0}")]
    MalformedHeader(String),

    /// A token which is not a literal.
    #[error("invalid dimacs token: {0}")]
    InvalidToken(String),

    /// A literal is larger than the declared maximum variable.
    #[error("literal {lit} exceeds declared max variable {max_var}")]
    LiteralOutOfRange { lit: i64, max_var: u32 },

    /// The last clause is not terminated by `0`.
    #[error("truncated clause list: last clause is not terminated by 0")]
    Truncated,

    /// The header announced a different number of clauses.
    #[error("header declares {declared} clauses but {found} were read")]
    ClauseCountMismatch { declared: usize, found: usize },

    /// [`Cnf::rename_vars`] needs an entry for every variable.
    #[error("no renaming given for variable {0}")]
    MissingRename(u32),

    /// Reading or writing a file failed.
    #[error("io error: {0}")]
    IoError(String),
}

/// A SAT literal.
///
/// The magnitude is the variable (starting at 1), the sign is the polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Lit(i32);

impl Lit {
    /// The constant false, ie the positive literal of the reserved variable.
    pub const FALSE: Lit = Lit(1);
    /// The constant true.
    pub const TRUE: Lit = Lit(-1);

    /// The positive literal of `var`.
    pub fn positive(var: u32) -> Self {
        debug_assert!(var <= i32::MAX as u32, "variable {} does not fit a literal", var);
        Lit::from(var as i32)
    }

    /// The variable of this literal.
    pub fn var(self) -> u32 {
        self.0.unsigned_abs()
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Whether this is [`Lit::TRUE`] or [`Lit::FALSE`].
    pub fn is_constant(self) -> bool {
        self.var() == 1
    }

    /// The raw DIMACS integer.
    pub fn to_i32(self) -> i32 {
        self.0
    }

    /// Value of this literal under an assignment of its variable.
    pub fn eval(self, var_value: bool) -> bool {
        if self.is_positive() {
            var_value
        } else {
            !var_value
        }
    }
}

impl Not for Lit {
    type Output = Self;

    fn not(self) -> Self::Output {
        Lit(-self.0)
    }
}

impl From<i32> for Lit {
    fn from(value: i32) -> Self {
        if value == 0 {
            panic!("Tried to create a Lit from 0. 0 is not a valid literal in DIMACS format.");
        }
        Lit(value)
    }
}

impl fmt::Display for Lit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A SAT clause.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Clause(Vec<Lit>);

impl Clause {
    /// A new empty clause.
    pub fn new() -> Self {
        Clause(Vec::new())
    }

    pub fn lits(&self) -> &[Lit] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, lit: Lit) {
        self.0.push(lit);
    }

    pub fn contains(&self, lit: Lit) -> bool {
        self.0.contains(&lit)
    }

    /// Every literal of `self` also appears in `other`.
    pub fn is_subset_of(&self, other: &Clause) -> bool {
        self.0.iter().all(|lit| other.0.contains(lit))
    }

    /// Gets rid of the constants.
    ///
    /// If there is a [`Lit::TRUE`] the clause is obviously satisfied and `None` is returned.
    /// [`Lit::FALSE`] literals are omitted, which may leave an empty (unsatisfiable) clause.
    pub fn fold_constants(self) -> Option<Clause> {
        let mut literals = Vec::with_capacity(self.0.len());
        for lit in self.0 {
            if lit == Lit::TRUE {
                return None;
            }
            if lit != Lit::FALSE {
                literals.push(lit);
            }
        }
        Some(Clause(literals))
    }

    fn sort_and_dedup(&mut self) {
        self.0.sort();
        self.0.dedup();
    }
}

impl From<Vec<Lit>> for Clause {
    fn from(value: Vec<Lit>) -> Self {
        Clause(value)
    }
}

impl From<&[Lit]> for Clause {
    fn from(value: &[Lit]) -> Self {
        Clause(value.to_vec())
    }
}

impl FromIterator<Lit> for Clause {
    fn from_iter<I: IntoIterator<Item = Lit>>(iter: I) -> Self {
        Clause(iter.into_iter().collect())
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for lit in &self.0 {
            write!(f, "{} ", lit)?;
        }
        write!(f, "0")
    }
}

/// Allocates fresh SAT variables.
///
/// Variable 1 is the constant, so the first fresh variable is 2 unless told otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarPool {
    next: u32,
}

impl VarPool {
    pub fn new() -> Self {
        VarPool { next: 2 }
    }

    /// A pool whose first fresh variable is `var`.
    pub fn starting_at(var: u32) -> Self {
        assert!(var >= 2, "variable 1 is reserved for the constant");
        VarPool { next: var }
    }

    /// A fresh positive literal.
    pub fn fresh(&mut self) -> Lit {
        let lit = Lit::positive(self.next);
        self.next += 1;
        lit
    }

    /// The variable [`fresh`] will return next.
    ///
    /// [`fresh`]: VarPool::fresh
    pub fn next_var(&self) -> u32 {
        self.next
    }

    pub fn reset_to(&mut self, var: u32) {
        assert!(var >= 2, "variable 1 is reserved for the constant");
        self.next = var;
    }
}

impl Default for VarPool {
    fn default() -> Self {
        Self::new()
    }
}

/// A SAT CNF that can be passed to a decision procedure.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Cnf(Vec<Clause>);

impl Cnf {
    /// A new empty CNF, ie true.
    pub fn new() -> Self {
        Cnf(Vec::new())
    }

    /// The canonical unsatisfiable CNF: one empty clause.
    pub fn unsat() -> Self {
        Cnf(vec![Clause::new()])
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.0
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Add the given clause to the CNF.
    pub fn add_clause(&mut self, clause: Clause) {
        self.0.push(clause);
    }

    /// Add the given clause to the CNF, else does nothing.
    pub fn add_clause_if(&mut self, clause: Option<Clause>) {
        if let Some(c) = clause {
            self.add_clause(c);
        }
    }

    pub fn add_lits(&mut self, lits: &[Lit]) {
        self.0.push(Clause::from(lits));
    }

    pub fn add1(&mut self, a: Lit) {
        self.0.push(Clause(vec![a]));
    }

    pub fn add2(&mut self, a: Lit, b: Lit) {
        self.0.push(Clause(vec![a, b]));
    }

    pub fn add3(&mut self, a: Lit, b: Lit, c: Lit) {
        self.0.push(Clause(vec![a, b, c]));
    }

    pub fn add4(&mut self, a: Lit, b: Lit, c: Lit, d: Lit) {
        self.0.push(Clause(vec![a, b, c, d]));
    }

    /// The unit clause `-1` making [`Lit::TRUE`] true.
    pub fn add_true_constant(&mut self) {
        self.add1(Lit::TRUE);
    }

    /// Adds every literal of `cube` as a unit clause.
    pub fn add_cube(&mut self, cube: &[Lit]) {
        for &lit in cube {
            self.add1(lit);
        }
    }

    /// Adds `!(l1 & l2 & ...)` as the clause `(!l1 | !l2 | ...)`.
    pub fn add_neg_cube_as_clause(&mut self, cube: &[Lit]) {
        self.0.push(cube.iter().map(|&lit| !lit).collect());
    }

    /// Adds `!(l1 | l2 | ...)` as the unit clauses `!l1`, `!l2`, ...
    pub fn add_neg_clause_as_cube(&mut self, clause: &[Lit]) {
        for &lit in clause {
            self.add1(!lit);
        }
    }

    /// Adds `clause` after removing every clause it subsumes.
    ///
    /// Returns true if some clause was removed.
    pub fn add_clause_and_simplify(&mut self, clause: Clause) -> bool {
        let before = self.0.len();
        self.0.retain(|c| !clause.is_subset_of(c));
        let simplified = before != self.0.len();
        self.0.push(clause);
        simplified
    }

    /// Merges `other` into `self`.
    pub fn add_cnf(&mut self, other: &Cnf) {
        self.0.extend(other.0.iter().cloned());
    }

    pub fn swap_with(&mut self, other: &mut Cnf) {
        std::mem::swap(&mut self.0, &mut other.0);
    }

    /// Removes and returns a clause of minimal length.
    pub fn remove_smallest(&mut self) -> Option<Clause> {
        let idx = self
            .0
            .iter()
            .enumerate()
            .min_by_key(|(_, c)| c.len())
            .map(|(i, _)| i)?;
        Some(self.0.remove(idx))
    }

    /// Removes and returns the most recently added clause.
    pub fn remove_some_clause(&mut self) -> Option<Clause> {
        self.0.pop()
    }

    /// Number of clauses.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn nr_of_lits(&self) -> usize {
        self.0.iter().map(Clause::len).sum()
    }

    /// Removes every clause which is a superset of another clause.
    ///
    /// Of two identical clauses, the first one is kept.
    pub fn simplify(&mut self) {
        let before = self.0.len();
        let mut kept: Vec<Clause> = Vec::with_capacity(self.0.len());
        for clause in std::mem::take(&mut self.0) {
            if kept.iter().any(|k| k.is_subset_of(&clause)) {
                continue;
            }
            kept.retain(|k| !clause.is_subset_of(k));
            kept.push(clause);
        }
        self.0 = kept;
        if before != self.0.len() {
            tracing::debug!("CNF size reduction: {} --> {}", before, self.0.len());
        }
    }

    /// Sorts the literals of every clause and removes duplicated literals and clauses.
    pub fn remove_duplicates(&mut self) {
        let mut set = BTreeSet::new();
        for mut clause in std::mem::take(&mut self.0) {
            clause.sort_and_dedup();
            set.insert(clause);
        }
        self.0 = set.into_iter().collect();
    }

    /// Syntactic check: every clause contains a literal of `cube`.
    pub fn is_sat_by(&self, cube: &[Lit]) -> bool {
        self.0
            .iter()
            .all(|clause| clause.0.iter().any(|lit| cube.contains(lit)))
    }

    /// Substitutes `value` for `var`.
    ///
    /// Satisfied clauses are removed and false literals are deleted. If a clause becomes empty,
    /// the whole CNF collapses to [`Cnf::unsat`].
    pub fn set_var_value(&mut self, var: u32, value: bool) {
        let true_lit = if value {
            Lit::positive(var)
        } else {
            !Lit::positive(var)
        };
        let mut result = Vec::with_capacity(self.0.len());
        for clause in std::mem::take(&mut self.0) {
            if clause.contains(true_lit) {
                continue;
            }
            let reduced: Clause = clause.0.into_iter().filter(|&l| l != !true_lit).collect();
            if reduced.is_empty() {
                *self = Cnf::unsat();
                return;
            }
            result.push(reduced);
        }
        self.0 = result;
    }

    /// Unit propagation and pure literal elimination until fixpoint.
    ///
    /// Variables in `keep` are never eliminated silently: a forced value of a kept variable
    /// is re-asserted as a unit clause, and pure literal elimination skips kept variables.
    /// A conflict collapses the CNF to [`Cnf::unsat`].
    pub fn do_pure_and_unit(&mut self, keep: &[u32]) {
        let keep: HashSet<u32> = keep.iter().copied().collect();
        let mut units: HashMap<u32, Lit> = HashMap::new();

        loop {
            let mut changed = false;

            // unit propagation
            let mut result = Vec::with_capacity(self.0.len());
            for clause in std::mem::take(&mut self.0) {
                let mut satisfied = false;
                let mut reduced = Vec::with_capacity(clause.len());
                for lit in clause.0 {
                    match units.get(&lit.var()) {
                        Some(&u) if u == lit => {
                            satisfied = true;
                            break;
                        }
                        Some(_) => changed = true,
                        None => reduced.push(lit),
                    }
                }
                if satisfied {
                    changed = true;
                    continue;
                }
                match reduced.len() {
                    0 => {
                        *self = Cnf::unsat();
                        return;
                    }
                    1 => {
                        let lit = reduced[0];
                        if units.get(&lit.var()).is_some_and(|&u| u != lit) {
                            *self = Cnf::unsat();
                            return;
                        }
                        units.insert(lit.var(), lit);
                        changed = true;
                    }
                    _ => result.push(Clause(reduced)),
                }
            }
            self.0 = result;

            // pure literals
            let mut polarity: HashMap<u32, (bool, bool)> = HashMap::new();
            for lit in self.0.iter().flat_map(|c| c.0.iter()) {
                let entry = polarity.entry(lit.var()).or_insert((false, false));
                if lit.is_positive() {
                    entry.0 = true;
                } else {
                    entry.1 = true;
                }
            }
            let pure: HashSet<Lit> = polarity
                .into_iter()
                .filter(|(var, (pos, neg))| pos != neg && !keep.contains(var))
                .map(|(var, (pos, _))| {
                    if pos {
                        Lit::positive(var)
                    } else {
                        !Lit::positive(var)
                    }
                })
                .collect();
            if !pure.is_empty() {
                self.0.retain(|c| !c.0.iter().any(|l| pure.contains(l)));
                changed = true;
            }

            if !changed {
                break;
            }
        }

        let mut forced: Vec<Lit> = units
            .into_values()
            .filter(|lit| keep.contains(&lit.var()))
            .collect();
        forced.sort_by_key(|lit| lit.var());
        for lit in forced {
            self.add1(lit);
        }
    }

    /// Renames every variable `v` into `map[v]`, preserving polarities.
    ///
    /// The CNF is left untouched if some variable has no entry.
    pub fn rename_vars(&mut self, map: &[u32]) -> Result<(), CnfError> {
        let target = |var: u32| map.get(var as usize).copied().filter(|&v| v != 0);
        if let Some(var) = self.vars().into_iter().find(|&v| target(v).is_none()) {
            return Err(CnfError::MissingRename(var));
        }
        for clause in self.0.iter_mut() {
            for lit in clause.0.iter_mut() {
                let Some(renamed) = target(lit.var()) else {
                    continue;
                };
                *lit = if lit.is_positive() {
                    Lit::positive(renamed)
                } else {
                    !Lit::positive(renamed)
                };
            }
        }
        Ok(())
    }

    /// Whether `var` occurs in some clause.
    pub fn contains_var(&self, var: u32) -> bool {
        self.0.iter().any(|c| c.0.iter().any(|l| l.var() == var))
    }

    /// Whether an equal clause (same literals in the same order) is part of the CNF.
    pub fn contains(&self, clause: &Clause) -> bool {
        self.0.contains(clause)
    }

    /// Sorted list of the variables occurring in the CNF.
    pub fn vars(&self) -> Vec<u32> {
        self.0
            .iter()
            .flat_map(|c| c.0.iter().map(|l| l.var()))
            .collect::<BTreeSet<u32>>()
            .into_iter()
            .collect()
    }

    /// The largest variable, 0 for a CNF without literals.
    pub fn max_var(&self) -> u32 {
        self.0
            .iter()
            .flat_map(|c| c.0.iter().map(|l| l.var()))
            .max()
            .unwrap_or(0)
    }

    /// Evaluates the CNF under a total assignment `var -> value`.
    ///
    /// Variables missing from `assignment` are false.
    pub fn eval(&self, assignment: &HashMap<u32, bool>) -> bool {
        self.0.iter().all(|clause| {
            clause
                .0
                .iter()
                .any(|l| l.eval(*assignment.get(&l.var()).unwrap_or(&false)))
        })
    }
}

impl From<Vec<Clause>> for Cnf {
    fn from(value: Vec<Clause>) -> Self {
        Cnf(value)
    }
}

impl fmt::Display for Cnf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for clause in &self.0 {
            writeln!(f, "{}", clause)?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn clause(lits: &[i32]) -> Clause {
    lits.iter().map(|&l| Lit::from(l)).collect()
}

#[cfg(test)]
pub(crate) fn cnf(clauses: &[&[i32]]) -> Cnf {
    Cnf(clauses.iter().map(|c| clause(c)).collect())
}
