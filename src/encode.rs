//! Tseitin-style building blocks shared by the symbolic simulators and the analyses.
//!
//! An [`Encoder`] owns the [`VarPool`] of an analysis and buffers the clauses produced
//! while encoding. The analysis periodically moves them into its decision procedure with
//! [`Encoder::take_clauses`].

use std::collections::HashMap;

use crate::cnf::{Clause, Cnf, Lit, VarPool};

/// Fresh variables, pending clauses and an optional structural hashing cache for AND gates.
#[derive(Debug, Clone, Default)]
pub struct Encoder {
    vars: VarPool,
    clauses: Cnf,
    and_cache: Option<HashMap<(Lit, Lit), Lit>>,
}

impl Encoder {
    pub fn new() -> Self {
        Encoder {
            vars: VarPool::new(),
            clauses: Cnf::new(),
            and_cache: None,
        }
    }

    /// An encoder reusing the literal of structurally identical AND gates.
    ///
    /// Two simulators sharing such an encoder get identical literals for gates whose
    /// fanins are identical, which keeps the golden and faulty copies small.
    pub fn with_and_cache() -> Self {
        Encoder {
            and_cache: Some(HashMap::new()),
            ..Encoder::new()
        }
    }

    pub fn vars(&mut self) -> &mut VarPool {
        &mut self.vars
    }

    pub fn fresh(&mut self) -> Lit {
        self.vars.fresh()
    }

    pub fn next_var(&self) -> u32 {
        self.vars.next_var()
    }

    /// Forgets the cache and pending clauses, the next fresh variable is `var`.
    pub fn reset_to(&mut self, var: u32) {
        self.vars.reset_to(var);
        self.clauses.clear();
        if let Some(cache) = self.and_cache.as_mut() {
            cache.clear();
        }
    }

    pub fn clear_cache(&mut self) {
        if let Some(cache) = self.and_cache.as_mut() {
            cache.clear();
        }
    }

    /// Clauses produced since the last call.
    pub fn take_clauses(&mut self) -> Cnf {
        std::mem::take(&mut self.clauses)
    }

    pub fn add_clause(&mut self, clause: Clause) {
        self.clauses.add_clause(clause);
    }

    pub fn add_lits(&mut self, lits: &[Lit]) {
        self.clauses.add_lits(lits);
    }

    /// `a & b` with constant folding.
    pub fn and(&mut self, a: Lit, b: Lit) -> Lit {
        if a == Lit::FALSE || b == Lit::FALSE {
            return Lit::FALSE;
        }
        if a == Lit::TRUE {
            return b;
        }
        if b == Lit::TRUE || a == b {
            return a;
        }
        if a == !b {
            return Lit::FALSE;
        }

        let key = if a < b { (a, b) } else { (b, a) };
        if let Some(&res) = self.and_cache.as_ref().and_then(|c| c.get(&key)) {
            return res;
        }

        let res = self.vars.fresh();
        self.clauses.add2(a, !res);
        self.clauses.add2(b, !res);
        self.clauses.add3(!a, !b, res);

        if let Some(cache) = self.and_cache.as_mut() {
            cache.insert(key, res);
        }
        res
    }

    /// `a | b`.
    pub fn or(&mut self, a: Lit, b: Lit) -> Lit {
        !self.and(!a, !b)
    }

    /// `a ^ b` with constant folding.
    pub fn xor(&mut self, a: Lit, b: Lit) -> Lit {
        match (a, b) {
            (Lit::FALSE, x) | (x, Lit::FALSE) => x,
            (Lit::TRUE, x) | (x, Lit::TRUE) => !x,
            _ if a == b => Lit::FALSE,
            _ if a == !b => Lit::TRUE,
            _ => {
                let z = self.vars.fresh();
                self.add_xor(a, b, z);
                z
            }
        }
    }

    /// Clauses encoding `z = a ^ b`.
    pub fn add_xor(&mut self, a: Lit, b: Lit, z: Lit) {
        self.clauses.add3(a, b, !z);
        self.clauses.add3(a, !b, z);
        self.clauses.add3(!a, b, z);
        self.clauses.add3(!a, !b, !z);
    }

    /// The value of a latch that is flipped when `f` holds: `old ^ f`.
    pub fn flip(&mut self, old: Lit, f: Lit) -> Lit {
        if old == Lit::TRUE {
            return !f;
        }
        if old == Lit::FALSE {
            return f;
        }
        let new = self.vars.fresh();
        self.clauses.add3(f, old, !new);
        self.clauses.add3(f, !old, new);
        self.clauses.add3(!f, old, new);
        self.clauses.add3(!f, !old, !new);
        new
    }

    /// The value of latch `c` that is flipped when both `c` and `f` hold: `old ^ (c & f)`.
    pub fn flip_if(&mut self, old: Lit, c: Lit, f: Lit) -> Lit {
        if old == Lit::FALSE {
            return self.and(c, f);
        }
        if old == Lit::TRUE {
            return !self.and(c, f);
        }
        let new = self.vars.fresh();
        self.clauses.add3(old, c, !new);
        self.clauses.add3(old, f, !new);
        self.clauses.add4(!old, !c, !f, !new);
        self.clauses.add3(!old, c, new);
        self.clauses.add3(!old, f, new);
        self.clauses.add4(old, !c, !f, new);
        new
    }

    /// Literals of a clause that holds iff the vectors `a` and `b` differ somewhere.
    ///
    /// Constant pairs are decided right away, a symbolic pair `(x, y)` gets a fresh
    /// literal implying `x ^ y`. An empty result means the vectors can never differ.
    pub fn differs(&mut self, a: &[Lit], b: &[Lit]) -> Vec<Lit> {
        debug_assert_eq!(a.len(), b.len());
        let mut clause = Vec::new();
        for (&x, &y) in a.iter().zip(b) {
            if x == y {
                continue;
            }
            if x == !y {
                // always differ
                return vec![Lit::TRUE];
            }
            if x == Lit::TRUE {
                clause.push(!y);
            } else if x == Lit::FALSE {
                clause.push(y);
            } else if y == Lit::TRUE {
                clause.push(!x);
            } else if y == Lit::FALSE {
                clause.push(x);
            } else {
                let diff = self.vars.fresh();
                self.clauses.add3(!diff, x, y);
                self.clauses.add3(!diff, !x, !y);
                self.clauses.add3(diff, !x, y);
                self.clauses.add3(diff, x, !y);
                clause.push(diff);
            }
        }
        clause
    }

    /// Clauses forcing `a == b`.
    pub fn equal(&mut self, a: Lit, b: Lit) {
        if a == b {
            return;
        }
        if a.is_constant() {
            self.clauses.add1(if a == Lit::TRUE { b } else { !b });
        } else if b.is_constant() {
            self.clauses.add1(if b == Lit::TRUE { a } else { !a });
        } else {
            self.clauses.add2(!a, b);
            self.clauses.add2(a, !b);
        }
    }

    /// Clauses forcing `a == b` whenever `guard` is false.
    pub fn equal_unless(&mut self, guard: Lit, a: Lit, b: Lit) {
        self.clauses.add3(guard, !a, b);
        self.clauses.add3(guard, a, !b);
    }

    pub fn at_most_one(&mut self, lits: &[Lit]) {
        // pairwise is quadratic, the counter is linear with extra variables
        if lits.len() <= 6 {
            cardinality::at_most_one_pairwise(&mut self.clauses, lits);
        } else {
            cardinality::at_most_one_sequential(&mut self.clauses, &mut self.vars, lits);
        }
    }
}

/// One-hot constraints.
pub mod cardinality {
    use crate::cnf::{Cnf, Lit, VarPool};

    /// `!li | !lj` for every pair.
    pub fn at_most_one_pairwise(cnf: &mut Cnf, lits: &[Lit]) {
        for (i, &a) in lits.iter().enumerate() {
            for &b in &lits[i + 1..] {
                cnf.add2(!a, !b);
            }
        }
    }

    /// Sinz's sequential counter: `s_i` means "one of `l_0..=l_i` holds".
    pub fn at_most_one_sequential(cnf: &mut Cnf, vars: &mut VarPool, lits: &[Lit]) {
        if lits.len() < 2 {
            return;
        }
        let s: Vec<Lit> = (0..lits.len() - 1).map(|_| vars.fresh()).collect();
        cnf.add2(!lits[0], s[0]);
        for i in 1..lits.len() - 1 {
            cnf.add2(!lits[i], s[i]);
            cnf.add2(!s[i - 1], s[i]);
            cnf.add2(!lits[i], !s[i - 1]);
        }
        cnf.add2(!lits[lits.len() - 1], !s[lits.len() - 2]);
    }

    pub fn at_least_one(cnf: &mut Cnf, lits: &[Lit]) {
        cnf.add_lits(lits);
    }

    pub fn exactly_one(cnf: &mut Cnf, lits: &[Lit]) {
        at_least_one(cnf, lits);
        at_most_one_pairwise(cnf, lits);
    }

    /// Extends an at-most-one set incrementally: `new` excludes every literal of `previous`.
    pub fn exclude_with(cnf: &mut Cnf, new: Lit, previous: &[Lit]) {
        for &p in previous {
            cnf.add2(!new, !p);
        }
    }
}
