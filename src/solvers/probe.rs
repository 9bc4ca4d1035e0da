//! # Embedded Propagation Engine
//!
//! A minimal SAT engine implementing [`PropEngine`](super::PropEngine):
//! occurrence-list unit propagation over a root-level trail, implication
//! queries by assume-propagate-undo, and a propagation-budgeted DPLL search
//! with chronological backtracking. Every capability the preprocessor needs
//! is propagation-level, so no clause learning is involved.

use crate::types::{Lit, TernaryVal, Var};

use super::{PropEngine, SolverResult};

/// Minimal unit-propagation SAT engine
#[derive(Debug, Default)]
pub struct ProbeEngine {
    clauses: Vec<Vec<Lit>>,
    /// Clause ids containing each literal, indexed by `Lit::lidx`
    occs: Vec<Vec<usize>>,
    /// Current value of each variable
    assign: Vec<TernaryVal>,
    trail: Vec<Lit>,
    qhead: usize,
    n_props: u64,
    unsat: bool,
}

impl ProbeEngine {
    /// Creates a new empty engine
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets the number of propagated literals over the engine's lifetime
    #[must_use]
    pub fn n_props(&self) -> u64 {
        self.n_props
    }

    fn ensure_var(&mut self, var: Var) {
        if var.idx() >= self.assign.len() {
            self.assign.resize(var.idx() + 1, TernaryVal::DontCare);
            self.occs.resize(2 * (var.idx() + 1), Vec::new());
        }
    }

    fn value(&self, lit: Lit) -> TernaryVal {
        if lit.vidx() >= self.assign.len() {
            return TernaryVal::DontCare;
        }
        if lit.is_neg() {
            !self.assign[lit.vidx()]
        } else {
            self.assign[lit.vidx()]
        }
    }

    fn enqueue(&mut self, lit: Lit) {
        debug_assert_eq!(self.value(lit), TernaryVal::DontCare);
        self.assign[lit.vidx()] = if lit.is_pos() {
            TernaryVal::True
        } else {
            TernaryVal::False
        };
        self.trail.push(lit);
    }

    fn backtrack_to(&mut self, trail_len: usize) {
        for lit in self.trail.drain(trail_len..) {
            self.assign[lit.vidx()] = TernaryVal::DontCare;
        }
        self.qhead = trail_len;
    }

    /// Propagates the queue to fixpoint. Returns false on conflict, leaving
    /// the trail for the caller to unwind.
    fn propagate_core(&mut self) -> bool {
        while self.qhead < self.trail.len() {
            let lit = self.trail[self.qhead];
            self.qhead += 1;
            self.n_props += 1;
            let falsified = (!lit).lidx();
            for occ_idx in 0..self.occs[falsified].len() {
                let ci = self.occs[falsified][occ_idx];
                let mut satisfied = false;
                let mut unit = None;
                let mut n_undef = 0;
                for k in 0..self.clauses[ci].len() {
                    let l = self.clauses[ci][k];
                    match self.value(l) {
                        TernaryVal::True => {
                            satisfied = true;
                            break;
                        }
                        TernaryVal::DontCare => {
                            n_undef += 1;
                            unit = Some(l);
                        }
                        TernaryVal::False => (),
                    }
                }
                if satisfied {
                    continue;
                }
                match n_undef {
                    0 => return false,
                    1 => self.enqueue(unit.expect("counted an undefined literal")),
                    _ => (),
                }
            }
        }
        true
    }

    fn next_undef_var(&self) -> Option<Var> {
        self.assign
            .iter()
            .position(|&v| v == TernaryVal::DontCare)
            .map(|idx| Var::new_unchecked(u32::try_from(idx).expect("variable count exceeds u32")))
    }
}

impl PropEngine for ProbeEngine {
    fn add_clause(&mut self, lits: &[Lit]) {
        if self.unsat {
            return;
        }
        if lits.is_empty() {
            self.unsat = true;
            return;
        }
        for &l in lits {
            self.ensure_var(l.var());
        }
        let ci = self.clauses.len();
        self.clauses.push(lits.to_vec());
        for &l in lits {
            self.occs[l.lidx()].push(ci);
        }
        // keep the root level propagated so unsatisfiability surfaces right away
        let mut unit = None;
        let mut n_undef = 0;
        for &l in lits {
            match self.value(l) {
                TernaryVal::True => return,
                TernaryVal::DontCare => {
                    n_undef += 1;
                    unit = Some(l);
                }
                TernaryVal::False => (),
            }
        }
        match n_undef {
            0 => self.unsat = true,
            1 => {
                self.enqueue(unit.expect("counted an undefined literal"));
                if !self.propagate_core() {
                    self.unsat = true;
                }
            }
            _ => (),
        }
    }

    fn is_unsat(&self) -> bool {
        self.unsat
    }

    fn propagate(&mut self) {
        if self.unsat {
            return;
        }
        if !self.propagate_core() {
            self.unsat = true;
        }
    }

    fn forced_lits(&self) -> Vec<Lit> {
        self.trail.clone()
    }

    fn fixed_value(&self, lit: Lit) -> TernaryVal {
        self.value(lit)
    }

    fn find_implications(&mut self, lit: Lit) -> Vec<Lit> {
        if self.unsat {
            return vec![];
        }
        self.ensure_var(lit.var());
        self.propagate();
        if self.unsat || self.value(lit) != TernaryVal::DontCare {
            return vec![];
        }
        let root = self.trail.len();
        self.enqueue(lit);
        let ok = self.propagate_core();
        let imps = self.trail[root + 1..].to_vec();
        self.backtrack_to(root);
        if ok {
            imps
        } else {
            vec![]
        }
    }

    fn solve_budget(&mut self, max_props: u64) -> SolverResult {
        if self.unsat {
            return SolverResult::Unsat;
        }
        self.propagate();
        if self.unsat {
            return SolverResult::Unsat;
        }
        let root = self.trail.len();
        let budget_start = self.n_props;
        // decision stack of (pre-decision trail length, decision, tried both polarities)
        let mut decisions: Vec<(usize, Lit, bool)> = vec![];
        loop {
            if self.n_props - budget_start > max_props {
                self.backtrack_to(root);
                return SolverResult::Interrupted;
            }
            if self.propagate_core() {
                let Some(var) = self.next_undef_var() else {
                    self.backtrack_to(root);
                    return SolverResult::Sat;
                };
                decisions.push((self.trail.len(), var.pos_lit(), false));
                self.enqueue(var.pos_lit());
            } else {
                // conflict; flip the deepest decision that still has a polarity left
                loop {
                    let Some((trail_len, dlit, flipped)) = decisions.pop() else {
                        self.backtrack_to(root);
                        self.unsat = true;
                        return SolverResult::Unsat;
                    };
                    self.backtrack_to(trail_len);
                    if !flipped {
                        decisions.push((trail_len, !dlit, true));
                        self.enqueue(!dlit);
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ProbeEngine, PropEngine, SolverResult};
    use crate::{lit, types::TernaryVal};

    #[test]
    fn unit_propagation() {
        let mut engine = ProbeEngine::new();
        engine.add_unit(lit![0]);
        engine.add_binary(!lit![0], lit![1]);
        engine.propagate();
        assert!(!engine.is_unsat());
        assert_eq!(engine.fixed_value(lit![0]), TernaryVal::True);
        assert_eq!(engine.fixed_value(lit![1]), TernaryVal::True);
        assert_eq!(engine.forced_lits(), vec![lit![0], lit![1]]);
    }

    #[test]
    fn conflicting_units() {
        let mut engine = ProbeEngine::new();
        engine.add_unit(lit![0]);
        engine.add_unit(!lit![0]);
        assert!(engine.is_unsat());
    }

    #[test]
    fn empty_clause_unsat() {
        let mut engine = ProbeEngine::new();
        engine.add_clause(&[]);
        assert!(engine.is_unsat());
    }

    #[test]
    fn implications() {
        let mut engine = ProbeEngine::new();
        engine.add_binary(!lit![0], lit![1]);
        engine.add_binary(!lit![1], lit![2]);
        let imps = engine.find_implications(lit![0]);
        assert_eq!(imps, vec![lit![1], lit![2]]);
        // assumption is undone
        assert_eq!(engine.fixed_value(lit![0]), TernaryVal::DontCare);
        assert_eq!(engine.fixed_value(lit![1]), TernaryVal::DontCare);
    }

    #[test]
    fn implications_of_fixed_lit_are_empty() {
        let mut engine = ProbeEngine::new();
        engine.add_unit(lit![0]);
        assert!(engine.find_implications(lit![0]).is_empty());
        assert!(engine.find_implications(!lit![0]).is_empty());
    }

    #[test]
    fn solve_sat() {
        let mut engine = ProbeEngine::new();
        engine.add_binary(lit![0], lit![1]);
        engine.add_binary(!lit![0], lit![1]);
        assert_eq!(engine.solve_budget(u64::MAX), SolverResult::Sat);
        // solving leaves the root level intact
        assert_eq!(engine.fixed_value(lit![1]), TernaryVal::DontCare);
    }

    #[test]
    fn solve_unsat() {
        let mut engine = ProbeEngine::new();
        engine.add_binary(lit![0], lit![1]);
        engine.add_binary(lit![0], !lit![1]);
        engine.add_binary(!lit![0], lit![1]);
        engine.add_binary(!lit![0], !lit![1]);
        assert_eq!(engine.solve_budget(u64::MAX), SolverResult::Unsat);
        assert!(engine.is_unsat());
    }

    #[test]
    fn solve_budget_interrupts() {
        let mut engine = ProbeEngine::new();
        // pigeonhole-ish: enough structure that zero budget cannot finish
        for v in 0..8 {
            engine.add_binary(lit![2 * v], lit![2 * v + 1]);
        }
        assert_eq!(engine.solve_budget(0), SolverResult::Interrupted);
    }
}
