//! # Reduction by Hard Units and Equivalent Literals
//!
//! Feeds the hard clauses into a propagation engine, harvests forced units
//! and the binaries left over after fixing them, finds strongly connected
//! components of the binary implication graph, and rewrites every clause
//! through the resulting representative and truth tables. Newly exposed
//! units and pure literals are fed back until fixpoint.

use tracing::{debug, warn};

use super::SimpConfig;
use crate::{
    instances::{PackedVecs, Wcnf},
    solvers::{ProbeEngine, PropEngine},
    types::{Clause, Lit, TernaryVal},
};

impl Wcnf {
    /// Reduces the formula by hard units and, if enabled, by equalities
    /// implied by the hard clauses: if `x <=> y` then all occurrences of `y`
    /// are replaced by `x`. The eliminated variables are reconstructed by
    /// the model lifter from [`Wcnf::rewrite_model_to_input`].
    pub(crate) fn sub_eqs_and_units(&mut self, cfg: &SimpConfig) {
        if self.unsat {
            return;
        }

        let ph = self.hard_cls.len();
        let ph_lits = self.hard_cls.total_size();
        let ps = self.soft_cls.len();
        let ps_lits = self.soft_cls.total_size();

        // 1. find current units among the hards, then binaries among the
        // hards reduced by those units
        let mut engine = ProbeEngine::new();
        for i in 0..self.n_hards() {
            engine.add_clause(self.hard(i));
        }
        // units recorded by an earlier round no longer occur in the clauses
        // but stay constraints
        for i in 0..self.hard_units.len() {
            engine.add_unit(self.hard_units[i]);
        }
        if engine.is_unsat() {
            self.unsat = true;
            return;
        }
        engine.propagate();
        self.hard_units = engine.forced_lits();

        if cfg.eqs {
            let binaries = self.get_binaries(&engine);
            let mut edges: Vec<Vec<Lit>> = vec![];
            for pair in binaries.chunks_exact(2) {
                let (x, y) = (pair[0], pair[1]);
                let max_index = x.lidx().max((!x).lidx()).max(y.lidx()).max((!y).lidx());
                if max_index >= edges.len() {
                    edges.resize(max_index + 1, vec![]);
                }
                edges[x.lidx()].push(y);
                edges[y.lidx()].push(x);
            }
            // append rather than replace; components recorded earlier are
            // still needed by the model lifter
            self.all_scc.extend(binary_scc(&edges));
        }

        if !self.all_scc.is_empty() || !self.hard_units.is_empty() {
            self.reduce_by_eqs_and_units();
            if self.unsat {
                return;
            }
        }

        // 2. substitution can expose new units (shrunken hards) and pure
        // literals; seed them back and re-reduce until nothing new shows up
        loop {
            let mut new_lits: Vec<Lit> = vec![];
            let mut appears = vec![0u8; self.n_vars()];
            for cls in self.hard_cls.iter() {
                if let [l] = cls {
                    new_lits.push(*l);
                }
                for l in cls {
                    appears[l.vidx()] |= if l.is_neg() { 0b01 } else { 0b10 };
                }
            }
            for cls in self.soft_cls.iter() {
                for l in cls {
                    appears[l.vidx()] |= if l.is_neg() { 0b01 } else { 0b10 };
                }
            }
            let n_units = new_lits.len();
            let mut pures = 0usize;
            for (v, &a) in appears.iter().enumerate() {
                let v = u32::try_from(v).expect("variable count exceeds u32");
                if a == 0b01 {
                    pures += 1;
                    new_lits.push(Lit::negative_unchecked(v));
                } else if a == 0b10 {
                    pures += 1;
                    new_lits.push(Lit::positive_unchecked(v));
                }
            }
            if new_lits.is_empty() {
                break;
            }
            debug!(units = n_units, pures, "found additional units after reduction");

            for &l in &new_lits {
                engine.add_unit(l);
            }
            if engine.is_unsat() {
                self.unsat = true;
                return;
            }
            engine.propagate();
            self.hard_units = engine.forced_lits();
            self.reduce_by_eqs_and_units();
            if self.unsat {
                return;
            }
        }

        let nvars_removed = self.hard_units.len()
            + self
                .all_scc
                .iter()
                .map(|scc| scc.len() - 1)
                .sum::<usize>();
        debug!(
            units = self.hard_units.len(),
            sccs = self.all_scc.len(),
            vars_removed = nvars_removed,
            hards_removed = ph - self.hard_cls.len(),
            hard_lits_removed = ph_lits - self.hard_cls.total_size(),
            softs_removed = ps - self.soft_cls.len(),
            soft_lits_removed = ps_lits - self.soft_cls.total_size(),
            "reduced by units and equalities"
        );
    }

    /// Collects the literal pairs of hard clauses with exactly two unfixed
    /// literals and no satisfied one, flattened two per clause
    fn get_binaries(&self, engine: &ProbeEngine) -> Vec<Lit> {
        let mut binaries = vec![];
        for cls in self.hard_cls.iter() {
            let mut nlits = 0;
            for &l in cls {
                match engine.fixed_value(l) {
                    TernaryVal::DontCare => nlits += 1,
                    // satisfied clauses contribute no binary
                    TernaryVal::True => nlits = 3,
                    TernaryVal::False => (),
                }
                if nlits > 2 {
                    break;
                }
            }
            if nlits == 2 {
                binaries.extend(
                    cls.iter()
                        .filter(|&&l| engine.fixed_value(l) == TernaryVal::DontCare)
                        .copied(),
                );
            }
        }
        binaries
    }

    /// Rewrites every clause through the current equivalence representatives
    /// and forced truth values
    fn reduce_by_eqs_and_units(&mut self) {
        if self.unsat {
            return;
        }
        let nv = self.n_vars();
        let mut truth = vec![TernaryVal::DontCare; 2 * nv];
        let mut eq_lit: Vec<Lit> = (0..2 * nv).map(Lit::from_lidx).collect();

        for &l in &self.hard_units {
            truth[l.lidx()] = TernaryVal::True;
            truth[(!l).lidx()] = TernaryVal::False;
        }
        for scc in &self.all_scc {
            let rep = scc[0];
            for &l in scc {
                eq_lit[l.lidx()] = rep;
                eq_lit[(!l).lidx()] = !rep;
            }
        }

        let reduce = |cls: &[Lit]| -> Option<Clause> {
            let mut c = Clause::with_capacity(cls.len());
            for &l in cls {
                let eq = eq_lit[l.lidx()];
                match truth[eq.lidx()] {
                    TernaryVal::True => return None, // clause satisfied
                    TernaryVal::DontCare => c.add(eq),
                    TernaryVal::False => (),
                }
            }
            Some(c)
        };

        let hards = std::mem::take(&mut self.hard_cls);
        let mut tmp = PackedVecs::new();
        for cls in hards.iter() {
            let Some(c) = reduce(cls) else { continue };
            if c.is_empty() {
                // empty hards should have been caught at engine load
                warn!("reduction left an empty hard clause");
                self.unsat = true;
                return;
            }
            // substitution may introduce duplicates or tautologies
            if let Some(c) = c.normalize() {
                tmp.add_vec(c);
            }
        }
        self.hard_cls = tmp;

        let softs = std::mem::take(&mut self.soft_cls);
        let mut tmp = PackedVecs::new();
        let mut wts = Vec::with_capacity(self.soft_clswts.len());
        for (i, cls) in softs.iter().enumerate() {
            let Some(c) = reduce(cls) else { continue };
            if c.is_empty() {
                // soft falsified by the transformation
                self.base_cost += self.soft_clswts[i];
                continue;
            }
            if let Some(c) = c.normalize() {
                tmp.add_vec(c);
                wts.push(self.soft_clswts[i]);
            }
        }
        self.soft_cls = tmp;
        self.soft_clswts = wts;
        self.total_cls_wt = self.soft_clswts.iter().sum();
    }
}

const UNSEEN: usize = usize::MAX;

/// Finds strongly connected components of size > 1 in the binary
/// implication graph. The graph is dual: if `x` is in an SCC, `~x` is in a
/// dual SCC, and only the first of each dual pair is returned.
///
/// `edges[l.lidx()]` holds the other literals of all binaries containing
/// `l`, so the implicants of a node `n` are `edges[(!n).lidx()]`. Implied
/// units the graph might contain are deliberately not extracted here.
fn binary_scc(edges: &[Vec<Lit>]) -> Vec<Vec<Lit>> {
    let mut unfinished: Vec<usize> = vec![];
    let mut roots: Vec<usize> = vec![];
    // DFS visit order of each node; UNSEEN if not yet visited
    let mut dfsnum = vec![UNSEEN; edges.len()];
    let mut dfscount = 0;
    // component number of each node; UNSEEN while still on the stacks
    let mut comp_num = vec![UNSEEN; edges.len()];
    let mut comp_count = 0;
    // explicit DFS frames of (node, index of next child to process)
    let mut dfs_stack: Vec<(usize, usize)> = vec![];
    let mut all_sccs = vec![];

    for nd in 0..edges.len() {
        if dfsnum[nd] != UNSEEN {
            continue;
        }
        dfs_stack.push((nd, 0));

        while let Some(&(node, childi)) = dfs_stack.last() {
            let neg_node = node ^ 1;
            if childi == 0 {
                // first visit; tentatively a component of its own
                dfsnum[node] = dfscount;
                dfscount += 1;
                unfinished.push(node);
                roots.push(node);
            }

            if childi >= edges[neg_node].len() {
                // all children processed, finish the node
                dfs_stack.pop();
                if node == *roots.last().expect("finished node without root") {
                    let mut scc = vec![];
                    loop {
                        let w = unfinished.pop().expect("root not on unfinished stack");
                        comp_num[w] = comp_count;
                        if comp_num[neg_node] == UNSEEN {
                            // dual component not recorded yet
                            scc.push(Lit::from_lidx(w));
                        }
                        if w == node {
                            break;
                        }
                    }
                    comp_count += 1;
                    roots.pop();
                    if scc.len() > 1 {
                        all_sccs.push(scc);
                    }
                }
            } else {
                dfs_stack.last_mut().expect("stack vanished").1 += 1;
                let w = edges[neg_node][childi].lidx();
                if dfsnum[w] == UNSEEN {
                    dfs_stack.push((w, 0));
                } else if comp_num[w] == UNSEEN {
                    // merge tentative components
                    while dfsnum[*roots.last().expect("merge without root")] > dfsnum[w] {
                        roots.pop();
                    }
                }
            }
        }
    }
    all_sccs
}

#[cfg(test)]
mod tests {
    use super::binary_scc;
    use crate::{
        clause,
        instances::Wcnf,
        lit,
        preproc::SimpConfig,
        types::Lit,
    };

    fn edges_of(binaries: &[(Lit, Lit)]) -> Vec<Vec<Lit>> {
        let mut edges: Vec<Vec<Lit>> = vec![];
        for &(x, y) in binaries {
            let max_index = x.lidx().max((!x).lidx()).max(y.lidx()).max((!y).lidx());
            if max_index >= edges.len() {
                edges.resize(max_index + 1, vec![]);
            }
            edges[x.lidx()].push(y);
            edges[y.lidx()].push(x);
        }
        edges
    }

    #[test]
    fn scc_finds_equivalence() {
        // (x0 | ~x1) and (~x0 | x1) make x0 <=> x1
        let edges = edges_of(&[(lit![0], !lit![1]), (!lit![0], lit![1])]);
        let sccs = binary_scc(&edges);
        assert_eq!(sccs.len(), 1);
        let mut scc = sccs[0].clone();
        scc.sort_unstable();
        // exactly one of the dual pair {x0, x1} / {~x0, ~x1}
        assert!(scc == vec![lit![0], lit![1]] || scc == vec![!lit![0], !lit![1]]);
    }

    #[test]
    fn scc_dual_pruning_on_cycle() {
        // x0 -> x1 -> x2 -> x0 as binaries
        let edges = edges_of(&[
            (!lit![0], lit![1]),
            (!lit![1], lit![2]),
            (!lit![2], lit![0]),
        ]);
        let sccs = binary_scc(&edges);
        assert_eq!(sccs.len(), 1);
        assert_eq!(sccs[0].len(), 3);
        // all members of one polarity class of the cycle
        let vars: Vec<_> = sccs[0].iter().map(|l| l.vidx()).collect();
        let mut sorted = vars.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 3);
        let signs: Vec<_> = sccs[0].iter().map(Lit::is_neg).collect();
        assert!(signs.iter().all(|&s| s == signs[0]));
    }

    #[test]
    fn no_scc_without_cycle() {
        let edges = edges_of(&[(!lit![0], lit![1]), (!lit![1], lit![2])]);
        assert!(binary_scc(&edges).is_empty());
    }

    #[test]
    fn units_propagate_and_reduce() {
        let mut wcnf = Wcnf::new();
        wcnf.add_hard(clause![lit![0]]);
        wcnf.add_hard(clause![!lit![0], lit![1]]);
        wcnf.add_hard(clause![!lit![1], lit![2], lit![3]]);
        wcnf.add_soft(clause![!lit![2]], 2.0);
        wcnf.sub_eqs_and_units(&SimpConfig::default());
        assert!(!wcnf.is_unsat());
        // x0 and x1 forced, their clauses gone, the ternary shrinks
        assert!(wcnf.hard_units.contains(&lit![0]));
        assert!(wcnf.hard_units.contains(&lit![1]));
        // (x2 | x3) then falls to the pure literal sweep, emptying the hards
        assert_eq!(wcnf.n_hards(), 0);
    }

    #[test]
    fn contradictory_hards_derive_unsat() {
        let mut wcnf = Wcnf::new();
        wcnf.add_hard(clause![lit![0]]);
        wcnf.add_hard(clause![!lit![0]]);
        wcnf.sub_eqs_and_units(&SimpConfig::default());
        assert!(wcnf.is_unsat());
    }

    #[test]
    fn equality_rewrites_softs_to_representative() {
        // x0 <=> x1: all three unit softs collapse onto the representative;
        // the opposing soft keeps the variable impure so nothing collapses
        // further
        let mut wcnf = Wcnf::new();
        wcnf.add_hard(clause![lit![0], !lit![1]]);
        wcnf.add_hard(clause![!lit![0], lit![1]]);
        wcnf.add_soft(clause![lit![0]], 2.0);
        wcnf.add_soft(clause![lit![1]], 3.0);
        wcnf.add_soft(clause![!lit![1]], 1.0);
        wcnf.sub_eqs_and_units(&SimpConfig::default());
        assert!(!wcnf.is_unsat());
        assert_eq!(wcnf.n_softs(), 3);
        // all softs now mention the representative variable
        assert_eq!(wcnf.soft(0), wcnf.soft(1));
        assert_eq!(wcnf.soft(2)[0], !wcnf.soft(0)[0]);
        assert_eq!(wcnf.all_scc.len(), 1);
        assert_eq!(wcnf.total_cls_wt(), 6.0);
        // a second pass changes nothing further
        wcnf.sub_eqs_and_units(&SimpConfig::default());
        assert_eq!(wcnf.n_softs(), 3);
        assert_eq!(wcnf.all_scc.len(), 1);
    }

    #[test]
    fn reduction_is_idempotent() {
        let mut wcnf = Wcnf::new();
        wcnf.add_hard(clause![lit![0], !lit![1]]);
        wcnf.add_hard(clause![!lit![0], lit![1]]);
        wcnf.add_hard(clause![lit![2], lit![3], lit![4]]);
        wcnf.add_soft(clause![lit![1], lit![2]], 2.0);
        let cfg = SimpConfig::default();
        wcnf.sub_eqs_and_units(&cfg);
        let hards: Vec<Vec<_>> = wcnf.hard_cls.iter().map(<[Lit]>::to_vec).collect();
        let softs: Vec<Vec<_>> = wcnf.soft_cls.iter().map(<[Lit]>::to_vec).collect();
        let base = wcnf.base_cost();
        wcnf.sub_eqs_and_units(&cfg);
        let hards2: Vec<Vec<_>> = wcnf.hard_cls.iter().map(<[Lit]>::to_vec).collect();
        let softs2: Vec<Vec<_>> = wcnf.soft_cls.iter().map(<[Lit]>::to_vec).collect();
        assert_eq!(hards, hards2);
        assert_eq!(softs, softs2);
        assert_eq!(base, wcnf.base_cost());
    }
}
