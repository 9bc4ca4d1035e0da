//! # Hardening by Transition Weights
//!
//! A transition weight `w` is one where falsifying every strictly cheaper
//! soft is still cheaper than falsifying a single clause of weight `w`. If
//! the hards together with all softs of weight at least `w` are satisfiable,
//! those softs never need to be falsified and can be made hard.

use tracing::debug;

use super::SimpConfig;
use crate::{
    instances::{PackedVecs, Wcnf},
    solvers::{ProbeEngine, PropEngine, SolverResult},
    types::Clause,
};

impl Wcnf {
    /// Walks the transition weights from the highest down, feeding each
    /// weight tier into a budgeted satisfiability probe; the satisfiable
    /// prefix of tiers gets moved into the hard clauses. A probe running out
    /// of budget counts as "cannot harden lower".
    pub(crate) fn simple_harden(&mut self, cfg: &SimpConfig) {
        if self.unsat {
            return;
        }
        self.compute_wt_info();

        let mut engine = ProbeEngine::new();
        for i in 0..self.n_hards() {
            engine.add_clause(self.hard(i));
        }
        if engine.is_unsat() {
            debug!("hards are unsat");
            self.unsat = true;
            return;
        }

        let mut max_harden_wt = self.wt_max + 1.0;
        let mut max_wt = self.wt_max + 1.0;

        for i in (0..self.transition_wts.len()).rev() {
            let tw = self.transition_wts[i];
            // add this tier's softs as hards to the probe
            for c in 0..self.n_softs() {
                if self.soft_clswts[c] >= tw && self.soft_clswts[c] < max_wt {
                    engine.add_clause(self.soft(c));
                    if engine.is_unsat() {
                        break;
                    }
                }
            }
            if engine.is_unsat() {
                break;
            }
            max_wt = tw;
            match engine.solve_budget(cfg.harden_prop_budget) {
                SolverResult::Sat => max_harden_wt = tw,
                SolverResult::Unsat | SolverResult::Interrupted => break,
            }
        }

        if max_harden_wt > self.wt_max {
            debug!("hardened 0 soft clauses");
            return;
        }

        let mut tmp = PackedVecs::new();
        let mut tmp_wts = vec![];
        let mut n_hardened = 0;
        for i in 0..self.n_softs() {
            if self.soft_clswts[i] >= max_harden_wt {
                n_hardened += 1;
                let cls = Clause::from(self.soft_cls.get(i));
                self._add_hard(cls);
            } else {
                tmp.add_vec(self.soft_cls.get_vec(i));
                tmp_wts.push(self.soft_clswts[i]);
            }
        }
        self.soft_cls = tmp;
        self.soft_clswts = tmp_wts;
        self.total_cls_wt = self.soft_clswts.iter().sum();

        debug!(
            n_hardened,
            threshold = max_harden_wt,
            total_cls_wt = self.total_cls_wt,
            "hardened soft clauses"
        );
    }
}

#[cfg(test)]
mod tests {
    use crate::{clause, instances::Wcnf, lit, preproc::SimpConfig};

    #[test]
    fn hardens_satisfiable_top_tier() {
        // weights [1, 1, 3, 10] give transition weights [3, 10]; the
        // weight-10 soft is satisfiable together with the hards, but adding
        // the weight-3 soft contradicts it
        let mut wcnf = Wcnf::new();
        wcnf.add_hard(clause![lit![0], lit![1]]);
        wcnf.add_soft(clause![lit![2]], 1.0);
        wcnf.add_soft(clause![lit![3]], 1.0);
        wcnf.add_soft(clause![lit![4]], 10.0);
        wcnf.add_soft(clause![!lit![4]], 3.0);
        wcnf.simple_harden(&SimpConfig::default());
        assert!(!wcnf.is_unsat());
        // the weight-10 soft moved into the hards
        assert_eq!(wcnf.n_hards(), 2);
        assert_eq!(wcnf.n_softs(), 3);
        assert!(!wcnf.soft_wts().contains(&10.0));
        assert_eq!(wcnf.total_cls_wt(), 5.0);
    }

    #[test]
    fn hardens_everything_when_all_tiers_fit() {
        // transition weights [5]; hards plus the weight-5 soft are
        // satisfiable, so weight >= 5 moves to hard
        let mut wcnf = Wcnf::new();
        wcnf.add_hard(clause![lit![0], lit![1]]);
        wcnf.add_soft(clause![lit![1]], 1.0);
        wcnf.add_soft(clause![lit![2]], 5.0);
        wcnf.simple_harden(&SimpConfig::default());
        assert_eq!(wcnf.n_hards(), 2);
        assert_eq!(wcnf.n_softs(), 1);
        assert_eq!(wcnf.total_cls_wt(), 1.0);
    }

    #[test]
    fn no_transition_weights_no_hardening() {
        let mut wcnf = Wcnf::new();
        wcnf.add_hard(clause![lit![0], lit![1]]);
        wcnf.add_soft(clause![lit![1]], 2.0);
        wcnf.add_soft(clause![lit![2]], 2.0);
        wcnf.simple_harden(&SimpConfig::default());
        assert_eq!(wcnf.n_hards(), 1);
        assert_eq!(wcnf.n_softs(), 2);
    }

    #[test]
    fn unsat_hards_detected() {
        let mut wcnf = Wcnf::new();
        wcnf.add_hard(clause![lit![0]]);
        wcnf.add_hard(clause![!lit![0]]);
        wcnf.simple_harden(&SimpConfig::default());
        assert!(wcnf.is_unsat());
    }
}
