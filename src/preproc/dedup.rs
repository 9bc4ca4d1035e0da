//! # Duplicate and Contradictory Clause Removal
//!
//! Hashes every clause and merges within hash buckets: identical clauses
//! collapse (hard subsumes soft, soft weights add up), contradictory unit
//! pairs resolve with their cost moving into the base cost. Units are hashed
//! by variable rather than literal so that `(x)` and `(~x)` land in the same
//! bucket.

use std::hash::{Hash, Hasher};

use tracing::debug;

use crate::{
    instances::{PackedVecs, Weight, Wcnf},
    types::{Lit, RsHasher},
};

/// Per-clause descriptor for the merge pass. A weight below zero marks a
/// hard clause, exactly zero a deleted one.
struct ClsData {
    index: u32,
    hash: u64,
    w: Weight,
    orig_hard: bool,
}

fn hash_cls(lits: &[Lit]) -> u64 {
    let mut hasher = RsHasher::default();
    if let [l] = lits {
        l.vidx().hash(&mut hasher);
    } else {
        for l in lits {
            l.lidx().hash(&mut hasher);
        }
    }
    hasher.finish()
}

impl Wcnf {
    /// Detects and merges duplicate and contradictory clauses across the
    /// hard/soft mixture
    pub(crate) fn rem_dup_cls(&mut self) {
        if self.no_dups || self.unsat {
            return;
        }
        self.no_dups = true;

        let mut cdata = self.init_cls_data();
        cdata.sort_unstable_by_key(|cd| cd.hash);

        for i in 0..cdata.len() {
            if cdata[i].w == 0.0 {
                continue; // deleted
            }
            for j in i + 1..cdata.len() {
                if cdata[j].hash != cdata[i].hash {
                    break;
                }
                if cdata[j].w == 0.0 {
                    continue;
                }
                // clause data always lives in the descriptor's original
                // store, even after a soft got relabelled hard
                let i_hard = cdata[i].w < 0.0;
                let j_hard = cdata[j].w < 0.0;
                let i_index = cdata[i].index as usize;
                let j_index = cdata[j].index as usize;
                let vi = self.cls_of(&cdata[i]);
                let vj = self.cls_of(&cdata[j]);

                if vi.len() == 1 && vj.len() == 1 && vi[0] == !vj[0] {
                    // contradictory units
                    if i_hard && j_hard {
                        self.unsat = true;
                        return;
                    } else if i_hard || j_hard {
                        // the soft of the pair is forced false
                        let cost = if j_hard {
                            let lj = vj[0];
                            self.soft_cls[i_index][0] = lj;
                            cdata[i].w
                        } else {
                            cdata[j].w
                        };
                        self.base_cost += cost;
                        cdata[j].w = 0.0;
                        cdata[i].w = -1.0;
                    } else {
                        // resolution of two unit softs; the heavier one
                        // survives with the weight difference as residue
                        let (cost, residue) = if cdata[i].w < cdata[j].w {
                            let lj = vj[0];
                            self.soft_cls[i_index][0] = lj;
                            (cdata[i].w, cdata[j].w - cdata[i].w)
                        } else {
                            (cdata[j].w, cdata[i].w - cdata[j].w)
                        };
                        self.base_cost += cost;
                        cdata[i].w = residue;
                        cdata[j].w = 0.0;
                        if cdata[i].w == 0.0 {
                            break; // both vanished
                        }
                    }
                } else if vi == vj {
                    // identical clauses are merged
                    if i_hard || j_hard {
                        // a hard subsumes both softs and other hards
                        cdata[i].w = -1.0;
                    } else {
                        cdata[i].w += cdata[j].w;
                    }
                    cdata[j].w = 0.0;
                }
            }
        }

        cdata.sort_unstable_by_key(|cd| (cd.index, cd.orig_hard));

        let ph = self.hard_cls.len();
        let ps = self.soft_cls.len();
        let mut tmp_h = PackedVecs::new();
        let mut tmp_s = PackedVecs::new();
        let mut tmp_wts = vec![];
        for cd in &cdata {
            let cls = if cd.orig_hard {
                self.hard_cls.get_vec(cd.index as usize)
            } else {
                self.soft_cls.get_vec(cd.index as usize)
            };
            if cd.w < 0.0 {
                tmp_h.add_vec(cls);
            } else if cd.w > 0.0 {
                tmp_s.add_vec(cls);
                tmp_wts.push(cd.w);
            }
        }
        self.hard_cls = tmp_h;
        self.soft_cls = tmp_s;
        self.soft_clswts = tmp_wts;
        self.total_cls_wt = self.soft_clswts.iter().sum();

        debug!(
            redundant_hards = ph - self.hard_cls.len(),
            merged_softs = ps - self.soft_cls.len(),
            "removed duplicate clauses"
        );
    }

    fn init_cls_data(&self) -> Vec<ClsData> {
        let mut cdata = Vec::with_capacity(self.n_hards() + self.n_softs());
        for (i, cls) in self.hard_cls.iter().enumerate() {
            cdata.push(ClsData {
                index: u32::try_from(i).expect("clause count exceeds u32"),
                hash: hash_cls(cls),
                w: -1.0,
                orig_hard: true,
            });
        }
        for (i, cls) in self.soft_cls.iter().enumerate() {
            cdata.push(ClsData {
                index: u32::try_from(i).expect("clause count exceeds u32"),
                hash: hash_cls(cls),
                w: self.soft_clswts[i],
                orig_hard: false,
            });
        }
        cdata
    }

    /// Copies out a descriptor's clause; the equal-literal comparison on
    /// these copies guards against hash collisions and relies on all stored
    /// clauses being sorted
    fn cls_of(&self, cd: &ClsData) -> Vec<Lit> {
        if cd.orig_hard {
            self.hard_cls.get_vec(cd.index as usize)
        } else {
            self.soft_cls.get_vec(cd.index as usize)
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{clause, instances::Wcnf, lit};

    #[test]
    fn contradictory_unit_softs_resolve() {
        let mut wcnf = Wcnf::new();
        wcnf.add_soft(clause![lit![0]], 4.0);
        wcnf.add_soft(clause![!lit![0]], 1.0);
        wcnf.rem_dup_cls();
        assert_eq!(wcnf.base_cost(), 1.0);
        assert_eq!(wcnf.n_softs(), 1);
        assert_eq!(wcnf.soft(0), &[lit![0]]);
        assert_eq!(wcnf.soft_wt(0), 3.0);
        assert_eq!(wcnf.total_cls_wt(), 3.0);
    }

    #[test]
    fn equal_weight_contradictory_softs_both_vanish() {
        let mut wcnf = Wcnf::new();
        wcnf.add_soft(clause![lit![0]], 2.0);
        wcnf.add_soft(clause![!lit![0]], 2.0);
        wcnf.rem_dup_cls();
        assert_eq!(wcnf.base_cost(), 2.0);
        assert_eq!(wcnf.n_softs(), 0);
        assert_eq!(wcnf.total_cls_wt(), 0.0);
    }

    #[test]
    fn contradictory_hard_units_are_unsat() {
        let mut wcnf = Wcnf::new();
        wcnf.add_hard(clause![lit![0]]);
        wcnf.add_hard(clause![!lit![0]]);
        wcnf.rem_dup_cls();
        assert!(wcnf.is_unsat());
    }

    #[test]
    fn hard_unit_forces_contradictory_soft_false() {
        let mut wcnf = Wcnf::new();
        wcnf.add_hard(clause![lit![0]]);
        wcnf.add_soft(clause![!lit![0]], 5.0);
        wcnf.rem_dup_cls();
        assert_eq!(wcnf.base_cost(), 5.0);
        assert_eq!(wcnf.n_softs(), 0);
        assert_eq!(wcnf.n_hards(), 1);
        assert_eq!(wcnf.hard(0), &[lit![0]]);
    }

    #[test]
    fn duplicate_softs_merge_weights() {
        let mut wcnf = Wcnf::new();
        wcnf.add_soft(clause![lit![0], lit![1]], 2.0);
        wcnf.add_soft(clause![lit![1], lit![0]], 3.0);
        wcnf.rem_dup_cls();
        assert_eq!(wcnf.n_softs(), 1);
        assert_eq!(wcnf.soft_wt(0), 5.0);
        assert_eq!(wcnf.total_cls_wt(), 5.0);
    }

    #[test]
    fn hard_subsumes_identical_soft() {
        let mut wcnf = Wcnf::new();
        wcnf.add_hard(clause![lit![0], lit![1]]);
        wcnf.add_soft(clause![lit![0], lit![1]], 3.0);
        wcnf.rem_dup_cls();
        assert_eq!(wcnf.n_hards(), 1);
        assert_eq!(wcnf.n_softs(), 0);
        assert_eq!(wcnf.base_cost(), 0.0);
        assert_eq!(wcnf.total_cls_wt(), 0.0);
    }

    #[test]
    fn duplicate_hards_collapse() {
        let mut wcnf = Wcnf::new();
        wcnf.add_hard(clause![lit![0], lit![1]]);
        wcnf.add_hard(clause![lit![1], lit![0]]);
        wcnf.rem_dup_cls();
        assert_eq!(wcnf.n_hards(), 1);
    }

    #[test]
    fn dedup_is_idempotent() {
        let mut wcnf = Wcnf::new();
        wcnf.add_soft(clause![lit![0]], 4.0);
        wcnf.add_soft(clause![!lit![0]], 1.0);
        wcnf.add_soft(clause![lit![1], lit![2]], 2.0);
        wcnf.rem_dup_cls();
        let base = wcnf.base_cost();
        let softs: Vec<Vec<_>> = wcnf.soft_cls.iter().map(<[_]>::to_vec).collect();
        // adding nothing in between, a second pass is a no-op
        wcnf.no_dups = false;
        wcnf.rem_dup_cls();
        let softs2: Vec<Vec<_>> = wcnf.soft_cls.iter().map(<[_]>::to_vec).collect();
        assert_eq!(base, wcnf.base_cost());
        assert_eq!(softs, softs2);
    }

    #[test]
    fn distinct_units_of_same_var_polarity_untouched() {
        let mut wcnf = Wcnf::new();
        wcnf.add_soft(clause![lit![0], lit![2]], 1.0);
        wcnf.add_soft(clause![lit![0], lit![3]], 1.0);
        wcnf.rem_dup_cls();
        assert_eq!(wcnf.n_softs(), 2);
        assert_eq!(wcnf.base_cost(), 0.0);
    }
}
