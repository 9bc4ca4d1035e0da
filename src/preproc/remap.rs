//! # Variable Remapping
//!
//! Compacts the variable numbering to the variables that still appear after
//! all transformations, and flips positive unit softs so that every unit
//! soft reads `(~x)` ("assume x true, pay the cost"). The inverse maps and
//! flip bits feed the model lifter.

use tracing::debug;

use crate::{
    instances::{PackedVecs, Wcnf},
    types::{Lit, Var},
};

impl Wcnf {
    /// Renumbers the surviving variables into a dense prefix and rewrites
    /// all clauses and mutex records accordingly
    pub(crate) fn remap_vars(&mut self) {
        let nv = self.n_vars();
        let mut appears = vec![false; nv];
        for cls in self.hard_cls.iter() {
            for l in cls {
                appears[l.vidx()] = true;
            }
        }
        self.flipped_vars = vec![false; nv];
        for cls in self.soft_cls.iter() {
            for l in cls {
                appears[l.vidx()] = true;
            }
            // unit softs become (~x) so that making the b-literal x true
            // incurs the cost; requires duplicates to have been removed
            if let [l] = cls {
                if l.is_pos() {
                    self.flipped_vars[l.vidx()] = true;
                }
            }
        }
        for mx in &self.mutexes {
            for l in mx.soft_clause_lits() {
                appears[l.vidx()] = true;
            }
            if let Some(el) = mx.encoding_lit() {
                appears[el.vidx()] = true;
            }
        }

        self.ex2in = vec![None; nv];
        self.in2ex = vec![None; nv];
        let mut nxtvar: u32 = 0;
        for (v, &app) in appears.iter().enumerate() {
            if app {
                self.in2ex[nxtvar as usize] = Some(Var::new_unchecked(
                    u32::try_from(v).expect("variable count exceeds u32"),
                ));
                self.ex2in[v] = Some(Var::new_unchecked(nxtvar));
                nxtvar += 1;
            }
        }
        self.maxvar = nxtvar.checked_sub(1).map(Var::new_unchecked);

        let ex2in = &self.ex2in;
        let flipped = &self.flipped_vars;
        let map_lit = |l: Lit| -> Lit {
            let v = ex2in[l.vidx()].expect("appearing variable was numbered");
            Lit::new_unchecked(v.idx32(), l.is_neg() != flipped[l.vidx()])
        };

        let mut tmp = PackedVecs::new();
        for cls in self.hard_cls.iter() {
            tmp.add_vec(cls.iter().map(|&l| map_lit(l)));
        }
        self.hard_cls = tmp;

        let mut tmp = PackedVecs::new();
        for cls in self.soft_cls.iter() {
            tmp.add_vec(cls.iter().map(|&l| map_lit(l)));
        }
        self.soft_cls = tmp;

        let mut mutexes = std::mem::take(&mut self.mutexes);
        for mx in &mut mutexes {
            mx.map_lits(map_lit);
        }
        self.mutexes = mutexes;

        debug!(vars = self.n_vars(), "remapped variables");
    }
}

#[cfg(test)]
mod tests {
    use crate::{clause, instances::Wcnf, lit, types::Lit};

    #[test]
    fn remap_is_dense() {
        let mut wcnf = Wcnf::new();
        wcnf.add_hard(clause![lit![2], lit![7]]);
        wcnf.add_soft(clause![!lit![4]], 2.0);
        wcnf.remap_vars();
        assert_eq!(wcnf.n_vars(), 3);
        let mut used: Vec<usize> = wcnf
            .hard_cls
            .iter()
            .chain(wcnf.soft_cls.iter())
            .flatten()
            .map(Lit::vidx)
            .collect();
        used.sort_unstable();
        used.dedup();
        assert_eq!(used, vec![0, 1, 2]);
    }

    #[test]
    fn maps_are_mutual_inverses() {
        let mut wcnf = Wcnf::new();
        wcnf.add_hard(clause![lit![1], lit![5]]);
        wcnf.add_soft(clause![lit![3], lit![5]], 1.0);
        wcnf.remap_vars();
        for (iv, ex) in wcnf.in2ex.iter().enumerate() {
            if let Some(ex) = ex {
                assert_eq!(wcnf.ex2in[ex.idx()].unwrap().idx(), iv);
            }
        }
    }

    #[test]
    fn positive_unit_soft_flips() {
        let mut wcnf = Wcnf::new();
        wcnf.add_hard(clause![lit![5], lit![6]]);
        wcnf.add_soft(clause![lit![5]], 2.0);
        wcnf.remap_vars();
        assert!(wcnf.flipped_vars[5]);
        // the unit soft now reads (~x) in the new numbering
        assert_eq!(wcnf.soft(0).len(), 1);
        assert!(wcnf.soft(0)[0].is_neg());
        // the same flip applies to the occurrence in the hard clause
        assert!(wcnf.hard(0).contains(&wcnf.soft(0)[0]));
    }

    #[test]
    fn negative_unit_soft_unflipped() {
        let mut wcnf = Wcnf::new();
        wcnf.add_soft(clause![!lit![3]], 2.0);
        wcnf.remap_vars();
        assert!(!wcnf.flipped_vars[3]);
        assert!(wcnf.soft(0)[0].is_neg());
    }
}
