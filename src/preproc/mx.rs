//! # Mutually Exclusive Soft-Clause Discovery
//!
//! Finds groups of soft-clause indicator literals (b-literals) of which at
//! most one can be true, by querying a propagation engine seeded with the
//! `b <-> ~(clause)` encoding, and rewrites the formula to account for each
//! group. Both polarities exist: among core b-literals at most one soft can
//! be falsified, among non-core b-literals at most one soft can be
//! satisfied.

use cpu_time::ProcessTime;
use tracing::{debug, info, warn};

use super::{MxMode, SimpConfig};
use crate::{
    clause,
    instances::{PackedVecs, ScMx, Wcnf, Weight},
    solvers::{ProbeEngine, PropEngine},
    types::{Clause, Lit, RsHashSet, Var},
};

/// Indicator literals of the soft clauses
///
/// Multi-literal softs get a fresh b-variable; a unit soft reuses the
/// negation of its literal as its own b-literal. A b-literal is core if
/// making it true falsifies the associated soft.
pub(crate) struct Bvars {
    /// b-literal of each soft clause
    blits: Vec<Lit>,
    /// soft clause index owning each b-variable
    cls_of_var: Vec<Option<usize>>,
    wts: Vec<Weight>,
    next_var: u32,
}

impl Bvars {
    fn new(wcnf: &Wcnf) -> Self {
        let mut next_var = u32::try_from(wcnf.n_vars()).expect("variable count exceeds u32");
        let mut blits = Vec::with_capacity(wcnf.n_softs());
        for i in 0..wcnf.n_softs() {
            if let [l] = wcnf.soft(i) {
                blits.push(!*l);
            } else {
                blits.push(Lit::positive(next_var));
                next_var += 1;
            }
        }
        let mut cls_of_var = vec![None; next_var as usize];
        for (i, b) in blits.iter().enumerate() {
            cls_of_var[b.vidx()] = Some(i);
        }
        Bvars {
            blits,
            cls_of_var,
            wts: wcnf.soft_wts().to_vec(),
            next_var,
        }
    }

    fn n_vars(&self) -> usize {
        self.next_var as usize
    }

    fn lit_of_cls(&self, i: usize) -> Lit {
        self.blits[i]
    }

    /// The soft clause the variable of `l` indicates, if any
    fn cls_index(&self, l: Lit) -> Option<usize> {
        self.cls_of_var.get(l.vidx()).copied().flatten()
    }

    fn is_core(&self, l: Lit) -> bool {
        self.cls_index(l).is_some_and(|ci| self.blits[ci] == l)
    }

    fn is_non_core(&self, l: Lit) -> bool {
        self.cls_index(l).is_some_and(|ci| self.blits[ci] == !l)
    }

    fn wt(&self, l: Lit) -> Option<Weight> {
        self.cls_index(l).map(|ci| self.wts[ci])
    }

    fn new_b_var(&mut self) -> Var {
        let v = Var::new(self.next_var);
        self.next_var += 1;
        v
    }
}

const IN_MX: u8 = 1;
const IN_2S: u8 = 2;

/// Helper arena for the mutex search; the engine, the cached candidate
/// sets, and the marks are dropped as a unit when the phase ends
struct MxFinder<'a> {
    wcnf: &'a Wcnf,
    bvars: &'a Bvars,
    engine: ProbeEngine,
    /// Per b-literal: absorbed into a mutex, or deferred to the pair stage
    blit_marks: Vec<u8>,
    /// Cached mutex-candidate sets, indexed by `Lit::lidx`
    blit_mxes: Vec<Option<Vec<Lit>>>,
    total_mx_mem: u64,
    /// Cap in bytes on the cached candidate sets; once exceeded, new
    /// queries return empty sets
    mem_limit: u64,
    n_imp_calls: usize,
}

impl<'a> MxFinder<'a> {
    fn new(wcnf: &'a Wcnf, bvars: &'a Bvars, cfg: &SimpConfig) -> Self {
        MxFinder {
            wcnf,
            bvars,
            engine: ProbeEngine::new(),
            blit_marks: vec![0; 2 * bvars.n_vars()],
            blit_mxes: vec![None; 2 * bvars.n_vars()],
            total_mx_mem: 0,
            mem_limit: 1024 * 1024 * cfg.mx_mem_limit,
            n_imp_calls: 0,
        }
    }

    /// Seeds the engine with the hards and the FB-EQ encoding
    /// `b <-> ~(l1 | ... | lk)` for every multi-literal soft. Returns false
    /// if the clauses are contradictory.
    fn fbeq(&mut self) -> bool {
        for i in 0..self.wcnf.n_hards() {
            self.engine.add_clause(self.wcnf.hard(i));
            if self.engine.is_unsat() {
                return false;
            }
        }
        for i in 0..self.wcnf.n_softs() {
            let blit = self.bvars.lit_of_cls(i);
            if self.wcnf.soft(i).len() > 1 {
                let mut cls = Clause::from(self.wcnf.soft(i));
                cls.add(blit);
                self.engine.add_clause(&cls);
                if self.engine.is_unsat() {
                    return false;
                }
                for k in 0..self.wcnf.soft(i).len() {
                    let l = self.wcnf.soft(i)[k];
                    self.engine.add_binary(!l, !blit);
                    if self.engine.is_unsat() {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Computes or prunes the cached candidate set of `l`: negations of the
    /// implications of `l` that have the same weight, the opposite core
    /// status, and are not yet absorbed into a mutex
    fn mx_lits(&mut self, l: Lit) -> &[Lit] {
        if self.blit_mxes[l.lidx()].is_none() {
            let mut imps = vec![];
            if self.total_mx_mem < self.mem_limit {
                let lwt = self.bvars.wt(l);
                self.n_imp_calls += 1;
                imps = self.engine.find_implications(l);
                let want_core = self.bvars.is_non_core(l);
                let bvars = self.bvars;
                let marks = &self.blit_marks;
                imps.retain(|&m| {
                    marks[m.lidx()] != IN_MX
                        && (if want_core {
                            bvars.is_core(m)
                        } else {
                            bvars.is_non_core(m)
                        })
                        && bvars.wt(m) == lwt
                });
                // an implication m of l makes l and ~m mutually exclusive
                for m in &mut imps {
                    *m = !*m;
                }
                self.total_mx_mem += (std::mem::size_of::<Lit>() * imps.len()) as u64;
            }
            self.blit_mxes[l.lidx()] = Some(imps);
            return self.blit_mxes[l.lidx()].as_deref().expect("just cached");
        }
        // cached sets go stale as literals get absorbed into emitted
        // mutexes; prune on read, never refetch
        let marks = &self.blit_marks;
        let v = self.blit_mxes[l.lidx()].as_mut().expect("checked above");
        v.retain(|x| marks[x.lidx()] != IN_MX);
        v
    }

    fn mx_lit_size(&mut self, l: Lit) -> usize {
        self.mx_lits(l).len()
    }

    /// Grows an at-most-one group starting from `start`. Candidates are
    /// pre-sorted once by the size of their own intersection with the
    /// candidate set; each selected literal prunes the candidates down to
    /// its own mutex set.
    fn grow_mx(&mut self, start: Lit) -> Vec<Lit> {
        let orig_candidates = self.mx_lits(start).to_vec();
        let mut candidates: RsHashSet<Lit> = orig_candidates.iter().copied().collect();

        let mut with_counts: Vec<(Lit, usize)> = Vec::with_capacity(orig_candidates.len());
        for &l in &orig_candidates {
            let count = self
                .mx_lits(l)
                .iter()
                .filter(|x| candidates.contains(x))
                .count();
            with_counts.push((l, count));
        }
        with_counts.sort_by(|a, b| b.1.cmp(&a.1));

        let mut mx = vec![start];
        for (l, _) in with_counts {
            if candidates.is_empty() {
                break;
            }
            if !candidates.remove(&l) {
                continue;
            }
            mx.push(l);
            // drop every candidate that is not mutex with the newly selected one
            let l_mx: RsHashSet<Lit> = self.mx_lits(l).iter().copied().collect();
            candidates.retain(|x| l_mx.contains(x));
        }
        mx
    }

    /// Top-level search. Core b-literals (or non-core ones, depending on
    /// `mode`) are processed as a stack; groups of size two are deferred so
    /// they do not block membership in a bigger group found later. Returns
    /// `None` if the formula was found contradictory.
    fn find_mxs(&mut self, cfg: &SimpConfig, mode: MxMode) -> Option<Vec<Vec<Lit>>> {
        let start_time = ProcessTime::now();
        let mut mxs: Vec<Vec<Lit>> = vec![];

        if !self.fbeq() {
            info!("detected input to be unsat during mutex preprocessing");
            return None;
        }

        let mut to_process: Vec<Lit> = (0..self.wcnf.n_softs())
            .map(|i| {
                if mode == MxMode::Cores {
                    self.bvars.lit_of_cls(i)
                } else {
                    !self.bvars.lit_of_cls(i)
                }
            })
            .collect();
        // b-literals that might end up in groups of two; processed last
        let mut twos: Vec<Lit> = vec![];

        let mut timed_out = false;
        let mut loops: u64 = 0;
        while let Some(&blit) = to_process.last() {
            loops += 1;
            let mem_out = self.total_mx_mem >= self.mem_limit;
            let cpu_out = cfg.mx_cpu_limit > 0.0
                && loops % 500 == 0
                && start_time.elapsed().as_secs_f64() > cfg.mx_cpu_limit;
            if mem_out || cpu_out {
                timed_out = true;
                if mem_out {
                    info!("mutex finder hit its memory limit; more mutexes might exist");
                } else {
                    info!("mutex finder hit its time limit; more mutexes might exist");
                }
                break;
            }

            if self.blit_marks[blit.lidx()] != 0 {
                // in a mutex or deferred
                to_process.pop();
                continue;
            }
            let mx = self.mx_lits(blit).to_vec();
            if mx.len() <= 1 {
                if mx.len() == 1 {
                    self.blit_marks[blit.lidx()] = IN_2S;
                    twos.push(blit);
                }
                to_process.pop();
                continue;
            }

            // grow from the candidate with the biggest candidate set of its own
            let mut start = blit;
            let mut size = mx.len();
            for &l in &mx {
                let sz = self.mx_lit_size(l);
                if sz > size {
                    size = sz;
                    start = l;
                }
            }
            let tmp = self.grow_mx(start);

            // the group may be small and may not contain blit
            if tmp.len() <= 2 {
                self.blit_marks[blit.lidx()] = IN_2S;
                if tmp.len() == 2 {
                    twos.push(start);
                }
            } else {
                for &b in &tmp {
                    self.blit_marks[b.lidx()] = IN_MX;
                    self.blit_marks[(!b).lidx()] = IN_MX;
                }
                mxs.push(tmp);
            }
        }

        if !timed_out {
            while let Some(blit) = twos.pop() {
                if self.blit_marks[blit.lidx()] == IN_MX {
                    continue;
                }
                let tmp = self.grow_mx(blit);
                if tmp.len() > 1 {
                    if tmp.len() > 2 {
                        warn!("large mutex got into the pair stage");
                    }
                    for &b in &tmp {
                        self.blit_marks[b.lidx()] = IN_MX;
                        self.blit_marks[(!b).lidx()] = IN_MX;
                    }
                    mxs.push(tmp);
                }
            }
        }

        debug!(
            n_mxes = mxs.len(),
            imp_calls = self.n_imp_calls,
            cached_bytes = self.total_mx_mem,
            cpu = start_time.elapsed().as_secs_f64(),
            "mutex search finished"
        );
        Some(mxs)
    }
}

impl Wcnf {
    /// Finds at-most-one groups among the b-literals and rewrites the
    /// formula to account for them
    pub(crate) fn mx_bvars(&mut self, cfg: &SimpConfig, mode: MxMode) {
        if self.unsat {
            return;
        }
        let mut bvars = Bvars::new(self);
        let mxs = {
            let mut finder = MxFinder::new(self, &bvars, cfg);
            finder.find_mxs(cfg, mode)
        };
        match mxs {
            None => self.unsat = true,
            Some(mxs) => self.process_mxs(mxs, &mut bvars),
        }
    }

    /// Rewrites the formula for a disjoint collection of mutexes. Each set
    /// holds b-literals of identical weight and polarity class of which at
    /// most one can be true given the hard clauses.
    fn process_mxs(&mut self, mxs: Vec<Vec<Lit>>, bvars: &mut Bvars) {
        if self.unsat {
            return;
        }
        let orig_nsofts = self.n_softs();
        let mut del_marks = vec![false; self.n_softs()];

        for mx in mxs {
            if mx.is_empty() {
                warn!("mutex finder returned an empty mutex");
                continue;
            }
            let unit_wt = bvars.wt(mx[0]).unwrap_or(0.0);
            let core = bvars.is_core(mx[0]);
            let mut blits: Vec<Lit> = vec![];

            if core {
                // at most one of the softs can be falsified; give each soft
                // a b-literal and record that those are mutex. Keeping the
                // individual b-literals yields stronger assumptions for the
                // solver than a single defining literal would.
                for &l in &mx {
                    let Some(ci) = bvars.cls_index(l) else {
                        warn!(lit = %l, "mutex literal without a soft clause");
                        continue;
                    };
                    let sftcls = self.soft_cls.get_vec(ci);
                    if sftcls.is_empty() {
                        warn!("encountered zero length soft clause in mutex");
                        continue;
                    }
                    if let [unit] = sftcls[..] {
                        blits.push(!unit);
                    } else {
                        let blit = bvars.new_b_var().pos_lit();
                        blits.push(blit);
                        let mut cls = Clause::from(&sftcls[..]);
                        cls.add(blit);
                        del_marks[ci] = true;
                        self._add_hard(cls);
                        self._add_soft(clause![!blit], unit_wt);
                    }
                }
                self.mutexes.push(ScMx::new(blits, true, None));
            } else {
                // at most one of the softs can be satisfied: all but one
                // weight is forced, and the group folds into a single fresh
                // soft (~d) with one hard making d imply the union
                for &l in &mx {
                    let Some(ci) = bvars.cls_index(l) else {
                        warn!(lit = %l, "mutex literal without a soft clause");
                        continue;
                    };
                    let sftcls = self.soft_cls.get_vec(ci);
                    if sftcls.is_empty() {
                        warn!("encountered zero length soft clause in mutex");
                        continue;
                    }
                    blits.extend(sftcls);
                    del_marks[ci] = true;
                }
                let dlit = bvars.new_b_var().pos_lit();
                let union = blits.clone();
                blits.push(dlit);
                self._add_hard(Clause::from_iter(blits));
                self.base_cost += unit_wt * (mx.len() - 1) as Weight;
                self._add_soft(clause![!dlit], unit_wt);
                self.mutexes.push(ScMx::new(union, false, Some(dlit)));
            }
        }

        // rewrite the softs, skipping the replaced ones; the marks do not
        // extend to softs added above
        let mut tmp = PackedVecs::new();
        let mut wts = vec![];
        for i in 0..self.n_softs() {
            if i >= del_marks.len() || !del_marks[i] {
                tmp.add_vec(self.soft_cls.get_vec(i));
                wts.push(self.soft_clswts[i]);
            }
        }
        self.soft_cls = tmp;
        self.soft_clswts = wts;
        self.total_cls_wt = self.soft_clswts.iter().sum();
        self.compute_wt_info();

        info!(
            orig_nsofts,
            nsofts = self.n_softs(),
            n_mxes = self.mutexes.len(),
            "mutex transformation done"
        );
    }
}
