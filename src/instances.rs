//! # WCNF Instance Representation
//!
//! Storage and bookkeeping for weighted partial MaxSAT instances: packed
//! hard and soft clause stores, the addition API used by the parser and the
//! preprocessing passes, weight statistics, mutex records, and the
//! model-lifting layer that maps solver models back to the input vocabulary.

use std::path::Path;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::types::{Assignment, Clause, Lit, TernaryVal, Var};

pub mod fio;
mod packed;
pub use packed::PackedVecs;

/// Weight of a soft clause; a non-negative IEEE double
pub type Weight = f64;

/// Classification of a WCNF instance, used for stats and output headers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MsType {
    /// Classification has not been computed yet
    #[default]
    Undef,
    /// Unweighted, no hard clauses
    Ms,
    /// Weighted, no hard clauses
    Wms,
    /// Unweighted partial
    Pms,
    /// Weighted partial
    Wpms,
}

/// A set of mutually exclusive soft-clause indicator literals
///
/// The b-literals are such that making one true relaxes (falsifies) the
/// corresponding soft clause.
///
/// If `is_core`, at most one of the b-literals can be true (at most one of
/// the soft clauses can be falsified), and if the encoding literal is set,
/// making it true implies that one of the b-literals is true.
///
/// If `!is_core`, at most one of the b-literals can be false (at most one of
/// the soft clauses can be satisfied), and if the encoding literal is set,
/// making it false implies that one of the b-literals is false.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScMx {
    blits: Vec<Lit>,
    is_core: bool,
    encoding_lit: Option<Lit>,
}

impl ScMx {
    /// Creates a new mutex record
    #[must_use]
    pub fn new(blits: Vec<Lit>, is_core: bool, encoding_lit: Option<Lit>) -> Self {
        Self {
            blits,
            is_core,
            encoding_lit,
        }
    }

    /// The mutually exclusive b-literals
    #[must_use]
    pub fn soft_clause_lits(&self) -> &[Lit] {
        &self.blits
    }

    /// Whether this is a core mutex
    #[must_use]
    pub fn is_core(&self) -> bool {
        self.is_core
    }

    /// The encoding literal, if one was introduced
    #[must_use]
    pub fn encoding_lit(&self) -> Option<Lit> {
        self.encoding_lit
    }

    pub(crate) fn map_lits<F: FnMut(Lit) -> Lit>(&mut self, mut f: F) {
        for l in &mut self.blits {
            *l = f(*l);
        }
        if let Some(el) = self.encoding_lit {
            self.encoding_lit = Some(f(el));
        }
    }
}

/// A weighted partial MaxSAT instance under preprocessing
///
/// Clauses enter through [`Wcnf::add_hard`] and [`Wcnf::add_soft`] (or the
/// DIMACS parser), get transformed by
/// [`Wcnf::simplify`](crate::preproc), and the resulting instance is read
/// back out through the accessors. A model of the transformed instance is
/// mapped to the input vocabulary with [`Wcnf::rewrite_model_to_input`].
#[derive(Debug, Default)]
pub struct Wcnf {
    pub(crate) maxorigvar: Option<Var>,
    pub(crate) maxvar: Option<Var>,
    pub(crate) dimacs_nvars: usize,
    pub(crate) dimacs_nclauses: usize,
    pub(crate) dimacs_top: Option<Weight>,
    pub(crate) parsing_time: f64,
    pub(crate) ms_type: MsType,
    /// Weight of surviving soft clauses
    pub(crate) total_cls_wt: Weight,
    /// Cost any solution must pay, accumulated by transformations
    pub(crate) base_cost: Weight,
    pub(crate) wt_min: Weight,
    pub(crate) wt_max: Weight,
    pub(crate) wt_mean: Weight,
    pub(crate) wt_var: Weight,
    pub(crate) n_diff_wts: usize,
    pub(crate) transition_wts: Vec<Weight>,
    pub(crate) file_name: String,
    pub(crate) unsat: bool,
    pub(crate) no_dups: bool,
    pub(crate) int_wts: bool,
    pub(crate) orig_all_lits_soft: bool,
    pub(crate) n_orig_units: usize,
    /// Literals forced by the hard clauses, in input numbering; consumed by
    /// the model lifter
    pub(crate) hard_units: Vec<Lit>,
    /// Equivalent-literal classes, in input numbering; consumed by the model
    /// lifter
    pub(crate) all_scc: Vec<Vec<Lit>>,
    /// Per input variable: unit soft was flipped to negative phase on remap
    pub(crate) flipped_vars: Vec<bool>,
    pub(crate) ex2in: Vec<Option<Var>>,
    pub(crate) in2ex: Vec<Option<Var>>,
    pub(crate) hard_cls: PackedVecs<Lit>,
    pub(crate) soft_cls: PackedVecs<Lit>,
    pub(crate) soft_clswts: Vec<Weight>,
    pub(crate) mutexes: Vec<ScMx>,
}

impl Wcnf {
    /// Creates a new empty instance
    #[must_use]
    pub fn new() -> Self {
        Wcnf {
            no_dups: true,
            int_wts: true,
            ..Default::default()
        }
    }

    /// Parses an instance from a DIMACS WCNF file, supporting both the
    /// pre-22 (`p wcnf` header) and the post-22 (`h`-prefixed hards) format
    ///
    /// # Errors
    ///
    /// If the file cannot be opened or parsing fails.
    pub fn from_dimacs_path<P: AsRef<Path>>(path: P) -> Result<Wcnf, fio::dimacs::Error> {
        let start = cpu_time::ProcessTime::now();
        let mut wcnf = Wcnf::new();
        wcnf.file_name = path.as_ref().to_string_lossy().to_string();
        let reader = fio::open_read(&path)?;
        fio::dimacs::parse_wcnf(reader, &mut wcnf)?;
        wcnf.compute_wt_info();
        wcnf.parsing_time = start.elapsed().as_secs_f64();
        wcnf.log_formula_stats();
        Ok(wcnf)
    }

    pub(crate) fn set_dimacs_params(&mut self, nvars: usize, nclauses: usize, top: Option<Weight>) {
        self.dimacs_nvars = nvars;
        self.dimacs_nclauses = nclauses;
        self.dimacs_top = top;
    }

    /// Adds a clause parsed from a pre-22 format file; the weight decides
    /// hard vs soft relative to the file's top weight
    pub(crate) fn add_dimacs_clause(&mut self, cls: Clause, w: Weight) {
        if w >= self.dimacs_top.unwrap_or(Weight::INFINITY) {
            self.add_hard(cls);
        } else {
            self.add_soft(cls, w);
        }
    }

    fn update_maxorigvar(&mut self, lits: &Clause) {
        for l in lits {
            if Some(l.var()) > self.maxorigvar {
                self.maxorigvar = Some(l.var());
            }
        }
        if self.maxorigvar > self.maxvar {
            self.maxvar = self.maxorigvar;
        }
    }

    /// Adds a hard clause of the input formula
    pub fn add_hard(&mut self, cls: Clause) {
        self.update_maxorigvar(&cls);
        if cls.is_unit() {
            self.n_orig_units += 1;
        }
        self._add_hard(cls);
    }

    /// Adds a hard clause not contained in the input formula, e.g., one
    /// introduced by a transformation
    pub(crate) fn _add_hard(&mut self, cls: Clause) {
        if self.unsat {
            return;
        }
        let Some(cls) = cls.normalize() else {
            return; // tautology
        };
        for l in &cls {
            if Some(l.var()) > self.maxvar {
                self.maxvar = Some(l.var());
            }
        }
        self.hard_cls.add_vec(cls);
        self.no_dups = false;
    }

    /// Adds a soft clause of the input formula. Negative weights are
    /// rejected with a diagnostic, zero-weight clauses are silently dropped,
    /// and an empty clause contributes its weight to the base cost.
    pub fn add_soft(&mut self, cls: Clause, w: Weight) {
        if w < 0.0 {
            warn!(weight = w, "soft clause cannot have negative weight");
        } else if w > 0.0 {
            self.update_maxorigvar(&cls);
            self._add_soft(cls, w);
        }
    }

    /// Adds a soft clause not contained in the input formula, e.g., one
    /// introduced by a transformation
    pub(crate) fn _add_soft(&mut self, cls: Clause, w: Weight) {
        if self.unsat {
            return;
        }
        let Some(cls) = cls.normalize() else {
            return; // tautology
        };
        if cls.is_empty() {
            self.base_cost += w;
            return;
        }
        if w.fract() > 0.0 {
            self.int_wts = false;
        }
        for l in &cls {
            if Some(l.var()) > self.maxvar {
                self.maxvar = Some(l.var());
            }
        }
        self.soft_cls.add_vec(cls);
        self.soft_clswts.push(w);
        self.total_cls_wt += w;
        self.no_dups = false;
    }

    // Read API

    /// Gets the number of hard clauses
    #[must_use]
    pub fn n_hards(&self) -> usize {
        self.hard_cls.len()
    }

    /// Gets the number of soft clauses
    #[must_use]
    pub fn n_softs(&self) -> usize {
        self.soft_cls.len()
    }

    /// Gets the number of variables, including ones added by transformations
    #[must_use]
    pub fn n_vars(&self) -> usize {
        self.maxvar.map_or(0, |v| v.idx() + 1)
    }

    /// Gets the number of variables of the input formula
    #[must_use]
    pub fn n_orig_vars(&self) -> usize {
        self.maxorigvar.map_or(0, |v| v.idx() + 1)
    }

    /// Gets the highest variable of the input formula
    #[must_use]
    pub fn max_orig_var(&self) -> Option<Var> {
        self.maxorigvar
    }

    /// Gets the `i`-th hard clause
    #[must_use]
    pub fn hard(&self, i: usize) -> &[Lit] {
        &self.hard_cls[i]
    }

    /// Gets the `i`-th soft clause
    #[must_use]
    pub fn soft(&self, i: usize) -> &[Lit] {
        &self.soft_cls[i]
    }

    /// Gets the weight of the `i`-th soft clause
    #[must_use]
    pub fn soft_wt(&self, i: usize) -> Weight {
        self.soft_clswts[i]
    }

    /// Gets the weights of all soft clauses
    #[must_use]
    pub fn soft_wts(&self) -> &[Weight] {
        &self.soft_clswts
    }

    /// Gets the minimum soft clause weight
    #[must_use]
    pub fn min_soft_wt(&self) -> Weight {
        self.wt_min
    }

    /// Gets the maximum soft clause weight
    #[must_use]
    pub fn max_soft_wt(&self) -> Weight {
        self.wt_max
    }

    /// Gets the mean soft clause weight
    #[must_use]
    pub fn mean_soft_wt(&self) -> Weight {
        self.wt_mean
    }

    /// Gets the variance of the soft clause weights
    #[must_use]
    pub fn var_soft_wt(&self) -> Weight {
        self.wt_var
    }

    /// Gets the number of distinct soft clause weights
    #[must_use]
    pub fn n_diff_wts(&self) -> usize {
        self.n_diff_wts
    }

    /// Gets the transition weights in increasing order: weights `w` such
    /// that the total weight of all strictly cheaper softs is less than `w`
    #[must_use]
    pub fn transition_wts(&self) -> &[Weight] {
        &self.transition_wts
    }

    /// Gets the discovered mutex records
    #[must_use]
    pub fn mutexes(&self) -> &[ScMx] {
        &self.mutexes
    }

    /// Gets the forced cost accumulated during preprocessing
    #[must_use]
    pub fn base_cost(&self) -> Weight {
        self.base_cost
    }

    /// Gets the total weight of surviving soft clauses
    #[must_use]
    pub fn total_cls_wt(&self) -> Weight {
        self.total_cls_wt
    }

    /// Gets the total weight, base cost included
    #[must_use]
    pub fn total_wt(&self) -> Weight {
        self.base_cost + self.total_cls_wt
    }

    /// Whether the hard clauses have been derived unsatisfiable
    #[must_use]
    pub fn is_unsat(&self) -> bool {
        self.unsat
    }

    /// Whether all soft clause weights are integral
    #[must_use]
    pub fn integer_wts(&self) -> bool {
        self.int_wts
    }

    /// Gets the instance classification
    #[must_use]
    pub fn ms_type(&self) -> MsType {
        self.ms_type
    }

    /// Gets the name of the input file, if the instance was parsed from one
    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Gets the number of variables declared in the DIMACS header
    #[must_use]
    pub fn dimacs_n_vars(&self) -> usize {
        self.dimacs_nvars
    }

    /// Gets the top weight of the DIMACS header; `None` for headerless or
    /// topless files
    #[must_use]
    pub fn dimacs_top(&self) -> Option<Weight> {
        self.dimacs_top
    }

    /// Gets the CPU time spent parsing the input file
    #[must_use]
    pub fn parse_time(&self) -> f64 {
        self.parsing_time
    }

    /// Whether every literal of the input formula is the b-literal of a unit
    /// soft clause
    #[must_use]
    pub fn all_original_lits_soft(&self) -> bool {
        self.orig_all_lits_soft
    }

    /// Translates an internal literal back to input-file numbering. Returns
    /// `None` for variables introduced by transformations before any remap
    /// ran, or unused ones.
    #[must_use]
    pub fn input_lit(&self, l: Lit) -> Option<Lit> {
        let ex = *self.in2ex.get(l.vidx())?;
        ex.map(|v| Lit::new_unchecked(v.idx32(), l.is_neg()))
    }

    /// Translates a sequence of internal literals back to input-file
    /// numbering; untranslatable literals come back as `None`
    #[must_use]
    pub fn vec_to_file_lits(&self, lits: &[Lit]) -> Vec<Option<Lit>> {
        lits.iter().map(|&l| self.input_lit(l)).collect()
    }

    pub(crate) fn map_in2ex(&self, l: Lit) -> Lit {
        let ex = self.in2ex[l.vidx()].expect("literal has no input counterpart");
        Lit::new_unchecked(ex.idx32(), l.is_neg())
    }

    /// Writes the (simplified) instance as a DIMACS WCNF file in input-file
    /// numbering; see [`fio::dimacs::write_simplified`]
    ///
    /// # Errors
    ///
    /// If writing fails.
    pub fn write_dimacs<W: std::io::Write>(&self, writer: &mut W) -> Result<(), std::io::Error> {
        fio::dimacs::write_simplified(writer, self)
    }

    pub(crate) fn test_all_lits_are_softs(&self) -> bool {
        let mut is_soft = vec![false; self.n_vars()];
        for cls in self.soft_cls.iter() {
            if let [l] = cls {
                is_soft[l.vidx()] = true;
            }
        }
        for cls in self.hard_cls.iter().chain(self.soft_cls.iter()) {
            if cls.iter().any(|l| !is_soft[l.vidx()]) {
                return false;
            }
        }
        true
    }

    /// Computes weight statistics, the distinct-weight count, the transition
    /// weights, and the instance classification
    pub(crate) fn compute_wt_info(&mut self) {
        self.transition_wts.clear();

        if self.soft_clswts.is_empty() {
            self.wt_min = 0.0;
            self.wt_max = 0.0;
            self.wt_mean = 0.0;
            self.wt_var = 0.0;
            self.n_diff_wts = 0;
            self.ms_type = match (self.hard_cls.is_empty(), self.base_cost > 0.0) {
                (false, true) => MsType::Wpms,
                (false, false) => MsType::Pms,
                (true, true) => MsType::Wms,
                (true, false) => MsType::Ms,
            };
            return;
        }

        let mut wts = self.soft_clswts.clone();
        wts.sort_unstable_by(Weight::total_cmp);
        self.wt_min = wts[0];
        self.wt_max = wts[wts.len() - 1];
        self.wt_mean = wts.iter().sum::<Weight>() / wts.len() as Weight;
        self.wt_var = if wts.len() > 1 {
            wts.iter()
                .map(|x| (x - self.wt_mean) * (x - self.wt_mean))
                .sum::<Weight>()
                / (wts.len() - 1) as Weight
        } else {
            0.0
        };

        let mut diff_wts: Vec<(Weight, usize)> = vec![];
        for &w in &wts {
            match diff_wts.last_mut() {
                Some((dw, cnt)) if *dw == w => *cnt += 1,
                _ => diff_wts.push((w, 1)),
            }
        }
        self.n_diff_wts = diff_wts.len();

        let mut wt_so_far = diff_wts[0].0 * diff_wts[0].1 as Weight;
        for &(w, cnt) in &diff_wts[1..] {
            if w > wt_so_far {
                self.transition_wts.push(w);
            }
            wt_so_far += w * cnt as Weight;
        }

        self.ms_type = if self.hard_cls.is_empty() {
            if self.n_diff_wts > 1 || self.base_cost > 0.0 {
                MsType::Wms
            } else {
                MsType::Ms
            }
        } else if self.n_diff_wts > 1 || self.base_cost > 0.0 {
            MsType::Wpms
        } else {
            MsType::Pms
        };
    }

    /// Rewrites a model of the transformed instance into a model of the
    /// input formula, undoing remapping, unit-soft flips, forced units, and
    /// equivalent-literal substitutions. Unused input variables default to
    /// true.
    #[must_use]
    pub fn rewrite_model_to_input(&self, model: &Assignment) -> Assignment {
        let n_orig = self.n_orig_vars();
        let mut ext = vec![TernaryVal::True; n_orig];
        if self.in2ex.is_empty() {
            // no remap ran; input numbering is internal numbering
            for (v, val) in ext.iter_mut().enumerate() {
                let mv = model.var_value(Var::new_unchecked(
                    u32::try_from(v).expect("variable count exceeds u32"),
                ));
                if mv != TernaryVal::DontCare {
                    *val = mv;
                }
            }
        }
        for (i, ex) in self.in2ex.iter().enumerate() {
            let Some(ex) = *ex else { continue };
            if ex.idx() < n_orig {
                let val = model.var_value(Var::new_unchecked(
                    u32::try_from(i).expect("variable count exceeds u32"),
                ));
                ext[ex.idx()] = if self.flipped_vars[ex.idx()] {
                    !val
                } else {
                    val
                };
            }
        }
        for &l in &self.hard_units {
            if l.vidx() < n_orig {
                ext[l.vidx()] = (!l.is_neg()).into();
            }
        }
        // newest components first: a later round may have substituted an
        // earlier round's representative
        for scc in self.all_scc.iter().rev() {
            let rep = scc[0];
            for &l in &scc[1..] {
                if l.vidx() < n_orig && rep.vidx() < n_orig {
                    ext[l.vidx()] = if l.is_neg() == rep.is_neg() {
                        ext[rep.vidx()]
                    } else {
                        !ext[rep.vidx()]
                    };
                }
            }
        }
        Assignment::from(ext)
    }

    /// Checks a model of the transformed instance against a fresh,
    /// unsimplified parse of the input file. Returns the cost of the lifted
    /// model and the number of falsified soft clauses.
    ///
    /// # Errors
    ///
    /// If re-parsing fails or the lifted model violates a hard clause.
    pub fn check_model(&self, model: &Assignment) -> Result<(Weight, usize), ModelError> {
        let fresh = Wcnf::from_dimacs_path(&self.file_name).map_err(Box::new)?;
        let ext = self.rewrite_model_to_input(model);
        for cls in fresh.hard_cls.iter() {
            let sat = cls
                .iter()
                .any(|&l| ext.lit_value(l) == TernaryVal::True);
            if !sat {
                warn!(clause = %Clause::from(cls), "model does not satisfy the hard clauses");
                return Err(ModelError::ViolatedHard(Clause::from(cls)));
            }
        }
        let mut cost = fresh.base_cost;
        let mut n_false_softs = 0;
        for (i, cls) in fresh.soft_cls.iter().enumerate() {
            let sat = cls
                .iter()
                .any(|&l| ext.lit_value(l) == TernaryVal::True);
            if !sat {
                cost += fresh.soft_clswts[i];
                n_false_softs += 1;
            }
        }
        Ok((cost, n_false_softs))
    }

    pub(crate) fn log_formula_stats(&self) {
        info!(
            instance = %self.file_name,
            dimacs_vars = self.dimacs_nvars,
            dimacs_clauses = self.dimacs_nclauses,
            hards = self.n_hards(),
            hard_lits = self.hard_cls.total_size(),
            orig_units = self.n_orig_units,
            softs = self.n_softs(),
            soft_lits = self.soft_cls.total_size(),
            total_cls_wt = self.total_cls_wt,
            base_cost = self.base_cost,
            parse_time = self.parsing_time,
            "parsed formula"
        );
        debug!(
            n_diff_wts = self.n_diff_wts,
            wt_mean = self.wt_mean,
            wt_min = self.wt_min,
            wt_max = self.wt_max,
            "weight info"
        );
        if self.unsat {
            info!("hard clauses are contradictory");
        }
    }

    pub(crate) fn log_simp_stats(&self) {
        info!(
            hards = self.n_hards(),
            hard_lits = self.hard_cls.total_size(),
            softs = self.n_softs(),
            soft_lits = self.soft_cls.total_size(),
            total_cls_wt = self.total_cls_wt,
            base_cost = self.base_cost,
            mutexes = self.mutexes.len(),
            vars = self.n_vars(),
            unsat = self.unsat,
            "after simplification"
        );
    }
}

/// Errors from checking a model against the input formula
#[derive(Error, Debug)]
pub enum ModelError {
    /// The lifted model does not satisfy a hard clause of the input
    #[error("model violates hard clause {0}")]
    ViolatedHard(Clause),
    /// Re-parsing the input file failed
    #[error("cannot re-parse input: {0}")]
    Reparse(#[from] Box<fio::dimacs::Error>),
}
