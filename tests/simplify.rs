use maxprep::{
    clause, lit,
    instances::{Wcnf, Weight},
    preproc::{MxMode, SimpConfig},
    types::{Assignment, Clause, TernaryVal},
};

/// Scores an original instance under a lifted model; `None` if a hard is
/// violated
fn score(hards: &[Clause], softs: &[(Clause, Weight)], model: &Assignment) -> Option<Weight> {
    for cls in hards {
        if cls.evaluate(model) != TernaryVal::True {
            return None;
        }
    }
    Some(
        softs
            .iter()
            .filter(|(cls, _)| cls.evaluate(model) != TernaryVal::True)
            .map(|(_, w)| w)
            .sum(),
    )
}

#[test]
fn equivalent_binaries_collapse_to_nothing() {
    // (x0 | x1), (~x0 | x1) with a soft (x0): the pure sweep satisfies
    // everything, nothing remains to solve
    let hards = vec![clause![lit![0], lit![1]], clause![!lit![0], lit![1]]];
    let softs = vec![(clause![lit![0]], 3.0)];
    let mut wcnf = Wcnf::new();
    for h in &hards {
        wcnf.add_hard(h.clone());
    }
    for (s, w) in &softs {
        wcnf.add_soft(s.clone(), *w);
    }
    wcnf.simplify(&SimpConfig::default());
    assert!(!wcnf.is_unsat());
    assert_eq!(wcnf.n_hards(), 0);
    assert_eq!(wcnf.n_softs(), 0);
    assert_eq!(wcnf.base_cost(), 0.0);
    // the lifted (empty) model satisfies the original at zero cost
    let ext = wcnf.rewrite_model_to_input(&Assignment::default());
    assert_eq!(score(&hards, &softs, &ext), Some(0.0));
}

#[test]
fn equality_then_merge_is_cost_equivalent() {
    // x0 <=> x1 via hard binaries; softs on both sides of the class
    let hards = vec![clause![lit![0], !lit![1]], clause![!lit![0], lit![1]]];
    let softs = vec![
        (clause![lit![0]], 2.0),
        (clause![lit![1]], 3.0),
        (clause![!lit![1]], 1.0),
    ];
    let mut wcnf = Wcnf::new();
    for h in &hards {
        wcnf.add_hard(h.clone());
    }
    for (s, w) in &softs {
        wcnf.add_soft(s.clone(), *w);
    }
    let cfg = SimpConfig {
        harden: false,
        ..SimpConfig::default()
    };
    wcnf.simplify(&cfg);
    assert!(!wcnf.is_unsat());
    // the class collapsed to one variable; the contradictory pair resolved:
    // base 1, one surviving soft of weight 4, flipped on remap
    assert_eq!(wcnf.base_cost(), 1.0);
    assert_eq!(wcnf.n_softs(), 1);
    assert_eq!(wcnf.soft_wt(0), 4.0);
    assert!(wcnf.soft(0)[0].is_neg());

    // not paying the residue: internal var false, soft satisfied
    let cheap = Assignment::from(vec![TernaryVal::False]);
    let ext = wcnf.rewrite_model_to_input(&cheap);
    assert_eq!(score(&hards, &softs, &ext), Some(1.0)); // = base + 0

    // paying the residue
    let costly = Assignment::from(vec![TernaryVal::True]);
    let ext = wcnf.rewrite_model_to_input(&costly);
    assert_eq!(score(&hards, &softs, &ext), Some(5.0)); // = base + 4
}

#[test]
fn contradictory_unit_softs_pay_min_weight() {
    let softs = vec![(clause![lit![0]], 4.0), (clause![!lit![0]], 1.0)];
    let mut wcnf = Wcnf::new();
    for (s, w) in &softs {
        wcnf.add_soft(s.clone(), *w);
    }
    let cfg = SimpConfig {
        harden: false,
        ..SimpConfig::default()
    };
    wcnf.simplify(&cfg);
    assert_eq!(wcnf.base_cost(), 1.0);
    assert_eq!(wcnf.n_softs(), 1);
    assert_eq!(wcnf.soft_wt(0), 3.0);
    // the survivor is the heavier literal (x0), stored flipped after remap
    assert!(wcnf.soft(0)[0].is_neg());
    assert_eq!(wcnf.total_wt(), 4.0);

    // internal x0 = false lifts to external x0 = true (satisfy the heavy soft)
    let m = Assignment::from(vec![TernaryVal::False]);
    let ext = wcnf.rewrite_model_to_input(&m);
    assert_eq!(ext.var_value(maxprep::var![0]), TernaryVal::True);
    assert_eq!(score(&[], &softs, &ext), Some(1.0));

    // internal x0 = true pays the residue on top of the base cost
    let m = Assignment::from(vec![TernaryVal::True]);
    let ext = wcnf.rewrite_model_to_input(&m);
    assert_eq!(score(&[], &softs, &ext), Some(4.0));
}

#[test]
fn hardening_moves_top_tier_only() {
    // weights [1, 1, 3, 10] give transition weights [3, 10]; hards plus the
    // weight-10 soft are satisfiable but adding the weight-3 soft is not
    let mut wcnf = Wcnf::new();
    wcnf.add_hard(clause![lit![0], lit![1]]);
    wcnf.add_soft(clause![lit![2]], 1.0);
    wcnf.add_soft(clause![lit![3]], 1.0);
    wcnf.add_soft(clause![lit![4]], 10.0);
    wcnf.add_soft(clause![!lit![4]], 3.0);
    let cfg = SimpConfig {
        eqs: false,
        units: false,
        mx_mode: MxMode::None,
        ..SimpConfig::default()
    };
    wcnf.simplify(&cfg);
    assert!(!wcnf.is_unsat());
    // the weight-10 soft got hardened; the deduplicator then charges the
    // weight-3 soft contradicting it into the base cost
    assert_eq!(wcnf.n_hards(), 2);
    assert!(!wcnf.soft_wts().contains(&10.0));
    assert_eq!(wcnf.soft_wts(), &[1.0, 1.0]);
    assert_eq!(wcnf.base_cost(), 3.0);
    assert_eq!(wcnf.total_cls_wt(), 2.0);
}

#[test]
fn core_mutex_end_to_end() {
    // falsifying either multi-literal soft forces the other satisfied
    let hards = vec![clause![lit![0], lit![1]]];
    let softs = vec![
        (clause![lit![0], lit![2]], 4.0),
        (clause![lit![1], lit![2]], 4.0),
    ];
    let mut wcnf = Wcnf::new();
    for h in &hards {
        wcnf.add_hard(h.clone());
    }
    for (s, w) in &softs {
        wcnf.add_soft(s.clone(), *w);
    }
    let cfg = SimpConfig {
        eqs: false,
        units: false,
        harden: false,
        mx_mode: MxMode::Cores,
        ..SimpConfig::default()
    };
    wcnf.simplify(&cfg);

    assert_eq!(wcnf.mutexes().len(), 1);
    let mx = wcnf.mutexes()[0].clone();
    assert!(mx.is_core());
    assert_eq!(mx.soft_clause_lits().len(), 2);
    // both softs replaced by fresh (~b) units of the same weight
    assert_eq!(wcnf.n_softs(), 2);
    assert_eq!(wcnf.n_hards(), 3);
    assert_eq!(wcnf.total_cls_wt(), 8.0);

    // a model falsifying the second soft: x0 true, x1 and x2 false, first
    // b-var free (false), second b-var forced true by its augmented hard
    let m = Assignment::from(vec![
        TernaryVal::True,
        TernaryVal::False,
        TernaryVal::False,
        TernaryVal::False,
        TernaryVal::True,
    ]);
    let transformed_cost: f64 = (0..wcnf.n_softs())
        .filter(|&i| Clause::from(wcnf.soft(i)).evaluate(&m) != TernaryVal::True)
        .map(|i| wcnf.soft_wt(i))
        .sum();
    assert_eq!(transformed_cost, 4.0);
    let ext = wcnf.rewrite_model_to_input(&m);
    assert_eq!(
        score(&hards, &softs, &ext),
        Some(wcnf.base_cost() + transformed_cost)
    );
}

#[test]
fn non_core_mutex_end_to_end() {
    // at most one of the softs (x0), (x1) can hold
    let hards = vec![clause![!lit![0], !lit![1]]];
    let softs = vec![(clause![lit![0]], 5.0), (clause![lit![1]], 5.0)];
    let mut wcnf = Wcnf::new();
    for h in &hards {
        wcnf.add_hard(h.clone());
    }
    for (s, w) in &softs {
        wcnf.add_soft(s.clone(), *w);
    }
    let cfg = SimpConfig {
        eqs: false,
        units: false,
        harden: false,
        mx_mode: MxMode::NonCores,
        ..SimpConfig::default()
    };
    wcnf.simplify(&cfg);

    assert_eq!(wcnf.base_cost(), 5.0);
    assert_eq!(wcnf.mutexes().len(), 1);
    let mx = wcnf.mutexes()[0].clone();
    assert!(!mx.is_core());
    let dlit = mx.encoding_lit().expect("encoding literal");
    assert_eq!(wcnf.n_softs(), 1);
    assert_eq!(wcnf.soft(0), &[!dlit]);

    // satisfy soft (x0): d stays false, the folded soft is satisfied
    let m = Assignment::from(vec![
        TernaryVal::True,
        TernaryVal::False,
        TernaryVal::False,
    ]);
    let transformed_cost: f64 = (0..wcnf.n_softs())
        .filter(|&i| Clause::from(wcnf.soft(i)).evaluate(&m) != TernaryVal::True)
        .map(|i| wcnf.soft_wt(i))
        .sum();
    assert_eq!(transformed_cost, 0.0);
    let ext = wcnf.rewrite_model_to_input(&m);
    assert_eq!(score(&hards, &softs, &ext), Some(5.0));

    // satisfy neither original soft: d true, pay the folded soft too
    let m = Assignment::from(vec![
        TernaryVal::False,
        TernaryVal::False,
        TernaryVal::True,
    ]);
    let ext = wcnf.rewrite_model_to_input(&m);
    assert_eq!(score(&hards, &softs, &ext), Some(10.0));
}

#[test]
fn simplify_is_noop_when_unsat() {
    let mut wcnf = Wcnf::new();
    wcnf.add_hard(clause![lit![0]]);
    wcnf.add_hard(clause![!lit![0]]);
    wcnf.simplify(&SimpConfig::default());
    assert!(wcnf.is_unsat());
    // mutators no-op from here on
    wcnf.add_hard(clause![lit![1], lit![2]]);
    wcnf.add_soft(clause![lit![1]], 2.0);
    assert_eq!(wcnf.n_softs(), 0);
}

#[test]
fn file_pipeline_with_model_check() {
    let data = "c test instance\n\
                p wcnf 4 5 100\n\
                100 1 2 0\n\
                100 -1 2 0\n\
                3 3 0\n\
                4 -3 0\n\
                2 4 0\n";
    let path = std::env::temp_dir().join("maxprep_pipeline_test.wcnf");
    std::fs::write(&path, data).unwrap();

    let mut wcnf = Wcnf::from_dimacs_path(&path).unwrap();
    let cfg = SimpConfig {
        harden: false,
        ..SimpConfig::default()
    };
    wcnf.simplify(&cfg);
    assert!(!wcnf.is_unsat());
    // the contradictory pair on x3 leaves base 3 and a residue soft of 1
    assert_eq!(wcnf.base_cost(), 3.0);
    assert_eq!(wcnf.n_softs(), 1);
    assert_eq!(wcnf.soft_wt(0), 1.0);

    // satisfy the residue soft
    let m = Assignment::from(vec![if wcnf.soft(0)[0].is_neg() {
        TernaryVal::False
    } else {
        TernaryVal::True
    }]);
    let (cost, n_false) = wcnf.check_model(&m).unwrap();
    assert_eq!(cost, 3.0);
    assert_eq!(n_false, 1);

    std::fs::remove_file(&path).ok();
}

#[test]
fn write_simplified_instance() {
    let mut wcnf = Wcnf::new();
    wcnf.add_hard(clause![lit![0], lit![1]]);
    wcnf.add_soft(clause![lit![0]], 4.0);
    wcnf.add_soft(clause![!lit![0]], 4.0);
    wcnf.simplify(&SimpConfig::default());
    let mut out = Vec::new();
    wcnf.write_dimacs(&mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    // base cost 4 shows up as a contradictory soft pair
    assert!(text.contains("4 1 0"));
    assert!(text.contains("4 -1 0"));
}
