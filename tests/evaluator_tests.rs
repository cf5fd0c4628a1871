//! Observational-probability tests exercised through the public
//! `causal_engine::evaluator` API, covering structures the in-module unit
//! tests don't already pin down: multi-parent marginalization, three-hop
//! head decomposition, and a joint table over a model with a latent.

use std::collections::BTreeMap;

use causal_engine::evaluator::{joint_distribution_table, Evaluator};
use causal_engine::model::{CptRow, Model, RawVariable};
use causal_engine::query::{Assertion, AssertionSet};

fn var(outcomes: &[&str], parents: &[&str], rows: Option<Vec<CptRow>>) -> RawVariable {
    RawVariable {
        outcomes: outcomes.iter().map(|s| s.to_string()).collect(),
        parents: parents.iter().map(|s| s.to_string()).collect(),
        table: rows,
    }
}

/// Two independent priors feeding a single child: Y1, Y2 -> C.
fn two_parent_model() -> Model {
    let mut raw = BTreeMap::new();
    raw.insert(
        "Y1".to_string(),
        var(&["y1", "~y1"], &[], Some(vec![CptRow::new("y1", vec![], 0.5), CptRow::new("~y1", vec![], 0.5)])),
    );
    raw.insert(
        "Y2".to_string(),
        var(&["y2", "~y2"], &[], Some(vec![CptRow::new("y2", vec![], 0.4), CptRow::new("~y2", vec![], 0.6)])),
    );
    raw.insert(
        "C".to_string(),
        var(
            &["c", "~c"],
            &["Y1", "Y2"],
            Some(vec![
                CptRow::new("c", vec!["y1".into(), "y2".into()], 0.9),
                CptRow::new("~c", vec!["y1".into(), "y2".into()], 0.1),
                CptRow::new("c", vec!["y1".into(), "~y2".into()], 0.6),
                CptRow::new("~c", vec!["y1".into(), "~y2".into()], 0.4),
                CptRow::new("c", vec!["~y1".into(), "y2".into()], 0.5),
                CptRow::new("~c", vec!["~y1".into(), "y2".into()], 0.5),
                CptRow::new("c", vec!["~y1".into(), "~y2".into()], 0.2),
                CptRow::new("~c", vec!["~y1".into(), "~y2".into()], 0.8),
            ]),
        ),
    );
    Model::build(None, raw, 1e-5).unwrap()
}

#[test]
fn marginalizes_over_two_missing_parents() {
    let model = two_parent_model();
    let eval = Evaluator::new(&model, 1e-6);
    let head = AssertionSet::new(vec![Assertion::observed("C", "c")]);
    let p = eval.probability(&head, &AssertionSet::empty()).unwrap();
    // 0.9*0.2 + 0.6*0.3 + 0.5*0.2 + 0.2*0.3 = 0.18+0.18+0.10+0.06
    assert!((p - 0.52).abs() < 1e-9, "got {p}");
}

/// Three-hop chain A -> B -> C, forcing a two-level head decomposition for
/// the full joint P(A, B, C).
fn three_chain_model() -> Model {
    let mut raw = BTreeMap::new();
    raw.insert(
        "A".to_string(),
        var(&["a", "~a"], &[], Some(vec![CptRow::new("a", vec![], 0.6), CptRow::new("~a", vec![], 0.4)])),
    );
    raw.insert(
        "B".to_string(),
        var(
            &["b", "~b"],
            &["A"],
            Some(vec![
                CptRow::new("b", vec!["a".into()], 0.8),
                CptRow::new("~b", vec!["a".into()], 0.2),
                CptRow::new("b", vec!["~a".into()], 0.3),
                CptRow::new("~b", vec!["~a".into()], 0.7),
            ]),
        ),
    );
    raw.insert(
        "C".to_string(),
        var(
            &["c", "~c"],
            &["B"],
            Some(vec![
                CptRow::new("c", vec!["b".into()], 0.9),
                CptRow::new("~c", vec!["b".into()], 0.1),
                CptRow::new("c", vec!["~b".into()], 0.25),
                CptRow::new("~c", vec!["~b".into()], 0.75),
            ]),
        ),
    );
    Model::build(None, raw, 1e-5).unwrap()
}

#[test]
fn three_variable_joint_decomposes_across_the_full_chain() {
    let model = three_chain_model();
    let eval = Evaluator::new(&model, 1e-6);
    let head = AssertionSet::new(vec![
        Assertion::observed("A", "a"),
        Assertion::observed("B", "b"),
        Assertion::observed("C", "c"),
    ]);
    let p = eval.probability(&head, &AssertionSet::empty()).unwrap();
    assert!((p - 0.6 * 0.8 * 0.9).abs() < 1e-9, "got {p}");
}

#[test]
fn conditioning_on_the_middle_variable_isolates_the_downstream_link() {
    let model = three_chain_model();
    let eval = Evaluator::new(&model, 1e-6);
    let head = AssertionSet::new(vec![Assertion::observed("C", "c")]);
    let body = AssertionSet::new(vec![Assertion::observed("B", "b")]);
    let p = eval.probability(&head, &body).unwrap();
    assert!((p - 0.9).abs() < 1e-9);
}

#[test]
fn joint_distribution_table_excludes_latents_and_sums_to_one() {
    let mut raw = BTreeMap::new();
    raw.insert("U".to_string(), var(&["u0", "u1"], &[], None));
    raw.insert(
        "X".to_string(),
        var(
            &["x0", "x1"],
            &["U"],
            Some(vec![
                CptRow::new("x0", vec!["u0".into()], 0.7),
                CptRow::new("x1", vec!["u0".into()], 0.3),
                CptRow::new("x0", vec!["u1".into()], 0.4),
                CptRow::new("x1", vec!["u1".into()], 0.6),
            ]),
        ),
    );
    let model = Model::build(None, raw, 1e-5).unwrap();
    let table = joint_distribution_table(&model, 1e-6).unwrap();
    // Only X's two outcomes appear; U (latent) contributes no column.
    assert_eq!(table.len(), 2);
    for (assignment, _) in &table {
        assert!(!assignment.contains_key("U"));
    }
    let total: f64 = table.iter().map(|(_, p)| p).sum();
    assert!((total - 1.0).abs() < 1e-9);
}

#[test]
fn evaluator_rejects_interventions_in_either_side() {
    let model = three_chain_model();
    let eval = Evaluator::new(&model, 1e-6);
    let head = AssertionSet::new(vec![Assertion::intervened("A", "a")]);
    assert!(eval.probability(&head, &AssertionSet::empty()).is_err());
}
