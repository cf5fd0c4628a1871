//! Model-construction and validation tests exercised through the public
//! `causal_engine::model` API.

use std::collections::BTreeMap;

use causal_engine::error::CoreError;
use causal_engine::model::{CptRow, Model, RawVariable};

fn raw(outcomes: &[&str], parents: &[&str], rows: Option<Vec<CptRow>>) -> RawVariable {
    RawVariable {
        outcomes: outcomes.iter().map(|s| s.to_string()).collect(),
        parents: parents.iter().map(|s| s.to_string()).collect(),
        table: rows,
    }
}

#[test]
fn unknown_parent_is_rejected() {
    let mut specs = BTreeMap::new();
    specs.insert(
        "X".to_string(),
        raw(&["x"], &["Ghost"], Some(vec![CptRow::new("x", vec!["nope".into()], 1.0)])),
    );
    assert!(matches!(Model::build(None, specs, 1e-5), Err(CoreError::MalformedModel(_))));
}

#[test]
fn duplicate_outcome_is_rejected() {
    let mut specs = BTreeMap::new();
    specs.insert(
        "X".to_string(),
        raw(&["x", "x"], &[], Some(vec![CptRow::new("x", vec![], 1.0)])),
    );
    assert!(matches!(Model::build(None, specs, 1e-5), Err(CoreError::MalformedModel(_))));
}

#[test]
fn row_group_normalization_is_checked_against_tolerance() {
    let mut specs = BTreeMap::new();
    specs.insert(
        "X".to_string(),
        raw(&["x", "~x"], &[], Some(vec![CptRow::new("x", vec![], 0.5), CptRow::new("~x", vec![], 0.4)])),
    );
    assert!(matches!(
        Model::build(None, specs.clone(), 1e-5),
        Err(CoreError::MalformedTable { .. })
    ));
    // A tolerance wide enough to swallow the 0.1 gap is accepted.
    assert!(Model::build(None, specs, 0.2).is_ok());
}

#[test]
fn probability_of_unknown_variable_errors() {
    let mut specs = BTreeMap::new();
    specs.insert(
        "X".to_string(),
        raw(&["x"], &[], Some(vec![CptRow::new("x", vec![], 1.0)])),
    );
    let model = Model::build(None, specs, 1e-5).unwrap();
    assert!(matches!(model.probability("Ghost", "g", &[]), Err(CoreError::QueryShape(_))));
}

#[test]
fn latent_variable_has_no_cpt_and_no_own_probability() {
    let mut specs = BTreeMap::new();
    specs.insert("U".to_string(), raw(&["u0", "u1"], &[], None));
    specs.insert(
        "X".to_string(),
        raw(
            &["x0", "x1"],
            &["U"],
            Some(vec![
                CptRow::new("x0", vec!["u0".into()], 0.6),
                CptRow::new("x1", vec!["u0".into()], 0.4),
                CptRow::new("x0", vec!["u1".into()], 0.3),
                CptRow::new("x1", vec!["u1".into()], 0.7),
            ]),
        ),
    );
    let model = Model::build(None, specs, 1e-5).unwrap();
    assert!(model.is_latent("U"));
    assert!(!model.is_latent("X"));
    assert!(model.latents().contains("U"));
    assert!(matches!(model.probability("U", "u0", &[]), Err(CoreError::QueryShape(_))));
    assert_eq!(model.probability("X", "x0", &["u0".to_string()]).unwrap(), 0.6);
}

#[test]
fn roots_are_exactly_parentless_variables() {
    let mut specs = BTreeMap::new();
    specs.insert("A".to_string(), raw(&["a"], &[], Some(vec![CptRow::new("a", vec![], 1.0)])));
    specs.insert("B".to_string(), raw(&["b"], &["A"], Some(vec![CptRow::new("b", vec!["a".into()], 1.0)])));
    let model = Model::build(None, specs, 1e-5).unwrap();
    assert!(model.roots().contains("A"));
    assert!(!model.roots().contains("B"));
}
