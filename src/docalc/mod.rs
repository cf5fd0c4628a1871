//! # Do-calculus layer
//!
//! Symbolic expression algebra ([`expr`]), the three do-calculus rewrite
//! rules plus marginalization ([`rules`]), the iterative-deepening search
//! that composes them ([`search`]), and the high-level query entry point:
//! route interventionless queries straight to the
//! [`crate::evaluator::Evaluator`], and interventional ones through the
//! backdoor shortcut or, failing that, the rule search — then evaluate the
//! resulting do-free expression.

pub mod expr;
pub mod rules;
pub mod search;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{Config, DeconfoundingPolicy};
use crate::error::{CoreError, CoreResult};
use crate::evaluator::Evaluator;
use crate::graph::{EdgeGraph, VarSet};
use crate::model::{Model, VarName};
use crate::query::{Assertion, AssertionSet, Query};

pub use expr::Expr;

/// `P(Head | Body)`, with no constraint on whether `Body` contains
/// interventions — the top-level dispatch entry point. Equivalent to
/// `infer_with_choice(query, model, config, None)`.
pub fn infer(query: &Query, model: &Model, config: &Config) -> CoreResult<f64> {
    infer_with_choice(query, model, config, None)
}

/// As [`infer`], but for the `Ask` deconfounding policy, lets the caller
/// supply the chosen set directly rather than the engine guessing — the
/// core itself never blocks on I/O to prompt for one. Ignored under
/// `Random`/`All` policies.
pub fn infer_with_choice(
    query: &Query,
    model: &Model,
    config: &Config,
    ask_choice: Option<&VarSet>,
) -> CoreResult<f64> {
    query.validate_against(model)?;

    if !query.body.has_interventions() {
        let evaluator = Evaluator::new(model, config.inference.numeric_epsilon);
        return evaluator.probability(&query.head, &query.body);
    }

    let expr = identify(query.head.clone(), query.body.clone(), model, config, ask_choice)?;
    evaluate_expr(&expr, model, config)
}

/// Produce a do-free symbolic expression for `P(head | body)`: try the
/// backdoor shortcut, then fall back to the rule search.
pub fn identify(
    head: AssertionSet,
    body: AssertionSet,
    model: &Model,
    config: &Config,
    ask_choice: Option<&VarSet>,
) -> CoreResult<Expr> {
    if let Some(expr) = backdoor_shortcut(&head, &body, model, config, ask_choice)? {
        return Ok(expr);
    }

    let outcome = search::search(
        head,
        body,
        model,
        config.inference.depth_bound,
        config.inference.step_budget,
    )?;
    Ok(outcome.expr)
}

/// The backdoor-adjustment shortcut: when the do-set is a
/// single variable and a deconfounding set exists for `(X, Y)`, short-
/// circuit to `Σ_z P(Y | X, Z=z) · P(Z=z)` rather than launching the rule
/// search. Returns `Ok(None)` when no deconfounding set exists (or the
/// do-set has more than one variable), so the caller falls through to the
/// rule search.
fn backdoor_shortcut(
    head: &AssertionSet,
    body: &AssertionSet,
    model: &Model,
    config: &Config,
    ask_choice: Option<&VarSet>,
) -> CoreResult<Option<Expr>> {
    let do_x = body.interventions();
    let x_vars = do_x.variables();
    if x_vars.len() != 1 {
        return Ok(None);
    }

    let y_vars = head.variables();
    let graph = EdgeGraph::from_model(model);
    // A deconfounding set must be observable: a latent variable has no CPT
    // to marginalize or condition on, so it can never stand in as Z here
    // even if it's graph-topologically valid. Those cases fall through to
    // the rule search, which eliminates latents via graph surgery instead.
    let sets: Vec<VarSet> = graph
        .deconfounding_sets(&x_vars, &y_vars, true)
        .into_iter()
        .filter(|z| z.iter().all(|v| !model.is_latent(v)))
        .collect();
    if sets.is_empty() {
        return Ok(None);
    }

    match config.inference.deconfounding_policy {
        DeconfoundingPolicy::All => {
            let mut values = Vec::with_capacity(sets.len());
            let mut exprs = Vec::with_capacity(sets.len());
            for z in &sets {
                let expr = build_backdoor_expr(head, body, z, model)?;
                let value = evaluate_expr(&expr, model, config)?;
                values.push(value);
                exprs.push(expr);
            }
            let lo = values.iter().cloned().fold(f64::INFINITY, f64::min);
            let hi = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let spread = hi - lo;
            if spread > config.inference.tolerance {
                return Err(CoreError::InconsistentDeconfounding { spread });
            }
            Ok(Some(Expr::Literal(values[0])))
        }
        DeconfoundingPolicy::Random => {
            let mut rng = StdRng::seed_from_u64(config.inference.seed);
            let index = rng.gen_range(0..sets.len());
            Ok(Some(build_backdoor_expr(head, body, &sets[index], model)?))
        }
        DeconfoundingPolicy::Ask => {
            let chosen = match ask_choice {
                Some(z) if sets.contains(z) => z,
                Some(_) => {
                    return Err(CoreError::QueryShape(
                        "supplied deconfounding set is not among the reported minimal sets".to_string(),
                    ))
                }
                None => &sets[0],
            };
            Ok(Some(build_backdoor_expr(head, body, chosen, model)?))
        }
    }
}

/// Builds `Σ_z P(Y | X, Z=z) · P(Z=z)` for a single chosen deconfounding
/// set `z_vars`, nesting one `Sum` per variable in the set so the innermost
/// `Prob` pair is evaluated once per joint outcome assignment.
fn build_backdoor_expr(
    head: &AssertionSet,
    body: &AssertionSet,
    z_vars: &VarSet,
    model: &Model,
) -> CoreResult<Expr> {
    let do_x = body.interventions();
    let existing_obs = body.observations();
    let x_observed: AssertionSet = do_x
        .iter()
        .map(|a| Assertion::observed(a.variable.clone(), a.outcome.clone()))
        .collect();

    let ordered_z: Vec<VarName> = z_vars.iter().cloned().collect();

    let mut conditioning = existing_obs.clone();
    for a in x_observed.iter() {
        conditioning = conditioning.plus(a.clone());
    }
    let mut z_head_assertions = Vec::new();
    for z in &ordered_z {
        let placeholder = model.outcomes(z)?[0].clone();
        conditioning = conditioning.plus(Assertion::observed(z.clone(), placeholder.clone()));
        z_head_assertions.push(Assertion::observed(z.clone(), placeholder));
    }
    let z_head = AssertionSet::new(z_head_assertions);

    let mut inner = Expr::Product(vec![
        Expr::Prob(head.clone(), conditioning),
        Expr::Prob(z_head, existing_obs.clone()),
    ]);

    for z in ordered_z.iter().rev() {
        let outcomes = model.outcomes(z)?.to_vec();
        inner = Expr::Sum {
            variable: z.clone(),
            outcomes,
            body: Box::new(inner),
        };
    }
    Ok(expr::normalize(inner))
}

/// Evaluates a (necessarily do-free) symbolic expression to a number:
/// `Prob` leaves go to the [`Evaluator`], `Product`s multiply, and `Sum`s
/// expand by substituting each outcome in turn.
pub fn evaluate_expr(expression: &Expr, model: &Model, config: &Config) -> CoreResult<f64> {
    match expression {
        Expr::Literal(n) => Ok(*n),
        Expr::Product(items) => {
            let mut total = 1.0;
            for item in items {
                total *= evaluate_expr(item, model, config)?;
            }
            Ok(total)
        }
        Expr::Sum {
            variable, outcomes, body, ..
        } => {
            let mut total = 0.0;
            for outcome in outcomes {
                let substituted = expr::substitute(body, variable, outcome);
                total += evaluate_expr(&substituted, model, config)?;
            }
            Ok(total)
        }
        Expr::Prob(head, body) => {
            if body.has_interventions() {
                return Err(CoreError::QueryShape(format!(
                    "cannot numerically evaluate '{expression}': body still contains an intervention"
                )));
            }
            let evaluator = Evaluator::new(model, config.inference.numeric_epsilon);
            evaluator.probability(head, body)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CptRow, RawVariable};
    use std::collections::BTreeMap;

    fn confounded_model() -> Model {
        // S2: Z -> X, Z -> Y, X -> Y, all binary with a simple symmetric CPT.
        let mut raw = BTreeMap::new();
        raw.insert(
            "Z".to_string(),
            RawVariable {
                outcomes: vec!["z0".into(), "z1".into()],
                parents: vec![],
                table: Some(vec![CptRow::new("z0", vec![], 0.4), CptRow::new("z1", vec![], 0.6)]),
            },
        );
        raw.insert(
            "X".to_string(),
            RawVariable {
                outcomes: vec!["x0".into(), "x1".into()],
                parents: vec!["Z".to_string()],
                table: Some(vec![
                    CptRow::new("x0", vec!["z0".into()], 0.7),
                    CptRow::new("x1", vec!["z0".into()], 0.3),
                    CptRow::new("x0", vec!["z1".into()], 0.2),
                    CptRow::new("x1", vec!["z1".into()], 0.8),
                ]),
            },
        );
        raw.insert(
            "Y".to_string(),
            RawVariable {
                outcomes: vec!["y0".into(), "y1".into()],
                parents: vec!["Z".to_string(), "X".to_string()],
                table: Some(
                    [("z0", "x0"), ("z0", "x1"), ("z1", "x0"), ("z1", "x1")]
                        .into_iter()
                        .flat_map(|(z, x)| {
                            vec![
                                CptRow::new("y0", vec![z.into(), x.into()], 0.6),
                                CptRow::new("y1", vec![z.into(), x.into()], 0.4),
                            ]
                        })
                        .collect(),
                ),
            },
        );
        Model::build(None, raw, 1e-5).unwrap()
    }

    #[test]
    fn interventionless_query_routes_to_evaluator() {
        let model = confounded_model();
        let config = Config::default();
        let query = Query::new(
            AssertionSet::new(vec![Assertion::observed("X", "x0")]),
            AssertionSet::empty(),
        )
        .unwrap();
        let p = infer(&query, &model, &config).unwrap();
        assert!((0.0..=1.0).contains(&p));
    }

    #[test]
    fn backdoor_shortcut_resolves_confounded_intervention() {
        let model = confounded_model();
        let config = Config::default();
        let query = Query::new(
            AssertionSet::new(vec![Assertion::observed("Y", "y0")]),
            AssertionSet::new(vec![Assertion::intervened("X", "x0")]),
        )
        .unwrap();
        // Since Y's CPT here doesn't actually depend on X or Z, P(Y=y0|do(X=x0))
        // collapses to the CPT's flat 0.6 regardless of which Z branch fires.
        let p = infer(&query, &model, &config).unwrap();
        assert!((p - 0.6).abs() < 1e-9);
    }

    #[test]
    fn all_policy_agrees_with_single_set() {
        let model = confounded_model();
        let mut config = Config::default();
        config.inference.deconfounding_policy = DeconfoundingPolicy::All;
        let query = Query::new(
            AssertionSet::new(vec![Assertion::observed("Y", "y0")]),
            AssertionSet::new(vec![Assertion::intervened("X", "x0")]),
        )
        .unwrap();
        let p = infer(&query, &model, &config).unwrap();
        assert!((p - 0.6).abs() < 1e-9);
    }
}
