//! # Evaluator layer
//!
//! Computes observational probabilities `P(Head | Body)` — no
//! interventions allowed in `Body` — by a cascade of recursive rewrite
//! rules: empty head, contradiction, redundancy, head decomposition,
//! single-head CPT read / parent marginalization, and a Bayes'-rule
//! fallback for evidence on descendants. Results are memoized per
//! `(Head, Body)` pair, canonicalized by [`crate::query::AssertionSet`]'s
//! sort-and-dedup.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

use crate::error::{CoreError, CoreResult};
use crate::graph::EdgeGraph;
use crate::model::{Model, Outcome, VarName};
use crate::query::{Assertion, AssertionSet};

type CacheKey = (AssertionSet, AssertionSet);

/// Evaluates interventionless queries against a fixed [`Model`].
pub struct Evaluator<'m> {
    model: &'m Model,
    graph: EdgeGraph,
    numeric_epsilon: f64,
    memoize: bool,
    cache: RefCell<HashMap<CacheKey, f64>>,
}

impl<'m> Evaluator<'m> {
    pub fn new(model: &'m Model, numeric_epsilon: f64) -> Self {
        Evaluator {
            model,
            graph: EdgeGraph::from_model(model),
            numeric_epsilon,
            memoize: true,
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// Disable memoization. Must never change the numeric result, only
    /// whether repeated sub-queries are cached.
    pub fn without_memoization(mut self) -> Self {
        self.memoize = false;
        self
    }

    /// `P(head | body)`, with `body` containing only observations.
    pub fn probability(&self, head: &AssertionSet, body: &AssertionSet) -> CoreResult<f64> {
        if head.has_interventions() || body.has_interventions() {
            return Err(CoreError::QueryShape(
                "Evaluator::probability requires an interventionless query".to_string(),
            ));
        }
        self.eval(head, body)
    }

    fn eval(&self, head: &AssertionSet, body: &AssertionSet) -> CoreResult<f64> {
        let key = (head.clone(), body.clone());
        if self.memoize {
            if let Some(&cached) = self.cache.borrow().get(&key) {
                return Ok(cached);
            }
        }

        let value = self.eval_uncached(head, body)?;
        self.check_drift(head, body, value)?;

        if self.memoize {
            self.cache.borrow_mut().insert(key, value);
        }
        Ok(value)
    }

    fn eval_uncached(&self, head: &AssertionSet, body: &AssertionSet) -> CoreResult<f64> {
        // Rule 1: empty head.
        if head.is_empty() {
            return Ok(1.0);
        }

        // Rule 2: contradiction.
        if AssertionSet::union_contradicts(head, body) {
            return Ok(0.0);
        }

        // Rule 3: redundancy.
        if body.is_superset_of(head) {
            return Ok(1.0);
        }

        // Rule 4: head decomposition.
        if head.len() > 1 {
            let order = self.model.topological_order();
            let h1 = head
                .iter()
                .max_by_key(|a| order.iter().position(|v| v == &a.variable).unwrap_or(0))
                .cloned()
                .expect("head is non-empty");
            let h_rest = head.without_variable(&h1.variable);
            let h1_set = AssertionSet::new(vec![h1]);

            let body_plus_rest = extend_with(body, &h_rest);
            let p_h1_given_rest = self.eval(&h1_set, &body_plus_rest)?;
            let p_rest = self.eval(&h_rest, body)?;
            return Ok(p_h1_given_rest * p_rest);
        }

        // Single-head case: head = {X = x}.
        let assertion = head.iter().next().expect("head has exactly one assertion");
        let x = &assertion.variable;
        let x_outcome = &assertion.outcome;

        let descendants_of_x = self.graph.descendants(&[x.clone()].into_iter().collect());
        let body_has_descendant_evidence = body.variables().iter().any(|v| descendants_of_x.contains(v));

        if !body_has_descendant_evidence {
            let parents = self.model.parents(x)?.to_vec();
            let missing: Vec<VarName> = parents
                .iter()
                .filter(|p| body.outcome_of(p).is_none())
                .cloned()
                .collect();

            if missing.is_empty() {
                let parent_assignment: Vec<Outcome> = parents
                    .iter()
                    .map(|p| body.outcome_of(p).cloned().unwrap())
                    .collect();
                return self.model.probability(x, x_outcome, &parent_assignment);
            }

            let mut missing_sorted = missing;
            missing_sorted.sort();
            let mut total = 0.0;
            for assignment in self.cartesian_outcomes(&missing_sorted)? {
                let body_plus_m = extend_with(body, &assignment);
                let term1 = self.eval(head, &body_plus_m)?;
                let term2 = self.weight_of_missing(&assignment, body)?;
                total += term1 * term2;
            }
            return Ok(total);
        }

        // Rule 6: Bayes'-rule fallback (body asserts a descendant of X).
        let x_only = AssertionSet::new(vec![assertion.clone()]);
        let empty = AssertionSet::empty();
        let p_body_given_x = self.eval(body, &x_only)?;
        let p_x = self.eval(&x_only, &empty)?;
        let p_body = self.eval(body, &empty)?;
        if p_body.abs() < f64::EPSILON {
            return Err(CoreError::ZeroProbability(format!(
                "{}={} | {:?}",
                x, x_outcome, body
            )));
        }
        Ok(p_body_given_x * p_x / p_body)
    }

    /// `P(assignment | body)` for a set of missing parents being summed
    /// out of Rule 5's marginalization. Latent variables have no CPT and
    /// no marginal of their own (`Model::probability` rejects them), so a
    /// latent assertion's weight is taken as uniform over its declared
    /// outcomes rather than recursed on; non-latent assertions still go
    /// through the ordinary recursive evaluation. This folds a latent
    /// ancestor's sum directly into the joint numerator/denominator the
    /// way front-door identification requires, instead of ever asking the
    /// model for the latent's own probability.
    fn weight_of_missing(&self, assignment: &AssertionSet, body: &AssertionSet) -> CoreResult<f64> {
        let mut weight = 1.0;
        let mut observed: Vec<Assertion> = Vec::new();
        for assertion in assignment.iter() {
            if self.model.is_latent(&assertion.variable) {
                let outcomes = self.model.outcomes(&assertion.variable)?;
                weight /= outcomes.len() as f64;
            } else {
                observed.push(assertion.clone());
            }
        }
        if !observed.is_empty() {
            weight *= self.eval(&AssertionSet::new(observed), body)?;
        }
        Ok(weight)
    }

    fn check_drift(&self, head: &AssertionSet, body: &AssertionSet, value: f64) -> CoreResult<()> {
        let lo = -self.numeric_epsilon;
        let hi = 1.0 + self.numeric_epsilon;
        if value < lo || value > hi {
            return Err(CoreError::NumericDrift {
                query: format!("{head:?} | {body:?}"),
                value,
                lo,
                hi,
            });
        }
        Ok(())
    }

    /// Every joint outcome assignment to `vars` (cartesian product, in
    /// sorted-variable / declared-outcome order).
    fn cartesian_outcomes(&self, vars: &[VarName]) -> CoreResult<Vec<AssertionSet>> {
        let mut assignments = vec![Vec::new()];
        for var in vars {
            let outcomes = self.model.outcomes(var)?;
            let mut next = Vec::with_capacity(assignments.len() * outcomes.len());
            for partial in &assignments {
                for outcome in outcomes {
                    let mut extended = partial.clone();
                    extended.push(Assertion::observed(var.clone(), outcome.clone()));
                    next.push(extended);
                }
            }
            assignments = next;
        }
        Ok(assignments.into_iter().map(AssertionSet::new).collect())
    }
}

fn extend_with(body: &AssertionSet, extra: &AssertionSet) -> AssertionSet {
    let mut assertions: Vec<Assertion> = body.iter().cloned().collect();
    assertions.extend(extra.iter().cloned());
    AssertionSet::new(assertions)
}

/// Every outcome assignment over the full product of non-latent
/// variables, paired with its probability.
pub fn joint_distribution_table(
    model: &Model,
    numeric_epsilon: f64,
) -> CoreResult<Vec<(BTreeMap<VarName, Outcome>, f64)>> {
    let vars: Vec<VarName> = model
        .variables()
        .filter(|v| !model.is_latent(v))
        .cloned()
        .collect();
    let evaluator = Evaluator::new(model, numeric_epsilon);

    let mut assignments: Vec<Vec<(VarName, Outcome)>> = vec![Vec::new()];
    for var in &vars {
        let outcomes = model.outcomes(var)?;
        let mut next = Vec::with_capacity(assignments.len() * outcomes.len());
        for partial in &assignments {
            for outcome in outcomes {
                let mut extended = partial.clone();
                extended.push((var.clone(), outcome.clone()));
                next.push(extended);
            }
        }
        assignments = next;
    }

    let mut table = Vec::with_capacity(assignments.len());
    for assignment in assignments {
        let head: AssertionSet = assignment
            .iter()
            .map(|(v, o)| Assertion::observed(v.clone(), o.clone()))
            .collect();
        let p = evaluator.probability(&head, &AssertionSet::empty())?;
        table.push((assignment.into_iter().collect(), p));
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CptRow, Model, RawVariable};
    use std::collections::BTreeMap;

    fn chain_model() -> Model {
        let mut raw = BTreeMap::new();
        raw.insert(
            "Y".to_string(),
            RawVariable {
                outcomes: vec!["y".into(), "~y".into()],
                parents: vec![],
                table: Some(vec![CptRow::new("y", vec![], 0.7), CptRow::new("~y", vec![], 0.3)]),
            },
        );
        raw.insert(
            "X".to_string(),
            RawVariable {
                outcomes: vec!["x".into(), "~x".into()],
                parents: vec!["Y".to_string()],
                table: Some(vec![
                    CptRow::new("x", vec!["y".into()], 0.9),
                    CptRow::new("~x", vec!["y".into()], 0.1),
                    CptRow::new("x", vec!["~y".into()], 0.75),
                    CptRow::new("~x", vec!["~y".into()], 0.25),
                ]),
            },
        );
        Model::build(None, raw, 1e-5).unwrap()
    }

    #[test]
    fn s1_marginal_probability() {
        let model = chain_model();
        let eval = Evaluator::new(&model, 1e-6);
        let head = AssertionSet::new(vec![Assertion::observed("X", "x")]);
        let p = eval.probability(&head, &AssertionSet::empty()).unwrap();
        assert!((p - 0.855).abs() < 1e-9);
    }

    #[test]
    fn s1_conditional_probability_reads_cpt_directly() {
        let model = chain_model();
        let eval = Evaluator::new(&model, 1e-6);
        let head = AssertionSet::new(vec![Assertion::observed("X", "x")]);
        let body = AssertionSet::new(vec![Assertion::observed("Y", "y")]);
        let p = eval.probability(&head, &body).unwrap();
        assert!((p - 0.9).abs() < 1e-9);
    }

    #[test]
    fn s1_joint_probability() {
        let model = chain_model();
        let eval = Evaluator::new(&model, 1e-6);
        let head = AssertionSet::new(vec![
            Assertion::observed("X", "x"),
            Assertion::observed("Y", "y"),
        ]);
        let p = eval.probability(&head, &AssertionSet::empty()).unwrap();
        assert!((p - 0.63).abs() < 1e-9);
    }

    #[test]
    fn s5_contradiction_and_trivial_head() {
        let model = chain_model();
        let eval = Evaluator::new(&model, 1e-6);
        let x_x = AssertionSet::new(vec![Assertion::observed("X", "x")]);
        let x_not_x = AssertionSet::new(vec![Assertion::observed("X", "~x")]);
        assert_eq!(eval.probability(&x_x, &x_not_x).unwrap(), 0.0);
        assert_eq!(eval.probability(&AssertionSet::empty(), &AssertionSet::empty()).unwrap(), 1.0);
        assert_eq!(eval.probability(&x_x, &x_x).unwrap(), 1.0);
    }

    #[test]
    fn bayes_fallback_handles_descendant_evidence() {
        let model = chain_model();
        let eval = Evaluator::new(&model, 1e-6);
        // P(Y = y | X = x) via Bayes' rule, since X is a descendant of Y.
        let head = AssertionSet::new(vec![Assertion::observed("Y", "y")]);
        let body = AssertionSet::new(vec![Assertion::observed("X", "x")]);
        let p = eval.probability(&head, &body).unwrap();
        // P(Y=y|X=x) = P(X=x|Y=y) P(Y=y) / P(X=x) = 0.9*0.7/0.855
        let expected = 0.9 * 0.7 / 0.855;
        assert!((p - expected).abs() < 1e-9);
    }

    #[test]
    fn joint_distribution_table_sums_to_one() {
        let model = chain_model();
        let table = joint_distribution_table(&model, 1e-6).unwrap();
        assert_eq!(table.len(), 4); // 2 outcomes each for X and Y
        let total: f64 = table.iter().map(|(_, p)| p).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn memoization_does_not_change_result() {
        let model = chain_model();
        let memo = Evaluator::new(&model, 1e-6);
        let bare = Evaluator::new(&model, 1e-6).without_memoization();
        let head = AssertionSet::new(vec![Assertion::observed("X", "x")]);
        let p1 = memo.probability(&head, &AssertionSet::empty()).unwrap();
        let p2 = bare.probability(&head, &AssertionSet::empty()).unwrap();
        assert!((p1 - p2).abs() < 1e-12);
    }
}
