//! The three do-calculus rewrite rules plus marginalization, applied to a
//! single `Prob(head, body)` node. Each function returns every
//! legal local rewrite of that node; the search in [`super::search`]
//! splices each candidate back into the full expression tree.

use std::collections::BTreeSet;

use crate::docalc::expr::{Expr, FreshNameGen};
use crate::graph::{EdgeGraph, VarSet};
use crate::model::Model;
use crate::query::{Assertion, AssertionSet};

/// Every legal one-step rewrite of `Prob(head, body)`: Rules 1-3 (which
/// shrink or reclassify `body`) and Rule 4 (which introduces a `Sum`).
/// Returns an empty list once `body` is already do-free — nothing left to
/// rewrite at this node.
pub fn rule_candidates(
    head: &AssertionSet,
    body: &AssertionSet,
    model: &Model,
    fresh: &FreshNameGen,
) -> Vec<Expr> {
    if !body.has_interventions() {
        return Vec::new();
    }

    let mut candidates = Vec::new();
    candidates.extend(rule1_candidates(head, body, model));
    candidates.extend(rule2_candidates(head, body, model));
    candidates.extend(rule3_candidates(head, body, model));
    candidates.extend(rule4_candidates(head, body, model, fresh));
    candidates
}

/// Rule 1: insertion/deletion of observations. Drop a nonempty subset `W`
/// of the currently-observed variables when `Y ⊥ W | X, Z'` holds in `Gₓ̄`
/// (`Z'` = the observations that remain after dropping `W`).
fn rule1_candidates(head: &AssertionSet, body: &AssertionSet, model: &Model) -> Vec<Expr> {
    let y = head.variables();
    let do_x = body.interventions();
    let z = body.observations();
    let x_vars = do_x.variables();
    let z_vars = z.variables();

    let mut base_graph = EdgeGraph::from_model(model);
    base_graph.remove_incoming(&x_vars);

    let mut out = Vec::new();
    for w in nonempty_subsets(&z_vars) {
        let remaining_z: VarSet = z_vars.difference(&w).cloned().collect();
        let conditioning: VarSet = remaining_z.union(&x_vars).cloned().collect();
        if base_graph.d_separated(&y, &w, &conditioning) {
            let new_body: AssertionSet = body
                .iter()
                .filter(|a| !(w.contains(&a.variable) && !a.is_intervention()))
                .cloned()
                .collect();
            out.push(Expr::Prob(head.clone(), new_body));
        }
    }
    out
}

/// Rule 2: action/observation exchange. Pearl states this rule as an
/// equality, `P(y|do(x),do(w),z) = P(y|do(x),w,z)` whenever `Y ⊥ W | X, Z`
/// holds in `Gₓ̄ w̲`, so it licenses rewriting in either direction: turning a
/// subset of the do-set into an observation, or an observed subset into an
/// action (needed, e.g., partway through a front-door derivation, to set up
/// a Rule 3 deletion that isn't available from the starting form).
fn rule2_candidates(head: &AssertionSet, body: &AssertionSet, model: &Model) -> Vec<Expr> {
    let mut out = Vec::new();
    out.extend(rule2_to_observation(head, body, model));
    out.extend(rule2_to_action(head, body, model));
    out
}

/// Convert a nonempty subset `W` of the do-set to an observation (same
/// outcome) when `Y ⊥ W | X, Z` holds in `Gₓ̄ w̲` (`X` = the do-set
/// retained, `w̲` = `W`'s outgoing edges removed).
fn rule2_to_observation(head: &AssertionSet, body: &AssertionSet, model: &Model) -> Vec<Expr> {
    let y = head.variables();
    let do_x = body.interventions();
    let z_vars = body.observations().variables();
    let x_vars = do_x.variables();

    let mut out = Vec::new();
    for w in nonempty_subsets(&x_vars) {
        let keep_x: VarSet = x_vars.difference(&w).cloned().collect();
        let mut g = EdgeGraph::from_model(model);
        g.remove_incoming(&keep_x);
        g.remove_outgoing(&w);
        let conditioning: VarSet = z_vars.union(&keep_x).cloned().collect();
        if g.d_separated(&y, &w, &conditioning) {
            let mut assertions: Vec<Assertion> = body
                .iter()
                .filter(|a| !w.contains(&a.variable))
                .cloned()
                .collect();
            for a in body.iter() {
                if w.contains(&a.variable) {
                    assertions.push(Assertion::observed(a.variable.clone(), a.outcome.clone()));
                }
            }
            out.push(Expr::Prob(head.clone(), AssertionSet::new(assertions)));
        }
    }
    out
}

/// The reverse direction: convert a nonempty subset `W` of the currently
/// observed variables into an action, under the same `Y ⊥ W | X, Z` test in
/// `Gₓ̄ w̲` (`X` = the do-set, which doesn't change size here; `w̲` = `W`'s
/// outgoing edges removed).
fn rule2_to_action(head: &AssertionSet, body: &AssertionSet, model: &Model) -> Vec<Expr> {
    let y = head.variables();
    let x_vars = body.interventions().variables();
    let z_vars = body.observations().variables();

    let mut out = Vec::new();
    for w in nonempty_subsets(&z_vars) {
        let mut g = EdgeGraph::from_model(model);
        g.remove_incoming(&x_vars);
        g.remove_outgoing(&w);
        let remaining_z: VarSet = z_vars.difference(&w).cloned().collect();
        let conditioning: VarSet = remaining_z.union(&x_vars).cloned().collect();
        if g.d_separated(&y, &w, &conditioning) {
            let mut assertions: Vec<Assertion> = body
                .iter()
                .filter(|a| !w.contains(&a.variable))
                .cloned()
                .collect();
            for a in body.iter() {
                if w.contains(&a.variable) {
                    assertions.push(Assertion::intervened(a.variable.clone(), a.outcome.clone()));
                }
            }
            out.push(Expr::Prob(head.clone(), AssertionSet::new(assertions)));
        }
    }
    out
}

/// Rule 3: insertion/deletion of actions. Delete a nonempty subset `W` of
/// the do-set entirely when `Y ⊥ W | X, Z` holds in `Gₓ̄ w̄(z)`, where
/// `w̄(z) = W \ ancestors(Z)` computed in `Gₓ̄` (`X` = the do-set retained).
fn rule3_candidates(head: &AssertionSet, body: &AssertionSet, model: &Model) -> Vec<Expr> {
    let y = head.variables();
    let do_x = body.interventions();
    let z_vars = body.observations().variables();
    let x_vars = do_x.variables();

    let mut out = Vec::new();
    for w in nonempty_subsets(&x_vars) {
        let keep_x: VarSet = x_vars.difference(&w).cloned().collect();
        let mut g = EdgeGraph::from_model(model);
        g.remove_incoming(&keep_x);

        let ancestors_z = g.ancestors(&z_vars);
        let w_bar: VarSet = w.difference(&ancestors_z).cloned().collect();
        g.remove_incoming(&w_bar);

        let conditioning: VarSet = z_vars.union(&keep_x).cloned().collect();
        if g.d_separated(&y, &w, &conditioning) {
            let new_body: AssertionSet = body
                .iter()
                .filter(|a| !w.contains(&a.variable))
                .cloned()
                .collect();
            out.push(Expr::Prob(head.clone(), new_body));
        }
    }
    out
}

/// Rule 4: marginalization / conditioning expansion. Introduces `Σ_V`
/// over a fresh variable `V` drawn from the ancestor closure of `Head ∪
/// Body` that is neither already asserted nor latent (latents carry no CPT
/// and so can never be evaluated directly; the other three rules are
/// responsible for eliminating them from the expression).
fn rule4_candidates(
    head: &AssertionSet,
    body: &AssertionSet,
    model: &Model,
    fresh: &FreshNameGen,
) -> Vec<Expr> {
    let graph = EdgeGraph::from_model(model);
    let asserted: VarSet = head.variables().union(&body.variables()).cloned().collect();
    let ancestor_closure = graph.ancestors(&asserted);

    let mut out = Vec::new();
    for candidate in ancestor_closure.difference(&asserted) {
        if model.is_latent(candidate) {
            continue;
        }
        let Ok(outcomes) = model.outcomes(candidate) else {
            continue;
        };
        let fresh_name = fresh.fresh(candidate);
        let inner_head = AssertionSet::new(vec![Assertion::observed(fresh_name.clone(), outcomes[0].clone())]);
        let inner_body_with_v = body.plus(Assertion::observed(fresh_name.clone(), outcomes[0].clone()));

        out.push(Expr::Sum {
            variable: fresh_name,
            outcomes: outcomes.to_vec(),
            body: Box::new(Expr::Product(vec![
                Expr::Prob(head.clone(), inner_body_with_v),
                Expr::Prob(inner_head, body.clone()),
            ])),
        });
    }
    out
}

/// Every nonempty subset of `set`, as a `BTreeSet` of variable names.
/// Exponential in `|set|`; acceptable for the small pools do-calculus
/// rules operate over (do-sets and observation sets of real models).
fn nonempty_subsets(set: &VarSet) -> Vec<VarSet> {
    let items: Vec<&String> = set.iter().collect();
    let mut result = Vec::new();
    for mask in 1u32..(1u32 << items.len()) {
        let subset: BTreeSet<String> = items
            .iter()
            .enumerate()
            .filter(|(i, _)| mask & (1 << i) != 0)
            .map(|(_, name)| (*name).clone())
            .collect();
        result.push(subset);
    }
    result
}
