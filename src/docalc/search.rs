//! Iterative-deepening search over the do-calculus rewrite rules.
//! Explores the expression level by level (breadth-first, which for
//! a uniform rewrite-step cost is equivalent to iterative deepening and
//! guarantees the first do-free expression found is depth-minimal), with a
//! canonical-form visited-set for cycle prevention and a step budget for
//! cancellation.

use std::collections::BTreeSet;

use crate::docalc::expr::{normalize, Expr, FreshNameGen};
use crate::docalc::rules::rule_candidates;
use crate::error::{CoreError, CoreResult};
use crate::model::Model;
use crate::query::AssertionSet;

pub struct SearchOutcome {
    pub expr: Expr,
    pub depth: usize,
    pub steps: usize,
}

/// Search for a do-free expression equivalent to `P(head | body)`.
pub fn search(
    head: AssertionSet,
    body: AssertionSet,
    model: &Model,
    depth_bound: usize,
    step_budget: Option<usize>,
) -> CoreResult<SearchOutcome> {
    let fresh = FreshNameGen::new();
    let initial = normalize(Expr::Prob(head, body));

    if !has_do(&initial) {
        return Ok(SearchOutcome {
            expr: initial,
            depth: 0,
            steps: 0,
        });
    }

    let mut visited: BTreeSet<Expr> = BTreeSet::new();
    visited.insert(initial.clone());
    let mut frontier = vec![initial];
    let mut steps = 0usize;
    let mut best_partial = frontier[0].clone();

    for depth in 1..=depth_bound {
        let mut next = Vec::new();
        for expr in &frontier {
            for (index, (node_head, node_body)) in prob_nodes(expr).into_iter().enumerate() {
                if !node_body.has_interventions() {
                    continue;
                }
                for candidate in rule_candidates(&node_head, &node_body, model, &fresh) {
                    steps += 1;
                    if let Some(budget) = step_budget {
                        if steps > budget {
                            return Err(CoreError::DoCalculusFailed {
                                depth_bound,
                                steps,
                                partial: best_partial.to_string(),
                            });
                        }
                    }
                    let rewritten = normalize(replace_prob_at(expr, index, &candidate));
                    if visited.insert(rewritten.clone()) {
                        next.push(rewritten);
                    }
                }
            }
        }

        if let Some(winner) = pick_winner(&next) {
            return Ok(SearchOutcome {
                expr: winner,
                depth,
                steps,
            });
        }
        if next.is_empty() {
            break;
        }
        best_partial = next[0].clone();
        frontier = next;
    }

    Err(CoreError::DoCalculusFailed {
        depth_bound,
        steps,
        partial: best_partial.to_string(),
    })
}

fn pick_winner(frontier: &[Expr]) -> Option<Expr> {
    let mut winners: Vec<&Expr> = frontier.iter().filter(|e| !has_do(e)).collect();
    if winners.is_empty() {
        return None;
    }
    winners.sort_by(|a, b| expr_size(a).cmp(&expr_size(b)).then_with(|| a.cmp(b)));
    Some(winners[0].clone())
}

fn has_do(expr: &Expr) -> bool {
    match expr {
        Expr::Prob(_, body) => body.has_interventions(),
        Expr::Product(items) => items.iter().any(has_do),
        Expr::Sum { body, .. } => has_do(body),
        Expr::Literal(_) => false,
    }
}

fn expr_size(expr: &Expr) -> usize {
    match expr {
        Expr::Prob(..) => 1,
        Expr::Product(items) => 1 + items.iter().map(expr_size).sum::<usize>(),
        Expr::Sum { body, .. } => 1 + expr_size(body),
        Expr::Literal(_) => 1,
    }
}

/// Every `Prob(head, body)` node reachable from `expr`, in tree-walk order
/// (the same order [`replace_prob_at`] indexes into).
fn prob_nodes(expr: &Expr) -> Vec<(AssertionSet, AssertionSet)> {
    let mut out = Vec::new();
    collect_prob_nodes(expr, &mut out);
    out
}

fn collect_prob_nodes(expr: &Expr, out: &mut Vec<(AssertionSet, AssertionSet)>) {
    match expr {
        Expr::Prob(head, body) => out.push((head.clone(), body.clone())),
        Expr::Product(items) => items.iter().for_each(|item| collect_prob_nodes(item, out)),
        Expr::Sum { body, .. } => collect_prob_nodes(body, out),
        Expr::Literal(_) => {}
    }
}

/// Returns `expr` with its `target`-th `Prob` node (tree-walk order)
/// replaced by `replacement`.
fn replace_prob_at(expr: &Expr, target: usize, replacement: &Expr) -> Expr {
    let mut counter = 0;
    replace_prob_at_inner(expr, target, replacement, &mut counter)
}

fn replace_prob_at_inner(expr: &Expr, target: usize, replacement: &Expr, counter: &mut usize) -> Expr {
    match expr {
        Expr::Prob(..) => {
            let idx = *counter;
            *counter += 1;
            if idx == target {
                replacement.clone()
            } else {
                expr.clone()
            }
        }
        Expr::Product(items) => Expr::Product(
            items
                .iter()
                .map(|item| replace_prob_at_inner(item, target, replacement, counter))
                .collect(),
        ),
        Expr::Sum {
            variable,
            outcomes,
            body,
        } => Expr::Sum {
            variable: variable.clone(),
            outcomes: outcomes.clone(),
            body: Box::new(replace_prob_at_inner(body, target, replacement, counter)),
        },
        Expr::Literal(n) => Expr::Literal(*n),
    }
}
