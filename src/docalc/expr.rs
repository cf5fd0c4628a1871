//! Symbolic expression algebra.
//!
//! `Prob`/`Product`/`Sum`/`Literal` form a tagged sum type over which the
//! search in [`super::search`] rewrites. Structural ordering (and hence
//! hashing) is total so expressions can sit in a `BTreeSet` visited-set and
//! be compared for canonical-form deduplication.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use crate::model::{Outcome, VarName};
use crate::query::AssertionSet;

/// A node in the symbolic expression tree.
#[derive(Debug, Clone)]
pub enum Expr {
    /// `P(head | body)`; `body` may mix observations and interventions.
    Prob(AssertionSet, AssertionSet),
    Product(Vec<Expr>),
    /// `Σ` over every outcome of `variable`, with `body` evaluated once per
    /// outcome (the caller substitutes the outcome into `body`'s assertions
    /// before evaluating).
    Sum {
        variable: VarName,
        outcomes: Vec<Outcome>,
        body: Box<Expr>,
    },
    Literal(f64),
}

fn rank(e: &Expr) -> u8 {
    match e {
        Expr::Prob(..) => 0,
        Expr::Product(_) => 1,
        Expr::Sum { .. } => 2,
        Expr::Literal(_) => 3,
    }
}

impl Ord for Expr {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Expr::Prob(h1, b1), Expr::Prob(h2, b2)) => (h1, b1).cmp(&(h2, b2)),
            (Expr::Product(a), Expr::Product(b)) => a.cmp(b),
            (
                Expr::Sum {
                    variable: v1,
                    outcomes: o1,
                    body: b1,
                },
                Expr::Sum {
                    variable: v2,
                    outcomes: o2,
                    body: b2,
                },
            ) => (v1, o1, b1).cmp(&(v2, o2, b2)),
            (Expr::Literal(a), Expr::Literal(b)) => a.to_bits().cmp(&b.to_bits()),
            _ => rank(self).cmp(&rank(other)),
        }
    }
}

impl PartialOrd for Expr {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Expr {}

impl Hash for Expr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        rank(self).hash(state);
        match self {
            Expr::Prob(h, b) => {
                h.hash(state);
                b.hash(state);
            }
            Expr::Product(items) => items.hash(state),
            Expr::Sum {
                variable,
                outcomes,
                body,
            } => {
                variable.hash(state);
                outcomes.hash(state);
                body.hash(state);
            }
            Expr::Literal(n) => n.to_bits().hash(state),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Prob(head, body) => {
                write!(f, "P(")?;
                fmt_assertions(f, head)?;
                if !body.is_empty() {
                    write!(f, " | ")?;
                    fmt_assertions(f, body)?;
                }
                write!(f, ")")
            }
            Expr::Product(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " * ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
            Expr::Sum { variable, body, .. } => write!(f, "Σ_{variable} {body}"),
            Expr::Literal(n) => write!(f, "{n}"),
        }
    }
}

fn fmt_assertions(f: &mut fmt::Formatter<'_>, set: &AssertionSet) -> fmt::Result {
    for (i, a) in set.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        if a.is_intervention() {
            write!(f, "do({}={})", a.variable, a.outcome)?;
        } else {
            write!(f, "{}={}", a.variable, a.outcome)?;
        }
    }
    Ok(())
}

/// Replaces the outcome of every assertion on `variable` (in any `Prob`
/// node reachable from `expr`) with `outcome`. Used to instantiate a `Sum`'s
/// body once per outcome during expression evaluation.
pub fn substitute(expr: &Expr, variable: &str, outcome: &str) -> Expr {
    match expr {
        Expr::Prob(head, body) => Expr::Prob(
            substitute_set(head, variable, outcome),
            substitute_set(body, variable, outcome),
        ),
        Expr::Product(items) => Expr::Product(
            items
                .iter()
                .map(|item| substitute(item, variable, outcome))
                .collect(),
        ),
        Expr::Sum {
            variable: bound,
            outcomes,
            body,
        } => Expr::Sum {
            variable: bound.clone(),
            outcomes: outcomes.clone(),
            body: Box::new(substitute(body, variable, outcome)),
        },
        Expr::Literal(n) => Expr::Literal(*n),
    }
}

fn substitute_set(set: &AssertionSet, variable: &str, outcome: &str) -> AssertionSet {
    use crate::query::Assertion;
    set.iter()
        .map(|a| {
            if a.variable == variable {
                if a.is_intervention() {
                    Assertion::intervened(a.variable.clone(), outcome.to_string())
                } else {
                    Assertion::observed(a.variable.clone(), outcome.to_string())
                }
            } else {
                a.clone()
            }
        })
        .collect()
}

/// Flattens nested `Product`s, folds `Literal` factors, and collapses a
/// `Sum` whose body normalizes to `Literal(0.0)` down to `Literal(0.0)`. No
/// other algebraic simplification is performed.
pub fn normalize(expr: Expr) -> Expr {
    match expr {
        Expr::Product(factors) => {
            let mut flat = Vec::new();
            let mut lit_acc = 1.0_f64;
            for factor in factors {
                match normalize(factor) {
                    Expr::Product(inner) => flat.extend(inner),
                    Expr::Literal(n) => lit_acc *= n,
                    other => flat.push(other),
                }
            }
            if lit_acc == 0.0 {
                return Expr::Literal(0.0);
            }
            if (lit_acc - 1.0).abs() > f64::EPSILON || flat.is_empty() {
                flat.push(Expr::Literal(lit_acc));
            }
            if flat.len() == 1 {
                flat.into_iter().next().unwrap()
            } else {
                Expr::Product(flat)
            }
        }
        Expr::Sum {
            variable,
            outcomes,
            body,
        } => {
            let body = normalize(*body);
            if matches!(body, Expr::Literal(n) if n == 0.0) {
                Expr::Literal(0.0)
            } else {
                Expr::Sum {
                    variable,
                    outcomes,
                    body: Box::new(body),
                }
            }
        }
        other => other,
    }
}

/// Generates globally-fresh primed names within one search: the first
/// request for a base name returns it unprimed, subsequent
/// requests return `base′`, `base″`, and so on.
pub struct FreshNameGen {
    counts: Mutex<BTreeMap<VarName, u32>>,
}

impl FreshNameGen {
    pub fn new() -> Self {
        FreshNameGen {
            counts: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn fresh(&self, base: &str) -> VarName {
        let mut counts = self.counts.lock().expect("fresh-name lock poisoned");
        let entry = counts.entry(base.to_string()).or_insert(0);
        let name = if *entry == 0 {
            base.to_string()
        } else {
            format!("{base}{}", "′".repeat(*entry as usize))
        };
        *entry += 1;
        name
    }
}

impl Default for FreshNameGen {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Assertion;

    #[test]
    fn normalize_flattens_nested_products_and_folds_literals() {
        let expr = Expr::Product(vec![
            Expr::Literal(2.0),
            Expr::Product(vec![Expr::Literal(3.0), Expr::Literal(0.5)]),
        ]);
        assert_eq!(normalize(expr), Expr::Literal(3.0));
    }

    #[test]
    fn normalize_collapses_zero_sum() {
        let expr = Expr::Sum {
            variable: "V".to_string(),
            outcomes: vec!["v0".to_string()],
            body: Box::new(Expr::Literal(0.0)),
        };
        assert_eq!(normalize(expr), Expr::Literal(0.0));
    }

    #[test]
    fn fresh_name_discipline_primes_on_collision() {
        let gen = FreshNameGen::new();
        assert_eq!(gen.fresh("X"), "X");
        assert_eq!(gen.fresh("X"), "X′");
        assert_eq!(gen.fresh("X"), "X″");
        assert_eq!(gen.fresh("Z"), "Z");
    }

    #[test]
    fn structural_equality_ignores_construction_order() {
        let a = Expr::Prob(
            AssertionSet::new(vec![Assertion::observed("X", "x")]),
            AssertionSet::empty(),
        );
        let b = Expr::Prob(
            AssertionSet::new(vec![Assertion::observed("X", "x")]),
            AssertionSet::empty(),
        );
        assert_eq!(a, b);
    }
}
