//! Outcome assertions and queries.
//!
//! An [`Assertion`] pairs a variable with an outcome and a
//! [`AssertionKind`] tag distinguishing an observation (`X = x`) from an
//! intervention (`do(X = x)`). A [`Query`] is a `(Head, Body)` pair where
//! `Head` is always observational and `Body` may mix both kinds.

use std::collections::BTreeSet;

use crate::error::{CoreError, CoreResult};
use crate::model::{Model, Outcome, VarName};

/// Whether an assertion is a passive observation or a forced intervention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AssertionKind {
    Observed,
    Intervened,
}

/// `variable = outcome`, tagged as observed or intervened.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Assertion {
    pub variable: VarName,
    pub outcome: Outcome,
    pub kind: AssertionKind,
}

impl Assertion {
    pub fn observed(variable: impl Into<VarName>, outcome: impl Into<Outcome>) -> Self {
        Assertion {
            variable: variable.into(),
            outcome: outcome.into(),
            kind: AssertionKind::Observed,
        }
    }

    pub fn intervened(variable: impl Into<VarName>, outcome: impl Into<Outcome>) -> Self {
        Assertion {
            variable: variable.into(),
            outcome: outcome.into(),
            kind: AssertionKind::Intervened,
        }
    }

    pub fn is_intervention(&self) -> bool {
        self.kind == AssertionKind::Intervened
    }
}

/// An ordered, de-duplicated set of assertions, canonicalized by sorting
/// on `(variable, outcome, kind)` so it works as a memoization key
/// (order-independent, hashable).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct AssertionSet(Vec<Assertion>);

impl AssertionSet {
    pub fn new(mut assertions: Vec<Assertion>) -> Self {
        assertions.sort();
        assertions.dedup();
        AssertionSet(assertions)
    }

    pub fn empty() -> Self {
        AssertionSet(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Assertion> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn variables(&self) -> BTreeSet<VarName> {
        self.0.iter().map(|a| a.variable.clone()).collect()
    }

    pub fn contains(&self, other: &Assertion) -> bool {
        self.0.contains(other)
    }

    /// Is `other` a subset of `self` (same variable, outcome, and kind)?
    pub fn is_superset_of(&self, other: &AssertionSet) -> bool {
        other.0.iter().all(|a| self.contains(a))
    }

    /// Outcome already asserted for `variable`, if any, regardless of kind.
    pub fn outcome_of(&self, variable: &str) -> Option<&Outcome> {
        self.0
            .iter()
            .find(|a| a.variable == variable)
            .map(|a| &a.outcome)
    }

    /// True iff two assertions in the union disagree on some variable's
    /// outcome (the evaluator's contradiction check).
    pub fn union_contradicts(a: &AssertionSet, b: &AssertionSet) -> bool {
        for x in a.0.iter().chain(b.0.iter()) {
            let other_kind_conflict = a
                .0
                .iter()
                .chain(b.0.iter())
                .any(|y| y.variable == x.variable && y.outcome != x.outcome);
            if other_kind_conflict {
                return true;
            }
        }
        false
    }

    pub fn without_variable(&self, variable: &str) -> AssertionSet {
        AssertionSet(self.0.iter().filter(|a| a.variable != variable).cloned().collect())
    }

    pub fn plus(&self, assertion: Assertion) -> AssertionSet {
        let mut v = self.0.clone();
        v.push(assertion);
        AssertionSet::new(v)
    }

    pub fn interventions(&self) -> AssertionSet {
        AssertionSet(
            self.0
                .iter()
                .filter(|a| a.is_intervention())
                .cloned()
                .collect(),
        )
    }

    pub fn observations(&self) -> AssertionSet {
        AssertionSet(
            self.0
                .iter()
                .filter(|a| !a.is_intervention())
                .cloned()
                .collect(),
        )
    }

    pub fn has_interventions(&self) -> bool {
        self.0.iter().any(Assertion::is_intervention)
    }
}

impl FromIterator<Assertion> for AssertionSet {
    fn from_iter<T: IntoIterator<Item = Assertion>>(iter: T) -> Self {
        AssertionSet::new(iter.into_iter().collect())
    }
}

/// `P(Head | Body)`. A single variable may appear at most once across
/// `Head ∪ Body`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Query {
    pub head: AssertionSet,
    pub body: AssertionSet,
}

impl Query {
    pub fn new(head: AssertionSet, body: AssertionSet) -> CoreResult<Self> {
        // A variable may legitimately appear in both head and body: the
        // contradiction rule needs `P(X=x | X=~x) = 0` and the redundancy
        // rule needs `P(X=x | X=x) = 1` to be well-formed queries, not
        // errors.
        Ok(Query { head, body })
    }

    /// Validate every asserted variable and outcome exist in `model`.
    pub fn validate_against(&self, model: &Model) -> CoreResult<()> {
        for assertion in self.head.iter().chain(self.body.iter()) {
            if !model.contains(&assertion.variable) {
                return Err(CoreError::QueryShape(format!(
                    "unknown variable '{}'",
                    assertion.variable
                )));
            }
            if !model.has_outcome(&assertion.variable, &assertion.outcome) {
                return Err(CoreError::QueryShape(format!(
                    "variable '{}' has no outcome '{}'",
                    assertion.variable, assertion.outcome
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_variable_in_both_head_and_body() {
        let head = AssertionSet::new(vec![Assertion::observed("X", "x")]);
        let body = AssertionSet::new(vec![Assertion::observed("X", "~x")]);
        assert!(Query::new(head, body).is_ok());
    }

    #[test]
    fn canonicalization_sorts_and_dedups() {
        let set = AssertionSet::new(vec![
            Assertion::observed("Y", "y"),
            Assertion::observed("X", "x"),
            Assertion::observed("X", "x"),
        ]);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn union_contradicts_detects_conflicting_outcomes() {
        let a = AssertionSet::new(vec![Assertion::observed("X", "x")]);
        let b = AssertionSet::new(vec![Assertion::observed("X", "~x")]);
        assert!(AssertionSet::union_contradicts(&a, &b));
    }
}
