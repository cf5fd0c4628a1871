//! # Model layer
//!
//! In-memory representation of a discrete Bayesian network: variables,
//! their outcomes, parent lists, conditional probability tables (CPTs),
//! and latent marking. A [`Model`] is built once (see [`crate::model::loader`])
//! and is immutable afterward; derived artifacts (topological order,
//! children map, root/latent sets) are computed once at construction and
//! held for the model's lifetime.

pub mod loader;

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{CoreError, CoreResult};

/// A variable name. Plain `String` — variables reference each other by
/// name, never by owning pointer, so `Model` can own every [`Variable`]
/// while `Graph`/`Evaluator`/`Do-calculus` hold only borrowed references
/// scoped to a single query.
pub type VarName = String;

/// A discrete outcome label. Two different variables may share labels.
pub type Outcome = String;

/// One row of a [`Cpt`]: the variable's own outcome, the parent outcome
/// vector (ordered identically to the variable's parent list), and the
/// assigned probability.
#[derive(Debug, Clone)]
pub struct CptRow {
    pub outcome: Outcome,
    pub parent_outcomes: Vec<Outcome>,
    pub probability: f64,
}

/// A conditional probability table: a total function from
/// `(own-outcome, parent-outcome-tuple)` to a probability in `[0, 1]`.
#[derive(Debug, Clone, Default)]
pub struct Cpt {
    rows: BTreeMap<(Outcome, Vec<Outcome>), f64>,
}

impl Cpt {
    fn from_rows(rows: Vec<CptRow>) -> Self {
        let mut map = BTreeMap::new();
        for row in rows {
            map.insert((row.outcome, row.parent_outcomes), row.probability);
        }
        Cpt { rows: map }
    }

    /// Look up `P(own = outcome | parents = parent_outcomes)`.
    pub fn get(&self, outcome: &str, parent_outcomes: &[Outcome]) -> Option<f64> {
        self.rows
            .get(&(outcome.to_string(), parent_outcomes.to_vec()))
            .copied()
    }
}

/// A single variable: its outcomes, its parents (observed parents first,
/// latent parents last), and its CPT (absent iff the variable is latent).
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: VarName,
    pub outcomes: Vec<Outcome>,
    pub parents: Vec<VarName>,
    table: Option<Cpt>,
}

impl Variable {
    pub fn is_latent(&self) -> bool {
        self.table.is_none()
    }
}

/// The full, validated, immutable model.
#[derive(Debug, Clone)]
pub struct Model {
    pub name: Option<String>,
    variables: BTreeMap<VarName, Variable>,
    /// Lexicographically smallest topological order consistent with the
    /// DAG edges.
    topo_order: Vec<VarName>,
    children: BTreeMap<VarName, Vec<VarName>>,
    roots: BTreeSet<VarName>,
    latents: BTreeSet<VarName>,
}

impl Model {
    /// Construct and validate a model from raw variable specs.
    ///
    /// Pipeline:
    /// 1. Intern names, rejecting duplicates (guaranteed by the input map).
    /// 2. Validate every parent name resolves and latent parents are
    ///    ordered last.
    /// 3. Verify acyclicity by topological sort.
    /// 4. Validate CPT completeness and row-group normalization.
    pub fn build(
        name: Option<String>,
        raw: BTreeMap<VarName, RawVariable>,
        tolerance: f64,
    ) -> CoreResult<Model> {
        for (var_name, spec) in &raw {
            for parent in &spec.parents {
                if !raw.contains_key(parent) {
                    return Err(CoreError::MalformedModel(format!(
                        "variable '{var_name}' references unknown parent '{parent}'"
                    )));
                }
            }
            let mut seen_latent = false;
            for parent in &spec.parents {
                let parent_is_latent = raw[parent].table.is_none();
                if parent_is_latent {
                    seen_latent = true;
                } else if seen_latent {
                    return Err(CoreError::MalformedModel(format!(
                        "variable '{var_name}': latent parent must be ordered after all observed parents"
                    )));
                }
            }
            let mut dedup = BTreeSet::new();
            for outcome in &spec.outcomes {
                if !dedup.insert(outcome) {
                    return Err(CoreError::MalformedModel(format!(
                        "variable '{var_name}' declares duplicate outcome '{outcome}'"
                    )));
                }
            }
        }

        let topo_order = topological_sort(&raw)?;

        let mut variables = BTreeMap::new();
        for (var_name, spec) in raw {
            let table = match spec.table {
                Some(rows) => Some(validate_cpt(&var_name, &spec.outcomes, &spec.parents, &rows, tolerance)?),
                None => None,
            };
            variables.insert(
                var_name.clone(),
                Variable {
                    name: var_name,
                    outcomes: spec.outcomes,
                    parents: spec.parents,
                    table,
                },
            );
        }

        let mut children: BTreeMap<VarName, Vec<VarName>> =
            variables.keys().map(|v| (v.clone(), Vec::new())).collect();
        for var in variables.values() {
            for parent in &var.parents {
                children.get_mut(parent).unwrap().push(var.name.clone());
            }
        }
        for kids in children.values_mut() {
            kids.sort();
        }

        let roots = variables
            .values()
            .filter(|v| v.parents.is_empty())
            .map(|v| v.name.clone())
            .collect();
        let latents = variables
            .values()
            .filter(|v| v.is_latent())
            .map(|v| v.name.clone())
            .collect();

        Ok(Model {
            name,
            variables,
            topo_order,
            children,
            roots,
            latents,
        })
    }

    pub fn variables(&self) -> impl Iterator<Item = &VarName> {
        self.variables.keys()
    }

    pub fn contains(&self, var: &str) -> bool {
        self.variables.contains_key(var)
    }

    pub fn has_outcome(&self, var: &str, outcome: &str) -> bool {
        self.variables
            .get(var)
            .is_some_and(|v| v.outcomes.iter().any(|o| o == outcome))
    }

    pub fn outcomes(&self, var: &str) -> CoreResult<&[Outcome]> {
        self.variables
            .get(var)
            .map(|v| v.outcomes.as_slice())
            .ok_or_else(|| CoreError::QueryShape(format!("unknown variable '{var}'")))
    }

    pub fn parents(&self, var: &str) -> CoreResult<&[VarName]> {
        self.variables
            .get(var)
            .map(|v| v.parents.as_slice())
            .ok_or_else(|| CoreError::QueryShape(format!("unknown variable '{var}'")))
    }

    pub fn children(&self, var: &str) -> &[VarName] {
        self.children.get(var).map_or(&[], |c| c.as_slice())
    }

    pub fn is_latent(&self, var: &str) -> bool {
        self.latents.contains(var)
    }

    pub fn roots(&self) -> &BTreeSet<VarName> {
        &self.roots
    }

    pub fn latents(&self) -> &BTreeSet<VarName> {
        &self.latents
    }

    /// `P(var = own_outcome | parents = parent_assignment)`, read directly
    /// from the variable's CPT. `parent_assignment` must be ordered
    /// identically to `parents(var)`.
    pub fn probability(
        &self,
        var: &str,
        own_outcome: &str,
        parent_assignment: &[Outcome],
    ) -> CoreResult<f64> {
        let variable = self
            .variables
            .get(var)
            .ok_or_else(|| CoreError::QueryShape(format!("unknown variable '{var}'")))?;
        let table = variable.table.as_ref().ok_or_else(|| {
            CoreError::QueryShape(format!("variable '{var}' is latent and has no CPT"))
        })?;
        table.get(own_outcome, parent_assignment).ok_or_else(|| {
            CoreError::MalformedTable {
                variable: var.to_string(),
                detail: format!(
                    "no row for outcome '{own_outcome}' given parents {parent_assignment:?}"
                ),
            }
        })
    }

    /// The lexicographically smallest topological order consistent with
    /// the DAG edges.
    pub fn topological_order(&self) -> &[VarName] {
        &self.topo_order
    }
}

/// Pre-validation variable spec, produced by [`loader`] from a parsed
/// file or built directly by callers constructing a model in memory.
#[derive(Debug, Clone)]
pub struct RawVariable {
    pub outcomes: Vec<Outcome>,
    pub parents: Vec<VarName>,
    pub table: Option<Vec<CptRow>>,
}

/// Kahn's algorithm, always expanding the lexicographically smallest
/// ready node, which yields the lexicographically smallest topological
/// order among all valid orders.
fn topological_sort(raw: &BTreeMap<VarName, RawVariable>) -> CoreResult<Vec<VarName>> {
    let mut indegree: BTreeMap<&VarName, usize> =
        raw.keys().map(|name| (name, 0usize)).collect();
    for (name, spec) in raw {
        *indegree.get_mut(name).unwrap() += spec.parents.len();
    }

    let mut ready: BTreeSet<&VarName> = indegree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(n, _)| *n)
        .collect();

    let mut children: BTreeMap<&VarName, Vec<&VarName>> =
        raw.keys().map(|n| (n, Vec::new())).collect();
    for (name, spec) in raw {
        for parent in &spec.parents {
            children.get_mut(parent).unwrap().push(name);
        }
    }
    for kids in children.values_mut() {
        kids.sort();
    }

    let mut order = Vec::with_capacity(raw.len());
    while let Some(&next) = ready.iter().next() {
        ready.remove(next);
        order.push(next.clone());
        for &child in &children[next] {
            let d = indegree.get_mut(child).unwrap();
            *d -= 1;
            if *d == 0 {
                ready.insert(child);
            }
        }
    }

    if order.len() != raw.len() {
        let stuck = raw
            .keys()
            .find(|name| !order.contains(name))
            .cloned()
            .unwrap_or_default();
        return Err(CoreError::CyclicGraph(stuck));
    }

    Ok(order)
}

fn validate_cpt(
    var_name: &str,
    outcomes: &[Outcome],
    parents: &[VarName],
    rows: &[CptRow],
    tolerance: f64,
) -> CoreResult<Cpt> {
    // Completeness requires knowing every parent's outcome domain, but the
    // model hasn't been fully interned yet at this point in the pipeline;
    // the caller passes this variable's own declared outcomes and the
    // cross product is checked against exactly the parent-outcome vectors
    // that actually appear among the rows (no foreign-key lookup needed
    // for completeness, only for resolution, which step 2 already did).
    let mut by_parent_assignment: BTreeMap<Vec<Outcome>, BTreeMap<Outcome, f64>> = BTreeMap::new();
    for row in rows {
        if row.parent_outcomes.len() != parents.len() {
            return Err(CoreError::MalformedTable {
                variable: var_name.to_string(),
                detail: format!(
                    "row for outcome '{}' has {} parent outcomes, expected {}",
                    row.outcome,
                    row.parent_outcomes.len(),
                    parents.len()
                ),
            });
        }
        if !outcomes.contains(&row.outcome) {
            return Err(CoreError::MalformedTable {
                variable: var_name.to_string(),
                detail: format!("row names unknown outcome '{}'", row.outcome),
            });
        }
        if !(0.0..=1.0).contains(&row.probability) {
            return Err(CoreError::MalformedTable {
                variable: var_name.to_string(),
                detail: format!("probability {} out of [0, 1]", row.probability),
            });
        }
        let entry = by_parent_assignment
            .entry(row.parent_outcomes.clone())
            .or_default();
        if entry.insert(row.outcome.clone(), row.probability).is_some() {
            return Err(CoreError::MalformedTable {
                variable: var_name.to_string(),
                detail: format!(
                    "duplicate row for outcome '{}' given parents {:?}",
                    row.outcome, row.parent_outcomes
                ),
            });
        }
    }

    for (assignment, per_outcome) in &by_parent_assignment {
        if per_outcome.len() != outcomes.len() {
            let missing: Vec<_> = outcomes
                .iter()
                .filter(|o| !per_outcome.contains_key(*o))
                .collect();
            return Err(CoreError::MalformedTable {
                variable: var_name.to_string(),
                detail: format!(
                    "incomplete row group for parents {assignment:?}: missing outcomes {missing:?}"
                ),
            });
        }
        let sum: f64 = per_outcome.values().sum();
        if (sum - 1.0).abs() > tolerance {
            return Err(CoreError::MalformedTable {
                variable: var_name.to_string(),
                detail: format!(
                    "row group for parents {assignment:?} sums to {sum}, not 1.0 (tolerance {tolerance})"
                ),
            });
        }
    }

    Ok(Cpt::from_rows(rows.to_vec()))
}

impl CptRow {
    pub fn new(outcome: impl Into<Outcome>, parent_outcomes: Vec<Outcome>, probability: f64) -> Self {
        CptRow {
            outcome: outcome.into(),
            parent_outcomes,
            probability,
        }
    }
}
