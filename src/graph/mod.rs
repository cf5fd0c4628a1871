//! # Graph layer
//!
//! Pure graph algorithms over a causal DAG: ancestor/descendant queries,
//! d-separation, backdoor-path enumeration, and deconfounding-set search.
//! Every operation here is a function of an explicit edge set — not
//! necessarily the model's original edges, since the do-calculus layer
//! needs to reason about graphs with some incoming or outgoing edges
//! surgically removed (`Gₓ̄`, `Gₓ̄ w̲`, `Gₓ̄ w̄(z)`). [`EdgeGraph`] is that
//! explicit, mutable (pre-query) edge set; [`Model`] only ever hands out
//! a fresh, unmutated copy via [`EdgeGraph::from_model`].

use std::collections::{BTreeMap, BTreeSet};

use crate::model::{Model, VarName};

/// A set of variable names. Always iterated in sorted order, so search
/// and enumeration order is deterministic.
pub type VarSet = BTreeSet<VarName>;

/// A directed edge set over a fixed vertex set, independent of any one
/// [`Model`]'s original edges.
#[derive(Debug, Clone)]
pub struct EdgeGraph {
    vertices: VarSet,
    parents: BTreeMap<VarName, VarSet>,
    children: BTreeMap<VarName, VarSet>,
}

impl EdgeGraph {
    /// A fresh copy of the model's edges.
    pub fn from_model(model: &Model) -> Self {
        let vertices: VarSet = model.variables().cloned().collect();
        let mut parents = BTreeMap::new();
        let mut children = BTreeMap::new();
        for v in &vertices {
            let p: VarSet = model.parents(v).unwrap().iter().cloned().collect();
            parents.insert(v.clone(), p);
            children.insert(v.clone(), VarSet::new());
        }
        for v in &vertices {
            for p in &parents[v] {
                children.get_mut(p).unwrap().insert(v.clone());
            }
        }
        EdgeGraph {
            vertices,
            parents,
            children,
        }
    }

    /// Remove every edge pointing into a variable in `vars` — the `do(X)`
    /// graph surgery, `Gₓ̄`.
    pub fn remove_incoming(&mut self, vars: &VarSet) {
        for v in vars {
            if let Some(old_parents) = self.parents.insert(v.clone(), VarSet::new()) {
                for p in old_parents {
                    self.children.get_mut(&p).map(|c| c.remove(v));
                }
            }
        }
    }

    /// Remove every edge leading out of a variable in `vars` — `Gw̲` (used
    /// in Rule 2's `Gₓ̄ w̲`).
    pub fn remove_outgoing(&mut self, vars: &VarSet) {
        for v in vars {
            if let Some(old_children) = self.children.insert(v.clone(), VarSet::new()) {
                for c in old_children {
                    self.parents.get_mut(&c).map(|p| p.remove(v));
                }
            }
        }
    }

    pub fn vertices(&self) -> &VarSet {
        &self.vertices
    }

    pub fn parents_of(&self, v: &str) -> &VarSet {
        static EMPTY: once_empty::Empty = once_empty::Empty;
        self.parents.get(v).unwrap_or(EMPTY.get())
    }

    pub fn children_of(&self, v: &str) -> &VarSet {
        static EMPTY: once_empty::Empty = once_empty::Empty;
        self.children.get(v).unwrap_or(EMPTY.get())
    }

    fn is_parent(&self, candidate_parent: &str, of: &str) -> bool {
        self.parents.get(of).is_some_and(|p| p.contains(candidate_parent))
    }

    /// Union of ancestors of every variable in `vars` (proper ancestors;
    /// `vars` itself is not included unless reachable from another member).
    pub fn ancestors(&self, vars: &VarSet) -> VarSet {
        let mut result = VarSet::new();
        let mut stack: Vec<VarName> = vars.iter().cloned().collect();
        while let Some(v) = stack.pop() {
            for p in self.parents_of(&v) {
                if result.insert(p.clone()) {
                    stack.push(p.clone());
                }
            }
        }
        result
    }

    /// Union of descendants of every variable in `vars`.
    pub fn descendants(&self, vars: &VarSet) -> VarSet {
        let mut result = VarSet::new();
        let mut stack: Vec<VarName> = vars.iter().cloned().collect();
        while let Some(v) = stack.pop() {
            for c in self.children_of(&v) {
                if result.insert(c.clone()) {
                    stack.push(c.clone());
                }
            }
        }
        result
    }

    /// d-separation of `x` and `y` given `z`, via the reachability
    /// ("Bayes-Ball") procedure: a node is reachable from `x` along an
    /// active trail iff it is not blocked by the chain/fork/collider rule
    /// at every intermediate node. `x ⊥ y | z` iff `y` is
    /// disjoint from the reachable set.
    pub fn d_separated(&self, x: &VarSet, y: &VarSet, z: &VarSet) -> bool {
        let reachable = self.reachable(x, z);
        reachable.is_disjoint(y)
    }

    /// Nodes reachable from `x` along an active trail given conditioning
    /// set `z` (Koller & Friedman's `Reachable` procedure).
    fn reachable(&self, x: &VarSet, z: &VarSet) -> VarSet {
        let ancestors_of_z = self.ancestors(z);
        let in_or_above_z: VarSet = z.union(&ancestors_of_z).cloned().collect();

        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
        enum Dir {
            Up,
            Down,
        }

        let mut to_visit: Vec<(VarName, Dir)> = x.iter().map(|v| (v.clone(), Dir::Up)).collect();
        let mut visited: BTreeSet<(VarName, Dir)> = BTreeSet::new();
        let mut reachable_nodes = VarSet::new();

        while let Some((node, dir)) = to_visit.pop() {
            if !visited.insert((node.clone(), dir)) {
                continue;
            }
            if !z.contains(&node) {
                reachable_nodes.insert(node.clone());
            }
            match dir {
                Dir::Up => {
                    if !z.contains(&node) {
                        for p in self.parents_of(&node) {
                            to_visit.push((p.clone(), Dir::Up));
                        }
                        for c in self.children_of(&node) {
                            to_visit.push((c.clone(), Dir::Down));
                        }
                    }
                }
                Dir::Down => {
                    if !z.contains(&node) {
                        for c in self.children_of(&node) {
                            to_visit.push((c.clone(), Dir::Down));
                        }
                    }
                    if in_or_above_z.contains(&node) {
                        for p in self.parents_of(&node) {
                            to_visit.push((p.clone(), Dir::Up));
                        }
                    }
                }
            }
        }
        reachable_nodes
    }

    /// Every simple path from some `x ∈ X` to some `y ∈ Y` whose first
    /// edge points into `x` (a backdoor path), regardless of blocking.
    fn enumerate_backdoor_paths(&self, x: &VarSet, y: &VarSet) -> Vec<Vec<VarName>> {
        let mut results = Vec::new();
        for start in x {
            for parent in self.parents_of(start).clone() {
                let mut path = vec![start.clone()];
                let mut visited: VarSet = [start.clone()].into_iter().collect();
                self.dfs_paths(&parent, x, y, &mut path, &mut visited, &mut results);
            }
        }
        results.sort();
        results.dedup();
        results
    }

    fn dfs_paths(
        &self,
        current: &str,
        x: &VarSet,
        y: &VarSet,
        path: &mut Vec<VarName>,
        visited: &mut VarSet,
        results: &mut Vec<Vec<VarName>>,
    ) {
        if visited.contains(current) {
            return;
        }
        path.push(current.to_string());
        visited.insert(current.to_string());

        if y.contains(current) {
            results.push(path.clone());
        } else {
            let mut neighbors: VarSet = self.parents_of(current).clone();
            neighbors.extend(self.children_of(current).iter().cloned());
            for neighbor in &neighbors {
                if !visited.contains(neighbor) {
                    self.dfs_paths(neighbor, x, y, path, visited, results);
                }
            }
        }

        path.pop();
        visited.remove(current);
    }

    /// Whether `path` is blocked by `z`, using the same chain/fork/collider
    /// logic as [`EdgeGraph::d_separated`].
    fn path_blocked(&self, path: &[VarName], z: &VarSet) -> bool {
        for i in 1..path.len().saturating_sub(1) {
            let prev = &path[i - 1];
            let node = &path[i];
            let next = &path[i + 1];
            let arrives_in = self.is_parent(prev, node);
            let leaves_in = self.is_parent(next, node);
            let is_collider = arrives_in && leaves_in;
            if is_collider {
                let descendants = self.descendants(&[node.clone()].into_iter().collect());
                let node_or_desc_conditioned =
                    z.contains(node) || !descendants.is_disjoint(z);
                if !node_or_desc_conditioned {
                    return true;
                }
            } else if z.contains(node) {
                return true;
            }
        }
        false
    }

    /// Backdoor paths from `x` to `y` not blocked by `blockers`. Empty
    /// iff every backdoor path is blocked.
    pub fn backdoor_paths(&self, x: &VarSet, y: &VarSet, blockers: &VarSet) -> Vec<Vec<VarName>> {
        self.enumerate_backdoor_paths(x, y)
            .into_iter()
            .filter(|path| !self.path_blocked(path, blockers))
            .collect()
    }

    /// Every `Z ⊆ V \ (X ∪ Y ∪ descendants(X))` that blocks all backdoor
    /// paths from `X` to `Y`. When `minimal_sets`, only set-inclusion-minimal
    /// `Z` are returned. Ties break lexicographically by sorted name tuple.
    pub fn deconfounding_sets(&self, x: &VarSet, y: &VarSet, minimal_sets: bool) -> Vec<VarSet> {
        let desc_x = self.descendants(x);
        let excluded: VarSet = x
            .union(y)
            .cloned()
            .collect::<VarSet>()
            .union(&desc_x)
            .cloned()
            .collect();
        let pool: Vec<VarName> = self
            .vertices
            .difference(&excluded)
            .cloned()
            .collect();

        let paths = self.enumerate_backdoor_paths(x, y);
        let mut found: Vec<VarSet> = Vec::new();

        for size in 0..=pool.len() {
            for combo in combinations(&pool, size) {
                let z: VarSet = combo.into_iter().cloned().collect();
                if minimal_sets && found.iter().any(|f| f.is_subset(&z)) {
                    continue;
                }
                let all_blocked = paths.iter().all(|p| self.path_blocked(p, &z));
                if all_blocked {
                    found.push(z);
                }
            }
        }

        found.sort_by(|a, b| {
            let av: Vec<&VarName> = a.iter().collect();
            let bv: Vec<&VarName> = b.iter().collect();
            av.cmp(&bv)
        });
        found
    }
}

/// All `size`-element subsets of `pool`, in the order `pool` is given
/// (which is already sorted since `pool` always comes from a `BTreeSet`
/// difference).
fn combinations<'a, T>(pool: &'a [T], size: usize) -> Vec<Vec<&'a T>> {
    if size == 0 {
        return vec![Vec::new()];
    }
    if size > pool.len() {
        return Vec::new();
    }
    let mut results = Vec::new();
    for i in 0..=(pool.len() - size) {
        for mut rest in combinations(&pool[i + 1..], size - 1) {
            let mut combo = vec![&pool[i]];
            combo.append(&mut rest);
            results.push(combo);
        }
    }
    results
}

pub fn disjoint(a: &VarSet, b: &VarSet) -> bool {
    a.is_disjoint(b)
}

/// A tiny helper so `parents_of`/`children_of` can return a `&VarSet`
/// even for vertices with no recorded edges, without allocating on every
/// call.
mod once_empty {
    use super::VarSet;
    use std::sync::OnceLock;

    pub struct Empty;
    impl Empty {
        pub fn get(&self) -> &'static VarSet {
            static CELL: OnceLock<VarSet> = OnceLock::new();
            CELL.get_or_init(VarSet::new)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CptRow, Model, RawVariable};
    use std::collections::BTreeMap;

    fn confounded_model() -> Model {
        // S2: Z -> X, Z -> Y, X -> Y
        let mut raw = BTreeMap::new();
        raw.insert(
            "Z".to_string(),
            RawVariable {
                outcomes: vec!["z0".into(), "z1".into()],
                parents: vec![],
                table: Some(vec![CptRow::new("z0", vec![], 0.5), CptRow::new("z1", vec![], 0.5)]),
            },
        );
        raw.insert(
            "X".to_string(),
            RawVariable {
                outcomes: vec!["x0".into(), "x1".into()],
                parents: vec!["Z".to_string()],
                table: Some(vec![
                    CptRow::new("x0", vec!["z0".into()], 0.5),
                    CptRow::new("x1", vec!["z0".into()], 0.5),
                    CptRow::new("x0", vec!["z1".into()], 0.5),
                    CptRow::new("x1", vec!["z1".into()], 0.5),
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
                                CptRow::new("y0", vec![z.into(), x.into()], 0.5),
                                CptRow::new("y1", vec![z.into(), x.into()], 0.5),
                            ]
                        })
                        .collect(),
                ),
            },
        );
        Model::build(None, raw, 1e-5).unwrap()
    }

    fn set(names: &[&str]) -> VarSet {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn s2_backdoor_path_found_without_blockers() {
        let model = confounded_model();
        let g = EdgeGraph::from_model(&model);
        let paths = g.backdoor_paths(&set(&["X"]), &set(&["Y"]), &VarSet::new());
        assert_eq!(paths, vec![vec!["X".to_string(), "Z".to_string(), "Y".to_string()]]);
    }

    #[test]
    fn s2_backdoor_path_blocked_by_z() {
        let model = confounded_model();
        let g = EdgeGraph::from_model(&model);
        let paths = g.backdoor_paths(&set(&["X"]), &set(&["Y"]), &set(&["Z"]));
        assert!(paths.is_empty());
    }

    #[test]
    fn s2_deconfounding_set_contains_z() {
        let model = confounded_model();
        let g = EdgeGraph::from_model(&model);
        let sets = g.deconfounding_sets(&set(&["X"]), &set(&["Y"]), false);
        assert!(sets.contains(&set(&["Z"])));
    }

    #[test]
    fn ancestors_and_descendants_chain() {
        let model = confounded_model();
        let g = EdgeGraph::from_model(&model);
        assert_eq!(g.ancestors(&set(&["Y"])), set(&["Z", "X"]));
        assert_eq!(g.descendants(&set(&["Z"])), set(&["X", "Y"]));
    }

    #[test]
    fn remove_incoming_cuts_do_edges() {
        let model = confounded_model();
        let mut g = EdgeGraph::from_model(&model);
        g.remove_incoming(&set(&["X"]));
        assert!(g.parents_of("X").is_empty());
        assert!(!g.children_of("Z").contains("X"));
    }
}
