//! In-memory role hierarchy and inheritance resolution.
//!
//! The full role table and edge table are loaded once into a [`RoleGraph`]; expanding an
//! actor's roles is then a pure in-memory depth-first traversal. Cycles are a data
//! integrity problem, not something the resolver trusts never to happen: every traversal
//! carries a visited set.

use crate::role::{HierarchyEdge, Role};
use log::warn;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

/// Snapshot of role definitions and the inheritance graph.
#[derive(Debug, Clone, Default)]
pub struct RoleGraph {
    roles_by_id: HashMap<String, Role>,
    ids_by_name: HashMap<String, String>,
    // child name -> parent names
    parents: HashMap<String, BTreeSet<String>>,
    max_depth: usize,
}

impl RoleGraph {
    /// Build a graph from roles and `child -> parent` edges (by role name).
    ///
    /// Edges naming unknown roles are kept; they resolve to nothing.
    pub fn new(
        roles: impl IntoIterator<Item = Role>,
        edges: impl IntoIterator<Item = HierarchyEdge>,
        max_depth: usize,
    ) -> Self {
        let mut graph = Self {
            max_depth,
            ..Self::default()
        };
        for role in roles {
            graph
                .ids_by_name
                .insert(role.name().to_string(), role.id().to_string());
            graph.roles_by_id.insert(role.id().to_string(), role);
        }
        for edge in edges {
            graph.parents.entry(edge.child).or_default().insert(edge.parent);
        }
        graph
    }

    pub fn role_by_id(&self, id: &str) -> Option<&Role> {
        self.roles_by_id.get(id)
    }

    pub fn role_by_name(&self, name: &str) -> Option<&Role> {
        self.ids_by_name
            .get(name)
            .and_then(|id| self.roles_by_id.get(id))
    }

    pub fn role_count(&self) -> usize {
        self.roles_by_id.len()
    }

    /// Direct parents of a role.
    pub fn parents_of(&self, name: &str) -> impl Iterator<Item = &str> {
        self.parents
            .get(name)
            .into_iter()
            .flat_map(|parents| parents.iter().map(String::as_str))
    }

    /// Expand directly-assigned role names into the closure of inherited roles.
    ///
    /// Inactive and unknown roles are dropped and do not propagate inheritance.
    /// The result is a superset of the active input roles and does not depend on
    /// input order.
    pub fn resolve<'a, I>(&self, direct: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        // Breadth-first from every root at once: each role is expanded at its shortest
        // distance from any root, so the depth cap cannot depend on input order.
        let mut visited = BTreeSet::new();
        let mut frontier: VecDeque<(&str, usize)> = VecDeque::new();
        for name in direct {
            if self.is_active(name) && visited.insert(name.to_string()) {
                frontier.push_back((name, 0));
            }
        }

        let mut truncated = false;
        while let Some((name, depth)) = frontier.pop_front() {
            for parent in self.parents_of(name) {
                if !self.is_active(parent) || visited.contains(parent) {
                    continue;
                }
                if depth >= self.max_depth {
                    truncated = true;
                    continue;
                }
                visited.insert(parent.to_string());
                frontier.push_back((parent, depth + 1));
            }
        }

        if truncated {
            warn!(
                "Role hierarchy exceeds max depth {}; inheritance truncated",
                self.max_depth
            );
        }
        visited
    }

    /// Whether `ancestor` is reachable from `role` through inheritance edges.
    pub fn inherits_from(&self, role: &str, ancestor: &str) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![role];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            for parent in self.parents_of(current) {
                if parent == ancestor {
                    return true;
                }
                stack.push(parent);
            }
        }
        false
    }

    /// Roles that take part in an inheritance cycle, if any.
    pub fn roles_in_cycles(&self) -> BTreeSet<String> {
        self.parents
            .keys()
            .filter(|name| self.inherits_from(name, name))
            .cloned()
            .collect()
    }

    fn is_active(&self, name: &str) -> bool {
        self.role_by_name(name).is_some_and(Role::is_active)
    }
}
