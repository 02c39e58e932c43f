//! Role partial order.
//!
//! Built once from direct `implies` edges. The transitive closure is computed
//! at build time so request-time checks are set lookups.

use std::collections::{BTreeSet, HashMap, HashSet};

use super::HierarchyError;
use crate::{config::RoleConfig, models::RoleId};

#[derive(Debug, Clone, Default)]
pub struct RoleHierarchy {
    /// Every role a given role satisfies, excluding itself.
    implied: HashMap<RoleId, HashSet<RoleId>>,
    names: HashMap<RoleId, String>,
}

impl RoleHierarchy {
    /// Build the hierarchy from direct edges.
    ///
    /// Fails on duplicate role ids, edges to undeclared roles and cycles.
    pub fn build(roles: &[RoleConfig]) -> Result<Self, HierarchyError> {
        let mut edges: HashMap<RoleId, &[RoleId]> = HashMap::with_capacity(roles.len());
        let mut names = HashMap::with_capacity(roles.len());

        for role in roles {
            if edges.insert(role.id, role.implies.as_slice()).is_some() {
                return Err(HierarchyError::DuplicateRole(role.id));
            }
            names.insert(role.id, role.name.clone());
        }

        for role in roles {
            if let Some(implied) = role.implies.iter().find(|r| !edges.contains_key(*r)) {
                return Err(HierarchyError::UnknownRole {
                    role: role.id,
                    implied: *implied,
                });
            }
        }

        detect_cycle(roles, &edges)?;

        let mut implied = HashMap::with_capacity(roles.len());
        for role in roles {
            let mut reachable = HashSet::new();
            let mut stack: Vec<RoleId> = role.implies.clone();
            while let Some(next) = stack.pop() {
                if reachable.insert(next)
                    && let Some(children) = edges.get(&next)
                {
                    stack.extend(children.iter().copied());
                }
            }
            implied.insert(role.id, reachable);
        }

        Ok(Self { implied, names })
    }

    /// Whether `holder` passes a check that requires `required`.
    ///
    /// Roles outside the hierarchy only satisfy themselves.
    pub fn satisfies(&self, holder: RoleId, required: RoleId) -> bool {
        holder == required
            || self
                .implied
                .get(&holder)
                .is_some_and(|set| set.contains(&required))
    }

    pub fn satisfies_any(&self, holder: RoleId, required: &BTreeSet<RoleId>) -> bool {
        required.iter().any(|r| self.satisfies(holder, *r))
    }

    pub fn name(&self, role: RoleId) -> Option<&str> {
        self.names.get(&role).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

fn detect_cycle(
    roles: &[RoleConfig],
    edges: &HashMap<RoleId, &[RoleId]>,
) -> Result<(), HierarchyError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit(
        role: RoleId,
        edges: &HashMap<RoleId, &[RoleId]>,
        marks: &mut HashMap<RoleId, Mark>,
        path: &mut Vec<RoleId>,
    ) -> Result<(), HierarchyError> {
        match marks.get(&role) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let start = path.iter().position(|r| *r == role).unwrap_or(0);
                let mut cycle = path[start..].to_vec();
                cycle.push(role);
                return Err(HierarchyError::Cycle(cycle));
            }
            None => {}
        }

        marks.insert(role, Mark::Visiting);
        path.push(role);
        for child in edges.get(&role).copied().unwrap_or_default() {
            visit(*child, edges, marks, path)?;
        }
        path.pop();
        marks.insert(role, Mark::Done);
        Ok(())
    }

    let mut marks = HashMap::new();
    let mut path = Vec::new();
    for role in roles {
        visit(role.id, edges, &mut marks, &mut path)?;
    }
    Ok(())
}
