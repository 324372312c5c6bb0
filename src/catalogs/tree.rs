//! Clause hierarchy helpers: dotted full clause ids and nested trees.
//!
//! A clause's full id is its parent's full id joined with its own code by a
//! dot (`A` → `A.5` → `A.5.1`). Hierarchies are arbitrarily deep; a broken
//! parent chain (cycle or missing parent) stops the walk at the last clause
//! that can be resolved instead of looping.

use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use super::storage::DbClause;
use super::types::ClauseNode;

/// Minimal view of a clause needed to walk its ancestry.
#[derive(Debug, Clone)]
pub struct ClauseLink {
    pub parent_id: Option<Uuid>,
    pub clause_id: String,
}

pub fn link_map<I>(links: I) -> HashMap<Uuid, ClauseLink>
where
    I: IntoIterator<Item = (Uuid, Option<Uuid>, String)>,
{
    links
        .into_iter()
        .map(|(id, parent_id, clause_id)| (id, ClauseLink { parent_id, clause_id }))
        .collect()
}

pub fn full_clause_id(id: Uuid, links: &HashMap<Uuid, ClauseLink>) -> String {
    let mut parts = Vec::new();
    let mut seen = HashSet::new();
    let mut current = Some(id);

    while let Some(cur) = current {
        if !seen.insert(cur) {
            break;
        }
        match links.get(&cur) {
            Some(link) => {
                parts.push(link.clause_id.as_str());
                current = link.parent_id;
            }
            None => break,
        }
    }

    parts.reverse();
    parts.join(".")
}

pub fn full_clause_ids(links: &HashMap<Uuid, ClauseLink>) -> HashMap<Uuid, String> {
    links
        .keys()
        .map(|id| (*id, full_clause_id(*id, links)))
        .collect()
}

/// True when making `new_parent` the parent of `clause` would close a loop.
pub fn creates_cycle(clause: Uuid, new_parent: Uuid, links: &HashMap<Uuid, ClauseLink>) -> bool {
    let mut seen = HashSet::new();
    let mut current = Some(new_parent);
    while let Some(cur) = current {
        if cur == clause {
            return true;
        }
        if !seen.insert(cur) {
            return false;
        }
        current = links.get(&cur).and_then(|l| l.parent_id);
    }
    false
}

pub fn build_tree(clauses: Vec<DbClause>) -> Vec<ClauseNode> {
    let links = link_map(
        clauses
            .iter()
            .map(|c| (c.id, c.parent_id, c.clause_id.clone())),
    );
    let full_ids = full_clause_ids(&links);

    let mut by_parent: HashMap<Option<Uuid>, Vec<&DbClause>> = HashMap::new();
    for clause in &clauses {
        let parent = clause.parent_id.filter(|p| links.contains_key(p));
        by_parent.entry(parent).or_default().push(clause);
    }
    for siblings in by_parent.values_mut() {
        siblings.sort_by(|a, b| {
            a.sort_order
                .cmp(&b.sort_order)
                .then_with(|| a.clause_id.cmp(&b.clause_id))
        });
    }

    let mut visited = HashSet::new();
    let mut roots: Vec<ClauseNode> = by_parent
        .get(&None)
        .map(|list| list.as_slice())
        .unwrap_or_default()
        .iter()
        .filter_map(|c| make_node(c, &by_parent, &full_ids, &mut visited))
        .collect();

    // Clauses caught in a parent cycle never hang off a root.
    let mut orphans: Vec<&DbClause> = clauses.iter().filter(|c| !visited.contains(&c.id)).collect();
    orphans.sort_by(|a, b| a.clause_id.cmp(&b.clause_id));
    for clause in orphans {
        if let Some(node) = make_node(clause, &by_parent, &full_ids, &mut visited) {
            roots.push(node);
        }
    }

    roots
}

fn make_node(
    clause: &DbClause,
    by_parent: &HashMap<Option<Uuid>, Vec<&DbClause>>,
    full_ids: &HashMap<Uuid, String>,
    visited: &mut HashSet<Uuid>,
) -> Option<ClauseNode> {
    if !visited.insert(clause.id) {
        return None;
    }
    let children = by_parent
        .get(&Some(clause.id))
        .map(|list| list.as_slice())
        .unwrap_or_default()
        .iter()
        .filter_map(|child| make_node(child, by_parent, full_ids, visited))
        .collect();

    Some(ClauseNode {
        id: clause.id,
        clause_id: clause.clause_id.clone(),
        full_clause_id: full_ids
            .get(&clause.id)
            .cloned()
            .unwrap_or_else(|| clause.clause_id.clone()),
        title: clause.title.clone(),
        clause_type: clause.clause_type,
        is_testable: clause.is_testable,
        sort_order: clause.sort_order,
        children,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogs::types::ClauseType;
    use chrono::Utc;

    fn clause(code: &str, parent: Option<Uuid>, order: i32) -> DbClause {
        DbClause {
            id: Uuid::new_v4(),
            framework_id: Uuid::nil(),
            clause_id: code.to_string(),
            title: format!("Clause {code}"),
            description: None,
            clause_type: ClauseType::Requirement,
            parent_id: parent,
            sort_order: order,
            is_testable: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn links_of(clauses: &[DbClause]) -> HashMap<Uuid, ClauseLink> {
        link_map(clauses.iter().map(|c| (c.id, c.parent_id, c.clause_id.clone())))
    }

    #[test]
    fn test_full_clause_id_deep_chain() {
        let a = clause("A", None, 0);
        let b = clause("5", Some(a.id), 0);
        let c = clause("1", Some(b.id), 0);
        let d = clause("2", Some(c.id), 0);
        let all = vec![a.clone(), b, c, d.clone()];
        let links = links_of(&all);
        assert_eq!(full_clause_id(a.id, &links), "A");
        assert_eq!(full_clause_id(d.id, &links), "A.5.1.2");
    }

    #[test]
    fn test_full_clause_id_survives_cycle() {
        let mut a = clause("X", None, 0);
        let b = clause("Y", Some(a.id), 0);
        a.parent_id = Some(b.id);
        let links = links_of(&[a.clone(), b.clone()]);
        assert_eq!(full_clause_id(b.id, &links), "X.Y");
        assert_eq!(full_clause_id(a.id, &links), "Y.X");
    }

    #[test]
    fn test_creates_cycle() {
        let a = clause("A", None, 0);
        let b = clause("B", Some(a.id), 0);
        let c = clause("C", Some(b.id), 0);
        let links = links_of(&[a.clone(), b.clone(), c.clone()]);
        assert!(creates_cycle(a.id, c.id, &links));
        assert!(creates_cycle(a.id, a.id, &links));
        assert!(!creates_cycle(c.id, a.id, &links));
    }

    #[test]
    fn test_build_tree_orders_siblings() {
        let root = clause("A", None, 0);
        let second = clause("2", Some(root.id), 2);
        let first = clause("1", Some(root.id), 1);
        let tree = build_tree(vec![root, second, first]);
        assert_eq!(tree.len(), 1);
        let children: Vec<_> = tree[0]
            .children
            .iter()
            .map(|n| n.full_clause_id.as_str())
            .collect();
        assert_eq!(children, vec!["A.1", "A.2"]);
    }

    #[test]
    fn test_build_tree_keeps_cycle_members() {
        let mut a = clause("X", None, 0);
        let b = clause("Y", Some(a.id), 0);
        a.parent_id = Some(b.id);
        let tree = build_tree(vec![a, b]);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].children.len(), 1);
    }
}
