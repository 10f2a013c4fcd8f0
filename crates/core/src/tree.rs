//! Walking and reshaping the three-level task hierarchy.
//!
//! Trees are plain `Vec<TaskNode>` forests rooted at level 0. Ids are unique
//! across a whole board, so a lookup stops at the first match; [`assemble`]
//! and [`validate`] reject forests that break that rule instead of picking
//! one of the duplicates.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::types::{TaskLevel, TaskNode};

/// Structural defects detected in a task forest.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("task id {0} appears more than once")]
    DuplicateId(String),
    #[error("task {id} is at level {actual} but its position requires level {expected}")]
    LevelMismatch { id: String, expected: u8, actual: u8 },
    #[error("task {0} is at the deepest level and cannot have subtasks")]
    LeafHasSubtasks(String),
    #[error("task {0} has no parent but is not a top-level task")]
    DetachedSubtask(String),
}

/// Depth-first search for the node with `id`.
pub fn find<'a>(nodes: &'a [TaskNode], id: &str) -> Option<&'a TaskNode> {
    for node in nodes {
        if node.id == id {
            return Some(node);
        }
        if let Some(found) = find(&node.subtasks, id) {
            return Some(found);
        }
    }
    None
}

/// Mutable variant of [`find`].
pub fn find_mut<'a>(nodes: &'a mut [TaskNode], id: &str) -> Option<&'a mut TaskNode> {
    for node in nodes.iter_mut() {
        if node.id == id {
            return Some(node);
        }
        if let Some(found) = find_mut(&mut node.subtasks, id) {
            return Some(found);
        }
    }
    None
}

/// Applies `apply` to the node with `id`, leaving siblings untouched.
///
/// Returns `false` when no node matches.
pub fn update_at<F>(nodes: &mut [TaskNode], id: &str, apply: F) -> bool
where
    F: FnOnce(&mut TaskNode),
{
    match find_mut(nodes, id) {
        Some(node) => {
            apply(node);
            true
        }
        None => false,
    }
}

/// Detaches and returns the subtree rooted at `id`.
pub fn remove_at(nodes: &mut Vec<TaskNode>, id: &str) -> Option<TaskNode> {
    if let Some(position) = nodes.iter().position(|node| node.id == id) {
        return Some(nodes.remove(position));
    }
    for node in nodes.iter_mut() {
        if let Some(removed) = remove_at(&mut node.subtasks, id) {
            return Some(removed);
        }
    }
    None
}

/// Ids of `node` and all of its descendants in pre-order.
pub fn subtree_ids(node: &TaskNode) -> Vec<String> {
    let mut ids = Vec::new();
    collect_ids(node, &mut ids);
    ids
}

fn collect_ids(node: &TaskNode, ids: &mut Vec<String>) {
    ids.push(node.id.clone());
    for child in &node.subtasks {
        collect_ids(child, ids);
    }
}

/// Checks level invariants and global id uniqueness for a forest.
pub fn validate(nodes: &[TaskNode]) -> Result<(), TreeError> {
    let mut seen = HashSet::new();
    for node in nodes {
        if node.parent_id.is_none() && node.level != TaskLevel::Root {
            return Err(TreeError::DetachedSubtask(node.id.clone()));
        }
        validate_node(node, &mut seen)?;
    }
    Ok(())
}

fn validate_node<'a>(node: &'a TaskNode, seen: &mut HashSet<&'a str>) -> Result<(), TreeError> {
    if !seen.insert(node.id.as_str()) {
        return Err(TreeError::DuplicateId(node.id.clone()));
    }
    if node.subtasks.is_empty() {
        return Ok(());
    }
    let Some(expected) = node.level.child() else {
        return Err(TreeError::LeafHasSubtasks(node.id.clone()));
    };
    for child in &node.subtasks {
        if child.level != expected {
            return Err(TreeError::LevelMismatch {
                id: child.id.clone(),
                expected: expected.as_u8(),
                actual: child.level.as_u8(),
            });
        }
        validate_node(child, seen)?;
    }
    Ok(())
}

/// Reshapes flat rows into nested trees.
///
/// Rows are expected in creation order; sibling order follows input order.
/// A row whose parent is not part of the input becomes a top-level entry.
pub fn assemble(rows: Vec<TaskNode>) -> Result<Vec<TaskNode>, TreeError> {
    let mut ids = HashSet::with_capacity(rows.len());
    for row in &rows {
        if !ids.insert(row.id.clone()) {
            return Err(TreeError::DuplicateId(row.id.clone()));
        }
    }

    let mut tops = Vec::new();
    let mut children: HashMap<String, Vec<TaskNode>> = HashMap::new();
    for row in rows {
        match row.parent_id.as_deref() {
            Some(parent) if ids.contains(parent) => {
                children.entry(parent.to_string()).or_default().push(row);
            }
            _ => tops.push(row),
        }
    }

    for top in tops.iter_mut() {
        attach(top, &mut children);
    }
    validate(&tops)?;
    Ok(tops)
}

fn attach(node: &mut TaskNode, children: &mut HashMap<String, Vec<TaskNode>>) {
    if let Some(mut kids) = children.remove(&node.id) {
        for kid in kids.iter_mut() {
            attach(kid, children);
        }
        node.subtasks = kids;
    }
}
