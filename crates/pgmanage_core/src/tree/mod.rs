//! Database-object tree.
//!
//! [`Tree`] is the synchronous node store addressed by [`NodePath`];
//! [`TreeController`] drives it against the backend.

pub mod controller;
pub mod drop;
pub mod navigation;
pub mod pin;

use chrono::{DateTime, Utc};

use crate::models::{NodeData, NodePath, TreeNode};

pub use controller::{KeyOutcome, LoaderRoute, MenuItem, NodeLoader, RestNodeLoader, TreeContext, TreeController};
pub use drop::{DropOutcome, DropTemplate};
pub use navigation::{KeyPress, NavAction, Point, TreeKey, Viewport};

/// Positional tree of nodes with one selected path.
#[derive(Debug, Clone)]
pub struct Tree {
    roots: Vec<TreeNode>,
    selected: Option<NodePath>,
    throttle: chrono::Duration,
}

impl Tree {
    /// Create a tree. Nodes refreshed less than `throttle` ago are not refetched.
    pub fn new(roots: Vec<TreeNode>, throttle: chrono::Duration) -> Self {
        Self { roots, selected: None, throttle }
    }

    pub fn roots(&self) -> &[TreeNode] {
        &self.roots
    }

    /// First root node.
    pub fn root_node(&self) -> Option<&TreeNode> {
        self.roots.first()
    }

    pub fn get_node(&self, path: &[usize]) -> Option<&TreeNode> {
        let (first, rest) = path.split_first()?;
        let mut node = self.roots.get(*first)?;
        for index in rest {
            node = node.children.get(*index)?;
        }
        Some(node)
    }

    pub fn get_node_mut(&mut self, path: &[usize]) -> Option<&mut TreeNode> {
        let (first, rest) = path.split_first()?;
        let mut node = self.roots.get_mut(*first)?;
        for index in rest {
            node = node.children.get_mut(*index)?;
        }
        Some(node)
    }

    // ========== Selection ==========

    /// Select a node. Returns false when the path does not exist.
    pub fn select(&mut self, path: &[usize]) -> bool {
        if self.get_node(path).is_none() {
            return false;
        }
        self.selected = Some(path.to_vec());
        true
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    pub fn selected(&self) -> Option<&NodePath> {
        self.selected.as_ref()
    }

    pub fn selected_node(&self) -> Option<&TreeNode> {
        self.selected.as_deref().and_then(|p| self.get_node(p))
    }

    // ========== Structure ==========

    /// Path of the first node, in pre-order, matching `pred`.
    pub fn find_path(&self, pred: impl Fn(&TreeNode) -> bool) -> Option<NodePath> {
        fn walk(nodes: &[TreeNode], pred: &dyn Fn(&TreeNode) -> bool, path: &mut NodePath) -> bool {
            for (i, node) in nodes.iter().enumerate() {
                path.push(i);
                if pred(node) || walk(&node.children, pred, path) {
                    return true;
                }
                path.pop();
            }
            false
        }
        let mut path = Vec::new();
        walk(&self.roots, &pred, &mut path).then_some(path)
    }

    /// Depth of a node; roots are level 1.
    pub fn level(path: &[usize]) -> usize {
        path.len()
    }

    pub fn parent_path(path: &[usize]) -> Option<NodePath> {
        match path.len() {
            0 | 1 => None,
            n => Some(path[..n - 1].to_vec()),
        }
    }

    pub fn get_parent_node(&self, path: &[usize]) -> Option<&TreeNode> {
        Self::parent_path(path).and_then(|p| self.get_node(&p))
    }

    /// Ancestor `depth` levels up; depth 0 is the node itself.
    pub fn get_parent_node_deep(&self, path: &[usize], depth: usize) -> Option<&TreeNode> {
        if depth > path.len() {
            return None;
        }
        self.get_node(&path[..path.len() - depth])
    }

    /// Replace a node's children.
    pub fn set_children(&mut self, path: &[usize], children: Vec<TreeNode>) -> bool {
        match self.get_node_mut(path) {
            Some(node) => {
                node.children = children;
                node.children_loaded = true;
                true
            }
            None => false,
        }
    }

    /// Append children to a node.
    pub fn insert_nodes(&mut self, path: &[usize], children: Vec<TreeNode>) -> bool {
        match self.get_node_mut(path) {
            Some(node) => {
                node.children.extend(children);
                true
            }
            None => false,
        }
    }

    /// Show the loading placeholder under a node.
    pub fn insert_spinner(&mut self, path: &[usize]) -> bool {
        match self.get_node_mut(path) {
            Some(node) => {
                if !node.children.iter().any(TreeNode::is_spinner) {
                    node.children.push(TreeNode::spinner());
                }
                true
            }
            None => false,
        }
    }

    /// Drop all children and forget they were loaded.
    pub fn remove_child_nodes(&mut self, path: &[usize]) {
        if let Some(node) = self.get_node_mut(path) {
            node.children.clear();
            node.children_loaded = false;
        }
        if let Some(selected) = &self.selected {
            if selected.len() > path.len() && selected.starts_with(path) {
                self.selected = Some(path.to_vec());
            }
        }
    }

    /// Remove a node. The selection follows: a removed selection moves to the
    /// parent, later siblings shift down by one.
    pub fn remove_node(&mut self, path: &[usize]) -> Option<TreeNode> {
        let (last, parent) = path.split_last()?;
        let siblings = if parent.is_empty() {
            &mut self.roots
        } else {
            &mut self.get_node_mut(parent)?.children
        };
        if *last >= siblings.len() {
            return None;
        }
        let removed = siblings.remove(*last);

        if let Some(selected) = self.selected.take() {
            self.selected = if selected.starts_with(path) {
                Self::parent_path(path)
            } else if selected.len() >= path.len()
                && selected[..parent.len()] == *parent
                && selected[parent.len()] > *last
            {
                let mut shifted = selected;
                shifted[parent.len()] -= 1;
                Some(shifted)
            } else {
                Some(selected)
            };
        }
        Some(removed)
    }

    /// Reorder a node's children. `order[new_index] = old_index`.
    pub fn reorder_children(&mut self, path: &[usize], order: &[usize]) -> bool {
        let Some(node) = self.get_node_mut(path) else {
            return false;
        };
        if order.len() != node.children.len() {
            return false;
        }
        let mut old: Vec<Option<TreeNode>> = node.children.drain(..).map(Some).collect();
        node.children = order.iter().filter_map(|&i| old.get_mut(i).and_then(Option::take)).collect();

        if let Some(selected) = &mut self.selected {
            if selected.len() > path.len() && selected.starts_with(path) {
                let depth = path.len();
                if let Some(new_index) = order.iter().position(|&i| i == selected[depth]) {
                    selected[depth] = new_index;
                }
            }
        }
        true
    }

    // ========== Expansion ==========

    pub fn expand(&mut self, path: &[usize]) {
        if let Some(node) = self.get_node_mut(path) {
            node.is_expanded = true;
        }
    }

    pub fn collapse(&mut self, path: &[usize]) {
        if let Some(node) = self.get_node_mut(path) {
            node.is_expanded = false;
        }
    }

    /// Flip expansion. Returns the new state.
    pub fn toggle(&mut self, path: &[usize]) -> Option<bool> {
        let node = self.get_node_mut(path)?;
        node.is_expanded = !node.is_expanded;
        Some(node.is_expanded)
    }

    /// Edit a node's data bag.
    pub fn update_data(&mut self, path: &[usize], f: impl FnOnce(&mut NodeData)) -> bool {
        match self.get_node_mut(path) {
            Some(node) => {
                f(&mut node.data);
                true
            }
            None => false,
        }
    }

    // ========== Refresh throttle ==========

    /// Whether a node's children should be refetched.
    ///
    /// Unforced calls within the throttle window return false and leave the
    /// node untouched; otherwise `last_update` is stamped with `now`.
    pub fn should_update_node(&mut self, path: &[usize], force: bool, now: DateTime<Utc>) -> bool {
        let throttle = self.throttle;
        let Some(node) = self.get_node_mut(path) else {
            return false;
        };
        if !force {
            if let Some(last) = node.data.last_update {
                if now - last < throttle {
                    return false;
                }
            }
        }
        node.data.last_update = Some(now);
        true
    }

    // ========== Traversal ==========

    /// Every path in depth-first pre-order.
    pub fn paths(&self) -> Vec<NodePath> {
        fn walk(nodes: &[TreeNode], prefix: &mut NodePath, out: &mut Vec<NodePath>) {
            for (i, node) in nodes.iter().enumerate() {
                prefix.push(i);
                out.push(prefix.clone());
                walk(&node.children, prefix, out);
                prefix.pop();
            }
        }
        let mut out = Vec::new();
        walk(&self.roots, &mut Vec::new(), &mut out);
        out
    }

    /// A node is visible when every ancestor is expanded.
    pub fn is_visible(&self, path: &[usize]) -> bool {
        if self.get_node(path).is_none() {
            return false;
        }
        (1..path.len()).all(|depth| self.get_node(&path[..depth]).is_some_and(|n| n.is_expanded))
    }

    /// Visible paths in display order.
    pub fn visible_paths(&self) -> Vec<NodePath> {
        self.paths().into_iter().filter(|p| self.is_visible(p)).collect()
    }

    /// Next node after `path` in depth-first order matching `pred`.
    pub fn next_node(&self, path: &[usize], pred: impl Fn(&Tree, &[usize]) -> bool) -> Option<NodePath> {
        let paths = self.paths();
        let start = paths.iter().position(|p| p.as_slice() == path)?;
        paths.into_iter().skip(start + 1).find(|p| pred(self, p))
    }

    /// Previous node before `path` in depth-first order matching `pred`.
    pub fn prev_node(&self, path: &[usize], pred: impl Fn(&Tree, &[usize]) -> bool) -> Option<NodePath> {
        let paths = self.paths();
        let start = paths.iter().position(|p| p.as_slice() == path)?;
        paths[..start].iter().rev().find(|p| pred(self, p)).cloned()
    }

    pub fn first_node(&self) -> Option<NodePath> {
        (!self.roots.is_empty()).then(|| vec![0])
    }

    /// Deepest last node, visible or not.
    pub fn last_node(&self) -> Option<NodePath> {
        self.paths().pop()
    }
}
