//! Pinned-first ordering of sibling nodes.

use std::cmp::Ordering;

use crate::models::TreeNode;

/// Case-insensitive title order, ties broken by the raw title.
pub fn compare_titles(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b))
}

/// Order of `children` with pinned nodes first, each group by title.
/// `order[new_index] = old_index`.
pub fn pinned_order(children: &[TreeNode]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..children.len()).collect();
    order.sort_by(|&a, &b| {
        let (a, b) = (&children[a], &children[b]);
        b.data.pinned.cmp(&a.data.pinned).then_with(|| compare_titles(&a.title, &b.title))
    });
    order
}
