//! Keyboard navigation over a [`Tree`].
//!
//! Everything here is pure: the same tree, selection, key and viewport always
//! produce the same [`NavAction`].

use crate::models::NodePath;
use crate::tree::Tree;

/// Row height used when the shell does not report one.
pub const DEFAULT_NODE_HEIGHT: f64 = 24.0;

/// Space covered by the sticky header above the tree.
pub const HEADER_HEIGHT: f64 = 40.0;

/// Space covered by the footer below the tree.
pub const FOOTER_HEIGHT: f64 = 30.0;

/// Keys handled by the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeKey {
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
    Home,
    End,
    PageUp,
    PageDown,
    Enter,
    Space,
    ContextMenu,
    F10,
}

impl TreeKey {
    /// Parse a DOM-style key code.
    pub fn from_code(code: &str) -> Option<Self> {
        Some(match code {
            "ArrowUp" => Self::ArrowUp,
            "ArrowDown" => Self::ArrowDown,
            "ArrowLeft" => Self::ArrowLeft,
            "ArrowRight" => Self::ArrowRight,
            "Home" => Self::Home,
            "End" => Self::End,
            "PageUp" => Self::PageUp,
            "PageDown" => Self::PageDown,
            "Enter" => Self::Enter,
            "Space" => Self::Space,
            "ContextMenu" => Self::ContextMenu,
            "F10" => Self::F10,
            _ => return None,
        })
    }
}

/// A key press with the modifier the tree cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPress {
    pub key: TreeKey,
    pub shift: bool,
}

impl KeyPress {
    pub fn new(key: TreeKey) -> Self {
        Self { key, shift: false }
    }

    pub fn shift(key: TreeKey) -> Self {
        Self { key, shift: true }
    }
}

/// A screen position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Geometry of the scroll container hosting the tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Container left edge on screen
    pub left: f64,
    /// Container top edge on screen
    pub top: f64,
    pub width: f64,
    /// Visible height of the container
    pub client_height: f64,
    /// Current scroll offset
    pub scroll_top: f64,
    /// Rendered row height, if known
    pub node_height: Option<f64>,
}

impl Viewport {
    pub fn new(width: f64, client_height: f64) -> Self {
        Self { left: 0.0, top: 0.0, width, client_height, scroll_top: 0.0, node_height: None }
    }

    fn row_height(&self) -> f64 {
        match self.node_height {
            Some(h) if h > 0.0 => h,
            _ => DEFAULT_NODE_HEIGHT,
        }
    }

    /// Rows that fit in the visible height.
    pub fn page_size(&self) -> usize {
        (self.client_height / self.row_height()).floor().max(0.0) as usize
    }

    /// Content offset of the row at `visible_index`.
    pub fn row_top(&self, visible_index: usize) -> f64 {
        visible_index as f64 * self.row_height()
    }

    /// New scroll offset bringing a row into view, or `None` when it already
    /// sits inside the band left between header and footer.
    pub fn scroll_into_view(&self, visible_index: usize) -> Option<f64> {
        let node_top = self.row_top(visible_index);
        let node_bottom = node_top + self.row_height();
        let view_top = self.scroll_top + HEADER_HEIGHT;
        let view_bottom = view_top + self.client_height - HEADER_HEIGHT - FOOTER_HEIGHT;

        if node_top < view_top {
            Some((node_top - HEADER_HEIGHT).max(0.0))
        } else if node_bottom > view_bottom {
            Some(node_bottom - self.client_height + FOOTER_HEIGHT)
        } else {
            None
        }
    }

    /// Screen position of the centre of a row.
    pub fn row_center(&self, visible_index: usize) -> Point {
        let h = self.row_height();
        Point {
            x: self.left + self.width / 2.0,
            y: self.top + self.row_top(visible_index) - self.scroll_top + h / 2.0,
        }
    }
}

/// What a key press asks the controller to do.
#[derive(Debug, Clone, PartialEq)]
pub enum NavAction {
    /// Select a node, fetch its properties and scroll it into view
    Select(NodePath),
    /// Expand a collapsed node, loading children when needed
    Expand(NodePath),
    /// Collapse an expanded node
    Collapse(NodePath),
    /// Toggle expansion
    Toggle(NodePath),
    /// Open the node's context menu at a screen position
    ContextMenu { path: NodePath, at: Point },
}

fn visible(tree: &Tree, path: &[usize]) -> bool {
    tree.is_visible(path)
}

fn step(tree: &Tree, from: &[usize], count: usize, forward: bool) -> NodePath {
    let mut current = from.to_vec();
    for _ in 0..count {
        let next = if forward { tree.next_node(&current, visible) } else { tree.prev_node(&current, visible) };
        match next {
            Some(path) => current = path,
            None => break,
        }
    }
    current
}

/// Decide what a key press does.
pub fn plan(tree: &Tree, key: KeyPress, viewport: &Viewport) -> Option<NavAction> {
    match key.key {
        TreeKey::Home => return tree.first_node().map(NavAction::Select),
        TreeKey::End => {
            let last = tree.last_node()?;
            if tree.is_visible(&last) {
                return Some(NavAction::Select(last));
            }
            return tree.prev_node(&last, visible).map(NavAction::Select);
        }
        _ => {}
    }

    let selected = tree.selected()?.clone();
    let node = tree.get_node(&selected)?;

    match key.key {
        TreeKey::ArrowDown => tree.next_node(&selected, visible).map(NavAction::Select),
        TreeKey::ArrowUp => tree.prev_node(&selected, visible).map(NavAction::Select),
        TreeKey::ArrowRight => {
            if node.is_leaf {
                None
            } else if !node.is_expanded {
                Some(NavAction::Expand(selected))
            } else {
                tree.next_node(&selected, visible).map(NavAction::Select)
            }
        }
        TreeKey::ArrowLeft => {
            let level = Tree::level(&selected);
            if level == 1 {
                None
            } else if node.is_leaf || !node.is_expanded {
                tree.prev_node(&selected, |_, p| Tree::level(p) == level - 1).map(NavAction::Select)
            } else {
                Some(NavAction::Collapse(selected))
            }
        }
        TreeKey::PageDown => {
            let target = step(tree, &selected, viewport.page_size(), true);
            (target != selected).then_some(NavAction::Select(target))
        }
        TreeKey::PageUp => {
            let target = step(tree, &selected, viewport.page_size(), false);
            (target != selected).then_some(NavAction::Select(target))
        }
        TreeKey::Enter | TreeKey::Space => (!node.is_leaf).then_some(NavAction::Toggle(selected)),
        TreeKey::ContextMenu => Some(context_menu_at(tree, selected, viewport)),
        TreeKey::F10 if key.shift => Some(context_menu_at(tree, selected, viewport)),
        TreeKey::F10 | TreeKey::Home | TreeKey::End => None,
    }
}

fn context_menu_at(tree: &Tree, path: NodePath, viewport: &Viewport) -> NavAction {
    let index = visible_index(tree, &path).unwrap_or(0);
    NavAction::ContextMenu { at: viewport.row_center(index), path }
}

/// Row index of a visible node.
pub fn visible_index(tree: &Tree, path: &[usize]) -> Option<usize> {
    tree.visible_paths().iter().position(|p| p.as_slice() == path)
}
