//! Tree controller: loads children, handles failures and reacts to events.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::dialect::Dialect;
use crate::emitter::{Emitter, Event, Subscription, Topic};
use crate::error::{ClientError, PasswordKind};
use crate::models::{ChangeDatabaseRequest, ConnectionId, NodeData, NodePath, TabId, TreeNode};
use crate::services::api::ScopedApi;
use crate::services::connections::ConnectionsStore;
use crate::services::reporter::{ConfirmRequest, ErrorReporter, PasswordPrompt};
use crate::services::settings::SettingsStore;
use crate::services::tabs::TabsStore;
use crate::tree::drop::{self, DropOutcome, DropTemplate};
use crate::tree::navigation::{self, KeyPress, NavAction, Point, Viewport};
use crate::tree::{pin, Tree};

/// Root title of the snippet tree, which has no properties pane.
const SNIPPETS_ROOT: &str = "Snippets";

// ========== Loading ==========

/// Source of a node's children.
#[async_trait]
pub trait NodeLoader: Send + Sync {
    async fn load_children(&self, node: &TreeNode) -> Result<Vec<TreeNode>, ClientError>;
}

/// How children of one node type are obtained.
#[derive(Debug, Clone)]
pub enum LoaderRoute {
    /// POST to an endpoint returning a list of objects
    Remote {
        /// Endpoint path
        endpoint: String,
        /// Type given to each returned child
        child_type: String,
        /// Children are leaves
        leaf: bool,
    },
    /// Fixed children, e.g. the object categories under a schema
    Static(Vec<TreeNode>),
}

/// Loader calling the dialect's tree endpoints.
///
/// Node types without an explicit route follow the list convention:
/// `table_list` loads `/get_tables_{dialect}/` and yields `table` nodes.
pub struct RestNodeLoader {
    api: ScopedApi,
    dialect: Dialect,
    routes: HashMap<String, LoaderRoute>,
}

impl RestNodeLoader {
    pub fn new(api: ScopedApi, dialect: Dialect) -> Self {
        Self { api, dialect, routes: HashMap::new() }
    }

    /// Register how a node type loads its children.
    pub fn route(mut self, node_type: impl Into<String>, route: LoaderRoute) -> Self {
        self.routes.insert(node_type.into(), route);
        self
    }

    fn resolve(&self, node_type: &str) -> Option<LoaderRoute> {
        if let Some(route) = self.routes.get(node_type) {
            return Some(route.clone());
        }
        let child_type = node_type.strip_suffix("_list")?;
        Some(LoaderRoute::Remote {
            endpoint: self.dialect.endpoint(&format!("get_{child_type}s")),
            child_type: child_type.to_string(),
            leaf: false,
        })
    }

    fn child_from_value(parent: &TreeNode, child_type: &str, leaf: bool, item: Value) -> Option<TreeNode> {
        let mut node = if item.get("title").is_some() {
            serde_json::from_value::<TreeNode>(item).ok()?
        } else {
            let mut fields = match item {
                Value::Object(fields) => fields,
                other => {
                    let title = other.as_str()?.to_string();
                    return Some(inherit(parent, TreeNode { is_leaf: leaf, ..TreeNode::new(title, child_type) }));
                }
            };
            let title = match fields.remove("name") {
                Some(Value::String(name)) => name,
                Some(other) => other.to_string(),
                None => return None,
            };
            let mut node = TreeNode { is_leaf: leaf, ..TreeNode::new(title, child_type) };
            if let Some(Value::String(schema)) = fields.remove("schema") {
                node.data.schema = Some(schema);
            }
            node.data.extra = fields;
            node
        };
        if node.data.node_type.is_empty() {
            node.data.node_type = child_type.to_string();
        }
        if node.data.context_menu.is_none() {
            node.data.context_menu = Some(format!("cm_{}", node.data.node_type));
        }
        Some(inherit(parent, node))
    }
}

/// Copy the owning database and schema down from the parent.
fn inherit(parent: &TreeNode, mut child: TreeNode) -> TreeNode {
    if child.data.database.is_none() {
        child.data.database = parent.data.database.clone();
    }
    if child.data.schema.is_none() {
        child.data.schema = if parent.data.node_type == "schema" {
            Some(parent.title.clone())
        } else {
            parent.data.schema.clone()
        };
    }
    child
}

#[async_trait]
impl NodeLoader for RestNodeLoader {
    async fn load_children(&self, node: &TreeNode) -> Result<Vec<TreeNode>, ClientError> {
        let route = self.resolve(&node.data.node_type).ok_or_else(|| {
            ClientError::invalid_state(format!("No loader for node type '{}'", node.data.node_type))
        })?;

        match route {
            LoaderRoute::Static(children) => {
                Ok(children.into_iter().map(|c| inherit(node, c)).collect())
            }
            LoaderRoute::Remote { endpoint, child_type, leaf } => {
                let body = json!({
                    "database": node.data.database,
                    "schema": node.data.schema,
                    "table": node.data.extra.get("table"),
                    "object": node.title,
                });
                let items = match self.api.post_json(&endpoint, body).await? {
                    Value::Array(items) => items,
                    Value::Object(mut map) => match map.remove("data") {
                        Some(Value::Array(items)) => items,
                        _ => Vec::new(),
                    },
                    _ => Vec::new(),
                };
                Ok(items
                    .into_iter()
                    .filter_map(|item| Self::child_from_value(node, &child_type, leaf, item))
                    .collect())
            }
        }
    }
}

// ========== Context menus ==========

/// An entry of a node context menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuItem {
    pub label: String,
    /// Action identifier handed back to the shell
    pub action: String,
    pub icon: Option<String>,
    pub children: Vec<MenuItem>,
}

impl MenuItem {
    pub fn new(label: impl Into<String>, action: impl Into<String>) -> Self {
        Self { label: label.into(), action: action.into(), icon: None, children: Vec::new() }
    }

    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn submenu(mut self, children: Vec<MenuItem>) -> Self {
        self.children = children;
        self
    }

    /// The refresh entry shared by every menu.
    pub fn refresh() -> Self {
        Self::new("Refresh", "refresh").icon("fas fa-sync-alt")
    }
}

// ========== Controller ==========

/// Shared services a tree controller needs.
#[derive(Clone)]
pub struct TreeContext {
    pub connections: Arc<ConnectionsStore>,
    pub tabs: Arc<TabsStore>,
    pub emitter: Emitter,
    pub runtime: tokio::runtime::Handle,
    /// Nodes refreshed more recently than this are not refetched
    pub throttle: chrono::Duration,
    /// Quiet period before properties of the selection are fetched
    pub properties_debounce: Duration,
    /// User settings, read live
    pub settings: Arc<SettingsStore>,
}

/// Drives one workspace's tree.
pub struct TreeController {
    workspace_id: TabId,
    dialect: Dialect,
    api: ScopedApi,
    loader: Arc<dyn NodeLoader>,
    ctx: TreeContext,
    tree: RwLock<Tree>,
    context_menus: RwLock<HashMap<String, Vec<MenuItem>>>,
    next_seq: AtomicU64,
    properties_generation: AtomicU64,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl TreeController {
    pub fn new(
        ctx: TreeContext,
        api: ScopedApi,
        dialect: Dialect,
        loader: Arc<dyn NodeLoader>,
        roots: Vec<TreeNode>,
    ) -> Arc<Self> {
        Arc::new(Self {
            workspace_id: api.workspace_id(),
            dialect,
            tree: RwLock::new(Tree::new(roots, ctx.throttle)),
            api,
            loader,
            ctx,
            context_menus: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
            properties_generation: AtomicU64::new(0),
            subscriptions: Mutex::new(Vec::new()),
        })
    }

    pub fn workspace_id(&self) -> TabId {
        self.workspace_id
    }

    pub fn database_index(&self) -> ConnectionId {
        self.api.database_index()
    }

    fn reporter(&self) -> &Arc<ErrorReporter> {
        self.api.api().reporter()
    }

    /// Read access to the tree.
    pub fn with_tree<R>(&self, f: impl FnOnce(&Tree) -> R) -> R {
        f(&self.tree.read())
    }

    pub fn get_node(&self, path: &[usize]) -> Option<TreeNode> {
        self.tree.read().get_node(path).cloned()
    }

    pub fn selected_path(&self) -> Option<NodePath> {
        self.tree.read().selected().cloned()
    }

    /// Database currently selected in the workspace.
    pub fn selected_database(&self) -> Option<String> {
        self.ctx.tabs.get_tab(self.workspace_id).and_then(|t| t.meta.selected_database)
    }

    /// Edit a node's data bag.
    pub fn update_node_data(&self, path: &[usize], f: impl FnOnce(&mut NodeData)) -> bool {
        self.tree.write().update_data(path, f)
    }

    pub fn format_title(&self, path: &[usize]) -> Option<String> {
        self.tree.read().get_node(path).map(TreeNode::format_title)
    }

    // ========== Event bindings ==========

    /// Subscribe to the workspace's tree topics.
    pub fn bind(self: &Arc<Self>) {
        let mut subs = self.subscriptions.lock();
        if !subs.is_empty() {
            return;
        }
        let ws = self.workspace_id;

        let weak = Arc::downgrade(self);
        subs.push(self.ctx.emitter.on(Topic::RefreshNode(ws), move |event| {
            if let Event::RefreshNode { path, .. } = event {
                Self::spawn_refresh(&weak, path.clone());
            }
        }));

        let weak = Arc::downgrade(self);
        subs.push(self.ctx.emitter.on(Topic::RemoveNode(ws), move |event| {
            if let (Event::RemoveNode { path, .. }, Some(this)) = (event, weak.upgrade()) {
                this.remove_node(path);
            }
        }));

        let weak = Arc::downgrade(self);
        subs.push(self.ctx.emitter.on(Topic::RefreshTreeRecursive(ws), move |event| {
            if let (Event::RefreshTreeRecursive { node_type, .. }, Some(this)) = (event, weak.upgrade()) {
                let node_type = node_type.clone();
                this.ctx.runtime.clone().spawn(async move {
                    this.refresh_tree_recursive(&node_type).await;
                });
            }
        }));
        tracing::debug!(workspace_id = %ws, "Tree bound to events");
    }

    /// Drop the event subscriptions.
    pub fn unbind(&self) {
        let mut subs = self.subscriptions.lock();
        if !subs.is_empty() {
            subs.clear();
            tracing::debug!(workspace_id = %self.workspace_id, "Tree unbound from events");
        }
    }

    fn spawn_refresh(weak: &Weak<Self>, path: NodePath) {
        let Some(this) = weak.upgrade() else {
            return;
        };
        this.ctx.runtime.clone().spawn(async move {
            // Failures were already presented
            let _ = this.refresh_tree(&path, true).await;
        });
    }

    // ========== Loading ==========

    /// Reload a node's children.
    ///
    /// Returns `Ok(false)` when throttled or when the response was superseded
    /// by a newer request for the same node. A password timeout prompts for
    /// the credential and retries once on the selected node.
    pub async fn refresh_tree(&self, path: &[usize], force: bool) -> Result<bool, ClientError> {
        let err = match self.load_children(path, force).await {
            Err(e) if e.is_password_timeout() => e,
            Err(e) => {
                self.reporter().handle_error(&e);
                return Err(e);
            }
            ok => return ok,
        };

        if !self.renew_credential(&err).await {
            return Err(err);
        }

        let target = self.selected_path().unwrap_or_else(|| path.to_vec());
        self.tree.write().expand(&target);
        self.load_children(&target, true).await.inspect_err(|e| self.reporter().handle_error(e))
    }

    /// Expand and force-refresh the selected node.
    pub async fn refresh_node(&self) -> Result<bool, ClientError> {
        let Some(path) = self.selected_path() else {
            return Ok(false);
        };
        self.tree.write().expand(&path);
        self.refresh_tree(&path, true).await
    }

    async fn load_children(&self, path: &[usize], force: bool) -> Result<bool, ClientError> {
        let (seq, snapshot) = {
            let mut tree = self.tree.write();
            if tree.get_node(path).map_or(true, |n| n.is_leaf) {
                return Ok(false);
            }
            if !tree.should_update_node(path, force, Utc::now()) {
                tracing::trace!(?path, "Refresh throttled");
                return Ok(false);
            }
            let seq = self.next_seq.fetch_add(1, Ordering::SeqCst) + 1;
            tree.insert_spinner(path);
            let Some(node) = tree.get_node_mut(path) else {
                return Ok(false);
            };
            node.data.request_seq = seq;
            (seq, node.clone())
        };

        tracing::debug!(workspace_id = %self.workspace_id, ?path, node_type = %snapshot.data.node_type, "Loading children");
        let result = self.loader.load_children(&snapshot).await;

        // The node may have moved while loading; find it by seq
        let mut tree = self.tree.write();
        let Some(path) = tree.find_path(|n| n.data.request_seq == seq) else {
            tracing::debug!(?path, seq, "Discarding stale children response");
            return Ok(false);
        };

        match result {
            Ok(children) => {
                tracing::debug!(?path, count = children.len(), "Children loaded");
                tree.set_children(&path, children);
                Ok(true)
            }
            Err(e) => {
                tracing::warn!(?path, error = %e, "Loading children failed");
                tree.remove_child_nodes(&path);
                tree.collapse(&path);
                tree.update_data(&path, |data| data.last_update = None);
                Err(e)
            }
        }
    }

    /// Prompt for an expired credential, renew it and re-issue the database
    /// switch. Returns whether the caller should retry.
    async fn renew_credential(&self, err: &ClientError) -> bool {
        let (message, kind) = match err {
            ClientError::PasswordTimeout { message, kind } => (message.clone(), *kind),
            _ => (err.to_string(), PasswordKind::default()),
        };
        let database_index = self.database_index();

        self.ctx.emitter.emit(Event::ShowPasswordPrompt { database_index, kind, message: message.clone() });
        let prompt = PasswordPrompt { database_index, kind, message };
        let Some(password) = self.reporter().notifier().prompt_password(prompt).await else {
            tracing::debug!(database_index, "Password prompt cancelled");
            return false;
        };

        if let Err(e) = self.api.api().renew_password(database_index, &password, kind).await {
            self.reporter().handle_error(&e);
            return false;
        }

        if let Some(database) = self.selected_database() {
            self.ctx.connections.queue_change_active_database(ChangeDatabaseRequest {
                database_index,
                workspace_id: self.workspace_id,
                database,
            });
        }
        tracing::info!(database_index, kind = kind.as_str(), "Credential renewed");
        true
    }

    /// Refresh every node of `node_type` below the selected database, one
    /// level at a time.
    pub async fn refresh_tree_recursive(&self, node_type: &str) {
        let database = self.selected_database();
        let mut stack: Vec<NodePath> = {
            let tree = self.tree.read();
            let root_children = tree.root_node().map_or(0, |r| r.children.len());
            (0..root_children).rev().map(|i| vec![0, i]).collect()
        };

        while let Some(path) = stack.pop() {
            let matches = self.get_node(&path).is_some_and(|n| n.data.node_type == node_type);
            if matches {
                let _ = self.refresh_tree(&path, true).await;
                self.tree.write().expand(&path);
            }

            let Some(node) = self.get_node(&path) else {
                continue;
            };
            for (i, child) in node.children.iter().enumerate().rev() {
                if child.data.database != database {
                    continue;
                }
                let mut child_path = path.clone();
                child_path.push(i);
                if child.data.node_type == "database" && node_type == "extension_list" {
                    let _ = self.refresh_tree(&child_path, true).await;
                }
                stack.push(child_path);
            }
        }
    }

    // ========== User actions ==========

    /// Select a node and schedule its properties.
    pub fn click(self: &Arc<Self>, path: &[usize]) -> bool {
        if !self.tree.write().select(path) {
            return false;
        }
        self.schedule_properties(path.to_vec());
        true
    }

    /// Expand a node, loading children if stale.
    pub async fn expand(self: &Arc<Self>, path: &[usize]) -> Result<bool, ClientError> {
        self.tree.write().expand(path);
        self.refresh_tree(path, false).await
    }

    pub fn collapse(&self, path: &[usize]) {
        self.tree.write().collapse(path);
    }

    /// Select and flip expansion; expanding loads children unless throttled.
    pub async fn toggle(self: &Arc<Self>, path: &[usize]) -> Result<(), ClientError> {
        let expanded = {
            let mut tree = self.tree.write();
            if !tree.select(path) {
                return Err(ClientError::invalid_state(format!("Node {path:?} not found")));
            }
            tree.get_node(path).is_some_and(|n| n.is_expanded)
        };
        self.schedule_properties(path.to_vec());

        if expanded {
            self.tree.write().collapse(path);
            return Ok(());
        }
        self.tree.write().expand(path);
        self.refresh_tree(path, false).await.map(|_| ())
    }

    /// Double click toggles non-leaf nodes.
    pub async fn double_click(self: &Arc<Self>, path: &[usize]) -> Result<(), ClientError> {
        if self.get_node(path).map_or(true, |n| n.is_leaf) {
            return Ok(());
        }
        self.toggle(path).await
    }

    /// Expand, loading children only if there are none.
    pub async fn expand_and_refresh_if_needed(&self, path: &[usize]) -> Result<(), ClientError> {
        let empty = self.get_node(path).is_some_and(|n| n.children.is_empty());
        if empty {
            self.refresh_tree(path, true).await?;
        }
        self.tree.write().expand(path);
        Ok(())
    }

    pub fn remove_node(&self, path: &[usize]) -> Option<TreeNode> {
        let removed = self.tree.write().remove_node(path);
        if removed.is_some() {
            tracing::debug!(workspace_id = %self.workspace_id, ?path, "Node removed");
        }
        removed
    }

    pub fn remove_child_nodes(&self, path: &[usize]) {
        self.tree.write().remove_child_nodes(path);
    }

    // ========== Keyboard ==========

    /// Handle a key press. Returns the new scroll offset when the selection
    /// must be scrolled into view, and the context menu request if any.
    ///
    /// A new selection is always kept in view. Expanding a node scrolls to it
    /// only when the `scroll_tree` setting is on.
    pub async fn handle_key(
        self: &Arc<Self>,
        key: KeyPress,
        viewport: &Viewport,
    ) -> Result<KeyOutcome, ClientError> {
        let action = self.with_tree(|tree| navigation::plan(tree, key, viewport));
        let Some(action) = action else {
            return Ok(KeyOutcome::default());
        };

        match action {
            NavAction::Select(path) => {
                self.click(&path);
                let scroll_to = self.scroll_offset(&path, viewport);
                Ok(KeyOutcome { scroll_to, context_menu: None })
            }
            NavAction::Expand(path) | NavAction::Toggle(path) => {
                let was_expanded = self.get_node(&path).is_some_and(|n| n.is_expanded);
                self.toggle(&path).await?;
                let scroll_to = if !was_expanded && self.ctx.settings.scroll_tree() {
                    self.scroll_offset(&path, viewport)
                } else {
                    None
                };
                Ok(KeyOutcome { scroll_to, context_menu: None })
            }
            NavAction::Collapse(path) => {
                self.collapse(&path);
                Ok(KeyOutcome::default())
            }
            NavAction::ContextMenu { path, at } => {
                let context_menu = self.context_menu(&path).map(|items| (items, at));
                Ok(KeyOutcome { scroll_to: None, context_menu })
            }
        }
    }

    fn scroll_offset(&self, path: &[usize], viewport: &Viewport) -> Option<f64> {
        self.with_tree(|tree| navigation::visible_index(tree, path))
            .and_then(|i| viewport.scroll_into_view(i))
    }

    // ========== Context menus ==========

    /// Register the menu shown for nodes whose `contextMenu` key is `key`.
    pub fn register_context_menu(&self, key: impl Into<String>, items: Vec<MenuItem>) {
        self.context_menus.write().insert(key.into(), items);
    }

    /// Select a node and return its context menu items.
    pub fn context_menu(&self, path: &[usize]) -> Option<Vec<MenuItem>> {
        let key = {
            let mut tree = self.tree.write();
            if !tree.select(path) {
                return None;
            }
            tree.get_node(path)?.data.context_menu.clone()?
        };
        let items = self.context_menus.read().get(&key).cloned();
        if items.is_none() {
            tracing::debug!(key = %key, "No context menu registered");
        }
        items
    }

    // ========== Properties ==========

    /// Fetch properties of `path` after the debounce period, unless another
    /// selection supersedes it first.
    pub fn schedule_properties(self: &Arc<Self>, path: NodePath) {
        let is_snippets = self.with_tree(|t| t.root_node().is_some_and(|r| r.title == SNIPPETS_ROOT));
        if is_snippets {
            return;
        }
        let generation = self.properties_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let this = Arc::clone(self);
        let delay = self.ctx.properties_debounce;
        self.ctx.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if this.properties_generation.load(Ordering::SeqCst) != generation {
                return;
            }
            let _ = this.load_properties(&path).await;
        });
    }

    /// Fetch properties and DDL of a node and publish them.
    pub async fn load_properties(&self, path: &[usize]) -> Result<(), ClientError> {
        let Some(node) = self.get_node(path) else {
            return Ok(());
        };
        let data = json!({
            "schema": node.data.schema,
            "table": node.data.extra.get("table"),
            "object": node.title,
            "type": node.data.node_type,
        });
        match self.api.get_properties(self.dialect, data).await {
            Ok(properties) => {
                let properties = serde_json::to_value(&properties)?;
                self.ctx.emitter.emit(Event::PropertiesLoaded {
                    workspace_id: self.workspace_id,
                    path: path.to_vec(),
                    properties,
                });
                Ok(())
            }
            Err(e) => {
                self.reporter().handle_error(&e);
                Err(e)
            }
        }
    }

    // ========== Drop and pin ==========

    /// Ask for confirmation, then run a drop template against the node.
    pub async fn drop_node(&self, path: &[usize], template: &str) -> Result<DropOutcome, ClientError> {
        let node = self
            .get_node(path)
            .ok_or_else(|| ClientError::invalid_state(format!("Node {path:?} not found")))?;
        let parsed = DropTemplate::parse(template);

        let request = ConfirmRequest::new("Drop", drop::drop_message(&node))
            .confirm_label("Drop")
            .with_options(parsed.options.iter().cloned());
        let Some(answer) = self.reporter().notifier().confirm(request).await else {
            return Ok(DropOutcome::Cancelled);
        };

        let query = parsed.build(&answer.checked);
        if let Err(e) = self.api.execute_query(self.dialect, &query).await {
            self.reporter().handle_error(&e);
            return Err(e);
        }
        tracing::info!(node_type = %node.data.node_type, title = %node.title, "Object dropped");

        let parent = Tree::parent_path(path);
        if drop::is_cascade(&answer.checked) {
            if let Some(parent) = parent {
                self.refresh_tree(&parent, true).await?;
            }
            return Ok(DropOutcome::ParentRefreshed);
        }

        let mut tree = self.tree.write();
        let still_there = tree
            .get_node(path)
            .is_some_and(|n| n.title == node.title && n.data.node_type == node.data.node_type);
        if still_there {
            tree.remove_node(path);
        }
        if let Some(parent) = parent.and_then(|p| tree.get_node_mut(&p)) {
            parent.title = drop::decrement_count_suffix(&parent.title);
        }
        Ok(DropOutcome::Removed)
    }

    /// Toggle a database's pinned flag and re-sort its siblings.
    pub async fn pin_database(&self, path: &[usize]) -> Result<bool, ClientError> {
        let node = self
            .get_node(path)
            .ok_or_else(|| ClientError::invalid_state(format!("Node {path:?} not found")))?;
        let pinned = !node.data.pinned;

        if let Err(e) = self.api.api().pin_database(self.database_index(), &node.title, pinned).await {
            self.node_open_error(&e, path).await;
            return Err(e);
        }

        let mut tree = self.tree.write();
        tree.update_data(path, |data| data.pinned = pinned);
        if let Some(parent) = Tree::parent_path(path) {
            let order = tree.get_node(&parent).map(|p| pin::pinned_order(&p.children));
            if let Some(order) = order {
                tree.reorder_children(&parent, &order);
            }
        }
        tracing::debug!(database = %node.title, pinned, "Database pin toggled");
        Ok(pinned)
    }

    /// Failure of an action on a node: password timeouts prompt and retry,
    /// anything else clears the node's children and toasts.
    async fn node_open_error(&self, err: &ClientError, path: &[usize]) {
        if err.is_password_timeout() {
            if self.renew_credential(err).await {
                let _ = self.refresh_node().await;
            }
        } else {
            self.remove_child_nodes(path);
            self.reporter().handle_error(err);
        }
    }
}

impl std::fmt::Debug for TreeController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeController")
            .field("workspace_id", &self.workspace_id)
            .field("dialect", &self.dialect)
            .finish_non_exhaustive()
    }
}

/// Result of a key press.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyOutcome {
    /// Scroll offset to apply
    pub scroll_to: Option<f64>,
    /// Context menu to open
    pub context_menu: Option<(Vec<MenuItem>, Point)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DrainOrder;
    use crate::models::{Connection, Technology};
    use crate::services::api::Api;
    use crate::services::reporter::{ConfirmResponse, ToastLevel};
    use crate::test_support::{MockTransport, RecordingNotifier};
    use crate::tree::navigation::TreeKey;

    const TABLES: &str = "/get_tables_postgresql/";

    struct Fixture {
        transport: Arc<MockTransport>,
        notifier: Arc<RecordingNotifier>,
        emitter: Emitter,
        tree: Arc<TreeController>,
    }

    fn fixture_with(debounce: Duration) -> Fixture {
        let transport = Arc::new(MockTransport::new());
        transport.set_fallback("/get_properties_postgresql/", json!({ "properties": [], "ddl": "" }));
        let notifier = Arc::new(RecordingNotifier::default());
        let api = Api::new(transport.clone(), Arc::new(ErrorReporter::new(notifier.clone())));
        let tabs = Arc::new(TabsStore::new());
        let emitter = Emitter::new();
        let runtime = tokio::runtime::Handle::current();

        let mut conn = Connection::new(1, "prod", Technology::Postgresql);
        conn.service = "app".into();
        let ws = tabs.create_connection_tab(&conn).unwrap();

        let connections = Arc::new(ConnectionsStore::new(
            api.clone(),
            tabs.clone(),
            emitter.clone(),
            runtime.clone(),
            DrainOrder::Lifo,
        ));
        let ctx = TreeContext {
            connections,
            tabs,
            emitter: emitter.clone(),
            runtime,
            throttle: chrono::Duration::seconds(60),
            properties_debounce: debounce,
            settings: Arc::new(SettingsStore::new(api.clone())),
        };

        let mut tables = TreeNode::new("Tables (3)", "table_list").with_database("app");
        tables.data.schema = Some("public".into());
        let mut schema = TreeNode::new("public", "schema").with_database("app");
        schema.is_expanded = true;
        schema.children = vec![tables];
        let mut root = TreeNode::new("prod", "server");
        root.is_expanded = true;
        root.children = vec![schema];

        let scoped = api.scoped(1, ws.id);
        let loader = Arc::new(RestNodeLoader::new(scoped.clone(), Dialect::Postgresql));
        let tree = TreeController::new(ctx, scoped, Dialect::Postgresql, loader, vec![root]);
        Fixture { transport, notifier, emitter, tree }
    }

    fn fixture() -> Fixture {
        fixture_with(Duration::from_millis(10))
    }

    fn three_tables() -> Value {
        json!([{ "name": "users", "oid": 1 }, { "name": "orders", "oid": 2 }, { "name": "items", "oid": 3 }])
    }

    const TABLE_LIST: [usize; 3] = [0, 0, 0];

    #[tokio::test]
    async fn test_first_expand_spinner_then_children() {
        let f = fixture();
        f.transport.respond(TABLES, three_tables());
        let gate = f.transport.pause(TABLES);

        let tree = f.tree.clone();
        let task = tokio::spawn(async move { tree.toggle(&TABLE_LIST).await });
        tokio::task::yield_now().await;

        let loading = f.tree.get_node(&TABLE_LIST).unwrap();
        assert_eq!(loading.state(), crate::models::NodeState::Loading);
        assert_eq!(loading.children.len(), 1);
        assert!(loading.children[0].is_spinner());

        gate.add_permits(1);
        task.await.unwrap().unwrap();

        let node = f.tree.get_node(&TABLE_LIST).unwrap();
        assert_eq!(node.state(), crate::models::NodeState::Expanded);
        let titles: Vec<_> = node.children.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["users", "orders", "items"]);
        assert_eq!(node.children[0].data.schema.as_deref(), Some("public"));
        assert_eq!(node.children[0].data.database.as_deref(), Some("app"));
        assert_eq!(node.children[0].data.context_menu.as_deref(), Some("cm_table"));

        let body = &f.transport.bodies(TABLES)[0];
        assert_eq!(body["schema"], json!("public"));
        assert_eq!(body["database_index"], json!(1));
    }

    #[tokio::test]
    async fn test_collapse_and_reexpand_does_not_refetch() {
        let f = fixture();
        f.transport.set_fallback(TABLES, three_tables());

        f.tree.toggle(&TABLE_LIST).await.unwrap();
        f.tree.toggle(&TABLE_LIST).await.unwrap();
        assert_eq!(f.tree.get_node(&TABLE_LIST).unwrap().state(), crate::models::NodeState::CollapsedLoaded);
        f.tree.toggle(&TABLE_LIST).await.unwrap();

        assert_eq!(f.transport.call_count(TABLES), 1);
        assert_eq!(f.tree.get_node(&TABLE_LIST).unwrap().children.len(), 3);

        assert!(f.tree.refresh_tree(&TABLE_LIST, true).await.unwrap());
        assert_eq!(f.transport.call_count(TABLES), 2);
    }

    #[tokio::test]
    async fn test_failure_clears_and_collapses() {
        let f = fixture();
        f.transport.fail(TABLES, 400, r#"{ "data": "permission denied for schema public" }"#);

        assert!(f.tree.toggle(&TABLE_LIST).await.is_err());
        let node = f.tree.get_node(&TABLE_LIST).unwrap();
        assert_eq!(node.state(), crate::models::NodeState::CollapsedUnloaded);
        assert!(node.data.last_update.is_none());
        assert_eq!(
            f.notifier.toasts(),
            vec![(ToastLevel::Error, "permission denied for schema public".to_string())]
        );

        // Not throttled after a failure
        f.transport.respond(TABLES, three_tables());
        f.tree.toggle(&TABLE_LIST).await.unwrap();
        assert_eq!(f.tree.get_node(&TABLE_LIST).unwrap().children.len(), 3);
    }

    #[tokio::test]
    async fn test_stale_response_is_discarded() {
        let f = fixture();
        f.transport.respond(TABLES, json!([{ "name": "old" }]));
        f.transport.respond(TABLES, json!([{ "name": "new" }]));
        f.transport.set_delay(TABLES, Duration::from_millis(20));

        let slow = f.tree.clone();
        let first = tokio::spawn(async move { slow.refresh_tree(&TABLE_LIST, true).await });
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(f.tree.refresh_tree(&TABLE_LIST, true).await.unwrap());
        assert!(!first.await.unwrap().unwrap());

        let node = f.tree.get_node(&TABLE_LIST).unwrap();
        assert_eq!(node.children.len(), 1);
        assert_eq!(node.children[0].title, "new");
    }

    #[tokio::test]
    async fn test_response_follows_node_moved_by_sibling_removal() {
        let f = fixture();
        {
            let mut tree = f.tree.tree.write();
            tree.insert_nodes(&[0, 0], vec![TreeNode::leaf("orders_seq", "sequence")]);
            tree.reorder_children(&[0, 0], &[1, 0]);
        }
        f.transport.respond(TABLES, three_tables());
        let gate = f.transport.pause(TABLES);

        let tree = f.tree.clone();
        let task = tokio::spawn(async move { tree.toggle(&[0, 0, 1]).await });
        tokio::task::yield_now().await;
        assert_eq!(f.tree.get_node(&[0, 0, 1]).unwrap().state(), crate::models::NodeState::Loading);

        f.tree.remove_node(&[0, 0, 0]);
        gate.add_permits(1);
        task.await.unwrap().unwrap();

        let node = f.tree.get_node(&TABLE_LIST).unwrap();
        assert_eq!(node.title, "Tables (3)");
        assert_eq!(node.state(), crate::models::NodeState::Expanded);
        assert_eq!(node.children.len(), 3);
        assert!(!node.children.iter().any(TreeNode::is_spinner));
    }

    #[tokio::test]
    async fn test_password_timeout_prompts_and_retries_once() {
        let f = fixture();
        let timeout = r#"{ "data": "Password timeout", "password_timeout": true, "kind": "database" }"#;
        f.transport.fail(TABLES, 400, timeout);
        f.transport.fail(TABLES, 400, timeout);
        f.notifier.answer_password(Some("s3cret"));

        let prompted = Arc::new(Mutex::new(0));
        let counter = prompted.clone();
        let _sub = f.emitter.on(Topic::ShowPasswordPrompt, move |_| *counter.lock() += 1);

        f.tree.click(&TABLE_LIST);
        let result = f.tree.toggle(&TABLE_LIST).await;
        assert!(result.unwrap_err().is_password_timeout());

        assert_eq!(*prompted.lock(), 1);
        assert_eq!(f.notifier.prompts().len(), 1);
        assert_eq!(
            f.transport.bodies("/renew_password/")[0],
            json!({ "database_index": 1, "password": "s3cret", "password_kind": "database" })
        );
        // First request plus exactly one retry
        assert_eq!(f.transport.call_count(TABLES), 2);

        f.tree.ctx.connections.wait_database_switches_idle().await;
        assert_eq!(f.transport.bodies("/change_active_database/")[0]["database"], json!("app"));
    }

    #[tokio::test]
    async fn test_password_prompt_cancelled_does_not_retry() {
        let f = fixture();
        f.transport.fail(TABLES, 400, r#"{ "data": "Password timeout", "password_timeout": true }"#);

        assert!(f.tree.toggle(&TABLE_LIST).await.is_err());
        assert_eq!(f.transport.call_count(TABLES), 1);
        assert_eq!(f.transport.call_count("/renew_password/"), 0);
    }

    #[tokio::test]
    async fn test_drop_without_cascade_removes_node() {
        let f = fixture();
        f.transport.respond(TABLES, three_tables());
        f.tree.toggle(&TABLE_LIST).await.unwrap();

        let outcome = f
            .tree
            .drop_node(&[0, 0, 0, 1], "-- Drop table\nDROP TABLE public.orders\n--CASCADE")
            .await
            .unwrap();
        assert_eq!(outcome, DropOutcome::Removed);

        let list = f.tree.get_node(&TABLE_LIST).unwrap();
        assert_eq!(list.title, "Tables (2)");
        assert_eq!(list.children.iter().map(|c| c.title.as_str()).collect::<Vec<_>>(), vec!["users", "items"]);
        assert_eq!(
            f.transport.bodies("/execute_query_postgresql/")[0]["query"],
            json!("DROP TABLE public.orders\n--CASCADE")
        );

        let confirm = &f.notifier.confirms()[0];
        assert_eq!(confirm.message, "Are you sure you want to drop table 'orders'?");
        assert!(confirm.options.iter().all(|o| !o.checked));
    }

    #[tokio::test]
    async fn test_drop_with_cascade_refreshes_parent() {
        let f = fixture();
        f.transport.respond(TABLES, three_tables());
        f.tree.toggle(&TABLE_LIST).await.unwrap();
        f.transport.respond(TABLES, json!([{ "name": "users" }]));
        f.notifier.answer_confirm(Some(ConfirmResponse { checked: vec!["CASCADE".into()] }));

        let outcome = f
            .tree
            .drop_node(&[0, 0, 0, 1], "-- Drop table\nDROP TABLE public.orders\n--CASCADE")
            .await
            .unwrap();
        assert_eq!(outcome, DropOutcome::ParentRefreshed);
        assert_eq!(
            f.transport.bodies("/execute_query_postgresql/")[0]["query"],
            json!("DROP TABLE public.orders\nCASCADE")
        );
        assert_eq!(f.transport.call_count(TABLES), 2);
        assert_eq!(f.tree.get_node(&TABLE_LIST).unwrap().children.len(), 1);
    }

    #[tokio::test]
    async fn test_drop_declined() {
        let f = fixture();
        f.transport.respond(TABLES, three_tables());
        f.tree.toggle(&TABLE_LIST).await.unwrap();
        f.notifier.answer_confirm(None);

        let outcome = f.tree.drop_node(&[0, 0, 0, 0], "DROP TABLE users").await.unwrap();
        assert_eq!(outcome, DropOutcome::Cancelled);
        assert_eq!(f.transport.call_count("/execute_query_postgresql/"), 0);
    }

    #[tokio::test]
    async fn test_pin_database_sorts_siblings() {
        let f = fixture();
        let mut dbs = TreeNode::new("Databases", "database_list");
        dbs.children = vec![
            TreeNode::new("zeta", "database"),
            TreeNode::new("Alpha", "database"),
            TreeNode::new("mid", "database"),
        ];
        f.tree.tree.write().insert_nodes(&[0], vec![dbs]);
        f.tree.click(&[0, 1, 0]);

        assert!(f.tree.pin_database(&[0, 1, 0]).await.unwrap());
        let titles = f.tree.with_tree(|t| {
            t.get_node(&[0, 1]).map(|n| n.children.iter().map(|c| c.title.clone()).collect::<Vec<_>>())
        });
        assert_eq!(titles, Some(vec!["zeta".to_string(), "Alpha".to_string(), "mid".to_string()]));
        assert_eq!(f.tree.selected_path(), Some(vec![0, 1, 0]));

        f.tree.click(&[0, 1, 2]);
        assert!(f.tree.pin_database(&[0, 1, 2]).await.unwrap());
        let titles = f.tree.with_tree(|t| {
            t.get_node(&[0, 1]).map(|n| n.children.iter().map(|c| c.title.clone()).collect::<Vec<_>>())
        });
        assert_eq!(titles, Some(vec!["mid".to_string(), "zeta".to_string(), "Alpha".to_string()]));
        assert_eq!(f.tree.selected_path(), Some(vec![0, 1, 0]));
        assert_eq!(
            f.transport.bodies("/pin_database/")[1],
            json!({ "database_index": 1, "database_name": "mid", "pinned": true })
        );
    }

    #[tokio::test]
    async fn test_properties_are_debounced() {
        let f = fixture_with(Duration::from_millis(30));
        f.transport.set_fallback(
            "/get_properties_postgresql/",
            json!({ "properties": [["Name", "public"]], "ddl": "CREATE SCHEMA public;" }),
        );
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        let _sub = f.emitter.on(Topic::PropertiesLoaded(f.tree.workspace_id()), move |event| {
            if let Event::PropertiesLoaded { path, .. } = event {
                sink.lock().push(path.clone());
            }
        });

        f.tree.click(&[0]);
        f.tree.click(&[0, 0]);
        f.tree.click(&[0, 0, 0]);
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert_eq!(f.transport.call_count("/get_properties_postgresql/"), 1);
        assert_eq!(*received.lock(), vec![vec![0, 0, 0]]);
        let body = &f.transport.bodies("/get_properties_postgresql/")[0];
        assert_eq!(body["data"]["object"], json!("Tables (3)"));
        assert_eq!(body["data"]["type"], json!("table_list"));
    }

    #[tokio::test]
    async fn test_events_drive_the_tree() {
        let f = fixture();
        f.transport.set_fallback(TABLES, three_tables());
        f.tree.bind();
        let ws = f.tree.workspace_id();

        f.emitter.emit(Event::RefreshNode { workspace_id: ws, path: TABLE_LIST.to_vec() });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(f.tree.get_node(&TABLE_LIST).unwrap().children.len(), 3);

        f.emitter.emit(Event::RemoveNode { workspace_id: ws, path: vec![0, 0, 0, 2] });
        assert_eq!(f.tree.get_node(&TABLE_LIST).unwrap().children.len(), 2);

        f.tree.unbind();
        assert_eq!(f.emitter.emit(Event::RemoveNode { workspace_id: ws, path: vec![0, 0, 0, 0] }), 0);
    }

    #[tokio::test]
    async fn test_refresh_tree_recursive_visits_matching_nodes() {
        let f = fixture();
        f.transport.set_fallback(TABLES, three_tables());

        f.tree.refresh_tree_recursive("table_list").await;
        let node = f.tree.get_node(&TABLE_LIST).unwrap();
        assert!(node.is_expanded);
        assert_eq!(node.children.len(), 3);
        assert_eq!(f.transport.call_count(TABLES), 1);
    }

    #[tokio::test]
    async fn test_context_menu_dispatch() {
        let f = fixture();
        f.tree.register_context_menu("cm_tables", vec![MenuItem::refresh(), MenuItem::new("Create Table", "create_table")]);
        f.tree.tree.write().update_data(&TABLE_LIST, |d| d.context_menu = Some("cm_tables".into()));

        let items = f.tree.context_menu(&TABLE_LIST).unwrap();
        assert_eq!(items[0].label, "Refresh");
        assert_eq!(f.tree.selected_path(), Some(TABLE_LIST.to_vec()));
        assert!(f.tree.context_menu(&[0]).is_none());
    }

    #[tokio::test]
    async fn test_keyboard_select_scrolls_with_scroll_tree_off() {
        let f = fixture();
        let settings = crate::models::Settings { scroll_tree: false, ..Default::default() };
        f.tree.ctx.settings.save_settings(settings).await.unwrap();

        f.tree.click(&[0, 0]);
        let viewport = Viewport::new(200.0, 240.0);
        let outcome = f.tree.handle_key(KeyPress::new(TreeKey::Home), &viewport).await.unwrap();
        assert_eq!(f.tree.selected_path(), Some(vec![0]));
        assert_eq!(outcome.scroll_to, Some(0.0));

        // Expanding only follows the node when the setting is on
        f.transport.set_fallback(TABLES, three_tables());
        f.tree.click(&TABLE_LIST);
        let scrolled = Viewport { scroll_top: 100.0, ..viewport };
        let outcome = f.tree.handle_key(KeyPress::new(TreeKey::ArrowRight), &scrolled).await.unwrap();
        assert!(f.tree.get_node(&TABLE_LIST).unwrap().is_expanded);
        assert_eq!(outcome.scroll_to, None);

        let settings = crate::models::Settings { scroll_tree: true, ..Default::default() };
        f.tree.ctx.settings.save_settings(settings).await.unwrap();
        f.tree.collapse(&TABLE_LIST);
        let outcome = f.tree.handle_key(KeyPress::new(TreeKey::ArrowRight), &scrolled).await.unwrap();
        assert_eq!(outcome.scroll_to, Some(8.0));
    }

    #[tokio::test]
    async fn test_keyboard_select_scrolls_and_fetches_properties() {
        let f = fixture();
        f.tree.click(&[0]);
        let viewport = Viewport::new(200.0, 240.0);

        let outcome = f.tree.handle_key(KeyPress::new(TreeKey::ArrowDown), &viewport).await.unwrap();
        assert_eq!(f.tree.selected_path(), Some(vec![0, 0]));
        assert_eq!(outcome.scroll_to, Some(0.0));

        // ArrowRight on a collapsed node expands it
        f.transport.respond(TABLES, three_tables());
        f.tree.click(&TABLE_LIST);
        f.tree.handle_key(KeyPress::new(TreeKey::ArrowRight), &viewport).await.unwrap();
        assert!(f.tree.get_node(&TABLE_LIST).unwrap().is_expanded);
        assert_eq!(f.transport.call_count(TABLES), 1);
    }
}
