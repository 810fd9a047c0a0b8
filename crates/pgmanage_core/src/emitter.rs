//! Process-wide publish/subscribe bus with a typed event contract.
//!
//! Every topic is a [`Topic`] variant, optionally scoped to a workspace or tab,
//! and every payload is an [`Event`] variant. `Event::topic()` is the only place
//! a topic is derived from a payload.
//!
//! | topic | payload | emitted by |
//! |---|---|---|
//! | `RefreshNode(ws)` | `path` to refresh with force | DDL modals, drop mixin |
//! | `RemoveNode(ws)` | `path` to delete | DDL modals |
//! | `RefreshTreeRecursive(ws)` | `node_type` to refresh below the selected database | extension/database modals |
//! | `PropertiesLoaded(ws)` | `path` and fetched `properties` | tree controller |
//! | `DatabaseChanged(ws)` | new `database` | connections store |
//! | `InsertToEditor(tab)` | snippet `text` | snippets store |
//! | `RunQuery(tab)` | nothing | template-select flow |
//! | `ShowPasswordPrompt` | `database_index`, `kind`, `message` | tree controller |
//! | `TabClosed` | `tab_id`, `workspace_id` | tab factories |

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::error::PasswordKind;
use crate::models::{ConnectionId, NodePath, TabId};

/// Event topic, scoped by workspace or tab id where the event is local.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Force-refresh a node in a workspace tree
    RefreshNode(TabId),
    /// Remove a node from a workspace tree
    RemoveNode(TabId),
    /// Refresh every node of a type below the selected database
    RefreshTreeRecursive(TabId),
    /// Properties of the selected node arrived
    PropertiesLoaded(TabId),
    /// The workspace switched database
    DatabaseChanged(TabId),
    /// Insert text into a tab's editor
    InsertToEditor(TabId),
    /// Run the query in a tab's editor
    RunQuery(TabId),
    /// A credential must be re-entered
    ShowPasswordPrompt,
    /// A tab was closed
    TabClosed,
}

/// Event payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// See [`Topic::RefreshNode`]
    RefreshNode {
        /// Workspace owning the tree
        workspace_id: TabId,
        /// Node to refresh
        path: NodePath,
    },
    /// See [`Topic::RemoveNode`]
    RemoveNode {
        /// Workspace owning the tree
        workspace_id: TabId,
        /// Node to remove
        path: NodePath,
    },
    /// See [`Topic::RefreshTreeRecursive`]
    RefreshTreeRecursive {
        /// Workspace owning the tree
        workspace_id: TabId,
        /// Node type to refresh
        node_type: String,
    },
    /// See [`Topic::PropertiesLoaded`]
    PropertiesLoaded {
        /// Workspace owning the tree
        workspace_id: TabId,
        /// Node the properties belong to
        path: NodePath,
        /// Properties returned by the backend
        properties: serde_json::Value,
    },
    /// See [`Topic::DatabaseChanged`]
    DatabaseChanged {
        /// Workspace that switched
        workspace_id: TabId,
        /// New database
        database: String,
    },
    /// See [`Topic::InsertToEditor`]
    InsertToEditor {
        /// Target tab
        tab_id: TabId,
        /// Text to insert
        text: String,
    },
    /// See [`Topic::RunQuery`]
    RunQuery {
        /// Target tab
        tab_id: TabId,
    },
    /// See [`Topic::ShowPasswordPrompt`]
    ShowPasswordPrompt {
        /// Connection whose credential expired
        database_index: ConnectionId,
        /// Which credential expired
        kind: PasswordKind,
        /// Backend message
        message: String,
    },
    /// See [`Topic::TabClosed`]
    TabClosed {
        /// Closed tab
        tab_id: TabId,
        /// Owning workspace, `None` for a workspace itself
        workspace_id: Option<TabId>,
    },
}

impl Event {
    /// Topic this event is delivered on.
    pub fn topic(&self) -> Topic {
        match self {
            Self::RefreshNode { workspace_id, .. } => Topic::RefreshNode(*workspace_id),
            Self::RemoveNode { workspace_id, .. } => Topic::RemoveNode(*workspace_id),
            Self::RefreshTreeRecursive { workspace_id, .. } => {
                Topic::RefreshTreeRecursive(*workspace_id)
            }
            Self::PropertiesLoaded { workspace_id, .. } => Topic::PropertiesLoaded(*workspace_id),
            Self::DatabaseChanged { workspace_id, .. } => Topic::DatabaseChanged(*workspace_id),
            Self::InsertToEditor { tab_id, .. } => Topic::InsertToEditor(*tab_id),
            Self::RunQuery { tab_id } => Topic::RunQuery(*tab_id),
            Self::ShowPasswordPrompt { .. } => Topic::ShowPasswordPrompt,
            Self::TabClosed { .. } => Topic::TabClosed,
        }
    }
}

type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

#[derive(Default)]
struct Registry {
    handlers: Mutex<HashMap<Topic, Vec<(u64, Handler)>>>,
    next_id: AtomicU64,
}

/// Cloneable handle to the shared bus.
#[derive(Clone, Default)]
pub struct Emitter {
    registry: Arc<Registry>,
}

impl Emitter {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a topic. The handler stays registered until the
    /// returned [`Subscription`] is dropped.
    #[must_use = "dropping the subscription unsubscribes the handler"]
    pub fn on<F>(&self, topic: Topic, handler: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry.handlers.lock().entry(topic).or_default().push((id, Arc::new(handler)));
        tracing::trace!(?topic, handler_id = id, "Emitter subscription added");
        Subscription { registry: Arc::downgrade(&self.registry), topic, id }
    }

    /// Deliver an event to every handler of its topic. Returns the number of
    /// handlers invoked.
    pub fn emit(&self, event: Event) -> usize {
        let topic = event.topic();
        // Snapshot so handlers may subscribe or emit re-entrantly.
        let handlers: Vec<Handler> = self
            .registry
            .handlers
            .lock()
            .get(&topic)
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();

        tracing::trace!(?topic, handlers = handlers.len(), "Emitting event");
        for handler in &handlers {
            handler(&event);
        }
        handlers.len()
    }

    /// Remove every handler of a topic.
    pub fn clear_topic(&self, topic: Topic) {
        self.registry.handlers.lock().remove(&topic);
    }

    /// Number of handlers registered for a topic.
    pub fn handler_count(&self, topic: Topic) -> usize {
        self.registry.handlers.lock().get(&topic).map_or(0, Vec::len)
    }
}

impl std::fmt::Debug for Emitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emitter").field("topics", &self.registry.handlers.lock().len()).finish()
    }
}

/// Registration handle; dropping it unsubscribes.
pub struct Subscription {
    registry: Weak<Registry>,
    topic: Topic,
    id: u64,
}

impl Subscription {
    /// Topic this subscription listens on.
    pub fn topic(&self) -> Topic {
        self.topic
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let mut handlers = registry.handlers.lock();
        if let Some(list) = handlers.get_mut(&self.topic) {
            list.retain(|(id, _)| *id != self.id);
            if list.is_empty() {
                handlers.remove(&self.topic);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use uuid::Uuid;

    #[test]
    fn test_delivery_is_scoped_by_workspace() {
        let emitter = Emitter::new();
        let ws_a = Uuid::new_v4();
        let ws_b = Uuid::new_v4();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        let _sub = emitter.on(Topic::RefreshNode(ws_a), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(emitter.emit(Event::RefreshNode { workspace_id: ws_b, path: vec![0] }), 0);
        assert_eq!(emitter.emit(Event::RefreshNode { workspace_id: ws_a, path: vec![0] }), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let emitter = Emitter::new();
        let sub = emitter.on(Topic::TabClosed, |_| {});
        let sub2 = emitter.on(Topic::TabClosed, |_| {});
        assert_eq!(emitter.handler_count(Topic::TabClosed), 2);

        drop(sub);
        assert_eq!(emitter.handler_count(Topic::TabClosed), 1);
        drop(sub2);
        assert_eq!(emitter.handler_count(Topic::TabClosed), 0);
    }

    #[test]
    fn test_reentrant_emit_does_not_deadlock() {
        let emitter = Emitter::new();
        let tab = Uuid::new_v4();
        let inner = emitter.clone();
        let ran = Arc::new(AtomicUsize::new(0));
        let ran_inner = ran.clone();

        let _a = emitter.on(Topic::InsertToEditor(tab), move |_| {
            inner.emit(Event::RunQuery { tab_id: tab });
        });
        let _b = emitter.on(Topic::RunQuery(tab), move |_| {
            ran_inner.fetch_add(1, Ordering::SeqCst);
        });

        emitter.emit(Event::InsertToEditor { tab_id: tab, text: "select 1".into() });
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscription_outliving_emitter() {
        let emitter = Emitter::new();
        let sub = emitter.on(Topic::ShowPasswordPrompt, |_| {});
        drop(emitter);
        drop(sub);
    }
}
