//! Client core for the PgManage database administration tool.
//!
//! This crate holds the state and behavior behind the PgManage UI:
//!
//! - **error**: Error taxonomy and how each failure is presented
//! - **config**: Client configuration and data directory
//! - **logging**: Structured logging setup
//! - **emitter**: Typed event bus between components
//! - **models**: Connections, tabs, tree nodes, settings, snippets
//! - **services**: Backend transport, typed API and the client stores
//! - **tree**: Object tree state machine, keyboard navigation, drop and pin
//! - **factories**: Tab-type factories owning external widgets
//! - **dialect**: Per-engine metadata tables
//! - **state**: Application state wiring

pub mod config;
pub mod dialect;
pub mod emitter;
pub mod error;
pub mod factories;
pub mod logging;
pub mod models;
pub mod services;
pub mod state;
pub mod tree;

#[cfg(test)]
mod test_support;

pub use config::{ClientConfig, DrainOrder};
pub use dialect::{Dialect, DialectInfo};
pub use emitter::{Emitter, Event, Subscription, Topic};
pub use error::{ClientError, ErrorInfo, PasswordKind, Presentation};
pub use factories::{EditorOptions, TabFactories, TabHandle, Widget, WidgetFactory, WidgetKind};
pub use models::{
    ChangeDatabaseRequest, Connection, ConnectionId, NodePath, NodeState, Settings, Tab, TabId,
    TabMode, Technology, TreeNode,
};
pub use services::{
    Api, ConnectionsStore, ErrorReporter, HttpTransport, Notifier, Session, TabsStore, Transport,
    TracingNotifier,
};
pub use state::AppState;
pub use tree::{TreeController, TreeKey, Viewport};
