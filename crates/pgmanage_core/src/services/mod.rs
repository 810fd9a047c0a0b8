//! Stores and backend services.
//!
//! - `transport` - HTTP seam to the backend
//! - `api` - typed endpoint calls
//! - `reporter` - error presentation and user prompts
//! - `tabs`, `connections`, `db_metadata`, `settings`, `snippets` - client stores
//! - `file_manager` - server-side files
//! - `session` - sign-in, keep-alive, unload

pub mod api;
pub mod connections;
pub mod db_metadata;
pub mod file_manager;
pub mod reporter;
pub mod session;
pub mod settings;
pub mod snippets;
pub mod tabs;
pub mod transport;

pub use api::{Api, CloseTabEntry, ObjectProperties, RequestCode, ScopedApi, SignInOutcome, TemplateKind};
pub use connections::ConnectionsStore;
pub use db_metadata::DbMetadataStore;
pub use file_manager::FileManager;
pub use reporter::{
    ConfirmOption, ConfirmRequest, ConfirmResponse, ErrorReporter, Notifier, PasswordPrompt,
    ToastLevel, TracingNotifier,
};
pub use session::{FrameMessage, Session};
pub use settings::SettingsStore;
pub use snippets::SnippetsStore;
pub use tabs::TabsStore;
pub use transport::{HttpTransport, Transport, UploadFile};
