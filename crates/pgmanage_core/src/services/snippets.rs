//! Snippet tree and snippet text loading.

use parking_lot::RwLock;

use crate::emitter::{Emitter, Event};
use crate::error::ClientError;
use crate::models::{Snippet, SnippetFolder, TabId};
use crate::services::api::Api;

/// Cached snippet tree.
pub struct SnippetsStore {
    api: Api,
    emitter: Emitter,
    root: RwLock<SnippetFolder>,
}

impl SnippetsStore {
    pub fn new(api: Api, emitter: Emitter) -> Self {
        Self { api, emitter, root: RwLock::new(SnippetFolder::default()) }
    }

    /// Reload the whole snippet tree.
    pub async fn get_all_snippets(&self) -> Result<SnippetFolder, ClientError> {
        let root = self.api.get_all_snippets().await?;
        tracing::debug!(count = root.snippet_count(), "Snippets loaded");
        *self.root.write() = root.clone();
        Ok(root)
    }

    /// Last loaded tree.
    pub fn snippets(&self) -> SnippetFolder {
        self.root.read().clone()
    }

    pub fn find(&self, id: i64) -> Option<Snippet> {
        self.root.read().find(id).cloned()
    }

    /// Load a snippet's text and send it to the editor of `tab_id`.
    pub async fn get_snippet_text(&self, snippet_id: i64, tab_id: TabId) -> Result<String, ClientError> {
        let text = self.api.get_snippet_text(snippet_id).await?;
        let delivered = self.emitter.emit(Event::InsertToEditor { tab_id, text: text.clone() });
        if delivered == 0 {
            tracing::debug!(snippet_id, tab_id = %tab_id, "No editor listening for snippet text");
        }
        Ok(text)
    }
}

impl std::fmt::Debug for SnippetsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnippetsStore").field("snippets", &self.root.read().snippet_count()).finish()
    }
}
