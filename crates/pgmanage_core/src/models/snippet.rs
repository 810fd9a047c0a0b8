//! Snippet tree and file manager entries.

use serde::{Deserialize, Serialize};

/// A saved snippet file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snippet {
    /// Snippet id
    pub id: i64,
    /// Display name
    pub name: String,
}

/// A snippet folder with nested folders and files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnippetFolder {
    /// Folder id, `None` for the root
    pub id: Option<i64>,
    /// Display name
    pub name: String,
    /// Snippet files
    pub files: Vec<Snippet>,
    /// Sub-folders
    pub folders: Vec<SnippetFolder>,
}

impl SnippetFolder {
    /// Total number of snippets in this folder and below.
    pub fn snippet_count(&self) -> usize {
        self.files.len() + self.folders.iter().map(SnippetFolder::snippet_count).sum::<usize>()
    }

    /// Find a snippet anywhere below this folder.
    pub fn find(&self, id: i64) -> Option<&Snippet> {
        self.files
            .iter()
            .find(|s| s.id == id)
            .or_else(|| self.folders.iter().find_map(|f| f.find(id)))
    }
}

/// Kind of entry created through the file manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    /// Regular file
    File,
    /// Directory
    Dir,
}

/// An entry listed by the file manager.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileEntry {
    /// File name
    pub file_name: String,
    /// Full path on the server
    pub path: String,
    /// Directory flag
    pub is_directory: bool,
    /// Human readable size of a file, e.g. `10 KB`
    pub file_size: Option<String>,
    /// Number of entries in a directory
    pub dir_size: Option<u64>,
    /// Last modification, as formatted by the server
    pub modified: Option<String>,
}
