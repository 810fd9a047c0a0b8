//! Server-side file manager operations.

use crate::error::ClientError;
use crate::models::FileKind;
use crate::services::api::Api;
use crate::services::transport::UploadFile;

/// File manager bound to the backend's user directory.
#[derive(Debug, Clone)]
pub struct FileManager {
    api: Api,
}

impl FileManager {
    pub fn new(api: Api) -> Self {
        Self { api }
    }

    /// Create a file or directory named `name` inside `path`.
    pub async fn create(&self, path: &str, name: &str, kind: FileKind) -> Result<(), ClientError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ClientError::validation("Name cannot be empty."));
        }
        if name.contains('/') || name.contains('\\') {
            return Err(ClientError::validation("Name cannot contain path separators."));
        }
        self.api.file_manager_create(path, name, kind).await?;
        tracing::debug!(path, name, ?kind, "File manager entry created");
        Ok(())
    }

    /// Delete a file or directory.
    pub async fn delete(&self, path: &str) -> Result<(), ClientError> {
        self.api.file_manager_delete(path).await?;
        tracing::debug!(path, "File manager entry deleted");
        Ok(())
    }

    /// Download a file's contents.
    pub async fn download(&self, path: &str) -> Result<Vec<u8>, ClientError> {
        let bytes = self.api.file_manager_download(path).await?;
        tracing::debug!(path, size = bytes.len(), "File downloaded");
        Ok(bytes)
    }

    /// Upload a file into directory `path`.
    pub async fn upload(&self, path: &str, file_name: &str, bytes: Vec<u8>) -> Result<(), ClientError> {
        let size = bytes.len();
        let file = UploadFile { file_name: file_name.to_string(), bytes, fields: Vec::new() };
        self.api.file_manager_upload(path, file).await?;
        tracing::debug!(path, file_name, size, "File uploaded");
        Ok(())
    }
}
