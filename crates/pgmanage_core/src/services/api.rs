//! Typed calls to the PgManage REST endpoints.
//!
//! Every failure passes through [`ErrorReporter::intercept`] before it is
//! returned, so global alerts are raised once at the transport boundary and
//! call sites only decide between toast and special handling.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::dialect::Dialect;
use crate::error::{ClientError, PasswordKind};
use crate::models::{
    ChangeDatabaseRequest, Connection, ConnectionId, ConnectionList, DatabaseMeta, FileKind,
    Settings, SnippetFolder, TabId,
};
use crate::services::reporter::ErrorReporter;
use crate::services::transport::{Transport, UploadFile, CSRF_FORM_FIELD};

/// Request codes understood by `/create_request/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RequestCode {
    /// Cancel a running statement
    CancelThread = 6,
    /// Release the backend resources of closed tabs
    CloseTab = 8,
}

/// One released tab in a close batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseTabEntry {
    /// Workspace the tab belongs to
    pub conn_tab_id: TabId,
    /// Secondary tab, `None` for the workspace itself
    pub tab_id: Option<TabId>,
    /// Saved query tab row to delete
    pub tab_db_id: Option<i64>,
}

/// Result of a sign-in attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignInOutcome {
    /// Signed in; carries the user id
    Success(i64),
    /// Token-based deployment refused the credentials
    InvalidToken,
    /// Wrong user name or password
    InvalidCredentials,
}

/// Kind of template requested from `/template_{kind}_{dialect}/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    /// SELECT statement
    Select,
    /// INSERT statement
    Insert,
    /// UPDATE statement
    Update,
}

impl TemplateKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Insert => "insert",
            Self::Update => "update",
        }
    }
}

#[derive(Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct TemplateResponse {
    template: String,
}

/// Properties and DDL of a tree object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectProperties {
    /// `[name, value]` pairs
    pub properties: Vec<(String, Value)>,
    /// DDL of the object
    pub ddl: String,
}

/// Typed API over a transport.
#[derive(Clone)]
pub struct Api {
    transport: Arc<dyn Transport>,
    reporter: Arc<ErrorReporter>,
}

impl Api {
    /// Create an API client.
    pub fn new(transport: Arc<dyn Transport>, reporter: Arc<ErrorReporter>) -> Self {
        Self { transport, reporter }
    }

    /// The reporter failures are routed through.
    pub fn reporter(&self) -> &Arc<ErrorReporter> {
        &self.reporter
    }

    /// The underlying transport.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Bind the API to a workspace so every body carries `database_index` and `workspace_id`.
    pub fn scoped(&self, database_index: ConnectionId, workspace_id: TabId) -> ScopedApi {
        ScopedApi { api: self.clone(), database_index, workspace_id }
    }

    fn intercepted<T>(&self, result: Result<T, ClientError>) -> Result<T, ClientError> {
        if let Err(ref e) = result {
            self.reporter.intercept(e);
        }
        result
    }

    // ========== Generic calls ==========

    /// GET a JSON resource.
    pub async fn get_json(&self, path: &str) -> Result<Value, ClientError> {
        let result = self.transport.get(path).await;
        self.intercepted(result)
    }

    /// POST a JSON body.
    pub async fn post_json(&self, path: &str, body: Value) -> Result<Value, ClientError> {
        let result = self.transport.post(path, body).await;
        self.intercepted(result)
    }

    /// POST a JSON body and decode the response.
    pub async fn post<T: DeserializeOwned>(&self, path: &str, body: Value) -> Result<T, ClientError> {
        let value = self.post_json(path, body).await?;
        let decoded = serde_json::from_value(value).map_err(ClientError::from);
        self.intercepted(decoded)
    }

    /// GET and decode the response.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let value = self.get_json(path).await?;
        let decoded = serde_json::from_value(value).map_err(ClientError::from);
        self.intercepted(decoded)
    }

    // ========== Session ==========

    /// `/sign_in/`
    pub async fn sign_in(&self, username: &str, password: &str) -> Result<SignInOutcome, ClientError> {
        let resp: DataEnvelope<i64> =
            self.post("/sign_in/", json!({ "username": username, "password": password })).await?;
        Ok(match resp.data {
            id if id >= 0 => SignInOutcome::Success(id),
            -2 => SignInOutcome::InvalidToken,
            _ => SignInOutcome::InvalidCredentials,
        })
    }

    /// `/master_password/`, both to set and to unlock.
    pub async fn master_password(&self, password: &str) -> Result<(), ClientError> {
        self.post_json("/master_password/", json!({ "master_password": password })).await?;
        Ok(())
    }

    /// `/reset_master_password/`
    pub async fn reset_master_password(&self) -> Result<(), ClientError> {
        self.post_json("/reset_master_password/", json!({})).await?;
        Ok(())
    }

    /// `/renew_password/`
    pub async fn renew_password(
        &self,
        database_index: ConnectionId,
        password: &str,
        kind: PasswordKind,
    ) -> Result<(), ClientError> {
        self.post_json(
            "/renew_password/",
            json!({ "database_index": database_index, "password": password, "password_kind": kind.as_str() }),
        )
        .await?;
        Ok(())
    }

    /// `/client_keep_alive/`
    pub async fn client_keep_alive(&self) -> Result<(), ClientError> {
        self.get_json("/client_keep_alive/").await?;
        Ok(())
    }

    /// `/clear_client/` beacon. Returns whether it was queued.
    pub fn clear_client(&self) -> bool {
        let token = self.transport.csrf_token().unwrap_or_default();
        self.transport
            .send_beacon("/clear_client/", vec![(CSRF_FORM_FIELD.to_string(), token)])
    }

    /// `/create_request/` with the close-tab code.
    pub async fn close_tabs(&self, entries: &[CloseTabEntry]) -> Result<(), ClientError> {
        self.post_json(
            "/create_request/",
            json!({ "v_code": RequestCode::CloseTab as u8, "v_context_code": 0, "v_data": entries }),
        )
        .await?;
        Ok(())
    }

    // ========== Connections ==========

    /// `/get_connections/`
    pub async fn get_connections(&self) -> Result<ConnectionList, ClientError> {
        self.post("/get_connections/", json!({})).await
    }

    /// `/test_connection/`
    pub async fn test_connection(&self, connection: &Connection) -> Result<String, ClientError> {
        let body = serde_json::to_value(connection)?;
        let resp = self.post_json("/test_connection/", body).await?;
        Ok(match resp {
            Value::Object(ref map) => map
                .get("data")
                .and_then(Value::as_str)
                .unwrap_or("Connection successful.")
                .to_string(),
            Value::String(s) => s,
            _ => "Connection successful.".to_string(),
        })
    }

    /// `/change_active_database/`
    pub async fn change_active_database(&self, request: &ChangeDatabaseRequest) -> Result<(), ClientError> {
        self.post_json("/change_active_database/", serde_json::to_value(request)?).await?;
        Ok(())
    }

    /// `/pin_database/`
    pub async fn pin_database(
        &self,
        database_index: ConnectionId,
        database_name: &str,
        pinned: bool,
    ) -> Result<(), ClientError> {
        self.post_json(
            "/pin_database/",
            json!({ "database_index": database_index, "database_name": database_name, "pinned": pinned }),
        )
        .await?;
        Ok(())
    }

    /// `/get_database_meta/`
    pub async fn get_database_meta(
        &self,
        database_index: ConnectionId,
        workspace_id: TabId,
        database_name: &str,
    ) -> Result<DatabaseMeta, ClientError> {
        self.post(
            "/get_database_meta/",
            json!({ "database_index": database_index, "workspace_id": workspace_id, "database_name": database_name }),
        )
        .await
    }

    // ========== Settings ==========

    /// `/get_settings/`
    pub async fn get_settings(&self) -> Result<Settings, ClientError> {
        let resp: DataEnvelope<Settings> = self.post("/get_settings/", json!({})).await?;
        Ok(resp.data)
    }

    /// `/save_settings/`
    pub async fn save_settings(&self, settings: &Settings) -> Result<(), ClientError> {
        self.post_json("/save_settings/", json!({ "settings": settings })).await?;
        Ok(())
    }

    // ========== Snippets and files ==========

    /// `/get_all_snippets/`
    pub async fn get_all_snippets(&self) -> Result<SnippetFolder, ClientError> {
        self.get("/get_all_snippets/").await
    }

    /// `/get_snippet_text/`
    pub async fn get_snippet_text(&self, snippet_id: i64) -> Result<String, ClientError> {
        let resp = self.post_json("/get_snippet_text/", json!({ "snippet_id": snippet_id })).await?;
        Ok(match resp {
            Value::String(s) => s,
            Value::Object(map) => map.get("data").and_then(Value::as_str).unwrap_or_default().to_string(),
            _ => String::new(),
        })
    }

    /// `/file_manager/create/`
    pub async fn file_manager_create(&self, path: &str, name: &str, kind: FileKind) -> Result<(), ClientError> {
        self.post_json("/file_manager/create/", json!({ "path": path, "name": name, "type": kind }))
            .await?;
        Ok(())
    }

    /// `/file_manager/delete/`
    pub async fn file_manager_delete(&self, path: &str) -> Result<(), ClientError> {
        self.post_json("/file_manager/delete/", json!({ "path": path })).await?;
        Ok(())
    }

    /// `/file_manager/download/`
    pub async fn file_manager_download(&self, path: &str) -> Result<Vec<u8>, ClientError> {
        let result = self.transport.download("/file_manager/download/", json!({ "path": path })).await;
        self.intercepted(result)
    }

    /// `/file_manager/upload/`
    pub async fn file_manager_upload(&self, path: &str, file: UploadFile) -> Result<(), ClientError> {
        let mut file = file;
        file.fields.push(("path".to_string(), path.to_string()));
        let result = self.transport.upload("/file_manager/upload/", file).await;
        self.intercepted(result)?;
        Ok(())
    }
}

impl std::fmt::Debug for Api {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Api").finish_non_exhaustive()
    }
}

/// API bound to one workspace.
#[derive(Debug, Clone)]
pub struct ScopedApi {
    api: Api,
    database_index: ConnectionId,
    workspace_id: TabId,
}

impl ScopedApi {
    /// Connection the workspace uses.
    pub fn database_index(&self) -> ConnectionId {
        self.database_index
    }

    /// Workspace id.
    pub fn workspace_id(&self) -> TabId {
        self.workspace_id
    }

    /// Unscoped API.
    pub fn api(&self) -> &Api {
        &self.api
    }

    fn scope(&self, body: Value) -> Value {
        let mut body = match body {
            Value::Object(map) => map,
            Value::Null => serde_json::Map::new(),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("data".to_string(), other);
                map
            }
        };
        body.insert("database_index".to_string(), json!(self.database_index));
        body.insert("workspace_id".to_string(), json!(self.workspace_id));
        Value::Object(body)
    }

    /// POST with the workspace scope injected.
    pub async fn post_json(&self, path: &str, body: Value) -> Result<Value, ClientError> {
        self.api.post_json(path, self.scope(body)).await
    }

    /// POST with the workspace scope injected and decode the response.
    pub async fn post<T: DeserializeOwned>(&self, path: &str, body: Value) -> Result<T, ClientError> {
        self.api.post(path, self.scope(body)).await
    }

    /// `/template_{kind}_{dialect}/`
    pub async fn template(
        &self,
        dialect: Dialect,
        kind: TemplateKind,
        schema: Option<&str>,
        table: &str,
        template_kind: Option<&str>,
    ) -> Result<String, ClientError> {
        let path = dialect.endpoint(&format!("template_{}", kind.as_str()));
        let resp: TemplateResponse = self
            .post(&path, json!({ "schema": schema, "table": table, "kind": template_kind }))
            .await?;
        Ok(resp.template)
    }

    /// `/execute_query_{dialect}/`
    pub async fn execute_query(&self, dialect: Dialect, query: &str) -> Result<(), ClientError> {
        self.post_json(&dialect.endpoint("execute_query"), json!({ "query": query })).await?;
        Ok(())
    }

    /// `/get_properties_{dialect}/`
    pub async fn get_properties(&self, dialect: Dialect, data: Value) -> Result<ObjectProperties, ClientError> {
        self.post(&dialect.endpoint("get_properties"), json!({ "data": data })).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockTransport, RecordingNotifier};
    use uuid::Uuid;

    fn api_with(transport: Arc<MockTransport>) -> (Api, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::default());
        let reporter = Arc::new(ErrorReporter::new(notifier.clone()));
        (Api::new(transport, reporter), notifier)
    }

    #[tokio::test]
    async fn test_sign_in_outcomes() {
        let transport = Arc::new(MockTransport::new());
        transport.respond("/sign_in/", json!({ "data": 4 }));
        transport.respond("/sign_in/", json!({ "data": -2 }));
        transport.respond("/sign_in/", json!({ "data": -1 }));
        let (api, _) = api_with(transport.clone());

        assert_eq!(api.sign_in("u", "p").await.unwrap(), SignInOutcome::Success(4));
        assert_eq!(api.sign_in("u", "p").await.unwrap(), SignInOutcome::InvalidToken);
        assert_eq!(api.sign_in("u", "p").await.unwrap(), SignInOutcome::InvalidCredentials);
        assert_eq!(transport.bodies("/sign_in/")[0], json!({ "username": "u", "password": "p" }));
    }

    #[tokio::test]
    async fn test_scoped_api_injects_workspace() {
        let transport = Arc::new(MockTransport::new());
        transport.respond("/get_tables_postgresql/", json!([]));
        let (api, _) = api_with(transport.clone());
        let ws = Uuid::new_v4();

        api.scoped(3, ws).post_json("/get_tables_postgresql/", json!({ "schema": "public" })).await.unwrap();

        let body = &transport.bodies("/get_tables_postgresql/")[0];
        assert_eq!(body["schema"], "public");
        assert_eq!(body["database_index"], 3);
        assert_eq!(body["workspace_id"], json!(ws));
    }

    #[tokio::test]
    async fn test_failures_are_intercepted() {
        let transport = Arc::new(MockTransport::new());
        transport.fail("/get_database_meta/", 401, "");
        let (api, notifier) = api_with(transport);

        let err = api.get_database_meta(1, Uuid::new_v4(), "postgres").await.unwrap_err();
        assert!(err.is_authentication());
        assert_eq!(notifier.alerts().len(), 1);
    }

    #[tokio::test]
    async fn test_close_tabs_envelope() {
        let transport = Arc::new(MockTransport::new());
        let (api, _) = api_with(transport.clone());
        let ws = Uuid::new_v4();

        api.close_tabs(&[CloseTabEntry { conn_tab_id: ws, tab_id: None, tab_db_id: None }])
            .await
            .unwrap();

        let body = &transport.bodies("/create_request/")[0];
        assert_eq!(body["v_code"], 8);
        assert_eq!(body["v_data"].as_array().map(Vec::len), Some(1));
        assert!(body["v_data"][0]["tab_id"].is_null());
    }

    #[tokio::test]
    async fn test_template_select_path() {
        let transport = Arc::new(MockTransport::new());
        transport.respond("/template_select_mssql/", json!({ "template": "SELECT TOP 100 * FROM t" }));
        let (api, _) = api_with(transport);

        let sql = api
            .scoped(1, Uuid::new_v4())
            .template(Dialect::Mssql, TemplateKind::Select, Some("dbo"), "t", Some("t"))
            .await
            .unwrap();
        assert_eq!(sql, "SELECT TOP 100 * FROM t");
    }

    #[tokio::test]
    async fn test_clear_client_beacon_carries_csrf() {
        let transport = Arc::new(MockTransport::new().with_csrf("tok"));
        let (api, _) = api_with(transport.clone());

        assert!(api.clear_client());
        assert_eq!(
            transport.beacons(),
            vec![("/clear_client/".to_string(), vec![("csrfmiddlewaretoken".to_string(), "tok".to_string())])]
        );
    }
}
