//! Scripted doubles shared by the unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::error::ClientError;
use crate::factories::{EditorOptions, Widget, WidgetFactory, WidgetKind};
use crate::models::TabId;
use crate::services::reporter::{
    ConfirmRequest, ConfirmResponse, Notifier, PasswordPrompt, ToastLevel,
};
use crate::services::tabs::TabsStore;
use crate::services::transport::{error_from_response, Transport, UploadFile};

#[derive(Debug, Clone)]
enum Scripted {
    Ok(Value),
    Bytes(Vec<u8>),
    Status(u16, String),
    Network(String),
}

#[derive(Debug, Default)]
struct PathScript {
    queue: VecDeque<Scripted>,
    fallback: Option<Scripted>,
    delay: Option<Duration>,
    gate: Option<Arc<Semaphore>>,
}

/// Transport answering from per-path scripts. Unscripted calls succeed with `null`.
#[derive(Debug, Default)]
pub struct MockTransport {
    csrf: Option<String>,
    scripts: Mutex<HashMap<String, PathScript>>,
    calls: Mutex<Vec<(String, Value)>>,
    uploads: Mutex<Vec<(String, UploadFile)>>,
    beacons: Mutex<Vec<(String, Vec<(String, String)>)>>,
    in_flight: Mutex<HashMap<String, usize>>,
    max_in_flight: Mutex<HashMap<String, usize>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_csrf(mut self, token: &str) -> Self {
        self.csrf = Some(token.to_string());
        self
    }

    fn script(&self, path: &str, f: impl FnOnce(&mut PathScript)) {
        f(self.scripts.lock().entry(path.to_string()).or_default());
    }

    /// Queue one successful JSON response.
    pub fn respond(&self, path: &str, body: Value) {
        self.script(path, |s| s.queue.push_back(Scripted::Ok(body)));
    }

    /// Queue one successful raw response.
    pub fn respond_bytes(&self, path: &str, bytes: Vec<u8>) {
        self.script(path, |s| s.queue.push_back(Scripted::Bytes(bytes)));
    }

    /// Queue one failed response with a status and raw body.
    pub fn fail(&self, path: &str, status: u16, body: &str) {
        self.script(path, |s| s.queue.push_back(Scripted::Status(status, body.to_string())));
    }

    /// Queue one network failure.
    pub fn fail_network(&self, path: &str, message: &str) {
        self.script(path, |s| s.queue.push_back(Scripted::Network(message.to_string())));
    }

    /// Response used once the queue for `path` is empty.
    pub fn set_fallback(&self, path: &str, body: Value) {
        self.script(path, |s| s.fallback = Some(Scripted::Ok(body)));
    }

    /// Delay every call to `path`.
    pub fn set_delay(&self, path: &str, delay: Duration) {
        self.script(path, |s| s.delay = Some(delay));
    }

    /// Hold calls to `path` until permits are added to the returned semaphore.
    pub fn pause(&self, path: &str) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        let shared = gate.clone();
        self.script(path, |s| s.gate = Some(shared));
        gate
    }

    pub fn call_count(&self, path: &str) -> usize {
        self.calls.lock().iter().filter(|(p, _)| p == path).count()
    }

    /// Bodies sent to `path`, in call order.
    pub fn bodies(&self, path: &str) -> Vec<Value> {
        self.calls.lock().iter().filter(|(p, _)| p == path).map(|(_, b)| b.clone()).collect()
    }

    /// Every path called, in order.
    pub fn paths(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(p, _)| p.clone()).collect()
    }

    pub fn uploads(&self, path: &str) -> Vec<UploadFile> {
        self.uploads.lock().iter().filter(|(p, _)| p == path).map(|(_, f)| f.clone()).collect()
    }

    pub fn beacons(&self) -> Vec<(String, Vec<(String, String)>)> {
        self.beacons.lock().clone()
    }

    /// Highest number of concurrent calls observed on `path`.
    pub fn max_in_flight(&self, path: &str) -> usize {
        self.max_in_flight.lock().get(path).copied().unwrap_or(0)
    }

    async fn call(&self, path: &str, body: Value) -> Result<Scripted, ClientError> {
        self.calls.lock().push((path.to_string(), body));
        let (delay, gate) = self
            .scripts
            .lock()
            .get(path)
            .map(|s| (s.delay, s.gate.clone()))
            .unwrap_or_default();

        {
            let mut in_flight = self.in_flight.lock();
            let count = in_flight.entry(path.to_string()).or_default();
            *count += 1;
            let mut max = self.max_in_flight.lock();
            let peak = max.entry(path.to_string()).or_default();
            *peak = (*peak).max(*count);
        }

        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let outcome = {
            let mut scripts = self.scripts.lock();
            scripts
                .get_mut(path)
                .and_then(|s| s.queue.pop_front().or_else(|| s.fallback.clone()))
                .unwrap_or(Scripted::Ok(Value::Null))
        };

        if let Some(count) = self.in_flight.lock().get_mut(path) {
            *count -= 1;
        }

        match outcome {
            Scripted::Status(status, body) => Err(error_from_response(status, &body)),
            Scripted::Network(message) => Err(ClientError::network(message)),
            other => Ok(other),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, path: &str) -> Result<Value, ClientError> {
        self.post(path, Value::Null).await
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, ClientError> {
        match self.call(path, body).await? {
            Scripted::Ok(value) => Ok(value),
            Scripted::Bytes(bytes) => Ok(Value::String(String::from_utf8_lossy(&bytes).into_owned())),
            _ => Ok(Value::Null),
        }
    }

    async fn upload(&self, path: &str, file: UploadFile) -> Result<Value, ClientError> {
        self.uploads.lock().push((path.to_string(), file));
        self.post(path, Value::Null).await
    }

    async fn download(&self, path: &str, body: Value) -> Result<Vec<u8>, ClientError> {
        match self.call(path, body).await? {
            Scripted::Bytes(bytes) => Ok(bytes),
            Scripted::Ok(Value::Null) => Ok(Vec::new()),
            Scripted::Ok(value) => Ok(value.to_string().into_bytes()),
            _ => Ok(Vec::new()),
        }
    }

    fn send_beacon(&self, path: &str, form: Vec<(String, String)>) -> bool {
        self.beacons.lock().push((path.to_string(), form));
        true
    }

    fn csrf_token(&self) -> Option<String> {
        self.csrf.clone()
    }
}

/// Notifier that records everything. Confirmations are accepted and password
/// prompts cancelled unless answers are queued.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    alerts: Mutex<Vec<String>>,
    toasts: Mutex<Vec<(ToastLevel, String)>>,
    confirms: Mutex<Vec<ConfirmRequest>>,
    confirm_answers: Mutex<VecDeque<Option<ConfirmResponse>>>,
    prompts: Mutex<Vec<PasswordPrompt>>,
    password_answers: Mutex<VecDeque<Option<String>>>,
}

impl RecordingNotifier {
    pub fn alerts(&self) -> Vec<String> {
        self.alerts.lock().clone()
    }

    pub fn toasts(&self) -> Vec<(ToastLevel, String)> {
        self.toasts.lock().clone()
    }

    pub fn confirms(&self) -> Vec<ConfirmRequest> {
        self.confirms.lock().clone()
    }

    pub fn prompts(&self) -> Vec<PasswordPrompt> {
        self.prompts.lock().clone()
    }

    /// Answer the next confirmation.
    pub fn answer_confirm(&self, answer: Option<ConfirmResponse>) {
        self.confirm_answers.lock().push_back(answer);
    }

    /// Answer the next password prompt.
    pub fn answer_password(&self, answer: Option<&str>) {
        self.password_answers.lock().push_back(answer.map(String::from));
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn alert(&self, message: &str) {
        self.alerts.lock().push(message.to_string());
    }

    fn toast(&self, level: ToastLevel, message: &str) {
        self.toasts.lock().push((level, message.to_string()));
    }

    async fn confirm(&self, request: ConfirmRequest) -> Option<ConfirmResponse> {
        self.confirms.lock().push(request);
        self.confirm_answers.lock().pop_front().unwrap_or(Some(ConfirmResponse::default()))
    }

    async fn prompt_password(&self, prompt: PasswordPrompt) -> Option<String> {
        self.prompts.lock().push(prompt);
        self.password_answers.lock().pop_front().flatten()
    }
}

/// Lifecycle record of a widget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetEvent {
    Created { kind: WidgetKind, tab_id: TabId },
    /// `tab_in_store` tells whether the owning tab was still in the store
    Destroyed { kind: WidgetKind, tab_id: TabId, tab_in_store: bool },
}

struct RecordingWidget {
    kind: WidgetKind,
    tab_id: TabId,
    log: Arc<Mutex<Vec<WidgetEvent>>>,
    tabs: Option<Arc<TabsStore>>,
}

impl Widget for RecordingWidget {
    fn kind(&self) -> WidgetKind {
        self.kind
    }

    fn destroy(&self) {
        let tab_in_store = self.tabs.as_ref().is_some_and(|t| t.get_tab(self.tab_id).is_some());
        self.log.lock().push(WidgetEvent::Destroyed { kind: self.kind, tab_id: self.tab_id, tab_in_store });
    }
}

/// Widget factory logging creation and destruction.
#[derive(Default)]
pub struct RecordingWidgetFactory {
    log: Arc<Mutex<Vec<WidgetEvent>>>,
    editor_options: Mutex<Vec<EditorOptions>>,
    tabs: Option<Arc<TabsStore>>,
}

impl RecordingWidgetFactory {
    /// Factory whose widgets check the store when destroyed.
    pub fn observing(tabs: Arc<TabsStore>) -> Self {
        Self { tabs: Some(tabs), ..Self::default() }
    }

    pub fn events(&self) -> Vec<WidgetEvent> {
        self.log.lock().clone()
    }

    pub fn editor_options(&self) -> Vec<EditorOptions> {
        self.editor_options.lock().clone()
    }

    fn widget(&self, kind: WidgetKind, tab_id: TabId) -> Box<dyn Widget> {
        self.log.lock().push(WidgetEvent::Created { kind, tab_id });
        Box::new(RecordingWidget { kind, tab_id, log: self.log.clone(), tabs: self.tabs.clone() })
    }
}

impl WidgetFactory for RecordingWidgetFactory {
    fn editor(&self, tab_id: TabId, options: EditorOptions) -> Box<dyn Widget> {
        self.editor_options.lock().push(options);
        self.widget(WidgetKind::Editor, tab_id)
    }

    fn terminal(&self, tab_id: TabId) -> Box<dyn Widget> {
        self.widget(WidgetKind::Terminal, tab_id)
    }

    fn grid(&self, tab_id: TabId) -> Box<dyn Widget> {
        self.widget(WidgetKind::Grid, tab_id)
    }
}
