//! Scripted collaborators shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use rtsave_engine::collab::{
    Collaborators, ConflictChoice, ConflictPrompt, DecisionPrompt, EditorSurface, ErrorKind,
    EventSink, History, Reporter, SaveBackend, SaverEvent,
};
use rtsave_engine::protocol::{
    MergeRequest, MergeResult, RemoteContent, SafeSaveRequest, VersionInfo, VersionQuery,
};
use rtsave_engine::{
    HubTransport, PeerMap, PeerState, RealtimeTransport, Saver, SaverConfig, SaverError, Session,
    SharedMapHub,
};
use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio::time::{sleep, Duration, Instant};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Config with no save gap and a check cycle long enough that the
/// background scheduler stays out of the way.
pub fn test_config() -> SaverConfig {
    SaverConfig {
        document: "Main.WebHome".into(),
        user_name: "xwiki:XWiki.Alice".into(),
        channel: "Main.WebHome-wiki".into(),
        save_interval_ms: 0,
        check_cycle_ms: 3_600_000,
        ..SaverConfig::default()
    }
}

/// Poll `cond` until it holds, panicking after two seconds.
pub async fn wait_for<F, Fut>(what: &str, mut cond: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + Duration::from_secs(2);
    while !cond().await {
        if Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        sleep(Duration::from_millis(10)).await;
    }
}

pub fn merge_result(content: &str, merged: bool, save_required: bool) -> MergeResult {
    MergeResult {
        content: content.into(),
        merged,
        save_required,
        current_version: "1.1".into(),
        ..MergeResult::default()
    }
}

/// Lets a test act while a merge request is "on the wire".
#[derive(Default)]
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

/// In-memory wiki: one document, versions `N.1`.
pub struct MockBackend {
    merges: Mutex<VecDeque<Result<MergeResult, SaverError>>>,
    server: Mutex<(u32, String)>,
    gate: Mutex<Option<Arc<Gate>>>,
    pub fail_version: AtomicBool,
    pub report_new: AtomicBool,
    pub save_failure: Mutex<Option<SaverError>>,
    pub merge_calls: AtomicUsize,
    pub version_calls: AtomicUsize,
    pub save_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
    pub last_merge: Mutex<Option<MergeRequest>>,
}

impl MockBackend {
    pub fn new(server_content: &str) -> Arc<Self> {
        Arc::new(Self {
            merges: Mutex::new(VecDeque::new()),
            server: Mutex::new((1, server_content.to_string())),
            gate: Mutex::new(None),
            fail_version: AtomicBool::new(false),
            report_new: AtomicBool::new(false),
            save_failure: Mutex::new(None),
            merge_calls: AtomicUsize::new(0),
            version_calls: AtomicUsize::new(0),
            save_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
            last_merge: Mutex::new(None),
        })
    }

    pub fn script_merge(&self, result: MergeResult) {
        self.merges.lock().unwrap().push_back(Ok(result));
    }

    pub fn script_merge_error(&self, error: SaverError) {
        self.merges.lock().unwrap().push_back(Err(error));
    }

    /// Hold the next merges until `gate.release` is notified.
    pub fn gate_merges(&self) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn server_version(&self) -> String {
        format!("{}.1", self.server.lock().unwrap().0)
    }

    pub fn server_content(&self) -> String {
        self.server.lock().unwrap().1.clone()
    }

    pub fn merges(&self) -> usize {
        self.merge_calls.load(Ordering::SeqCst)
    }

    pub fn saves(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SaveBackend for MockBackend {
    async fn merge(&self, request: &MergeRequest) -> Result<MergeResult, SaverError> {
        self.merge_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_merge.lock().unwrap() = Some(request.clone());

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        let scripted = self.merges.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(merge_result(&request.content, false, true)))
    }

    async fn version(&self, _query: &VersionQuery) -> Result<VersionInfo, SaverError> {
        self.version_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_version.load(Ordering::SeqCst) {
            return Err(SaverError::Transport("version endpoint down".into()));
        }
        let (major, content) = self.server.lock().unwrap().clone();
        Ok(VersionInfo {
            version: format!("{major}.1"),
            content,
            is_new: self.report_new.load(Ordering::SeqCst),
        })
    }

    async fn fetch_remote(&self) -> Result<RemoteContent, SaverError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(RemoteContent {
            content: self.server_content(),
        })
    }

    async fn save_document(&self, form: &str) -> Result<(), SaverError> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.save_failure.lock().unwrap().clone() {
            return Err(error);
        }
        let mut server = self.server.lock().unwrap();
        server.0 += 1;
        server.1 = form.to_string();
        Ok(())
    }
}

/// Editor whose save form is its raw text.
pub struct MockSurface {
    text: Mutex<Option<String>>,
    pub writes: Mutex<Vec<(String, bool)>>,
    pub safe_saves: Mutex<Vec<SafeSaveRequest>>,
    pub redirects: AtomicUsize,
}

impl MockSurface {
    pub fn new(text: &str) -> Arc<Self> {
        Arc::new(Self {
            text: Mutex::new(Some(text.to_string())),
            writes: Mutex::new(Vec::new()),
            safe_saves: Mutex::new(Vec::new()),
            redirects: AtomicUsize::new(0),
        })
    }

    /// Simulate typing.
    pub fn type_text(&self, text: &str) {
        *self.text.lock().unwrap() = Some(text.to_string());
    }

    pub fn break_content(&self) {
        *self.text.lock().unwrap() = None;
    }

    pub fn text(&self) -> String {
        self.text.lock().unwrap().clone().unwrap_or_default()
    }

    pub fn writes(&self) -> Vec<(String, bool)> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl EditorSurface for MockSurface {
    fn text_value(&self) -> Option<String> {
        self.text.lock().unwrap().clone()
    }

    async fn set_text_value(&self, content: &str, overwrite: bool) -> Result<(), SaverError> {
        self.writes.lock().unwrap().push((content.to_string(), overwrite));
        *self.text.lock().unwrap() = Some(content.to_string());
        Ok(())
    }

    fn save_value(&self) -> String {
        self.text()
    }

    async fn safe_save(&self, request: SafeSaveRequest) -> Result<(), SaverError> {
        self.safe_saves.lock().unwrap().push(request);
        Ok(())
    }

    fn redirect_to_view(&self) {
        self.redirects.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct MockHistory(pub Mutex<HashSet<String>>);

impl MockHistory {
    pub fn remember(&self, content: &str) {
        self.0.lock().unwrap().insert(content.to_string());
    }
}

impl History for MockHistory {
    fn depth_of_state(&self, content: &str) -> Option<usize> {
        self.0.lock().unwrap().contains(content).then_some(1)
    }
}

/// Answers prompts from a script; an empty script never answers.
#[derive(Default)]
pub struct ScriptedPrompt {
    answers: Mutex<VecDeque<ConflictChoice>>,
    pub asked: AtomicUsize,
    pub opened: Notify,
}

impl ScriptedPrompt {
    pub fn answer(&self, choice: ConflictChoice) {
        self.answers.lock().unwrap().push_back(choice);
    }
}

#[async_trait]
impl DecisionPrompt for ScriptedPrompt {
    async fn choose(&self, _prompt: &ConflictPrompt) -> ConflictChoice {
        self.asked.fetch_add(1, Ordering::SeqCst);
        self.opened.notify_one();
        let answer = self.answers.lock().unwrap().pop_front();
        match answer {
            Some(choice) => choice,
            None => std::future::pending().await,
        }
    }
}

#[derive(Default)]
pub struct RecordingReporter {
    pub shown: Mutex<Vec<(ErrorKind, String)>>,
    pub crashes: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn kinds(&self) -> Vec<ErrorKind> {
        self.shown.lock().unwrap().iter().map(|(k, _)| *k).collect()
    }
}

impl Reporter for RecordingReporter {
    fn show(&self, kind: ErrorKind, details: &str) {
        self.shown.lock().unwrap().push((kind, details.to_string()));
    }

    fn safe_crash(&self, context: &str, _details: &str) {
        self.crashes.lock().unwrap().push(context.to_string());
    }
}

#[derive(Default)]
pub struct RecordingEvents(pub Mutex<Vec<SaverEvent>>);

impl RecordingEvents {
    pub fn all(&self) -> Vec<SaverEvent> {
        self.0.lock().unwrap().clone()
    }
}

impl EventSink for RecordingEvents {
    fn emit(&self, event: SaverEvent) {
        self.0.lock().unwrap().push(event);
    }
}

/// Publish `state` under `editor_type` from an outside participant.
pub async fn announce(
    hub: &Arc<SharedMapHub>,
    channel: &str,
    editor_type: &str,
    state: PeerState,
) -> HubTransport {
    let other = hub.connect(channel);
    let _events = other.join().await.unwrap();
    let (mut map, _) = PeerMap::parse(&other.user_doc()).unwrap();
    map.insert(editor_type, state);
    other.content_update(&map.to_json().unwrap()).await.unwrap();
    other.settle().await;
    other
}

pub fn peer_state(version: &str, by: &str) -> PeerState {
    PeerState {
        version: version.into(),
        by: by.into(),
        hash: "0".repeat(64),
        editor_name: "Wiki".into(),
    }
}

/// One editor tab wired to mocks and a hub channel.
pub struct Rig {
    pub hub: Arc<SharedMapHub>,
    pub saver: Saver,
    pub backend: Arc<MockBackend>,
    pub surface: Arc<MockSurface>,
    pub history: Arc<MockHistory>,
    pub prompt: Arc<ScriptedPrompt>,
    pub reporter: Arc<RecordingReporter>,
    pub events: Arc<RecordingEvents>,
}

impl Rig {
    pub fn new(hub: &Arc<SharedMapHub>, config: SaverConfig, backend: Arc<MockBackend>, text: &str) -> Self {
        let surface = MockSurface::new(text);
        let history = Arc::new(MockHistory::default());
        let prompt = Arc::new(ScriptedPrompt::default());
        let reporter = Arc::new(RecordingReporter::default());
        let events = Arc::new(RecordingEvents::default());
        let collab = Collaborators::new(backend.clone(), surface.clone(), history.clone(), prompt.clone())
            .with_reporter(reporter.clone())
            .with_events(events.clone());
        let transport = Arc::new(hub.connect(config.channel.clone()));
        Self {
            hub: hub.clone(),
            saver: Saver::new(config, collab, transport),
            backend,
            surface,
            history,
            prompt,
            reporter,
            events,
        }
    }

    /// Single tab on a fresh hub, started and past initialization.
    pub async fn started(config: SaverConfig, server_content: &str, text: &str) -> Self {
        init_logging();
        let hub = SharedMapHub::new(64);
        let rig = Self::new(&hub, config, MockBackend::new(server_content), text);
        rig.start().await;
        rig
    }

    pub async fn start(&self) {
        self.saver.start().await.unwrap();
        let session = self.session().clone();
        wait_for("transport ready", || {
            let session = session.clone();
            async move { !session.is_initializing().await }
        })
        .await;
    }

    pub fn session(&self) -> &Arc<Session> {
        self.saver.session()
    }

    pub async fn version(&self) -> String {
        self.session().record.read().await.version().to_string()
    }

    pub async fn mark_edited(&self) {
        self.saver.set_local_edit_flag(true).await;
    }
}
