//! Recording implementation of [`BootHal`]
//!
//! Every call is recorded so tests can assert on what the core asked the
//! host to do. Time only moves when the test calls [`MockHal::advance_ms`].

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use emboot_hal::{AudioState, BootHal, ContextAttributes, HalError, SyncDirection, SyncRequestId};

/// Rendering context handed out by [`MockHal`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MockContext {
    pub id: u32,
}

/// Run-dependency bookkeeping event
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunDependencyEvent {
    Added(String),
    Removed(String),
}

/// Mock HAL for unit and integration tests
pub struct MockHal {
    // Scripted behaviour
    context_available: bool,
    extensions: Vec<String>,
    refused_extensions: Vec<String>,
    fs_failure: Option<HalError>,
    env_failure: Option<HalError>,
    resume_outcomes: RefCell<VecDeque<AudioState>>,

    // Host state
    clock_ms: Cell<f64>,
    dirs: RefCell<BTreeSet<String>>,
    mountpoints: RefCell<BTreeSet<String>>,
    audio: Cell<Option<AudioState>>,
    env: RefCell<BTreeMap<String, String>>,
    contexts_issued: Cell<u32>,

    // Recordings
    requested_attributes: RefCell<Vec<ContextAttributes>>,
    enabled_extensions: RefCell<Vec<String>>,
    run_dependencies: RefCell<Vec<RunDependencyEvent>>,
    mount_calls: Cell<usize>,
    sync_starts: RefCell<Vec<(SyncRequestId, SyncDirection)>>,
    resume_calls: Cell<usize>,
    status_texts: RefCell<Vec<String>>,
    progress_updates: RefCell<Vec<Option<(u32, u32)>>>,
    spinner_updates: RefCell<Vec<bool>>,
    running_shown: Cell<usize>,
    failure_shown: Cell<usize>,
}

impl Default for MockHal {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHal {
    pub fn new() -> Self {
        Self {
            context_available: true,
            extensions: Vec::new(),
            refused_extensions: Vec::new(),
            fs_failure: None,
            env_failure: None,
            resume_outcomes: RefCell::new(VecDeque::new()),
            clock_ms: Cell::new(0.0),
            dirs: RefCell::new(BTreeSet::new()),
            mountpoints: RefCell::new(BTreeSet::new()),
            audio: Cell::new(None),
            env: RefCell::new(BTreeMap::new()),
            contexts_issued: Cell::new(0),
            requested_attributes: RefCell::new(Vec::new()),
            enabled_extensions: RefCell::new(Vec::new()),
            run_dependencies: RefCell::new(Vec::new()),
            mount_calls: Cell::new(0),
            sync_starts: RefCell::new(Vec::new()),
            resume_calls: Cell::new(0),
            status_texts: RefCell::new(Vec::new()),
            progress_updates: RefCell::new(Vec::new()),
            spinner_updates: RefCell::new(Vec::new()),
            running_shown: Cell::new(0),
            failure_shown: Cell::new(0),
        }
    }

    // === Builders ===

    /// Extensions the context reports as supported, in report order
    pub fn with_extensions(mut self, names: &[&str]) -> Self {
        self.extensions = names.iter().map(|n| n.to_string()).collect();
        self
    }

    /// The host refuses to hand out this extension object
    pub fn with_refused_extension(mut self, name: &str) -> Self {
        self.refused_extensions.push(name.to_string());
        self
    }

    /// Context acquisition fails
    pub fn without_context(mut self) -> Self {
        self.context_available = false;
        self
    }

    /// Directory creation and mounting fail with `error`
    pub fn with_fs_failure(mut self, error: HalError) -> Self {
        self.fs_failure = Some(error);
        self
    }

    /// Writing the guest environment fails with `error`
    pub fn with_env_failure(mut self, error: HalError) -> Self {
        self.env_failure = Some(error);
        self
    }

    /// The guest already created its audio device, in `state`
    pub fn with_audio(self, state: AudioState) -> Self {
        self.audio.set(Some(state));
        self
    }

    /// States the device reports after each successive resume request.
    ///
    /// Once the script runs out, a resume moves a suspended device to running.
    pub fn with_resume_outcomes(self, outcomes: &[AudioState]) -> Self {
        self.resume_outcomes.borrow_mut().extend(outcomes.iter().copied());
        self
    }

    // === Test controls ===

    pub fn advance_ms(&self, ms: f64) {
        self.clock_ms.set(self.clock_ms.get() + ms);
    }

    pub fn set_audio_state(&self, state: Option<AudioState>) {
        self.audio.set(state);
    }

    // === Queries ===

    pub fn requested_attributes(&self) -> Vec<ContextAttributes> {
        self.requested_attributes.borrow().clone()
    }

    pub fn enabled_extensions(&self) -> Vec<String> {
        self.enabled_extensions.borrow().clone()
    }

    pub fn env(&self, key: &str) -> Option<String> {
        self.env.borrow().get(key).cloned()
    }

    pub fn run_dependency_events(&self) -> Vec<RunDependencyEvent> {
        self.run_dependencies.borrow().clone()
    }

    /// Run dependencies added and not yet removed
    pub fn outstanding_run_dependencies(&self) -> Vec<String> {
        let mut outstanding: Vec<String> = Vec::new();
        for event in self.run_dependencies.borrow().iter() {
            match event {
                RunDependencyEvent::Added(tag) => outstanding.push(tag.clone()),
                RunDependencyEvent::Removed(tag) => {
                    if let Some(pos) = outstanding.iter().position(|t| t == tag) {
                        outstanding.remove(pos);
                    }
                }
            }
        }
        outstanding
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.dirs.borrow().contains(path)
    }

    pub fn mount_calls(&self) -> usize {
        self.mount_calls.get()
    }

    pub fn sync_starts(&self) -> Vec<(SyncRequestId, SyncDirection)> {
        self.sync_starts.borrow().clone()
    }

    pub fn resume_calls(&self) -> usize {
        self.resume_calls.get()
    }

    pub fn status_texts(&self) -> Vec<String> {
        self.status_texts.borrow().clone()
    }

    pub fn progress_updates(&self) -> Vec<Option<(u32, u32)>> {
        self.progress_updates.borrow().clone()
    }

    pub fn spinner_updates(&self) -> Vec<bool> {
        self.spinner_updates.borrow().clone()
    }

    pub fn running_shown(&self) -> usize {
        self.running_shown.get()
    }

    pub fn failure_shown(&self) -> usize {
        self.failure_shown.get()
    }

    /// Whether the status surface is on screen after the last view switch
    pub fn status_visible(&self) -> bool {
        self.running_shown.get() == 0 || self.failure_shown.get() > 0
    }
}

impl BootHal for MockHal {
    type Context = MockContext;

    fn acquire_context(&self, attrs: &ContextAttributes) -> Result<MockContext, HalError> {
        self.requested_attributes.borrow_mut().push(attrs.clone());
        if !self.context_available {
            return Err(HalError::Unavailable("webgl2".into()));
        }
        let id = self.contexts_issued.get() + 1;
        self.contexts_issued.set(id);
        Ok(MockContext { id })
    }

    fn supported_extensions(&self, _ctx: &MockContext) -> Vec<String> {
        self.extensions.clone()
    }

    fn enable_extension(&self, _ctx: &MockContext, name: &str) -> bool {
        if self.refused_extensions.iter().any(|r| r == name) {
            return false;
        }
        self.enabled_extensions.borrow_mut().push(name.to_string());
        true
    }

    fn set_guest_env(&self, key: &str, value: &str) -> Result<(), HalError> {
        if let Some(e) = &self.env_failure {
            return Err(e.clone());
        }
        self.env.borrow_mut().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn add_run_dependency(&self, tag: &str) {
        self.run_dependencies
            .borrow_mut()
            .push(RunDependencyEvent::Added(tag.to_string()));
    }

    fn remove_run_dependency(&self, tag: &str) {
        self.run_dependencies
            .borrow_mut()
            .push(RunDependencyEvent::Removed(tag.to_string()));
    }

    fn fs_mkdir(&self, path: &str) -> Result<(), HalError> {
        if let Some(err) = &self.fs_failure {
            return Err(err.clone());
        }
        if !self.dirs.borrow_mut().insert(path.to_string()) {
            return Err(HalError::AlreadyExists);
        }
        Ok(())
    }

    fn fs_is_mountpoint(&self, path: &str) -> bool {
        self.mountpoints.borrow().contains(path)
    }

    fn fs_mount_persistent(&self, path: &str) -> Result<(), HalError> {
        if let Some(err) = &self.fs_failure {
            return Err(err.clone());
        }
        if !self.dirs.borrow().contains(path) {
            return Err(HalError::NotFound);
        }
        self.mount_calls.set(self.mount_calls.get() + 1);
        self.mountpoints.borrow_mut().insert(path.to_string());
        Ok(())
    }

    fn fs_sync_start(&self, request_id: SyncRequestId, direction: SyncDirection) {
        self.sync_starts.borrow_mut().push((request_id, direction));
    }

    fn audio_state(&self) -> Option<AudioState> {
        self.audio.get()
    }

    fn audio_resume(&self) {
        self.resume_calls.set(self.resume_calls.get() + 1);
        let scripted = self.resume_outcomes.borrow_mut().pop_front();
        match scripted {
            Some(state) => self.audio.set(Some(state)),
            None => {
                if self.audio.get() == Some(AudioState::Suspended) {
                    self.audio.set(Some(AudioState::Running));
                }
            }
        }
    }

    fn set_status_text(&self, text: &str) {
        self.status_texts.borrow_mut().push(text.to_string());
    }

    fn set_progress(&self, progress: Option<(u32, u32)>) {
        self.progress_updates.borrow_mut().push(progress);
    }

    fn set_spinner_visible(&self, visible: bool) {
        self.spinner_updates.borrow_mut().push(visible);
    }

    fn show_running(&self) {
        self.running_shown.set(self.running_shown.get() + 1);
    }

    fn show_failure(&self) {
        self.failure_shown.set(self.failure_shown.get() + 1);
    }

    fn now_ms(&self) -> f64 {
        self.clock_ms.get()
    }
}
