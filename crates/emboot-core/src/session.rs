//! Bootstrap lifecycle
//!
//! A [`Session`] owns the host, the configuration and every component, and
//! enforces the order in which the page may drive them:
//!
//! 1. [`Session::provision_context`] acquires the rendering context. Failure
//!    is fatal: the status surface shows a blocking message and the session
//!    refuses every later step.
//! 2. [`Session::pre_run`] (the guest module's pre-run hook) sets the guest
//!    environment, mounts the durable store, holds the storage run
//!    dependency and starts the initial load. Running it again is a no-op.
//! 3. The initial load's completion releases the run dependency, which lets
//!    the guest's `main` start.
//!
//! The sync bridge only exists after step 2, so a guest request can never be
//! accepted before the mount.

use emboot_hal::{BootHal, CorrelationHandle, HostEvent, SyncDirection, SyncRequestId};

use crate::audio::{AudioUnlockGate, GateAction};
use crate::config::BootConfig;
use crate::constants::{
    CONTEXT_LOST_MESSAGE, CONTEXT_UNAVAILABLE_MESSAGE, GUEST_ENV, MOUNT_PATH, STORAGE_RUN_DEPENDENCY,
};
use crate::error::BootError;
use crate::mount::StorageMount;
use crate::progress::ProgressReporter;
use crate::provision::ProvisionedContext;
use crate::sync::{Completion, GuestSyncCallback, SyncBridge, SyncError, SyncTicket};

/// Lifecycle phase of a session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BootPhase {
    /// Constructed, nothing acquired
    Created,
    /// Rendering context acquired and activated
    Provisioned,
    /// Durable store mounted, initial load in flight, guest held back
    Mounted,
    /// Initial load done, guest released
    Running,
    /// Fatal error; terminal for the page
    Failed,
}

/// The single bootstrap session of a page
pub struct Session<H: BootHal> {
    hal: H,
    config: BootConfig,
    phase: BootPhase,
    surface: Option<ProvisionedContext<H::Context>>,
    mount: StorageMount,
    bridge: Option<SyncBridge>,
    guest: Option<Box<dyn GuestSyncCallback>>,
    progress: ProgressReporter,
    audio: AudioUnlockGate,
}

impl<H: BootHal> Session<H> {
    /// Create a session from a validated configuration
    pub fn new(hal: H, config: BootConfig) -> Result<Self, BootError> {
        config.validate()?;
        let progress = ProgressReporter::new(config.progress_label.clone(), config.progress_debounce_ms);

        Ok(Self {
            hal,
            config,
            phase: BootPhase::Created,
            surface: None,
            mount: StorageMount::new(),
            bridge: None,
            guest: None,
            progress,
            audio: AudioUnlockGate::new(),
        })
    }

    pub fn hal(&self) -> &H {
        &self.hal
    }

    pub fn config(&self) -> &BootConfig {
        &self.config
    }

    pub fn phase(&self) -> BootPhase {
        self.phase
    }

    pub fn progress(&self) -> &ProgressReporter {
        &self.progress
    }

    pub fn surface(&self) -> Option<&ProvisionedContext<H::Context>> {
        self.surface.as_ref()
    }

    pub fn bridge(&self) -> Option<&SyncBridge> {
        self.bridge.as_ref()
    }

    pub fn audio_unlocked(&self) -> bool {
        self.audio.is_unlocked()
    }

    /// Acquire and activate the rendering context (step 1).
    ///
    /// Idempotent once it succeeded.
    pub fn provision_context(&mut self) -> Result<&H::Context, BootError> {
        if self.phase == BootPhase::Failed {
            return Err(BootError::Failed);
        }

        if self.surface.is_none() {
            match ProvisionedContext::provision(&self.hal) {
                Ok(provisioned) => {
                    self.surface = Some(provisioned);
                    self.phase = BootPhase::Provisioned;
                }
                Err(e) => {
                    self.fail(CONTEXT_UNAVAILABLE_MESSAGE);
                    return Err(e.into());
                }
            }
        }

        match &self.surface {
            Some(surface) => Ok(surface.context()),
            None => Err(BootError::Failed),
        }
    }

    /// Guest pre-run hook (step 2): environment, mount, initial load.
    ///
    /// Some bootstrap paths run the hook twice; the second call only
    /// re-verifies the mount.
    pub fn pre_run(&mut self, guest: Box<dyn GuestSyncCallback>) -> Result<(), BootError> {
        match self.phase {
            BootPhase::Failed => return Err(BootError::Failed),
            BootPhase::Created => {
                return Err(BootError::OutOfOrder {
                    step: "pre_run",
                    requires: "provision_context",
                })
            }
            BootPhase::Mounted | BootPhase::Running => {
                self.mount.ensure_mounted(&self.hal, MOUNT_PATH)?;
                log::debug!("[session] pre_run repeated; mount verified");
                return Ok(());
            }
            BootPhase::Provisioned => {}
        }

        for (key, value) in GUEST_ENV {
            if let Err(e) = self.hal.set_guest_env(key, value) {
                self.fail(&format!("Could not prepare the guest environment: {e}"));
                return Err(e.into());
            }
        }

        let descriptor = match self.mount.ensure_mounted(&self.hal, MOUNT_PATH) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                self.fail(&format!("Could not mount persistent storage: {e}"));
                return Err(e.into());
            }
        };

        self.hal.add_run_dependency(STORAGE_RUN_DEPENDENCY);
        self.bridge = Some(SyncBridge::begin(&self.hal, descriptor));
        self.guest = Some(guest);
        self.phase = BootPhase::Mounted;
        log::info!("[session] Pre-run complete; guest held until initial load finishes");
        Ok(())
    }

    /// Guest entry point: request a flush in `direction`, tagged with `handle`
    pub fn request_sync(&mut self, direction: SyncDirection, handle: CorrelationHandle) -> Result<SyncTicket, BootError> {
        let bridge = self.bridge.as_mut().ok_or(SyncError::NotMounted)?;
        Ok(bridge.request_sync(&self.hal, direction, handle)?)
    }

    /// Host callback: the flush with `request_id` finished
    pub fn notify_sync_complete(&mut self, request_id: SyncRequestId, error: Option<String>) -> Completion {
        let (Some(bridge), Some(guest)) = (self.bridge.as_mut(), self.guest.as_deref()) else {
            log::error!(
                "[session] Sync completion for request_id {} before mount (orphaned response)",
                request_id
            );
            return Completion::Orphan;
        };

        let completion = bridge.complete(&self.hal, guest, request_id, error);
        if let Completion::InitialLoad(_) = completion {
            self.hal.remove_run_dependency(STORAGE_RUN_DEPENDENCY);
            if self.phase == BootPhase::Mounted {
                self.phase = BootPhase::Running;
            }
            log::info!("[session] Guest released");
        }
        completion
    }

    /// Host signal: `remaining` run dependencies are outstanding
    pub fn monitor_run_dependencies(&mut self, remaining: u32) {
        self.progress.monitor_run_dependencies(&self.hal, remaining);
    }

    /// Status text from the guest or the host module
    pub fn set_status(&mut self, text: &str) -> bool {
        self.progress.set_status(&self.hal, text)
    }

    /// The guest presented its first frame
    pub fn first_frame(&mut self) {
        self.progress.first_frame_presented(&self.hal);
    }

    /// Last-resort handler for an uncaught host-level error.
    ///
    /// The message takes over the status surface; the sync bridge keeps
    /// serving the guest so pending saves still complete.
    pub fn report_error(&mut self, message: &str) {
        self.progress.report_fatal(&self.hal, message);
    }

    /// The rendering surface was lost; always suppresses the default action
    pub fn on_context_lost(&mut self, event: &impl HostEvent) {
        let first = match self.surface.as_mut() {
            Some(surface) => surface.handle_context_lost(event),
            None => {
                event.prevent_default();
                false
            }
        };
        if first {
            self.progress.report_fatal(&self.hal, CONTEXT_LOST_MESSAGE);
        }
    }

    /// A qualifying user gesture for the audio unlock gate
    pub fn on_user_gesture(&mut self) -> GateAction {
        self.audio.on_user_gesture(&self.hal)
    }

    /// Fatal bootstrap failure: terminal for the page
    fn fail(&mut self, message: &str) {
        self.phase = BootPhase::Failed;
        self.progress.report_fatal(&self.hal, message);
    }
}
