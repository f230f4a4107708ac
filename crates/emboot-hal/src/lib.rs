//! Host Abstraction Layer for the emboot shell
//!
//! This crate defines the [`BootHal`] trait that lets the bootstrap core run
//! against different hosts by abstracting the browser facilities it drives:
//!
//! - **Rendering surface**: WebGL2 context acquisition and extension activation
//! - **Guest environment**: environment variables and run dependencies of the
//!   guest module (gating when its `main` may start)
//! - **Virtual filesystem**: directory creation, persistent mounts, async sync
//! - **Audio**: state and resume of the guest's audio output device
//! - **Status surface**: status text, progress bar, spinner, running presentation
//! - **Time**: monotonic milliseconds for debouncing
//!
//! # Platform Implementations
//!
//! - **Browser**: `emboot-web::WebHal` (web-sys, Emscripten `FS`/`IDBFS`)
//! - **Tests**: `emboot-core::testing::MockHal` (recording mock, manual clock)

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Request ID for tracking async filesystem sync operations
pub type SyncRequestId = u32;

/// Host Abstraction Layer trait
///
/// All methods are called from the browser main thread; there is no
/// `Send`/`Sync` requirement. Operations that complete asynchronously
/// (`fs_sync_start`) return immediately, and their result is pushed back
/// into the core by the platform layer via `Session::notify_sync_complete`.
pub trait BootHal: 'static {
    /// Handle to an acquired rendering context (WebGL2 context on the browser)
    type Context;

    // === Rendering Surface ===

    /// Acquire a hardware-accelerated rendering context with exactly the
    /// given attributes.
    ///
    /// # Returns
    /// * `Ok(Context)` - Context acquired
    /// * `Err(HalError::Unavailable)` - The host cannot satisfy the request
    fn acquire_context(&self, attrs: &ContextAttributes) -> Result<Self::Context, HalError>;

    /// List every optional capability (GL extension) the context reports as supported.
    fn supported_extensions(&self, ctx: &Self::Context) -> Vec<String>;

    /// Activate one optional capability.
    ///
    /// Returns `false` if the host refused to hand out the extension object.
    fn enable_extension(&self, ctx: &Self::Context, name: &str) -> bool;

    // === Guest Environment ===

    /// Set an environment variable visible to the guest at startup
    fn set_guest_env(&self, key: &str, value: &str) -> Result<(), HalError>;

    /// Hold back guest `main` until the matching `remove_run_dependency`
    fn add_run_dependency(&self, tag: &str);

    /// Release a run dependency added with `add_run_dependency`
    fn remove_run_dependency(&self, tag: &str);

    // === Virtual Filesystem ===

    /// Create a directory in the guest's virtual filesystem
    ///
    /// # Returns
    /// * `Ok(())` - Directory created
    /// * `Err(HalError::AlreadyExists)` - Path already exists
    fn fs_mkdir(&self, path: &str) -> Result<(), HalError>;

    /// Check whether a persistent backing store is attached at `path`
    fn fs_is_mountpoint(&self, path: &str) -> bool;

    /// Attach the durable (IndexedDB) backing store at `path`
    fn fs_mount_persistent(&self, path: &str) -> Result<(), HalError>;

    /// Start an async flush between the live view and the durable store
    /// (returns immediately).
    ///
    /// The outcome must be delivered exactly once, later, with the same
    /// `request_id`.
    fn fs_sync_start(&self, request_id: SyncRequestId, direction: SyncDirection);

    // === Audio ===

    /// State of the guest's audio output device, `None` while the guest has
    /// not created its audio subsystem yet
    fn audio_state(&self) -> Option<AudioState>;

    /// Ask the audio output device to resume
    fn audio_resume(&self);

    // === Status Surface ===

    /// Replace the status label text
    fn set_status_text(&self, text: &str);

    /// Show the progress bar with `(value, max)`, or hide it with `None`
    fn set_progress(&self, progress: Option<(u32, u32)>);

    /// Show or hide the busy spinner
    fn set_spinner_visible(&self, visible: bool);

    /// Switch the page from "loading" to "running" presentation
    fn show_running(&self);

    /// Bring the status surface back over the canvas for a terminal message.
    ///
    /// Must work after [`BootHal::show_running`] hid it.
    fn show_failure(&self);

    // === Time ===

    /// Monotonic time in milliseconds
    ///
    /// On the browser: `performance.now()`
    fn now_ms(&self) -> f64;
}

/// HAL errors
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum HalError {
    /// The host cannot provide the requested facility
    #[error("not available on this host: {0}")]
    Unavailable(String),
    /// Path already exists
    #[error("already exists")]
    AlreadyExists,
    /// Path or object not found
    #[error("not found")]
    NotFound,
    /// Error raised by the host itself, carried verbatim
    #[error("host error: {0}")]
    Host(String),
}

/// Direction of a filesystem sync
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SyncDirection {
    /// Pull from the durable store into the live filesystem view
    Load,
    /// Push the live filesystem view into the durable store
    Save,
}

impl SyncDirection {
    /// Convert from the guest's `is_load` flag
    pub fn from_is_load(is_load: bool) -> Self {
        if is_load {
            Self::Load
        } else {
            Self::Save
        }
    }

    pub fn is_load(self) -> bool {
        self == Self::Load
    }

    /// Value of the `populate` argument of Emscripten's `FS.syncfs`
    pub fn populate(self) -> bool {
        self.is_load()
    }
}

/// Opaque token supplied by the guest with a sync request.
///
/// Never interpreted by the shell; only echoed back in the completion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CorrelationHandle(pub u64);

impl CorrelationHandle {
    /// Largest handle that survives a round trip through a JS number
    pub const MAX_JS_SAFE: u64 = (1 << 53) - 1;

    /// Convert from a JS number, rejecting fractions, negatives and values
    /// beyond 2^53 - 1.
    pub fn from_f64(value: f64) -> Option<Self> {
        if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= Self::MAX_JS_SAFE as f64 {
            Some(Self(value as u64))
        } else {
            None
        }
    }

    pub fn as_f64(self) -> f64 {
        self.0 as f64
    }
}

impl core::fmt::Display for CorrelationHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// State of the audio output device (mirrors `AudioContextState`)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AudioState {
    Suspended,
    Running,
    Closed,
}

impl AudioState {
    /// Parse the string form reported by `AudioContext.state`
    pub fn from_js_str(s: &str) -> Option<Self> {
        match s {
            "suspended" => Some(Self::Suspended),
            "running" => Some(Self::Running),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

/// GPU power preference (mirrors `WebGLPowerPreference`)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PowerPreference {
    Default,
    LowPower,
    HighPerformance,
}

/// Context creation attributes, serialized in the shape `getContext()` expects
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextAttributes {
    pub alpha: bool,
    pub antialias: bool,
    pub depth: bool,
    pub power_preference: PowerPreference,
    pub premultiplied_alpha: bool,
    pub preserve_drawing_buffer: bool,
    pub stencil: bool,
}

/// A host event whose default action can be suppressed (DOM `Event`)
pub trait HostEvent {
    fn prevent_default(&self);
}
