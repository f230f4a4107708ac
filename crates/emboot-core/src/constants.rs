//! Centralized constants for the bootstrap core
//!
//! Paths, environment flags, status texts and timing constants shared by the
//! core and the browser layer are defined here so they can be audited in one place.

// =============================================================================
// Storage
// =============================================================================

/// Logical mount path of the durable namespace. Everything the guest persists lives below it.
pub const MOUNT_PATH: &str = "/persistent";

/// Run dependency held while the initial load of the durable store is in flight
pub const STORAGE_RUN_DEPENDENCY: &str = "persistent-storage";

// =============================================================================
// Guest Environment
// =============================================================================

/// Environment the guest reads at startup, fixed for the browser profile.
///
/// - `TAISEI_NOASYNC`: no asynchronous resource loading (no threads in the page)
/// - `TAISEI_NOUNLOAD`: never unload resources (reloading means refetching)
/// - `TAISEI_PREFER_SDL_VIDEODRIVERS`: the canvas video/input driver
/// - `TAISEI_RENDERER`: the GLES 3.0 backend, which maps onto WebGL2
pub const GUEST_ENV: &[(&str, &str)] = &[
    ("TAISEI_NOASYNC", "1"),
    ("TAISEI_NOUNLOAD", "1"),
    ("TAISEI_PREFER_SDL_VIDEODRIVERS", "emscripten"),
    ("TAISEI_RENDERER", "gles30"),
];

// =============================================================================
// Progress Reporting
// =============================================================================

/// Progress-style status updates closer together than this are dropped.
///
/// Empirical value; override with `BootConfig::progress_debounce_ms`.
pub const PROGRESS_DEBOUNCE_MS: f64 = 30.0;

/// Label shown in front of the `(done/total)` counter while loading
pub const DEFAULT_PROGRESS_LABEL: &str = "Preparing...";

/// Status text once every run dependency has been resolved
pub const DOWNLOADS_COMPLETE_TEXT: &str = "All downloads complete.";

// =============================================================================
// User-facing Failure Messages
// =============================================================================

/// Shown when no WebGL2 context can be obtained
pub const CONTEXT_UNAVAILABLE_MESSAGE: &str =
    "Could not create a WebGL 2.0 context. Your browser or graphics driver does not support it.";

/// Shown after the rendering surface has been lost
pub const CONTEXT_LOST_MESSAGE: &str = "WebGL context lost, please reload the page";

// =============================================================================
// Guest Interface
// =============================================================================

/// Exported guest function receiving `(is_load, error, handle)` sync completions
pub const DEFAULT_SYNC_CALLBACK: &str = "vfs_sync_callback";
