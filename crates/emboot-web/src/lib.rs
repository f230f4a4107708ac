//! Browser shell for an Emscripten guest
//!
//! This crate runs on the page's main thread, in front of the guest's own
//! Emscripten loader. It provisions the WebGL2 context, prepares the guest
//! module (`preRun`, status callbacks, sync entry points), and drives the
//! platform-independent [`emboot_core::Session`] through [`WebHal`].
//!
//! ## Module Structure
//!
//! - `hal` - `BootHal` implementation over `web-sys` and the Emscripten module
//! - `module` - `Reflect`-based access to `FS`, `ENV`, `ccall` and friends
//! - `guest` - sync completion callback into the guest (`ccall`)
//! - `listeners` - DOM listeners (audio unlock, context loss, uncaught errors)
//! - `shell` - the `Shell` object exported to JavaScript

// =============================================================================
// Module declarations
// =============================================================================

pub(crate) mod guest;
pub mod hal;
pub(crate) mod listeners;
pub(crate) mod module;
pub(crate) mod shell;

// =============================================================================
// Public re-exports
// =============================================================================

pub use hal::WebHal;
pub use shell::Shell;
