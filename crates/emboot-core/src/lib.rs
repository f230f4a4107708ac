//! emboot bootstrap core
//!
//! Platform-independent state machines that bring a WebAssembly guest up
//! inside a web page and supervise it while it runs:
//!
//! - **provision**: WebGL2 context acquisition with a fixed profile and
//!   activation of every advertised extension
//! - **mount**: the durable `/persistent` namespace, established before the guest starts
//! - **sync**: guest-requested flushes between the live filesystem and the
//!   durable store, completed exactly once per request by correlation handle
//! - **progress**: debounced "dependencies remaining" status line and the
//!   first-frame presentation gate
//! - **audio**: one-shot unlock of the suspended audio device on user input
//! - **session**: the bootstrap lifecycle tying the above together
//!
//! # Lifecycle
//!
//! ```text
//!   Session::new ──► provision_context ──► pre_run ──► (initial load) ──► guest main
//!        │                 │                  │                │
//!    BootConfig      fatal on failure    env + mount     run dependency
//!                                        + bridge        released here
//! ```
//!
//! All host interaction goes through [`emboot_hal::BootHal`]; the browser
//! implementation lives in `emboot-web`, and [`testing::MockHal`] drives the
//! same code in tests.

pub mod audio;
pub mod config;
pub mod constants;
pub mod error;
pub mod mount;
pub mod progress;
pub mod provision;
pub mod session;
pub mod sync;
pub mod testing;

pub use audio::{AudioUnlockGate, GateAction};
pub use config::{BootConfig, ConfigError};
pub use error::BootError;
pub use mount::{BackingStore, MountDescriptor, MountError, StorageMount};
pub use progress::{FirstFrameGate, LoadPhase, ProgressReporter};
pub use provision::{ProvisionError, ProvisionedContext, SurfaceState};
pub use session::{BootPhase, Session};
pub use sync::{Completion, GuestSyncCallback, SyncBridge, SyncError, SyncOutcome, SyncTicket};

pub use emboot_hal::{
    AudioState, BootHal, ContextAttributes, CorrelationHandle, HalError, HostEvent,
    PowerPreference, SyncDirection, SyncRequestId,
};
