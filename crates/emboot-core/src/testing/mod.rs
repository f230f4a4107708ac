//! Test doubles for the bootstrap core
//!
//! - [`MockHal`]: recording host with a manual clock and scripted behaviour
//! - [`RecordingGuest`]: guest sync callback that records every completion
//! - [`MockEvent`]: host event remembering whether its default was prevented

mod mock_hal;

pub use mock_hal::{MockContext, MockHal, RunDependencyEvent};

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use emboot_hal::{CorrelationHandle, HostEvent};

use crate::sync::GuestSyncCallback;

/// One recorded guest callback: `(is_load, error, handle)`
pub type GuestCall = (bool, Option<String>, CorrelationHandle);

/// Guest callback recording every completion.
///
/// Clones share the same record, so a test can keep one clone while the
/// session owns another.
#[derive(Clone, Default)]
pub struct RecordingGuest {
    calls: Rc<RefCell<Vec<GuestCall>>>,
}

impl RecordingGuest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<GuestCall> {
        self.calls.borrow().clone()
    }
}

impl GuestSyncCallback for RecordingGuest {
    fn sync_complete(&self, is_load: bool, error: Option<&str>, handle: CorrelationHandle) {
        self.calls
            .borrow_mut()
            .push((is_load, error.map(str::to_string), handle));
    }
}

/// Host event with an observable `prevent_default`
#[derive(Default)]
pub struct MockEvent {
    prevented: Cell<bool>,
}

impl MockEvent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_prevented(&self) -> bool {
        self.prevented.get()
    }
}

impl HostEvent for MockEvent {
    fn prevent_default(&self) {
        self.prevented.set(true);
    }
}
