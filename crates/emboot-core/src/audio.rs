//! Audio unlock gate
//!
//! Browsers start every `AudioContext` suspended until the user interacts
//! with the page. The gate listens for a click on the canvas or any key press
//! and asks the guest's audio device to resume. A resume request can take
//! effect later (or not at all), so the gate only retires once the device
//! actually reports `running`; until then every qualifying event tries again.

use emboot_hal::{AudioState, BootHal};

/// What the platform layer should do with its input listeners
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateAction {
    /// Keep the listeners attached
    StayArmed,
    /// Audio is running; remove the listeners for good
    Retire,
}

/// One-shot latch: locked → unlocked, never re-armed
#[derive(Debug, Default)]
pub struct AudioUnlockGate {
    unlocked: bool,
    resume_requests: u32,
}

impl AudioUnlockGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_unlocked(&self) -> bool {
        self.unlocked
    }

    /// Number of resume requests issued so far
    pub fn resume_requests(&self) -> u32 {
        self.resume_requests
    }

    /// Handle one qualifying user gesture (canvas click, document keydown)
    pub fn on_user_gesture<H: BootHal>(&mut self, hal: &H) -> GateAction {
        if self.unlocked {
            return GateAction::Retire;
        }

        match hal.audio_state() {
            None => {
                log::debug!("[audio] Gesture before the guest created its audio device");
                return GateAction::StayArmed;
            }
            Some(AudioState::Running) => {}
            Some(AudioState::Suspended) => {
                self.resume_requests += 1;
                log::debug!("[audio] Requesting resume (attempt {})", self.resume_requests);
                hal.audio_resume();
            }
            Some(AudioState::Closed) => {
                log::warn!("[audio] Audio device is closed; staying armed");
                return GateAction::StayArmed;
            }
        }

        // Re-check rather than trusting the resume request
        if hal.audio_state() == Some(AudioState::Running) {
            self.unlocked = true;
            log::info!("[audio] Audio unlocked");
            GateAction::Retire
        } else {
            GateAction::StayArmed
        }
    }
}
