//! Loading progress and status surface
//!
//! The host reports how many run dependencies (downloads, preloads, the
//! storage initial load) are still outstanding. [`ProgressReporter`] turns
//! that counter into a status line `<label> (<done>/<total>)`, debounced so a
//! burst of resolved dependencies does not flood the page with near-identical
//! updates.
//!
//! Debounce rules for [`ProgressReporter::set_status`]:
//! - text identical to the last emission is always dropped
//! - progress-style text (containing `(current/total)`) is dropped when it
//!   arrives less than the debounce interval after the last emission
//! - any other text is never dropped for timing reasons

use emboot_hal::BootHal;

use crate::constants::DOWNLOADS_COMPLETE_TEXT;

/// Phase of the loading state machine
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadPhase {
    /// No dependency signal received yet
    Idle,
    /// Dependencies outstanding
    Loading,
    /// Every dependency resolved (entered once)
    Complete,
}

/// A `label (current/total)` status text, split into its parts
#[derive(Clone, Debug, PartialEq)]
pub struct ProgressText<'a> {
    pub label: &'a str,
    pub current: f64,
    pub total: u32,
}

/// Find the first `label(current/total)` group in `text`.
///
/// `label` is the run of non-`(` characters before the group and must not be
/// empty; `current` may carry a fractional part.
pub fn parse_progress(text: &str) -> Option<ProgressText<'_>> {
    let mut label_start = 0;

    for (open, _) in text.match_indices('(') {
        let label = &text[label_start..open];
        label_start = open + 1;
        if label.is_empty() {
            continue;
        }

        let rest = &text[open + 1..];
        let Some(close) = rest.find(')') else {
            continue;
        };
        let Some((current, total)) = rest[..close].split_once('/') else {
            continue;
        };
        if !is_decimal(current) || total.is_empty() || !total.bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }
        let (Ok(current), Ok(total)) = (current.parse::<f64>(), total.parse::<u32>()) else {
            continue;
        };
        return Some(ProgressText {
            label,
            current,
            total,
        });
    }
    None
}

/// `\d+(\.\d+)?`
fn is_decimal(s: &str) -> bool {
    let (int, frac) = match s.split_once('.') {
        Some((int, frac)) => (int, Some(frac)),
        None => (s, None),
    };
    let digits = |p: &str| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit());
    digits(int) && frac.map_or(true, digits)
}

/// Gate for the "loading" → "running" page transition.
///
/// Opens once loading has completed *and* the guest has presented its first
/// frame, in either order, and fires exactly once.
#[derive(Debug, Default)]
pub struct FirstFrameGate {
    allowed: bool,
    signalled: bool,
    shown: bool,
}

impl FirstFrameGate {
    pub fn is_shown(&self) -> bool {
        self.shown
    }

    /// Loading has finished; the transition may proceed
    pub fn allow<H: BootHal>(&mut self, hal: &H) {
        self.allowed = true;
        self.try_show(hal);
    }

    /// The guest presented its first frame
    pub fn signal<H: BootHal>(&mut self, hal: &H) {
        self.signalled = true;
        self.try_show(hal);
    }

    fn try_show<H: BootHal>(&mut self, hal: &H) {
        if self.allowed && self.signalled && !self.shown {
            self.shown = true;
            log::info!("[progress] First frame shown");
            hal.show_running();
        }
    }
}

/// Debounced status line driven by the run-dependency counter
pub struct ProgressReporter {
    label: String,
    debounce_ms: f64,
    /// High-water mark of outstanding dependencies
    total: u32,
    remaining: u32,
    phase: LoadPhase,
    last_text: Option<String>,
    last_emit_ms: f64,
    /// Set once a fatal error owns the status surface
    failed: bool,
    first_frame: FirstFrameGate,
}

impl ProgressReporter {
    pub fn new(label: impl Into<String>, debounce_ms: f64) -> Self {
        Self {
            label: label.into(),
            debounce_ms,
            total: 0,
            remaining: 0,
            phase: LoadPhase::Idle,
            last_text: None,
            last_emit_ms: f64::NEG_INFINITY,
            failed: false,
            first_frame: FirstFrameGate::default(),
        }
    }

    pub fn phase(&self) -> LoadPhase {
        self.phase
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn last_text(&self) -> Option<&str> {
        self.last_text.as_deref()
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn first_frame(&self) -> &FirstFrameGate {
        &self.first_frame
    }

    /// Host signal: `remaining` run dependencies are outstanding
    pub fn monitor_run_dependencies<H: BootHal>(&mut self, hal: &H, remaining: u32) {
        if self.phase == LoadPhase::Complete {
            log::debug!(
                "[progress] Ignoring dependency signal after completion: remaining={}",
                remaining
            );
            return;
        }

        self.total = self.total.max(remaining);
        self.remaining = remaining;

        if remaining > 0 {
            self.phase = LoadPhase::Loading;
            let text = format!("{} ({}/{})", self.label, self.total - remaining, self.total);
            self.set_status(hal, &text);
        } else {
            self.phase = LoadPhase::Complete;
            self.set_status(hal, DOWNLOADS_COMPLETE_TEXT);
            if !self.failed {
                self.first_frame.allow(hal);
            }
        }
    }

    /// Show `text` on the status surface, subject to debouncing.
    ///
    /// Returns whether the text was emitted.
    pub fn set_status<H: BootHal>(&mut self, hal: &H, text: &str) -> bool {
        if self.failed {
            if !text.is_empty() {
                log::error!("[post-exception status] {}", text);
            }
            return false;
        }
        if self.last_text.as_deref() == Some(text) {
            return false;
        }

        let now = hal.now_ms();
        let progress = parse_progress(text);
        if progress.is_some() && now - self.last_emit_ms < self.debounce_ms {
            return false;
        }

        self.last_emit_ms = now;
        self.last_text = Some(text.to_string());

        match progress {
            Some(p) => {
                hal.set_status_text(p.label.trim_end());
                hal.set_progress(Some(((p.current * 100.0).round() as u32, p.total.saturating_mul(100))));
                hal.set_spinner_visible(true);
            }
            None => {
                hal.set_progress(None);
                if text.is_empty() {
                    hal.set_spinner_visible(false);
                }
                hal.set_status_text(text);
            }
        }
        true
    }

    /// The guest presented its first frame
    pub fn first_frame_presented<H: BootHal>(&mut self, hal: &H) {
        // The running view would cover a terminal message
        if self.failed {
            log::debug!("[progress] First frame after failure; status surface kept");
            return;
        }
        self.first_frame.signal(hal);
    }

    /// Put a terminal error on the status surface.
    ///
    /// Bypasses debouncing; later status updates only go to the log.
    pub fn report_fatal<H: BootHal>(&mut self, hal: &H, message: &str) {
        if self.failed {
            log::error!("[post-exception status] {}", message);
            return;
        }
        log::error!("[progress] {}", message);
        self.failed = true;
        self.last_text = Some(message.to_string());
        hal.set_progress(None);
        hal.set_spinner_visible(false);
        hal.set_status_text(message);
        hal.show_failure();
    }
}
