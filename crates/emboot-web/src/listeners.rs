//! DOM event listeners owned by the shell
//!
//! Each listener keeps its `Closure` alive for as long as it is attached.

use emboot_hal::HostEvent;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::EventTarget;

/// `web_sys::Event` seen through the core's event abstraction
pub(crate) struct DomEvent<'a>(pub(crate) &'a web_sys::Event);

impl HostEvent for DomEvent<'_> {
    fn prevent_default(&self) {
        self.0.prevent_default();
    }
}

/// One callback attached to one or more `(target, event type)` pairs
pub(crate) struct Listener {
    targets: Vec<(EventTarget, &'static str)>,
    closure: Closure<dyn FnMut(JsValue)>,
}

impl Listener {
    pub(crate) fn attach(
        targets: Vec<(EventTarget, &'static str)>,
        callback: impl FnMut(JsValue) + 'static,
    ) -> Result<Self, JsValue> {
        let closure = Closure::wrap(Box::new(callback) as Box<dyn FnMut(JsValue)>);
        for (target, event_type) in &targets {
            target.add_event_listener_with_callback(event_type, closure.as_ref().unchecked_ref())?;
        }
        Ok(Self { targets, closure })
    }

    /// Remove the callback from every target
    pub(crate) fn detach(&self) {
        for (target, event_type) in &self.targets {
            if let Err(e) =
                target.remove_event_listener_with_callback(event_type, self.closure.as_ref().unchecked_ref())
            {
                log::warn!("[listeners] removeEventListener({}) failed: {:?}", event_type, e);
            }
        }
    }
}

/// Text of an `error` event; read through `Reflect` because `message` may be missing
pub(crate) fn error_event_message(event: &JsValue) -> String {
    js_sys::Reflect::get(event, &"message".into())
        .ok()
        .and_then(|v| v.as_string())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| "Unknown error".to_string())
}
