//! The shell object exported to the page
//!
//! The page creates one [`Shell`] from a JSON [`BootConfig`], asks it for the
//! guest module arguments and passes those to the Emscripten loader:
//!
//! ```js
//! const shell = new Shell(JSON.stringify({ canvas_id: "canvas" }));
//! window.Module = shell.moduleArgs();
//! // <script src="guest.js"> picks up window.Module
//! ```
//!
//! # Re-entrancy
//!
//! The session lives in an `Rc<RefCell<..>>`. Host functions called from
//! inside a session step can call straight back into the shell (e.g.
//! `addRunDependency` invokes `monitorRunDependencies` synchronously, and
//! releasing the last run dependency starts the guest's `main`). Such calls
//! find the session borrowed and are re-dispatched with
//! `wasm_bindgen_futures::spawn_local`, in arrival order.

use std::cell::RefCell;
use std::fmt::Display;
use std::rc::Rc;

use emboot_core::{BootConfig, Completion, CorrelationHandle, GateAction, Session, SyncDirection, SyncRequestId};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{future_to_promise, spawn_local};

use crate::guest::CcallGuest;
use crate::hal::WebHal;
use crate::listeners::{error_event_message, DomEvent, Listener};
use crate::module;

type SharedSession = Rc<RefCell<Session<WebHal>>>;

pub(crate) fn to_js_error(e: impl Display) -> JsValue {
    js_sys::Error::new(&e.to_string()).into()
}

/// Run `f` on the session now, or on a later microtask if it is borrowed
fn dispatch<F>(session: &SharedSession, f: F)
where
    F: FnOnce(&mut Session<WebHal>) + 'static,
{
    match session.try_borrow_mut() {
        Ok(mut s) => f(&mut s),
        Err(_) => {
            let session = session.clone();
            spawn_local(async move { dispatch(&session, f) });
        }
    }
}

/// Read from the session; fails instead of panicking when a step holds it
fn inspect<T, R>(session: &RefCell<T>, f: impl FnOnce(&T) -> R) -> Result<R, JsValue> {
    session
        .try_borrow()
        .map(|s| f(&s))
        .map_err(|_| to_js_error("session busy"))
}

/// Outstanding run-dependency count reported by the loader
fn parse_remaining(value: &JsValue) -> Option<u32> {
    let n = value.as_f64()?;
    (n.is_finite() && n >= 0.0 && n.fract() == 0.0 && n <= f64::from(u32::MAX)).then_some(n as u32)
}

fn parse_handle(handle: &JsValue) -> Result<CorrelationHandle, JsValue> {
    handle
        .as_f64()
        .and_then(CorrelationHandle::from_f64)
        .ok_or_else(|| to_js_error(format!("invalid sync handle {:?}", handle)))
}

/// Guest entry point behind `Module.requestSync` and [`Shell::request_sync`]
fn request_sync(session: &SharedSession, is_load: bool, handle: CorrelationHandle) -> Result<(), JsValue> {
    let direction = SyncDirection::from_is_load(is_load);
    match session.try_borrow_mut() {
        Ok(mut s) => s.request_sync(direction, handle).map(drop).map_err(to_js_error),
        Err(_) => {
            // Re-entered from a session step; a rejection can only be logged now
            dispatch(session, move |s| {
                if let Err(e) = s.request_sync(direction, handle) {
                    log::error!("[shell] Deferred sync request {} rejected: {}", handle, e);
                }
            });
            Ok(())
        }
    }
}

/// Install the sink that carries `FS.syncfs` outcomes back into the session
fn install_sync_sink(session: &SharedSession) {
    let weak = Rc::downgrade(session);
    let sink = Rc::new(move |request_id: SyncRequestId, error: Option<String>| {
        let weak = weak.clone();
        spawn_local(async move {
            let Some(session) = weak.upgrade() else {
                log::warn!("[shell] Sync outcome for request_id {} after shutdown", request_id);
                return;
            };
            dispatch(&session, move |s| {
                if let Completion::InitialLoad(outcome) = s.notify_sync_complete(request_id, error) {
                    log::debug!("[shell] Initial load outcome: {:?}", outcome);
                }
            });
        });
    });
    session.borrow().hal().set_sync_sink(sink);
}

/// Browser bootstrap shell for one Emscripten guest
#[wasm_bindgen]
pub struct Shell {
    session: SharedSession,
    config: BootConfig,
    /// Canvas click + document keydown, until audio is running
    audio_listener: Rc<RefCell<Option<Listener>>>,
    context_lost_listener: Option<Listener>,
    error_listener: Listener,
}

#[wasm_bindgen]
impl Shell {
    /// Create the shell from a JSON configuration (`"{}"` for defaults)
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: &str) -> Result<Shell, JsValue> {
        // Set up panic hook for better error messages
        #[cfg(feature = "console_error_panic_hook")]
        console_error_panic_hook::set_once();

        let config = BootConfig::from_json(config_json).map_err(to_js_error)?;
        let level = config.log_level().map_err(to_js_error)?;
        if console_log::init_with_level(level).is_err() {
            log::debug!("[shell] Logger already initialized");
        }

        let hal = WebHal::new(&config).map_err(to_js_error)?;
        let session = Rc::new(RefCell::new(Session::new(hal, config.clone()).map_err(to_js_error)?));
        install_sync_sink(&session);

        let error_listener = Self::attach_error_listener(&session)?;
        let audio_listener = Self::attach_audio_listener(&session)?;

        log::info!("[shell] Created for #{}", config.canvas_id);
        Ok(Self {
            session,
            config,
            audio_listener,
            context_lost_listener: None,
            error_listener,
        })
    }

    /// Acquire the WebGL2 context and activate its extensions.
    ///
    /// Failure is fatal: the status surface shows a blocking message.
    #[wasm_bindgen(js_name = provisionContext)]
    pub fn provision_context(&mut self) -> Result<JsValue, JsValue> {
        let context = {
            let mut s = self
                .session
                .try_borrow_mut()
                .map_err(|_| to_js_error("session busy"))?;
            s.provision_context().map(|ctx| JsValue::from(ctx.clone())).map_err(to_js_error)?
        };

        if self.context_lost_listener.is_none() {
            self.context_lost_listener = Some(self.attach_context_lost_listener()?);
        }
        Ok(context)
    }

    /// Build the `Module` object for the guest loader.
    ///
    /// Provisions the context first; the guest receives it through
    /// `preinitializedWebGLContext` instead of creating its own.
    #[wasm_bindgen(js_name = moduleArgs)]
    pub fn module_args(&mut self) -> Result<js_sys::Object, JsValue> {
        let context = self.provision_context()?;
        let args = js_sys::Object::new();
        let set = |name: &str, value: JsValue| module::set(&args, name, &value).map_err(to_js_error);

        {
            let s = self.session.borrow();
            set("canvas", s.hal().canvas().clone().into())?;
            // Until preRun hands over the live module, the guest extends this object
            s.hal().set_module(args.clone().into());
        }
        set("preinitializedWebGLContext", context)?;

        let session = self.session.clone();
        let export = self.config.sync_callback.clone();
        let pre_run = Closure::wrap(Box::new(move |loaded: JsValue| -> Result<(), JsValue> {
            let mut s = session
                .try_borrow_mut()
                .map_err(|_| to_js_error("session busy in preRun"))?;
            if loaded.is_object() {
                s.hal().set_module(loaded);
            }
            let guest = CcallGuest::new(s.hal().module(), export.clone());
            s.pre_run(Box::new(guest)).map_err(to_js_error)
        }) as Box<dyn FnMut(JsValue) -> Result<(), JsValue>>);
        set("preRun", js_sys::Array::of1(&pre_run.into_js_value()).into())?;

        let session = self.session.clone();
        let monitor = Closure::wrap(Box::new(move |value: JsValue| {
            let Some(remaining) = parse_remaining(&value) else {
                log::warn!("[shell] Ignoring non-numeric dependency signal {:?}", value);
                return;
            };
            dispatch(&session, move |s| s.monitor_run_dependencies(remaining));
        }) as Box<dyn FnMut(JsValue)>);
        set("monitorRunDependencies", monitor.into_js_value())?;

        let session = self.session.clone();
        let set_status = Closure::wrap(Box::new(move |text: JsValue| {
            let text = text.as_string().unwrap_or_default();
            dispatch(&session, move |s| {
                s.set_status(&text);
            });
        }) as Box<dyn FnMut(JsValue)>);
        set("setStatus", set_status.into_js_value())?;

        let session = self.session.clone();
        let sync = Closure::wrap(Box::new(move |is_load: JsValue, handle: JsValue| -> Result<(), JsValue> {
            request_sync(&session, is_load.is_truthy(), parse_handle(&handle)?)
        }) as Box<dyn FnMut(JsValue, JsValue) -> Result<(), JsValue>>);
        set("requestSync", sync.into_js_value())?;

        let session = self.session.clone();
        let sync_async = Closure::wrap(Box::new(move |is_load: JsValue, handle: JsValue| -> js_sys::Promise {
            request_sync_promise(session.clone(), is_load.is_truthy(), handle)
        }) as Box<dyn FnMut(JsValue, JsValue) -> js_sys::Promise>);
        set("requestSyncAsync", sync_async.into_js_value())?;

        let session = self.session.clone();
        let first_frame = Closure::wrap(Box::new(move || {
            dispatch(&session, |s| s.first_frame());
        }) as Box<dyn FnMut()>);
        set("onFirstFrame", first_frame.into_js_value())?;

        Ok(args)
    }

    /// Request a flush: `is_load` pulls from the durable store, otherwise pushes.
    ///
    /// The outcome arrives through the guest's sync callback.
    #[wasm_bindgen(js_name = requestSync)]
    pub fn request_sync(&self, is_load: bool, handle: f64) -> Result<(), JsValue> {
        request_sync(&self.session, is_load, parse_handle(&JsValue::from_f64(handle))?)
    }

    /// Same as `requestSync`, resolving to `{ isLoad, error }` once done
    #[wasm_bindgen(js_name = requestSyncAsync)]
    pub fn request_sync_async(&self, is_load: bool, handle: f64) -> js_sys::Promise {
        request_sync_promise(self.session.clone(), is_load, JsValue::from_f64(handle))
    }

    #[wasm_bindgen(js_name = setStatus)]
    pub fn set_status(&self, text: &str) {
        let text = text.to_string();
        dispatch(&self.session, move |s| {
            s.set_status(&text);
        });
    }

    #[wasm_bindgen(js_name = monitorRunDependencies)]
    pub fn monitor_run_dependencies(&self, remaining: u32) {
        dispatch(&self.session, move |s| s.monitor_run_dependencies(remaining));
    }

    #[wasm_bindgen(js_name = firstFrame)]
    pub fn first_frame(&self) {
        dispatch(&self.session, |s| s.first_frame());
    }

    /// Lifecycle phase, for diagnostics
    pub fn phase(&self) -> Result<String, JsValue> {
        inspect(&self.session, |s| format!("{:?}", s.phase()))
    }

    #[wasm_bindgen(js_name = audioUnlocked)]
    pub fn audio_unlocked(&self) -> Result<bool, JsValue> {
        inspect(&self.session, |s| s.audio_unlocked())
    }
}

/// Promise-returning variant of [`request_sync`]
fn request_sync_promise(session: SharedSession, is_load: bool, handle: JsValue) -> js_sys::Promise {
    future_to_promise(async move {
        let handle = parse_handle(&handle)?;
        let ticket = {
            let mut s = session
                .try_borrow_mut()
                .map_err(|_| to_js_error("session busy"))?;
            s.request_sync(SyncDirection::from_is_load(is_load), handle)
                .map_err(to_js_error)?
        };

        let outcome = ticket.await.map_err(to_js_error)?;
        let result = js_sys::Object::new();
        module::set(&result, "isLoad", &JsValue::from_bool(outcome.direction.is_load())).map_err(to_js_error)?;
        let error = outcome.error.as_deref().map(JsValue::from_str).unwrap_or(JsValue::NULL);
        module::set(&result, "error", &error).map_err(to_js_error)?;
        Ok(result.into())
    })
}

impl Shell {
    /// Uncaught errors take over the status surface
    fn attach_error_listener(session: &SharedSession) -> Result<Listener, JsValue> {
        let window = web_sys::window().ok_or_else(|| to_js_error("no window"))?;
        let session = session.clone();
        Listener::attach(vec![(window.into(), "error")], move |event: JsValue| {
            let message = error_event_message(&event);
            dispatch(&session, move |s| s.report_error(&message));
        })
    }

    /// Canvas click and document keydown feed the audio unlock gate until it retires
    fn attach_audio_listener(session: &SharedSession) -> Result<Rc<RefCell<Option<Listener>>>, JsValue> {
        let document = web_sys::window()
            .and_then(|w| w.document())
            .ok_or_else(|| to_js_error("no document"))?;
        let canvas = session.borrow().hal().canvas().clone();

        let slot: Rc<RefCell<Option<Listener>>> = Rc::new(RefCell::new(None));
        let listener_slot = slot.clone();
        let session = session.clone();
        let listener = Listener::attach(
            vec![(canvas.into(), "click"), (document.into(), "keydown")],
            move |_event: JsValue| {
                let slot = listener_slot.clone();
                dispatch(&session, move |s| {
                    if s.on_user_gesture() == GateAction::Retire {
                        if let Some(listener) = slot.borrow_mut().take() {
                            listener.detach();
                            // Still running inside this closure; drop it afterwards
                            spawn_local(async move { drop(listener) });
                        }
                    }
                });
            },
        )?;
        *slot.borrow_mut() = Some(listener);
        Ok(slot)
    }

    fn attach_context_lost_listener(&self) -> Result<Listener, JsValue> {
        let canvas = self.session.borrow().hal().canvas().clone();
        let session = self.session.clone();
        Listener::attach(vec![(canvas.into(), "webglcontextlost")], move |event: JsValue| {
            let event: web_sys::Event = event.unchecked_into();
            // Synchronously, even if the session is busy and the rest is deferred
            event.prevent_default();
            dispatch(&session, move |s| s.on_context_lost(&DomEvent(&event)));
        })
    }
}

impl Drop for Shell {
    fn drop(&mut self) {
        if let Some(listener) = self.audio_listener.borrow_mut().take() {
            listener.detach();
        }
        if let Some(listener) = &self.context_lost_listener {
            listener.detach();
        }
        self.error_listener.detach();
    }
}
