//! Browser implementation of the bootstrap HAL
//!
//! Rendering goes through the page's `<canvas>`, the virtual filesystem and
//! the guest environment through the Emscripten module object, and the status
//! surface through plain DOM elements looked up once by id.

use std::cell::RefCell;
use std::rc::Rc;

use emboot_core::BootConfig;
use emboot_hal::{AudioState, BootHal, ContextAttributes, HalError, SyncDirection, SyncRequestId};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Document, HtmlCanvasElement, HtmlElement, HtmlProgressElement, WebGl2RenderingContext};

use crate::module::{self, GuestModule};

/// Receives `FS.syncfs` outcomes: `(request_id, error)`
pub(crate) type SyncSink = Rc<dyn Fn(SyncRequestId, Option<String>)>;

/// DOM elements of the status surface; any of them may be absent
struct StatusElements {
    status: Option<HtmlElement>,
    progress: Option<HtmlProgressElement>,
    spinner: Option<HtmlElement>,
}

pub struct WebHal {
    canvas: HtmlCanvasElement,
    status: StatusElements,
    performance: Option<web_sys::Performance>,
    audio_context_path: Vec<String>,
    /// Guest module object, replaced by the one the loader hands to `preRun`
    module: RefCell<GuestModule>,
    /// Where sync outcomes go; installed by the shell once the session exists
    sync_sink: RefCell<Option<SyncSink>>,
}

fn element<T: JsCast>(document: &Document, id: &str) -> Option<T> {
    let found = document
        .get_element_by_id(id)
        .and_then(|el| el.dyn_into::<T>().ok());
    if found.is_none() {
        log::warn!("[web-hal] Element #{} missing or of the wrong type", id);
    }
    found
}

impl WebHal {
    /// Look up the page elements named in `config`.
    ///
    /// Only the canvas is mandatory.
    pub fn new(config: &BootConfig) -> Result<Self, HalError> {
        let window = web_sys::window().ok_or_else(|| HalError::Unavailable("window".into()))?;
        let document = window
            .document()
            .ok_or_else(|| HalError::Unavailable("document".into()))?;

        let canvas = document
            .get_element_by_id(&config.canvas_id)
            .ok_or(HalError::NotFound)?
            .dyn_into::<HtmlCanvasElement>()
            .map_err(|_| HalError::Host(format!("#{} is not a <canvas>", config.canvas_id)))?;

        let status = StatusElements {
            status: element(&document, &config.status_id),
            progress: element(&document, &config.progress_id),
            spinner: element(&document, &config.spinner_id),
        };

        Ok(Self {
            canvas,
            status,
            performance: window.performance(),
            audio_context_path: config.audio_context_path.clone(),
            module: RefCell::new(GuestModule::new(js_sys::Object::new().into())),
            sync_sink: RefCell::new(None),
        })
    }

    pub fn canvas(&self) -> &HtmlCanvasElement {
        &self.canvas
    }

    pub(crate) fn module(&self) -> GuestModule {
        self.module.borrow().clone()
    }

    pub(crate) fn set_module(&self, object: JsValue) {
        *self.module.borrow_mut() = GuestModule::new(object);
    }

    pub(crate) fn set_sync_sink(&self, sink: SyncSink) {
        *self.sync_sink.borrow_mut() = Some(sink);
    }

    fn deliver(&self, request_id: SyncRequestId, error: Option<String>) {
        match self.sync_sink.borrow().as_ref() {
            Some(sink) => sink(request_id, error),
            None => log::error!(
                "[web-hal] No sync sink installed; dropping outcome of request_id {}",
                request_id
            ),
        }
    }

    fn audio_context(&self) -> Option<JsValue> {
        module::get_path(self.module.borrow().object(), &self.audio_context_path)
    }
}

impl BootHal for WebHal {
    type Context = WebGl2RenderingContext;

    fn acquire_context(&self, attrs: &ContextAttributes) -> Result<WebGl2RenderingContext, HalError> {
        let json = serde_json::to_string(attrs).map_err(|e| HalError::Host(e.to_string()))?;
        let options = js_sys::JSON::parse(&json).map_err(|e| HalError::Host(module::describe(&e)))?;

        self.canvas
            .get_context_with_context_options("webgl2", &options)
            .map_err(|e| HalError::Host(module::describe(&e)))?
            .ok_or_else(|| HalError::Unavailable("webgl2".into()))?
            .dyn_into::<WebGl2RenderingContext>()
            .map_err(|_| HalError::Unavailable("webgl2".into()))
    }

    fn supported_extensions(&self, ctx: &WebGl2RenderingContext) -> Vec<String> {
        ctx.get_supported_extensions()
            .map(|list| list.iter().filter_map(|name| name.as_string()).collect())
            .unwrap_or_default()
    }

    fn enable_extension(&self, ctx: &WebGl2RenderingContext, name: &str) -> bool {
        matches!(ctx.get_extension(name), Ok(Some(_)))
    }

    fn set_guest_env(&self, key: &str, value: &str) -> Result<(), HalError> {
        self.module.borrow().set_env(key, value)
    }

    fn add_run_dependency(&self, tag: &str) {
        let module = self.module();
        if let Err(e) = module.add_run_dependency(tag) {
            log::error!("[web-hal] addRunDependency({}) failed: {}", tag, e);
        }
    }

    fn remove_run_dependency(&self, tag: &str) {
        let module = self.module();
        if let Err(e) = module.remove_run_dependency(tag) {
            log::error!("[web-hal] removeRunDependency({}) failed: {}", tag, e);
        }
    }

    fn fs_mkdir(&self, path: &str) -> Result<(), HalError> {
        self.module.borrow().mkdir(path)
    }

    fn fs_is_mountpoint(&self, path: &str) -> bool {
        self.module.borrow().is_mountpoint(path)
    }

    fn fs_mount_persistent(&self, path: &str) -> Result<(), HalError> {
        self.module.borrow().mount_idbfs(path)
    }

    fn fs_sync_start(&self, request_id: SyncRequestId, direction: SyncDirection) {
        let sink = self.sync_sink.borrow().clone();
        let callback = Closure::once_into_js(move |err: JsValue| {
            let error = if err.is_falsy() {
                None
            } else {
                Some(module::describe(&err))
            };
            match sink {
                Some(sink) => sink(request_id, error),
                None => log::error!(
                    "[web-hal] No sync sink installed; dropping outcome of request_id {}",
                    request_id
                ),
            }
        });

        let module = self.module();
        if let Err(e) = module.syncfs(direction.populate(), callback.unchecked_ref()) {
            // Still exactly one outcome per request
            log::error!("[web-hal] FS.syncfs failed to start: request_id={}: {}", request_id, e);
            self.deliver(request_id, Some(e.to_string()));
        }
    }

    fn audio_state(&self) -> Option<AudioState> {
        let ctx = self.audio_context()?;
        module::get(&ctx, "state")
            .and_then(|s| s.as_string())
            .and_then(|s| AudioState::from_js_str(&s))
    }

    fn audio_resume(&self) {
        let Some(ctx) = self.audio_context() else {
            return;
        };
        // The returned promise is not awaited; the gate re-checks the state
        if let Err(e) = module::call(&ctx, "resume", &js_sys::Array::new()) {
            log::warn!("[web-hal] AudioContext.resume failed: {}", e);
        }
    }

    fn set_status_text(&self, text: &str) {
        if let Some(el) = &self.status.status {
            el.set_inner_text(text);
        }
    }

    fn set_progress(&self, progress: Option<(u32, u32)>) {
        let Some(el) = &self.status.progress else {
            return;
        };
        match progress {
            Some((value, max)) => {
                el.set_max(max as f64);
                el.set_value(value as f64);
                el.set_hidden(false);
            }
            None => el.set_hidden(true),
        }
    }

    fn set_spinner_visible(&self, visible: bool) {
        if let Some(el) = &self.status.spinner {
            el.set_hidden(!visible);
        }
    }

    fn show_running(&self) {
        for el in [&self.status.status, &self.status.spinner].into_iter().flatten() {
            el.set_hidden(true);
        }
        if let Some(el) = &self.status.progress {
            el.set_hidden(true);
        }
        self.canvas.set_hidden(false);
    }

    fn show_failure(&self) {
        // A lost or crashed context leaves a frozen frame; take it off screen
        self.canvas.set_hidden(true);
        if let Some(el) = &self.status.status {
            el.set_hidden(false);
        }
    }

    fn now_ms(&self) -> f64 {
        self.performance
            .as_ref()
            .map(|p| p.now())
            .unwrap_or_else(js_sys::Date::now)
    }
}
