//! Sync completion callback into the guest

use emboot_core::GuestSyncCallback;
use emboot_hal::CorrelationHandle;
use wasm_bindgen::JsValue;

use crate::module::GuestModule;

/// Argument types of the exported `(bool is_load, const char *error, double handle)` function
const CALLBACK_ARG_TYPES: [&str; 3] = ["boolean", "string", "number"];

/// Delivers completions through `Module.ccall(<export>, null, ...)`.
///
/// A `null` error reaches the guest as a `NULL` string pointer.
pub(crate) struct CcallGuest {
    module: GuestModule,
    export: String,
}

impl CcallGuest {
    pub(crate) fn new(module: GuestModule, export: impl Into<String>) -> Self {
        Self {
            module,
            export: export.into(),
        }
    }
}

impl GuestSyncCallback for CcallGuest {
    fn sync_complete(&self, is_load: bool, error: Option<&str>, handle: CorrelationHandle) {
        let args = js_sys::Array::of3(
            &JsValue::from_bool(is_load),
            &error.map(JsValue::from_str).unwrap_or(JsValue::NULL),
            &JsValue::from_f64(handle.as_f64()),
        );
        if let Err(e) = self.module.ccall_void(&self.export, &CALLBACK_ARG_TYPES, &args) {
            log::error!(
                "[guest] {}(is_load={}, handle={}) failed: {}",
                self.export,
                is_load,
                handle,
                e
            );
        }
    }
}
