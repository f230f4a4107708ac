//! Access to the Emscripten guest module object
//!
//! The page creates one `Module` object from [`crate::Shell::module_args`] and
//! hands it to the guest's loader, which extends it in place with `FS`, `ENV`,
//! `ccall` and the run-dependency functions. Everything here goes through
//! `js_sys::Reflect` because none of those members have static bindings.

use emboot_hal::HalError;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

/// Look up `name` on `target`, treating `undefined` as missing
pub(crate) fn get(target: &JsValue, name: &str) -> Option<JsValue> {
    match js_sys::Reflect::get(target, &JsValue::from_str(name)) {
        Ok(value) if !value.is_undefined() && !value.is_null() => Some(value),
        _ => None,
    }
}

/// Follow a property path (`["SDL3", "audioContext"]`) from `target`
pub(crate) fn get_path(target: &JsValue, path: &[String]) -> Option<JsValue> {
    path.iter()
        .try_fold(target.clone(), |value, segment| get(&value, segment))
}

pub(crate) fn set(target: &JsValue, name: &str, value: &JsValue) -> Result<(), HalError> {
    js_sys::Reflect::set(target, &JsValue::from_str(name), value)
        .map(|_| ())
        .map_err(|e| HalError::Host(describe(&e)))
}

/// Call `target[method](...args)`
pub(crate) fn call(target: &JsValue, method: &str, args: &js_sys::Array) -> Result<JsValue, HalError> {
    let func = get(target, method)
        .and_then(|f| f.dyn_into::<js_sys::Function>().ok())
        .ok_or_else(|| HalError::Unavailable(method.to_string()))?;
    js_sys::Reflect::apply(&func, target, args).map_err(|e| HalError::Host(describe(&e)))
}

/// Human-readable text of a thrown JS value or an error argument.
///
/// Emscripten reports filesystem errors as `ErrnoError` objects; their
/// `message` (or `toString()`) is what the guest gets to see.
pub(crate) fn describe(value: &JsValue) -> String {
    if let Some(s) = value.as_string() {
        return s;
    }
    if let Some(message) = get(value, "message").and_then(|m| m.as_string()) {
        if !message.is_empty() {
            return message;
        }
    }
    if let Some(obj) = value.dyn_ref::<js_sys::Object>() {
        return String::from(obj.to_string());
    }
    format!("{:?}", value)
}

/// The guest module object, extended by the guest loader at startup
#[derive(Clone)]
pub(crate) struct GuestModule {
    object: JsValue,
}

impl GuestModule {
    pub(crate) fn new(object: JsValue) -> Self {
        Self { object }
    }

    pub(crate) fn object(&self) -> &JsValue {
        &self.object
    }

    fn fs(&self) -> Result<JsValue, HalError> {
        get(&self.object, "FS").ok_or_else(|| HalError::Unavailable("FS".into()))
    }

    /// Set `ENV[key] = value`
    pub(crate) fn set_env(&self, key: &str, value: &str) -> Result<(), HalError> {
        let env = get(&self.object, "ENV").ok_or_else(|| HalError::Unavailable("ENV".into()))?;
        set(&env, key, &JsValue::from_str(value))
    }

    pub(crate) fn add_run_dependency(&self, tag: &str) -> Result<(), HalError> {
        call(&self.object, "addRunDependency", &js_sys::Array::of1(&tag.into())).map(|_| ())
    }

    pub(crate) fn remove_run_dependency(&self, tag: &str) -> Result<(), HalError> {
        call(&self.object, "removeRunDependency", &js_sys::Array::of1(&tag.into())).map(|_| ())
    }

    /// `FS.analyzePath(path)`: `(exists, node)`
    fn analyze_path(&self, path: &str) -> Result<(bool, Option<JsValue>), HalError> {
        let info = call(&self.fs()?, "analyzePath", &js_sys::Array::of1(&path.into()))?;
        let exists = get(&info, "exists").map(|v| v.is_truthy()).unwrap_or(false);
        Ok((exists, get(&info, "object")))
    }

    pub(crate) fn mkdir(&self, path: &str) -> Result<(), HalError> {
        if self.analyze_path(path)?.0 {
            return Err(HalError::AlreadyExists);
        }
        call(&self.fs()?, "mkdir", &js_sys::Array::of1(&path.into())).map(|_| ())
    }

    pub(crate) fn is_mountpoint(&self, path: &str) -> bool {
        let (fs, node) = match (self.fs(), self.analyze_path(path)) {
            (Ok(fs), Ok((true, Some(node)))) => (fs, node),
            _ => return false,
        };
        call(&fs, "isMountpoint", &js_sys::Array::of1(&node))
            .map(|v| v.is_truthy())
            .unwrap_or(false)
    }

    /// `FS.mount(IDBFS, {}, path)`
    pub(crate) fn mount_idbfs(&self, path: &str) -> Result<(), HalError> {
        let idbfs = get(&self.object, "IDBFS")
            .or_else(|| get(&js_sys::global(), "IDBFS"))
            .ok_or_else(|| HalError::Unavailable("IDBFS".into()))?;
        let args = js_sys::Array::of3(&idbfs, &js_sys::Object::new(), &path.into());
        call(&self.fs()?, "mount", &args).map(|_| ())
    }

    /// `FS.syncfs(populate, callback)`
    pub(crate) fn syncfs(&self, populate: bool, callback: &js_sys::Function) -> Result<(), HalError> {
        call(&self.fs()?, "syncfs", &js_sys::Array::of2(&populate.into(), callback)).map(|_| ())
    }

    /// `ccall(name, null, arg_types, args)` for a function returning nothing
    pub(crate) fn ccall_void(&self, name: &str, arg_types: &[&str], args: &js_sys::Array) -> Result<(), HalError> {
        let types: js_sys::Array = arg_types.iter().map(|t| JsValue::from_str(t)).collect();
        let call_args = js_sys::Array::of4(&name.into(), &JsValue::NULL, &types, args);
        call(&self.object, "ccall", &call_args).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    fn object(entries: &[(&str, JsValue)]) -> JsValue {
        let obj: JsValue = js_sys::Object::new().into();
        for (name, value) in entries {
            set(&obj, name, value).unwrap();
        }
        obj
    }

    #[wasm_bindgen_test]
    fn test_get_path_walks_nested_objects() {
        let ctx = object(&[("state", JsValue::from_str("suspended"))]);
        let sdl = object(&[("audioContext", ctx)]);
        let module = object(&[("SDL3", sdl)]);

        let path = vec!["SDL3".to_string(), "audioContext".to_string(), "state".to_string()];
        assert_eq!(
            get_path(&module, &path).and_then(|v| v.as_string()).as_deref(),
            Some("suspended")
        );

        let missing = vec!["SDL3".to_string(), "nothing".to_string()];
        assert!(get_path(&module, &missing).is_none());
    }

    #[wasm_bindgen_test]
    fn test_describe_prefers_message() {
        assert_eq!(describe(&JsValue::from_str("plain")), "plain");
        let err: JsValue = js_sys::Error::new("QuotaExceededError").into();
        assert_eq!(describe(&err), "QuotaExceededError");
    }

    #[wasm_bindgen_test]
    fn test_env_and_run_dependencies() {
        let deps = js_sys::Array::new();
        let add = js_sys::Function::new_with_args("tag", "this.deps.push('+' + tag)");
        let remove = js_sys::Function::new_with_args("tag", "this.deps.push('-' + tag)");
        let module = GuestModule::new(object(&[
            ("ENV", object(&[])),
            ("deps", deps.clone().into()),
            ("addRunDependency", add.into()),
            ("removeRunDependency", remove.into()),
        ]));

        module.set_env("TAISEI_NOASYNC", "1").unwrap();
        module.add_run_dependency("persistent-storage").unwrap();
        module.remove_run_dependency("persistent-storage").unwrap();

        let env = get(module.object(), "ENV").unwrap();
        assert_eq!(get(&env, "TAISEI_NOASYNC").and_then(|v| v.as_string()).as_deref(), Some("1"));
        let recorded: Vec<String> = deps.iter().filter_map(|v| v.as_string()).collect();
        assert_eq!(recorded, vec!["+persistent-storage", "-persistent-storage"]);
    }

    #[wasm_bindgen_test]
    fn test_missing_members_are_unavailable() {
        let module = GuestModule::new(object(&[]));
        assert_eq!(module.set_env("A", "1"), Err(HalError::Unavailable("ENV".into())));
        assert_eq!(module.mkdir("/persistent"), Err(HalError::Unavailable("FS".into())));
        assert!(!module.is_mountpoint("/persistent"));
    }
}
