/*
 *  plugin/adapter.rs
 *
 *  MountBridge - ASCOM mount adapter
 *  (c) 2020-26 Stuart Hunter
 *
 *  Wraps a C ABI device plugin as a Dispatch trait object
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use std::ffi::CString;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use log::{debug, error, warn};

use super::ffi::{invoke_kind_to_ffi, MbDeviceHandle, MbError, MbErrorCode, MbVariant};
use super::loader::LoadedPlugin;
use crate::bridge::traits::{DeviceClass, Dispatch};
use crate::bridge::variant::{DispId, DispatchParams, ExcepInfo, InvokeKind, Variant, SCODE_FAIL};

/// Device class backed by a loaded plugin
pub struct PluginClass {
    plugin: Arc<LoadedPlugin>,
}

impl PluginClass {
    pub fn new(plugin: LoadedPlugin) -> Self {
        Self { plugin: Arc::new(plugin) }
    }
}

impl DeviceClass for PluginClass {
    fn prog_id(&self) -> &str {
        &self.plugin.metadata().prog_id
    }

    fn description(&self) -> String {
        let meta = self.plugin.metadata();
        format!("{} v{} ({})", meta.name, meta.version, meta.path.display())
    }

    fn create_instance(&self) -> Result<Arc<dyn Dispatch>, String> {
        let device = PluginDevice::new(Arc::clone(&self.plugin)).map_err(|e| e.to_string())?;
        Ok(Arc::new(device))
    }
}

/// One device instance living inside a plugin
///
/// Every call goes through the vtable inside a panic guard. The plugin
/// library stays loaded until the last instance is dropped.
pub struct PluginDevice {
    plugin: Arc<LoadedPlugin>,
    handle: *mut MbDeviceHandle,
}

// SAFETY: the handle is only reached through the vtable, and plugin
// devices are required to be callable from any thread
unsafe impl Send for PluginDevice {}
unsafe impl Sync for PluginDevice {}

impl PluginDevice {
    pub fn new(plugin: Arc<LoadedPlugin>) -> Result<Self, ExcepInfo> {
        let vtable = plugin.vtable();

        let mut handle: *mut MbDeviceHandle = std::ptr::null_mut();
        let mut error = MbError::default();

        let (result, panic_error) = catch_ffi_call(|| (vtable.create)(&mut handle, &mut error));

        if let Some(e) = panic_error {
            return Err(e.to_excep());
        }
        if result != MbErrorCode::Success || handle.is_null() {
            return Err(error.to_excep());
        }

        debug!("Created plugin device instance: {:p}", handle);
        Ok(Self { plugin, handle })
    }

    pub fn plugin_name(&self) -> &str {
        &self.plugin.metadata().name
    }
}

impl Dispatch for PluginDevice {
    fn id_of_name(&self, name: &str) -> Option<DispId> {
        let vtable = self.plugin.vtable();
        let c_name = CString::new(name).ok()?;
        let mut dispid: DispId = 0;
        let mut error = MbError::default();

        let (result, panic_error) = catch_ffi_call(|| {
            (vtable.id_of_name)(self.handle, c_name.as_ptr(), &mut dispid, &mut error)
        });

        if let Some(e) = panic_error {
            warn!("Resolving {} failed: {}", name, e.message_str());
            return None;
        }
        match result {
            MbErrorCode::Success => Some(dispid),
            MbErrorCode::ErrorUnknownName => None,
            _ => {
                warn!("Resolving {} failed: {}", name, error.message_str());
                None
            }
        }
    }

    fn invoke(
        &self,
        id: DispId,
        kind: InvokeKind,
        params: &DispatchParams,
    ) -> Result<Variant, ExcepInfo> {
        let vtable = self.plugin.vtable();
        let args: Vec<MbVariant> = params.args.iter().map(MbVariant::from_variant).collect();
        let mut result_val = MbVariant::empty();
        let mut error = MbError::default();

        let (result, panic_error) = catch_ffi_call(|| {
            (vtable.invoke)(
                self.handle,
                id,
                invoke_kind_to_ffi(kind),
                args.as_ptr(),
                args.len(),
                params.named_args.as_ptr(),
                params.named_args.len(),
                &mut result_val,
                &mut error,
            )
        });

        if let Some(e) = panic_error {
            return Err(e.to_excep());
        }
        if result != MbErrorCode::Success {
            return Err(error.to_excep());
        }

        result_val
            .to_variant()
            .map_err(|e| ExcepInfo::new(SCODE_FAIL, e).with_source(self.plugin_name()))
    }
}

impl Drop for PluginDevice {
    fn drop(&mut self) {
        if !self.handle.is_null() {
            debug!("Destroying plugin device instance: {:p}", self.handle);

            let vtable = self.plugin.vtable();
            (vtable.destroy)(self.handle);

            self.handle = std::ptr::null_mut();
        }
    }
}

/// Wrap an FFI call with panic safety
///
/// Returns (error_code, error_info)
fn catch_ffi_call<F>(f: F) -> (MbErrorCode, Option<MbError>)
where
    F: FnOnce() -> MbErrorCode,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(code) => (code, None),
        Err(panic_info) => {
            let message = if let Some(s) = panic_info.downcast_ref::<&str>() {
                format!("Plugin panic: {}", s)
            } else if let Some(s) = panic_info.downcast_ref::<String>() {
                format!("Plugin panic: {}", s)
            } else {
                "Plugin panic: unknown error".to_string()
            };

            error!("Caught panic in plugin FFI call: {}", message);
            let panic_error = MbError::new(MbErrorCode::ErrorPanic, &message);
            (MbErrorCode::ErrorPanic, Some(panic_error))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catch_ffi_call_success() {
        let (result, panic_error) = catch_ffi_call(|| MbErrorCode::Success);
        assert_eq!(result, MbErrorCode::Success);
        assert!(panic_error.is_none());
    }

    #[test]
    fn test_catch_ffi_call_panic() {
        let (result, panic_error) = catch_ffi_call(|| panic!("Test panic"));
        assert_eq!(result, MbErrorCode::ErrorPanic);
        let error = panic_error.unwrap();
        assert!(error.message_str().contains("Plugin panic"));
        assert_eq!(error.to_excep().scode, SCODE_FAIL);
    }
}
