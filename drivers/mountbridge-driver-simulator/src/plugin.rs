/*
 *  MountBridge Simulator Plugin - Device Implementation
 *
 *  Serves the simulated mount through the plugin vtable
 */

use std::ffi::{c_char, CStr};
use std::panic::{catch_unwind, AssertUnwindSafe};

use mountbridge::bridge::traits::Dispatch;
use mountbridge::bridge::variant::{DispId, DispatchParams};
use mountbridge::drivers::simulator::{SimulatedMount, SimulatorProfile};
use mountbridge::plugin::ffi::*;

pub const PLUGIN_NAME: &str = "MountBridge Simulator Plugin";
pub const PLUGIN_VERSION: &str = "1.0.0";
pub const PLUGIN_PROG_ID: &str = "MountBridge.SimulatorPlugin";

/// Environment variable naming an optional YAML profile
pub const PROFILE_ENV: &str = "MOUNTBRIDGE_SIMULATOR_PROFILE";

/// Profile for new instances: the file named by the environment, or the
/// defaults under the plugin's own name
fn load_profile() -> Result<SimulatorProfile, String> {
    let Ok(path) = std::env::var(PROFILE_ENV) else {
        return Ok(SimulatorProfile {
            name: PLUGIN_NAME.to_string(),
            ..Default::default()
        });
    };

    let text = std::fs::read_to_string(&path)
        .map_err(|e| format!("Failed to read simulator profile {}: {}", path, e))?;
    serde_yaml::from_str(&text).map_err(|e| format!("Invalid simulator profile {}: {}", path, e))
}

fn copy_str_to_buffer(s: &str, buffer: *mut c_char, size: usize) {
    if buffer.is_null() || size == 0 {
        return;
    }
    let slice = unsafe { std::slice::from_raw_parts_mut(buffer, size) };
    write_c_string(slice, s);
}

/// Macro to catch panics in FFI functions
macro_rules! catch_panic {
    ($error:expr, $code:block) => {
        match catch_unwind(AssertUnwindSafe(|| $code)) {
            Ok(result) => result,
            Err(panic_info) => {
                let message = if let Some(s) = panic_info.downcast_ref::<&str>() {
                    format!("Plugin panic: {}", s)
                } else if let Some(s) = panic_info.downcast_ref::<String>() {
                    format!("Plugin panic: {}", s)
                } else {
                    "Plugin panic: unknown error".to_string()
                };

                if !$error.is_null() {
                    unsafe {
                        *$error = MbError::new(MbErrorCode::ErrorPanic, &message);
                    }
                }
                MbErrorCode::ErrorPanic
            }
        }
    };
}

// ============================================================================
// FFI Vtable Implementations
// ============================================================================

/// Get plugin ABI version
extern "C" fn abi_version(major: *mut u32, minor: *mut u32, patch: *mut u32) {
    if !major.is_null() && !minor.is_null() && !patch.is_null() {
        unsafe {
            *major = MB_PLUGIN_ABI_VERSION_MAJOR;
            *minor = MB_PLUGIN_ABI_VERSION_MINOR;
            *patch = MB_PLUGIN_ABI_VERSION_PATCH;
        }
    }
}

/// Get plugin metadata
extern "C" fn plugin_info(name: *mut c_char, version: *mut c_char, prog_id: *mut c_char) {
    copy_str_to_buffer(PLUGIN_NAME, name, MB_PLUGIN_NAME_SIZE);
    copy_str_to_buffer(PLUGIN_VERSION, version, MB_PLUGIN_VERSION_SIZE);
    copy_str_to_buffer(PLUGIN_PROG_ID, prog_id, MB_PLUGIN_PROG_ID_SIZE);
}

/// Create a new mount instance
extern "C" fn create(handle: *mut *mut MbDeviceHandle, error: *mut MbError) -> MbErrorCode {
    catch_panic!(error, {
        if handle.is_null() || error.is_null() {
            return MbErrorCode::ErrorNullPointer;
        }

        let profile = match load_profile() {
            Ok(p) => p,
            Err(e) => {
                unsafe {
                    *error = MbError::new(MbErrorCode::ErrorInitialization, &e);
                }
                return MbErrorCode::ErrorInitialization;
            }
        };

        #[cfg(feature = "debug-logging")]
        log::debug!("Creating simulated mount '{}'", profile.name);

        unsafe {
            *handle = Box::into_raw(Box::new(SimulatedMount::new(profile))) as *mut MbDeviceHandle;
        }

        MbErrorCode::Success
    })
}

/// Destroy a mount instance
extern "C" fn destroy(handle: *mut MbDeviceHandle) {
    if !handle.is_null() {
        unsafe {
            let _ = Box::from_raw(handle as *mut SimulatedMount);
        }
    }
}

/// Resolve a member name
extern "C" fn id_of_name(
    handle: *const MbDeviceHandle,
    name: *const c_char,
    dispid: *mut DispId,
    error: *mut MbError,
) -> MbErrorCode {
    catch_panic!(error, {
        if handle.is_null() || name.is_null() || dispid.is_null() || error.is_null() {
            return MbErrorCode::ErrorNullPointer;
        }

        let mount = unsafe { &*(handle as *const SimulatedMount) };
        let name = unsafe { CStr::from_ptr(name) }.to_string_lossy();

        match mount.id_of_name(&name) {
            Some(id) => {
                unsafe {
                    *dispid = id;
                }
                MbErrorCode::Success
            }
            None => {
                unsafe {
                    *error = MbError::new(MbErrorCode::ErrorUnknownName, &format!("Unknown member {}", name));
                }
                MbErrorCode::ErrorUnknownName
            }
        }
    })
}

/// Invoke a resolved member
extern "C" fn invoke(
    handle: *const MbDeviceHandle,
    dispid: DispId,
    kind: u32,
    args: *const MbVariant,
    nargs: usize,
    named_args: *const DispId,
    nnamed: usize,
    result: *mut MbVariant,
    error: *mut MbError,
) -> MbErrorCode {
    catch_panic!(error, {
        if handle.is_null() || result.is_null() || error.is_null()
            || (nargs > 0 && args.is_null())
            || (nnamed > 0 && named_args.is_null())
        {
            return MbErrorCode::ErrorNullPointer;
        }

        let Some(kind) = invoke_kind_from_ffi(kind) else {
            unsafe {
                *error = MbError::new(MbErrorCode::ErrorGeneric, &format!("Unknown invoke kind {}", kind));
            }
            return MbErrorCode::ErrorGeneric;
        };

        let mount = unsafe { &*(handle as *const SimulatedMount) };
        let raw_args: &[MbVariant] = if nargs == 0 {
            &[]
        } else {
            unsafe { std::slice::from_raw_parts(args, nargs) }
        };
        let named: &[DispId] = if nnamed == 0 {
            &[]
        } else {
            unsafe { std::slice::from_raw_parts(named_args, nnamed) }
        };

        let mut params = DispatchParams {
            args: Vec::with_capacity(raw_args.len()),
            named_args: named.to_vec(),
        };
        for arg in raw_args {
            match arg.to_variant() {
                Ok(v) => params.args.push(v),
                Err(e) => {
                    unsafe {
                        *error = MbError::new(MbErrorCode::ErrorGeneric, &e);
                    }
                    return MbErrorCode::ErrorGeneric;
                }
            }
        }

        match mount.invoke(dispid, kind, &params) {
            Ok(value) => {
                unsafe {
                    *result = MbVariant::from_variant(&value);
                }
                MbErrorCode::Success
            }
            Err(excep) => {
                unsafe {
                    *error = MbError::from(&excep);
                }
                MbErrorCode::ErrorException
            }
        }
    })
}

// ============================================================================
// Plugin Registration
// ============================================================================

/// Static vtable
static VTABLE: MbPluginVTable = MbPluginVTable {
    abi_version,
    plugin_info,
    create,
    destroy,
    id_of_name,
    invoke,
};

/// Plugin entry point - returns the vtable
#[no_mangle]
pub extern "C" fn mountbridge_plugin_register() -> *const MbPluginVTable {
    &VTABLE
}
