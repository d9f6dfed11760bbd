/*
 *  plugin/ffi.rs
 *
 *  MountBridge - ASCOM mount adapter
 *  (c) 2020-26 Stuart Hunter
 *
 *  C ABI shared between the host and device plugins
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

//! FFI types for the MountBridge plugin system
//!
//! A plugin exports one late-bound device class: name resolution plus a
//! generic invoke, the same two calls the `Dispatch` trait has. All types
//! use `#[repr(C)]` so host and plugin agree on layout across compilers.

use std::ffi::c_char;

use crate::bridge::variant::{
    DispId, ExcepInfo, InvokeKind, Variant, SCODE_FAIL, SCODE_NOT_IMPLEMENTED,
};

/// Plugin ABI version
pub const MB_PLUGIN_ABI_VERSION_MAJOR: u32 = 1;
pub const MB_PLUGIN_ABI_VERSION_MINOR: u32 = 0;
pub const MB_PLUGIN_ABI_VERSION_PATCH: u32 = 0;

/// Maximum length for error messages
pub const MB_ERROR_MESSAGE_SIZE: usize = 256;

/// Maximum length of a string carried in a variant
pub const MB_STRING_SIZE: usize = 256;

/// Maximum length for plugin metadata strings
pub const MB_PLUGIN_NAME_SIZE: usize = 64;
pub const MB_PLUGIN_VERSION_SIZE: usize = 32;
pub const MB_PLUGIN_PROG_ID_SIZE: usize = 128;

/// Variant type tags, numerically the automation VARTYPE values
pub const MB_VT_EMPTY: u32 = 0;
pub const MB_VT_I4: u32 = 3;
pub const MB_VT_R8: u32 = 5;
pub const MB_VT_DATE: u32 = 7;
pub const MB_VT_BSTR: u32 = 8;
pub const MB_VT_BOOL: u32 = 11;

/// Invocation kinds, numerically the automation DISPATCH_* flags
pub const MB_INVOKE_METHOD: u32 = 1;
pub const MB_INVOKE_PROPERTYGET: u32 = 2;
pub const MB_INVOKE_PROPERTYPUT: u32 = 4;

/// Opaque handle to a plugin device instance
#[repr(C)]
pub struct MbDeviceHandle {
    _private: [u8; 0],
}

/// Error codes returned by plugin functions
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MbErrorCode {
    /// Operation completed successfully
    Success = 0,

    /// Generic error
    ErrorGeneric = 1,

    /// Name resolution found no such member
    ErrorUnknownName = 2,

    /// The device raised an exception; `MbError::scode` carries its code
    ErrorException = 3,

    /// Null pointer passed where non-null expected
    ErrorNullPointer = 4,

    /// Panic occurred in plugin code
    ErrorPanic = 5,

    /// Instance creation failed
    ErrorInitialization = 6,

    /// ABI version mismatch
    ErrorAbiMismatch = 7,
}

/// Error information structure
#[repr(C)]
#[derive(Debug)]
pub struct MbError {
    pub code: MbErrorCode,

    /// Exception code when `code` is `ErrorException`
    pub scode: i32,

    /// Human-readable error message (null-terminated)
    pub message: [c_char; MB_ERROR_MESSAGE_SIZE],
}

impl MbError {
    pub fn new(code: MbErrorCode, message: &str) -> Self {
        let mut error = Self {
            code,
            scode: 0,
            message: [0; MB_ERROR_MESSAGE_SIZE],
        };
        write_c_string(&mut error.message, message);
        error
    }

    pub fn success() -> Self {
        Self::new(MbErrorCode::Success, "")
    }

    /// Extract error message as Rust string
    pub fn message_str(&self) -> String {
        read_c_string(&self.message)
    }

    /// Exception detail as seen by the host side of the bridge
    pub fn to_excep(&self) -> ExcepInfo {
        let scode = match self.code {
            MbErrorCode::ErrorException => self.scode,
            _ => SCODE_FAIL,
        };
        ExcepInfo::new(scode, self.message_str()).with_source("plugin")
    }
}

impl Default for MbError {
    fn default() -> Self {
        Self::success()
    }
}

impl From<&ExcepInfo> for MbError {
    fn from(excep: &ExcepInfo) -> Self {
        let mut error = Self::new(MbErrorCode::ErrorException, &excep.description);
        error.scode = excep.scode;
        error
    }
}

/// A variant crossing the plugin boundary
#[repr(C)]
#[derive(Clone, Copy)]
pub struct MbVariant {
    pub vt: u32,
    pub bool_val: bool,
    pub int_val: i32,
    /// Doubles and automation dates
    pub dbl_val: f64,
    pub str_val: [c_char; MB_STRING_SIZE],
}

impl MbVariant {
    pub fn empty() -> Self {
        Self {
            vt: MB_VT_EMPTY,
            bool_val: false,
            int_val: 0,
            dbl_val: 0.0,
            str_val: [0; MB_STRING_SIZE],
        }
    }

    pub fn from_variant(value: &Variant) -> Self {
        let mut v = Self::empty();
        match value {
            Variant::Empty => {}
            Variant::Bool(b) => {
                v.vt = MB_VT_BOOL;
                v.bool_val = *b;
            }
            Variant::Int(i) => {
                v.vt = MB_VT_I4;
                v.int_val = *i;
            }
            Variant::Double(d) => {
                v.vt = MB_VT_R8;
                v.dbl_val = *d;
            }
            Variant::Date(d) => {
                v.vt = MB_VT_DATE;
                v.dbl_val = *d;
            }
            Variant::Str(s) => {
                v.vt = MB_VT_BSTR;
                write_c_string(&mut v.str_val, s);
            }
        }
        v
    }

    pub fn to_variant(&self) -> Result<Variant, String> {
        match self.vt {
            MB_VT_EMPTY => Ok(Variant::Empty),
            MB_VT_BOOL => Ok(Variant::Bool(self.bool_val)),
            MB_VT_I4 => Ok(Variant::Int(self.int_val)),
            MB_VT_R8 => Ok(Variant::Double(self.dbl_val)),
            MB_VT_DATE => Ok(Variant::Date(self.dbl_val)),
            MB_VT_BSTR => Ok(Variant::Str(read_c_string(&self.str_val))),
            other => Err(format!("unsupported variant type {}", other)),
        }
    }
}

impl Default for MbVariant {
    fn default() -> Self {
        Self::empty()
    }
}

pub fn invoke_kind_to_ffi(kind: InvokeKind) -> u32 {
    match kind {
        InvokeKind::Method => MB_INVOKE_METHOD,
        InvokeKind::PropertyGet => MB_INVOKE_PROPERTYGET,
        InvokeKind::PropertyPut => MB_INVOKE_PROPERTYPUT,
    }
}

pub fn invoke_kind_from_ffi(kind: u32) -> Option<InvokeKind> {
    match kind {
        MB_INVOKE_METHOD => Some(InvokeKind::Method),
        MB_INVOKE_PROPERTYGET => Some(InvokeKind::PropertyGet),
        MB_INVOKE_PROPERTYPUT => Some(InvokeKind::PropertyPut),
        _ => None,
    }
}

/// Copy `s` into a fixed C buffer, truncating and always null-terminating
pub fn write_c_string(buffer: &mut [c_char], s: &str) {
    if buffer.is_empty() {
        return;
    }
    let len = s.len().min(buffer.len() - 1);
    for (slot, &byte) in buffer.iter_mut().zip(s.as_bytes().iter().take(len)) {
        *slot = byte as c_char;
    }
    buffer[len] = 0;
}

/// Read a null-terminated string out of a fixed C buffer
pub fn read_c_string(buffer: &[c_char]) -> String {
    let len = buffer.iter().position(|&c| c == 0).unwrap_or(buffer.len());
    let bytes: Vec<u8> = buffer[..len].iter().map(|&c| c as u8).collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Not-implemented exception in FFI form
pub fn not_implemented_error(member: &str) -> MbError {
    let mut error = MbError::new(MbErrorCode::ErrorException, &format!("{} is not implemented", member));
    error.scode = SCODE_NOT_IMPLEMENTED;
    error
}

/// Plugin vtable - function pointers for the late-bound device surface
#[repr(C)]
pub struct MbPluginVTable {
    /// Get plugin ABI version (major, minor, patch)
    pub abi_version: extern "C" fn(
        major: *mut u32,
        minor: *mut u32,
        patch: *mut u32
    ),

    /// Get plugin metadata (name, version, ProgID)
    pub plugin_info: extern "C" fn(
        name: *mut c_char,
        version: *mut c_char,
        prog_id: *mut c_char
    ),

    /// Create a new device instance
    pub create: extern "C" fn(
        handle: *mut *mut MbDeviceHandle,
        error: *mut MbError
    ) -> MbErrorCode,

    /// Destroy a device instance
    pub destroy: extern "C" fn(
        handle: *mut MbDeviceHandle
    ),

    /// Resolve a member name; `ErrorUnknownName` when there is none
    pub id_of_name: extern "C" fn(
        handle: *const MbDeviceHandle,
        name: *const c_char,
        dispid: *mut DispId,
        error: *mut MbError
    ) -> MbErrorCode,

    /// Invoke a resolved member
    pub invoke: extern "C" fn(
        handle: *const MbDeviceHandle,
        dispid: DispId,
        kind: u32,
        args: *const MbVariant,
        nargs: usize,
        named_args: *const DispId,
        nnamed: usize,
        result: *mut MbVariant,
        error: *mut MbError
    ) -> MbErrorCode,
}

/// Plugin registration function type
///
/// Each plugin must export a function with this signature:
/// ```c
/// #[no_mangle]
/// pub extern "C" fn mountbridge_plugin_register() -> *const MbPluginVTable
/// ```
pub type PluginRegisterFn = extern "C" fn() -> *const MbPluginVTable;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_crosses_boundary() {
        for value in [
            Variant::Empty,
            Variant::Bool(true),
            Variant::Int(-7),
            Variant::Double(12.5),
            Variant::Date(45_000.25),
            Variant::Str("MountBridge Simulator".into()),
        ] {
            assert_eq!(MbVariant::from_variant(&value).to_variant().unwrap(), value);
        }
    }

    #[test]
    fn test_unknown_vartype_is_rejected() {
        let mut v = MbVariant::empty();
        v.vt = 9;
        assert!(v.to_variant().is_err());
    }

    #[test]
    fn test_long_strings_truncate() {
        let long = "x".repeat(MB_STRING_SIZE * 2);
        let v = MbVariant::from_variant(&Variant::Str(long));
        assert_eq!(v.to_variant().unwrap().as_str().map(str::len), Some(MB_STRING_SIZE - 1));
    }

    #[test]
    fn test_exception_keeps_scode() {
        let err = not_implemented_error("Azimuth");
        assert!(err.to_excep().is_not_implemented());

        let generic = MbError::new(MbErrorCode::ErrorPanic, "Plugin panic: boom");
        let excep = generic.to_excep();
        assert_eq!(excep.scode, SCODE_FAIL);
        assert_eq!(excep.description, "Plugin panic: boom");
    }

    #[test]
    fn test_invoke_kind_values() {
        for kind in [InvokeKind::Method, InvokeKind::PropertyGet, InvokeKind::PropertyPut] {
            assert_eq!(invoke_kind_from_ffi(invoke_kind_to_ffi(kind)), Some(kind));
        }
        assert_eq!(invoke_kind_from_ffi(8), None);
    }
}
