/*
 *  plugin/mod.rs
 *
 *  MountBridge - ASCOM mount adapter
 *  (c) 2020-26 Stuart Hunter
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

//! Dynamic plugin system for mount device classes
//!
//! A device class can ship as a shared library (.so/.dylib/.dll) that
//! exports one late-bound device. The host finds it by ProgID, loads it at
//! activation time and talks to it through the `Dispatch` trait like any
//! built-in device.
//!
//! ## Architecture
//!
//! 1. **FFI Layer** (`ffi.rs`) - C ABI types, always compiled so plugin
//!    crates can use them
//! 2. **Loader** (`loader.rs`) - discovers and loads libraries
//! 3. **Adapter** (`adapter.rs`) - wraps a plugin as `DeviceClass`/`Dispatch`
//!
//! ## Plugin Discovery
//!
//! 1. `$MOUNTBRIDGE_DRIVER_PATH`
//! 2. `plugin_path` from the config file
//! 3. `./target/release/`, `./target/debug/` (development)
//! 4. `~/.local/lib/mountbridge/drivers/`
//! 5. `/usr/local/lib/mountbridge/drivers/`
//! 6. `/usr/lib/mountbridge/drivers/`
//!
//! ## Plugin Naming Convention
//!
//! The ProgID lower-cased with '.' replaced by '_':
//! `MountBridge.SimulatorPlugin` is `libmountbridge_simulatorplugin.so`.

pub mod ffi;

#[cfg(feature = "plugin-system")]
pub mod loader;

#[cfg(feature = "plugin-system")]
pub mod adapter;

pub use ffi::{MbDeviceHandle, MbError, MbErrorCode, MbPluginVTable, MbVariant};

#[cfg(feature = "plugin-system")]
pub use loader::{LoadedPlugin, PluginError, PluginLoader, PluginMetadata};

#[cfg(feature = "plugin-system")]
pub use adapter::{PluginClass, PluginDevice};
