/*
 *  MountBridge Simulator Plugin
 *
 *  A dynamic plugin for MountBridge that exports the simulated telescope
 *  mount through the plugin ABI.
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 */

//! # MountBridge Simulator Plugin
//!
//! Exports the simulated mount as the device class
//! `MountBridge.SimulatorPlugin`, so the whole plugin path (discovery,
//! loading, ABI check, late-bound invoke) can be exercised without
//! hardware.
//!
//! ## Profile
//!
//! By default the mount claims every capability except alt/az slewing. A
//! YAML profile named by `$MOUNTBRIDGE_SIMULATOR_PROFILE` overrides that:
//!
//! ```yaml
//! name: "Fork mount"
//! can_slew_async: false
//! can_set_park: false
//! slew_polls: 10
//! site:
//!   latitude: 35.2
//!   longitude: -111.6
//! ```
//!
//! ## Usage
//!
//! ```text
//! cargo build --release -p mountbridge-driver-simulator
//! mountbridge --driver-id MountBridge.SimulatorPlugin status
//! ```

mod plugin;

// Re-export the plugin registration function
pub use plugin::mountbridge_plugin_register;
