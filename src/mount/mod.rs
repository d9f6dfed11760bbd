/*
 *  mount/mod.rs
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

//! Mount operations and the host-facing adapter
//!
//! `operations` is the typed catalog over the invocation layer, `adapter`
//! the façade the driver host calls, `host` the services it calls back.

pub mod adapter;
pub mod error;
pub mod host;
pub mod operations;

pub use adapter::{HostInterface, MountAdapter, TrackingRates};
pub use error::{host_code, HostError, HostResult};
pub use host::{AlertSeverity, DeviceChooser, HostServices, StdHost};
pub use operations::MountOps;
