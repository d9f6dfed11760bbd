/*
 *  bridge/mod.rs
 *
 *  MountBridge - ASCOM mount adapter
 *  (c) 2020-26 Stuart Hunter
 *
 *  Protocol bridge - late binding, cross-thread marshalling, invocation
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

// Core trait definitions
pub mod traits;
pub mod variant;
pub mod error;

// Invocation and marshalling
pub mod broker;
pub mod dispatch;

// Device lifecycle
pub mod session;

pub use broker::{Cookie, GlobalInterfaceTable, InterfaceTable, ReferenceBroker};
pub use dispatch::{DispatchClient, Presence};
pub use error::{ActivationError, BrokerError, DispatchError, Optional};
pub use session::{initialize, CapabilityFlags, DriverSession, SessionState, Teardown};
pub use traits::{DeviceClass, Dispatch};
pub use variant::{DispId, DispatchParams, ExcepInfo, InvokeKind, Variant};
