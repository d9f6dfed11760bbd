/*
 *  bridge/traits.rs
 *
 *  MountBridge - ASCOM mount adapter
 *  (c) 2020-26 Stuart Hunter
 *
 *  Core trait definitions for late-bound device objects
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

use std::sync::Arc;

use crate::bridge::variant::{DispId, DispatchParams, ExcepInfo, InvokeKind, Variant};

/// A late-bound device object.
///
/// Every device implementation, built in or loaded from a plugin, is reached
/// only through this two-call surface: resolve a member name, then invoke
/// the resolved id. Nothing about the device is known at compile time.
pub trait Dispatch: Send + Sync {
    /// Resolve a symbolic member name to a dispatch id.
    ///
    /// Returns `None` when the object has no such member at all.
    fn id_of_name(&self, name: &str) -> Option<DispId>;

    /// Invoke a previously resolved member.
    ///
    /// Property writes carry `InvokeKind::PropertyPut` and the
    /// `DISPID_PROPERTYPUT` named-argument marker.
    fn invoke(
        &self,
        id: DispId,
        kind: InvokeKind,
        params: &DispatchParams,
    ) -> Result<Variant, ExcepInfo>;
}

/// An installable device implementation, looked up by its ProgID
pub trait DeviceClass: Send + Sync {
    /// Identifier stored in configuration, e.g. "MountBridge.Simulator"
    fn prog_id(&self) -> &str;

    /// Human-readable description for the chooser
    fn description(&self) -> String {
        self.prog_id().to_string()
    }

    /// Create a fresh device object
    fn create_instance(&self) -> Result<Arc<dyn Dispatch>, String>;
}
