/*
 *  bridge/session.rs
 *
 *  MountBridge - ASCOM mount adapter
 *  (c) 2020-26 Stuart Hunter
 *
 *  Driver lifecycle - discover, instantiate, activate, probe, tear down
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

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use log::{debug, info, warn};

use crate::bridge::broker::{GlobalInterfaceTable, InterfaceTable, ReferenceBroker};
use crate::bridge::dispatch::{DispatchClient, Presence};
use crate::bridge::error::{ActivationError, DispatchError, Optional};
use crate::bridge::traits::Dispatch;
use crate::config::ConfigStore;
use crate::constants::{member, ALIGNMENT_GERMAN_POLAR, DRIVER_SELECTION_KEY};
use crate::factory::DeviceRegistry;

static INTERFACE_TABLE: OnceLock<Arc<GlobalInterfaceTable>> = OnceLock::new();

/// One-time process-wide setup. Safe to call repeatedly; every call returns
/// the same interface table.
pub fn initialize() -> Arc<GlobalInterfaceTable> {
    Arc::clone(INTERFACE_TABLE.get_or_init(|| {
        debug!("Creating process-wide interface table");
        Arc::new(GlobalInterfaceTable::new())
    }))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Inactive,
    /// Only observable while `activate()` is running
    Activating,
    Active,
}

/// How a teardown reports a failed `Connected = false`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    /// Top-level unlink; the failure is returned
    Requested,
    /// Cleanup on an error path; the failure is only logged
    Forced,
}

/// Capabilities read once at activation and never re-queried
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapabilityFlags {
    pub can_sync: bool,
    pub can_slew: bool,
    pub can_slew_async: bool,
    pub can_slew_altaz: bool,
    pub can_set_tracking: bool,
    pub can_set_track_rates: bool,
    pub can_park: bool,
    pub can_unpark: bool,
    pub can_set_park: bool,
    pub does_refraction: bool,
    pub is_equatorial: bool,
    pub is_german_equatorial: bool,
}

impl CapabilityFlags {
    /// Read every capability from the device. `is_equatorial` is left for
    /// the existence probe.
    pub fn query(client: &DispatchClient<'_>) -> Result<Self, DispatchError> {
        let alignment = client.get_int(member::ALIGNMENT_MODE).optional()?;

        Ok(Self {
            can_sync: capability(client, member::CAN_SYNC, Presence::Mandatory)?,
            can_slew: capability(client, member::CAN_SLEW, Presence::Mandatory)?,
            can_slew_async: capability(client, member::CAN_SLEW_ASYNC, Presence::Mandatory)?,
            can_slew_altaz: capability(client, member::CAN_SLEW_ALTAZ, Presence::Optional)?,
            can_set_tracking: capability(client, member::CAN_SET_TRACKING, Presence::Mandatory)?,
            can_set_track_rates: capability(client, member::CAN_SET_RA_RATE, Presence::Mandatory)?
                && capability(client, member::CAN_SET_DEC_RATE, Presence::Mandatory)?,
            can_park: capability(client, member::CAN_PARK, Presence::Mandatory)?,
            can_unpark: capability(client, member::CAN_UNPARK, Presence::Mandatory)?,
            can_set_park: capability(client, member::CAN_SET_PARK, Presence::Mandatory)?,
            does_refraction: capability(client, member::DOES_REFRACTION, Presence::Mandatory)?,
            is_equatorial: false,
            is_german_equatorial: alignment == Some(ALIGNMENT_GERMAN_POLAR),
        })
    }
}

fn capability(client: &DispatchClient<'_>, name: &str, presence: Presence) -> Result<bool, DispatchError> {
    match client.get_bool_with(name, presence).optional()? {
        Some(value) => Ok(value),
        None => {
            debug!("{} not implemented, assuming false", name);
            Ok(false)
        }
    }
}

/// The live device: the reference itself and the broker that marshals it
struct DeviceReference {
    prog_id: String,
    object: Arc<dyn Dispatch>,
    broker: ReferenceBroker,
}

/// Owner of the single device reference of a host session
pub struct DriverSession {
    table: Arc<dyn InterfaceTable>,
    registry: Arc<DeviceRegistry>,
    config: Arc<dyn ConfigStore>,

    device: Option<DeviceReference>,
    state: SessionState,
    capabilities: CapabilityFlags,
    device_name: Option<String>,

    pending_slew: Arc<AtomicBool>,
    /// Set after a fatal fault; the session reads as unlinked until torn down
    lost: AtomicBool,
}

impl DriverSession {
    /// Session bound to the process-wide interface table
    pub fn new(registry: Arc<DeviceRegistry>, config: Arc<dyn ConfigStore>) -> Self {
        Self::with_table(initialize(), registry, config)
    }

    pub fn with_table(
        table: Arc<dyn InterfaceTable>,
        registry: Arc<DeviceRegistry>,
        config: Arc<dyn ConfigStore>,
    ) -> Self {
        Self {
            table,
            registry,
            config,
            device: None,
            state: SessionState::Inactive,
            capabilities: CapabilityFlags::default(),
            device_name: None,
            pending_slew: Arc::new(AtomicBool::new(false)),
            lost: AtomicBool::new(false),
        }
    }

    /// Bring the configured device up. Returns at once if already active.
    ///
    /// On failure everything created so far is torn down and the session
    /// stays inactive.
    pub fn activate(&mut self) -> Result<(), ActivationError> {
        if self.is_active() {
            return Ok(());
        }
        if self.device.is_some() {
            // left over from a fatal fault
            self.deactivate(Teardown::Forced).ok();
        }

        self.state = SessionState::Activating;
        match self.bring_up() {
            Ok(()) => {
                self.state = SessionState::Active;
                info!(
                    "Linked to {} ({})",
                    self.device_name.as_deref().unwrap_or("unnamed mount"),
                    self.prog_id().unwrap_or_default()
                );
                Ok(())
            }
            Err(e) => {
                warn!("Activation failed: {}", e);
                self.deactivate(Teardown::Forced).ok();
                Err(e)
            }
        }
    }

    fn bring_up(&mut self) -> Result<(), ActivationError> {
        let prog_id = self
            .config
            .get(DRIVER_SELECTION_KEY)?
            .filter(|id| !id.trim().is_empty())
            .ok_or(ActivationError::NotConfigured)?;

        let class = self
            .registry
            .resolve(&prog_id)
            .ok_or_else(|| ActivationError::DriverNotFound(prog_id.clone()))?;

        let object = class
            .create_instance()
            .map_err(|reason| ActivationError::CreateFailed { prog_id: prog_id.clone(), reason })?;
        debug!("Created instance of {}", prog_id);

        let broker = ReferenceBroker::register(Arc::clone(&self.table), Arc::clone(&object))?;
        let device = self.device.insert(DeviceReference { prog_id, object, broker });

        let client = DispatchClient::new(&device.broker);
        let (name, capabilities) = probe(&client)?;

        self.device_name = name;
        self.capabilities = capabilities;
        Ok(())
    }

    /// Tear the device down. Without a device this is a no-op.
    ///
    /// Cleanup always completes; a failed `Connected = false` is returned
    /// for `Teardown::Requested` and only logged for `Teardown::Forced`.
    pub fn deactivate(&mut self, mode: Teardown) -> Result<(), DispatchError> {
        let Some(mut device) = self.device.take() else {
            self.state = SessionState::Inactive;
            return Ok(());
        };

        let disconnected = DispatchClient::new(&device.broker).set_bool(member::CONNECTED, false);

        if let Err(e) = device.broker.revoke() {
            warn!("Failed to revoke driver interface: {}", e);
        }
        debug!("Releasing {}", device.prog_id);
        drop(device);

        self.state = SessionState::Inactive;
        self.capabilities = CapabilityFlags::default();
        self.device_name = None;
        self.pending_slew.store(false, Ordering::SeqCst);
        self.lost.store(false, Ordering::SeqCst);

        match disconnected {
            Ok(()) => Ok(()),
            Err(e) if mode == Teardown::Requested => Err(e),
            Err(e) => {
                warn!("Disconnect during teardown failed: {}", e);
                Ok(())
            }
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Active and not lost to a fatal fault
    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active && !self.lost.load(Ordering::SeqCst)
    }

    /// Flag the session unusable; teardown happens on the next link change
    pub fn mark_lost(&self) {
        self.lost.store(true, Ordering::SeqCst);
    }

    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::SeqCst)
    }

    /// Invocation handle for the device, if the session is usable
    pub fn client(&self) -> Option<DispatchClient<'_>> {
        if !self.is_active() {
            return None;
        }
        self.device.as_ref().map(|d| DispatchClient::new(&d.broker))
    }

    pub fn capabilities(&self) -> &CapabilityFlags {
        &self.capabilities
    }

    /// Marker set while a blocking slew is in flight
    pub fn pending_slew(&self) -> &Arc<AtomicBool> {
        &self.pending_slew
    }

    pub fn device_name(&self) -> Option<&str> {
        self.device_name.as_deref()
    }

    pub fn prog_id(&self) -> Option<&str> {
        self.device.as_ref().map(|d| d.prog_id.as_str())
    }

    /// Thread switches the broker has had to re-derive for
    pub fn derivations(&self) -> usize {
        self.device.as_ref().map_or(0, |d| d.broker.derivations())
    }

    /// Strong references held on the device object, for leak checks
    pub fn reference_count(&self) -> usize {
        self.device.as_ref().map_or(0, |d| Arc::strong_count(&d.object))
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &Arc<dyn ConfigStore> {
        &self.config
    }
}

impl Drop for DriverSession {
    fn drop(&mut self) {
        if self.device.is_some() {
            self.deactivate(Teardown::Forced).ok();
        }
    }
}

/// Steps 5 onwards of activation, run against the freshly brokered device
fn probe(client: &DispatchClient<'_>) -> Result<(Option<String>, CapabilityFlags), ActivationError> {
    client.set_bool(member::CONNECTED, true)?;

    let name = match client.get_string(member::NAME) {
        Ok(name) if !name.is_empty() => Some(name),
        Ok(_) => None,
        Err(e) => {
            debug!("Device name unavailable: {}", e);
            None
        }
    };

    let mut capabilities = CapabilityFlags::query(client)?;
    debug!("Capabilities: {:?}", capabilities);

    // a member missing outright is fatal; only NotImplemented falls through
    capabilities.is_equatorial = match client.get_double(member::RIGHT_ASCENSION).optional()? {
        Some(_) => true,
        None => match client.get_double(member::AZIMUTH).optional()? {
            Some(_) => false,
            None => return Err(ActivationError::NoCoordinateSystem),
        },
    };

    if capabilities.can_unpark {
        client.call_method(member::UNPARK, Vec::new())?;
    }
    if capabilities.can_set_tracking {
        client.set_bool(member::TRACKING, true)?;
    }
    if capabilities.can_set_track_rates {
        client.set_double(member::RA_RATE, 0.0)?;
        client.set_double(member::DEC_RATE, 0.0)?;
    }

    Ok((name, capabilities))
}
