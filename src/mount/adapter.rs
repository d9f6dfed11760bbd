/*
 *  mount/adapter.rs
 *
 *  MountBridge - ASCOM mount adapter
 *  (c) 2020-26 Stuart Hunter
 *
 *  Host-facing mount adapter - session and capability gating, fault
 *  boundary, the single place user alerts are raised
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

use log::{debug, error, info, warn};

use crate::bridge::error::DispatchError;
use crate::bridge::session::{CapabilityFlags, DriverSession, Teardown};
use crate::constants::{
    DEVICE_DESCRIPTION, DEVICE_FIRMWARE, DEVICE_MODEL, DEVICE_NAME_LONG, DEVICE_NAME_SHORT,
    DRIVER_INFO_DETAILED, DRIVER_INFO_VERSION, DRIVER_SELECTION_KEY, PARK_POLL_INTERVAL,
    SET_PARK_SETTLE,
};
use crate::mount::error::{HostError, HostResult};
use crate::mount::host::{AlertSeverity, DeviceChooser, HostServices};
use crate::mount::operations::MountOps;

/// Optional host interfaces the adapter can expose
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostInterface {
    SyncMount,
    SlewTo,
    TrackingRates,
    ModalSettingsDialog,
    Park,
    Unpark,
    NeedsRefraction,
}

impl HostInterface {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "com.bisque.TheSkyX.SyncMountInterface/1.0" | "SyncMount" => Self::SyncMount,
            "com.bisque.TheSkyX.SlewToInterface/1.0" | "SlewTo" => Self::SlewTo,
            "com.bisque.TheSkyX.TrackingRatesInterface/1.0" | "TrackingRates" => Self::TrackingRates,
            "com.bisque.TheSkyX.ModalSettingsDialogInterface/1.0" | "ModalSettingsDialog" => {
                Self::ModalSettingsDialog
            }
            "com.bisque.TheSkyX.ParkInterface/1.0" | "Park" => Self::Park,
            "com.bisque.TheSkyX.UnparkInterface/1.0" | "Unpark" => Self::Unpark,
            "com.bisque.TheSkyX.NeedsRefractionInterface/1.0" | "NeedsRefraction" => {
                Self::NeedsRefraction
            }
            _ => return None,
        })
    }
}

/// Tracking state as reported to the host
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackingRates {
    pub tracking: bool,
    /// Seconds of RA per sidereal second
    pub ra_rate: f64,
    /// Arcseconds per second
    pub dec_rate: f64,
}

impl Default for TrackingRates {
    fn default() -> Self {
        Self { tracking: true, ra_rate: 0.0, dec_rate: 0.0 }
    }
}

/// The mount as the driver host sees it.
///
/// Every operation checks the link first (`NoLink`), then the relevant
/// capability (`NotImplemented`, without touching the device), then runs
/// inside the fault boundary.
pub struct MountAdapter<H: HostServices> {
    session: DriverSession,
    host: H,
}

impl<H: HostServices> MountAdapter<H> {
    pub fn new(session: DriverSession, host: H) -> Self {
        Self { session, host }
    }

    pub fn session(&self) -> &DriverSession {
        &self.session
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    // Fault boundary

    /// Map a device fault to a host error, alerting where the user must know
    fn fault(&self, what: &str, e: DispatchError) -> HostError {
        if e.is_not_implemented() {
            debug!("{}: {}", what, e);
            return HostError::NotImplemented;
        }
        if e.is_fatal() {
            self.host.alert(AlertSeverity::Fatal, &e.to_string());
            // torn down on the next link change
            self.session.mark_lost();
            return match e {
                DispatchError::UnsupportedMember { .. } => HostError::UnsupportedMember,
                _ => HostError::NoLink,
            };
        }
        error!("{} failed: {}", what, e);
        HostError::NoLink
    }

    fn ops(&self) -> HostResult<MountOps<'_>> {
        MountOps::from_session(&self.session).ok_or(HostError::NoLink)
    }

    /// Run `f` on a linked mount
    fn linked<T>(
        &self,
        what: &str,
        f: impl FnOnce(&MountOps<'_>) -> Result<T, DispatchError>,
    ) -> HostResult<T> {
        let ops = self.ops()?;
        f(&ops).map_err(|e| self.fault(what, e))
    }

    /// Run `f` on a linked mount that has the capability `gate` selects
    fn gated<T>(
        &self,
        what: &str,
        gate: impl FnOnce(&CapabilityFlags) -> bool,
        f: impl FnOnce(&MountOps<'_>) -> Result<T, DispatchError>,
    ) -> HostResult<T> {
        let ops = self.ops()?;
        if !gate(ops.capabilities()) {
            debug!("{}: capability not available", what);
            return Err(HostError::NotImplemented);
        }
        f(&ops).map_err(|e| self.fault(what, e))
    }

    // Link

    pub fn establish_link(&mut self) -> HostResult<()> {
        match self.session.activate() {
            Ok(()) => Ok(()),
            Err(e) => {
                self.host.alert(AlertSeverity::Fatal, &e.to_string());
                Err(HostError::ActivationFailure)
            }
        }
    }

    pub fn terminate_link(&mut self) -> HostResult<()> {
        let mode = if self.session.is_lost() { Teardown::Forced } else { Teardown::Requested };
        match self.session.deactivate(mode) {
            Ok(()) => {
                info!("Link terminated");
                Ok(())
            }
            Err(e) => {
                self.host.alert(AlertSeverity::Fatal, &e.to_string());
                Err(HostError::NoLink)
            }
        }
    }

    pub fn is_linked(&self) -> bool {
        self.session.is_active()
    }

    // Static information

    pub fn driver_info_detailed(&self) -> &'static str {
        DRIVER_INFO_DETAILED
    }

    pub fn driver_info_version(&self) -> f64 {
        DRIVER_INFO_VERSION
    }

    /// The device's own name once linked
    pub fn device_info_name_short(&self) -> String {
        self.session.device_name().unwrap_or(DEVICE_NAME_SHORT).to_string()
    }

    pub fn device_info_name_long(&self) -> &'static str {
        DEVICE_NAME_LONG
    }

    pub fn device_info_detailed_description(&self) -> &'static str {
        DEVICE_DESCRIPTION
    }

    pub fn device_info_firmware_version(&self) -> &'static str {
        DEVICE_FIRMWARE
    }

    pub fn device_info_model(&self) -> &'static str {
        DEVICE_MODEL
    }

    /// Optional interfaces are always offered; the host only asks once,
    /// before any device is linked, so gating happens per call instead
    pub fn query_abstraction(&self, name: &str) -> Option<HostInterface> {
        HostInterface::from_name(name)
    }

    // Settings

    /// Let the user pick a device. A cancelled choice leaves the
    /// configuration untouched.
    pub fn exec_settings_dialog(&mut self, chooser: &mut dyn DeviceChooser) -> HostResult<()> {
        let config = self.session.config();
        let current = match config.get(DRIVER_SELECTION_KEY) {
            Ok(current) => current.unwrap_or_default(),
            Err(e) => {
                warn!("Failed to read the current driver ID: {}", e);
                String::new()
            }
        };

        let chosen = chooser.choose(&current);
        if chosen.is_empty() {
            debug!("Device chooser cancelled");
            return Ok(());
        }

        if let Err(e) = config.set(DRIVER_SELECTION_KEY, &chosen) {
            self.host.alert(
                AlertSeverity::Fatal,
                &format!("Failed to store the driver name: {}", e),
            );
            return Err(HostError::NoLink);
        }
        info!("Selected device {}", chosen);
        Ok(())
    }

    // Position

    /// (RA hours, Dec degrees)
    pub fn ra_dec(&self) -> HostResult<(f64, f64)> {
        self.linked("Reading position", |ops| Ok((ops.right_ascension()?, ops.declination()?)))
    }

    pub fn abort(&self) -> HostResult<()> {
        if self.is_parked() {
            // the host aborts when closing while parked
            return Ok(());
        }
        self.linked("Abort slew", |ops| ops.abort_slew())
    }

    // Sync

    pub fn sync_mount(&self, ra: f64, dec: f64) -> HostResult<()> {
        self.gated("Sync", |c| c.can_sync, |ops| ops.sync_to(ra, dec))
    }

    /// There is no way to ask a device, so always true
    pub fn is_synced(&self) -> bool {
        true
    }

    // Slew

    pub fn start_slew_to(&self, ra: f64, dec: f64) -> HostResult<()> {
        self.gated("Slew", |c| c.can_slew || c.can_slew_async, ensure_tracking)?;

        let ops = self.ops()?;
        match ops.slew_to(ra, dec) {
            Ok(()) => Ok(()),
            Err(e) if e.is_fatal() || e.is_not_implemented() => Err(self.fault("Slew", e)),
            Err(e) => {
                self.host.alert(AlertSeverity::Warning, &e.to_string());
                Ok(())
            }
        }
    }

    pub fn is_complete_slew_to(&self) -> HostResult<bool> {
        self.linked("Slew status", |ops| {
            let caps = ops.capabilities();
            if !caps.can_slew && !caps.can_slew_async {
                return Ok(true);
            }
            Ok(!ops.is_slewing()?)
        })
    }

    pub fn end_slew_to(&self) -> HostResult<()> {
        Ok(())
    }

    // Tracking

    pub fn set_tracking_rates(
        &self,
        tracking: bool,
        ignore_rates: bool,
        ra_rate: f64,
        dec_rate: f64,
    ) -> HostResult<()> {
        self.gated(
            "Set tracking",
            |c| c.can_set_tracking,
            |ops| {
                ops.set_tracking(tracking)?;
                if ignore_rates {
                    return Ok(Ok(()));
                }
                if !ops.capabilities().can_set_track_rates {
                    return Ok(Err(HostError::NotImplemented));
                }
                ops.set_ra_rate(ra_rate)?;
                ops.set_dec_rate(dec_rate)?;
                Ok(Ok(()))
            },
        )?
    }

    pub fn tracking_rates(&self) -> HostResult<TrackingRates> {
        self.linked("Tracking rates", |ops| {
            let mut rates = TrackingRates::default();
            let caps = ops.capabilities();
            if caps.can_set_tracking {
                rates.tracking = ops.tracking()?;
                if caps.can_set_track_rates {
                    rates.ra_rate = ops.ra_rate()?;
                    rates.dec_rate = ops.dec_rate()?;
                }
            }
            Ok(rates)
        })
    }

    // Park

    /// True only for a linked, park-capable mount reporting `AtPark`
    pub fn is_parked(&self) -> bool {
        let Ok(ops) = self.ops() else {
            return false;
        };
        if !ops.capabilities().can_park {
            return false;
        }
        match ops.at_park() {
            Ok(parked) => parked,
            Err(e) => {
                self.fault("Park state", e);
                false
            }
        }
    }

    /// Park at (az, alt) degrees. Mounts that can set their park position
    /// are slewed there first and have it stored.
    pub fn start_park(&self, az: f64, alt: f64) -> HostResult<()> {
        let can_set_park = self.gated("Park", |c| c.can_park, |ops| {
            ensure_tracking(ops)?;
            Ok(ops.capabilities().can_set_park)
        })?;

        if can_set_park {
            let (ra, dec) = self.host.hz_to_eq(az, alt);
            debug!("Park position Az {:.2} Alt {:.2} is RA {:.4} Dec {:.4}", az, alt, ra, dec);
            match self.start_slew_to(ra, dec) {
                Ok(()) => loop {
                    match self.is_complete_slew_to() {
                        Ok(false) => self.host.sleep(PARK_POLL_INTERVAL),
                        Ok(true) | Err(_) => break,
                    }
                },
                // park where the mount stands
                Err(HostError::NotImplemented) => debug!("Mount cannot slew to the park position"),
                Err(e) => return Err(e),
            }
            self.host.sleep(SET_PARK_SETTLE);
            self.linked("Set park", |ops| ops.set_park())?;
            self.host.sleep(SET_PARK_SETTLE);
        }

        self.linked("Park", |ops| ops.park())
    }

    pub fn is_complete_park(&self) -> HostResult<bool> {
        self.linked("Park status", |ops| {
            if !ops.capabilities().can_park {
                return Ok(true);
            }
            ops.at_park()
        })
    }

    pub fn end_park(&self) -> HostResult<()> {
        Ok(())
    }

    // Unpark

    pub fn start_unpark(&self) -> HostResult<()> {
        self.gated("Unpark", |c| c.can_unpark, |ops| ops.unpark())
    }

    pub fn is_complete_unpark(&self) -> HostResult<bool> {
        self.linked("Unpark status", |ops| {
            if !ops.capabilities().can_unpark {
                return Ok(true);
            }
            Ok(!ops.at_park()?)
        })
    }

    pub fn end_unpark(&self) -> HostResult<()> {
        Ok(())
    }

    pub fn needs_refraction_adjustments(&self) -> bool {
        !self.session.capabilities().does_refraction
    }
}

/// Turn tracking on before a slew; some drivers refuse to slew otherwise
fn ensure_tracking(ops: &MountOps<'_>) -> Result<(), DispatchError> {
    if ops.capabilities().can_set_tracking && !ops.tracking()? {
        ops.set_tracking(true)?;
    }
    Ok(())
}
