/*
 *  mount/operations.rs
 *
 *  MountBridge - ASCOM mount adapter
 *  (c) 2020-26 Stuart Hunter
 *
 *  Typed mount operations over the dynamic invocation layer
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

use log::debug;

use crate::bridge::dispatch::DispatchClient;
use crate::bridge::error::DispatchError;
use crate::bridge::session::{CapabilityFlags, DriverSession};
use crate::constants::{member, AUTOMATION_DATE_TO_JD, SIDEREAL_RATE};

/// The fixed catalog of mount operations.
///
/// Every result comes straight from the invocation layer; gating on
/// capabilities is the adapter's job.
pub struct MountOps<'a> {
    client: DispatchClient<'a>,
    caps: &'a CapabilityFlags,
    pending: &'a AtomicBool,
}

/// Clears the pending-slew marker on every exit path
struct PendingSlew<'a>(&'a AtomicBool);

impl<'a> PendingSlew<'a> {
    fn set(marker: &'a AtomicBool) -> Self {
        marker.store(true, Ordering::SeqCst);
        Self(marker)
    }
}

impl Drop for PendingSlew<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<'a> MountOps<'a> {
    pub fn new(client: DispatchClient<'a>, caps: &'a CapabilityFlags, pending: &'a AtomicBool) -> Self {
        Self { client, caps, pending }
    }

    /// Operations on an active session
    pub fn from_session(session: &'a DriverSession) -> Option<Self> {
        let client = session.client()?;
        Some(Self::new(client, session.capabilities(), session.pending_slew()))
    }

    pub fn capabilities(&self) -> &CapabilityFlags {
        self.caps
    }

    // Position

    pub fn right_ascension(&self) -> Result<f64, DispatchError> {
        self.client.get_double(member::RIGHT_ASCENSION)
    }

    pub fn declination(&self) -> Result<f64, DispatchError> {
        self.client.get_double(member::DECLINATION)
    }

    pub fn azimuth(&self) -> Result<f64, DispatchError> {
        self.client.get_double(member::AZIMUTH)
    }

    pub fn altitude(&self) -> Result<f64, DispatchError> {
        self.client.get_double(member::ALTITUDE)
    }

    // Site and time

    pub fn site_latitude(&self) -> Result<f64, DispatchError> {
        self.client.get_double(member::SITE_LATITUDE)
    }

    pub fn set_site_latitude(&self, degrees: f64) -> Result<(), DispatchError> {
        self.client.set_double(member::SITE_LATITUDE, degrees)
    }

    pub fn site_longitude(&self) -> Result<f64, DispatchError> {
        self.client.get_double(member::SITE_LONGITUDE)
    }

    pub fn set_site_longitude(&self, degrees: f64) -> Result<(), DispatchError> {
        self.client.set_double(member::SITE_LONGITUDE, degrees)
    }

    /// Julian date from the mount's UTC clock
    pub fn julian_date(&self) -> Result<f64, DispatchError> {
        Ok(self.client.get_date(member::UTC_DATE)? + AUTOMATION_DATE_TO_JD)
    }

    // Identity

    pub fn name(&self) -> Result<String, DispatchError> {
        self.client.get_string(member::NAME)
    }

    pub fn alignment_mode(&self) -> Result<i32, DispatchError> {
        self.client.get_int(member::ALIGNMENT_MODE)
    }

    // Motion

    /// Slew to (ra hours, dec degrees). The device takes dec first.
    ///
    /// Without async slewing this blocks, with the pending marker raised
    /// for the duration of the call.
    pub fn slew_to(&self, ra: f64, dec: f64) -> Result<(), DispatchError> {
        let args = vec![dec.into(), ra.into()];
        if self.caps.can_slew_async {
            self.client.call_method(member::SLEW_TO_COORDINATES_ASYNC, args)?;
        } else {
            let _pending = PendingSlew::set(self.pending);
            debug!("Blocking slew to RA {:.4} Dec {:.4}", ra, dec);
            self.client.call_method(member::SLEW_TO_COORDINATES, args)?;
        }
        Ok(())
    }

    pub fn is_slewing(&self) -> Result<bool, DispatchError> {
        if self.caps.can_slew_async {
            self.client.get_bool(member::SLEWING)
        } else {
            Ok(self.pending.load(Ordering::SeqCst))
        }
    }

    pub fn abort_slew(&self) -> Result<(), DispatchError> {
        self.client.call_method(member::ABORT_SLEW, Vec::new()).map(|_| ())
    }

    pub fn sync_to(&self, ra: f64, dec: f64) -> Result<(), DispatchError> {
        self.client
            .call_method(member::SYNC_TO_COORDINATES, vec![dec.into(), ra.into()])
            .map(|_| ())
    }

    // Parking

    pub fn park(&self) -> Result<(), DispatchError> {
        self.client.call_method(member::PARK, Vec::new()).map(|_| ())
    }

    pub fn unpark(&self) -> Result<(), DispatchError> {
        self.client.call_method(member::UNPARK, Vec::new()).map(|_| ())
    }

    pub fn set_park(&self) -> Result<(), DispatchError> {
        self.client.call_method(member::SET_PARK, Vec::new()).map(|_| ())
    }

    pub fn at_park(&self) -> Result<bool, DispatchError> {
        self.client.get_bool(member::AT_PARK)
    }

    // Tracking

    pub fn tracking(&self) -> Result<bool, DispatchError> {
        self.client.get_bool(member::TRACKING)
    }

    pub fn set_tracking(&self, on: bool) -> Result<(), DispatchError> {
        self.client.set_bool(member::TRACKING, on)
    }

    /// RA tracking offset in seconds of RA per sidereal second
    pub fn ra_rate(&self) -> Result<f64, DispatchError> {
        Ok(self.client.get_double(member::RA_RATE)? / SIDEREAL_RATE)
    }

    pub fn set_ra_rate(&self, rate: f64) -> Result<(), DispatchError> {
        self.client.set_double(member::RA_RATE, rate * SIDEREAL_RATE)
    }

    /// Dec tracking offset in arcseconds per second
    pub fn dec_rate(&self) -> Result<f64, DispatchError> {
        self.client.get_double(member::DEC_RATE)
    }

    pub fn set_dec_rate(&self, rate: f64) -> Result<(), DispatchError> {
        self.client.set_double(member::DEC_RATE, rate)
    }
}
