/*
 *  drivers/simulator.rs
 *
 *  MountBridge - ASCOM mount adapter
 *  (c) 2020-26 Stuart Hunter
 *
 *  Simulated telescope mount implementing the full protocol surface
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

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::astro::{self, Site};
use crate::bridge::traits::{DeviceClass, Dispatch};
use crate::bridge::variant::{
    DispId, DispatchParams, ExcepInfo, InvokeKind, Variant, SCODE_BAD_PARAM_COUNT,
    SCODE_INVALID_OPERATION, SCODE_INVALID_VALUE, SCODE_NOT_CONNECTED, SCODE_PARAM_NOT_OPTIONAL,
};
use crate::constants::member;
use crate::drivers::MemberTable;

pub const SIMULATOR_PROG_ID: &str = "MountBridge.Simulator";

const SOURCE: &str = "MountBridge.Simulator";

/// What the simulated mount claims to support
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorProfile {
    pub name: String,

    pub can_sync: bool,
    pub can_slew: bool,
    pub can_slew_async: bool,
    pub can_slew_altaz: bool,
    pub can_set_tracking: bool,
    pub can_set_ra_rate: bool,
    pub can_set_dec_rate: bool,
    pub can_park: bool,
    pub can_unpark: bool,
    pub can_set_park: bool,
    pub does_refraction: bool,
    pub alignment_mode: i32,

    /// RA/Dec readout available
    pub equatorial: bool,
    /// Az/Alt readout available
    pub altaz: bool,

    /// `Slewing` polls an async slew takes to arrive
    pub slew_polls: u32,

    pub site: Site,
}

impl Default for SimulatorProfile {
    fn default() -> Self {
        Self {
            name: "MountBridge Simulator".to_string(),
            can_sync: true,
            can_slew: true,
            can_slew_async: true,
            can_slew_altaz: false,
            can_set_tracking: true,
            can_set_ra_rate: true,
            can_set_dec_rate: true,
            can_park: true,
            can_unpark: true,
            can_set_park: true,
            does_refraction: false,
            alignment_mode: 2,
            equatorial: true,
            altaz: true,
            slew_polls: 3,
            site: Site { latitude: 51.48, longitude: 0.0 },
        }
    }
}

#[derive(Debug, Default)]
struct SimState {
    connected: bool,
    site: Site,
    ra: f64,
    dec: f64,
    tracking: bool,
    ra_rate: f64,
    dec_rate: f64,
    at_park: bool,
    park_position: Option<(f64, f64)>,
    target: Option<(f64, f64)>,
    slewing_left: u32,
}

impl SimState {
    fn arrive(&mut self) {
        if let Some((ra, dec)) = self.target.take() {
            self.ra = ra;
            self.dec = dec;
        }
        self.slewing_left = 0;
    }
}

/// Simulated mount
pub struct SimulatedMount {
    table: MemberTable,
    profile: SimulatorProfile,
    state: Mutex<SimState>,
    invocations: AtomicUsize,
}

fn not_implemented(name: &str) -> ExcepInfo {
    ExcepInfo::not_implemented(name).with_source(SOURCE)
}

fn fail(scode: i32, message: impl Into<String>) -> ExcepInfo {
    ExcepInfo::new(scode, message).with_source(SOURCE)
}

fn arg_double(params: &DispatchParams, index: usize, what: &str) -> Result<f64, ExcepInfo> {
    params
        .args
        .get(index)
        .and_then(Variant::as_double)
        .ok_or_else(|| fail(SCODE_BAD_PARAM_COUNT, format!("{} must be a number", what)))
}

/// (dec, ra) argument pair, range checked
fn coordinates(params: &DispatchParams) -> Result<(f64, f64), ExcepInfo> {
    if params.args.len() != 2 {
        return Err(fail(SCODE_BAD_PARAM_COUNT, "expected (Declination, RightAscension)"));
    }
    let dec = arg_double(params, 0, "Declination")?;
    let ra = arg_double(params, 1, "RightAscension")?;
    if !(-90.0..=90.0).contains(&dec) {
        return Err(fail(SCODE_INVALID_VALUE, format!("Declination {} out of range", dec)));
    }
    if !(0.0..24.0).contains(&ra) {
        return Err(fail(SCODE_INVALID_VALUE, format!("RightAscension {} out of range", ra)));
    }
    Ok((dec, ra))
}

impl SimulatedMount {
    pub fn new(profile: SimulatorProfile) -> Self {
        let jd = astro::julian_date(Utc::now());
        // start pointing at the pole-side meridian
        let ra = astro::local_sidereal_hours(jd, profile.site.longitude);
        let dec = 90.0_f64.min(profile.site.latitude + 10.0);
        let site = profile.site;

        Self {
            table: MemberTable::telescope(),
            profile,
            state: Mutex::new(SimState { ra, dec, site, ..Default::default() }),
            invocations: AtomicUsize::new(0),
        }
    }

    pub fn profile(&self) -> &SimulatorProfile {
        &self.profile
    }

    /// Number of invocations served
    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::Relaxed)
    }

    fn state(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn capability(&self, name: &str) -> Option<bool> {
        let p = &self.profile;
        Some(match name {
            member::CAN_SYNC => p.can_sync,
            member::CAN_SLEW => p.can_slew,
            member::CAN_SLEW_ASYNC => p.can_slew_async,
            member::CAN_SLEW_ALTAZ => p.can_slew_altaz,
            member::CAN_SET_TRACKING => p.can_set_tracking,
            member::CAN_SET_RA_RATE => p.can_set_ra_rate,
            member::CAN_SET_DEC_RATE => p.can_set_dec_rate,
            member::CAN_PARK => p.can_park,
            member::CAN_UNPARK => p.can_unpark,
            member::CAN_SET_PARK => p.can_set_park,
            member::DOES_REFRACTION => p.does_refraction,
            _ => return None,
        })
    }

    /// Members readable before `Connected = true`
    fn is_static(name: &str) -> bool {
        matches!(name, member::CONNECTED | member::NAME | member::ALIGNMENT_MODE)
            || name.starts_with("Can")
            || name == member::DOES_REFRACTION
    }

    fn get(&self, name: &str) -> Result<Variant, ExcepInfo> {
        if let Some(flag) = self.capability(name) {
            return Ok(Variant::Bool(flag));
        }

        let mut state = self.state();
        let value = match name {
            member::CONNECTED => Variant::Bool(state.connected),
            member::NAME => Variant::Str(self.profile.name.clone()),
            member::ALIGNMENT_MODE => Variant::Int(self.profile.alignment_mode),

            member::RIGHT_ASCENSION | member::DECLINATION if !self.profile.equatorial => {
                return Err(not_implemented(name));
            }
            member::RIGHT_ASCENSION => Variant::Double(state.ra),
            member::DECLINATION => Variant::Double(state.dec),

            member::AZIMUTH | member::ALTITUDE if !self.profile.altaz => {
                return Err(not_implemented(name));
            }
            member::AZIMUTH | member::ALTITUDE => {
                let jd = astro::julian_date(Utc::now());
                let (az, alt) = astro::equatorial_to_horizon(state.ra, state.dec, &state.site, jd);
                Variant::Double(if name == member::AZIMUTH { az } else { alt })
            }

            member::SITE_LATITUDE => Variant::Double(state.site.latitude),
            member::SITE_LONGITUDE => Variant::Double(state.site.longitude),
            member::UTC_DATE => {
                Variant::Date(astro::julian_to_automation_date(astro::julian_date(Utc::now())))
            }

            member::AT_PARK => Variant::Bool(state.at_park),
            member::TRACKING => Variant::Bool(state.tracking),
            member::RA_RATE => Variant::Double(state.ra_rate),
            member::DEC_RATE => Variant::Double(state.dec_rate),

            member::SLEWING => {
                if state.slewing_left == 0 {
                    Variant::Bool(false)
                } else {
                    state.slewing_left -= 1;
                    if state.slewing_left == 0 {
                        state.arrive();
                    }
                    Variant::Bool(true)
                }
            }

            _ => return Err(fail(SCODE_BAD_PARAM_COUNT, format!("{} is not a property", name))),
        };
        Ok(value)
    }

    fn put(&self, name: &str, params: &DispatchParams) -> Result<(), ExcepInfo> {
        if !params.is_property_put() {
            return Err(fail(SCODE_PARAM_NOT_OPTIONAL, format!("{}: missing property-put marker", name)));
        }
        let value = &params.args[0];
        let mut state = self.state();

        match name {
            member::CONNECTED => {
                let on = value
                    .as_bool()
                    .ok_or_else(|| fail(SCODE_INVALID_VALUE, "Connected expects a bool"))?;
                if on != state.connected {
                    info!("Simulator {}", if on { "connected" } else { "disconnected" });
                }
                state.connected = on;
                if !on {
                    state.arrive();
                }
            }
            member::TRACKING => {
                if !self.profile.can_set_tracking {
                    return Err(not_implemented(name));
                }
                let on = value
                    .as_bool()
                    .ok_or_else(|| fail(SCODE_INVALID_VALUE, "Tracking expects a bool"))?;
                if on && state.at_park {
                    return Err(fail(SCODE_INVALID_OPERATION, "Cannot track while parked"));
                }
                state.tracking = on;
            }
            member::RA_RATE | member::DEC_RATE => {
                let allowed = if name == member::RA_RATE {
                    self.profile.can_set_ra_rate
                } else {
                    self.profile.can_set_dec_rate
                };
                if !allowed {
                    return Err(not_implemented(name));
                }
                let rate = value
                    .as_double()
                    .ok_or_else(|| fail(SCODE_INVALID_VALUE, format!("{} expects a number", name)))?;
                if name == member::RA_RATE {
                    state.ra_rate = rate;
                } else {
                    state.dec_rate = rate;
                }
            }
            member::SITE_LATITUDE | member::SITE_LONGITUDE => {
                let degrees = value
                    .as_double()
                    .ok_or_else(|| fail(SCODE_INVALID_VALUE, format!("{} expects a number", name)))?;
                let limit = if name == member::SITE_LATITUDE { 90.0 } else { 180.0 };
                if !(-limit..=limit).contains(&degrees) {
                    return Err(fail(SCODE_INVALID_VALUE, format!("{} {} out of range", name, degrees)));
                }
                if name == member::SITE_LATITUDE {
                    state.site.latitude = degrees;
                } else {
                    state.site.longitude = degrees;
                }
            }
            _ => return Err(fail(SCODE_INVALID_OPERATION, format!("{} is read-only", name))),
        }
        Ok(())
    }

    fn call(&self, name: &str, params: &DispatchParams) -> Result<(), ExcepInfo> {
        let p = &self.profile;
        let mut state = self.state();

        match name {
            member::SLEW_TO_COORDINATES | member::SLEW_TO_COORDINATES_ASYNC => {
                let allowed = if name == member::SLEW_TO_COORDINATES { p.can_slew } else { p.can_slew_async };
                if !allowed {
                    return Err(not_implemented(name));
                }
                if state.at_park {
                    return Err(fail(SCODE_INVALID_OPERATION, "Mount is parked"));
                }
                let (dec, ra) = coordinates(params)?;
                debug!("Simulator slewing to RA {:.4}h Dec {:.4}", ra, dec);
                state.target = Some((ra, dec));
                if name == member::SLEW_TO_COORDINATES || p.slew_polls == 0 {
                    state.arrive();
                } else {
                    state.slewing_left = p.slew_polls;
                }
            }
            member::ABORT_SLEW => {
                if state.at_park {
                    return Err(fail(SCODE_INVALID_OPERATION, "Mount is parked"));
                }
                state.target = None;
                state.slewing_left = 0;
            }
            member::SYNC_TO_COORDINATES => {
                if !p.can_sync {
                    return Err(not_implemented(name));
                }
                let (dec, ra) = coordinates(params)?;
                state.ra = ra;
                state.dec = dec;
            }
            member::PARK => {
                if !p.can_park {
                    return Err(not_implemented(name));
                }
                state.target = state.park_position;
                state.arrive();
                state.tracking = false;
                state.at_park = true;
            }
            member::UNPARK => {
                if !p.can_unpark {
                    return Err(not_implemented(name));
                }
                state.at_park = false;
            }
            member::SET_PARK => {
                if !p.can_set_park {
                    return Err(not_implemented(name));
                }
                state.park_position = Some((state.ra, state.dec));
            }
            _ => return Err(fail(SCODE_BAD_PARAM_COUNT, format!("{} is not a method", name))),
        }
        Ok(())
    }
}

impl Default for SimulatedMount {
    fn default() -> Self {
        Self::new(SimulatorProfile::default())
    }
}

impl Dispatch for SimulatedMount {
    fn id_of_name(&self, name: &str) -> Option<DispId> {
        self.table.id_of(name)
    }

    fn invoke(
        &self,
        id: DispId,
        kind: InvokeKind,
        params: &DispatchParams,
    ) -> Result<Variant, ExcepInfo> {
        self.invocations.fetch_add(1, Ordering::Relaxed);
        let name = self
            .table
            .name_of(id)
            .ok_or_else(|| fail(SCODE_BAD_PARAM_COUNT, format!("unknown dispatch id {}", id)))?;

        if !Self::is_static(name) && !self.state().connected {
            return Err(fail(SCODE_NOT_CONNECTED, format!("{}: not connected", name)));
        }

        match kind {
            InvokeKind::PropertyGet => self.get(name),
            InvokeKind::PropertyPut => self.put(name, params).map(|_| Variant::Empty),
            InvokeKind::Method => self.call(name, params).map(|_| Variant::Empty),
        }
    }
}

/// Device class for the built-in simulator
#[derive(Debug, Clone, Default)]
pub struct SimulatorClass {
    profile: SimulatorProfile,
}

impl SimulatorClass {
    pub fn new(profile: SimulatorProfile) -> Self {
        Self { profile }
    }
}

impl DeviceClass for SimulatorClass {
    fn prog_id(&self) -> &str {
        SIMULATOR_PROG_ID
    }

    fn description(&self) -> String {
        format!("{} (built in)", self.profile.name)
    }

    fn create_instance(&self) -> Result<Arc<dyn Dispatch>, String> {
        Ok(Arc::new(SimulatedMount::new(self.profile.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(mount: &SimulatedMount, name: &str, kind: InvokeKind, params: DispatchParams) -> Result<Variant, ExcepInfo> {
        let id = mount.id_of_name(name).unwrap();
        mount.invoke(id, kind, &params)
    }

    fn get(mount: &SimulatedMount, name: &str) -> Result<Variant, ExcepInfo> {
        call(mount, name, InvokeKind::PropertyGet, DispatchParams::none())
    }

    fn connected(profile: SimulatorProfile) -> SimulatedMount {
        let mount = SimulatedMount::new(profile);
        call(&mount, member::CONNECTED, InvokeKind::PropertyPut, DispatchParams::property_put(true.into())).unwrap();
        mount
    }

    fn slew_async(mount: &SimulatedMount, dec: f64, ra: f64) -> Result<Variant, ExcepInfo> {
        call(
            mount,
            member::SLEW_TO_COORDINATES_ASYNC,
            InvokeKind::Method,
            DispatchParams::positional(vec![dec.into(), ra.into()]),
        )
    }

    #[test]
    fn test_requires_connection() {
        let mount = SimulatedMount::default();
        assert_eq!(get(&mount, member::CAN_PARK).unwrap(), Variant::Bool(true));
        let err = get(&mount, member::RIGHT_ASCENSION).unwrap_err();
        assert_eq!(err.scode, SCODE_NOT_CONNECTED);
    }

    #[test]
    fn test_put_requires_marker() {
        let mount = connected(SimulatorProfile::default());
        let err = call(
            &mount,
            member::TRACKING,
            InvokeKind::PropertyPut,
            DispatchParams::positional(vec![true.into()]),
        )
        .unwrap_err();
        assert_eq!(err.scode, SCODE_PARAM_NOT_OPTIONAL);
    }

    #[test]
    fn test_async_slew_arrives_after_polls() {
        let mount = connected(SimulatorProfile { slew_polls: 2, ..Default::default() });
        slew_async(&mount, 20.0, 10.0).unwrap();

        assert_eq!(get(&mount, member::SLEWING).unwrap(), Variant::Bool(true));
        assert_eq!(get(&mount, member::SLEWING).unwrap(), Variant::Bool(true));
        assert_eq!(get(&mount, member::SLEWING).unwrap(), Variant::Bool(false));
        assert_eq!(get(&mount, member::RIGHT_ASCENSION).unwrap(), Variant::Double(10.0));
        assert_eq!(get(&mount, member::DECLINATION).unwrap(), Variant::Double(20.0));
    }

    #[test]
    fn test_out_of_range_target() {
        let mount = connected(SimulatorProfile::default());
        let err = slew_async(&mount, 95.0, 10.0).unwrap_err();
        assert_eq!(err.scode, SCODE_INVALID_VALUE);
    }

    #[test]
    fn test_site_is_writable() {
        let mount = connected(SimulatorProfile::default());
        let put = |name: &str, degrees: f64| {
            call(&mount, name, InvokeKind::PropertyPut, DispatchParams::property_put(degrees.into()))
        };

        put(member::SITE_LATITUDE, -33.9).unwrap();
        put(member::SITE_LONGITUDE, 18.4).unwrap();
        assert_eq!(get(&mount, member::SITE_LATITUDE).unwrap(), Variant::Double(-33.9));
        assert_eq!(get(&mount, member::SITE_LONGITUDE).unwrap(), Variant::Double(18.4));

        let err = put(member::SITE_LATITUDE, 91.0).unwrap_err();
        assert_eq!(err.scode, SCODE_INVALID_VALUE);
    }

    #[test]
    fn test_missing_capability_raises_not_implemented() {
        let mount = connected(SimulatorProfile { can_sync: false, equatorial: false, ..Default::default() });
        let err = call(
            &mount,
            member::SYNC_TO_COORDINATES,
            InvokeKind::Method,
            DispatchParams::positional(vec![0.0.into(), 1.0.into()]),
        )
        .unwrap_err();
        assert!(err.is_not_implemented());
        assert!(get(&mount, member::RIGHT_ASCENSION).unwrap_err().is_not_implemented());
        assert!(get(&mount, member::AZIMUTH).is_ok());
    }

    #[test]
    fn test_park_returns_to_set_position() {
        let mount = connected(SimulatorProfile { slew_polls: 0, ..Default::default() });
        slew_async(&mount, 45.0, 3.0).unwrap();
        call(&mount, member::SET_PARK, InvokeKind::Method, DispatchParams::none()).unwrap();
        slew_async(&mount, 10.0, 12.0).unwrap();
        call(&mount, member::PARK, InvokeKind::Method, DispatchParams::none()).unwrap();

        assert_eq!(get(&mount, member::AT_PARK).unwrap(), Variant::Bool(true));
        assert_eq!(get(&mount, member::RIGHT_ASCENSION).unwrap(), Variant::Double(3.0));
        assert!(slew_async(&mount, 10.0, 12.0).is_err());
    }
}
