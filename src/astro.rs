/*
 *  astro.rs
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
//! Horizon <-> equatorial conversion for a site, plus Julian date helpers.
//! Low precision (no nutation/aberration/refraction); good enough to aim a
//! park position, not for pointing models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::AUTOMATION_DATE_TO_JD;

const DEG_TO_RAD: f64 = std::f64::consts::PI / 180.0;
const RAD_TO_DEG: f64 = 180.0 / std::f64::consts::PI;

const JD_UNIX_EPOCH: f64 = 2_440_587.5;
const JD_J2000: f64 = 2_451_545.0;

/// Observing site, degrees; longitude east positive
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub latitude: f64,
    pub longitude: f64,
}

#[inline]
fn sin_deg(x: f64) -> f64 { (x * DEG_TO_RAD).sin() }
#[inline]
fn cos_deg(x: f64) -> f64 { (x * DEG_TO_RAD).cos() }
#[inline]
fn asin_deg(x: f64) -> f64 { x.clamp(-1.0, 1.0).asin() * RAD_TO_DEG }
#[inline]
fn atan2_deg(y: f64, x: f64) -> f64 { y.atan2(x) * RAD_TO_DEG }

/// Normalize angle to [0,360)
fn norm360(x: f64) -> f64 {
    x.rem_euclid(360.0)
}

/// Normalize hours to [0,24)
fn norm24(x: f64) -> f64 {
    x.rem_euclid(24.0)
}

/// Julian date of a UTC instant
pub fn julian_date(when: DateTime<Utc>) -> f64 {
    when.timestamp_millis() as f64 / 86_400_000.0 + JD_UNIX_EPOCH
}

/// Automation date (days since 1899-12-30) to Julian date
pub fn automation_date_to_julian(days: f64) -> f64 {
    days + AUTOMATION_DATE_TO_JD
}

pub fn julian_to_automation_date(jd: f64) -> f64 {
    jd - AUTOMATION_DATE_TO_JD
}

/// Local mean sidereal time in hours
pub fn local_sidereal_hours(jd: f64, longitude_deg: f64) -> f64 {
    let gmst = 18.697_374_558 + 24.065_709_824_419_08 * (jd - JD_J2000);
    norm24(gmst + longitude_deg / 15.0)
}

/// Azimuth (from north through east) and altitude to (RA hours, Dec degrees)
pub fn horizon_to_equatorial(az_deg: f64, alt_deg: f64, site: &Site, jd: f64) -> (f64, f64) {
    let lat = site.latitude;

    let dec = asin_deg(sin_deg(alt_deg) * sin_deg(lat) + cos_deg(alt_deg) * cos_deg(lat) * cos_deg(az_deg));
    let hour_angle = atan2_deg(
        -sin_deg(az_deg) * cos_deg(alt_deg),
        sin_deg(alt_deg) * cos_deg(lat) - cos_deg(alt_deg) * sin_deg(lat) * cos_deg(az_deg),
    );

    let ra = norm24(local_sidereal_hours(jd, site.longitude) - hour_angle / 15.0);
    (ra, dec)
}

/// RA hours and Dec degrees to (azimuth, altitude) degrees
pub fn equatorial_to_horizon(ra_hours: f64, dec_deg: f64, site: &Site, jd: f64) -> (f64, f64) {
    let lat = site.latitude;
    let hour_angle = (local_sidereal_hours(jd, site.longitude) - ra_hours) * 15.0;

    let alt = asin_deg(sin_deg(dec_deg) * sin_deg(lat) + cos_deg(dec_deg) * cos_deg(lat) * cos_deg(hour_angle));
    let az = atan2_deg(
        -sin_deg(hour_angle) * cos_deg(dec_deg),
        sin_deg(dec_deg) * cos_deg(lat) - cos_deg(dec_deg) * sin_deg(lat) * cos_deg(hour_angle),
    );

    (norm360(az), alt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SITE: Site = Site { latitude: 51.48, longitude: -0.0015 };

    #[test]
    fn test_julian_date_epochs() {
        let j2000 = Utc.with_ymd_and_hms(2000, 1, 1, 12, 0, 0).unwrap();
        assert!((julian_date(j2000) - JD_J2000).abs() < 1e-9);
        assert_eq!(automation_date_to_julian(0.0), 2_415_018.5);
        assert!((julian_to_automation_date(automation_date_to_julian(45_000.25)) - 45_000.25).abs() < 1e-9);
    }

    #[test]
    fn test_zenith_is_latitude_and_sidereal_time() {
        let jd = 2_460_000.3;
        let (ra, dec) = horizon_to_equatorial(123.0, 90.0, &SITE, jd);
        assert!((dec - SITE.latitude).abs() < 1e-9);
        assert!((ra - local_sidereal_hours(jd, SITE.longitude)).abs() < 1e-9);
    }

    #[test]
    fn test_due_south_on_meridian() {
        let jd = 2_460_000.3;
        // 40 degrees up due south sits on the meridian
        let (ra, dec) = horizon_to_equatorial(180.0, 40.0, &SITE, jd);
        assert!((dec - (40.0 - (90.0 - SITE.latitude))).abs() < 1e-6);
        assert!((ra - local_sidereal_hours(jd, SITE.longitude)).abs() < 1e-6);
    }

    #[test]
    fn test_conversion_inverts() {
        let jd = 2_460_123.71;
        let (ra, dec) = horizon_to_equatorial(250.0, 30.0, &SITE, jd);
        let (az, alt) = equatorial_to_horizon(ra, dec, &SITE, jd);
        assert!((az - 250.0).abs() < 1e-6);
        assert!((alt - 30.0).abs() < 1e-6);
    }
}
