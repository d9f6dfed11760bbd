/*
 *  mount/host.rs
 *
 *  MountBridge - ASCOM mount adapter
 *  (c) 2020-26 Stuart Hunter
 *
 *  Services the driver host provides to the adapter
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

use std::time::Duration;

use chrono::Utc;
use log::{error, warn};

use crate::astro::{self, Site};
use crate::constants::ALERT_TITLE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertSeverity {
    /// The operation carried on
    Warning,
    /// The link was lost or could not be made
    Fatal,
}

/// What the adapter needs from the host application
pub trait HostServices: Send + Sync {
    /// Horizon (azimuth, altitude) in degrees to (RA hours, Dec degrees)
    fn hz_to_eq(&self, az: f64, alt: f64) -> (f64, f64);

    fn sleep(&self, duration: Duration);

    /// Show a message to the user
    fn alert(&self, severity: AlertSeverity, message: &str);
}

/// Host services for a standalone process: the system clock, a fixed
/// observing site and the log as the alert channel
#[derive(Debug, Clone, Default)]
pub struct StdHost {
    site: Site,
}

impl StdHost {
    pub fn new(site: Site) -> Self {
        Self { site }
    }

    pub fn site(&self) -> &Site {
        &self.site
    }
}

impl HostServices for StdHost {
    fn hz_to_eq(&self, az: f64, alt: f64) -> (f64, f64) {
        let jd = astro::julian_date(Utc::now());
        astro::horizon_to_equatorial(az, alt, &self.site, jd)
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }

    fn alert(&self, severity: AlertSeverity, message: &str) {
        match severity {
            AlertSeverity::Warning => warn!("{}: {}", ALERT_TITLE, message),
            AlertSeverity::Fatal => error!("{}: {}", ALERT_TITLE, message),
        }
    }
}

/// Device selection dialog
pub trait DeviceChooser {
    /// Returns the chosen ProgID, or an empty string when cancelled
    fn choose(&mut self, current: &str) -> String;
}
