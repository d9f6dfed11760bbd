//! This module contains global constants shared by the bridge, the mount
//! operations and the host-facing adapter.

use std::time::Duration;

/// Ratio of the sidereal to the solar (UTC) second.
/// RA tracking offsets are multiplied by this on write and divided on read.
pub const SIDEREAL_RATE: f64 = 0.997_269_567_8;

/// Offset from an automation date (days since 1899-12-30) to a Julian date.
pub const AUTOMATION_DATE_TO_JD: f64 = 2_415_018.5;

/// Interval between `Slewing` polls while parking to a custom position.
pub const PARK_POLL_INTERVAL: Duration = Duration::from_millis(200);
/// Settle delay either side of the `SetPark()` call, some drivers need it.
pub const SET_PARK_SETTLE: Duration = Duration::from_millis(200);

/// `AlignmentMode` value reported by German equatorial mounts.
pub const ALIGNMENT_GERMAN_POLAR: i32 = 2;

/// Reserved configuration key holding the selected device ProgID.
pub const DRIVER_SELECTION_KEY: &str = "Current Driver ID";

// Host return codes
pub const HOST_OK: i32 = 0;
pub const ERR_NOT_IMPL: i32 = 11;
pub const ERR_COMMNOLINK: i32 = 215;
pub const ERR_ACTIVATION: i32 = -1;

// Static driver/device information reported to the host
pub const DRIVER_INFO_DETAILED: &str = "ASCOM driver adapter for X2";
pub const DRIVER_INFO_VERSION: f64 = 1.0;
pub const DEVICE_NAME_SHORT: &str = "ASCOM_Mount";
pub const DEVICE_NAME_LONG: &str = "Any ASCOM-compliant mount";
pub const DEVICE_DESCRIPTION: &str = "Supports any mount which has an ASCOM driver.";
pub const DEVICE_FIRMWARE: &str = "n/a";
pub const DEVICE_MODEL: &str = "Not available";

/// Title used for blocking alerts raised by the adapter.
pub const ALERT_TITLE: &str = "ASCOM Mount Adapter";

/// Symbolic member names of the device protocol surface.
pub mod member {
    pub const CONNECTED: &str = "Connected";
    pub const NAME: &str = "Name";

    pub const CAN_SYNC: &str = "CanSync";
    pub const CAN_SLEW: &str = "CanSlew";
    pub const CAN_SLEW_ASYNC: &str = "CanSlewAsync";
    pub const CAN_SLEW_ALTAZ: &str = "CanSlewAltAz";
    pub const ALIGNMENT_MODE: &str = "AlignmentMode";
    pub const CAN_SET_TRACKING: &str = "CanSetTracking";
    pub const CAN_SET_RA_RATE: &str = "CanSetRightAscensionRate";
    pub const CAN_SET_DEC_RATE: &str = "CanSetDeclinationRate";
    pub const CAN_PARK: &str = "CanPark";
    pub const CAN_UNPARK: &str = "CanUnpark";
    pub const CAN_SET_PARK: &str = "CanSetPark";
    pub const DOES_REFRACTION: &str = "DoesRefraction";

    pub const RIGHT_ASCENSION: &str = "RightAscension";
    pub const DECLINATION: &str = "Declination";
    pub const AZIMUTH: &str = "Azimuth";
    pub const ALTITUDE: &str = "Altitude";
    pub const SITE_LATITUDE: &str = "SiteLatitude";
    pub const SITE_LONGITUDE: &str = "SiteLongitude";
    pub const UTC_DATE: &str = "UTCDate";
    pub const AT_PARK: &str = "AtPark";
    pub const TRACKING: &str = "Tracking";
    pub const RA_RATE: &str = "RightAscensionRate";
    pub const DEC_RATE: &str = "DeclinationRate";
    pub const SLEWING: &str = "Slewing";

    pub const SLEW_TO_COORDINATES: &str = "SlewToCoordinates";
    pub const SLEW_TO_COORDINATES_ASYNC: &str = "SlewToCoordinatesAsync";
    pub const ABORT_SLEW: &str = "AbortSlew";
    pub const SYNC_TO_COORDINATES: &str = "SyncToCoordinates";
    pub const PARK: &str = "Park";
    pub const UNPARK: &str = "Unpark";
    pub const SET_PARK: &str = "SetPark";
}
