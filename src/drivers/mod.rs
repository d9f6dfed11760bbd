/*
 *  drivers/mod.rs
 *
 *  MountBridge - ASCOM mount adapter
 *  (c) 2020-26 Stuart Hunter
 *
 *  Built-in device implementations
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

use crate::bridge::variant::DispId;
use crate::constants::member;

// Simulated mount, also exported as a plugin by the simulator driver crate
#[cfg(feature = "simulator")]
pub mod simulator;

// Mock mount for testing
#[cfg(test)]
pub mod mock;

/// Every member of the telescope protocol surface, in dispatch-id order
pub const TELESCOPE_MEMBERS: &[&str] = &[
    member::CONNECTED,
    member::NAME,
    member::CAN_SYNC,
    member::CAN_SLEW,
    member::CAN_SLEW_ASYNC,
    member::CAN_SLEW_ALTAZ,
    member::ALIGNMENT_MODE,
    member::CAN_SET_TRACKING,
    member::CAN_SET_RA_RATE,
    member::CAN_SET_DEC_RATE,
    member::CAN_PARK,
    member::CAN_UNPARK,
    member::CAN_SET_PARK,
    member::DOES_REFRACTION,
    member::RIGHT_ASCENSION,
    member::DECLINATION,
    member::AZIMUTH,
    member::ALTITUDE,
    member::SITE_LATITUDE,
    member::SITE_LONGITUDE,
    member::UTC_DATE,
    member::AT_PARK,
    member::TRACKING,
    member::RA_RATE,
    member::DEC_RATE,
    member::SLEWING,
    member::SLEW_TO_COORDINATES,
    member::SLEW_TO_COORDINATES_ASYNC,
    member::ABORT_SLEW,
    member::SYNC_TO_COORDINATES,
    member::PARK,
    member::UNPARK,
    member::SET_PARK,
];

/// Name/id lookup for a built-in device.
///
/// Ids are the 1-based position in the member list; lookups ignore case the
/// way automation name resolution does.
#[derive(Debug, Clone)]
pub struct MemberTable {
    names: Vec<&'static str>,
}

impl MemberTable {
    pub fn new(names: &[&'static str]) -> Self {
        Self { names: names.to_vec() }
    }

    pub fn telescope() -> Self {
        Self::new(TELESCOPE_MEMBERS)
    }

    /// Same table minus the given members
    pub fn without(&self, missing: &[&str]) -> Self {
        Self {
            names: self
                .names
                .iter()
                .copied()
                .filter(|n| !missing.iter().any(|m| m.eq_ignore_ascii_case(n)))
                .collect(),
        }
    }

    pub fn id_of(&self, name: &str) -> Option<DispId> {
        self.names
            .iter()
            .position(|n| n.eq_ignore_ascii_case(name))
            .map(|i| i as DispId + 1)
    }

    pub fn name_of(&self, id: DispId) -> Option<&'static str> {
        usize::try_from(id)
            .ok()
            .and_then(|i| i.checked_sub(1))
            .and_then(|i| self.names.get(i).copied())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_ignores_case() {
        let table = MemberTable::telescope();
        let id = table.id_of("rightascension").unwrap();
        assert_eq!(table.name_of(id), Some(member::RIGHT_ASCENSION));
        assert_eq!(table.id_of("Focus"), None);
        assert_eq!(table.name_of(0), None);
        assert_eq!(table.name_of(-3), None);
    }

    #[test]
    fn test_without_drops_members() {
        let table = MemberTable::telescope().without(&[member::RIGHT_ASCENSION]);
        assert_eq!(table.id_of(member::RIGHT_ASCENSION), None);
        assert_eq!(table.len(), TELESCOPE_MEMBERS.len() - 1);
    }
}
