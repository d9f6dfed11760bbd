/*
 *  tests/mount_integration.rs
 *
 *  MountBridge - ASCOM mount adapter
 *  (c) 2020-26 Stuart Hunter
 *
 *  End to end: adapter -> session -> broker -> built-in simulator
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

#![cfg(feature = "simulator")]

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use mountbridge::bridge::{DriverSession, GlobalInterfaceTable};
use mountbridge::config::{ConfigStore, MemoryConfigStore, YamlConfigStore};
use mountbridge::constants::DRIVER_SELECTION_KEY;
use mountbridge::drivers::simulator::{SimulatorClass, SimulatorProfile, SIMULATOR_PROG_ID};
use mountbridge::factory::DeviceRegistry;
use mountbridge::mount::{AlertSeverity, DeviceChooser, HostError, HostServices, MountAdapter};

/// Host with a fixed horizon mapping and no real waiting
#[derive(Default)]
struct TestHost {
    alerts: Mutex<Vec<String>>,
    sleeps: Mutex<usize>,
}

impl HostServices for TestHost {
    fn hz_to_eq(&self, az: f64, alt: f64) -> (f64, f64) {
        (az / 15.0, alt)
    }

    fn sleep(&self, _duration: Duration) {
        *self.sleeps.lock().unwrap() += 1;
    }

    fn alert(&self, _severity: AlertSeverity, message: &str) {
        self.alerts.lock().unwrap().push(message.to_string());
    }
}

fn adapter_with(profile: SimulatorProfile) -> MountAdapter<TestHost> {
    let mut registry = DeviceRegistry::new();
    registry.register(Arc::new(SimulatorClass::new(profile)));
    let config = Arc::new(MemoryConfigStore::new().with(DRIVER_SELECTION_KEY, SIMULATOR_PROG_ID));
    let session = DriverSession::with_table(
        Arc::new(GlobalInterfaceTable::new()),
        Arc::new(registry),
        config,
    );
    MountAdapter::new(session, TestHost::default())
}

fn linked(profile: SimulatorProfile) -> MountAdapter<TestHost> {
    let mut adapter = adapter_with(profile);
    adapter.establish_link().unwrap();
    adapter
}

fn wait(mut complete: impl FnMut() -> Result<bool, HostError>) {
    for _ in 0..100 {
        if complete().unwrap() {
            return;
        }
    }
    panic!("motion never completed");
}

#[test]
fn link_slew_and_unlink() {
    let mut adapter = linked(SimulatorProfile { slew_polls: 3, ..Default::default() });
    assert!(adapter.is_linked());
    assert_eq!(adapter.device_info_name_short(), "MountBridge Simulator");

    adapter.start_slew_to(7.25, 33.5).unwrap();
    assert_eq!(adapter.is_complete_slew_to(), Ok(false));
    wait(|| adapter.is_complete_slew_to());
    adapter.end_slew_to().unwrap();

    assert_eq!(adapter.ra_dec(), Ok((7.25, 33.5)));

    adapter.terminate_link().unwrap();
    assert!(!adapter.is_linked());
    assert_eq!(adapter.ra_dec(), Err(HostError::NoLink));
}

#[test]
fn blocking_slew_arrives_before_returning() {
    let adapter = linked(SimulatorProfile { can_slew_async: false, ..Default::default() });

    adapter.start_slew_to(2.0, -10.0).unwrap();
    assert_eq!(adapter.is_complete_slew_to(), Ok(true));
    assert_eq!(adapter.ra_dec(), Ok((2.0, -10.0)));
}

#[test]
fn park_at_custom_position_then_unpark() {
    let adapter = linked(SimulatorProfile { slew_polls: 2, ..Default::default() });

    adapter.start_park(90.0, 30.0).unwrap();
    assert_eq!(adapter.is_complete_park(), Ok(true));
    assert!(adapter.is_parked());
    assert_eq!(adapter.ra_dec(), Ok((6.0, 30.0)));
    assert!(*adapter.host().sleeps.lock().unwrap() >= 2);

    // slewing needs tracking, which a parked mount refuses
    assert_eq!(adapter.start_slew_to(1.0, 1.0), Err(HostError::NoLink));
    assert!(adapter.is_linked());
    assert_eq!(adapter.abort(), Ok(()));

    adapter.start_unpark().unwrap();
    assert_eq!(adapter.is_complete_unpark(), Ok(true));
    assert!(!adapter.is_parked());
}

#[test]
fn tracking_rates_survive_the_round_trip() {
    let adapter = linked(SimulatorProfile::default());

    adapter.set_tracking_rates(true, false, 0.015, -0.25).unwrap();
    let rates = adapter.tracking_rates().unwrap();
    assert!(rates.tracking);
    assert!((rates.ra_rate - 0.015).abs() < 1e-9);
    assert!((rates.dec_rate + 0.25).abs() < 1e-9);
}

#[test]
fn missing_capabilities_are_not_implemented() {
    let adapter = linked(SimulatorProfile {
        can_sync: false,
        can_set_ra_rate: false,
        does_refraction: true,
        ..Default::default()
    });

    assert_eq!(adapter.sync_mount(1.0, 1.0), Err(HostError::NotImplemented));
    assert_eq!(
        adapter.set_tracking_rates(true, false, 0.1, 0.1),
        Err(HostError::NotImplemented)
    );
    assert!(!adapter.needs_refraction_adjustments());
    assert!(adapter.host().alerts.lock().unwrap().is_empty());
}

#[test]
fn alt_az_only_mount_links() {
    let adapter = linked(SimulatorProfile { equatorial: false, ..Default::default() });
    assert!(!adapter.session().capabilities().is_equatorial);
    assert_eq!(adapter.ra_dec(), Err(HostError::NotImplemented));
}

#[test]
fn mount_without_coordinates_fails_to_link() {
    let mut adapter = adapter_with(SimulatorProfile {
        equatorial: false,
        altaz: false,
        ..Default::default()
    });

    assert_eq!(adapter.establish_link(), Err(HostError::ActivationFailure));
    assert!(!adapter.is_linked());
    assert_eq!(adapter.host().alerts.lock().unwrap().len(), 1);
}

#[test]
fn calls_from_another_thread_rederive_once() {
    let adapter = linked(SimulatorProfile::default());
    adapter.ra_dec().unwrap();
    assert_eq!(adapter.session().derivations(), 0);

    thread::scope(|s| {
        s.spawn(|| {
            adapter.ra_dec().unwrap();
            adapter.ra_dec().unwrap();
        });
    });
    assert_eq!(adapter.session().derivations(), 1);

    // back on the first thread is another switch
    adapter.ra_dec().unwrap();
    assert_eq!(adapter.session().derivations(), 2);
}

struct Pick(&'static str);

impl DeviceChooser for Pick {
    fn choose(&mut self, _current: &str) -> String {
        self.0.to_string()
    }
}

#[test]
fn chosen_device_is_saved_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    let store = Arc::new(YamlConfigStore::open(&path).unwrap());

    let mut registry = DeviceRegistry::new();
    registry.register(Arc::new(SimulatorClass::default()));
    let session = DriverSession::with_table(
        Arc::new(GlobalInterfaceTable::new()),
        Arc::new(registry),
        store.clone(),
    );
    let mut adapter = MountAdapter::new(session, TestHost::default());

    assert_eq!(adapter.establish_link(), Err(HostError::ActivationFailure));

    adapter.exec_settings_dialog(&mut Pick("")).unwrap();
    assert!(!path.exists());

    adapter.exec_settings_dialog(&mut Pick(SIMULATOR_PROG_ID)).unwrap();
    let reopened = YamlConfigStore::open(&path).unwrap();
    assert_eq!(
        reopened.get(DRIVER_SELECTION_KEY).unwrap().as_deref(),
        Some(SIMULATOR_PROG_ID)
    );

    adapter.establish_link().unwrap();
    assert!(adapter.is_linked());
}
