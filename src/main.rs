/*
 *  main.rs
 *
 *  MountBridge - ASCOM mount adapter
 *  (c) 2020-26 Stuart Hunter
 *
 *  Command line stand-in for the driver host
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

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use env_logger::Env;
use log::{debug, info, warn};

use mountbridge::bridge::DriverSession;
use mountbridge::config::{self, Cli, Command, ConfigStore, YamlConfigStore};
use mountbridge::constants::{DRIVER_SELECTION_KEY, PARK_POLL_INTERVAL};
use mountbridge::factory::{DeviceInfo, DeviceRegistry, DeviceSource};
use mountbridge::mount::{DeviceChooser, HostError, MountAdapter, StdHost};

include!(concat!(env!("OUT_DIR"), "/build_info.rs"));

/// Longest the harness waits for a slew or park to finish
const MOTION_TIMEOUT: Duration = Duration::from_secs(300);

/// Numbered device list on stdin/stdout
struct ConsoleChooser {
    devices: Vec<DeviceInfo>,
}

impl DeviceChooser for ConsoleChooser {
    fn choose(&mut self, current: &str) -> String {
        println!("Available mounts:");
        for (n, device) in self.devices.iter().enumerate() {
            let marker = if device.prog_id.eq_ignore_ascii_case(current) { '*' } else { ' ' };
            println!(" {}{:>2}. {:<32} {}", marker, n + 1, device.prog_id, device.description);
        }
        print!("Select a mount by number or ProgID (empty to cancel): ");
        if io::stdout().flush().is_err() {
            return String::new();
        }

        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line).is_err() {
            return String::new();
        }
        let answer = line.trim();
        match answer.parse::<usize>() {
            Ok(n) if (1..=self.devices.len()).contains(&n) => self.devices[n - 1].prog_id.clone(),
            Ok(_) => String::new(),
            Err(_) => answer.to_string(),
        }
    }
}

fn host_err(what: &str, e: HostError) -> anyhow::Error {
    anyhow!("{} failed: {} (code {})", what, e, e.code())
}

/// Poll `complete` until it reports done
fn wait_for(what: &str, mut complete: impl FnMut() -> Result<bool, HostError>) -> Result<()> {
    let started = Instant::now();
    loop {
        if complete().map_err(|e| host_err(what, e))? {
            debug!("{} complete after {:?}", what, started.elapsed());
            return Ok(());
        }
        if started.elapsed() > MOTION_TIMEOUT {
            bail!("{} did not complete within {:?}", what, MOTION_TIMEOUT);
        }
        std::thread::sleep(PARK_POLL_INTERVAL);
    }
}

fn link(adapter: &mut MountAdapter<StdHost>) -> Result<()> {
    adapter.establish_link().map_err(|e| host_err("Link", e))?;
    info!("Linked to {}", adapter.device_info_name_short());
    Ok(())
}

fn print_devices(registry: &DeviceRegistry, current: &str) {
    for device in registry.list() {
        let source = match &device.source {
            DeviceSource::Builtin => "built in".to_string(),
            DeviceSource::Plugin(path) => path.display().to_string(),
        };
        let marker = if device.prog_id.eq_ignore_ascii_case(current) { '*' } else { ' ' };
        println!("{} {:<32} {} [{}]", marker, device.prog_id, device.description, source);
    }
}

fn status(adapter: &MountAdapter<StdHost>, json: bool) -> Result<()> {
    let (ra, dec) = adapter.ra_dec().map_err(|e| host_err("Reading position", e))?;
    let rates = adapter.tracking_rates().map_err(|e| host_err("Reading tracking", e))?;
    let caps = adapter.session().capabilities();
    let parked = adapter.is_parked();

    if json {
        let report = serde_json::json!({
            "device": adapter.device_info_name_short(),
            "prog_id": adapter.session().prog_id(),
            "ra_hours": ra,
            "dec_degrees": dec,
            "parked": parked,
            "tracking": rates.tracking,
            "ra_rate": rates.ra_rate,
            "dec_rate": rates.dec_rate,
            "needs_refraction": adapter.needs_refraction_adjustments(),
            "capabilities": {
                "sync": caps.can_sync,
                "slew": caps.can_slew,
                "slew_async": caps.can_slew_async,
                "slew_altaz": caps.can_slew_altaz,
                "set_tracking": caps.can_set_tracking,
                "set_track_rates": caps.can_set_track_rates,
                "park": caps.can_park,
                "unpark": caps.can_unpark,
                "set_park": caps.can_set_park,
                "does_refraction": caps.does_refraction,
                "equatorial": caps.is_equatorial,
                "german_equatorial": caps.is_german_equatorial,
            },
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Mount:     {}", adapter.device_info_name_short());
        println!("RA:        {:.4} h", ra);
        println!("Dec:       {:.4} deg", dec);
        println!("Parked:    {}", parked);
        println!(
            "Tracking:  {} (RA {:+.4}, Dec {:+.4})",
            rates.tracking, rates.ra_rate, rates.dec_rate
        );
        println!("Caps:      {:?}", caps);
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_from(&cli).context("loading configuration")?;

    if cli.dump_config {
        print!("{}", config::dump_config(&cfg)?);
        return Ok(());
    }

    let level = cfg.log_level.clone().unwrap_or_else(|| "info".to_string());
    env_logger::Builder::from_env(Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();

    info!("{} v.{} built {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"), BUILD_DATE);

    let path = config::config_path(&cli);
    debug!("Configuration store: {}", path.display());
    let store = Arc::new(YamlConfigStore::open(&path)?);
    if let Some(id) = cli.driver_id.as_deref() {
        store.set(DRIVER_SELECTION_KEY, id)?;
    }
    let current = store.get(DRIVER_SELECTION_KEY)?.unwrap_or_default();

    let mut registry = DeviceRegistry::with_builtins();
    if let Some(dir) = cfg.plugin_path.as_ref() {
        registry.add_plugin_dir(dir);
    }
    let registry = Arc::new(registry);

    let site = cfg.site.unwrap_or_default();
    if cfg.site.is_none() {
        warn!("No observing site configured, park positions assume 0N 0E");
    }

    let session = DriverSession::new(Arc::clone(&registry), store);
    let mut adapter = MountAdapter::new(session, StdHost::new(site));

    match cli.command.clone().unwrap_or(Command::Status { json: false }) {
        Command::Devices => print_devices(&registry, &current),
        Command::Choose => {
            let mut chooser = ConsoleChooser { devices: registry.list() };
            adapter
                .exec_settings_dialog(&mut chooser)
                .map_err(|e| host_err("Choosing a device", e))?;
        }
        Command::Status { json } => {
            link(&mut adapter)?;
            status(&adapter, json)?;
        }
        Command::Slew { ra, dec } => {
            link(&mut adapter)?;
            adapter.start_slew_to(ra, dec).map_err(|e| host_err("Slew", e))?;
            wait_for("Slew", || adapter.is_complete_slew_to())?;
            adapter.end_slew_to().map_err(|e| host_err("Slew", e))?;
            let (ra, dec) = adapter.ra_dec().map_err(|e| host_err("Reading position", e))?;
            info!("Slew complete at RA {:.4} h, Dec {:.4} deg", ra, dec);
        }
        Command::Park { az, alt } => {
            link(&mut adapter)?;
            // default to the pole, the usual home of an equatorial mount
            let az = az.unwrap_or(0.0);
            let alt = alt.unwrap_or(site.latitude.abs());
            adapter.start_park(az, alt).map_err(|e| host_err("Park", e))?;
            wait_for("Park", || adapter.is_complete_park())?;
            adapter.end_park().map_err(|e| host_err("Park", e))?;
            info!("Parked");
        }
        Command::Unpark => {
            link(&mut adapter)?;
            adapter.start_unpark().map_err(|e| host_err("Unpark", e))?;
            wait_for("Unpark", || adapter.is_complete_unpark())?;
            adapter.end_unpark().map_err(|e| host_err("Unpark", e))?;
            info!("Unparked");
        }
    }

    if adapter.is_linked() || adapter.session().is_lost() {
        adapter.terminate_link().map_err(|e| host_err("Unlink", e))?;
    }
    Ok(())
}
