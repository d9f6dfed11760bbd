/*
 *  factory.rs
 *
 *  MountBridge - ASCOM mount adapter
 *  (c) 2020-26 Stuart Hunter
 *
 *  Device registry - resolves a configured ProgID to a device class
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

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, info};

use crate::bridge::traits::DeviceClass;

#[cfg(feature = "simulator")]
use crate::drivers::simulator::SimulatorClass;

#[cfg(feature = "plugin-system")]
use crate::plugin::{PluginClass, PluginLoader};

/// Where a listed device class comes from
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceSource {
    Builtin,
    Plugin(PathBuf),
}

/// Chooser entry
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub prog_id: String,
    pub description: String,
    pub source: DeviceSource,
}

/// Registry of installable device classes keyed by ProgID (case-insensitive)
pub struct DeviceRegistry {
    classes: BTreeMap<String, Arc<dyn DeviceClass>>,
    plugin_dirs: Vec<PathBuf>,
    search_plugins: bool,
}

impl DeviceRegistry {
    /// Empty registry without plugin search
    pub fn new() -> Self {
        Self {
            classes: BTreeMap::new(),
            plugin_dirs: Vec::new(),
            search_plugins: false,
        }
    }

    /// Registry with every built-in class, searching plugins first when the
    /// plugin system is compiled in
    pub fn with_builtins() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();
        registry.search_plugins = cfg!(feature = "plugin-system");

        #[cfg(feature = "simulator")]
        registry.register(Arc::new(SimulatorClass::default()));

        registry
    }

    /// Add or replace a class under its ProgID
    pub fn register(&mut self, class: Arc<dyn DeviceClass>) {
        let key = class.prog_id().to_ascii_lowercase();
        debug!("Registering device class {}", class.prog_id());
        self.classes.insert(key, class);
    }

    /// Extra directory searched for plugins
    pub fn add_plugin_dir(&mut self, dir: impl Into<PathBuf>) {
        self.plugin_dirs.push(dir.into());
    }

    pub fn set_plugin_search(&mut self, enabled: bool) {
        self.search_plugins = enabled;
    }

    /// Resolve a ProgID. A plugin on the search path wins over a built-in
    /// class of the same ProgID.
    pub fn resolve(&self, prog_id: &str) -> Option<Arc<dyn DeviceClass>> {
        #[cfg(feature = "plugin-system")]
        {
            if self.search_plugins {
                if let Some(class) = self.try_load_plugin(prog_id) {
                    info!("Using plugin device class for {}", prog_id);
                    return Some(class);
                }
                debug!("Plugin not found, falling back to built-in device class");
            }
        }

        let class = self.classes.get(&prog_id.trim().to_ascii_lowercase()).cloned();
        if class.is_some() {
            info!("Using built-in device class for {}", prog_id);
        }
        class
    }

    #[cfg(feature = "plugin-system")]
    fn try_load_plugin(&self, prog_id: &str) -> Option<Arc<dyn DeviceClass>> {
        match PluginLoader::load_by_prog_id(prog_id, &self.plugin_dirs) {
            Ok(plugin) => Some(Arc::new(PluginClass::new(plugin))),
            Err(e) => {
                debug!("Failed to load plugin: {}", e);
                None
            }
        }
    }

    /// Everything the chooser can offer: built-ins, then discovered plugins
    pub fn list(&self) -> Vec<DeviceInfo> {
        #[allow(unused_mut)]
        let mut devices: Vec<DeviceInfo> = self
            .classes
            .values()
            .map(|class| DeviceInfo {
                prog_id: class.prog_id().to_string(),
                description: class.description(),
                source: DeviceSource::Builtin,
            })
            .collect();

        #[cfg(feature = "plugin-system")]
        {
            if self.search_plugins {
                for meta in PluginLoader::discover(&self.plugin_dirs) {
                    devices.push(DeviceInfo {
                        description: format!("{} v{}", meta.name, meta.version),
                        prog_id: meta.prog_id,
                        source: DeviceSource::Plugin(meta.path),
                    });
                }
            }
        }

        devices
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
