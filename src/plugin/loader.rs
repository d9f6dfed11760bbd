/*
 *  plugin/loader.rs
 *
 *  MountBridge - ASCOM mount adapter
 *  (c) 2020-26 Stuart Hunter
 *
 *  Plugin discovery and loading
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

use std::ffi::c_char;
use std::fs;
use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};
use log::{debug, info, warn};
use thiserror::Error;

use super::ffi::{
    read_c_string, MbPluginVTable, PluginRegisterFn, MB_PLUGIN_ABI_VERSION_MAJOR,
    MB_PLUGIN_ABI_VERSION_MINOR, MB_PLUGIN_ABI_VERSION_PATCH, MB_PLUGIN_NAME_SIZE,
    MB_PLUGIN_PROG_ID_SIZE, MB_PLUGIN_VERSION_SIZE,
};

/// Environment variable naming an extra plugin directory, searched first
pub const DRIVER_PATH_ENV: &str = "MOUNTBRIDGE_DRIVER_PATH";

const REGISTER_SYMBOL: &[u8] = b"mountbridge_plugin_register\0";

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("Plugin not found for {0}")]
    NotFound(String),

    #[error("Failed to load library: {0}")]
    Load(#[from] libloading::Error),

    #[error("Plugin registration returned null vtable")]
    NullVTable,

    #[error("ABI version mismatch: plugin {plugin} incompatible with host {host}")]
    AbiMismatch { plugin: String, host: String },

    #[error("Plugin {path} provides {found}, not {wanted}")]
    WrongDevice { path: String, found: String, wanted: String },
}

/// Plugin metadata extracted from the plugin
#[derive(Debug, Clone)]
pub struct PluginMetadata {
    /// Plugin name (e.g., "MountBridge Simulator Plugin")
    pub name: String,

    /// Plugin version (e.g., "1.0.0")
    pub version: String,

    /// ProgID of the device class the plugin exports
    pub prog_id: String,

    /// ABI version (major, minor, patch)
    pub abi_version: (u32, u32, u32),

    pub path: PathBuf,
}

/// A loaded plugin with its library and vtable
pub struct LoadedPlugin {
    /// The loaded shared library (must be kept alive)
    #[allow(dead_code)]
    library: Library,

    vtable: &'static MbPluginVTable,

    metadata: PluginMetadata,
}

impl LoadedPlugin {
    pub fn vtable(&self) -> &'static MbPluginVTable {
        self.vtable
    }

    pub fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }
}

/// Plugin loader - searches for and loads device plugins
pub struct PluginLoader;

impl PluginLoader {
    /// Search paths in priority order; `extra` comes right after the
    /// environment override
    pub fn search_paths(extra: &[PathBuf]) -> Vec<PathBuf> {
        let mut paths = Vec::new();

        // 1. Environment variable override
        if let Ok(path) = std::env::var(DRIVER_PATH_ENV) {
            paths.push(PathBuf::from(path));
        }

        // 2. Configured directories
        paths.extend(extra.iter().cloned());

        // 3. Development build output (relative to cwd)
        paths.push(PathBuf::from("./target/release"));
        paths.push(PathBuf::from("./target/debug"));

        // 4. User-local directory
        if let Some(home) = dirs_next::home_dir() {
            paths.push(home.join(".local/lib/mountbridge/drivers"));
        }

        // 5. System directories
        paths.push(PathBuf::from("/usr/local/lib/mountbridge/drivers"));
        paths.push(PathBuf::from("/usr/lib/mountbridge/drivers"));

        paths
    }

    /// Library file name for a ProgID: lower-cased, '.' replaced by '_'.
    ///
    /// "MountBridge.SimulatorPlugin" becomes
    /// `libmountbridge_simulatorplugin.so` on Linux.
    pub fn plugin_filename(prog_id: &str) -> String {
        let stem = prog_id.trim().to_lowercase().replace('.', "_");
        format!("{}{}{}", std::env::consts::DLL_PREFIX, stem, std::env::consts::DLL_SUFFIX)
    }

    /// Find the plugin file for a ProgID
    pub fn find_plugin(prog_id: &str, extra: &[PathBuf]) -> Option<PathBuf> {
        let filename = Self::plugin_filename(prog_id);

        for dir in Self::search_paths(extra) {
            let candidate = dir.join(&filename);
            if candidate.is_file() {
                debug!("Found plugin at: {}", candidate.display());
                return Some(candidate);
            }
        }

        debug!("Plugin not found for device: {}", prog_id);
        None
    }

    /// Load a plugin from a specific path
    ///
    /// This performs the following steps:
    /// 1. Load the shared library
    /// 2. Get the registration function symbol
    /// 3. Call the registration function to get the vtable
    /// 4. Verify ABI version compatibility
    /// 5. Extract plugin metadata
    pub fn load_plugin<P: AsRef<Path>>(path: P) -> Result<LoadedPlugin, PluginError> {
        let path = path.as_ref();
        info!("Loading plugin from: {}", path.display());

        // SAFETY: loading runs the library's initialisers; plugins are
        // trusted code installed by the user
        let library = unsafe { Library::new(path)? };

        let vtable_ptr = {
            // SAFETY: the symbol type matches the exported registration fn
            let register_fn: Symbol<PluginRegisterFn> = unsafe { library.get(REGISTER_SYMBOL)? };
            register_fn()
        };
        if vtable_ptr.is_null() {
            return Err(PluginError::NullVTable);
        }

        // SAFETY: the vtable is a static inside the library, which we keep
        // loaded for as long as `LoadedPlugin` lives
        let vtable: &'static MbPluginVTable = unsafe { &*vtable_ptr };

        let mut major = 0u32;
        let mut minor = 0u32;
        let mut patch = 0u32;
        (vtable.abi_version)(&mut major, &mut minor, &mut patch);

        debug!("Plugin ABI version: {}.{}.{}", major, minor, patch);

        if major != MB_PLUGIN_ABI_VERSION_MAJOR {
            return Err(PluginError::AbiMismatch {
                plugin: format!("{}.{}.{}", major, minor, patch),
                host: format!(
                    "{}.{}.{}",
                    MB_PLUGIN_ABI_VERSION_MAJOR, MB_PLUGIN_ABI_VERSION_MINOR, MB_PLUGIN_ABI_VERSION_PATCH
                ),
            });
        }

        if minor > MB_PLUGIN_ABI_VERSION_MINOR {
            warn!(
                "Plugin has newer minor version {}.{}.{} than host {}.{}.{} - may have extra features",
                major, minor, patch,
                MB_PLUGIN_ABI_VERSION_MAJOR, MB_PLUGIN_ABI_VERSION_MINOR, MB_PLUGIN_ABI_VERSION_PATCH
            );
        }

        let mut name_buf: Vec<c_char> = vec![0; MB_PLUGIN_NAME_SIZE];
        let mut version_buf: Vec<c_char> = vec![0; MB_PLUGIN_VERSION_SIZE];
        let mut prog_id_buf: Vec<c_char> = vec![0; MB_PLUGIN_PROG_ID_SIZE];

        (vtable.plugin_info)(
            name_buf.as_mut_ptr(),
            version_buf.as_mut_ptr(),
            prog_id_buf.as_mut_ptr(),
        );

        let metadata = PluginMetadata {
            name: read_c_string(&name_buf),
            version: read_c_string(&version_buf),
            prog_id: read_c_string(&prog_id_buf),
            abi_version: (major, minor, patch),
            path: path.to_path_buf(),
        };

        info!("Loaded plugin: {} v{} ({})", metadata.name, metadata.version, metadata.prog_id);

        Ok(LoadedPlugin { library, vtable, metadata })
    }

    /// Find and load the plugin for a ProgID, checking it exports that class
    pub fn load_by_prog_id(prog_id: &str, extra: &[PathBuf]) -> Result<LoadedPlugin, PluginError> {
        let path = Self::find_plugin(prog_id, extra)
            .ok_or_else(|| PluginError::NotFound(prog_id.to_string()))?;

        let plugin = Self::load_plugin(&path)?;
        if !plugin.metadata().prog_id.eq_ignore_ascii_case(prog_id) {
            return Err(PluginError::WrongDevice {
                path: path.display().to_string(),
                found: plugin.metadata().prog_id.clone(),
                wanted: prog_id.to_string(),
            });
        }
        Ok(plugin)
    }

    /// Metadata of every loadable plugin on the search path, for the chooser.
    ///
    /// Libraries that fail to load or lack the registration symbol are
    /// skipped.
    pub fn discover(extra: &[PathBuf]) -> Vec<PluginMetadata> {
        let mut found: Vec<PluginMetadata> = Vec::new();

        for dir in Self::search_paths(extra) {
            let Ok(entries) = fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if !is_plugin_candidate(&path) {
                    continue;
                }
                match Self::load_plugin(&path) {
                    Ok(plugin) => {
                        let meta = plugin.metadata().clone();
                        if !found.iter().any(|m| m.prog_id.eq_ignore_ascii_case(&meta.prog_id)) {
                            found.push(meta);
                        }
                    }
                    Err(e) => debug!("Skipping {}: {}", path.display(), e),
                }
            }
        }

        found
    }
}

fn is_plugin_candidate(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    path.is_file()
        && name.starts_with(std::env::consts::DLL_PREFIX)
        && name.ends_with(std::env::consts::DLL_SUFFIX)
}
