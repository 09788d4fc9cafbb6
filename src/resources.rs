//! Locations of the files the plugin owns.

use std::path::PathBuf;

/// The directory the server loads this plugin from, relative to the server binary's directory.
const PLUGIN_DIR: [&str; 3] = ["ArkApi", "Plugins", "FixedMatingTimer"];

/// The directory holding the server executable. Falls back to the working directory if the
/// executable path can't be found.
fn find_binary_dir_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn get_plugin_path(resource_name: &str) -> PathBuf {
    let mut path = find_binary_dir_path();
    path.extend(PLUGIN_DIR);
    path.push(resource_name);

    path
}

pub fn get_config_path() -> PathBuf {
    get_plugin_path("config.json")
}

pub fn get_log_path() -> PathBuf {
    get_plugin_path("FixedMatingTimer.log")
}
