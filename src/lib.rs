//! Replaces the breeding cooldown on ARK dedicated servers with a fixed, admin-configurable
//! interval.
//!
//! The server loads this library as a plugin and calls `Plugin_Init` and `Plugin_Unload`.

pub mod command;
pub mod cooldown;
mod hook;
pub mod host;
mod logging;
mod plugin;
mod resources;
pub mod settings;

#[no_mangle]
#[allow(non_snake_case)]
pub extern "C" fn Plugin_Init() {
    plugin::init();
}

#[no_mangle]
#[allow(non_snake_case)]
pub extern "C" fn Plugin_Unload() {
    plugin::shutdown();
}
