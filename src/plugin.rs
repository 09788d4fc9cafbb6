//! Plugin lifecycle and the functions the server calls into.

use std::ffi::CStr;
use std::path::Path;
use std::sync::Arc;

use eyre::Result;
use libc::{c_char, c_int};
use parking_lot::RwLock;

use crate::{
    command::{self, COMMAND_NAME},
    cooldown,
    hook::Hook,
    host::{Bridge, ChatPlayer, Dino, RawDino, RawPlayer, WorldClock},
    settings::MatingConfig,
};

type SetMatingIntervalEndFn = unsafe extern "C" fn(*mut RawDino);

static SET_MATING_INTERVAL_END: Hook<SetMatingIntervalEndFn> =
    Hook::new("APrimalDinoCharacter.SetMatingIntervalEnd");

/// Everything the server callbacks need. Present between `start` and `stop`.
struct Plugin {
    bridge: Bridge,
    config: Arc<MatingConfig>,
}

static PLUGIN: RwLock<Option<Plugin>> = parking_lot::const_rwlock(None);

/// Returns what the callbacks need, or `None` if the plugin isn't running. The lock is released
/// before returning, so callers can call back into the server freely.
fn attached() -> Option<(Bridge, Arc<MatingConfig>)> {
    PLUGIN
        .read()
        .as_ref()
        .map(|plugin| (plugin.bridge, Arc::clone(&plugin.config)))
}

/// Replacement for `APrimalDinoCharacter::SetMatingIntervalEnd`.
unsafe extern "C" fn set_mating_interval_end(raw: *mut RawDino) {
    let Some((bridge, config)) = attached() else {
        return;
    };

    let Some(mut dino) = Dino::from_raw(bridge, raw) else {
        return;
    };

    cooldown::apply_fixed_cooldown(&mut dino, &WorldClock::new(bridge), &config);
}

/// Chat callback for `/setmatinginterval`.
unsafe extern "C" fn set_mating_interval_command(
    raw: *mut RawPlayer,
    message: *const c_char,
    _mode: c_int,
) {
    if message.is_null() {
        return;
    }

    let message = CStr::from_ptr(message).to_string_lossy();

    let Some((bridge, config)) = attached() else {
        return;
    };

    let Some(player) = ChatPlayer::from_raw(bridge, raw) else {
        return;
    };

    // The player has already been told what went wrong.
    let _ = command::handle(&player, &message, &config);
}

/// Loads the config at `config_path` and attaches the plugin to the server through `bridge`.
pub(crate) fn start(bridge: Bridge, config_path: &Path) -> Result<()> {
    let config = Arc::new(MatingConfig::default());
    config.load(config_path);
    let interval = config.get();

    // The callbacks look the plugin up, so it has to be in place before they are registered.
    *PLUGIN.write() = Some(Plugin { bridge, config });

    if let Err(err) = SET_MATING_INTERVAL_END.install(&bridge, set_mating_interval_end) {
        *PLUGIN.write() = None;
        return Err(err);
    }

    bridge.add_chat_command(COMMAND_NAME, set_mating_interval_command);

    log::info!("Fixed mating interval set to {interval} hours");
    Ok(())
}

/// Detaches the plugin from the server. Does nothing if it was never started.
pub(crate) fn stop() {
    let Some(plugin) = PLUGIN.write().take() else {
        return;
    };

    if let Err(err) = SET_MATING_INTERVAL_END.disable(&plugin.bridge, set_mating_interval_end) {
        log::error!("Error removing hook: {err:?}");
    }

    if !plugin.bridge.remove_chat_command(COMMAND_NAME) {
        log::warn!("{COMMAND_NAME} was not registered");
    }
}

/// Called by the server when the plugin is loaded.
pub fn init() {
    crate::logging::init();
    log::info!("FixedMatingTimer plugin loaded");
    log::info!("Cargo package version is {}", env!("CARGO_PKG_VERSION"));

    let bridge = match crate::host::bridge() {
        Ok(bridge) => bridge,

        Err(err) => {
            log::error!("Unable to reach the server API: {err:?}. The plugin will do nothing.");
            return;
        }
    };

    if let Err(err) = start(bridge, &crate::resources::get_config_path()) {
        log::error!(
            "Failed to hook {}: {err:?}. The plugin will do nothing.",
            SET_MATING_INTERVAL_END.name()
        );
    }
}

/// Called by the server before the plugin is unloaded.
pub fn shutdown() {
    stop();

    log::info!("FixedMatingTimer plugin unloaded");
    crate::logging::shutdown();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::fake::{self, FakeDino, FakePlayer};

    fn registered_command() -> crate::host::ChatCommandFn {
        fake::with_state(|state| {
            state
                .commands
                .iter()
                .find(|(name, _)| name == COMMAND_NAME)
                .map(|(_, callback)| *callback)
                .expect("command not registered")
        })
    }

    fn installed_hook() -> SetMatingIntervalEndFn {
        let address = fake::with_state(|state| {
            state
                .hooks
                .iter()
                .find(|(name, _)| name == SET_MATING_INTERVAL_END.name())
                .map(|(_, address)| *address)
                .expect("hook not installed")
        });

        unsafe { std::mem::transmute::<usize, SetMatingIntervalEndFn>(address) }
    }

    fn registrations() -> (usize, usize) {
        fake::with_state(|state| (state.hooks.len(), state.commands.len()))
    }

    fn set_world_time(time: Option<f64>) {
        fake::with_state(|state| state.world_time = time);
    }

    fn last_chat() -> (String, String) {
        fake::with_state(|state| state.chat.last().cloned().unwrap())
    }

    fn say(player: &mut FakePlayer, message: &str) {
        let message = crate::host::to_c_string(message);
        unsafe { registered_command()(player.as_raw(), message.as_ptr(), 0) };
    }

    // The plugin itself is global, so the whole lifecycle is exercised in one test.
    #[test]
    fn lifecycle_against_fake_server() {
        fake::reset();

        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.json");

        start(fake::bridge(), &config_path).unwrap();
        assert!(config_path.exists());
        assert!(SET_MATING_INTERVAL_END.is_installed());
        assert_eq!(registrations(), (1, 1));

        // Hook with the default interval.
        let hook = installed_hook();
        set_world_time(Some(1000.0));

        let mut dino = FakeDino::new("Rex");
        unsafe { hook(dino.as_raw()) };
        assert!((dino.next_allowed_mating_time - (1000.0 + 18.0 * 3600.0)).abs() < 1e-6);

        // Change the interval by chat.
        let mut player = FakePlayer {
            name: "Admin".to_string(),
        };

        say(&mut player, "/setmatinginterval 12");
        assert_eq!(
            last_chat(),
            (
                "FixedMatingTimer".to_string(),
                "Fixed mating interval set to 12 hours".to_string()
            )
        );

        say(&mut player, "/setmatinginterval abc");
        assert_eq!(last_chat().1, "Invalid number format");

        let mut other = FakeDino::new("Trike");
        unsafe { hook(other.as_raw()) };
        assert!((other.next_allowed_mating_time - (1000.0 + 12.0 * 3600.0)).abs() < 1e-6);

        // No world, no change.
        set_world_time(None);
        let mut untouched = FakeDino::new("Raptor");
        untouched.next_allowed_mating_time = 5.0;
        unsafe { hook(untouched.as_raw()) };
        assert_eq!(untouched.next_allowed_mating_time, 5.0);

        // Null dinos are ignored.
        set_world_time(Some(1000.0));
        unsafe { hook(std::ptr::null_mut()) };

        stop();
        assert!(!SET_MATING_INTERVAL_END.is_installed());
        assert_eq!(registrations(), (0, 0));

        // Starting again after a stop registers everything exactly once.
        start(fake::bridge(), &config_path).unwrap();
        assert!(SET_MATING_INTERVAL_END.is_installed());
        assert_eq!(registrations(), (1, 1));

        // The server may call back into the plugin while a reply is being delivered.
        fake::with_state(|state| state.on_chat = Some(stop as fn()));
        say(&mut player, "/setmatinginterval 6");
        assert!(!SET_MATING_INTERVAL_END.is_installed());
        assert_eq!(registrations(), (0, 0));

        // Calls that arrive after the plugin stopped do nothing.
        let mut late = FakeDino::new("Late");
        unsafe { set_mating_interval_end(late.as_raw()) };
        assert_eq!(late.next_allowed_mating_time, 0.0);

        // Stopping twice is harmless.
        stop();
    }
}
