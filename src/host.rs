//! Finds the server's plugin bridge and wraps the host objects it hands us in safe types.
//!
//! The bridge is a C ABI shim over the server API. Strings cross it as UTF-8. Functions that
//! produce a string write at most `capacity` bytes into the buffer (no terminator) and return
//! the full length of the string in bytes.

use std::ffi::{c_void, CString};
use std::ptr::NonNull;

use cached::proc_macro::cached;
use dlopen::symbor::Library;
use eyre::{Result, WrapErr};
use libc::{c_char, c_int};

use crate::command::Player;
use crate::cooldown::{Clock, Creature};

/// The library that exports the bridge functions. It is loaded by the server before plugins.
const BRIDGE_LIBRARY: &str = "ArkApiBridge.dll";

/// A dino character owned by the server.
#[repr(C)]
pub struct RawDino {
    _private: [u8; 0],
}

/// A player controller owned by the server.
#[repr(C)]
pub struct RawPlayer {
    _private: [u8; 0],
}

/// Signature of chat command callbacks.
pub type ChatCommandFn = unsafe extern "C" fn(*mut RawPlayer, *const c_char, c_int);

type SetHookFn = unsafe extern "C" fn(*const c_char, *mut c_void, *mut *mut c_void) -> bool;
type DisableHookFn = unsafe extern "C" fn(*const c_char, *mut c_void) -> bool;
type AddChatCommandFn = unsafe extern "C" fn(*const c_char, ChatCommandFn);
type RemoveChatCommandFn = unsafe extern "C" fn(*const c_char) -> bool;
type SendChatMessageFn = unsafe extern "C" fn(*mut RawPlayer, *const c_char, *const c_char);
type CharacterNameFn = unsafe extern "C" fn(*mut RawPlayer, *mut c_char, usize) -> usize;
type WorldTimeFn = unsafe extern "C" fn(*mut f64) -> bool;
type DinoNameTagFn = unsafe extern "C" fn(*mut RawDino, *mut c_char, usize) -> usize;
type DinoMatingTimeFn = unsafe extern "C" fn(*mut RawDino) -> *mut f64;

/// The functions we need from the server.
#[derive(Clone, Copy)]
pub struct Bridge {
    pub(crate) set_hook: SetHookFn,
    pub(crate) disable_hook: DisableHookFn,
    pub(crate) add_chat_command: AddChatCommandFn,
    pub(crate) remove_chat_command: RemoveChatCommandFn,
    pub(crate) send_chat_message: SendChatMessageFn,
    pub(crate) character_name: CharacterNameFn,
    pub(crate) world_time_seconds: WorldTimeFn,
    pub(crate) dino_name_tag: DinoNameTagFn,
    pub(crate) dino_next_allowed_mating_time: DinoMatingTimeFn,
}

fn get_symbol<T: Copy>(lib: &'static Library, sym_name: &str) -> Result<T> {
    let symbol = unsafe { lib.symbol::<T>(sym_name) }
        .wrap_err_with(|| format!("Unable to find {sym_name} in bridge library"))?;
    Ok(*symbol)
}

/// Loads the bridge library and looks up every function we use.
#[cached(result = true)]
pub fn bridge() -> Result<Bridge> {
    // The library is never unloaded while the server runs, so neither is our handle.
    let lib: &'static Library = Box::leak(Box::new(
        Library::open(BRIDGE_LIBRARY).wrap_err("Failed to open bridge library")?,
    ));

    Ok(Bridge {
        set_hook: get_symbol(lib, "Bridge_SetHook")?,
        disable_hook: get_symbol(lib, "Bridge_DisableHook")?,
        add_chat_command: get_symbol(lib, "Bridge_AddChatCommand")?,
        remove_chat_command: get_symbol(lib, "Bridge_RemoveChatCommand")?,
        send_chat_message: get_symbol(lib, "Bridge_SendChatMessage")?,
        character_name: get_symbol(lib, "Bridge_GetCharacterName")?,
        world_time_seconds: get_symbol(lib, "Bridge_GetWorldTimeSeconds")?,
        dino_name_tag: get_symbol(lib, "Bridge_GetDinoNameTag")?,
        dino_next_allowed_mating_time: get_symbol(lib, "Bridge_NextAllowedMatingTimeField")?,
    })
}

/// Makes a C string, dropping any interior nul bytes rather than failing.
pub(crate) fn to_c_string(string: &str) -> CString {
    CString::new(string.replace('\0', "")).unwrap_or_default()
}

/// Calls a bridge function that fills a string buffer, growing the buffer if the first call
/// says the string was longer.
fn read_string(mut fill: impl FnMut(*mut c_char, usize) -> usize) -> String {
    let mut buffer = vec![0u8; 128];
    let mut len = fill(buffer.as_mut_ptr().cast(), buffer.len());

    if len > buffer.len() {
        buffer.resize(len, 0);
        len = fill(buffer.as_mut_ptr().cast(), buffer.len());
    }

    buffer.truncate(len.min(buffer.len()));
    String::from_utf8_lossy(&buffer).into_owned()
}

impl Bridge {
    /// Registers `callback` for the chat command `name`.
    pub fn add_chat_command(&self, name: &str, callback: ChatCommandFn) {
        let name = to_c_string(name);
        unsafe { (self.add_chat_command)(name.as_ptr(), callback) }
    }

    /// Removes a chat command. Returns `false` if the server didn't know about it.
    pub fn remove_chat_command(&self, name: &str) -> bool {
        let name = to_c_string(name);
        unsafe { (self.remove_chat_command)(name.as_ptr()) }
    }
}

/// The server's world clock.
pub struct WorldClock {
    bridge: Bridge,
}

impl WorldClock {
    pub fn new(bridge: Bridge) -> WorldClock {
        WorldClock { bridge }
    }
}

impl Clock for WorldClock {
    fn time_seconds(&self) -> Option<f64> {
        let mut seconds = 0.0;
        let found = unsafe { (self.bridge.world_time_seconds)(&mut seconds) };

        found.then_some(seconds)
    }
}

/// A dino character that the server passed to one of our hooks.
pub struct Dino {
    raw: NonNull<RawDino>,
    bridge: Bridge,
}

impl Dino {
    /// Wraps `raw`, or returns `None` if it's null.
    ///
    /// # Safety
    /// `raw` must point to a live dino for as long as the returned value is used.
    pub unsafe fn from_raw(bridge: Bridge, raw: *mut RawDino) -> Option<Dino> {
        NonNull::new(raw).map(|raw| Dino { raw, bridge })
    }

    fn mating_time_field(&self) -> Option<NonNull<f64>> {
        NonNull::new(unsafe { (self.bridge.dino_next_allowed_mating_time)(self.raw.as_ptr()) })
    }
}

impl Creature for Dino {
    fn cooldown_expiry(&self) -> f64 {
        self.mating_time_field()
            .map(|field| unsafe { *field.as_ptr() })
            .unwrap_or_default()
    }

    fn set_cooldown_expiry(&mut self, expiry: f64) -> bool {
        match self.mating_time_field() {
            Some(field) => {
                unsafe { *field.as_ptr() = expiry };
                true
            }

            None => {
                log::warn!("Dino has no mating time field");
                false
            }
        }
    }

    fn display_name(&self) -> String {
        read_string(|buffer, capacity| unsafe {
            (self.bridge.dino_name_tag)(self.raw.as_ptr(), buffer, capacity)
        })
    }
}

/// A player who used one of our chat commands.
pub struct ChatPlayer {
    raw: NonNull<RawPlayer>,
    bridge: Bridge,
}

impl ChatPlayer {
    /// Wraps `raw`, or returns `None` if it's null.
    ///
    /// # Safety
    /// `raw` must point to a live player controller for as long as the returned value is used.
    pub unsafe fn from_raw(bridge: Bridge, raw: *mut RawPlayer) -> Option<ChatPlayer> {
        NonNull::new(raw).map(|raw| ChatPlayer { raw, bridge })
    }
}

impl Player for ChatPlayer {
    fn send_chat(&self, sender: &str, message: &str) {
        let sender = to_c_string(sender);
        let message = to_c_string(message);

        unsafe {
            (self.bridge.send_chat_message)(self.raw.as_ptr(), sender.as_ptr(), message.as_ptr())
        }
    }

    fn character_name(&self) -> String {
        read_string(|buffer, capacity| unsafe {
            (self.bridge.character_name)(self.raw.as_ptr(), buffer, capacity)
        })
    }
}


#[cfg(test)]
mod tests {
    use super::fake::{FakeDino, FakePlayer};
    use super::*;

    #[test]
    fn dino_reads_and_writes_through_bridge() {
        let mut fake_dino = FakeDino::new("Big Rex");
        fake_dino.next_allowed_mating_time = 10.0;

        let mut dino = unsafe { Dino::from_raw(fake::bridge(), fake_dino.as_raw()) }.unwrap();

        assert_eq!(dino.cooldown_expiry(), 10.0);
        assert_eq!(dino.display_name(), "Big Rex");

        assert!(dino.set_cooldown_expiry(99.5));
        drop(dino);

        assert_eq!(fake_dino.next_allowed_mating_time, 99.5);
    }

    #[test]
    fn missing_mating_field_is_reported() {
        fake::reset();
        fake::with_state(|state| state.no_mating_field = true);

        let mut fake_dino = FakeDino::new("Dodo");
        fake_dino.next_allowed_mating_time = 7.0;

        let mut dino = unsafe { Dino::from_raw(fake::bridge(), fake_dino.as_raw()) }.unwrap();

        assert_eq!(dino.cooldown_expiry(), 0.0);
        assert!(!dino.set_cooldown_expiry(99.5));
        drop(dino);

        assert_eq!(fake_dino.next_allowed_mating_time, 7.0);
        fake::reset();
    }

    #[test]
    fn long_names_are_read_in_full() {
        let long_name = "Parasaurolophus ".repeat(20);
        let mut fake_dino = FakeDino::new(&long_name);

        let dino = unsafe { Dino::from_raw(fake::bridge(), fake_dino.as_raw()) }.unwrap();

        assert_eq!(dino.display_name(), long_name);
    }

    #[test]
    fn null_objects_are_not_wrapped() {
        let bridge = fake::bridge();

        assert!(unsafe { Dino::from_raw(bridge, std::ptr::null_mut()) }.is_none());
        assert!(unsafe { ChatPlayer::from_raw(bridge, std::ptr::null_mut()) }.is_none());
    }

    #[test]
    fn player_name_is_read() {
        let mut fake_player = FakePlayer {
            name: "Helena".to_string(),
        };

        let player = unsafe { ChatPlayer::from_raw(fake::bridge(), fake_player.as_raw()) }.unwrap();

        assert_eq!(player.character_name(), "Helena");
    }

    #[test]
    fn interior_nul_is_dropped() {
        assert_eq!(to_c_string("a\0b").as_bytes(), b"ab");
    }
}
