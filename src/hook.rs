//! Types for replacing server functions through the bridge.

use std::ffi::c_void;

use eyre::{eyre, Result};
use parking_lot::Mutex;

use crate::host::{self, Bridge};

/// A server function, identified by the name the server API knows it by, that can be replaced.
pub struct Hook<FnType> {
    name: &'static str,

    /// Pointer to the superseded implementation. `Some` while the hook is installed.
    original_fn: Mutex<Option<usize>>,

    _fn_type: std::marker::PhantomData<FnType>,
}

impl<FnType: Copy> Hook<FnType> {
    /// Creates a new hook for the named function. This does not install the hook.
    pub const fn new(name: &'static str) -> Hook<FnType> {
        Hook {
            name,
            original_fn: parking_lot::const_mutex(None),
            _fn_type: std::marker::PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    #[cfg(test)]
    pub fn is_installed(&self) -> bool {
        self.original_fn.lock().is_some()
    }

    /// Casts a function pointer to the raw form the bridge takes.
    fn raw_fn(replacement: FnType) -> *mut c_void {
        assert_eq!(
            std::mem::size_of::<FnType>(),
            std::mem::size_of::<*mut c_void>(),
            "hook targets must be plain function pointers"
        );

        unsafe { std::mem::transmute_copy(&replacement) }
    }

    /// Replaces the server function with `replacement`. The original implementation is kept but
    /// never called. Installing an already-installed hook does nothing.
    pub fn install(&self, bridge: &Bridge, replacement: FnType) -> Result<()> {
        let mut original_fn = self.original_fn.lock();

        if original_fn.is_some() {
            return Ok(());
        }

        let name = host::to_c_string(self.name);
        let mut original: *mut c_void = std::ptr::null_mut();

        let hooked =
            unsafe { (bridge.set_hook)(name.as_ptr(), Self::raw_fn(replacement), &mut original) };

        if !hooked {
            return Err(eyre!("server refused to hook {}", self.name));
        }

        log::debug!("Hooked {} (original at {:#x})", self.name, original as usize);
        *original_fn = Some(original as usize);

        Ok(())
    }

    /// Restores the server's own implementation. Does nothing if the hook isn't installed.
    pub fn disable(&self, bridge: &Bridge, replacement: FnType) -> Result<()> {
        let mut original_fn = self.original_fn.lock();

        if original_fn.is_none() {
            return Ok(());
        }

        let name = host::to_c_string(self.name);
        let disabled = unsafe { (bridge.disable_hook)(name.as_ptr(), Self::raw_fn(replacement)) };

        // Whatever the server says, we no longer expect calls through this hook.
        *original_fn = None;

        if disabled {
            Ok(())
        } else {
            Err(eyre!("server couldn't disable hook {}", self.name))
        }
    }
}
