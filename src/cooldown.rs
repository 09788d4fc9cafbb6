//! Replaces the game's breeding cooldown with the configured fixed interval.

use crate::settings::{IntervalHours, MatingConfig};

/// The parts of a creature that the cooldown override touches.
pub trait Creature {
    /// The game time (in seconds) after which the creature can breed again.
    fn cooldown_expiry(&self) -> f64;

    /// Writes the expiry. Returns `false` if the creature has nowhere to store it.
    fn set_cooldown_expiry(&mut self, expiry: f64) -> bool;

    /// The creature's name tag, used for logging.
    fn display_name(&self) -> String;
}

/// A source of game time. Returns `None` when there is no world to ask.
pub trait Clock {
    fn time_seconds(&self) -> Option<f64>;
}

/// Returns the time at which a cooldown starting at `now` ends.
pub fn cooldown_expiry(now: f64, interval: IntervalHours) -> f64 {
    now + interval.seconds()
}

/// Sets the creature's cooldown to end one configured interval from now. If the clock isn't
/// available, the creature is left alone. Returns the new expiry if one was written.
pub fn apply_fixed_cooldown(
    creature: &mut impl Creature,
    clock: &impl Clock,
    config: &MatingConfig,
) -> Option<f64> {
    let now = clock.time_seconds()?;
    let interval = config.get();
    let expiry = cooldown_expiry(now, interval);

    log::debug!(
        "Replacing cooldown expiry {} with {}",
        creature.cooldown_expiry(),
        expiry
    );

    if !creature.set_cooldown_expiry(expiry) {
        return None;
    }

    log::info!(
        "Fixed mating timer set: {} hours for dino {}",
        interval,
        creature.display_name()
    );

    Some(expiry)
}
