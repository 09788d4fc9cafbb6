//! The `/setmatinginterval` chat command.

use crate::settings::{IntervalHours, MatingConfig, SettingsError};

/// The chat command players type to change the interval.
pub const COMMAND_NAME: &str = "/setmatinginterval";

/// The sender name attached to replies.
pub const SENDER_NAME: &str = "FixedMatingTimer";

/// Reasons a command was refused. The `Display` text is what the player sees.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum CommandError {
    #[error("Usage: /setmatinginterval <hours>")]
    Usage,

    #[error("Invalid number format")]
    InvalidNumber,

    #[error(transparent)]
    Rejected(#[from] SettingsError),
}

/// The player that issued a command.
pub trait Player {
    /// Sends a chat message to this player only.
    fn send_chat(&self, sender: &str, message: &str);

    /// The player's character name, used for the audit log.
    fn character_name(&self) -> String;
}

/// Pulls the hours argument out of a command line. Tokens after the argument are ignored.
///
/// Numbers that can't be held in an `f32` without becoming infinite, or without a non-zero
/// value collapsing to zero, are treated as malformed.
pub fn parse_hours(message: &str) -> Result<f32, CommandError> {
    let mut tokens = message.split_whitespace().skip(1);
    let argument = tokens.next().ok_or(CommandError::Usage)?;

    let wide = argument
        .parse::<f64>()
        .map_err(|_| CommandError::InvalidNumber)?;

    let hours = wide as f32;

    if !hours.is_finite() || (hours == 0.0 && wide != 0.0) {
        return Err(CommandError::InvalidNumber);
    }

    Ok(hours)
}

/// Handles one use of the command: updates `config` and tells `player` how it went.
pub fn handle(
    player: &impl Player,
    message: &str,
    config: &MatingConfig,
) -> Result<IntervalHours, CommandError> {
    let result = parse_hours(message).and_then(|hours| Ok(config.set(hours)?));

    match result {
        Ok(interval) => {
            player.send_chat(
                SENDER_NAME,
                &format!("Fixed mating interval set to {interval} hours"),
            );

            log::info!(
                "Admin {} changed mating interval to {} hours",
                player.character_name(),
                interval
            );
        }

        Err(err) => player.send_chat(SENDER_NAME, &err.to_string()),
    }

    result
}
