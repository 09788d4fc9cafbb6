//! The fixed mating interval and the JSON file it is loaded from.

use std::{
    fmt,
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

use eyre::Result;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{
    ser::{PrettyFormatter, Serializer},
    Map, Value,
};

/// The interval used when the config file doesn't give one.
pub const DEFAULT_INTERVAL_HOURS: f32 = 18.0;

/// Errors produced when validating a new interval.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum SettingsError {
    /// The value was zero, negative, or not a finite number.
    #[error("Interval must be greater than 0")]
    NotPositive(f32),
}

/// A breeding cooldown length in hours. Always finite and greater than zero.
#[derive(Clone, Copy, PartialEq, PartialOrd, Debug, Serialize, Deserialize)]
#[serde(try_from = "f32", into = "f32")]
pub struct IntervalHours(f32);

impl IntervalHours {
    pub const DEFAULT: IntervalHours = IntervalHours(DEFAULT_INTERVAL_HOURS);

    /// Checks that `hours` is usable as a cooldown length.
    pub fn new(hours: f32) -> Result<IntervalHours, SettingsError> {
        if hours.is_finite() && hours > 0.0 {
            Ok(IntervalHours(hours))
        } else {
            Err(SettingsError::NotPositive(hours))
        }
    }

    pub fn hours(self) -> f32 {
        self.0
    }

    /// The interval converted to seconds, which is the unit the game clock uses.
    pub fn seconds(self) -> f64 {
        f64::from(self.0) * 3600.0
    }
}

impl Default for IntervalHours {
    fn default() -> Self {
        IntervalHours::DEFAULT
    }
}

impl TryFrom<f32> for IntervalHours {
    type Error = SettingsError;

    fn try_from(hours: f32) -> Result<Self, Self::Error> {
        IntervalHours::new(hours)
    }
}

impl From<IntervalHours> for f32 {
    fn from(interval: IntervalHours) -> f32 {
        interval.0
    }
}

impl fmt::Display for IntervalHours {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The layout of `config.json`. Unknown keys are ignored.
#[derive(Serialize, Deserialize, Debug)]
struct ConfigFile {
    #[serde(rename = "FixedMatingIntervalHours", default)]
    interval: IntervalHours,
}

impl ConfigFile {
    /// Attempts to parse the contents of `reader` as a config file. The top level has to be an
    /// object.
    fn parse_json(reader: impl Read) -> Result<ConfigFile> {
        let object: Map<String, Value> = serde_json::from_reader(reader)?;
        Ok(serde_json::from_value(Value::Object(object))?)
    }

    /// Serialises the config with four-space indentation.
    fn to_pretty_json(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        let mut serializer =
            Serializer::with_formatter(&mut bytes, PrettyFormatter::with_indent(b"    "));

        self.serialize(&mut serializer)?;
        Ok(bytes)
    }
}

/// What happened when the config file was loaded.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum LoadOutcome {
    /// The file existed and its interval is now in use.
    Loaded(IntervalHours),

    /// There was no file, so one was written with the current value.
    CreatedDefault,

    /// There was no file and writing one failed. The current value is kept.
    NotCreated,

    /// The file couldn't be read or parsed. The current value is kept.
    Invalid,
}

/// Holds the interval that every new breeding cooldown is based on.
#[derive(Debug, Default)]
pub struct MatingConfig {
    interval: RwLock<IntervalHours>,
}

impl MatingConfig {
    pub fn new(interval: IntervalHours) -> MatingConfig {
        MatingConfig {
            interval: RwLock::new(interval),
        }
    }

    /// Returns the interval currently in use.
    pub fn get(&self) -> IntervalHours {
        *self.interval.read()
    }

    /// Replaces the interval if `hours` is valid. Cooldowns that have already been written to
    /// creatures keep their old expiry.
    pub fn set(&self, hours: f32) -> Result<IntervalHours, SettingsError> {
        let interval = IntervalHours::new(hours)?;
        *self.interval.write() = interval;

        Ok(interval)
    }

    /// Looks for a config file at `path` and reads it.
    fn load_from_file(path: &Path) -> Result<Option<ConfigFile>> {
        if !path.exists() {
            // Not an error. The caller writes a fresh file.
            return Ok(None);
        }

        let reader = BufReader::new(File::open(path)?);
        Ok(Some(ConfigFile::parse_json(reader)?))
    }

    /// Writes a config file containing `interval`.
    fn write_default(path: &Path, interval: IntervalHours) -> Result<()> {
        std::fs::write(path, ConfigFile { interval }.to_pretty_json()?)?;
        Ok(())
    }

    /// Loads the interval from `path`. If there is no file, the current value is written there
    /// instead. Any problem reading the file leaves the current value in place.
    pub fn load(&self, path: &Path) -> LoadOutcome {
        match MatingConfig::load_from_file(path) {
            Ok(Some(file)) => {
                *self.interval.write() = file.interval;
                log::info!("Loaded config - Interval: {} hours", file.interval);

                LoadOutcome::Loaded(file.interval)
            }

            Ok(None) => match MatingConfig::write_default(path, self.get()) {
                Ok(()) => {
                    log::info!("Created default config at {}", path.display());
                    LoadOutcome::CreatedDefault
                }

                Err(err) => {
                    log::debug!("Couldn't write default config: {err:?}");
                    LoadOutcome::NotCreated
                }
            },

            Err(err) => {
                log::error!("Failed to load config: {err:?}");
                LoadOutcome::Invalid
            }
        }
    }
}
