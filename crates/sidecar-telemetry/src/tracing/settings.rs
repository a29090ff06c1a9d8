//! What each subscriber writes, where it writes to and at which level.
use std::path::PathBuf;

use tracing::level_filters::LevelFilter;
pub use tracing_appender::rolling::Rotation;

/// The level filter of a subscriber.
///
/// `default_level` applies unless `environment_variable` holds an
/// [`EnvFilter`][tracing_subscriber::EnvFilter] directive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LevelSettings {
    pub environment_variable: &'static str,
    pub default_level: LevelFilter,
}

impl LevelSettings {
    pub fn new(environment_variable: &'static str, default_level: LevelFilter) -> Self {
        Self {
            environment_variable,
            default_level,
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub enum ConsoleLogSettings {
    #[default]
    Disabled,
    Enabled { level: LevelSettings, format: Format },
}

impl ConsoleLogSettings {
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled { .. })
    }
}

/// Output format of the console subscriber.
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Format {
    /// Human readable lines, colored unless `NO_COLOR` is set.
    #[default]
    Plain,

    /// One JSON object per event.
    Json,
}

/// The rolling file subscriber always writes JSON.
#[derive(Debug, Default, PartialEq, Eq)]
pub enum FileLogSettings {
    #[default]
    Disabled,
    Enabled {
        level: LevelSettings,
        directory: PathBuf,
        rotation: Rotation,
        filename_suffix: String,

        /// Older files are deleted once this many exist. Keeps all files if
        /// unset.
        max_files: Option<usize>,
    },
}

impl FileLogSettings {
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled { .. })
    }
}
