//! Console and rolling file subscribers for the [`tracing`] crate.
//!
//! Most binaries only need [`Tracing::pre_configured`] with the
//! [`TelemetryOptions`] parsed from the command line:
//!
//! ```
//! use sidecar_telemetry::tracing::{Error, TelemetryOptions, Tracing};
//!
//! fn main() -> Result<(), Error> {
//!     let _tracing_guard = Tracing::pre_configured("injector", TelemetryOptions::default()).init()?;
//!
//!     tracing::info!("log a message");
//!     Ok(())
//! }
//! ```
//!
//! The guard returned by [`Tracing::init`] owns the background writer of the
//! file subscriber. Keep it alive until the end of `main`, do not bind it to
//! `_`, which drops it immediately.
use std::path::PathBuf;

use snafu::{ResultExt as _, Snafu};
use tracing::{level_filters::LevelFilter, subscriber::SetGlobalDefaultError};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{InitError, RollingFileAppender},
};
use tracing_subscriber::{EnvFilter, Layer, Registry, layer::SubscriberExt};

pub use self::settings::{ConsoleLogSettings, FileLogSettings, Format, LevelSettings, Rotation};

pub mod settings;

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to initialize rolling file appender"))]
    InitRollingFileAppender { source: InitError },

    #[snafu(display("unable to set the global default subscriber"))]
    SetGlobalDefaultSubscriber { source: SetGlobalDefaultError },
}

/// The subscribers of a process, and after [`Tracing::init`] the guard that
/// keeps the file writer running.
///
/// Levels are read from [`Tracing::CONSOLE_LOG_LEVEL`] and
/// [`Tracing::FILE_LOG_LEVEL`], which accept the same directives as
/// `RUST_LOG`.
pub struct Tracing {
    service_name: &'static str,
    console_log_settings: ConsoleLogSettings,
    file_log_settings: FileLogSettings,

    file_log_guard: Option<WorkerGuard>,
}

impl Tracing {
    pub const CONSOLE_LOG_LEVEL: &str = "CONSOLE_LOG_LEVEL";
    pub const FILE_LOG_LEVEL: &str = "FILE_LOG_LEVEL";

    /// Appended to the service name to form the names of the log files.
    pub const FILE_LOG_SUFFIX: &str = "tracing-rs.json";

    /// Creates an instance without any subscriber. The service name is used
    /// as the prefix of log files.
    pub fn new(service_name: &'static str) -> Self {
        Self {
            service_name,
            console_log_settings: ConsoleLogSettings::Disabled,
            file_log_settings: FileLogSettings::Disabled,
            file_log_guard: None,
        }
    }

    /// Configures console and file output from `options`.
    ///
    /// Both subscribers default to INFO. Console output is on unless
    /// disabled, file output is on when a directory is given. Files are never
    /// rotated unless a rotation period is given.
    pub fn pre_configured(service_name: &'static str, options: TelemetryOptions) -> Self {
        let TelemetryOptions {
            console_log_disabled,
            console_log_format,
            file_log_directory,
            file_log_rotation_period,
            file_log_max_files,
        } = options;

        let mut tracing = Self::new(service_name);

        if !console_log_disabled {
            tracing = tracing.with_console_output(ConsoleLogSettings::Enabled {
                level: LevelSettings::new(Self::CONSOLE_LOG_LEVEL, LevelFilter::INFO),
                format: console_log_format,
            });
        }

        if let Some(directory) = file_log_directory {
            tracing = tracing.with_file_output(FileLogSettings::Enabled {
                level: LevelSettings::new(Self::FILE_LOG_LEVEL, LevelFilter::INFO),
                directory,
                rotation: file_log_rotation_period.unwrap_or_default().into(),
                filename_suffix: Self::FILE_LOG_SUFFIX.to_owned(),
                max_files: file_log_max_files,
            });
        }

        tracing
    }

    pub fn with_console_output(mut self, console_log_settings: ConsoleLogSettings) -> Self {
        self.console_log_settings = console_log_settings;
        self
    }

    pub fn with_file_output(mut self, file_log_settings: FileLogSettings) -> Self {
        self.file_log_settings = file_log_settings;
        self
    }

    /// Installs the configured subscribers as the global default and returns
    /// the guard. Does nothing if no subscriber is enabled.
    pub fn init(mut self) -> Result<Tracing> {
        let mut layers: Vec<Box<dyn Layer<Registry> + Sync + Send>> = Vec::new();

        if let ConsoleLogSettings::Enabled { level, format } = &self.console_log_settings {
            let filter = env_filter(level);
            let layer = match format {
                Format::Plain => tracing_subscriber::fmt::layer().with_filter(filter).boxed(),
                Format::Json => tracing_subscriber::fmt::layer()
                    .json()
                    .with_filter(filter)
                    .boxed(),
            };
            layers.push(layer);
        }

        if let FileLogSettings::Enabled {
            level,
            directory,
            rotation,
            filename_suffix,
            max_files,
        } = &self.file_log_settings
        {
            let mut file_appender = RollingFileAppender::builder()
                .rotation(rotation.clone())
                .filename_prefix(self.service_name)
                .filename_suffix(filename_suffix);
            if let Some(max_files) = max_files {
                file_appender = file_appender.max_log_files(*max_files);
            }
            let file_appender = file_appender
                .build(directory)
                .context(InitRollingFileAppenderSnafu)?;

            let (file_writer, file_log_guard) = tracing_appender::non_blocking(file_appender);
            self.file_log_guard = Some(file_log_guard);

            layers.push(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(file_writer)
                    .with_filter(env_filter(level))
                    .boxed(),
            );
        }

        if !layers.is_empty() {
            tracing::subscriber::set_global_default(tracing_subscriber::registry().with(layers))
                .context(SetGlobalDefaultSubscriberSnafu)?;
        }

        // Dropping self here would stop the file writer
        Ok(self)
    }
}

fn env_filter(level: &LevelSettings) -> EnvFilter {
    EnvFilter::builder()
        .with_env_var(level.environment_variable)
        .with_default_directive(level.default_level.into())
        .from_env_lossy()
}

/// Options accepted by [`Tracing::pre_configured`].
///
/// With the `clap` feature these can be flattened into the command line
/// arguments of a binary.
#[cfg_attr(feature = "clap", derive(clap::Args, PartialEq, Eq))]
#[cfg_attr(feature = "clap", command(next_help_heading = "Telemetry Options"))]
#[derive(Debug, Default)]
pub struct TelemetryOptions {
    /// Disable console logs.
    #[cfg_attr(feature = "clap", arg(long, env))]
    pub console_log_disabled: bool,

    /// Output FORMAT of the console logs.
    #[cfg_attr(
        feature = "clap",
        arg(long, env, value_name = "FORMAT", default_value_t = Format::Plain)
    )]
    pub console_log_format: Format,

    /// Enable logging to files located in the specified DIRECTORY.
    #[cfg_attr(
        feature = "clap",
        arg(long, env, value_name = "DIRECTORY", group = "file_log")
    )]
    pub file_log_directory: Option<PathBuf>,

    /// Time PERIOD after which log files are rolled over.
    #[cfg_attr(
        feature = "clap",
        arg(long, env, value_name = "PERIOD", requires = "file_log")
    )]
    pub file_log_rotation_period: Option<RotationPeriod>,

    /// Maximum number of log files to keep.
    #[cfg_attr(
        feature = "clap",
        arg(long, env, value_name = "COUNT", requires = "file_log")
    )]
    pub file_log_max_files: Option<usize>,
}

#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "PascalCase")]
pub enum RotationPeriod {
    Minutely,
    Hourly,
    Daily,

    #[default]
    Never,
}

impl From<RotationPeriod> for Rotation {
    fn from(value: RotationPeriod) -> Self {
        match value {
            RotationPeriod::Minutely => Self::MINUTELY,
            RotationPeriod::Hourly => Self::HOURLY,
            RotationPeriod::Daily => Self::DAILY,
            RotationPeriod::Never => Self::NEVER,
        }
    }
}
