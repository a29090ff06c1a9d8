//! Naming of injected sidecar containers.
use std::{fmt::Display, str::FromStr};

use snafu::{Snafu, ensure};

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum InvalidPrefixError {
    #[snafu(display("the sidecar name prefix must not be empty"))]
    Empty,

    #[snafu(display(
        "the sidecar name prefix {prefix:?} must only contain lowercase alphanumeric characters or '-'"
    ))]
    InvalidCharacters { prefix: String },

    #[snafu(display("the sidecar name prefix {prefix:?} must start with an alphanumeric character"))]
    InvalidStart { prefix: String },
}

/// The process-wide prefix of every injected container name.
///
/// The effective container name is `<prefix>-<base name>`, which keeps
/// injected containers apart from the application containers and lets a
/// detach find exactly what an attach created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SidecarNamePrefix(String);

impl SidecarNamePrefix {
    pub fn container_name(&self, base_name: &str) -> String {
        format!("{prefix}-{base_name}", prefix = self.0)
    }
}

impl FromStr for SidecarNamePrefix {
    type Err = InvalidPrefixError;

    fn from_str(prefix: &str) -> Result<Self, Self::Err> {
        ensure!(!prefix.is_empty(), EmptySnafu);
        ensure!(
            prefix
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'),
            InvalidCharactersSnafu { prefix }
        );
        ensure!(
            prefix.starts_with(|c: char| c.is_ascii_alphanumeric()),
            InvalidStartSnafu { prefix }
        );

        Ok(Self(prefix.to_owned()))
    }
}

impl Display for SidecarNamePrefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
