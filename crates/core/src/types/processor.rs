use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct ProcessorDescriptor {
    pub name: String,
    pub version: String,
}

impl ProcessorDescriptor {
    pub fn parsed_version(&self) -> Result<ProcessorVersion, VersionParseError> {
        self.version.parse()
    }
}

impl fmt::Display for ProcessorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.version)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum VersionParseError {
    #[error("empty version string")]
    Empty,

    #[error("invalid version component '{component}' in '{version}'")]
    InvalidComponent { version: String, component: String },
}

/// Dotted numeric version (`1.2`, `1.2.3.4`). Components compare
/// numerically left to right; a version that is a strict prefix of another
/// sorts before it.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessorVersion(Vec<u64>);

impl ProcessorVersion {
    pub fn components(&self) -> &[u64] {
        &self.0
    }
}

impl FromStr for ProcessorVersion {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(VersionParseError::Empty);
        }

        s.split('.')
            .map(|part| {
                part.parse::<u64>()
                    .map_err(|_| VersionParseError::InvalidComponent {
                        version: s.to_string(),
                        component: part.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(ProcessorVersion)
    }
}

impl fmt::Display for ProcessorVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(u64::to_string).collect();
        f.write_str(&parts.join("."))
    }
}
