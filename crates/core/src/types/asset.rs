use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Prefix that marks a command line target as the ID of an asset already
/// held by the store rather than a local file to upload.
pub const REFERENCE_PREFIX: &str = "nb:cid:";

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct AssetId(String);

impl AssetId {
    pub fn new(id: impl Into<String>) -> Self {
        AssetId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for AssetId {
    fn from(id: String) -> Self {
        AssetId(id)
    }
}

impl From<&str> for AssetId {
    fn from(id: &str) -> Self {
        AssetId(id.to_string())
    }
}

/// Reference to a named collection of files owned by the remote store.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct AssetHandle {
    pub id: AssetId,
    pub name: String,
}

/// One member file of an asset.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct AssetFile {
    pub name: String,
    pub size: u64,
    // blake3 digest, hex encoded.
    pub checksum: Option<String>,
    // Transfer location handed out by the store, upload or download
    // depending on which call returned the file.
    pub url: Option<String>,
}

/// Input of a run: either an asset the store already holds or a local file
/// that has to be uploaded first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InputTarget {
    ExistingReference(AssetId),
    LocalPath(PathBuf),
}

impl FromStr for InputTarget {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.starts_with(REFERENCE_PREFIX) {
            Ok(InputTarget::ExistingReference(AssetId::new(s)))
        } else {
            Ok(InputTarget::LocalPath(PathBuf::from(s)))
        }
    }
}

impl fmt::Display for InputTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputTarget::ExistingReference(id) => write!(f, "{id}"),
            InputTarget::LocalPath(path) => write!(f, "{}", path.display()),
        }
    }
}
