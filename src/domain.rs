use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use md5::{Digest, Md5};
use rand::RngCore;
use rand::rngs::OsRng;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CollectorError;

const RANDOM_ID_BYTES: usize = 16;

static CONTENT_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-f]{32}$").expect("content id pattern"));

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Builds an id from a file or directory stem found on disk. Anything present in the
    /// storage tree counts as state, so no format check is applied here.
    pub(crate) fn from_stem(stem: &str) -> Self {
        Self(stem.to_string())
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ContentId {
    type Err = CollectorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        if !CONTENT_ID_RE.is_match(&normalized) {
            return Err(CollectorError::InvalidContentId(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

impl AsRef<str> for ContentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

pub fn derive_id(input: &[u8]) -> ContentId {
    ContentId(hex::encode(Md5::digest(input)))
}

pub fn derive_url_id(url: &str) -> ContentId {
    derive_id(normalize_url(url).as_bytes())
}

pub fn derive_random_id() -> ContentId {
    let mut bytes = [0u8; RANDOM_ID_BYTES];
    OsRng.fill_bytes(&mut bytes);
    derive_id(&bytes)
}

pub fn normalize_url(url: &str) -> &str {
    url.trim().trim_end_matches('/')
}

pub fn join_url(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim(), path.trim())
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CatalogEntry(String);

impl CatalogEntry {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &str {
        &self.0
    }

    pub fn url(&self, base_url: &str) -> String {
        join_url(base_url, &self.0)
    }

    pub fn content_id(&self, base_url: &str) -> ContentId {
        derive_url_id(&self.url(base_url))
    }
}

impl fmt::Display for CatalogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
