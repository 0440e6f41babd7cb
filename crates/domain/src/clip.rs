use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::DomainError;

pub const DEFAULT_CLIP_NAME: &str = "Untitled";

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BucketKind {
    Good,
    Bad,
}

impl BucketKind {
    pub const ALL: [BucketKind; 2] = [BucketKind::Good, BucketKind::Bad];

    pub fn as_str(self) -> &'static str {
        match self {
            BucketKind::Good => "good",
            BucketKind::Bad => "bad",
        }
    }
}

impl fmt::Display for BucketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BucketKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "good" => Ok(BucketKind::Good),
            "bad" => Ok(BucketKind::Bad),
            other => Err(DomainError::validation(format!(
                "unknown bucket {other:?}, expected good or bad"
            ))),
        }
    }
}

/// A named audio recording. The payload is shared, never mutated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Clip {
    name: String,
    audio: Arc<[u8]>,
}

impl Clip {
    pub fn new(name: impl Into<String>, audio: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            audio: audio.into(),
        }
    }

    /// Blank or missing names fall back to `default_name`.
    pub fn named_or(name: Option<&str>, default_name: &str, audio: impl Into<Arc<[u8]>>) -> Self {
        let name = name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(default_name);
        Self::new(name, audio)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn audio(&self) -> &Arc<[u8]> {
        &self.audio
    }
}
