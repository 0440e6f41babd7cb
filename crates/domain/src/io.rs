use base64::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{clip::Clip, error::DomainError};

/// On-disk layout of an export: two named arrays of `{ name, audio }`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClipArchive {
    pub good: Vec<ArchivedClip>,
    pub bad: Vec<ArchivedClip>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArchivedClip {
    pub name: String,
    /// `data:<media-type>;base64,<payload>`; bare base64 is accepted on import.
    pub audio: String,
}

impl ArchivedClip {
    pub fn from_clip(clip: &Clip) -> Self {
        Self {
            name: clip.name().to_string(),
            audio: encode_data_uri(clip.audio()),
        }
    }

    pub fn to_clip(&self) -> Result<Clip, DomainError> {
        Ok(Clip::new(self.name.clone(), decode_data_uri(&self.audio)?))
    }
}

impl ClipArchive {
    pub fn from_buckets(good: &[Clip], bad: &[Clip]) -> Self {
        Self {
            good: good.iter().map(ArchivedClip::from_clip).collect(),
            bad: bad.iter().map(ArchivedClip::from_clip).collect(),
        }
    }

    /// Decodes every clip before returning, so a bad entry anywhere fails the
    /// whole archive.
    pub fn into_buckets(self) -> Result<(Vec<Clip>, Vec<Clip>), DomainError> {
        let good = self
            .good
            .iter()
            .map(ArchivedClip::to_clip)
            .collect::<Result<Vec<_>, _>>()?;
        let bad = self
            .bad
            .iter()
            .map(ArchivedClip::to_clip)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((good, bad))
    }

    pub fn to_json(&self) -> Result<Vec<u8>, DomainError> {
        serde_json::to_vec(self).map_err(|err| DomainError::Serialization(err.to_string()))
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, DomainError> {
        serde_json::from_slice(bytes).map_err(|err| DomainError::Serialization(err.to_string()))
    }
}

pub fn encode_data_uri(bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        sniff_media_type(bytes),
        BASE64_STANDARD.encode(bytes)
    )
}

pub fn decode_data_uri(text: &str) -> Result<Vec<u8>, DomainError> {
    let payload = match text.strip_prefix("data:") {
        Some(rest) => {
            let (header, payload) = rest.split_once(',').ok_or_else(|| {
                DomainError::Encoding("data URI is missing the ',' separator".into())
            })?;
            if !header.ends_with(";base64") {
                return Err(DomainError::Encoding(format!(
                    "unsupported data URI encoding {header:?}"
                )));
            }
            payload
        }
        None => text,
    };
    BASE64_STANDARD
        .decode(payload.trim())
        .map_err(|err| DomainError::Encoding(err.to_string()))
}

/// Guess a media type from the container magic bytes.
pub fn sniff_media_type(bytes: &[u8]) -> &'static str {
    match bytes {
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'A', b'V', b'E', ..] => "audio/wav",
        [b'O', b'g', b'g', b'S', ..] => "audio/ogg",
        [0x1A, 0x45, 0xDF, 0xA3, ..] => "audio/webm",
        [b'f', b'L', b'a', b'C', ..] => "audio/flac",
        [b'I', b'D', b'3', ..] => "audio/mpeg",
        [0xFF, second, ..] if second & 0xE0 == 0xE0 => "audio/mpeg",
        _ => "application/octet-stream",
    }
}
