pub mod clip;
pub mod error;
pub mod io;
pub mod palette;

pub use crate::clip::{BucketKind, Clip, DEFAULT_CLIP_NAME};
pub use crate::error::DomainError;
pub use crate::io::{ArchivedClip, ClipArchive};
pub use crate::palette::Color;
