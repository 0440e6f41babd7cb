use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sprout_domain::{Color, DomainError, DEFAULT_CLIP_NAME};

use crate::playback::Pacing;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrainerConfig {
    pub secret_code: Vec<Color>,
    pub grid_cells: usize,
    pub blank_period_ms: u64,
    pub gap_ms: u64,
    pub default_clip_name: String,
    pub export_file_name: String,
    pub output_device: Option<String>,
    pub input_device: Option<String>,
    pub normalize_recordings: bool,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            secret_code: Color::PALETTE.to_vec(),
            grid_cells: 16,
            blank_period_ms: 200,
            gap_ms: 1000,
            default_clip_name: DEFAULT_CLIP_NAME.to_string(),
            export_file_name: "plant_recordings.json".to_string(),
            output_device: None,
            input_device: None,
            normalize_recordings: false,
        }
    }
}

impl TrainerConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("read config {:?}", path))?;
        let config: Self = serde_json::from_str(&data)
            .with_context(|| format!("parse config {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.secret_code.is_empty() {
            return Err(DomainError::validation("secret code must not be empty"));
        }
        if self.grid_cells < Color::PALETTE.len() {
            return Err(DomainError::validation(format!(
                "grid needs at least {} cells to show every colour, got {}",
                Color::PALETTE.len(),
                self.grid_cells
            )));
        }
        if self.gap_ms == 0 {
            return Err(DomainError::validation("inter-clip gap must be positive"));
        }
        Ok(())
    }

    pub fn pacing(&self) -> Pacing {
        Pacing {
            blank_period: Duration::from_millis(self.blank_period_ms),
            gap: Duration::from_millis(self.gap_ms),
        }
    }
}
