/// Recordings quieter than this are left alone rather than blown up to full scale.
const SILENCE_FLOOR: f32 = 1e-4;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PeakLevel {
    pub max: f32,
    pub min: f32,
}

impl PeakLevel {
    pub fn silence() -> Self {
        Self { max: 0.0, min: 0.0 }
    }

    pub fn measure(buffer: &[f32]) -> Self {
        buffer.iter().fold(Self::silence(), |peak, &sample| Self {
            max: peak.max.max(sample),
            min: peak.min.min(sample),
        })
    }

    pub fn magnitude(&self) -> f32 {
        self.max.abs().max(self.min.abs())
    }
}

/// Scales `buffer` so its loudest sample sits at `target` (0.0..=1.0).
/// Returns the level measured before scaling.
pub fn normalize_buffer(buffer: &mut [f32], target: f32) -> PeakLevel {
    let peak = PeakLevel::measure(buffer);
    let magnitude = peak.magnitude();
    if magnitude < SILENCE_FLOOR {
        return peak;
    }
    let gain = target.clamp(0.0, 1.0) / magnitude;
    for sample in buffer.iter_mut() {
        *sample *= gain;
    }
    peak
}
