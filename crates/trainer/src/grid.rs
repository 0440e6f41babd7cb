use rand::seq::SliceRandom;
use rand::Rng;
use sprout_domain::{Color, DomainError};
use tracing::debug;

/// Colour of every unlock-grid cell, by position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GridAssignment {
    cells: Vec<Color>,
}

impl GridAssignment {
    pub fn get(&self, cell: usize) -> Option<Color> {
        self.cells.get(cell).copied()
    }

    pub fn cells(&self) -> &[Color] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn position_of(&self, color: Color) -> Option<usize> {
        self.cells.iter().position(|&cell| cell == color)
    }
}

/// Stateless; every call draws a fresh assignment.
#[derive(Clone, Copy, Debug, Default)]
pub struct GridRandomizer;

impl GridRandomizer {
    pub fn generate(&self, cell_count: usize, palette: &[Color]) -> Result<GridAssignment, DomainError> {
        self.generate_with(cell_count, palette, &mut rand::thread_rng())
    }

    /// One of each palette colour, the rest drawn uniformly, then shuffled.
    ///
    /// With fewer cells than colours the shuffled pool is truncated, so each
    /// cell gets a distinct colour and some colours are left out.
    pub fn generate_with<R: Rng + ?Sized>(
        &self,
        cell_count: usize,
        palette: &[Color],
        rng: &mut R,
    ) -> Result<GridAssignment, DomainError> {
        if palette.is_empty() {
            return Err(DomainError::validation("grid palette must not be empty"));
        }
        let mut pool = palette.to_vec();
        while pool.len() < cell_count {
            pool.push(palette[rng.gen_range(0..palette.len())]);
        }
        pool.shuffle(rng);
        pool.truncate(cell_count);
        debug!(cells = pool.len(), "grid reshuffled");
        Ok(GridAssignment { cells: pool })
    }
}
