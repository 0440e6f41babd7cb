pub mod config;
pub mod error;
pub mod grid;
pub mod playback;
pub mod shell;
pub mod store;
pub mod unlock;

pub use config::TrainerConfig;
pub use error::ShellError;
pub use grid::{GridAssignment, GridRandomizer};
pub use playback::{Pacing, PlaybackController, PlayerDisplay, PlayerState};
pub use shell::{Screen, SessionShell};
pub use store::{ClipStore, Listing, Snapshot};
pub use unlock::{GateEvent, UnlockGate};
