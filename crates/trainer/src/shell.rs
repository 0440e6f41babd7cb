use std::path::Path;
use std::sync::Arc;

use sprout_audio::{AudioDecoder, CaptureHandle, CaptureSource, PlaybackSink};
use sprout_domain::{BucketKind, Clip, ClipArchive, Color, DomainError};
use tokio::runtime::Handle;
use tracing::{info, instrument, warn};

use crate::config::TrainerConfig;
use crate::error::ShellError;
use crate::grid::{GridAssignment, GridRandomizer};
use crate::playback::PlaybackController;
use crate::store::{ClipStore, Listing};
use crate::unlock::{GateEvent, UnlockGate};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Screen {
    Lock,
    Admin,
    Play,
}

struct PendingRecording {
    bucket: BucketKind,
    name: Option<String>,
    handle: Box<dyn CaptureHandle>,
}

/// Routes user events between the unlock gate, the clip store and the player.
pub struct SessionShell {
    config: TrainerConfig,
    screen: Screen,
    gate: UnlockGate,
    randomizer: GridRandomizer,
    grid: GridAssignment,
    store: ClipStore,
    player: PlaybackController,
    capture: Arc<dyn CaptureSource>,
    recording: Option<PendingRecording>,
}

impl SessionShell {
    pub fn new(
        config: TrainerConfig,
        sink: Arc<dyn PlaybackSink>,
        capture: Arc<dyn CaptureSource>,
        runtime: Handle,
    ) -> Result<Self, ShellError> {
        config.validate()?;
        let gate = UnlockGate::new(config.secret_code.clone())?;
        let randomizer = GridRandomizer;
        let grid = randomizer.generate(config.grid_cells, &Color::PALETTE)?;
        let store = ClipStore::new();
        let player = PlaybackController::new(store.clone(), sink, config.pacing(), runtime);
        Ok(Self {
            config,
            screen: Screen::Lock,
            gate,
            randomizer,
            grid,
            store,
            player,
            capture,
            recording: None,
        })
    }

    pub fn screen(&self) -> Screen {
        self.screen
    }

    pub fn grid(&self) -> &GridAssignment {
        &self.grid
    }

    pub fn store(&self) -> &ClipStore {
        &self.store
    }

    pub fn player(&self) -> &PlaybackController {
        &self.player
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    pub fn tap(&mut self, cell: usize) -> Result<GateEvent, ShellError> {
        if self.screen != Screen::Lock {
            return Err(DomainError::validation("the grid only accepts input while locked").into());
        }
        let color = self.grid.get(cell).ok_or_else(|| {
            DomainError::validation(format!(
                "cell {cell} is outside the {}-cell grid",
                self.grid.len()
            ))
        })?;
        let event = self.gate.submit(color);
        if event == GateEvent::Unlocked {
            self.screen = Screen::Admin;
        }
        Ok(event)
    }

    pub fn begin_recording(
        &mut self,
        bucket: BucketKind,
        name: Option<String>,
    ) -> Result<(), ShellError> {
        self.ensure_unlocked()?;
        if self.recording.is_some() {
            return Err(ShellError::RecordingInProgress);
        }
        let handle = self.capture.begin_capture()?;
        info!(%bucket, "recording started");
        self.recording = Some(PendingRecording {
            bucket,
            name,
            handle,
        });
        Ok(())
    }

    /// Stores the finished recording and returns the bucket's new length.
    pub fn finish_recording(&mut self) -> Result<usize, ShellError> {
        self.ensure_unlocked()?;
        let pending = self.recording.take().ok_or(ShellError::NotRecording)?;
        let audio = pending.handle.stop()?;
        let clip = Clip::named_or(
            pending.name.as_deref(),
            &self.config.default_clip_name,
            audio,
        );
        info!(bucket = %pending.bucket, name = clip.name(), "recording stored");
        Ok(self.store.add(pending.bucket, clip))
    }

    /// Adds an existing audio file as a clip. The file must decode.
    pub fn add_file(
        &mut self,
        bucket: BucketKind,
        path: &Path,
        name: Option<&str>,
    ) -> Result<usize, ShellError> {
        self.ensure_unlocked()?;
        let audio = std::fs::read(path)?;
        AudioDecoder::decode(&audio, path.extension().and_then(|ext| ext.to_str()))?;
        let stem = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(self.config.default_clip_name.as_str());
        let clip = Clip::named_or(name, stem, audio);
        Ok(self.store.add(bucket, clip))
    }

    pub fn listing(&self, bucket: BucketKind) -> Result<Listing, ShellError> {
        self.ensure_unlocked()?;
        Ok(self.store.listing(bucket))
    }

    /// `None` when the listing is stale or the index is out of range.
    pub fn delete(&mut self, listing: &Listing, index: usize) -> Result<Option<Clip>, ShellError> {
        self.ensure_unlocked()?;
        Ok(self.store.remove_listed(listing, index))
    }

    pub fn open_player(&mut self) -> Result<(), ShellError> {
        self.ensure_unlocked()?;
        self.screen = Screen::Play;
        self.player.set_headline("Select mode", true);
        Ok(())
    }

    pub fn open_admin(&mut self) -> Result<(), ShellError> {
        self.ensure_unlocked()?;
        self.player.stop();
        self.screen = Screen::Admin;
        Ok(())
    }

    /// `false` when the bucket is empty; nothing changes in that case.
    pub fn select_mode(&mut self, bucket: BucketKind) -> Result<bool, ShellError> {
        self.ensure_unlocked()?;
        Ok(self.player.start(bucket))
    }

    /// Stops playback, reshuffles the grid and relocks. An unfinished
    /// recording is discarded.
    pub fn lock(&mut self) -> Result<(), ShellError> {
        self.player.stop();
        self.player.set_headline("Stopped", false);
        if let Some(pending) = self.recording.take() {
            warn!(bucket = %pending.bucket, "discarding unfinished recording on lock");
            if let Err(err) = pending.handle.stop() {
                warn!(?err, "capture failed while discarding");
            }
        }
        self.grid = self
            .randomizer
            .generate(self.config.grid_cells, &Color::PALETTE)?;
        self.gate.reset();
        self.screen = Screen::Lock;
        info!("session locked");
        Ok(())
    }

    pub fn export_json(&self) -> Result<Vec<u8>, ShellError> {
        self.ensure_unlocked()?;
        let (good, bad) = self.store.snapshot_all();
        Ok(ClipArchive::from_buckets(&good, &bad).to_json()?)
    }

    /// Replaces both buckets, or leaves the store untouched on any error.
    pub fn import_json(&mut self, bytes: &[u8]) -> Result<(usize, usize), ShellError> {
        self.ensure_unlocked()?;
        let (good, bad) = ClipArchive::from_json(bytes)?.into_buckets()?;
        let counts = (good.len(), bad.len());
        self.store.replace_all(good, bad);
        Ok(counts)
    }

    #[instrument(skip(self))]
    pub fn export_to(&self, path: &Path) -> Result<(), ShellError> {
        let bytes = self.export_json()?;
        std::fs::write(path, &bytes)?;
        info!(bytes = bytes.len(), "export written");
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn import_from(&mut self, path: &Path) -> Result<(usize, usize), ShellError> {
        self.ensure_unlocked()?;
        let bytes = std::fs::read(path)?;
        let (good, bad) = self.import_json(&bytes)?;
        info!(good, bad, "import applied");
        Ok((good, bad))
    }

    fn ensure_unlocked(&self) -> Result<(), ShellError> {
        if self.screen == Screen::Lock {
            Err(ShellError::Locked)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::PlayerState;
    use sprout_audio::NullBackend;
    use std::time::Duration;

    fn shell() -> SessionShell {
        SessionShell::new(
            TrainerConfig::default(),
            Arc::new(NullBackend::default()),
            Arc::new(NullBackend::default()),
            Handle::current(),
        )
        .unwrap()
    }

    fn unlock(shell: &mut SessionShell) {
        for color in shell.config().secret_code.clone() {
            let cell = shell.grid().position_of(color).unwrap();
            shell.tap(cell).unwrap();
        }
        assert_eq!(shell.screen(), Screen::Admin);
    }

    fn record(shell: &mut SessionShell, bucket: BucketKind, name: Option<&str>) {
        shell.begin_recording(bucket, name.map(str::to_string)).unwrap();
        shell.finish_recording().unwrap();
    }

    #[tokio::test]
    async fn locked_session_rejects_admin_actions() {
        let mut shell = shell();
        assert_eq!(shell.screen(), Screen::Lock);
        assert_eq!(shell.grid().len(), 16);
        assert!(matches!(
            shell.begin_recording(BucketKind::Good, None),
            Err(ShellError::Locked)
        ));
        assert!(matches!(shell.listing(BucketKind::Good), Err(ShellError::Locked)));
        assert!(matches!(shell.select_mode(BucketKind::Good), Err(ShellError::Locked)));
        assert!(shell.tap(99).is_err());
    }

    #[tokio::test]
    async fn undersized_grid_is_refused() {
        let config = TrainerConfig {
            grid_cells: 3,
            ..TrainerConfig::default()
        };
        let built = SessionShell::new(
            config,
            Arc::new(NullBackend::default()),
            Arc::new(NullBackend::default()),
            Handle::current(),
        );
        assert!(matches!(
            built,
            Err(ShellError::Domain(DomainError::Validation(_)))
        ));
    }

    #[tokio::test]
    async fn wrong_code_keeps_the_session_locked() {
        let mut shell = shell();
        let blue = shell.grid().position_of(Color::Blue).unwrap();
        for _ in 0..3 {
            shell.tap(blue).unwrap();
        }
        assert_eq!(shell.tap(blue).unwrap(), GateEvent::Rejected);
        assert_eq!(shell.screen(), Screen::Lock);
        unlock(&mut shell);
    }

    #[tokio::test]
    async fn recordings_land_in_their_bucket() {
        let mut shell = shell();
        unlock(&mut shell);
        record(&mut shell, BucketKind::Good, None);
        record(&mut shell, BucketKind::Bad, Some("hiss"));

        assert_eq!(shell.listing(BucketKind::Good).unwrap().names, vec!["Untitled"]);
        assert_eq!(shell.listing(BucketKind::Bad).unwrap().names, vec!["hiss"]);
        let audio = shell.store().snapshot(BucketKind::Good)[0].audio().clone();
        assert_eq!(&audio[..4], b"RIFF");
    }

    #[tokio::test]
    async fn added_files_keep_their_bytes() {
        let mut shell = shell();
        unlock(&mut shell);
        let dir = tempfile::tempdir().unwrap();

        let wav = dir.path().join("rustle.wav");
        let bytes = sprout_audio::encode_wav(&[0.0, 0.25, -0.25], &Default::default()).unwrap();
        std::fs::write(&wav, &bytes).unwrap();
        assert_eq!(shell.add_file(BucketKind::Good, &wav, None).unwrap(), 1);
        let stored = shell.store().snapshot(BucketKind::Good);
        assert_eq!(stored[0].name(), "rustle");
        assert_eq!(&stored[0].audio()[..], &bytes[..]);

        let junk = dir.path().join("junk.wav");
        std::fs::write(&junk, b"not audio at all").unwrap();
        assert!(matches!(
            shell.add_file(BucketKind::Bad, &junk, Some("junk")),
            Err(ShellError::Audio(_))
        ));
        assert!(shell.store().is_empty(BucketKind::Bad));
    }

    #[tokio::test]
    async fn recording_state_is_tracked() {
        let mut shell = shell();
        unlock(&mut shell);
        assert!(matches!(shell.finish_recording(), Err(ShellError::NotRecording)));
        shell.begin_recording(BucketKind::Good, None).unwrap();
        assert!(matches!(
            shell.begin_recording(BucketKind::Bad, None),
            Err(ShellError::RecordingInProgress)
        ));
        shell.lock().unwrap();
        assert!(!shell.is_recording());
    }

    #[tokio::test]
    async fn deletes_only_through_fresh_listings() {
        let mut shell = shell();
        unlock(&mut shell);
        record(&mut shell, BucketKind::Good, Some("a"));
        record(&mut shell, BucketKind::Good, Some("b"));

        let listing = shell.listing(BucketKind::Good).unwrap();
        assert_eq!(shell.delete(&listing, 0).unwrap().unwrap().name(), "a");
        assert!(shell.delete(&listing, 0).unwrap().is_none());
        let fresh = shell.listing(BucketKind::Good).unwrap();
        assert_eq!(fresh.names, vec!["b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn lock_stops_playback_and_relocks() {
        let mut shell = shell();
        unlock(&mut shell);
        record(&mut shell, BucketKind::Good, Some("chirp"));

        shell.open_player().unwrap();
        assert_eq!(shell.player().display().headline, "Select mode");
        assert!(!shell.select_mode(BucketKind::Bad).unwrap());
        assert!(shell.select_mode(BucketKind::Good).unwrap());
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(shell.player().display().headline, "\"chirp\"");

        shell.lock().unwrap();
        assert_eq!(shell.screen(), Screen::Lock);
        assert_eq!(shell.player().state(), PlayerState::Idle);
        let display = shell.player().display();
        assert_eq!(display.headline, "Stopped");
        assert!(!display.visible);
        assert_eq!(display.mode, None);

        tokio::time::sleep(Duration::from_millis(3_000)).await;
        assert_eq!(shell.player().display().headline, "Stopped");
        unlock(&mut shell);
    }

    #[tokio::test]
    async fn export_then_import_round_trips() {
        let mut shell = shell();
        unlock(&mut shell);
        record(&mut shell, BucketKind::Good, Some("chirp"));
        record(&mut shell, BucketKind::Good, Some("tweet"));
        record(&mut shell, BucketKind::Bad, Some("growl"));
        let (good, bad) = shell.store().snapshot_all();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plant_recordings.json");
        shell.export_to(&path).unwrap();

        let mut other = self::shell();
        unlock(&mut other);
        assert_eq!(other.import_from(&path).unwrap(), (2, 1));
        let (good_back, bad_back) = other.store().snapshot_all();
        assert_eq!(*good_back, *good);
        assert_eq!(*bad_back, *bad);
    }

    #[tokio::test]
    async fn malformed_import_leaves_store_untouched() {
        let mut shell = shell();
        unlock(&mut shell);
        record(&mut shell, BucketKind::Good, Some("chirp"));

        let broken = br#"{"good":[{"name":"x","audio":"AQID"}],"bad":[{"name":"y","audio":"%%"}]}"#;
        assert!(matches!(
            shell.import_json(broken),
            Err(ShellError::Domain(DomainError::Encoding(_)))
        ));
        assert!(matches!(
            shell.import_json(b"not json"),
            Err(ShellError::Domain(DomainError::Serialization(_)))
        ));
        assert_eq!(shell.listing(BucketKind::Good).unwrap().names, vec!["chirp"]);
    }
}
