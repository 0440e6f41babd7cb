use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::anyhow;
use rand::seq::SliceRandom;
use sprout_audio::PlaybackSink;
use sprout_domain::{BucketKind, Clip};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::store::ClipStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pacing {
    /// Headline stays hidden this long before the next clip is announced.
    pub blank_period: Duration,
    /// Silence after a clip ends.
    pub gap: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            blank_period: Duration::from_millis(200),
            gap: Duration::from_millis(1000),
        }
    }
}

/// What the play screen shows.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlayerDisplay {
    pub mode: Option<BucketKind>,
    pub headline: String,
    pub visible: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Running(BucketKind),
}

/// Identity of one loop instance, captured when it is spawned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Ticket {
    generation: u64,
    mode: BucketKind,
}

#[derive(Debug, Default)]
struct Fence {
    generation: u64,
    active: Option<BucketKind>,
}

impl Fence {
    fn admits(&self, ticket: Ticket) -> bool {
        self.generation == ticket.generation && self.active == Some(ticket.mode)
    }

    fn issue(&mut self, mode: BucketKind) -> Ticket {
        self.generation += 1;
        self.active = Some(mode);
        Ticket {
            generation: self.generation,
            mode,
        }
    }

    fn revoke(&mut self) -> Option<BucketKind> {
        self.generation += 1;
        self.active.take()
    }
}

struct Shared {
    store: ClipStore,
    sink: Arc<dyn PlaybackSink>,
    pacing: Pacing,
    fence: Mutex<Fence>,
    display: watch::Sender<PlayerDisplay>,
}

impl Shared {
    /// Runs `f` only if `ticket` is still current. The fence stays locked for
    /// the duration, so a start or stop cannot slip in between the check and
    /// whatever `f` emits. `f` must not block.
    fn guarded<R>(&self, ticket: Ticket, f: impl FnOnce(&mut Fence) -> R) -> Option<R> {
        let mut fence = self.fence.lock().unwrap_or_else(PoisonError::into_inner);
        if fence.admits(ticket) {
            Some(f(&mut *fence))
        } else {
            None
        }
    }

    fn release(&self, fence: &mut Fence) {
        fence.revoke();
        self.display.send_modify(|display| display.mode = None);
    }
}

/// Runs the endless pick/announce/play/pause loop over one bucket.
///
/// Cancellation is cooperative. `stop` and `start` only advance the fence
/// generation; a loop notices at its next checkpoint (loop entry, after the
/// blank period, after playback completes) and exits. A clip that is already
/// playing is never cut short.
pub struct PlaybackController {
    shared: Arc<Shared>,
    runtime: Handle,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl PlaybackController {
    pub fn new(
        store: ClipStore,
        sink: Arc<dyn PlaybackSink>,
        pacing: Pacing,
        runtime: Handle,
    ) -> Self {
        let (display, _) = watch::channel(PlayerDisplay::default());
        Self {
            shared: Arc::new(Shared {
                store,
                sink,
                pacing,
                fence: Mutex::new(Fence::default()),
                display,
            }),
            runtime,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Returns `false`, changing nothing, when `mode`'s bucket is empty.
    /// Any running loop is superseded.
    pub fn start(&self, mode: BucketKind) -> bool {
        if self.shared.store.is_empty(mode) {
            debug!(%mode, "ignoring start on empty bucket");
            return false;
        }
        let ticket = {
            let mut fence = self.shared.fence.lock().unwrap_or_else(PoisonError::into_inner);
            let ticket = fence.issue(mode);
            self.shared
                .display
                .send_modify(|display| display.mode = Some(mode));
            ticket
        };
        info!(%mode, generation = ticket.generation, "starting playback loop");

        let task = self.runtime.spawn(run_loop(self.shared.clone(), ticket));
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.retain(|task| !task.is_finished());
        tasks.push(task);
        true
    }

    pub fn stop(&self) {
        let stopped = {
            let mut fence = self.shared.fence.lock().unwrap_or_else(PoisonError::into_inner);
            let stopped = fence.revoke();
            self.shared.display.send_modify(|display| display.mode = None);
            stopped
        };
        if let Some(mode) = stopped {
            info!(%mode, "playback stop requested");
        }
    }

    pub fn state(&self) -> PlayerState {
        let fence = self.shared.fence.lock().unwrap_or_else(PoisonError::into_inner);
        match fence.active {
            Some(mode) => PlayerState::Running(mode),
            None => PlayerState::Idle,
        }
    }

    pub fn set_headline(&self, headline: impl Into<String>, visible: bool) {
        let headline = headline.into();
        self.shared.display.send_modify(|display| {
            display.headline = headline;
            display.visible = visible;
        });
    }

    pub fn display(&self) -> PlayerDisplay {
        self.shared.display.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlayerDisplay> {
        self.shared.display.subscribe()
    }

    /// Waits for every spawned loop to exit. A loop blocked on a clip that
    /// never completes keeps this pending.
    pub async fn join(&self) {
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        for task in tasks {
            if let Err(err) = task.await {
                error!(?err, "playback loop panicked");
            }
        }
    }
}

fn pick(clips: &[Clip]) -> Option<Clip> {
    clips.choose(&mut rand::thread_rng()).cloned()
}

async fn run_loop(shared: Arc<Shared>, ticket: Ticket) {
    let mode = ticket.mode;
    loop {
        let Some(snapshot) = shared.guarded(ticket, |_| shared.store.snapshot(mode)) else {
            break;
        };
        let Some(clip) = pick(&snapshot) else {
            info!(%mode, "bucket is empty, stopping playback");
            shared.guarded(ticket, |fence| shared.release(fence));
            break;
        };
        debug!(%mode, name = clip.name(), "picked clip");

        let cleared = shared.guarded(ticket, |_| {
            shared.display.send_modify(|display| display.visible = false);
        });
        if cleared.is_none() {
            break;
        }
        // Decoding and opening the device happen off the fence, during the
        // blank period.
        let prepare = {
            let sink = shared.sink.clone();
            let audio = clip.audio().clone();
            tokio::task::spawn_blocking(move || sink.prepare(audio))
        };
        let (_, prepared) = tokio::join!(tokio::time::sleep(shared.pacing.blank_period), prepare);
        let prepared = prepared
            .unwrap_or_else(|err| Err(anyhow!("clip preparation panicked: {err}")));

        let started = shared.guarded(ticket, |_| {
            let prepared = prepared?;
            shared.display.send_modify(|display| {
                display.headline = format!("\"{}\"", clip.name());
                display.visible = true;
            });
            prepared.start()
        });
        let completion = match started {
            None => break,
            Some(Ok(completion)) => completion,
            Some(Err(err)) => {
                error!(%mode, name = clip.name(), ?err, "playback failed");
                shared.guarded(ticket, |fence| {
                    shared.release(fence);
                    shared.display.send_modify(|display| {
                        display.headline = format!("Playback failed: {err:#}");
                        display.visible = true;
                    });
                });
                break;
            }
        };
        completion.finished().await;

        if shared.guarded(ticket, |_| ()).is_none() {
            break;
        }
        tokio::time::sleep(shared.pacing.gap).await;
    }
    debug!(%mode, generation = ticket.generation, "playback loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprout_audio::{CompletionSignal, PlaybackCompletion, PreparedClip};

    #[derive(Default)]
    struct ScriptedSink {
        hold: bool,
        fail: bool,
        prepare_delay: Option<Duration>,
        played: Arc<Mutex<Vec<String>>>,
        pending: Arc<Mutex<Vec<CompletionSignal>>>,
    }

    impl ScriptedSink {
        fn holding() -> Self {
            Self {
                hold: true,
                ..Default::default()
            }
        }

        fn played(&self) -> Vec<String> {
            self.played.lock().unwrap().clone()
        }

        /// Completes the clip that started first.
        fn finish_current(&self) {
            let mut pending = self.pending.lock().unwrap();
            if !pending.is_empty() {
                pending.remove(0).complete();
            }
        }
    }

    impl PlaybackSink for ScriptedSink {
        fn prepare(&self, audio: Arc<[u8]>) -> anyhow::Result<Box<dyn PreparedClip>> {
            if self.fail {
                anyhow::bail!("device unplugged");
            }
            if let Some(delay) = self.prepare_delay {
                std::thread::sleep(delay);
            }
            Ok(Box::new(ScriptedClip {
                name: String::from_utf8_lossy(&audio).into_owned(),
                hold: self.hold,
                played: self.played.clone(),
                pending: self.pending.clone(),
            }))
        }
    }

    struct ScriptedClip {
        name: String,
        hold: bool,
        played: Arc<Mutex<Vec<String>>>,
        pending: Arc<Mutex<Vec<CompletionSignal>>>,
    }

    impl PreparedClip for ScriptedClip {
        fn start(self: Box<Self>) -> anyhow::Result<PlaybackCompletion> {
            self.played.lock().unwrap().push(self.name);
            if self.hold {
                let (signal, completion) = PlaybackCompletion::pair();
                self.pending.lock().unwrap().push(signal);
                Ok(completion)
            } else {
                Ok(PlaybackCompletion::ready())
            }
        }
    }

    fn clip(name: &str) -> Clip {
        Clip::new(name, name.as_bytes().to_vec())
    }

    fn store(good: &[&str], bad: &[&str]) -> ClipStore {
        let store = ClipStore::new();
        store.replace_all(
            good.iter().map(|name| clip(name)).collect(),
            bad.iter().map(|name| clip(name)).collect(),
        );
        store
    }

    fn controller(store: &ClipStore, sink: &Arc<ScriptedSink>) -> PlaybackController {
        PlaybackController::new(
            store.clone(),
            sink.clone(),
            Pacing::default(),
            Handle::current(),
        )
    }

    async fn advance(millis: u64) {
        tokio::time::sleep(Duration::from_millis(millis)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn plays_only_the_selected_bucket() {
        let store = store(&["chirp", "tweet"], &[]);
        let sink = Arc::new(ScriptedSink::default());
        let player = controller(&store, &sink);

        assert!(!player.start(BucketKind::Bad));
        assert_eq!(player.state(), PlayerState::Idle);
        advance(2_000).await;
        assert!(sink.played().is_empty());

        assert!(player.start(BucketKind::Good));
        assert_eq!(player.state(), PlayerState::Running(BucketKind::Good));
        advance(5_000).await;
        let played = sink.played();
        assert!(played.len() >= 4, "played {played:?}");
        assert!(played.iter().all(|name| name == "chirp" || name == "tweet"));
        assert_eq!(player.display().mode, Some(BucketKind::Good));
        player.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn announces_before_playing_and_paces_clips() {
        let store = store(&["chirp"], &[]);
        let sink = Arc::new(ScriptedSink::default());
        let player = controller(&store, &sink);

        player.start(BucketKind::Good);
        advance(100).await;
        assert!(!player.display().visible);
        assert!(sink.played().is_empty());

        advance(200).await;
        let display = player.display();
        assert!(display.visible);
        assert_eq!(display.headline, "\"chirp\"");
        assert_eq!(sink.played().len(), 1);

        // Next clip lands after the gap plus another blank period.
        advance(1_000).await;
        assert_eq!(sink.played().len(), 1);
        advance(200).await;
        assert_eq!(sink.played().len(), 2);
        player.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn switching_modes_fences_the_old_loop() {
        let store = store(&["chirp"], &["growl"]);
        let sink = Arc::new(ScriptedSink::default());
        let player = controller(&store, &sink);

        player.start(BucketKind::Good);
        advance(300).await;
        assert_eq!(sink.played(), vec!["chirp"]);

        // The good loop is sitting in its gap when the switch lands.
        assert!(player.start(BucketKind::Bad));
        advance(5_000).await;
        let played = sink.played();
        assert!(played.len() > 1);
        assert!(played[1..].iter().all(|name| name == "growl"), "played {played:?}");
        assert_eq!(player.display().mode, Some(BucketKind::Bad));
        assert_eq!(player.display().headline, "\"growl\"");
        player.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn switch_during_blank_period_suppresses_pending_clip() {
        let store = store(&["chirp"], &["growl"]);
        let sink = Arc::new(ScriptedSink::default());
        let player = controller(&store, &sink);

        player.start(BucketKind::Good);
        advance(100).await;
        player.start(BucketKind::Bad);
        advance(3_000).await;
        let played = sink.played();
        assert!(!played.is_empty());
        assert!(played.iter().all(|name| name == "growl"), "played {played:?}");
        player.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn restarting_the_same_mode_keeps_one_loop() {
        let store = store(&["chirp"], &[]);
        let sink = Arc::new(ScriptedSink::default());
        let player = controller(&store, &sink);

        player.start(BucketKind::Good);
        advance(100).await;
        player.start(BucketKind::Good);
        advance(1_150).await;
        assert_eq!(sink.played().len(), 1);
        player.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_drains_the_current_clip() {
        let store = store(&["chirp"], &[]);
        let sink = Arc::new(ScriptedSink::holding());
        let player = controller(&store, &sink);

        player.start(BucketKind::Good);
        advance(300).await;
        assert_eq!(sink.played().len(), 1);

        player.stop();
        assert_eq!(player.state(), PlayerState::Idle);
        let stopped = player.display();
        assert_eq!(stopped.mode, None);
        // The in-flight clip is left to finish on its own.
        assert_eq!(sink.pending.lock().unwrap().len(), 1);

        sink.finish_current();
        player.join().await;
        advance(5_000).await;
        assert_eq!(sink.played().len(), 1);
        assert_eq!(player.display(), stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn switch_while_a_clip_plays_ends_the_old_loop_after_it() {
        let store = store(&["chirp"], &["growl"]);
        let sink = Arc::new(ScriptedSink::holding());
        let player = controller(&store, &sink);

        player.start(BucketKind::Good);
        advance(300).await;
        assert_eq!(sink.played(), vec!["chirp"]);

        // The good loop is waiting on its clip when the switch lands.
        player.start(BucketKind::Bad);
        advance(300).await;
        assert_eq!(sink.played(), vec!["chirp", "growl"]);
        assert_eq!(player.display().headline, "\"growl\"");

        let mut rx = player.subscribe();
        rx.borrow_and_update();
        sink.finish_current();
        advance(3_000).await;
        assert_eq!(sink.played(), vec!["chirp", "growl"]);
        assert!(!rx.has_changed().unwrap());

        sink.finish_current();
        advance(1_300).await;
        let played = sink.played();
        assert_eq!(played.len(), 3);
        assert!(played[1..].iter().all(|name| name == "growl"), "played {played:?}");
        assert_eq!(player.display().headline, "\"growl\"");
        player.stop();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn slow_prepare_does_not_hold_up_stop() {
        let store = store(&["chirp"], &[]);
        let sink = Arc::new(ScriptedSink {
            prepare_delay: Some(Duration::from_millis(400)),
            ..Default::default()
        });
        let player = PlaybackController::new(
            store.clone(),
            sink.clone(),
            Pacing {
                blank_period: Duration::from_millis(10),
                gap: Duration::from_millis(10),
            },
            Handle::current(),
        );

        player.start(BucketKind::Good);
        tokio::time::sleep(Duration::from_millis(100)).await;
        let begun = std::time::Instant::now();
        player.stop();
        assert_eq!(player.state(), PlayerState::Idle);
        assert!(begun.elapsed() < Duration::from_millis(100), "stop took {:?}", begun.elapsed());

        // The clip prepared for the stopped loop is never started.
        player.join().await;
        assert!(sink.played().is_empty());
        assert!(!player.display().visible);
    }

    #[tokio::test(start_paused = true)]
    async fn emptied_bucket_ends_the_loop() {
        let store = store(&["chirp"], &[]);
        let sink = Arc::new(ScriptedSink::default());
        let player = controller(&store, &sink);

        player.start(BucketKind::Good);
        advance(300).await;
        store.remove_at(BucketKind::Good, 0);
        advance(2_000).await;

        assert_eq!(player.state(), PlayerState::Idle);
        assert_eq!(player.display().mode, None);
        assert_eq!(sink.played().len(), 1);
        player.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn import_mid_loop_applies_to_next_pick() {
        let store = store(&["chirp"], &[]);
        let sink = Arc::new(ScriptedSink::default());
        let player = controller(&store, &sink);

        player.start(BucketKind::Good);
        advance(300).await;
        store.replace_all(vec![clip("rustle")], Vec::new());
        advance(1_500).await;
        assert_eq!(sink.played(), vec!["chirp", "rustle"]);
        player.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn sink_failure_stops_and_reports() {
        let store = store(&["chirp"], &[]);
        let sink = Arc::new(ScriptedSink {
            fail: true,
            ..Default::default()
        });
        let player = controller(&store, &sink);

        assert!(player.start(BucketKind::Good));
        advance(500).await;
        assert_eq!(player.state(), PlayerState::Idle);
        let display = player.display();
        assert!(display.headline.starts_with("Playback failed"));
        assert_eq!(display.mode, None);
        player.join().await;
    }
}
