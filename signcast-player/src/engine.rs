//! The playback sync engine.
//!
//! One cooperative loop owns every mutation of playback state: the frame
//! tick fires transitions against the deadline, the one-second tick checks
//! for drift, the ten-second poll reconciles with the server, and server
//! pushes and key presses arrive as events. Position is always derived
//! from `(local clock, origin, cycle durations)`, never from "previous
//! item plus one"; that is what lets every device converge on the same
//! item and forgives missed wakeups.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use signcast_core::origin::unix_now;
use signcast_core::timeline::{CycleTimeline, DEADLINE_SLACK_SECS};

use crate::api::{ApiClient, OrientationSettings, PlaylistFetch, PlaylistItem};
use crate::cache::{CacheManager, WantedFile};
use crate::renderer::{PlayedItem, RendererController};
use crate::splash::SplashScreen;

const FRAME_TICK: Duration = Duration::from_millis(16);
const DRIFT_TICK: Duration = Duration::from_secs(1);
const POLL_TICK: Duration = Duration::from_secs(10);

/// Clock offsets below this are logged and ignored; production fleets run
/// NTP, and correcting with a noisy RTT estimate jitters worse than
/// trusting the OS clock.
const CLOCK_WARN_THRESHOLD_SECS: f64 = 1.0;

/// Resync delay after the surface reports a media load failure. One bad
/// item must not stall the cycle.
const MEDIA_ERROR_RESYNC_DELAY_SECS: f64 = 2.0;

/// External inputs to the run loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    /// Server push: refresh ahead of the poll tick.
    ServerPush,
    /// Operator pressed the resync key.
    ManualResync,
    /// The surface failed to load or play the current item.
    MediaError,
    Quit,
}

/// Why the run loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineExit {
    Quit,
    /// The access code stopped resolving after working before: it was
    /// rotated; the player must re-enrol.
    ReEnrolRequired,
    /// Device marked inactive on the server.
    DeviceInactive,
}

/// Everything playback needs from one successful playlist fetch.
struct PlaybackSnapshot {
    items: Vec<PlaylistItem>,
    played: Vec<PlayedItem>,
    timeline: CycleTimeline,
    origin: f64,
    transition: signcast_core::models::Transition,
    orientation: OrientationSettings,
}

impl PlaybackSnapshot {
    /// Playlist identity: the multiset of `(id, effective_duration)`.
    /// Matches what the server hashes, so both sides agree on "changed".
    fn identity(items: &[PlaylistItem]) -> Vec<(i64, u64)> {
        let mut identity: Vec<(i64, u64)> = items
            .iter()
            .map(|i| (i.id, i.effective_duration().to_bits()))
            .collect();
        identity.sort_unstable();
        identity
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReconcileAction {
    NoChange,
    /// Orientation or flips changed: CSS transform, no playback break.
    TransformOnly,
    FullResync,
}

fn classify_fetch(current: Option<&PlaybackSnapshot>, fetch: &PlaylistFetch) -> ReconcileAction {
    let Some(current) = current else {
        return ReconcileAction::FullResync;
    };
    if fetch.sync.start_time != current.origin {
        return ReconcileAction::FullResync;
    }
    if PlaybackSnapshot::identity(&fetch.playlist) != PlaybackSnapshot::identity(&current.items) {
        return ReconcileAction::FullResync;
    }
    if fetch.device != current.orientation {
        return ReconcileAction::TransformOnly;
    }
    ReconcileAction::NoChange
}

pub struct SyncEngine {
    api: ApiClient,
    cache: Arc<CacheManager>,
    renderer: RendererController,
    access_code: String,
    /// `http://127.0.0.1:PORT` when the local media server is up; items
    /// fall back to origin URLs without it.
    media_base: Option<String>,
    splash: Option<SplashScreen>,
    snapshot: Option<PlaybackSnapshot>,
    deadline: Option<f64>,
    /// Set after a media error; when it comes due the engine drops its
    /// snapshot and refetches.
    pending_resync_at: Option<f64>,
    had_success: bool,
}

impl SyncEngine {
    #[must_use]
    pub fn new(
        api: ApiClient,
        cache: Arc<CacheManager>,
        renderer: RendererController,
        access_code: String,
        media_base: Option<String>,
    ) -> Self {
        Self {
            api,
            cache,
            renderer,
            access_code,
            media_base,
            splash: None,
            snapshot: None,
            deadline: None,
            pending_resync_at: None,
            had_success: false,
        }
    }

    /// Run until quit, re-enrolment, or deactivation. The caller owns the
    /// event sender (push channel, key bindings).
    pub async fn run(&mut self, mut events: mpsc::Receiver<EngineEvent>) -> EngineExit {
        self.refresh_splash().await;
        self.check_clock().await;
        if let Some(exit) = self.poll(unix_now()).await {
            self.renderer.stop();
            return exit;
        }

        let mut frame = tokio::time::interval(FRAME_TICK);
        frame.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut drift = tokio::time::interval(DRIFT_TICK);
        drift.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut poll = tokio::time::interval(POLL_TICK);
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let exit = loop {
            tokio::select! {
                _ = frame.tick() => {
                    let now = unix_now();
                    if self.resync_due(now) {
                        if let Some(exit) = self.poll(now).await {
                            break exit;
                        }
                    } else {
                        self.on_frame(now);
                    }
                }
                _ = drift.tick() => self.on_drift(unix_now()),
                _ = poll.tick() => {
                    if let Some(exit) = self.poll(unix_now()).await {
                        break exit;
                    }
                }
                event = events.recv() => match event {
                    Some(EngineEvent::ServerPush) => {
                        debug!("Server push, refreshing early");
                        if let Some(exit) = self.poll(unix_now()).await {
                            break exit;
                        }
                    }
                    Some(EngineEvent::ManualResync) => {
                        info!("Manual resync requested");
                        self.snapshot = None;
                        self.deadline = None;
                        if let Some(exit) = self.poll(unix_now()).await {
                            break exit;
                        }
                    }
                    Some(EngineEvent::MediaError) => self.media_error(unix_now()),
                    Some(EngineEvent::Quit) | None => break EngineExit::Quit,
                },
            }
        };

        // Stop-all: the only valid exit path.
        self.renderer.stop();
        exit
    }

    /// A media load failure forces a resync shortly after, not instantly:
    /// back-to-back errors on one item must not turn into a refetch storm.
    fn media_error(&mut self, now: f64) {
        warn!("Surface reported a media error, scheduling resync");
        self.pending_resync_at = Some(now + MEDIA_ERROR_RESYNC_DELAY_SECS);
    }

    /// Consume a due media-error resync, dropping local playback state so
    /// the next poll rebuilds from scratch.
    fn resync_due(&mut self, now: f64) -> bool {
        if self.pending_resync_at.is_some_and(|t| now >= t) {
            self.pending_resync_at = None;
            self.snapshot = None;
            self.deadline = None;
            return true;
        }
        false
    }

    /// Frame tick: fire the transition once the deadline is due.
    fn on_frame(&mut self, now: f64) {
        let Some(snapshot) = &self.snapshot else {
            return;
        };
        let Some(deadline) = self.deadline else {
            return;
        };
        if deadline - now > DEADLINE_SLACK_SECS {
            return;
        }

        // Recompute from the clock; a missed wakeup lands on the correct
        // item rather than advancing blindly.
        let Some(pos) = snapshot.timeline.position_at(now, snapshot.origin) else {
            return;
        };
        let item = &snapshot.played[pos.index];
        let next = snapshot.played.get((pos.index + 1) % snapshot.played.len());
        self.renderer
            .transition_to(pos.index, item, pos.in_item, next, snapshot.transition);
        self.deadline = snapshot.timeline.next_deadline(now, snapshot.origin);
    }

    /// 1 Hz: verify the shown item and the video offset.
    fn on_drift(&mut self, now: f64) {
        let Some(snapshot) = &self.snapshot else {
            return;
        };
        let Some(pos) = snapshot.timeline.position_at(now, snapshot.origin) else {
            return;
        };

        if self.renderer.shown_index() != Some(pos.index) {
            warn!(
                shown = ?self.renderer.shown_index(),
                expected = pos.index,
                "Wrong item on screen, resyncing"
            );
            let item = &snapshot.played[pos.index];
            let next = snapshot.played.get((pos.index + 1) % snapshot.played.len());
            self.renderer.show_now(pos.index, item, pos.in_item, next);
            self.deadline = snapshot.timeline.next_deadline(now, snapshot.origin);
            return;
        }

        self.renderer.correct_drift(pos.in_item);
    }

    /// Poll tick: fetch and reconcile. Returns an exit reason when the
    /// server tells this player to stop.
    async fn poll(&mut self, now: f64) -> Option<EngineExit> {
        match self.api.playlist(&self.access_code).await {
            Ok(fetch) => {
                self.had_success = true;
                self.apply_fetch(fetch, now).await;
                None
            }
            Err(e) if e.is_forbidden() => {
                warn!("Device deactivated by server");
                Some(EngineExit::DeviceInactive)
            }
            Err(e) if e.is_not_found() && self.had_success => {
                warn!("Access code no longer known, re-enrolment required");
                Some(EngineExit::ReEnrolRequired)
            }
            Err(e) => {
                // Offline or flaky network: cached content keeps playing
                // off the last-known origin and durations.
                warn!("Playlist fetch failed, continuing from cache: {}", e);
                None
            }
        }
    }

    async fn apply_fetch(&mut self, fetch: PlaylistFetch, now: f64) {
        match classify_fetch(self.snapshot.as_ref(), &fetch) {
            ReconcileAction::NoChange => {}
            ReconcileAction::TransformOnly => {
                info!("Orientation changed, applying transform");
                let orientation = fetch.device;
                self.renderer.apply_transform(
                    orientation.orientation,
                    orientation.flip_horizontal,
                    orientation.flip_vertical,
                );
                if let Some(snapshot) = &mut self.snapshot {
                    snapshot.orientation = orientation;
                    snapshot.transition = fetch.transition;
                }
            }
            ReconcileAction::FullResync => self.full_resync(fetch, now).await,
        }
    }

    async fn full_resync(&mut self, fetch: PlaylistFetch, now: f64) {
        info!(
            items = fetch.playlist.len(),
            origin = fetch.sync.start_time,
            cycle = fetch.sync.total_duration,
            "Full resync"
        );

        self.renderer.apply_transform(
            fetch.device.orientation,
            fetch.device.flip_horizontal,
            fetch.device.flip_vertical,
        );

        if fetch.playlist.is_empty() {
            self.snapshot = None;
            self.deadline = None;
            if let Some(splash) = self.splash.clone() {
                self.renderer.show_splash(&splash);
            } else {
                self.renderer.stop();
            }
            self.refresh_splash().await;
            return;
        }

        self.start_background_sync(&fetch.playlist);

        let mut played = Vec::with_capacity(fetch.playlist.len());
        for item in &fetch.playlist {
            played.push(self.resolve_item(item).await);
        }
        let durations: Vec<f64> = fetch
            .playlist
            .iter()
            .map(PlaylistItem::effective_duration)
            .collect();
        let snapshot = PlaybackSnapshot {
            played,
            timeline: CycleTimeline::new(&durations),
            origin: fetch.sync.start_time,
            transition: fetch.transition,
            orientation: fetch.device,
            items: fetch.playlist,
        };

        if let Some(pos) = snapshot.timeline.position_at(now, snapshot.origin) {
            let item = &snapshot.played[pos.index];
            let next = snapshot.played.get((pos.index + 1) % snapshot.played.len());
            self.renderer.show_now(pos.index, item, pos.in_item, next);
            self.deadline = snapshot.timeline.next_deadline(now, snapshot.origin);
        }
        self.snapshot = Some(snapshot);
    }

    /// Local URL when cached, origin URL otherwise.
    async fn resolve_item(&self, item: &PlaylistItem) -> PlayedItem {
        let use_local = self.media_base.is_some()
            && self.cache.is_cached(&item.filename, Some(item.file_size)).await;
        let url = if use_local {
            let base = self.media_base.as_deref().unwrap_or_default();
            format!("{base}/content/{}", item.filename)
        } else {
            self.api.absolute_url(&item.url)
        };
        PlayedItem {
            filename: item.filename.clone(),
            url,
            is_video: item.is_video(),
        }
    }

    /// Kick off the background downloader; the engine never waits on it.
    /// The cache's own mutex keeps concurrent kicks down to one sync.
    fn start_background_sync(&self, playlist: &[PlaylistItem]) {
        let wanted: Vec<WantedFile> = playlist
            .iter()
            .map(|item| WantedFile {
                filename: item.filename.clone(),
                size: Some(item.file_size),
                url: item.url.clone(),
            })
            .collect();
        let cache = Arc::clone(&self.cache);
        let api = self.api.clone();
        tokio::spawn(async move {
            cache.sync_content(&wanted, &api).await;
        });
    }

    /// Fetch default-display settings and sync splash assets.
    async fn refresh_splash(&mut self) {
        match self.api.device_config(&self.access_code).await {
            Ok(config) => {
                let wanted = SplashScreen::wanted_files(&config.default_display);
                let cache = Arc::clone(&self.cache);
                let api = self.api.clone();
                let splash_files: Vec<String> =
                    wanted.iter().map(|w| w.filename.clone()).collect();
                tokio::spawn(async move {
                    cache.sync_splash(&wanted, &api).await;
                });

                let media_base = self.media_base.clone();
                let splash_dir = self.cache.splash_dir().to_path_buf();
                let api_for_urls = self.api.clone();
                self.splash = Some(SplashScreen::from_display(
                    &config.default_display,
                    move |filename, remote| {
                        let cached = splash_files.iter().any(|f| f == filename)
                            && splash_dir.join(filename).exists();
                        match (&media_base, cached) {
                            (Some(base), true) => format!("{base}/splash/{filename}"),
                            _ => api_for_urls.absolute_url(remote),
                        }
                    },
                ));
            }
            Err(e) => debug!("Config fetch failed: {}", e),
        }
    }

    /// NTP-style offset probe, diagnostics only. No compensation.
    async fn check_clock(&self) {
        let t_send = unix_now();
        let Ok(t_srv) = self.api.server_time().await else {
            return;
        };
        let t_recv = unix_now();
        let offset = t_srv - (t_send + t_recv) / 2.0;
        if offset.abs() >= CLOCK_WARN_THRESHOLD_SECS {
            warn!(
                offset_secs = offset,
                "Player clock far from server; check NTP on this device"
            );
        } else {
            debug!(offset_secs = offset, "Clock offset within tolerance");
        }
    }
}
