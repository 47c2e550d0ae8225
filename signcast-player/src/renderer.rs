//! Dual-layer renderer control.
//!
//! Two overlapping media layers: exactly one is the front layer at any
//! time, while the back layer preloads the upcoming item. The embedded
//! browser that actually paints pixels sits behind the [`MediaSurface`]
//! trait.

use std::sync::Arc;
use std::time::Duration;

use signcast_core::models::{Orientation, Transition};
use tracing::debug;

use crate::splash::SplashScreen;

/// Extra hold after a dissolve completes before the old layer drops and
/// starts preloading the next item.
const LAYER_RELEASE_DELAY: Duration = Duration::from_millis(50);

/// Tolerated divergence between a video's playback position and the cycle
/// position before the drift check forces a seek.
pub const DRIFT_TOLERANCE_SECS: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerId {
    L0,
    L1,
}

impl LayerId {
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::L0 => Self::L1,
            Self::L1 => Self::L0,
        }
    }
}

/// A playlist entry resolved to a playable URL.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayedItem {
    pub filename: String,
    pub url: String,
    pub is_video: bool,
}

/// The seam to the embedded browser. Calls are fire-and-forget commands;
/// only `video_position` reads back.
pub trait MediaSurface: Send + Sync {
    fn load(&self, layer: LayerId, item: &PlayedItem);
    /// Raise a layer to the front with the given transition.
    fn show(&self, layer: LayerId, transition: Transition);
    fn hide(&self, layer: LayerId);
    fn play(&self, layer: LayerId);
    fn pause(&self, layer: LayerId);
    fn seek(&self, layer: LayerId, position: f64);
    /// `currentTime` of the video on `layer`; `None` for images or an
    /// unloaded layer.
    fn video_position(&self, layer: LayerId) -> Option<f64>;
    fn set_transform(&self, orientation: Orientation, flip_horizontal: bool, flip_vertical: bool);
    /// Replace both layers with the splash screen.
    fn show_splash(&self, splash: &SplashScreen);
}

/// Owns the two layers and the front/back bookkeeping.
pub struct RendererController {
    surface: Arc<dyn MediaSurface>,
    active: LayerId,
    /// Filename loaded on each of (L0, L1), if any.
    loaded: [Option<String>; 2],
    shown_index: Option<usize>,
}

impl RendererController {
    #[must_use]
    pub fn new(surface: Arc<dyn MediaSurface>) -> Self {
        Self {
            surface,
            active: LayerId::L0,
            loaded: [None, None],
            shown_index: None,
        }
    }

    /// Playlist index currently on the front layer.
    #[must_use]
    pub fn shown_index(&self) -> Option<usize> {
        self.shown_index
    }

    fn slot(layer: LayerId) -> usize {
        match layer {
            LayerId::L0 => 0,
            LayerId::L1 => 1,
        }
    }

    fn load_layer(&mut self, layer: LayerId, item: &PlayedItem) {
        self.surface.load(layer, item);
        self.loaded[Self::slot(layer)] = Some(item.filename.clone());
    }

    /// Put `item` on screen immediately (startup and resync): a cut, with
    /// videos seeked to the cycle offset before playing.
    pub fn show_now(&mut self, index: usize, item: &PlayedItem, in_item: f64, next: Option<&PlayedItem>) {
        let back = self.active.other();
        self.surface.pause(self.active);

        self.load_layer(self.active, item);
        self.surface.show(self.active, Transition::cut());
        if item.is_video {
            self.surface.seek(self.active, in_item);
            self.surface.play(self.active);
        }
        self.surface.hide(back);
        if let Some(next) = next {
            self.load_layer(back, next);
        }
        self.shown_index = Some(index);
    }

    /// The cycle boundary procedure. `item` is the item the clock says is
    /// current (recomputed by the caller, never assumed to be "previous
    /// plus one"), and `next` is its successor for preloading.
    pub fn transition_to(
        &mut self,
        index: usize,
        item: &PlayedItem,
        in_item: f64,
        next: Option<&PlayedItem>,
        transition: Transition,
    ) {
        let outgoing = self.active;
        let incoming = outgoing.other();

        self.surface.pause(outgoing);

        // A missed wakeup or reshuffled playlist can leave the preload
        // stale; reload in place before raising.
        if self.loaded[Self::slot(incoming)].as_deref() != Some(item.filename.as_str()) {
            debug!(filename = %item.filename, "Back layer preload mismatch, reloading");
            self.load_layer(incoming, item);
        }

        self.surface.show(incoming, transition);
        if item.is_video {
            self.surface.seek(incoming, in_item);
            self.surface.play(incoming);
        }

        // Drop the outgoing layer once the crossfade has finished, then
        // hand it the subsequent item to preload.
        let release_after = Duration::from_secs_f64(transition.duration.max(0.0)) + LAYER_RELEASE_DELAY;
        let surface = Arc::clone(&self.surface);
        let preload = next.cloned();
        if let Some(next) = &preload {
            self.loaded[Self::slot(outgoing)] = Some(next.filename.clone());
        }
        tokio::spawn(async move {
            tokio::time::sleep(release_after).await;
            surface.hide(outgoing);
            if let Some(next) = preload {
                surface.load(outgoing, &next);
            }
        });

        self.active = incoming;
        self.shown_index = Some(index);
    }

    /// Fires when a transition is cut-style and instantaneous in tests:
    /// both `transition_to` paths leave the controller consistent.
    #[must_use]
    pub fn active_layer(&self) -> LayerId {
        self.active
    }

    /// 1 Hz video drift check: seek when `currentTime` has wandered more
    /// than [`DRIFT_TOLERANCE_SECS`] from the cycle position. Returns
    /// whether a correction was issued.
    pub fn correct_drift(&self, expected_in_item: f64) -> bool {
        let Some(position) = self.surface.video_position(self.active) else {
            return false;
        };
        if (position - expected_in_item).abs() > DRIFT_TOLERANCE_SECS {
            debug!(
                observed = position,
                expected = expected_in_item,
                "Video drift, seeking"
            );
            self.surface.seek(self.active, expected_in_item);
            return true;
        }
        false
    }

    pub fn apply_transform(
        &self,
        orientation: Orientation,
        flip_horizontal: bool,
        flip_vertical: bool,
    ) {
        self.surface
            .set_transform(orientation, flip_horizontal, flip_vertical);
    }

    /// Swap playback out for the splash screen (empty playlist).
    pub fn show_splash(&mut self, splash: &SplashScreen) {
        self.surface.pause(LayerId::L0);
        self.surface.pause(LayerId::L1);
        self.surface.show_splash(splash);
        self.loaded = [None, None];
        self.shown_index = None;
    }

    /// Stop playback on both layers; the only valid path out.
    pub fn stop(&mut self) {
        self.surface.pause(LayerId::L0);
        self.surface.pause(LayerId::L1);
        self.surface.hide(self.active.other());
        self.shown_index = None;
    }
}

/// Command-log surface for headless runs. The kiosk shell implements
/// [`MediaSurface`] over its embedded browser's two DOM layers; without one
/// attached, every command lands in the log instead of on a screen.
#[derive(Debug, Default)]
pub struct TracingSurface;

impl MediaSurface for TracingSurface {
    fn load(&self, layer: LayerId, item: &PlayedItem) {
        debug!(?layer, url = %item.url, "surface: load");
    }

    fn show(&self, layer: LayerId, transition: Transition) {
        debug!(?layer, kind = ?transition.kind, "surface: show");
    }

    fn hide(&self, layer: LayerId) {
        debug!(?layer, "surface: hide");
    }

    fn play(&self, layer: LayerId) {
        debug!(?layer, "surface: play");
    }

    fn pause(&self, layer: LayerId) {
        debug!(?layer, "surface: pause");
    }

    fn seek(&self, layer: LayerId, position: f64) {
        debug!(?layer, position, "surface: seek");
    }

    fn video_position(&self, _layer: LayerId) -> Option<f64> {
        None
    }

    fn set_transform(&self, orientation: Orientation, flip_horizontal: bool, flip_vertical: bool) {
        debug!(?orientation, flip_horizontal, flip_vertical, "surface: transform");
    }

    fn show_splash(&self, splash: &SplashScreen) {
        debug!(?splash, "surface: splash");
    }
}
