//! Splash-screen model: what the display falls back to whenever the
//! playlist is empty (nothing scheduled, fresh enrolment, deactivated
//! group).

use signcast_core::models::display::SlideshowTransition;
use signcast_core::models::{BackgroundMode, LogoPosition};

use crate::api::DefaultDisplayInfo;
use crate::cache::WantedFile;

#[derive(Debug, Clone, PartialEq)]
pub enum SplashBackground {
    Solid {
        color: String,
    },
    Image {
        url: String,
    },
    Slideshow {
        urls: Vec<String>,
        seconds_per_image: f64,
        transition: SlideshowTransition,
    },
    Video {
        url: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SplashScreen {
    pub logo_url: Option<String>,
    pub logo_scale: f64,
    pub logo_position: LogoPosition,
    pub background: SplashBackground,
}

impl SplashScreen {
    /// Build from the server's default-display settings. `resolve` maps a
    /// splash filename and its remote URL to whatever the renderer should
    /// load (local media server when cached, origin otherwise).
    pub fn from_display(
        display: &DefaultDisplayInfo,
        resolve: impl Fn(&str, &str) -> String,
    ) -> Self {
        let background = match display.background_mode {
            BackgroundMode::Solid => SplashBackground::Solid {
                color: display.background_color.clone(),
            },
            BackgroundMode::Image => match display.backgrounds.first() {
                Some(bg) => SplashBackground::Image {
                    url: resolve(&bg.filename, &bg.url),
                },
                None => SplashBackground::Solid {
                    color: display.background_color.clone(),
                },
            },
            BackgroundMode::Slideshow => SplashBackground::Slideshow {
                urls: display
                    .backgrounds
                    .iter()
                    .map(|bg| resolve(&bg.filename, &bg.url))
                    .collect(),
                seconds_per_image: display.slideshow_duration,
                transition: display.slideshow_transition,
            },
            BackgroundMode::Video => {
                match (&display.background_video, &display.background_video_url) {
                    (Some(filename), Some(url)) => SplashBackground::Video {
                        url: resolve(filename, url),
                    },
                    _ => SplashBackground::Solid {
                        color: display.background_color.clone(),
                    },
                }
            }
        };

        Self {
            logo_url: match (&display.logo_filename, &display.logo_url) {
                (Some(filename), Some(url)) => Some(resolve(filename, url)),
                _ => None,
            },
            logo_scale: display.logo_scale,
            logo_position: display.logo_position,
            background,
        }
    }

    /// Everything the splash wants in the cache's splash directory.
    #[must_use]
    pub fn wanted_files(display: &DefaultDisplayInfo) -> Vec<WantedFile> {
        let mut wanted = Vec::new();
        if let (Some(filename), Some(url)) = (&display.logo_filename, &display.logo_url) {
            wanted.push(WantedFile {
                filename: filename.clone(),
                size: None,
                url: url.clone(),
            });
        }
        if let (Some(filename), Some(url)) = (&display.background_video, &display.background_video_url)
        {
            wanted.push(WantedFile {
                filename: filename.clone(),
                size: None,
                url: url.clone(),
            });
        }
        for bg in &display.backgrounds {
            wanted.push(WantedFile {
                filename: bg.filename.clone(),
                size: None,
                url: bg.url.clone(),
            });
        }
        wanted
    }
}
