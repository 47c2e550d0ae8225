use serde::{Deserialize, Serialize};

/// Splash-screen settings shown when a device has nothing scheduled.
/// Singleton per server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultDisplay {
    pub logo_filename: Option<String>,
    /// Fraction of the shorter screen edge, in (0, 1].
    pub logo_scale: f64,
    pub logo_position: LogoPosition,
    pub background_mode: BackgroundMode,
    pub background_color: String,
    pub background_video: Option<String>,
    /// Seconds per background in slideshow mode.
    pub slideshow_duration: f64,
    pub slideshow_transition: SlideshowTransition,
    pub backgrounds: Vec<BackgroundImage>,
}

impl Default for DefaultDisplay {
    fn default() -> Self {
        Self {
            logo_filename: None,
            logo_scale: 0.5,
            logo_position: LogoPosition::Center,
            background_mode: BackgroundMode::Solid,
            background_color: "#000000".to_string(),
            background_video: None,
            slideshow_duration: 30.0,
            slideshow_transition: SlideshowTransition::Fade,
            backgrounds: Vec::new(),
        }
    }
}

impl DefaultDisplay {
    /// Active backgrounds in display order.
    #[must_use]
    pub fn active_backgrounds(&self) -> Vec<&BackgroundImage> {
        let mut backgrounds: Vec<&BackgroundImage> =
            self.backgrounds.iter().filter(|b| b.is_active).collect();
        backgrounds.sort_by_key(|b| b.order);
        backgrounds
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogoPosition {
    Top,
    #[default]
    Center,
    Bottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundMode {
    #[default]
    Solid,
    Image,
    Slideshow,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlideshowTransition {
    #[default]
    Fade,
    Slide,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackgroundImage {
    pub filename: String,
    pub order: i32,
    pub is_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_backgrounds_sorted() {
        let display = DefaultDisplay {
            backgrounds: vec![
                BackgroundImage {
                    filename: "b.jpg".to_string(),
                    order: 2,
                    is_active: true,
                },
                BackgroundImage {
                    filename: "a.jpg".to_string(),
                    order: 1,
                    is_active: true,
                },
                BackgroundImage {
                    filename: "off.jpg".to_string(),
                    order: 0,
                    is_active: false,
                },
            ],
            ..DefaultDisplay::default()
        };

        let active: Vec<&str> = display
            .active_backgrounds()
            .iter()
            .map(|b| b.filename.as_str())
            .collect();
        assert_eq!(active, vec!["a.jpg", "b.jpg"]);
    }
}
