use crate::vocabulary::DEFAULT_BASE_WORDS;
use serde::{Deserialize, Serialize};

/// Ten years. Longer lifetimes are clamped so expiry timestamps stay in range.
pub const MAX_TOKEN_LIFETIME_SECS: u64 = 10 * 365 * 24 * 60 * 60;

pub const OPENER_PRESET_LIST: &[&str] = &["xdg-open", "open", "gio", "firefox"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api_base_url: String,
    pub dictionary_url: String,
    pub base_words: Vec<String>,
    pub chars_per_location: usize,
    pub request_timeout_secs: u64,
    pub link_opener: String,
    pub token_lifetime_secs: u64,
    pub confirm_links: bool,
    pub text_width: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:5000".to_string(),
            dictionary_url: "https://api.dictionaryapi.dev/api/v2/entries/en".to_string(),
            base_words: DEFAULT_BASE_WORDS.iter().map(|w| w.to_string()).collect(),
            chars_per_location: 1600,
            request_timeout_secs: 10,
            link_opener: OPENER_PRESET_LIST[0].to_string(),
            token_lifetime_secs: 3600,
            confirm_links: true,
            text_width: 80,
        }
    }
}

impl Settings {
    /// Clamp values that would break location generation or rendering.
    pub fn sanitized(mut self) -> Self {
        if self.chars_per_location == 0 {
            self.chars_per_location = Settings::default().chars_per_location;
        }
        if self.text_width < 20 {
            self.text_width = 20;
        }
        if self.token_lifetime_secs > MAX_TOKEN_LIFETIME_SECS {
            self.token_lifetime_secs = MAX_TOKEN_LIFETIME_SECS;
        }
        if self.link_opener.trim().is_empty() {
            self.link_opener = OPENER_PRESET_LIST[0].to_string();
        }
        self
    }
}
