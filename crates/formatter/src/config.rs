//! Formatter configuration. Deserialized from the host's config file;
//! every field has a default so an empty section works.

use {crate::note::ParseMode, serde::Deserialize};

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FormatterConfig {
    /// Dialect used when neither the caller nor the text chooses one.
    pub default_parse_mode: ParseMode,
    /// Sent when a note compiles to neither text nor attachment.
    pub fallback_text: String,
    /// Platform caption limit for media notes, in UTF-16 code units.
    pub caption_limit: usize,
}

impl Default for FormatterConfig {
    fn default() -> Self {
        Self {
            default_parse_mode: ParseMode::Html,
            fallback_text: "404".to_string(),
            caption_limit: 1024,
        }
    }
}
