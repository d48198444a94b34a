//! Author-facing and platform-ready note representations.
//!
//! A [`RawNote`] is built once per authoring action, threaded through the
//! plugin pipeline, and discarded after producing a [`ParsedPayload`] (the
//! send path) or a rendered markup string (the edit path). Nothing here is
//! retained across requests.

use {
    crate::entity::Entity,
    notefmt_common::Attachment,
    serde::{Deserialize, Serialize},
};

/// Which parser compiles the note text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseMode {
    #[serde(alias = "markdown")]
    Md,
    #[default]
    Html,
    /// No markup interpretation — the text is taken literally.
    None,
}

/// The author-facing, uncompiled note. Plugin-owned fields the core does
/// not know about ride along in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawNote {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<Entity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_mode: Option<ParseMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<Attachment>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub buttons: Vec<ButtonSpec>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub web_preview: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl RawNote {
    #[must_use]
    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }
}

/// The platform-ready compiled message. Built fresh on every compile;
/// each plugin owns disjoint fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParsedPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<Entity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_markup: Option<ButtonLayout>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<Attachment>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub disable_link_preview: bool,
}

/// An inline button as authored: `[text](kind:data:same)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonSpec {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub same_row: bool,
    pub kind: String,
}

/// A compiled button the platform can render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineButton {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_data: Option<String>,
}

impl InlineButton {
    #[must_use]
    pub fn url(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            url: Some(url.into()),
            callback_data: None,
        }
    }

    #[must_use]
    pub fn callback(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            url: None,
            callback_data: Some(data.into()),
        }
    }
}

/// Structured keyboard layout: a list of rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonLayout {
    pub rows: Vec<Vec<InlineButton>>,
}

impl ButtonLayout {
    /// Append a button: `same_row` extends the previous row, otherwise a
    /// new row starts.
    pub fn push(&mut self, button: InlineButton, same_row: bool) {
        match self.rows.last_mut() {
            Some(row) if same_row => row.push(button),
            _ => self.rows.push(vec![button]),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
