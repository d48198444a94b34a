//! Styled-text entities and the offset-rewriting primitives.
//!
//! Entities address spans of the message text in UTF-16 code units — the
//! indexing convention of the target platform — not bytes or graphemes.
//! Every rewrite that changes text length must go through
//! [`shift_entities`] so the entity set stays valid.

use serde::{Deserialize, Serialize};

/// Closed set of span kinds the platform understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Bold,
    Italic,
    Underline,
    Strikethrough,
    Code,
    Pre,
    Url,
    TextLink,
    Mention,
    TextMention,
    BotCommand,
    Hashtag,
    Cashtag,
    Email,
    PhoneNumber,
}

/// A styled span over plain text. `offset` and `length` are UTF-16 code
/// unit counts. Entities may nest but never partially overlap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub offset: usize,
    pub length: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl Entity {
    #[must_use]
    pub fn new(kind: EntityKind, offset: usize, length: usize) -> Self {
        Self {
            kind,
            offset,
            length,
            url: None,
            language: None,
        }
    }

    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// One past the last code unit covered by this entity.
    #[must_use]
    pub fn end(&self) -> usize {
        self.offset + self.length
    }
}

/// How [`shift_entities`] distributes a delta over an entity the edit
/// falls inside of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitPolicy {
    /// Apply the entire delta to the overlapping entity's length.
    Full,
    /// Apply half the delta (rounded half to even) — used when an edit
    /// replaces a construct somewhere inside the span and the shrink is
    /// distributed evenly.
    Half,
}

/// `delta / 2` rounded half to even.
fn half_even(delta: isize) -> isize {
    let floor = delta.div_euclid(2);
    if delta % 2 == 0 || floor % 2 == 0 {
        floor
    } else {
        floor + 1
    }
}

fn offset_by(value: usize, delta: isize) -> usize {
    if delta >= 0 {
        value + delta.unsigned_abs()
    } else {
        value.saturating_sub(delta.unsigned_abs())
    }
}

/// Adjust entities after a `delta`-length edit at `edit_offset`
/// (insertion when `delta > 0`, deletion when `delta < 0`).
///
/// Entities entirely before the edit are untouched; entities strictly
/// after it move by `delta`; entities whose span covers the edit point —
/// including spans that start exactly on it — absorb the delta into their
/// length per `policy`.
pub fn shift_entities(
    entities: &mut [Entity],
    edit_offset: usize,
    delta: isize,
    policy: SplitPolicy,
) {
    for entity in entities.iter_mut() {
        if entity.end() <= edit_offset {
            continue;
        }
        if entity.offset > edit_offset {
            entity.offset = offset_by(entity.offset, delta);
        } else {
            let applied = match policy {
                SplitPolicy::Full => delta,
                SplitPolicy::Half => half_even(delta),
            };
            entity.length = offset_by(entity.length, applied);
        }
    }
}

fn is_whitespace(unit: u16) -> bool {
    char::from_u32(u32::from(unit)).is_some_and(char::is_whitespace)
}

/// Strip leading and trailing whitespace, shrinking or dropping entities
/// whose span touches the trimmed region. The canonical terminal step of
/// every parser.
pub fn trim_whitespace(mut text: Vec<u16>, entities: &mut Vec<Entity>) -> Vec<u16> {
    while text.last().copied().is_some_and(is_whitespace) {
        let end = text.len();
        for entity in entities.iter_mut() {
            if entity.end() == end && entity.length > 0 {
                entity.length -= 1;
            }
        }
        text.pop();
    }

    while text.first().copied().is_some_and(is_whitespace) {
        for entity in entities.iter_mut() {
            if entity.offset > 0 {
                entity.offset -= 1;
            } else if entity.length > 0 {
                entity.length -= 1;
            }
        }
        text.remove(0);
    }

    entities.retain(|entity| entity.length > 0);
    text
}

/// Canonical entity order: ascending offset, ties broken by descending
/// length so an outer entity sorts before the entities it contains.
pub fn sort_entities(entities: &mut [Entity]) {
    entities.sort_by(|a, b| a.offset.cmp(&b.offset).then(b.length.cmp(&a.length)));
}

/// Encode to UTF-16 code units for offset math.
#[must_use]
pub fn encode_utf16(text: &str) -> Vec<u16> {
    text.encode_utf16().collect()
}

/// Decode UTF-16 code units back to native text. Unpaired surrogates
/// cannot be produced by our own rewrites, but are replaced rather than
/// panicking if they somehow appear.
#[must_use]
pub fn decode_utf16(units: &[u16]) -> String {
    char::decode_utf16(units.iter().copied())
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}
