//! Inline button syntax: `[Label](kind:data)`, `[Label](kind:data:same)`.
//!
//! Button kinds live in an explicit registry built once at startup and
//! read-only afterwards. Kinds the registry does not know are left in the
//! text untouched — the same bracket syntax is also a markdown link, and
//! only the registry decides which is which.

use {
    crate::{
        note::{ButtonLayout, ButtonSpec, InlineButton, ParsedPayload, RawNote},
        plugin::{FormatPlugin, PluginCtx, ValidationFailure},
    },
    async_trait::async_trait,
    once_cell::sync::Lazy,
    regex::{Captures, Regex},
    std::{collections::HashMap, sync::Arc},
    tracing::warn,
};

#[allow(clippy::expect_used)]
static BUTTON_SYNTAX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[(?P<text>.+?)]\((?P<kind>\w+)(?::(?P<data>.+?))?\)\s?")
        .expect("valid button syntax pattern")
});

/// A named, independently registered button behavior with its own
/// validate/compile contract.
pub trait ButtonKind: Send + Sync {
    fn name(&self) -> &'static str;

    /// Check and normalize the authored spec. A failure aborts the whole
    /// compile with the carried message key.
    fn validate(&self, spec: &mut ButtonSpec) -> Result<(), ValidationFailure>;

    /// Turn a validated spec into a rendered button. `None` skips the
    /// button.
    fn compile(&self, spec: &ButtonSpec) -> Option<InlineButton>;
}

/// Process-wide registry of button kinds, keyed by name. Populated once
/// during startup; read-only for the lifetime of the process.
#[derive(Default)]
pub struct ButtonRegistry {
    kinds: HashMap<&'static str, Box<dyn ButtonKind>>,
}

impl ButtonRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the bundled kinds.
    #[must_use]
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(UrlButton));
        registry.register(Box::new(NoteButton));
        registry
    }

    pub fn register(&mut self, kind: Box<dyn ButtonKind>) {
        self.kinds.insert(kind.name(), kind);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&dyn ButtonKind> {
        self.kinds.get(name).map(AsRef::as_ref)
    }
}

/// `url` buttons: `[Label](url:example.com)`. A leading `//` is accepted
/// and stripped.
pub struct UrlButton;

impl ButtonKind for UrlButton {
    fn name(&self) -> &'static str {
        "url"
    }

    fn validate(&self, spec: &mut ButtonSpec) -> Result<(), ValidationFailure> {
        let data = spec.data.take().unwrap_or_default();
        let url = data.strip_prefix("//").unwrap_or(&data);
        if url.is_empty() {
            return Err(ValidationFailure::new("invalid_btn_url"));
        }
        spec.data = Some(url.to_string());
        Ok(())
    }

    fn compile(&self, spec: &ButtonSpec) -> Option<InlineButton> {
        let url = spec.data.as_deref()?;
        Some(InlineButton::url(&spec.text, url))
    }
}

/// `note` buttons: `[Label](note:name)` — a callback button that opens
/// another saved note.
pub struct NoteButton;

impl ButtonKind for NoteButton {
    fn name(&self) -> &'static str {
        "note"
    }

    fn validate(&self, spec: &mut ButtonSpec) -> Result<(), ValidationFailure> {
        match spec.data.as_deref() {
            Some(name) if !name.is_empty() => Ok(()),
            _ => Err(ValidationFailure::new("invalid_btn_note")),
        }
    }

    fn compile(&self, spec: &ButtonSpec) -> Option<InlineButton> {
        let name = spec.data.as_deref()?;
        Some(InlineButton::callback(&spec.text, format!("note:{name}")))
    }
}

/// The buttons plugin: recognizes inline button syntax during validation,
/// compiles the collected specs into a keyboard layout.
pub struct NoteButtons {
    registry: Arc<ButtonRegistry>,
}

impl NoteButtons {
    #[must_use]
    pub fn new(registry: Arc<ButtonRegistry>) -> Self {
        Self { registry }
    }
}

/// Split the optional trailing `:same` row marker off the captured data.
fn split_row_marker(data: Option<&str>) -> (Option<String>, bool) {
    match data {
        None => (None, false),
        Some("same") => (None, true),
        Some(data) => match data.strip_suffix(":same") {
            Some(rest) => (Some(rest.to_string()), true),
            None => (Some(data.to_string()), false),
        },
    }
}

#[async_trait]
impl FormatPlugin for NoteButtons {
    fn name(&self) -> &'static str {
        "buttons"
    }

    fn trigger(&self) -> Option<&Regex> {
        Some(&BUTTON_SYNTAX)
    }

    async fn validate(
        &self,
        _ctx: &PluginCtx<'_>,
        note: &mut RawNote,
        found: Option<&Captures<'_>>,
    ) -> Result<(), ValidationFailure> {
        let Some(found) = found else {
            return Ok(());
        };
        let kind_name = &found["kind"];
        let Some(kind) = self.registry.get(kind_name) else {
            // Not a registered button — probably a markdown link.
            return Ok(());
        };

        let (data, same_row) = split_row_marker(found.name("data").map(|m| m.as_str()));
        let mut spec = ButtonSpec {
            text: found["text"].to_string(),
            data,
            same_row,
            kind: kind_name.to_string(),
        };
        kind.validate(&mut spec)?;

        if let Some(text) = note.text.take() {
            note.text = Some(text.replacen(&found[0], "", 1));
        }
        note.buttons.push(spec);
        Ok(())
    }

    async fn compile(&self, _ctx: &PluginCtx<'_>, note: &RawNote, payload: &mut ParsedPayload) {
        if note.buttons.is_empty() {
            return;
        }
        let mut layout = ButtonLayout::default();
        for spec in &note.buttons {
            match self.registry.get(&spec.kind) {
                Some(kind) => {
                    if let Some(button) = kind.compile(spec) {
                        layout.push(button, spec.same_row);
                    }
                }
                None => {
                    // Registry inconsistency, not author error: render the
                    // note without the orphaned button.
                    warn!(kind = %spec.kind, "unregistered button kind; skipping button");
                }
            }
        }
        if !layout.is_empty() {
            payload.reply_markup = Some(layout);
        }
    }

    async fn decompile(&self, _ctx: &PluginCtx<'_>, note: &RawNote, payload: &mut ParsedPayload) {
        if note.buttons.is_empty() {
            return;
        }
        let Some(text) = payload.text.as_mut() else {
            return;
        };
        for spec in &note.buttons {
            text.push('\n');
            text.push('[');
            text.push_str(&spec.text);
            text.push_str("](");
            text.push_str(&spec.kind);
            if let Some(data) = &spec.data {
                text.push(':');
                text.push_str(data);
            }
            if spec.same_row {
                text.push_str(":same");
            }
            text.push(')');
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case(None, None, false)]
    #[case(Some("same"), None, true)]
    #[case(Some("//e.co"), Some("//e.co"), false)]
    #[case(Some("//e.co:same"), Some("//e.co"), true)]
    fn row_marker_splitting(
        #[case] input: Option<&str>,
        #[case] data: Option<&str>,
        #[case] same: bool,
    ) {
        let (got_data, got_same) = split_row_marker(input);
        assert_eq!(got_data.as_deref(), data);
        assert_eq!(got_same, same);
    }

    #[test]
    fn url_kind_strips_leading_slashes() {
        let mut spec = ButtonSpec {
            text: "Open".to_string(),
            data: Some("//example.com".to_string()),
            same_row: false,
            kind: "url".to_string(),
        };
        UrlButton.validate(&mut spec).unwrap();
        assert_eq!(spec.data.as_deref(), Some("example.com"));
        let button = UrlButton.compile(&spec).unwrap();
        assert_eq!(button.url.as_deref(), Some("example.com"));
    }

    #[test]
    fn url_kind_rejects_empty_target() {
        let mut spec = ButtonSpec {
            text: "Open".to_string(),
            data: None,
            same_row: false,
            kind: "url".to_string(),
        };
        let err = UrlButton.validate(&mut spec).unwrap_err();
        assert_eq!(err.key, "invalid_btn_url");
    }

    #[test]
    fn note_kind_compiles_to_callback() {
        let spec = ButtonSpec {
            text: "Rules".to_string(),
            data: Some("rules".to_string()),
            same_row: false,
            kind: "note".to_string(),
        };
        let button = NoteButton.compile(&spec).unwrap();
        assert_eq!(button.callback_data.as_deref(), Some("note:rules"));
    }

    #[test]
    fn syntax_matches_row_variants() {
        let caps = BUTTON_SYNTAX.captures("[A](url://e.co:same)").unwrap();
        assert_eq!(&caps["kind"], "url");
        assert_eq!(&caps["data"], "//e.co:same");
    }
}
