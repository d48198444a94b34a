//! Link preview toggle: the `%PREVIEW` directive suppresses the platform
//! link preview for a note. Without it, previews stay on.

use {
    crate::{
        note::{ParsedPayload, RawNote},
        plugin::{FormatPlugin, PluginCtx, ValidationFailure},
    },
    async_trait::async_trait,
    once_cell::sync::Lazy,
    regex::{Captures, Regex},
};

#[allow(clippy::expect_used)]
static PREVIEW_DIRECTIVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[%$]PREVIEW\s?").expect("valid preview directive pattern"));

pub struct WebPreview;

#[async_trait]
impl FormatPlugin for WebPreview {
    fn name(&self) -> &'static str {
        "preview"
    }

    fn trigger(&self) -> Option<&Regex> {
        Some(&PREVIEW_DIRECTIVE)
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
        note.web_preview = true;
        if let Some(text) = note.text.take() {
            note.text = Some(text.replacen(&found[0], "", 1));
        }
        Ok(())
    }

    async fn compile(&self, _ctx: &PluginCtx<'_>, note: &RawNote, payload: &mut ParsedPayload) {
        // Media notes render attachments, not previews; the flag does not
        // apply there.
        if note.web_preview && note.document.is_none() {
            payload.disable_link_preview = true;
        }
    }

    async fn decompile(&self, _ctx: &PluginCtx<'_>, note: &RawNote, payload: &mut ParsedPayload) {
        if note.web_preview
            && let Some(text) = payload.text.as_mut()
        {
            text.push_str("\n%PREVIEW");
        }
    }
}
