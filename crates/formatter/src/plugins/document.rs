//! Media attachments: captures the attachment of the authoring message
//! into the note and carries it through to the outgoing payload.

use {
    crate::{
        note::{ParsedPayload, RawNote},
        plugin::{FormatPlugin, PluginCtx, ValidationFailure},
    },
    async_trait::async_trait,
};

/// Platform limit on the caption of a media message, in UTF-16 code units.
pub const DEFAULT_CAPTION_LIMIT: usize = 1024;

pub struct Document {
    caption_limit: usize,
}

impl Document {
    #[must_use]
    pub fn new(caption_limit: usize) -> Self {
        Self { caption_limit }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new(DEFAULT_CAPTION_LIMIT)
    }
}

#[async_trait]
impl FormatPlugin for Document {
    fn name(&self) -> &'static str {
        "document"
    }

    async fn validate(
        &self,
        ctx: &PluginCtx<'_>,
        note: &mut RawNote,
        _found: Option<&regex::Captures<'_>>,
    ) -> Result<(), ValidationFailure> {
        let Some(attachment) = &ctx.message.attachment else {
            // Text-only notes are fine; a note with neither is not.
            if note.text.as_deref().is_none_or(str::is_empty) && note.document.is_none() {
                return Err(ValidationFailure::new("invalid_document"));
            }
            return Ok(());
        };

        // Captions are shorter than plain messages; enforce the limit up
        // front so the author hears about it before the note is saved.
        if let Some(text) = &note.text
            && text.encode_utf16().count() > self.caption_limit
        {
            return Err(ValidationFailure::new("media_caption_too_long"));
        }
        note.document = Some(attachment.clone());
        Ok(())
    }

    async fn compile(&self, _ctx: &PluginCtx<'_>, note: &RawNote, payload: &mut ParsedPayload) {
        if let Some(document) = &note.document {
            payload.document = Some(document.clone());
        }
    }

    async fn decompile(&self, _ctx: &PluginCtx<'_>, note: &RawNote, payload: &mut ParsedPayload) {
        if let Some(document) = &note.document {
            payload.document = Some(document.clone());
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        super::*,
        crate::plugin::test_support::{plugin_ctx, CTX_CHAT_ID},
        notefmt_common::{Attachment, AttachmentKind, ChatRef, IncomingMessage},
    };

    fn message_with_photo() -> IncomingMessage {
        let mut message = IncomingMessage::new(ChatRef::new(CTX_CHAT_ID));
        message.attachment = Some(Attachment {
            kind: AttachmentKind::Photo,
            file_id: "photo-1".to_string(),
        });
        message
    }

    #[tokio::test]
    async fn empty_note_without_attachment_is_rejected() {
        let message = IncomingMessage::new(ChatRef::new(CTX_CHAT_ID));
        let ctx = plugin_ctx(&message);
        let mut note = RawNote::default();
        let err = Document::default()
            .validate(&ctx, &mut note, None)
            .await
            .unwrap_err();
        assert_eq!(err.key, "invalid_document");
    }

    #[tokio::test]
    async fn attachment_is_captured_into_the_note() {
        let message = message_with_photo();
        let ctx = plugin_ctx(&message);
        let mut note = RawNote::with_text("caption");
        Document::default()
            .validate(&ctx, &mut note, None)
            .await
            .unwrap();
        assert_eq!(
            note.document.as_ref().map(|d| d.file_id.as_str()),
            Some("photo-1")
        );
    }

    #[tokio::test]
    async fn over_limit_caption_is_rejected() {
        let message = message_with_photo();
        let ctx = plugin_ctx(&message);
        let mut note = RawNote::with_text(&"x".repeat(1025));
        let err = Document::default()
            .validate(&ctx, &mut note, None)
            .await
            .unwrap_err();
        assert_eq!(err.key, "media_caption_too_long");
    }

    #[tokio::test]
    async fn compile_copies_the_attachment() {
        let message = message_with_photo();
        let ctx = plugin_ctx(&message);
        let mut note = RawNote::with_text("caption");
        Document::default()
            .validate(&ctx, &mut note, None)
            .await
            .unwrap();
        let mut payload = ParsedPayload::default();
        Document::default().compile(&ctx, &note, &mut payload).await;
        assert!(payload.document.is_some());
    }
}
