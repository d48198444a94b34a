//! The bundled plugins, in their canonical pipeline order: buttons strip
//! their syntax before anything else reads the text, attachments validate
//! caption limits, the preview toggle flips the payload flag, and
//! variables substitute last so they see the final text.

pub mod buttons;
pub mod document;
pub mod preview;
pub mod variables;

pub use {
    buttons::{ButtonKind, ButtonRegistry, NoteButton, NoteButtons, UrlButton},
    document::Document,
    preview::WebPreview,
    variables::Variables,
};

use {crate::plugin::PluginPipeline, std::sync::Arc};

/// The pipeline every deployment starts from.
#[must_use]
pub fn default_pipeline(registry: Arc<ButtonRegistry>, caption_limit: usize) -> PluginPipeline {
    let mut pipeline = PluginPipeline::new();
    pipeline.register(Box::new(NoteButtons::new(registry)));
    pipeline.register(Box::new(Document::new(caption_limit)));
    pipeline.register(Box::new(WebPreview));
    pipeline.register(Box::new(Variables));
    pipeline
}
