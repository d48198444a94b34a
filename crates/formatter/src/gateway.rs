//! Outbound port. Transport to the chat platform lives outside the core;
//! the formatter only drives this trait.

use {
    crate::note::ParsedPayload,
    async_trait::async_trait,
    notefmt_common::{IncomingMessage, MessageHandle},
};

#[async_trait]
pub trait NoteGateway: Send + Sync {
    /// Deliver a compiled payload to a chat.
    async fn send_note(
        &self,
        chat_id: i64,
        payload: &ParsedPayload,
        reply_to: Option<i64>,
    ) -> notefmt_common::Result<MessageHandle>;

    /// Reply to the author with a plain diagnostic message (validation and
    /// parse failures).
    async fn reply_text(
        &self,
        message: &IncomingMessage,
        text: &str,
    ) -> notefmt_common::Result<MessageHandle>;
}
