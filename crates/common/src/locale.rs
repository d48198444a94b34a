//! Locale/string lookup port.
//!
//! Translation storage lives outside the core; the formatter only resolves
//! keys through this trait. Missing keys fall back to the default locale,
//! then to the raw key itself, so a broken translation pack never hides an
//! error message entirely.

use async_trait::async_trait;

/// Locale used when a chat has no configured locale or a key is missing
/// from the chat's locale.
pub const DEFAULT_LOCALE: &str = "en-US";

#[async_trait]
pub trait LocaleStore: Send + Sync {
    /// Look up a translation string for a locale. `None` when the key is
    /// not present in that locale.
    async fn get_string(&self, key: &str, locale: &str) -> Option<String>;

    /// The locale configured for a chat, if any.
    async fn chat_locale(&self, chat_id: i64) -> Option<String>;
}

/// Resolve a message key for a chat: chat locale first, then
/// [`DEFAULT_LOCALE`], then the key itself.
pub async fn resolve_string(store: &dyn LocaleStore, key: &str, chat_id: i64) -> String {
    let locale = store
        .chat_locale(chat_id)
        .await
        .unwrap_or_else(|| DEFAULT_LOCALE.to_string());

    if let Some(s) = store.get_string(key, &locale).await {
        return s;
    }
    if locale != DEFAULT_LOCALE
        && let Some(s) = store.get_string(key, DEFAULT_LOCALE).await
    {
        return s;
    }
    key.to_string()
}
