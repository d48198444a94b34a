//! Shared types, error definitions, and external ports used across the
//! notefmt crates.

pub mod error;
pub mod locale;
pub mod types;

pub use {
    error::{Error, Result},
    locale::{DEFAULT_LOCALE, LocaleStore, resolve_string},
    types::{Attachment, AttachmentKind, ChatRef, IncomingMessage, MessageHandle, UserRef},
};
