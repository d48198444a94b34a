use {crate::html::ParseError, thiserror::Error};

/// Errors surfaced to the caller. Author mistakes (bad markup, refused
/// notes) are dispatched back to the chat and never reach this type.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("pass either excluded_plugins or included_plugins, not both")]
    ConflictingPluginFilters,

    #[error(transparent)]
    Gateway(#[from] notefmt_common::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
