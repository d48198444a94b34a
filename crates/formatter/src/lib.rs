//! Bidirectional note formatting: authored markup (markdown or HTML) in,
//! plain text plus UTF-16 styled entities out, and back again.
//!
//! The [`Formatter`] orchestrates the whole path; the plugin pipeline
//! layers buttons, attachments, the preview toggle and variable
//! substitution on top of the text compiler.

pub mod config;
pub mod entity;
pub mod error;
pub mod format;
pub mod gateway;
pub mod html;
pub mod markdown;
pub mod note;
pub mod plugin;
pub mod plugins;
pub mod unparse;

pub use {
    config::FormatterConfig,
    entity::{Entity, EntityKind, SplitPolicy},
    error::{Error, Result},
    format::{FormatCtx, Formatter},
    gateway::NoteGateway,
    html::{parse_html, ParseError},
    markdown::parse_markdown,
    note::{ButtonLayout, ButtonSpec, InlineButton, ParseMode, ParsedPayload, RawNote},
    plugin::{FormatPlugin, PluginCtx, PluginFilter, PluginPipeline, ValidationFailure},
    plugins::{ButtonKind, ButtonRegistry},
    unparse::{unparse_html, unparse_markdown},
};
