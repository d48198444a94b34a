//! Plugin pipeline: an ordered, extensible set of semantic transforms
//! layered onto the compiled payload.
//!
//! Every hook receives the full invocation context and ignores what it
//! does not need. Registration order is significant: later plugins see
//! text already stripped of earlier plugins' inline syntax. The pipeline
//! is built once at startup and read-only afterwards, so concurrent
//! compiles never contend.

use {
    crate::note::{ParsedPayload, RawNote},
    async_trait::async_trait,
    notefmt_common::{ChatRef, IncomingMessage, LocaleStore, UserRef},
    regex::{Captures, Regex},
    thiserror::Error,
};

/// Per-invocation context shared by every hook.
pub struct PluginCtx<'a> {
    pub message: &'a IncomingMessage,
    pub chat: &'a ChatRef,
    pub user: Option<&'a UserRef>,
    pub locales: &'a dyn LocaleStore,
}

/// A plugin refused the note. Carries the user-facing message key; the
/// orchestrator resolves and dispatches it. The first failure aborts the
/// whole pipeline — no partial compiles are surfaced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("validation failed: {key}")]
pub struct ValidationFailure {
    pub key: &'static str,
}

impl ValidationFailure {
    #[must_use]
    pub fn new(key: &'static str) -> Self {
        Self { key }
    }
}

/// One semantic feature of the compiler (buttons, attachments, variables,
/// preview toggle). All hooks are optional; the defaults do nothing.
#[async_trait]
pub trait FormatPlugin: Send + Sync {
    fn name(&self) -> &'static str;

    /// Trigger pattern over the raw text. When present, `validate` runs
    /// once per match; when absent, exactly once with `None`.
    fn trigger(&self) -> Option<&Regex> {
        None
    }

    async fn validate(
        &self,
        _ctx: &PluginCtx<'_>,
        _note: &mut RawNote,
        _found: Option<&Captures<'_>>,
    ) -> Result<(), ValidationFailure> {
        Ok(())
    }

    async fn compile(&self, _ctx: &PluginCtx<'_>, _note: &RawNote, _payload: &mut ParsedPayload) {}

    async fn decompile(&self, _ctx: &PluginCtx<'_>, _note: &RawNote, _payload: &mut ParsedPayload) {
    }
}

/// Selects the plugin subset for one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PluginFilter {
    #[default]
    All,
    Include(Vec<String>),
    Exclude(Vec<String>),
}

impl PluginFilter {
    #[must_use]
    pub fn selects(&self, name: &str) -> bool {
        match self {
            Self::All => true,
            Self::Include(names) => names.iter().any(|n| n == name),
            Self::Exclude(names) => !names.iter().any(|n| n == name),
        }
    }
}

/// Ordered plugin set, populated once during process startup.
#[derive(Default)]
pub struct PluginPipeline {
    plugins: Vec<Box<dyn FormatPlugin>>,
}

impl PluginPipeline {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plugin: Box<dyn FormatPlugin>) {
        self.plugins.push(plugin);
    }

    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    /// Run `validate` hooks in registration order. Trigger-pattern plugins
    /// are invoked once per match over a snapshot of the note text (the
    /// plugin itself strips its syntax as it goes).
    pub async fn validate(
        &self,
        ctx: &PluginCtx<'_>,
        note: &mut RawNote,
        filter: &PluginFilter,
    ) -> Result<(), ValidationFailure> {
        for plugin in self.selected(filter) {
            match plugin.trigger() {
                Some(pattern) => {
                    let Some(snapshot) = note.text.clone() else {
                        continue;
                    };
                    for found in pattern.captures_iter(&snapshot) {
                        plugin.validate(ctx, note, Some(&found)).await?;
                    }
                }
                None => plugin.validate(ctx, note, None).await?,
            }
        }
        Ok(())
    }

    /// Run `compile` hooks in registration order. Compile hooks never
    /// abort; each owns disjoint payload fields.
    pub async fn compile(
        &self,
        ctx: &PluginCtx<'_>,
        note: &RawNote,
        payload: &mut ParsedPayload,
        filter: &PluginFilter,
    ) {
        for plugin in self.selected(filter) {
            plugin.compile(ctx, note, payload).await;
        }
    }

    /// Run `decompile` hooks in registration order, rehydrating plugin
    /// inline syntax into the payload text.
    pub async fn decompile(
        &self,
        ctx: &PluginCtx<'_>,
        note: &RawNote,
        payload: &mut ParsedPayload,
        filter: &PluginFilter,
    ) {
        for plugin in self.selected(filter) {
            plugin.decompile(ctx, note, payload).await;
        }
    }

    fn selected<'s>(&'s self, filter: &'s PluginFilter) -> impl Iterator<Item = &'s dyn FormatPlugin> {
        self.plugins
            .iter()
            .map(AsRef::as_ref)
            .filter(move |p| filter.selects(p.name()))
    }
}
