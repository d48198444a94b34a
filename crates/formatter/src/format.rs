//! The compile/decompile orchestrator. Owns the configuration and the
//! plugin pipeline, and runs the validate → parse → compile sequence on
//! the way out and the plugin-decompile → unparse sequence on the way
//! back in.
//!
//! Author mistakes never become errors: a refused note or broken markup
//! is answered in the chat and the call resolves to `Ok(None)`. `Err` is
//! reserved for caller misuse and gateway failures.

use {
    crate::{
        error::{Error, Result},
        gateway::NoteGateway,
        html::parse_html,
        markdown::parse_markdown,
        note::{ParseMode, ParsedPayload, RawNote},
        plugin::{PluginCtx, PluginFilter, PluginPipeline},
        plugins::{self, ButtonRegistry},
        unparse::{escape_html, unparse_html, unparse_markdown},
        FormatterConfig,
    },
    notefmt_common::{resolve_string, ChatRef, IncomingMessage, LocaleStore, MessageHandle, UserRef},
    once_cell::sync::Lazy,
    regex::Regex,
    std::sync::Arc,
    tracing::debug,
};

#[allow(clippy::expect_used)]
static PARSE_MODE_DIRECTIVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"%PARSEMODE_(\w+)\s?").expect("valid parse mode directive pattern"));

/// Everything one format/decompile/send call needs from the host.
pub struct FormatCtx<'a> {
    pub message: &'a IncomingMessage,
    pub chat: &'a ChatRef,
    pub user: Option<&'a UserRef>,
    pub locales: &'a dyn LocaleStore,
    pub gateway: &'a dyn NoteGateway,
}

impl<'a> FormatCtx<'a> {
    fn plugin_ctx(&self) -> PluginCtx<'a> {
        PluginCtx {
            message: self.message,
            chat: self.chat,
            user: self.user,
            locales: self.locales,
        }
    }
}

/// Strip the first `%PARSEMODE_X` directive and return the mode it named.
/// Directives naming no known mode are left in the text.
fn extract_parse_mode(text: &str) -> (String, Option<ParseMode>) {
    let Some(caps) = PARSE_MODE_DIRECTIVE.captures(text) else {
        return (text.to_string(), None);
    };
    let mode = match caps[1].to_ascii_lowercase().as_str() {
        "md" | "markdown" => ParseMode::Md,
        "html" => ParseMode::Html,
        "none" => ParseMode::None,
        _ => return (text.to_string(), None),
    };
    (text.replacen(&caps[0], "", 1), Some(mode))
}

pub struct Formatter {
    config: FormatterConfig,
    pipeline: PluginPipeline,
}

impl Formatter {
    #[must_use]
    pub fn new(config: FormatterConfig, pipeline: PluginPipeline) -> Self {
        Self { config, pipeline }
    }

    /// Formatter with the bundled plugins and button kinds.
    #[must_use]
    pub fn with_default_pipeline(config: FormatterConfig) -> Self {
        let registry = Arc::new(ButtonRegistry::with_builtin());
        let pipeline = plugins::default_pipeline(registry, config.caption_limit);
        Self::new(config, pipeline)
    }

    fn filter(
        excluded_plugins: Option<&[&str]>,
        included_plugins: Option<&[&str]>,
    ) -> Result<PluginFilter> {
        match (excluded_plugins, included_plugins) {
            (Some(_), Some(_)) => Err(Error::ConflictingPluginFilters),
            (Some(excluded), None) => Ok(PluginFilter::Exclude(
                excluded.iter().map(ToString::to_string).collect(),
            )),
            (None, Some(included)) => Ok(PluginFilter::Include(
                included.iter().map(ToString::to_string).collect(),
            )),
            (None, None) => Ok(PluginFilter::All),
        }
    }

    /// Validate and parse authored markup into a storable note. Author
    /// errors are answered in the chat and yield `Ok(None)`.
    pub async fn build_note(
        &self,
        ctx: &FormatCtx<'_>,
        text: Option<&str>,
        explicit_mode: Option<ParseMode>,
        excluded_plugins: Option<&[&str]>,
        included_plugins: Option<&[&str]>,
    ) -> Result<Option<RawNote>> {
        let filter = Self::filter(excluded_plugins, included_plugins)?;

        let mut note = RawNote::default();
        let mut mode = explicit_mode;
        if let Some(text) = text {
            let (stripped, inline_mode) = extract_parse_mode(text);
            if mode.is_none() {
                mode = inline_mode;
            }
            note.text = Some(stripped);
        }
        let mode = mode.unwrap_or(self.config.default_parse_mode);
        note.parse_mode = Some(mode);

        let plugin_ctx = ctx.plugin_ctx();
        if let Err(failure) = self.pipeline.validate(&plugin_ctx, &mut note, &filter).await {
            debug!(key = failure.key, "note refused during validation");
            let reply = resolve_string(ctx.locales, failure.key, ctx.chat.id).await;
            ctx.gateway.reply_text(ctx.message, &reply).await?;
            return Ok(None);
        }

        if let Some(text) = note.text.take() {
            let (plain, entities) = match mode {
                ParseMode::Md => parse_markdown(&text),
                ParseMode::Html => match parse_html(&text) {
                    Ok(parsed) => parsed,
                    Err(err) => {
                        debug!(error = %err, "note markup failed to parse");
                        let reply = format!("Unable to compile: {}", escape_html(&err.to_string()));
                        ctx.gateway.reply_text(ctx.message, &reply).await?;
                        return Ok(None);
                    }
                },
                ParseMode::None => (text, Vec::new()),
            };
            note.text = Some(plain);
            note.entities = entities;
        }
        Ok(Some(note))
    }

    /// Compile a stored note into the platform payload. Runs every
    /// plugin's `compile` hook over a fresh payload seeded with the note
    /// text and entities.
    pub async fn compile_note(&self, ctx: &FormatCtx<'_>, note: &RawNote) -> ParsedPayload {
        let mut payload = ParsedPayload {
            text: note.text.clone(),
            entities: note.entities.clone(),
            ..ParsedPayload::default()
        };
        let plugin_ctx = ctx.plugin_ctx();
        self.pipeline
            .compile(&plugin_ctx, note, &mut payload, &PluginFilter::All)
            .await;
        payload
    }

    /// The full authoring path: validate, parse, compile. `Ok(None)`
    /// means the author already got an explanation in the chat.
    pub async fn format(
        &self,
        ctx: &FormatCtx<'_>,
        text: Option<&str>,
        explicit_mode: Option<ParseMode>,
        excluded_plugins: Option<&[&str]>,
        included_plugins: Option<&[&str]>,
    ) -> Result<Option<ParsedPayload>> {
        let Some(note) = self
            .build_note(ctx, text, explicit_mode, excluded_plugins, included_plugins)
            .await?
        else {
            return Ok(None);
        };
        Ok(Some(self.compile_note(ctx, &note).await))
    }

    /// Render a stored note back into editable markup in its own dialect.
    pub async fn decompile(&self, ctx: &FormatCtx<'_>, note: &RawNote) -> String {
        let mut payload = ParsedPayload {
            text: Some(note.text.clone().unwrap_or_default()),
            ..ParsedPayload::default()
        };
        let plugin_ctx = ctx.plugin_ctx();
        self.pipeline
            .decompile(&plugin_ctx, note, &mut payload, &PluginFilter::All)
            .await;
        let text = payload.text.unwrap_or_default();
        match note.parse_mode.unwrap_or(self.config.default_parse_mode) {
            ParseMode::Md => unparse_markdown(&text, &note.entities),
            ParseMode::Html => unparse_html(&text, &note.entities),
            ParseMode::None => text,
        }
    }

    /// Deliver a stored note. `noformat` sends the raw markup rendition
    /// instead of the compiled payload, for authors inspecting a note.
    pub async fn send(
        &self,
        ctx: &FormatCtx<'_>,
        note: &RawNote,
        reply_to: Option<i64>,
        noformat: bool,
    ) -> Result<MessageHandle> {
        let mut payload = if noformat {
            ParsedPayload {
                text: Some(self.decompile(ctx, note).await),
                document: note.document.clone(),
                disable_link_preview: true,
                ..ParsedPayload::default()
            }
        } else {
            self.compile_note(ctx, note).await
        };
        if payload.text.as_deref().is_none_or(str::is_empty) && payload.document.is_none() {
            payload.text = Some(self.config.fallback_text.clone());
        }
        let handle = ctx.gateway.send_note(ctx.chat.id, &payload, reply_to).await?;
        Ok(handle)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        super::*,
        crate::{entity::EntityKind, plugin::test_support::NULL_LOCALES},
        async_trait::async_trait,
        notefmt_common::{Attachment, AttachmentKind},
        rstest::rstest,
        std::sync::Mutex,
    };

    /// Records every outgoing call instead of talking to a platform.
    #[derive(Default)]
    struct RecordingGateway {
        sent: Mutex<Vec<ParsedPayload>>,
        replies: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl NoteGateway for RecordingGateway {
        async fn send_note(
            &self,
            _chat_id: i64,
            payload: &ParsedPayload,
            _reply_to: Option<i64>,
        ) -> notefmt_common::Result<MessageHandle> {
            self.sent.lock().unwrap().push(payload.clone());
            Ok(MessageHandle {
                chat_id: 1,
                message_id: 1,
            })
        }

        async fn reply_text(
            &self,
            _message: &IncomingMessage,
            text: &str,
        ) -> notefmt_common::Result<MessageHandle> {
            self.replies.lock().unwrap().push(text.to_string());
            Ok(MessageHandle {
                chat_id: 1,
                message_id: 2,
            })
        }
    }

    struct Fixture {
        message: IncomingMessage,
        gateway: RecordingGateway,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                message: IncomingMessage::new(ChatRef::new(7)),
                gateway: RecordingGateway::default(),
            }
        }

        fn with_photo() -> Self {
            let mut fixture = Self::new();
            fixture.message.attachment = Some(Attachment {
                kind: AttachmentKind::Photo,
                file_id: "photo-1".to_string(),
            });
            fixture
        }

        fn ctx(&self) -> FormatCtx<'_> {
            FormatCtx {
                message: &self.message,
                chat: &self.message.chat,
                user: None,
                locales: &NULL_LOCALES,
                gateway: &self.gateway,
            }
        }
    }

    fn formatter() -> Formatter {
        Formatter::with_default_pipeline(FormatterConfig::default())
    }

    #[rstest]
    #[case("%PARSEMODE_MD rest", Some(ParseMode::Md), "rest")]
    #[case("%PARSEMODE_html rest", Some(ParseMode::Html), "rest")]
    #[case("%PARSEMODE_NONE rest", Some(ParseMode::None), "rest")]
    #[case("%PARSEMODE_bogus rest", None, "%PARSEMODE_bogus rest")]
    #[case("no directive", None, "no directive")]
    fn parse_mode_directive_extraction(
        #[case] input: &str,
        #[case] mode: Option<ParseMode>,
        #[case] rest: &str,
    ) {
        let (text, found) = extract_parse_mode(input);
        assert_eq!(found, mode);
        assert_eq!(text, rest);
    }

    #[tokio::test]
    async fn both_filters_is_a_caller_error() {
        let fixture = Fixture::new();
        let err = formatter()
            .format(
                &fixture.ctx(),
                Some("x"),
                None,
                Some(&["buttons"]),
                Some(&["preview"]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConflictingPluginFilters));
    }

    #[tokio::test]
    async fn markdown_text_compiles_to_entities() {
        let fixture = Fixture::new();
        let payload = formatter()
            .format(
                &fixture.ctx(),
                Some("%PARSEMODE_MD **bold** plain"),
                None,
                None,
                None,
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payload.text.as_deref(), Some("bold plain"));
        assert_eq!(payload.entities.len(), 1);
        assert_eq!(payload.entities[0].kind, EntityKind::Bold);
        assert!(!payload.disable_link_preview);
    }

    #[tokio::test]
    async fn preview_directive_turns_the_link_preview_off() {
        let fixture = Fixture::new();
        let ctx = fixture.ctx();
        let f = formatter();

        let payload = f
            .format(&ctx, Some("see https://e.co"), None, None, None)
            .await
            .unwrap()
            .unwrap();
        assert!(!payload.disable_link_preview);

        let payload = f
            .format(&ctx, Some("see https://e.co %PREVIEW"), None, None, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payload.text.as_deref(), Some("see https://e.co"));
        assert!(payload.disable_link_preview);
    }

    #[tokio::test]
    async fn explicit_mode_beats_the_inline_directive() {
        let fixture = Fixture::new();
        let payload = formatter()
            .format(
                &fixture.ctx(),
                Some("%PARSEMODE_MD **kept**"),
                Some(ParseMode::None),
                None,
                None,
            )
            .await
            .unwrap()
            .unwrap();
        // The directive is still stripped, but markdown is not parsed.
        assert_eq!(payload.text.as_deref(), Some("**kept**"));
        assert!(payload.entities.is_empty());
    }

    #[tokio::test]
    async fn broken_html_is_answered_not_propagated() {
        let fixture = Fixture::new();
        let got = formatter()
            .format(&fixture.ctx(), Some("<b>unclosed"), None, None, None)
            .await
            .unwrap();
        assert!(got.is_none());
        let replies = fixture.gateway.replies.lock().unwrap();
        assert_eq!(replies.len(), 1);
        assert!(replies[0].starts_with("Unable to compile:"));
    }

    #[tokio::test]
    async fn refused_note_is_answered_with_the_message_key() {
        // Empty note, no attachment: the document plugin refuses it and
        // the bare locale store falls back to the raw key.
        let fixture = Fixture::new();
        let got = formatter()
            .format(&fixture.ctx(), None, None, None, None)
            .await
            .unwrap();
        assert!(got.is_none());
        let replies = fixture.gateway.replies.lock().unwrap();
        assert_eq!(replies.as_slice(), ["invalid_document"]);
    }

    #[tokio::test]
    async fn buttons_are_stripped_and_compiled_into_markup() {
        let fixture = Fixture::new();
        let payload = formatter()
            .format(
                &fixture.ctx(),
                Some("Rules here\n[Open](url://e.co) [More](note:extra:same)"),
                None,
                None,
                None,
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payload.text.as_deref(), Some("Rules here"));
        let layout = payload.reply_markup.unwrap();
        assert_eq!(layout.rows.len(), 1);
        assert_eq!(layout.rows[0].len(), 2);
        assert_eq!(layout.rows[0][0].url.as_deref(), Some("e.co"));
        assert_eq!(layout.rows[0][1].callback_data.as_deref(), Some("note:extra"));
    }

    #[tokio::test]
    async fn buttons_are_stripped_before_variables_scan() {
        // The button is removed during validation, so interpolation only
        // sees the remaining text; the button label stays literal.
        let mut fixture = Fixture::new();
        fixture.message.from = Some(UserRef {
            id: 42,
            first_name: "Ann".to_string(),
            last_name: None,
            username: None,
        });
        let payload = formatter()
            .format(
                &fixture.ctx(),
                Some("hi {first}\n[{first}](url://e.co)"),
                Some(ParseMode::None),
                None,
                None,
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payload.text.as_deref(), Some("hi Ann\n"));
        let layout = payload.reply_markup.unwrap();
        assert_eq!(layout.rows[0][0].text, "{first}");
    }

    #[tokio::test]
    async fn markdown_links_survive_the_button_pass() {
        let fixture = Fixture::new();
        let payload = formatter()
            .format(
                &fixture.ctx(),
                Some("%PARSEMODE_MD [docs](https://e.co)"),
                None,
                None,
                None,
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payload.text.as_deref(), Some("docs"));
        assert_eq!(payload.entities.len(), 1);
        assert_eq!(payload.entities[0].kind, EntityKind::TextLink);
        assert!(payload.reply_markup.is_none());
    }

    #[tokio::test]
    async fn attachment_rides_through_to_the_payload() {
        let fixture = Fixture::with_photo();
        let payload = formatter()
            .format(&fixture.ctx(), Some("caption"), None, None, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            payload.document.as_ref().map(|d| d.file_id.as_str()),
            Some("photo-1")
        );
    }

    #[tokio::test]
    async fn decompile_rehydrates_markup_and_button_syntax() {
        let fixture = Fixture::new();
        let ctx = fixture.ctx();
        let f = formatter();
        let note = f
            .build_note(
                &ctx,
                Some("%PARSEMODE_MD **hi**\n[Open](url://e.co)"),
                None,
                None,
                None,
            )
            .await
            .unwrap()
            .unwrap();
        let markup = f.decompile(&ctx, &note).await;
        assert_eq!(markup, "**hi**\n[Open](url:e.co)");
    }

    #[tokio::test]
    async fn empty_compiled_note_sends_the_fallback_text() {
        let fixture = Fixture::with_photo();
        let ctx = fixture.ctx();
        let f = formatter();
        let mut note = f
            .build_note(&ctx, Some("caption"), None, None, None)
            .await
            .unwrap()
            .unwrap();
        note.text = None;
        note.document = None;
        f.send(&ctx, &note, None, false).await.unwrap();
        let sent = fixture.gateway.sent.lock().unwrap();
        assert_eq!(sent[0].text.as_deref(), Some("404"));
    }

    #[tokio::test]
    async fn noformat_sends_the_markup_rendition() {
        let fixture = Fixture::new();
        let ctx = fixture.ctx();
        let f = formatter();
        let note = f
            .build_note(&ctx, Some("<b>hi</b> %PREVIEW"), None, None, None)
            .await
            .unwrap()
            .unwrap();
        f.send(&ctx, &note, None, true).await.unwrap();
        let sent = fixture.gateway.sent.lock().unwrap();
        assert_eq!(sent[0].text.as_deref(), Some("<b>hi</b>\n%PREVIEW"));
    }
}
