//! `{variable}` interpolation: compile-time substitution of sender and
//! chat properties into the note text.
//!
//! Runs on the compiled payload, after parsing, so every replacement has
//! to keep the styled-entity offsets in step with the text edits. Unknown
//! variable names are left in the text verbatim.

use {
    crate::{
        entity::{shift_entities, Entity, EntityKind, SplitPolicy},
        note::{ParsedPayload, RawNote},
        plugin::{FormatPlugin, PluginCtx},
    },
    async_trait::async_trait,
    notefmt_common::{UserRef, DEFAULT_LOCALE},
    once_cell::sync::Lazy,
    regex::Regex,
};

#[allow(clippy::expect_used)]
static VARIABLE_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{(\w+)\}").expect("valid variable token pattern"));

pub struct Variables;

/// A resolved variable value. Mentions carry the user id so the
/// substitution can attach a profile link entity over the inserted label.
enum Resolved {
    Text(String),
    Mention { label: String, user_id: i64 },
}

fn utf16_len(text: &str) -> usize {
    text.encode_utf16().count()
}

impl Variables {
    async fn resolve(&self, ctx: &PluginCtx<'_>, name: &str) -> Option<Resolved> {
        let user = ctx.user.or(ctx.message.from.as_ref());
        let value = match name {
            "first" => Resolved::Text(user?.first_name.clone()),
            "last" => Resolved::Text(user?.last_name.clone().unwrap_or_default()),
            "fullname" => {
                let user = user?;
                let mut full = user.first_name.clone();
                if let Some(last) = &user.last_name {
                    full.push(' ');
                    full.push_str(last);
                }
                Resolved::Text(full)
            }
            "id" => Resolved::Text(user?.id.to_string()),
            "username" => match user? {
                UserRef {
                    username: Some(username),
                    ..
                } => Resolved::Text(format!("@{username}")),
                user => Resolved::Mention {
                    label: user.first_name.clone(),
                    user_id: user.id,
                },
            },
            "mention" => {
                let user = user?;
                Resolved::Mention {
                    label: user.first_name.clone(),
                    user_id: user.id,
                }
            }
            "chatid" => Resolved::Text(ctx.chat.id.to_string()),
            "chatname" => Resolved::Text(
                ctx.chat
                    .title
                    .clone()
                    .unwrap_or_else(|| ctx.chat.id.to_string()),
            ),
            "chatnick" => Resolved::Text(
                ctx.chat
                    .username
                    .clone()
                    .unwrap_or_else(|| ctx.chat.id.to_string()),
            ),
            "language_code" => Resolved::Text(
                ctx.locales
                    .chat_locale(ctx.chat.id)
                    .await
                    .unwrap_or_else(|| DEFAULT_LOCALE.to_string()),
            ),
            _ => return None,
        };
        Some(value)
    }
}

#[async_trait]
impl FormatPlugin for Variables {
    fn name(&self) -> &'static str {
        "variables"
    }

    async fn compile(&self, ctx: &PluginCtx<'_>, _note: &RawNote, payload: &mut ParsedPayload) {
        let Some(text) = payload.text.take() else {
            return;
        };

        let mut out = String::with_capacity(text.len());
        // UTF-16 length of `out`, which is also the position of the next
        // token in the edited coordinate space.
        let mut out_units = 0usize;
        let mut tail = 0usize;

        for caps in VARIABLE_TOKEN.captures_iter(&text) {
            let Some(token) = caps.get(0) else { continue };
            let Some(resolved) = self.resolve(ctx, &caps[1]).await else {
                continue;
            };

            let literal = &text[tail..token.start()];
            out.push_str(literal);
            out_units += utf16_len(literal);

            let (value, link) = match resolved {
                Resolved::Text(value) => (value, None),
                Resolved::Mention { label, user_id } => {
                    (label, Some(format!("tg://user?id={user_id}")))
                }
            };
            let value_units = utf16_len(&value);
            let token_units = utf16_len(token.as_str());
            shift_entities(
                &mut payload.entities,
                out_units,
                value_units as isize - token_units as isize,
                SplitPolicy::Full,
            );
            if let Some(url) = link {
                payload.entities.push(
                    Entity::new(EntityKind::TextLink, out_units, value_units).with_url(url),
                );
            }
            out.push_str(&value);
            out_units += value_units;
            tail = token.end();
        }
        out.push_str(&text[tail..]);
        payload.text = Some(out);
    }
}
