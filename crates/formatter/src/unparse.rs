//! Entity → markup rendering, the inverse of the parsers.
//!
//! Used by the decompile/edit path to show an author re-editable source
//! markup. Entities may nest but never partially overlap, so rendering is
//! a recursion: contained entities are emitted before the parent closes.
//!
//! Markdown output is NOT escaped — a literal `**` in content is
//! indistinguishable from markup on re-parse. That ambiguity matches the
//! source dialect and is deliberately left alone.

use crate::entity::{Entity, EntityKind, decode_utf16, encode_utf16, sort_entities};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Style {
    Markdown,
    Html,
}

/// Render text + entities back into the markdown dialect.
#[must_use]
pub fn unparse_markdown(text: &str, entities: &[Entity]) -> String {
    unparse(text, entities, Style::Markdown)
}

/// Render text + entities back into the HTML dialect. `&`, `<`, `>` are
/// escaped in literal text but never inside emitted tag syntax.
#[must_use]
pub fn unparse_html(text: &str, entities: &[Entity]) -> String {
    unparse(text, entities, Style::Html)
}

fn unparse(text: &str, entities: &[Entity], style: Style) -> String {
    let units = encode_utf16(text);
    let mut sorted: Vec<Entity> = entities
        .iter()
        .filter(|e| e.length > 0 && e.end() <= units.len())
        .cloned()
        .collect();
    sort_entities(&mut sorted);

    let mut out = String::with_capacity(text.len());
    render(&units, 0, units.len(), &sorted, style, &mut out);
    out
}

fn render(units: &[u16], start: usize, end: usize, ents: &[Entity], style: Style, out: &mut String) {
    let mut pos = start;
    let mut idx = 0;

    while idx < ents.len() {
        let entity = &ents[idx];

        // Entities fully inside this one are its children; the canonical
        // sort guarantees they follow it directly.
        let mut next = idx + 1;
        while next < ents.len() && ents[next].offset < entity.end() {
            next += 1;
        }

        literal(units, pos, entity.offset, style, out);
        open_marker(entity, style, out);
        render(units, entity.offset, entity.end(), &ents[idx + 1..next], style, out);
        close_marker(entity, style, out);

        pos = entity.end();
        idx = next;
    }

    literal(units, pos, end, style, out);
}

fn literal(units: &[u16], from: usize, to: usize, style: Style, out: &mut String) {
    if from >= to {
        return;
    }
    let text = decode_utf16(&units[from..to]);
    match style {
        Style::Markdown => out.push_str(&text),
        Style::Html => out.push_str(&escape_html(&text)),
    }
}

fn open_marker(entity: &Entity, style: Style, out: &mut String) {
    match style {
        Style::Markdown => match entity.kind {
            EntityKind::TextLink => out.push('['),
            kind => {
                if let Some(delim) = markdown_delimiter(kind) {
                    out.push_str(delim);
                }
            }
        },
        Style::Html => match entity.kind {
            EntityKind::Bold => out.push_str("<b>"),
            EntityKind::Italic => out.push_str("<i>"),
            EntityKind::Underline => out.push_str("<u>"),
            EntityKind::Strikethrough => out.push_str("<s>"),
            EntityKind::Code => out.push_str("<code>"),
            EntityKind::Pre => match entity.language.as_deref() {
                Some(language) if !language.is_empty() => {
                    out.push_str("<pre><code class=\"language-");
                    out.push_str(&escape_attr(language));
                    out.push_str("\">");
                }
                _ => out.push_str("<pre>"),
            },
            EntityKind::TextLink => {
                out.push_str("<a href=\"");
                out.push_str(&escape_attr(entity.url.as_deref().unwrap_or_default()));
                out.push_str("\">");
            }
            _ => {}
        },
    }
}

fn close_marker(entity: &Entity, style: Style, out: &mut String) {
    match style {
        Style::Markdown => match entity.kind {
            EntityKind::TextLink => {
                out.push_str("](");
                out.push_str(entity.url.as_deref().unwrap_or_default());
                out.push(')');
            }
            kind => {
                if let Some(delim) = markdown_delimiter(kind) {
                    out.push_str(delim);
                }
            }
        },
        Style::Html => match entity.kind {
            EntityKind::Bold => out.push_str("</b>"),
            EntityKind::Italic => out.push_str("</i>"),
            EntityKind::Underline => out.push_str("</u>"),
            EntityKind::Strikethrough => out.push_str("</s>"),
            EntityKind::Code => out.push_str("</code>"),
            EntityKind::Pre => match entity.language.as_deref() {
                Some(language) if !language.is_empty() => out.push_str("</code></pre>"),
                _ => out.push_str("</pre>"),
            },
            EntityKind::TextLink => out.push_str("</a>"),
            _ => {}
        },
    }
}

fn markdown_delimiter(kind: EntityKind) -> Option<&'static str> {
    match kind {
        EntityKind::Bold => Some("**"),
        EntityKind::Italic => Some("__"),
        EntityKind::Underline => Some("++"),
        EntityKind::Strikethrough => Some("~~"),
        EntityKind::Code => Some("`"),
        EntityKind::Pre => Some("```"),
        _ => None,
    }
}

pub(crate) fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(value: &str) -> String {
    escape_html(value).replace('"', "&quot;")
}
