//! Restricted-HTML dialect → plain text + entities.
//!
//! Accepts a fixed tag allow-list (`b/strong`, `i/em`, `u`, `s/del/strike`,
//! `code`, `pre`, `a href`). A streaming scanner keeps a stack of open
//! tags; mismatched or unclosed tags are parse errors — the HTML path
//! fails closed where the markdown path degrades to literal text. That
//! asymmetry is deliberate and user-visible.

use {
    crate::entity::{Entity, EntityKind, decode_utf16, sort_entities, trim_whitespace},
    std::collections::HashMap,
    thiserror::Error,
};

/// Fatal parse failure. The offending offset is a UTF-16 code-unit index
/// into the input markup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unmatched end tag '</{tag}>' at offset {offset}")]
    UnexpectedEndTag { tag: String, offset: usize },

    #[error("unmatched end tag '</{tag}>', expected '</{expected}>' at offset {offset}")]
    MismatchedEndTag {
        tag: String,
        expected: String,
        offset: usize,
    },

    #[error("unclosed start tags '{}'", .tags.iter().map(|t| format!("<{t}>")).collect::<Vec<_>>().join(", "))]
    UnclosedTags { tags: Vec<String> },
}

fn entity_kind(tag: &str) -> Option<EntityKind> {
    match tag {
        "b" | "strong" => Some(EntityKind::Bold),
        "i" | "em" => Some(EntityKind::Italic),
        "u" => Some(EntityKind::Underline),
        "s" | "del" | "strike" => Some(EntityKind::Strikethrough),
        "code" => Some(EntityKind::Code),
        "pre" => Some(EntityKind::Pre),
        "a" => None, // resolved at close time, depends on the anchor text
        _ => None,
    }
}

fn is_known_tag(tag: &str) -> bool {
    matches!(
        tag,
        "b" | "strong" | "i" | "em" | "u" | "s" | "del" | "strike" | "code" | "pre" | "a"
    )
}

struct OpenTag {
    name: String,
    /// Output offset where the tag's span begins.
    start: usize,
    /// `href` of an `<a>` tag, or the captured language of a `<pre>`.
    meta: Option<String>,
    /// Whether this tag owns a pending entity (nested duplicates do not).
    owns_entity: bool,
}

struct RawTag {
    name: String,
    attrs: HashMap<String, String>,
    closing: bool,
    self_closing: bool,
    /// Chars consumed, including the angle brackets.
    consumed: usize,
}

/// Parse a tag at `chars[p]` (which must be `<`). `None` when the input
/// is not a well-formed tag — the `<` is then literal text.
fn scan_tag(chars: &[char], p: usize) -> Option<RawTag> {
    let mut q = p + 1;
    let closing = chars.get(q) == Some(&'/');
    if closing {
        q += 1;
    }

    let name_start = q;
    while chars.get(q).is_some_and(|c| c.is_ascii_alphanumeric()) {
        q += 1;
    }
    if q == name_start {
        return None;
    }
    let name: String = chars[name_start..q].iter().collect::<String>().to_lowercase();

    let mut attrs = HashMap::new();
    let mut self_closing = false;
    loop {
        while chars.get(q).is_some_and(|c| c.is_whitespace()) {
            q += 1;
        }
        match chars.get(q) {
            None => return None,
            Some('>') => {
                q += 1;
                break;
            }
            Some('/') if chars.get(q + 1) == Some(&'>') => {
                self_closing = true;
                q += 2;
                break;
            }
            Some(_) => {
                let attr_start = q;
                while chars
                    .get(q)
                    .is_some_and(|c| !c.is_whitespace() && *c != '=' && *c != '>' && *c != '/')
                {
                    q += 1;
                }
                if q == attr_start {
                    return None;
                }
                let attr_name: String =
                    chars[attr_start..q].iter().collect::<String>().to_lowercase();
                let mut value = String::new();
                if chars.get(q) == Some(&'=') {
                    q += 1;
                    match chars.get(q) {
                        Some(&quote @ ('"' | '\'')) => {
                            q += 1;
                            while let Some(&c) = chars.get(q) {
                                if c == quote {
                                    break;
                                }
                                value.push(c);
                                q += 1;
                            }
                            if chars.get(q) != Some(&quote) {
                                return None;
                            }
                            q += 1;
                        }
                        _ => {
                            while chars
                                .get(q)
                                .is_some_and(|c| !c.is_whitespace() && *c != '>')
                            {
                                value.push(chars[q]);
                                q += 1;
                            }
                        }
                    }
                }
                attrs.insert(attr_name, decode_charrefs(&value));
            }
        }
    }

    Some(RawTag {
        name,
        attrs,
        closing,
        self_closing,
        consumed: q - p,
    })
}

/// Decode the character references the dialect produces (`&amp;` `&lt;`
/// `&gt;` `&quot;` `&#39;` and numeric forms). Unknown references stay
/// literal.
fn decode_charrefs(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut p = 0;
    while p < chars.len() {
        if chars[p] == '&'
            && let Some((ch, used)) = scan_charref(&chars, p)
        {
            out.push(ch);
            p += used;
            continue;
        }
        out.push(chars[p]);
        p += 1;
    }
    out
}

fn scan_charref(chars: &[char], p: usize) -> Option<(char, usize)> {
    let semi = chars[p + 1..]
        .iter()
        .take(10)
        .position(|&c| c == ';')
        .map(|k| p + 1 + k)?;
    let body: String = chars[p + 1..semi].iter().collect();
    let ch = match body.as_str() {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        _ => {
            let code = if let Some(hex) = body.strip_prefix("#x").or_else(|| body.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok()?
            } else if let Some(dec) = body.strip_prefix('#') {
                dec.parse::<u32>().ok()?
            } else {
                return None;
            };
            char::from_u32(code)?
        }
    };
    Some((ch, semi - p + 1))
}

/// Parse the restricted HTML dialect, returning the stripped text plus
/// the entities that were found, sorted canonically.
pub fn parse_html(input: &str) -> Result<(String, Vec<Entity>), ParseError> {
    let chars: Vec<char> = input.chars().collect();
    let mut p = 0;
    let mut in_pos = 0usize; // UTF-16 offset into the input, for errors
    let mut out: Vec<u16> = Vec::new();
    let mut entities: Vec<Entity> = Vec::new();
    let mut stack: Vec<OpenTag> = Vec::new();

    while p < chars.len() {
        let ch = chars[p];

        if ch == '<'
            && let Some(tag) = scan_tag(&chars, p)
        {
            let tag_pos = in_pos;
            in_pos += chars[p..p + tag.consumed]
                .iter()
                .map(|c| c.len_utf16())
                .sum::<usize>();
            p += tag.consumed;

            if !is_known_tag(&tag.name) {
                // Foreign tags are consumed without effect; only the
                // allow-listed dialect participates in matching.
                continue;
            }

            if tag.closing {
                close_tag(&tag.name, tag_pos, &mut stack, &mut out, &mut entities)?;
            } else if !tag.self_closing {
                open_tag(tag, &mut stack, &out);
            }
            continue;
        }

        if ch == '&'
            && let Some((decoded, used)) = scan_charref(&chars, p)
        {
            in_pos += chars[p..p + used].iter().map(|c| c.len_utf16()).sum::<usize>();
            p += used;
            push_char(decoded, &mut out);
            continue;
        }

        in_pos += ch.len_utf16();
        p += 1;
        push_char(ch, &mut out);
    }

    if !stack.is_empty() {
        return Err(ParseError::UnclosedTags {
            tags: stack.iter().map(|t| t.name.clone()).collect(),
        });
    }

    let out = trim_whitespace(out, &mut entities);
    sort_entities(&mut entities);
    Ok((decode_utf16(&out), entities))
}

fn push_char(ch: char, out: &mut Vec<u16>) {
    let mut buf = [0u16; 2];
    out.extend_from_slice(ch.encode_utf16(&mut buf));
}

fn open_tag(tag: RawTag, stack: &mut Vec<OpenTag>, out: &[u16]) {
    let duplicate = stack.iter().any(|t| t.name == tag.name && t.owns_entity);
    let href = tag.attrs.get("href").cloned();
    let inside_pre = stack.iter().any(|t| t.name == "pre" && t.owns_entity);

    // `<code class="language-x">` inside `<pre>` only carries the block
    // language; it does not open a second entity.
    let owns_entity = match tag.name.as_str() {
        "a" => href.is_some() && !duplicate,
        "code" if inside_pre => false,
        _ => !duplicate,
    };

    let language = tag
        .attrs
        .get("class")
        .and_then(|class| class.strip_prefix("language-"))
        .map(str::to_string);

    let meta = if tag.name == "a" {
        href
    } else if tag.name == "pre" {
        language.clone()
    } else {
        None
    };

    stack.push(OpenTag {
        name: tag.name.clone(),
        start: out.len(),
        meta,
        owns_entity,
    });

    if tag.name == "code"
        && inside_pre
        && let Some(language) = language
        && let Some(pre) = stack
            .iter_mut()
            .rev()
            .find(|t| t.name == "pre" && t.owns_entity)
    {
        pre.meta = Some(language);
    }
}

fn close_tag(
    name: &str,
    tag_pos: usize,
    stack: &mut Vec<OpenTag>,
    out: &mut Vec<u16>,
    entities: &mut Vec<Entity>,
) -> Result<(), ParseError> {
    if !stack.iter().any(|t| t.name == name) {
        return Err(ParseError::UnexpectedEndTag {
            tag: name.to_string(),
            offset: tag_pos,
        });
    }
    let top = stack.last().map(|t| t.name.clone()).unwrap_or_default();
    if top != name {
        return Err(ParseError::MismatchedEndTag {
            tag: name.to_string(),
            expected: top,
            offset: tag_pos,
        });
    }

    let Some(open) = stack.pop() else {
        return Ok(());
    };
    if !open.owns_entity {
        return Ok(());
    }

    let mut length = out.len() - open.start;
    let entity = match open.name.as_str() {
        "a" => {
            let href = open.meta.unwrap_or_default();
            let anchor_text = decode_utf16(&out[open.start..]);
            if anchor_text == href {
                Entity::new(EntityKind::Url, open.start, length)
            } else if anchor_text.is_empty() {
                // Bare auto-link: substitute the href as the anchor text.
                let href_units: Vec<u16> = href.encode_utf16().collect();
                length = href_units.len();
                out.extend_from_slice(&href_units);
                Entity::new(EntityKind::Url, open.start, length)
            } else {
                Entity::new(EntityKind::TextLink, open.start, length).with_url(href)
            }
        }
        "pre" => {
            let mut e = Entity::new(EntityKind::Pre, open.start, length);
            e.language = Some(open.meta.unwrap_or_default());
            e
        }
        other => {
            let Some(kind) = entity_kind(other) else {
                return Ok(());
            };
            Entity::new(kind, open.start, length)
        }
    };
    entities.push(entity);
    Ok(())
}
