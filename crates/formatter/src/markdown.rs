//! Delimiter-based markdown dialect → plain text + entities.
//!
//! The dialect is fixed: `**bold**`, `__italic__`, `++underline++`,
//! `~~strikethrough~~`, `` `code` ``, ```` ```pre``` ```` and inline links
//! `[label](url)`. Unterminated delimiters degrade to literal text — the
//! markdown path never fails, unlike the HTML path.
//!
//! All offset math happens on UTF-16 code units so emoji and other
//! astral-plane characters do not corrupt entity positions.

use crate::entity::{
    Entity, EntityKind, SplitPolicy, decode_utf16, encode_utf16, shift_entities, sort_entities,
    trim_whitespace,
};

/// Longest delimiter first so ``` is never read as a single back-tick.
const DELIMITERS: &[(&str, EntityKind)] = &[
    ("```", EntityKind::Pre),
    ("**", EntityKind::Bold),
    ("__", EntityKind::Italic),
    ("~~", EntityKind::Strikethrough),
    ("++", EntityKind::Underline),
    ("`", EntityKind::Code),
];

fn matches_at(text: &[u16], at: usize, pat: &str) -> bool {
    pat.bytes()
        .enumerate()
        .all(|(k, b)| text.get(at + k).copied() == Some(u16::from(b)))
}

fn find_from(text: &[u16], pat: &str, from: usize) -> Option<usize> {
    if from > text.len() {
        return None;
    }
    (from..=text.len().saturating_sub(pat.len())).find(|&i| matches_at(text, i, pat))
}

fn unit_is(text: &[u16], at: usize, ch: char) -> bool {
    text.get(at).copied() == Some(ch as u16)
}

struct LinkMatch {
    /// One past the closing `)`.
    end: usize,
    label: Vec<u16>,
    url: Vec<u16>,
}

/// Match `[label](url)` starting exactly at `i`. Label is the shortest
/// non-empty run followed by `](`, the url the shortest non-empty run up
/// to `)` with no newline inside.
fn match_link(text: &[u16], i: usize) -> Option<LinkMatch> {
    if !unit_is(text, i, '[') {
        return None;
    }
    let mut j = i + 2;
    while j + 1 < text.len() {
        if unit_is(text, j, ']') && unit_is(text, j + 1, '(') {
            let mut k = j + 3;
            while k < text.len() {
                if unit_is(text, k, '\n') {
                    break;
                }
                if unit_is(text, k, ')') {
                    return Some(LinkMatch {
                        end: k + 1,
                        label: text[i + 1..j].to_vec(),
                        url: text[j + 2..k].to_vec(),
                    });
                }
                k += 1;
            }
        }
        j += 1;
    }
    None
}

/// Parse the markdown dialect, returning the stripped text plus the
/// entities that were found, sorted canonically.
pub fn parse_markdown(input: &str) -> (String, Vec<Entity>) {
    let mut text = encode_utf16(input);
    let mut entities: Vec<Entity> = Vec::new();
    let mut i = 0;

    while i < text.len() {
        let delim = DELIMITERS
            .iter()
            .find(|(d, _)| matches_at(&text, i, d))
            .copied();

        if let Some((delim, kind)) = delim {
            let len = delim.len();
            // +1 so an empty span like "****" never closes itself.
            if let Some(end) = find_from(&text, delim, i + len + 1) {
                text.drain(end..end + len);
                text.drain(i..i + len);

                shift_entities(&mut entities, i, -(2 * len as isize), SplitPolicy::Full);

                let mut entity = Entity::new(kind, i, end - i - len);
                if kind == EntityKind::Pre {
                    // The dialect has no fence-info syntax.
                    entity.language = Some(String::new());
                }
                entities.push(entity);

                // No nested entities inside fixed-width spans.
                if matches!(kind, EntityKind::Code | EntityKind::Pre) {
                    i = end - len;
                }
                continue;
            }
        } else if let Some(link) = match_link(&text, i) {
            let label_len = link.label.len();
            let delta = label_len as isize - (link.end - i) as isize;

            text.splice(i..link.end, link.label.iter().copied());
            shift_entities(&mut entities, i, delta, SplitPolicy::Half);

            let url = decode_utf16(&link.url);
            let entity = if link.label == link.url {
                Entity::new(EntityKind::Url, i, label_len)
            } else {
                Entity::new(EntityKind::TextLink, i, label_len).with_url(url)
            };
            entities.push(entity);

            i += label_len;
            continue;
        }

        i += 1;
    }

    let text = trim_whitespace(text, &mut entities);
    sort_entities(&mut entities);
    (decode_utf16(&text), entities)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case("**bold**", "bold", EntityKind::Bold)]
    #[case("__italic__", "italic", EntityKind::Italic)]
    #[case("++under++", "under", EntityKind::Underline)]
    #[case("~~strike~~", "strike", EntityKind::Strikethrough)]
    #[case("`mono`", "mono", EntityKind::Code)]
    #[case("```block```", "block", EntityKind::Pre)]
    fn single_delimiter(#[case] input: &str, #[case] text: &str, #[case] kind: EntityKind) {
        let (out, ents) = parse_markdown(input);
        assert_eq!(out, text);
        assert_eq!(ents.len(), 1);
        assert_eq!(ents[0].kind, kind);
        assert_eq!(ents[0].offset, 0);
        assert_eq!(ents[0].length, text.encode_utf16().count());
    }

    #[test]
    fn nested_delimiters_shrink_outer_entity() {
        let (out, ents) = parse_markdown("**bold __it__**");
        assert_eq!(out, "bold it");
        assert_eq!(ents.len(), 2);
        assert_eq!(ents[0], Entity::new(EntityKind::Bold, 0, 7));
        assert_eq!(ents[1], Entity::new(EntityKind::Italic, 5, 2));
    }

    #[test]
    fn nested_delimiter_at_span_start_shrinks_outer_entity() {
        let (out, ents) = parse_markdown("**__x__ y**");
        assert_eq!(out, "x y");
        assert_eq!(ents.len(), 2);
        assert_eq!(ents[0], Entity::new(EntityKind::Bold, 0, 3));
        assert_eq!(ents[1], Entity::new(EntityKind::Italic, 0, 1));
        let total = out.encode_utf16().count();
        for e in &ents {
            assert!(e.end() <= total);
        }
    }

    #[test]
    fn emoji_offsets_are_utf16() {
        let (out, ents) = parse_markdown("😀**x**");
        assert_eq!(out, "😀x");
        assert_eq!(ents.len(), 1);
        assert_eq!(ents[0].offset, 2);
        assert_eq!(ents[0].length, 1);
    }

    #[test]
    fn unterminated_delimiter_degrades_to_plain_text() {
        let (out, ents) = parse_markdown("**bold");
        assert_eq!(out, "**bold");
        assert!(ents.is_empty());
    }

    #[test]
    fn empty_span_does_not_match_itself() {
        let (out, ents) = parse_markdown("****");
        assert_eq!(out, "****");
        assert!(ents.is_empty());
    }

    #[test]
    fn no_nesting_inside_code() {
        let (out, ents) = parse_markdown("`**not bold**`");
        assert_eq!(out, "**not bold**");
        assert_eq!(ents.len(), 1);
        assert_eq!(ents[0].kind, EntityKind::Code);
        assert_eq!(ents[0].length, 12);
    }

    #[test]
    fn pre_block_records_empty_language() {
        let (_, ents) = parse_markdown("```let x = 1;```");
        assert_eq!(ents[0].kind, EntityKind::Pre);
        assert_eq!(ents[0].language.as_deref(), Some(""));
    }

    #[test]
    fn inline_link_becomes_text_link() {
        let (out, ents) = parse_markdown("see [docs](https://example.com) now");
        assert_eq!(out, "see docs now");
        assert_eq!(ents.len(), 1);
        assert_eq!(ents[0].kind, EntityKind::TextLink);
        assert_eq!(ents[0].offset, 4);
        assert_eq!(ents[0].length, 4);
        assert_eq!(ents[0].url.as_deref(), Some("https://example.com"));
    }

    #[test]
    fn bare_autolink_becomes_url_entity() {
        let (out, ents) = parse_markdown("[https://example.com](https://example.com)");
        assert_eq!(out, "https://example.com");
        assert_eq!(ents.len(), 1);
        assert_eq!(ents[0].kind, EntityKind::Url);
        assert!(ents[0].url.is_none());
    }

    #[test]
    fn link_after_styled_text_keeps_offsets_valid() {
        let (out, ents) = parse_markdown("**hi** [docs](https://e.co)");
        assert_eq!(out, "hi docs");
        for e in &ents {
            assert!(e.end() <= out.encode_utf16().count());
        }
    }

    #[test]
    fn surrounding_whitespace_is_trimmed() {
        let (out, ents) = parse_markdown("  **bold**  ");
        assert_eq!(out, "bold");
        assert_eq!(ents[0].offset, 0);
        assert_eq!(ents[0].length, 4);
    }

    #[test]
    fn entities_come_out_sorted() {
        let (_, ents) = parse_markdown("**a** __b__ `c`");
        let mut sorted = ents.clone();
        sort_entities(&mut sorted);
        assert_eq!(ents, sorted);
    }

    #[test]
    fn plain_text_passes_through() {
        let (out, ents) = parse_markdown("no markup here");
        assert_eq!(out, "no markup here");
        assert!(ents.is_empty());
    }
}
