//! Lightweight markdown model for model replies.
//!
//! Handles the subset of markdown that chat models actually produce:
//! - `# Heading` through `#### Heading`
//! - `**bold**`, `*italic*` / `_italic_`
//! - `- bullet`, `* bullet` and `1. numbered` list items
//! - `[text](url)` links
//! - `` `inline code` `` and fenced code blocks
//!
//! Text is sanitized before parsing: model output is untrusted and may carry
//! terminal escape sequences.

use regex::Regex;
use std::sync::OnceLock;

static ESCAPE_SEQ: OnceLock<Regex> = OnceLock::new();
static NUMBERED: OnceLock<Regex> = OnceLock::new();

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inline {
    Text(String),
    Bold(String),
    Italic(String),
    Code(String),
    Link { text: String, url: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Heading { level: u8, spans: Vec<Inline> },
    Bullet(Vec<Inline>),
    Numbered { number: String, spans: Vec<Inline> },
    Paragraph(Vec<Inline>),
    Code(String),
    Blank,
}

/// Remove ANSI/OSC escape sequences and control characters other than
/// newline and tab.
pub fn sanitize(text: &str) -> String {
    let re = ESCAPE_SEQ.get_or_init(|| {
        Regex::new(r"\x1b\[[0-?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b[@-_]")
            .expect("valid escape regex")
    });
    re.replace_all(text, "")
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}

/// Parse sanitized text into blocks, one per source line.
pub fn parse(text: &str) -> Vec<Block> {
    let numbered = NUMBERED
        .get_or_init(|| Regex::new(r"^(\d+)[.)]\s+(.*)$").expect("valid list regex"));
    let text = sanitize(text);
    let mut blocks = Vec::new();
    let mut in_fence = false;

    for line in text.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            blocks.push(Block::Code(line.to_string()));
            continue;
        }
        if trimmed.is_empty() {
            blocks.push(Block::Blank);
            continue;
        }

        if let Some((level, rest)) = heading(trimmed) {
            blocks.push(Block::Heading {
                level,
                spans: parse_inline(rest),
            });
            continue;
        }

        if let Some(rest) = trimmed
            .strip_prefix("- ")
            .or_else(|| trimmed.strip_prefix("* "))
        {
            blocks.push(Block::Bullet(parse_inline(rest)));
            continue;
        }

        if let Some(caps) = numbered.captures(trimmed) {
            blocks.push(Block::Numbered {
                number: caps[1].to_string(),
                spans: parse_inline(&caps[2]),
            });
            continue;
        }

        blocks.push(Block::Paragraph(parse_inline(trimmed)));
    }

    blocks
}

fn heading(line: &str) -> Option<(u8, &str)> {
    for (level, prefix) in [(4, "#### "), (3, "### "), (2, "## "), (1, "# ")] {
        if let Some(rest) = line.strip_prefix(prefix) {
            return Some((level, rest));
        }
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkerKind {
    Bold,
    Italic(char),
    Code,
    Link,
}

/// Find the next inline marker in the text.
fn find_next_marker(text: &str) -> Option<(usize, MarkerKind)> {
    let mut best: Option<(usize, MarkerKind)> = None;
    let mut consider = |pos: usize, kind: MarkerKind| {
        if best.map_or(true, |(b, _)| pos < b) {
            best = Some((pos, kind));
        }
    };

    if let Some(pos) = text.find("**") {
        consider(pos, MarkerKind::Bold);
    }
    if let Some(pos) = text.find('`') {
        consider(pos, MarkerKind::Code);
    }
    for marker in ['*', '_'] {
        if let Some(pos) = find_italic(text, marker) {
            consider(pos, MarkerKind::Italic(marker));
        }
    }
    if let Some(pos) = text.find('[') {
        if text[pos..].contains("](") {
            consider(pos, MarkerKind::Link);
        }
    }

    best
}

/// A single marker that opens a span: not doubled, followed by a
/// non-space character, and closed later on the line.
fn find_italic(text: &str, marker: char) -> Option<usize> {
    let bytes = text.as_bytes();
    let m = marker as u8;
    for (pos, _) in text.match_indices(marker) {
        let doubled = bytes.get(pos + 1) == Some(&m) || (pos > 0 && bytes[pos - 1] == m);
        let opens = bytes
            .get(pos + 1)
            .map_or(false, |b| !b.is_ascii_whitespace());
        // snake_case identifiers are not emphasis
        let inside_word = marker == '_' && pos > 0 && bytes[pos - 1].is_ascii_alphanumeric();
        if !doubled && opens && !inside_word && text[pos + 1..].contains(marker) {
            return Some(pos);
        }
    }
    None
}

fn push_text(spans: &mut Vec<Inline>, s: &str) {
    if s.is_empty() {
        return;
    }
    if let Some(Inline::Text(prev)) = spans.last_mut() {
        prev.push_str(s);
    } else {
        spans.push(Inline::Text(s.to_string()));
    }
}

/// Split a line into inline spans. Unclosed markers are kept as literal text.
pub fn parse_inline(text: &str) -> Vec<Inline> {
    let mut spans = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        let Some((pos, kind)) = find_next_marker(remaining) else {
            push_text(&mut spans, remaining);
            break;
        };
        push_text(&mut spans, &remaining[..pos]);

        match kind {
            MarkerKind::Bold => {
                let rest = &remaining[pos + 2..];
                if let Some(end) = rest.find("**") {
                    spans.push(Inline::Bold(rest[..end].to_string()));
                    remaining = &rest[end + 2..];
                } else {
                    push_text(&mut spans, &remaining[pos..]);
                    break;
                }
            }
            MarkerKind::Italic(marker) => {
                let rest = &remaining[pos + 1..];
                match rest.find(marker) {
                    Some(end) => {
                        spans.push(Inline::Italic(rest[..end].to_string()));
                        remaining = &rest[end + 1..];
                    }
                    None => {
                        push_text(&mut spans, &remaining[pos..]);
                        break;
                    }
                }
            }
            MarkerKind::Code => {
                let rest = &remaining[pos + 1..];
                if let Some(end) = rest.find('`') {
                    spans.push(Inline::Code(rest[..end].to_string()));
                    remaining = &rest[end + 1..];
                } else {
                    push_text(&mut spans, &remaining[pos..]);
                    break;
                }
            }
            MarkerKind::Link => {
                let rest = &remaining[pos + 1..];
                let parsed = rest.find("](").and_then(|close| {
                    let after = &rest[close + 2..];
                    after.find(')').map(|paren| (close, paren))
                });
                match parsed {
                    Some((close, paren)) => {
                        let after = &rest[close + 2..];
                        spans.push(Inline::Link {
                            text: rest[..close].to_string(),
                            url: after[..paren].to_string(),
                        });
                        remaining = &after[paren + 1..];
                    }
                    None => {
                        // malformed link, keep the bracket and move on
                        push_text(&mut spans, "[");
                        remaining = rest;
                    }
                }
            }
        }
    }

    spans
}

fn plain_spans(spans: &[Inline]) -> String {
    spans
        .iter()
        .map(|span| match span {
            Inline::Text(s) | Inline::Bold(s) | Inline::Italic(s) | Inline::Code(s) => s.as_str(),
            Inline::Link { text, .. } => text.as_str(),
        })
        .collect()
}

/// Render markup with all formatting removed, keeping only text content.
pub fn to_plain(text: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    for block in parse(text) {
        let line = match block {
            Block::Heading { spans, .. }
            | Block::Bullet(spans)
            | Block::Numbered { spans, .. }
            | Block::Paragraph(spans) => plain_spans(&spans),
            Block::Code(code) => code,
            Block::Blank => String::new(),
        };
        // collapse runs of blank lines
        if line.is_empty() && lines.last().map_or(true, |l| l.is_empty()) {
            continue;
        }
        lines.push(line);
    }
    while lines.last().map_or(false, |l| l.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_escapes_and_controls() {
        let raw = "safe\x1b[2J\x1b[31mred\x1b[0m\x1b]0;title\x07 text\x08\r\nnext\tcol";
        assert_eq!(sanitize(raw), "safered text\nnext\tcol");
    }

    #[test]
    fn test_inline_spans() {
        let spans = parse_inline("A **bold** and *it* with `code` and [link](https://x.io).");
        assert_eq!(
            spans,
            vec![
                Inline::Text("A ".into()),
                Inline::Bold("bold".into()),
                Inline::Text(" and ".into()),
                Inline::Italic("it".into()),
                Inline::Text(" with ".into()),
                Inline::Code("code".into()),
                Inline::Text(" and ".into()),
                Inline::Link {
                    text: "link".into(),
                    url: "https://x.io".into()
                },
                Inline::Text(".".into()),
            ]
        );
    }

    #[test]
    fn test_unclosed_markers_stay_literal() {
        assert_eq!(
            parse_inline("2 * 3 = 6 and **open"),
            vec![Inline::Text("2 * 3 = 6 and **open".into())]
        );
        assert_eq!(
            parse_inline("see [note] here"),
            vec![Inline::Text("see [note] here".into())]
        );
        assert_eq!(
            parse_inline("call snake_case_name now"),
            vec![Inline::Text("call snake_case_name now".into())]
        );
    }

    #[test]
    fn test_block_kinds() {
        let blocks = parse("## Terms\n- one\n2. two\n\n```\nlet x = 1;\n```\nend");
        assert!(matches!(blocks[0], Block::Heading { level: 2, .. }));
        assert!(matches!(blocks[1], Block::Bullet(_)));
        assert!(matches!(&blocks[2], Block::Numbered { number, .. } if number == "2"));
        assert_eq!(blocks[3], Block::Blank);
        assert_eq!(blocks[4], Block::Code("let x = 1;".into()));
        assert!(matches!(blocks[5], Block::Paragraph(_)));
    }

    #[test]
    fn test_to_plain_removes_formatting() {
        let md = "# Force majeure\n\n\n**Definition:** an *unforeseeable* event.\n\n- See [art. 1218](https://law.example/1218)\n1. `Notice` first";
        assert_eq!(
            to_plain(md),
            "Force majeure\n\nDefinition: an unforeseeable event.\n\nSee art. 1218\nNotice first"
        );
    }
}
