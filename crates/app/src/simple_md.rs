//! Lightweight markdown renderer for terminal output.
//!
//! Formats the blocks produced by `agent_host::markup`:
//! headings bold and underlined, `**bold**` bold, `*italic*` italic,
//! `` `code` `` and fenced blocks in yellow, links as `text (url)`.

use agent_host::markup::{self, Block, Inline};
use colored::Colorize;

const INDENT: &str = "  ";

/// Render markdown text to ANSI-styled lines.
pub fn render_markdown(text: &str) -> String {
    markup::parse(text)
        .iter()
        .map(render_block)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Renders a reply one complete line at a time while it streams in.
/// Tracks code fences across lines so the output matches `render_markdown`.
#[derive(Debug, Default)]
pub struct LineRenderer {
    in_fence: bool,
}

impl LineRenderer {
    /// `None` for fence markers, which produce no output.
    pub fn render_line(&mut self, line: &str) -> Option<String> {
        let trimmed = line.trim();
        if trimmed.starts_with("```") {
            self.in_fence = !self.in_fence;
            return None;
        }
        if self.in_fence {
            return Some(render_block(&Block::Code(markup::sanitize(line))));
        }
        if trimmed.is_empty() {
            return Some(String::new());
        }
        Some(
            markup::parse(line)
                .iter()
                .map(render_block)
                .collect::<Vec<_>>()
                .join("\n"),
        )
    }
}

fn render_block(block: &Block) -> String {
    match block {
        Block::Heading { level, spans } => {
            let text = plain(spans);
            if *level <= 2 {
                text.bold().underline().to_string()
            } else {
                text.bold().to_string()
            }
        }
        Block::Bullet(spans) => format!("{}• {}", INDENT, render_inline(spans)),
        Block::Numbered { number, spans } => {
            format!("{}{}. {}", INDENT, number, render_inline(spans))
        }
        Block::Paragraph(spans) => render_inline(spans),
        Block::Code(line) => format!("{}{}", INDENT, line.yellow()),
        Block::Blank => String::new(),
    }
}

fn render_inline(spans: &[Inline]) -> String {
    spans
        .iter()
        .map(|span| match span {
            Inline::Text(t) => t.clone(),
            Inline::Bold(t) => t.bold().to_string(),
            Inline::Italic(t) => t.italic().to_string(),
            Inline::Code(t) => t.yellow().to_string(),
            Inline::Link { text, url } => {
                format!("{} ({})", text.bright_blue().underline(), url.dimmed())
            }
        })
        .collect()
}

fn plain(spans: &[Inline]) -> String {
    spans
        .iter()
        .map(|span| match span {
            Inline::Text(t) | Inline::Bold(t) | Inline::Italic(t) | Inline::Code(t) => t.as_str(),
            Inline::Link { text, .. } => text.as_str(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_color() {
        colored::control::set_override(false);
    }

    #[test]
    fn test_blocks_render_without_markers() {
        no_color();
        let out = render_markdown(
            "## Force majeure\n\n- **Unforeseeable** events\n2. See [ICC clause](https://icc.example)\n```\nclause 7\n```",
        );
        assert_eq!(
            out,
            "Force majeure\n\n  • Unforeseeable events\n  2. See ICC clause (https://icc.example)\n  clause 7"
        );
    }

    #[test]
    fn test_line_renderer_matches_whole_text_rendering() {
        no_color();
        let text = "# Remedies\n\n1. **Damages**\n```\nlet x = *y*;\n```\n*done*";
        let mut lines = LineRenderer::default();
        let streamed: Vec<String> = text.lines().filter_map(|l| lines.render_line(l)).collect();
        assert_eq!(streamed.join("\n"), render_markdown(text));
        assert!(streamed.contains(&"  let x = *y*;".to_string()));
    }

    #[test]
    fn test_escape_sequences_never_reach_the_terminal() {
        no_color();
        let out = render_markdown("ok\x1b[2J\x1b]0;pwned\x07 done");
        assert_eq!(out, "ok done");
        assert!(!out.contains('\x1b'));
    }
}
