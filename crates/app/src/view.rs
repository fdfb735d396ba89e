//! Incremental transcript printer.
//!
//! The terminal is append-only, so the view remembers how much of the
//! transcript is already on screen and prints only what changed since the
//! last `sync`. The welcome banner is typed out character by character.
//! Streamed replies are rendered as markdown one complete line at a time, so
//! markup and escape sequences split across chunks are never printed half
//! processed. Settled entries are rendered whole.

use crate::simple_md::{render_markdown, LineRenderer};
use agent_host::markup;
use agent_host::{Conversation, SessionToken, DEEP_SEARCH_PLACEHOLDER, STREAM_PLACEHOLDER};
use colored::Colorize;
use shared::transcript::{Role, TranscriptEntry};
use std::io::{self, Write};

struct LiveEntry {
    index: usize,
    /// Bytes of the entry's display text already consumed
    printed: usize,
    placeholder_shown: bool,
    /// Welcome banner frames, printed per character
    typed: bool,
    lines: LineRenderer,
}

impl LiveEntry {
    /// Render every complete line in `text[printed..]`; with `flush`, the
    /// trailing partial line too.
    fn emit_lines(&mut self, text: &str, flush: bool, out: &mut impl Write) -> io::Result<()> {
        let Some(pending) = text.get(self.printed..) else {
            return Ok(());
        };
        let end = if flush {
            pending.len()
        } else {
            match pending.rfind('\n') {
                Some(pos) => pos + 1,
                None => return Ok(()),
            }
        };
        let chunk = &pending[..end];
        let body = chunk.strip_suffix('\n').unwrap_or(chunk);
        if !chunk.is_empty() {
            for line in body.split('\n') {
                if let Some(rendered) = self.lines.render_line(line) {
                    writeln!(out, "{}", rendered)?;
                }
            }
        }
        self.printed += end;
        Ok(())
    }
}

#[derive(Default)]
pub struct TerminalView {
    token: Option<SessionToken>,
    settled: usize,
    live: Option<LiveEntry>,
    shown_error: Option<String>,
}

fn label(role: Role) -> colored::ColoredString {
    match role {
        Role::User => "> You".green().bold(),
        Role::Model => "< AI".bright_blue().bold(),
    }
}

fn is_placeholder(text: &str) -> bool {
    text == STREAM_PLACEHOLDER || text == DEEP_SEARCH_PLACEHOLDER
}

fn write_sources(out: &mut impl Write, entry: &TranscriptEntry) -> io::Result<()> {
    let sources = entry.sources();
    if sources.is_empty() {
        return Ok(());
    }
    writeln!(out, "{}", "Sources:".dimmed())?;
    for (i, c) in sources.iter().enumerate() {
        writeln!(
            out,
            "  [{}] {} {}",
            i + 1,
            markup::sanitize(&c.title),
            markup::sanitize(&c.uri).bright_blue().underline()
        )?;
    }
    Ok(())
}

/// Friendlier text for common API failures.
pub fn format_error_message(error: &str) -> String {
    let error_lower = error.to_lowercase();

    if error_lower.contains("api key")
        || error_lower.contains("401")
        || error_lower.contains("403")
        || error_lower.contains("permission_denied")
    {
        return format!(
            "Couldn't authenticate with the Gemini API. Check your API key.\n\nError: {}",
            error
        );
    }

    if error_lower.contains("resource_exhausted")
        || error_lower.contains("429")
        || error_lower.contains("quota")
        || error_lower.contains("rate limit")
    {
        return format!(
            "The AI service is busy or the quota is used up. Wait a moment and try again.\n\nError: {}",
            error
        );
    }

    if error_lower.contains("connection")
        || error_lower.contains("timed out")
        || error_lower.contains("timeout")
        || error_lower.contains("dns")
        || error_lower.contains("error sending request")
    {
        return format!(
            "Trouble reaching the AI service. Check your network connection.\n\nError: {}",
            error
        );
    }

    if error_lower.contains("blocked") || error_lower.contains("safety") {
        return format!(
            "The request was blocked by the service's content filter. Try rephrasing.\n\nError: {}",
            error
        );
    }

    format!("Sorry, something went wrong:\n\n{}", error)
}

/// One-line summary of what the next send will do.
pub fn status_line(conv: &Conversation) -> String {
    let mut parts = vec![conv.persona().display_name.to_string()];
    if conv.deep_search_requested() {
        parts.push("deep search on".to_string());
    }
    if let Some(att) = conv.pending_attachment() {
        parts.push(format!("attached: {}", att.name));
    }
    if conv.init_error().is_some() {
        parts.push("session unavailable".to_string());
    } else if conv.is_sending() {
        parts.push("waiting for reply".to_string());
    }
    format!("[{}]", parts.join(" | "))
}

impl TerminalView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Print everything that changed since the last call.
    pub fn sync(&mut self, conv: &Conversation, out: &mut impl Write) -> io::Result<()> {
        if self.token != Some(conv.token()) {
            self.token = Some(conv.token());
            self.settled = 0;
            self.live = None;
            self.shown_error = None;
            writeln!(out)?;
            writeln!(
                out,
                "{}",
                format!("── {} ──", conv.persona().display_name)
                    .bright_magenta()
                    .bold()
            )?;
            if let Some(err) = conv.init_error() {
                writeln!(out, "{}", format_error_message(err).red())?;
            }
        }

        let transcript = conv.transcript();
        let len = transcript.len();

        // a live entry that vanished was rolled back
        if self.live.as_ref().map_or(false, |live| live.index >= len) {
            self.live = None;
            self.settled = len;
        }

        while self.settled < len {
            let index = self.settled;
            let entry = &transcript[index];
            let in_progress = conv.is_in_progress(index)
                || (index == 0 && conv.is_animating())
                || (conv.is_sending() && index + 1 == len && entry.role == Role::Model);

            if self.live.as_ref().map(|l| l.index) != Some(index) {
                if !in_progress {
                    self.print_settled(entry, out)?;
                    self.settled += 1;
                    continue;
                }
                writeln!(out, "{}", label(entry.role))?;
                self.live = Some(LiveEntry {
                    index,
                    printed: 0,
                    placeholder_shown: false,
                    typed: entry.has_cursor() || (index == 0 && conv.is_animating()),
                    lines: LineRenderer::default(),
                });
            }

            let Some(live) = self.live.as_mut() else {
                break;
            };
            if in_progress && is_placeholder(&entry.text) {
                if !live.placeholder_shown {
                    writeln!(out, "{}", entry.text.dimmed())?;
                    live.placeholder_shown = true;
                }
                break;
            }

            let text = entry.display_text();
            if live.typed {
                if let Some(delta) = text.get(live.printed..) {
                    write!(out, "{}", markup::sanitize(delta))?;
                    live.printed = text.len();
                }
                if in_progress {
                    break;
                }
                writeln!(out)?;
            } else {
                live.emit_lines(text, !in_progress, out)?;
                if in_progress {
                    break;
                }
            }

            write_sources(out, entry)?;
            writeln!(out)?;
            self.live = None;
            self.settled += 1;
        }

        if self.shown_error.as_deref() != conv.last_error() {
            if let Some(err) = conv.last_error() {
                writeln!(out, "{}", format_error_message(err).red())?;
                writeln!(out)?;
            }
            self.shown_error = conv.last_error().map(String::from);
        }

        out.flush()
    }

    fn print_settled(&self, entry: &TranscriptEntry, out: &mut impl Write) -> io::Result<()> {
        writeln!(out, "{}", label(entry.role))?;
        writeln!(out, "{}", render_markdown(entry.display_text()))?;
        write_sources(out, entry)?;
        writeln!(out)
    }
}
